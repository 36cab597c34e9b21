//! Assembly of scans and joins from the FROM clause.

use crate::predicate::{self, PredicatePools};
use crate::query_to_operator::QueryToOperatorTransformer;
use common::ast::{JoinDefinition, JoinType, TableName, TableRef};
use common::catalog::Catalog;
use common::logical_plan::*;
use common::CrustyError;
use log::trace;

/// Which inputs of a join may not receive WHERE conjuncts from the enclosing select.
fn null_supplying_sides(join_type: JoinType) -> (bool, bool) {
    match join_type {
        JoinType::Left => (false, true),
        JoinType::Right => (true, false),
        JoinType::Outer => (true, true),
        _ => (false, false),
    }
}

impl<'a, C: 'a + Catalog> QueryToOperatorTransformer<'a, C> {
    /// Scan of a catalog table, carrying the pooled conjuncts that only reference it.
    pub(crate) fn transform_base_table(
        &mut self,
        name: &TableName,
        alias: Option<&str>,
    ) -> Result<OperatorExpression, CrustyError> {
        let table = self.lookup(name)?;
        let alias = alias.unwrap_or(&name.name).to_lowercase();
        let predicate = predicate::combine(self.pools.take_single_table(&alias));
        let scan_id = self.next_scan_id();
        trace!("Get#{} {} AS {}", scan_id, table.name, alias);
        self.scope.insert(&alias);
        Ok(OperatorExpression::leaf(LogicalOp::Get(GetNode::new(
            scan_id, table, alias, predicate,
        ))))
    }

    /// Binary join written with JOIN syntax.
    pub(crate) fn transform_join(&mut self, join: &JoinDefinition) -> Result<OperatorExpression, CrustyError> {
        if join.join_type == JoinType::Invalid {
            return Err(CrustyError::UnsupportedConstruct(String::from(
                "invalid join type",
            )));
        }
        let (left_isolated, right_isolated) = null_supplying_sides(join.join_type);

        let outer_scope = self.scope.take();
        let left = self.transform_join_child(&join.left, left_isolated)?;
        let left_scope = self.scope.take();
        let right = self.transform_join_child(&join.right, right_isolated)?;
        self.scope.merge(left_scope);

        let op = match join.join_type {
            JoinType::Inner => {
                if let Some(condition) = &join.condition {
                    self.pools
                        .add_join_predicates(predicate::decompose_conjuncts(condition));
                }
                let predicate = predicate::construct_join_predicate(
                    self.scope.aliases(),
                    &mut self.pools.join_predicates,
                );
                LogicalOp::InnerJoin(JoinNode { predicate })
            }
            JoinType::Outer => LogicalOp::OuterJoin(JoinNode {
                predicate: join.condition.clone(),
            }),
            JoinType::Left => LogicalOp::LeftJoin(JoinNode {
                predicate: join.condition.clone(),
            }),
            JoinType::Right => LogicalOp::RightJoin(JoinNode {
                predicate: join.condition.clone(),
            }),
            JoinType::Semi => LogicalOp::SemiJoin(JoinNode {
                predicate: join.condition.clone(),
            }),
            JoinType::Invalid => {
                return Err(CrustyError::UnsupportedConstruct(String::from(
                    "invalid join type",
                )))
            }
        };
        self.scope.exit(outer_scope);
        Ok(OperatorExpression::new(op, vec![left, right]))
    }

    /// Transforms one input of a join in an empty alias scope.
    ///
    /// Null-supplying inputs also get empty predicate pools, so no WHERE conjunct
    /// lands beneath them. Whatever is left in those pools is handed back to the
    /// enclosing pools afterwards.
    fn transform_join_child(
        &mut self,
        table_ref: &TableRef,
        null_supplying: bool,
    ) -> Result<OperatorExpression, CrustyError> {
        if !null_supplying {
            return self.transform_table_ref(table_ref);
        }
        let outer_pools = std::mem::replace(&mut self.pools, PredicatePools::new());
        let child = self.transform_table_ref(table_ref);
        let isolated = std::mem::replace(&mut self.pools, outer_pools);
        self.pools.append(isolated);
        child
    }

    /// Left-deep chain of inner joins over a comma separated FROM list.
    pub(crate) fn transform_cross_product(
        &mut self,
        list: &[TableRef],
    ) -> Result<OperatorExpression, CrustyError> {
        let (first, rest) = list.split_first().ok_or_else(|| {
            CrustyError::ValidationError(String::from("empty FROM list"))
        })?;
        let mut output = self.transform_table_ref(first)?;
        for table_ref in rest {
            let right = self.transform_table_ref(table_ref)?;
            let predicate = predicate::construct_join_predicate(
                self.scope.aliases(),
                &mut self.pools.join_predicates,
            );
            output = OperatorExpression::new(
                LogicalOp::InnerJoin(JoinNode { predicate }),
                vec![output, right],
            );
        }
        Ok(output)
    }
}
