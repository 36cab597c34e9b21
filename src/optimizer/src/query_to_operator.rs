use crate::alias_scope::AliasScope;
use crate::binder::Binder;
use crate::config::PlannerConfig;
use crate::predicate::{self, PredicatePools, TableAliasSet};
use common::ast::*;
use common::catalog::Catalog;
use common::ids::{ScanId, TransactionId};
use common::logical_plan::*;
use common::table::TableHandle;
use common::CrustyError;
use log::{debug, trace};

/// Transforms a parsed statement into a tree of logical operators.
///
/// WHERE conjuncts are pushed to the lowest scan or join that covers the
/// aliases they reference. Whatever cannot be pushed ends up in a Filter
/// directly above the FROM clause.
pub struct QueryToOperatorTransformer<'a, C: Catalog> {
    /// Catalog used to resolve table names.
    pub(crate) catalog: &'a C,
    /// Transaction the catalog lookups run under.
    pub(crate) tid: TransactionId,
    pub(crate) config: PlannerConfig,
    /// Next id handed to a Get or QueryDerivedGet. Reset for every statement.
    next_scan_id: ScanId,
    /// Conjuncts of the current select not yet attached to an operator.
    pub(crate) pools: PredicatePools,
    /// Aliases of the FROM entries transformed so far at the current level.
    pub(crate) scope: AliasScope,
}

impl<'a, C: 'a + Catalog> QueryToOperatorTransformer<'a, C> {
    /// Creates a transformer with the default planner configuration.
    pub fn new(catalog: &'a C, tid: TransactionId) -> Self {
        Self::with_config(catalog, tid, PlannerConfig::default())
    }

    pub fn with_config(catalog: &'a C, tid: TransactionId, config: PlannerConfig) -> Self {
        Self {
            catalog,
            tid,
            config,
            next_scan_id: 0,
            pools: PredicatePools::new(),
            scope: AliasScope::new(),
        }
    }

    /// Transforms one statement with a fresh transformer.
    ///
    /// # Arguments
    ///
    /// * `statement` - Statement to transform.
    /// * `catalog` - Catalog for table lookups.
    /// * `tid` - Transaction the lookups run under.
    pub fn from_statement(
        statement: &Statement,
        catalog: &'a C,
        tid: TransactionId,
    ) -> Result<Option<OperatorExpression>, CrustyError> {
        let mut transformer = Self::new(catalog, tid);
        transformer.transform(statement)
    }

    /// Builds the logical operator tree of `statement`.
    ///
    /// Returns `Ok(None)` for statements that have no operator tree (DDL,
    /// transaction control, PREPARE, EXECUTE, COPY, ANALYZE).
    pub fn transform(&mut self, statement: &Statement) -> Result<Option<OperatorExpression>, CrustyError> {
        self.reset();
        debug!("Transforming {} statement under {}", statement.kind(), self.tid);
        let bound = Binder::new(self.catalog, self.tid).bind_statement(statement)?;
        let tree = match &bound {
            Statement::Select(select) => Some(self.transform_select(select)?),
            Statement::Insert(insert) => Some(self.transform_insert(insert)?),
            Statement::Delete(delete) => Some(self.transform_delete(delete)?),
            Statement::Update(update) => Some(self.transform_update(update)?),
            Statement::Create(_)
            | Statement::Drop(_)
            | Statement::Prepare(_)
            | Statement::Execute(_)
            | Statement::Transaction(_)
            | Statement::Copy(_)
            | Statement::Analyze(_) => None,
        };
        if let Some(tree) = &tree {
            trace!("Logical tree:\n{}", tree.explain());
        }
        Ok(tree)
    }

    fn reset(&mut self) {
        self.next_scan_id = 0;
        self.pools = PredicatePools::new();
        self.scope = AliasScope::new();
    }

    pub(crate) fn next_scan_id(&mut self) -> ScanId {
        let id = self.next_scan_id;
        self.next_scan_id += 1;
        id
    }

    pub(crate) fn lookup(&self, name: &TableName) -> Result<TableHandle, CrustyError> {
        self.catalog
            .lookup_table(name.database.as_deref(), &name.name, self.tid)
    }

    /// Transforms a select at the current nesting level, consuming the pools built for it.
    pub(crate) fn transform_select(&mut self, select: &SelectStatement) -> Result<OperatorExpression, CrustyError> {
        let mut residual = Vec::new();
        let mut subquery_conjuncts = Vec::new();
        if let Some(where_clause) = &select.where_clause {
            let mut conjuncts = Vec::new();
            for conjunct in predicate::decompose_conjuncts(where_clause) {
                if !conjunct.has_subquery() {
                    conjuncts.push(conjunct);
                } else if is_supported_conjunct(&conjunct) {
                    subquery_conjuncts.push(conjunct);
                } else {
                    return Err(CrustyError::UnsupportedConstruct(String::from(
                        "Predicate type not supported yet",
                    )));
                }
            }
            if self.config.predicate_push_down {
                self.pools.classify(conjuncts);
            } else {
                residual = conjuncts;
            }
        }

        let mut output = match &select.from_table {
            Some(table_ref) => self.transform_table_ref(table_ref)?,
            None => {
                let scan_id = self.next_scan_id();
                OperatorExpression::leaf(LogicalOp::Get(GetNode::constant_row(scan_id)))
            }
        };

        let leftovers = self.pools.drain_all();
        if !leftovers.is_empty() {
            trace!("{} conjunct(s) could not be pushed below the filter", leftovers.len());
        }
        residual.extend(leftovers);
        for conjunct in subquery_conjuncts {
            let (unnested, rewritten) = self.unnest_subquery(output, conjunct)?;
            output = unnested;
            residual.push(rewritten);
        }
        if let Some(predicate) = predicate::combine(residual) {
            output = output.wrap(LogicalOp::Filter(FilterNode { predicate }));
        }

        output = match &select.group_by {
            Some(group_by) => output.wrap(LogicalOp::GroupBy(GroupByNode {
                columns: group_by.columns.clone(),
                having: group_by.having.clone(),
            })),
            None if requires_aggregation(select)? => output.wrap(LogicalOp::Aggregate),
            None => output,
        };

        if select.select_distinct {
            output = output.wrap(LogicalOp::Distinct);
        }
        if let Some(limit) = &select.limit {
            output = output.wrap(LogicalOp::Limit(LimitNode {
                limit: limit.limit,
                offset: limit.offset,
            }));
        }
        Ok(output)
    }

    /// Dispatches one FROM entry.
    pub(crate) fn transform_table_ref(&mut self, table_ref: &TableRef) -> Result<OperatorExpression, CrustyError> {
        match table_ref {
            TableRef::Table { name, alias } => self.transform_base_table(name, alias.as_deref()),
            TableRef::Select { select, alias } => {
                let alias = alias.as_deref().ok_or_else(|| {
                    CrustyError::ValidationError(String::from("subquery in FROM must have an alias"))
                })?;
                self.transform_derived_table(select, alias)
            }
            TableRef::Join(join) => self.transform_join(join),
            TableRef::CrossProduct(list) => self.transform_cross_product(list),
        }
    }

    /// Transforms a derived table into a QueryDerivedGet over the inner select.
    ///
    /// Outer conjuncts that only reference the derived table are rewritten in
    /// terms of the inner select list and pushed into the inner query, unless
    /// the inner query groups, aggregates, deduplicates or limits its rows.
    fn transform_derived_table(
        &mut self,
        select: &SelectStatement,
        alias: &str,
    ) -> Result<OperatorExpression, CrustyError> {
        let alias = alias.to_lowercase();
        let alias_to_expr_map = predicate::construct_select_element_map(&select.select_list);

        let mut outer_pools = std::mem::take(&mut self.pools);
        let outer_scope = self.scope.take();

        if self.config.predicate_push_down && accepts_pushdown(select) {
            let pushed = outer_pools.take_single_table(&alias);
            if !pushed.is_empty() {
                trace!("Pushing {} conjunct(s) into derived table {}", pushed.len(), alias);
            }
            for pred in pushed {
                let rewritten =
                    predicate::rewrite_derived_table_predicates(&alias, &alias_to_expr_map, pred)?;
                self.pools.classify(vec![rewritten]);
            }
        }

        let child = self.transform_select(select)?;
        self.pools = outer_pools;
        self.scope.restore(outer_scope);
        self.scope.insert(&alias);

        let scan_id = self.next_scan_id();
        Ok(OperatorExpression::new(
            LogicalOp::QueryDerivedGet(QueryDerivedGetNode {
                scan_id,
                alias,
                alias_to_expr_map,
            }),
            vec![child],
        ))
    }

    /// Joins the subquery of a WHERE conjunct to `input`.
    ///
    /// IN and EXISTS become a MarkJoin, scalar comparisons a SingleJoin. The
    /// returned conjunct has the subquery replaced by its first output column
    /// and goes in the Filter above the join.
    fn unnest_subquery(
        &mut self,
        input: OperatorExpression,
        conjunct: Expression,
    ) -> Result<(OperatorExpression, Expression), CrustyError> {
        match conjunct {
            Expression::Comparison {
                op: ComparisonOp::In,
                left,
                right,
            } => match *right {
                Expression::Subquery(select) => {
                    let (subtree, column) = self.transform_subquery(&select, true)?;
                    let join = OperatorExpression::new(LogicalOp::MarkJoin, vec![input, subtree]);
                    Ok((join, Expression::eq(*left, column)))
                }
                other => Ok((input, Expression::compare(ComparisonOp::In, *left, other))),
            },
            Expression::Operator {
                op: OperatorKind::Exists,
                mut children,
            } if children.len() == 1 => match children.remove(0) {
                Expression::Subquery(select) => {
                    let (subtree, column) = self.transform_subquery(&select, false)?;
                    let join = OperatorExpression::new(LogicalOp::MarkJoin, vec![input, subtree]);
                    let marker = Expression::Operator {
                        op: OperatorKind::IsNotNull,
                        children: vec![column],
                    };
                    Ok((join, marker))
                }
                other => Ok((
                    input,
                    Expression::Operator {
                        op: OperatorKind::Exists,
                        children: vec![other],
                    },
                )),
            },
            Expression::Comparison { op, left, right } => match (*left, *right) {
                (left, Expression::Subquery(select)) => {
                    let (subtree, column) = self.transform_subquery(&select, true)?;
                    let join = OperatorExpression::new(LogicalOp::SingleJoin, vec![input, subtree]);
                    Ok((join, Expression::compare(op, left, column)))
                }
                (Expression::Subquery(select), right) => {
                    let (subtree, column) = self.transform_subquery(&select, true)?;
                    let join = OperatorExpression::new(LogicalOp::SingleJoin, vec![input, subtree]);
                    Ok((join, Expression::compare(op, column, right)))
                }
                (left, right) => Ok((input, Expression::compare(op, left, right))),
            },
            other => Ok((input, other)),
        }
    }

    /// Transforms a subquery of a WHERE conjunct with its own pools and scope.
    ///
    /// Returns the subquery tree and its first output expression.
    fn transform_subquery(
        &mut self,
        select: &SelectStatement,
        single_column: bool,
    ) -> Result<(OperatorExpression, Expression), CrustyError> {
        if !is_supported_sub_select(select)? {
            return Err(CrustyError::UnsupportedConstruct(String::from(
                "Sub-select not supported",
            )));
        }
        if single_column && select.select_list.len() != 1 {
            return Err(CrustyError::UnsupportedConstruct(String::from(
                "Array in predicates not supported",
            )));
        }
        let column = select
            .select_list
            .first()
            .map(|item| item.expr.clone())
            .ok_or_else(|| CrustyError::ValidationError(String::from("subquery has no output")))?;

        let outer_pools = std::mem::take(&mut self.pools);
        let outer_scope = self.scope.take();
        let subtree = self.transform_select(select);
        self.pools = outer_pools;
        self.scope.restore(outer_scope);
        let subtree = subtree?;
        trace!("Unnested subquery producing {}", column);
        Ok((subtree, column))
    }

    fn transform_insert(&mut self, insert: &InsertStatement) -> Result<OperatorExpression, CrustyError> {
        let table = self.lookup(&insert.table)?;
        match &insert.source {
            InsertSource::Select(select) => {
                let child = self.transform_select(select)?;
                Ok(OperatorExpression::new(
                    LogicalOp::InsertSelect(DmlNode { table }),
                    vec![child],
                ))
            }
            InsertSource::Values(rows) => {
                check_insert_values(&table, &insert.columns, rows)?;
                Ok(OperatorExpression::leaf(LogicalOp::Insert(InsertNode {
                    table,
                    columns: insert.columns.clone(),
                    values: rows.clone(),
                })))
            }
        }
    }

    fn transform_delete(&mut self, delete: &DeleteStatement) -> Result<OperatorExpression, CrustyError> {
        let table = self.lookup(&delete.table)?;
        let get = self.target_get(&table, delete.expr.clone(), false);
        Ok(get.wrap(LogicalOp::Delete(DmlNode { table })))
    }

    fn transform_update(&mut self, update: &UpdateStatement) -> Result<OperatorExpression, CrustyError> {
        let table = self.lookup(&update.table)?;
        let get = self.target_get(&table, update.where_clause.clone(), true);
        Ok(get.wrap(LogicalOp::Update(UpdateNode {
            table,
            updates: update.updates.clone(),
        })))
    }

    /// Scan of the table a DELETE or UPDATE modifies.
    fn target_get(
        &mut self,
        table: &TableHandle,
        predicate: Option<Expression>,
        is_for_update: bool,
    ) -> OperatorExpression {
        let mut get = GetNode::new(self.next_scan_id(), table.clone(), table.name.clone(), predicate);
        get.is_for_update = is_for_update;
        OperatorExpression::leaf(LogicalOp::Get(get))
    }
}

/// Whether a select without GROUP BY aggregates its whole input.
///
/// Errors when aggregate and non-aggregate select items are mixed.
fn requires_aggregation(select: &SelectStatement) -> Result<bool, CrustyError> {
    let mut has_aggregate = false;
    let mut has_other = false;
    for item in &select.select_list {
        if item.expr.contains_aggregate() {
            has_aggregate = true;
        } else {
            has_other = true;
        }
    }
    if has_aggregate && has_other {
        return Err(CrustyError::SemanticError(String::from(
            "non-aggregated expression must appear in GROUP BY or inside an aggregate",
        )));
    }
    Ok(has_aggregate)
}

fn is_scalar_comparison(op: ComparisonOp) -> bool {
    match op {
        ComparisonOp::Equal
        | ComparisonOp::GreaterThan
        | ComparisonOp::GreaterThanOrEqual
        | ComparisonOp::LessThan
        | ComparisonOp::LessThanOrEqual => true,
        _ => false,
    }
}

/// Conjunct shapes whose subquery can be unnested: `x IN (sub)`, `EXISTS (sub)`
/// and a scalar comparison with a subquery on exactly one side.
fn is_supported_conjunct(expr: &Expression) -> bool {
    let is_subquery = |e: &Expression| matches!(e, Expression::Subquery(_));
    match expr {
        Expression::Comparison {
            op: ComparisonOp::In,
            left,
            right,
        } => !left.has_subquery() && is_subquery(right),
        Expression::Operator {
            op: OperatorKind::Exists,
            children,
        } => matches!(children.as_slice(), [Expression::Subquery(_)]),
        Expression::Comparison { op, left, right } if is_scalar_comparison(*op) => {
            (!left.has_subquery() && is_subquery(right))
                || (!right.has_subquery() && is_subquery(left))
        }
        _ => false,
    }
}

/// A subquery can be unnested unless it aggregates and correlates through
/// anything but `outer.column = <inner-only expression>` conjuncts.
fn is_supported_sub_select(select: &SelectStatement) -> Result<bool, CrustyError> {
    if select.group_by.is_none() && !requires_aggregation(select)? {
        return Ok(true);
    }
    let where_clause = match &select.where_clause {
        Some(where_clause) => where_clause,
        None => return Ok(true),
    };
    let mut inner = TableAliasSet::new();
    let mut on_refs = TableAliasSet::new();
    if let Some(from) = &select.from_table {
        predicate::collect_from_aliases(from, &mut inner, &mut on_refs);
    }
    let is_outer_column = |e: &Expression| {
        matches!(e, Expression::ColumnRef(_)) && {
            let aliases = predicate::alias_set_of(e);
            !aliases.is_empty() && aliases.is_disjoint(&inner)
        }
    };
    let is_inner_only = |e: &Expression| predicate::alias_set_of(e).is_subset(&inner);
    for conjunct in predicate::decompose_conjuncts(where_clause) {
        if is_inner_only(&conjunct) {
            continue;
        }
        let supported = match &conjunct {
            Expression::Comparison {
                op: ComparisonOp::Equal,
                left,
                right,
            } => {
                (is_outer_column(left) && is_inner_only(right))
                    || (is_outer_column(right) && is_inner_only(left))
            }
            _ => false,
        };
        if !supported {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Whether outer predicates may be evaluated inside a derived table without changing its result.
fn accepts_pushdown(select: &SelectStatement) -> bool {
    select.group_by.is_none()
        && !select.has_aggregate()
        && !select.select_distinct
        && select.limit.is_none()
}

/// Checks literal INSERT rows against the target table.
///
/// # Arguments
///
/// * `table` - Target table.
/// * `columns` - Target columns named by the statement, empty for all columns.
/// * `rows` - Rows of the VALUES list.
fn check_insert_values(
    table: &TableHandle,
    columns: &[String],
    rows: &[Vec<Expression>],
) -> Result<(), CrustyError> {
    for column in columns {
        if !table.schema.contains(column) {
            return Err(CrustyError::ValidationError(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                column, table.name
            )));
        }
    }
    let target_count = if columns.is_empty() {
        table.schema.size()
    } else {
        columns.len()
    };
    for row in rows {
        if row.len() > target_count {
            return Err(CrustyError::ValidationError(String::from(
                "INSERT has more expressions than target columns",
            )));
        }
        if !columns.is_empty() && row.len() < target_count {
            return Err(CrustyError::ValidationError(String::from(
                "INSERT has more target columns than expressions",
            )));
        }
    }
    let targets: Vec<&str> = if columns.is_empty() {
        table.schema.attributes().map(|a| a.name()).collect()
    } else {
        columns.iter().map(|c| c.as_str()).collect()
    };
    for attr in table.schema.attributes().filter(|a| a.not_null) {
        let position = targets.iter().position(|name| *name == attr.name());
        let violated = rows
            .iter()
            .any(|row| match position.and_then(|i| row.get(i)) {
                None | Some(Expression::Constant(ConstantValue::Null)) => true,
                Some(_) => false,
            });
        if violated {
            return Err(CrustyError::ValidationError(format!(
                "null value in column \"{}\" violates not-null constraint",
                attr.name
            )));
        }
    }
    Ok(())
}
