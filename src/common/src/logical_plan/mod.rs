use crate::ids::ScanId;
use crate::CrustyError;
pub use logical_op::*;
use serde::{Deserialize, Serialize};
mod logical_op;
use std::fmt;

/// Tree of logical operators. Each node owns its children; data flows from the leaves to the root.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OperatorExpression {
    op: LogicalOp,
    children: Vec<OperatorExpression>,
}

impl OperatorExpression {
    /// Creates a node with the given inputs.
    ///
    /// # Arguments
    ///
    /// * `op` - Operator of the node.
    /// * `children` - Inputs in order (left input first for joins).
    pub fn new(op: LogicalOp, children: Vec<OperatorExpression>) -> Self {
        Self { op, children }
    }

    /// Creates a node without inputs.
    pub fn leaf(op: LogicalOp) -> Self {
        Self::new(op, Vec::new())
    }

    /// Puts `op` on top of this tree.
    pub fn wrap(self, op: LogicalOp) -> Self {
        Self::new(op, vec![self])
    }

    pub fn op(&self) -> &LogicalOp {
        &self.op
    }

    pub fn children(&self) -> &[OperatorExpression] {
        &self.children
    }

    /// Gets the child at index, if present.
    pub fn child(&self, i: usize) -> Option<&OperatorExpression> {
        self.children.get(i)
    }

    /// Returns the total number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Nodes in pre-order.
    pub fn nodes(&self) -> Vec<&OperatorExpression> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.nodes());
        }
        out
    }

    /// Scan ids of all Get and QueryDerivedGet nodes, in pre-order.
    pub fn scan_ids(&self) -> Vec<ScanId> {
        self.nodes().iter().filter_map(|n| n.op.scan_id()).collect()
    }

    /// Indented one-operator-per-line rendering.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(0, &mut out);
        out
    }

    fn explain_into(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.op.to_string());
        out.push('\n');
        for child in &self.children {
            child.explain_into(depth + 1, out);
        }
    }

    /// Serializes the tree as json.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self)
    }

    /// De-Serializes a json representation of the tree created in to_json
    pub fn from_json(json: &str) -> Result<Self, CrustyError> {
        serde_json::from_str(json).map_err(|e| {
            CrustyError::CrustyError(format!("Malformatted logical plan json: {}", e))
        })
    }
}

impl fmt::Display for OperatorExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.explain())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::Expression;
    use crate::table::Table;
    use crate::{DataType, TableSchema};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn get(scan_id: ScanId, name: &str) -> OperatorExpression {
        let schema = TableSchema::from_vecs(vec!["x"], vec![DataType::Int]);
        let table = Arc::new(Table::new(name.to_string(), schema));
        OperatorExpression::leaf(LogicalOp::Get(GetNode::new(
            scan_id,
            table,
            name.to_string(),
            None,
        )))
    }

    fn join(left: OperatorExpression, right: OperatorExpression) -> OperatorExpression {
        OperatorExpression::new(
            LogicalOp::InnerJoin(JoinNode {
                predicate: Some(Expression::eq(
                    Expression::column(Some("a"), "x"),
                    Expression::column(Some("b"), "x"),
                )),
            }),
            vec![left, right],
        )
    }

    #[test]
    fn test_leaf() {
        let g = get(0, "a");
        assert_eq!(g.node_count(), 1);
        assert!(g.children().is_empty());
        assert_eq!(g.op().name(), "Get");
    }

    #[test]
    fn test_node_count_and_scan_ids() {
        let tree = join(join(get(0, "a"), get(1, "b")), get(2, "c")).wrap(LogicalOp::Distinct);
        assert_eq!(tree.node_count(), 6);
        assert_eq!(tree.scan_ids(), vec![0, 1, 2]);
        assert_eq!(tree.child(0).unwrap().op().name(), "InnerJoin");
        assert!(tree.child(1).is_none());
    }

    #[test]
    fn test_explain() {
        let mut map = BTreeMap::new();
        map.insert(String::from("k"), Expression::column(Some("a"), "x"));
        let tree = OperatorExpression::new(
            LogicalOp::QueryDerivedGet(QueryDerivedGetNode {
                scan_id: 1,
                alias: String::from("d"),
                alias_to_expr_map: map,
            }),
            vec![get(0, "a")],
        )
        .wrap(LogicalOp::Limit(LimitNode {
            limit: Some(5),
            offset: 0,
        }));
        assert_eq!(
            tree.explain(),
            "Limit 5 OFFSET 0\n  QueryDerivedGet#1 d (k := a.x)\n    Get#0 a\n"
        );
    }

    #[test]
    fn test_constant_row() {
        let tree = OperatorExpression::leaf(LogicalOp::Get(GetNode::constant_row(3)));
        assert_eq!(tree.to_string(), "Get#3 <constant row>\n");
    }

    #[test]
    fn test_json() {
        let tree = join(get(0, "a"), get(1, "b")).wrap(LogicalOp::Filter(FilterNode {
            predicate: Expression::eq(Expression::column(Some("a"), "x"), Expression::int(1)),
        }));
        let json = tree.to_json();
        let new_tree = OperatorExpression::from_json(&json.to_string()).unwrap();
        assert_eq!(tree, new_tree);
        match new_tree.op() {
            LogicalOp::Filter(_) => (),
            _ => panic!("Incorrect root"),
        }
    }

    #[test]
    fn test_bad_json() {
        assert!(OperatorExpression::from_json("{\"op\": 7}").is_err());
    }
}
