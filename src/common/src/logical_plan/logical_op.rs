use crate::ast::{Expression, UpdateClause};
use crate::ids::ScanId;
use crate::table::TableHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A LogicalOp represents a relational operation present in a logical query plan.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum LogicalOp {
    Get(GetNode),
    QueryDerivedGet(QueryDerivedGetNode),
    Filter(FilterNode),
    InnerJoin(JoinNode),
    /// Full outer join.
    OuterJoin(JoinNode),
    LeftJoin(JoinNode),
    RightJoin(JoinNode),
    SemiJoin(JoinNode),
    /// Join producing a marker column from an IN or EXISTS subquery.
    MarkJoin,
    /// Join with a subquery that yields at most one row per input row.
    SingleJoin,
    /// Aggregation over the whole input, no grouping columns.
    Aggregate,
    GroupBy(GroupByNode),
    Distinct,
    Limit(LimitNode),
    Insert(InsertNode),
    InsertSelect(DmlNode),
    Delete(DmlNode),
    Update(UpdateNode),
}

impl LogicalOp {
    /// Name of the operator as printed by explain output.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOp::Get(_) => "Get",
            LogicalOp::QueryDerivedGet(_) => "QueryDerivedGet",
            LogicalOp::Filter(_) => "Filter",
            LogicalOp::InnerJoin(_) => "InnerJoin",
            LogicalOp::OuterJoin(_) => "OuterJoin",
            LogicalOp::LeftJoin(_) => "LeftJoin",
            LogicalOp::RightJoin(_) => "RightJoin",
            LogicalOp::SemiJoin(_) => "SemiJoin",
            LogicalOp::MarkJoin => "MarkJoin",
            LogicalOp::SingleJoin => "SingleJoin",
            LogicalOp::Aggregate => "Aggregate",
            LogicalOp::GroupBy(_) => "GroupBy",
            LogicalOp::Distinct => "Distinct",
            LogicalOp::Limit(_) => "Limit",
            LogicalOp::Insert(_) => "Insert",
            LogicalOp::InsertSelect(_) => "InsertSelect",
            LogicalOp::Delete(_) => "Delete",
            LogicalOp::Update(_) => "Update",
        }
    }

    /// Scan id of Get and QueryDerivedGet operators.
    pub fn scan_id(&self) -> Option<ScanId> {
        match self {
            LogicalOp::Get(get) => Some(get.scan_id),
            LogicalOp::QueryDerivedGet(get) => Some(get.scan_id),
            _ => None,
        }
    }

    /// Predicate of joins, if the operator is a join.
    pub fn join_predicate(&self) -> Option<Option<&Expression>> {
        match self {
            LogicalOp::InnerJoin(join)
            | LogicalOp::OuterJoin(join)
            | LogicalOp::LeftJoin(join)
            | LogicalOp::RightJoin(join)
            | LogicalOp::SemiJoin(join) => Some(join.predicate.as_ref()),
            LogicalOp::MarkJoin | LogicalOp::SingleJoin => Some(None),
            _ => None,
        }
    }
}

/// Scan of a base table, or of the single constant row when the query has no FROM clause.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GetNode {
    pub scan_id: ScanId,
    /// `None` for the constant-row scan.
    pub table: Option<TableHandle>,
    /// Lowercase alias the rest of the query uses for the table.
    pub alias: Option<String>,
    /// Conjunction of the single-table predicates pushed into the scan.
    pub predicate: Option<Expression>,
    /// Set for scans feeding UPDATE.
    pub is_for_update: bool,
}

impl GetNode {
    pub fn new(
        scan_id: ScanId,
        table: TableHandle,
        alias: String,
        predicate: Option<Expression>,
    ) -> Self {
        Self {
            scan_id,
            table: Some(table),
            alias: Some(alias),
            predicate,
            is_for_update: false,
        }
    }

    /// Scan that yields one empty row.
    pub fn constant_row(scan_id: ScanId) -> Self {
        Self {
            scan_id,
            table: None,
            alias: None,
            predicate: None,
            is_for_update: false,
        }
    }
}

/// Scan over the output of a derived table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QueryDerivedGetNode {
    pub scan_id: ScanId,
    pub alias: String,
    /// Output column name to the inner select expression producing it.
    pub alias_to_expr_map: BTreeMap<String, Expression>,
}

/// Filter node.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FilterNode {
    /// Predicate to filter by.
    pub predicate: Expression,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JoinNode {
    /// `None` means a cross product.
    pub predicate: Option<Expression>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GroupByNode {
    pub columns: Vec<Expression>,
    pub having: Option<Expression>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LimitNode {
    pub limit: Option<u64>,
    pub offset: u64,
}

/// Insert of literal rows.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InsertNode {
    pub table: TableHandle,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expression>>,
}

/// Data modification whose rows come from its child.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DmlNode {
    pub table: TableHandle,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UpdateNode {
    pub table: TableHandle,
    pub updates: Vec<UpdateClause>,
}

fn join_exprs(exprs: &[Expression]) -> String {
    exprs
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_predicate(f: &mut fmt::Formatter<'_>, predicate: &Option<Expression>) -> fmt::Result {
    match predicate {
        Some(pred) => write!(f, " [{}]", pred),
        None => Ok(()),
    }
}

impl fmt::Display for LogicalOp {
    /// One-line description used by explain output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            LogicalOp::Get(get) => {
                write!(f, "#{}", get.scan_id)?;
                match (&get.table, &get.alias) {
                    (Some(table), Some(alias)) if table.name != *alias => {
                        write!(f, " {} AS {}", table.name, alias)?
                    }
                    (Some(table), _) => write!(f, " {}", table.name)?,
                    (None, _) => write!(f, " <constant row>")?,
                }
                if get.is_for_update {
                    write!(f, " FOR UPDATE")?;
                }
                write_predicate(f, &get.predicate)
            }
            LogicalOp::QueryDerivedGet(get) => {
                let outputs: Vec<String> = get
                    .alias_to_expr_map
                    .iter()
                    .map(|(name, expr)| format!("{} := {}", name, expr))
                    .collect();
                write!(f, "#{} {} ({})", get.scan_id, get.alias, outputs.join(", "))
            }
            LogicalOp::Filter(filter) => write!(f, " [{}]", filter.predicate),
            LogicalOp::InnerJoin(join)
            | LogicalOp::OuterJoin(join)
            | LogicalOp::LeftJoin(join)
            | LogicalOp::RightJoin(join)
            | LogicalOp::SemiJoin(join) => write_predicate(f, &join.predicate),
            LogicalOp::GroupBy(group_by) => {
                write!(f, " ({})", join_exprs(&group_by.columns))?;
                match &group_by.having {
                    Some(having) => write!(f, " HAVING {}", having),
                    None => Ok(()),
                }
            }
            LogicalOp::Limit(limit) => {
                match limit.limit {
                    Some(n) => write!(f, " {}", n)?,
                    None => write!(f, " ALL")?,
                }
                write!(f, " OFFSET {}", limit.offset)
            }
            LogicalOp::Insert(insert) => write!(
                f,
                " {} ({}) {} row(s)",
                insert.table.name,
                insert.columns.join(", "),
                insert.values.len()
            ),
            LogicalOp::InsertSelect(dml) | LogicalOp::Delete(dml) => write!(f, " {}", dml.table.name),
            LogicalOp::Update(update) => {
                let sets: Vec<String> = update.updates.iter().map(|u| u.to_string()).collect();
                write!(f, " {} SET {}", update.table.name, sets.join(", "))
            }
            LogicalOp::Aggregate
            | LogicalOp::Distinct
            | LogicalOp::MarkJoin
            | LogicalOp::SingleJoin => Ok(()),
        }
    }
}
