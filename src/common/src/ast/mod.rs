//! Statement tree produced by the SQL front end and consumed by the planner.
//!
//! The planner reads these nodes and copies subtrees out of them; it never
//! mutates a statement it was handed.

use crate::Attribute;
use serde::{Deserialize, Serialize};
use std::fmt;

mod expression;
pub use expression::*;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Statement {
    Select(Box<SelectStatement>),
    Insert(InsertStatement),
    Delete(DeleteStatement),
    Update(UpdateStatement),
    Create(CreateStatement),
    Drop(DropStatement),
    Prepare(PrepareStatement),
    Execute(ExecuteStatement),
    Transaction(TransactionStatement),
    Copy(CopyStatement),
    Analyze(AnalyzeStatement),
}

impl Statement {
    /// Short name of the statement kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Delete(_) => "DELETE",
            Statement::Update(_) => "UPDATE",
            Statement::Create(_) => "CREATE",
            Statement::Drop(_) => "DROP",
            Statement::Prepare(_) => "PREPARE",
            Statement::Execute(_) => "EXECUTE",
            Statement::Transaction(_) => "TRANSACTION",
            Statement::Copy(_) => "COPY",
            Statement::Analyze(_) => "ANALYZE",
        }
    }
}

/// Possibly database-qualified table name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableName {
    pub database: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: &str) -> Self {
        Self {
            database: None,
            name: name.to_lowercase(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{}.{}", db, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SelectItem {
    pub expr: Expression,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expression) -> Self {
        Self { expr, alias: None }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectStatement {
    pub select_list: Vec<SelectItem>,
    pub from_table: Option<TableRef>,
    pub where_clause: Option<Expression>,
    pub group_by: Option<GroupByDescription>,
    pub order_by: Vec<OrderByDescription>,
    pub limit: Option<LimitDescription>,
    pub select_distinct: bool,
}

impl SelectStatement {
    /// Whether any select item computes an aggregate.
    pub fn has_aggregate(&self) -> bool {
        self.select_list
            .iter()
            .any(|item| item.expr.contains_aggregate())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GroupByDescription {
    pub columns: Vec<Expression>,
    pub having: Option<Expression>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderByDescription {
    pub expr: Expression,
    pub ascending: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LimitDescription {
    /// `None` means no row cap, only an offset.
    pub limit: Option<u64>,
    pub offset: u64,
}

/// An entry of a FROM clause.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum TableRef {
    Table {
        name: TableName,
        alias: Option<String>,
    },
    /// Derived table.
    Select {
        select: Box<SelectStatement>,
        alias: Option<String>,
    },
    Join(Box<JoinDefinition>),
    /// Comma separated FROM list.
    CrossProduct(Vec<TableRef>),
}

impl TableRef {
    pub fn table(name: &str, alias: Option<&str>) -> Self {
        TableRef::Table {
            name: TableName::new(name),
            alias: alias.map(|a| a.to_lowercase()),
        }
    }
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    /// Full outer join.
    Outer,
    Left,
    Right,
    Semi,
    /// A join operator the front end could not classify.
    Invalid,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join_str = match self {
            JoinType::Inner => "JOIN",
            JoinType::Outer => "FULL OUTER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Semi => "SEMI JOIN",
            JoinType::Invalid => "INVALID JOIN",
        };
        write!(f, "{}", join_str)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JoinDefinition {
    pub join_type: JoinType,
    pub left: TableRef,
    pub right: TableRef,
    pub condition: Option<Expression>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expression>>),
    Select(Box<SelectStatement>),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InsertStatement {
    pub table: TableName,
    /// Empty when the statement names no target columns.
    pub columns: Vec<String>,
    pub source: InsertSource,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeleteStatement {
    pub table: TableName,
    pub expr: Option<Expression>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UpdateClause {
    pub column: String,
    pub value: Expression,
}

impl fmt::Display for UpdateClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UpdateStatement {
    pub table: TableName,
    pub updates: Vec<UpdateClause>,
    pub where_clause: Option<Expression>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateStatement {
    pub table: TableName,
    pub columns: Vec<Attribute>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DropStatement {
    pub tables: Vec<TableName>,
    pub if_exists: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrepareStatement {
    pub name: String,
    pub statement: Box<Statement>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecuteStatement {
    pub name: String,
    pub parameters: Vec<Expression>,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionKind {
    Begin,
    Commit,
    Rollback,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TransactionStatement {
    pub kind: TransactionKind,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CopyStatement {
    pub table: TableName,
    pub columns: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalyzeStatement {
    pub table: Option<TableName>,
    pub columns: Vec<String>,
}

fn write_alias(f: &mut fmt::Formatter<'_>, alias: &Option<String>) -> fmt::Result {
    match alias {
        Some(alias) => write!(f, " AS {}", alias),
        None => Ok(()),
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableRef::Table { name, alias } => {
                write!(f, "{}", name)?;
                write_alias(f, alias)
            }
            TableRef::Select { select, alias } => {
                write!(f, "({})", select)?;
                write_alias(f, alias)
            }
            TableRef::Join(join) => {
                write!(f, "{} {} {}", join.left, join.join_type, join.right)?;
                match &join.condition {
                    Some(cond) => write!(f, " ON {}", cond),
                    None => Ok(()),
                }
            }
            TableRef::CrossProduct(list) => {
                for (i, table_ref) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", table_ref)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.select_distinct {
            write!(f, "DISTINCT ")?;
        }
        for (i, item) in self.select_list.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item.expr)?;
            write_alias(f, &item.alias)?;
        }
        if let Some(from) = &self.from_table {
            write!(f, " FROM {}", from)?;
        }
        if let Some(pred) = &self.where_clause {
            write!(f, " WHERE {}", pred)?;
        }
        if let Some(group_by) = &self.group_by {
            let columns: Vec<String> = group_by.columns.iter().map(|c| c.to_string()).collect();
            write!(f, " GROUP BY {}", columns.join(", "))?;
            if let Some(having) = &group_by.having {
                write!(f, " HAVING {}", having)?;
            }
        }
        if let Some(limit) = &self.limit {
            if let Some(n) = limit.limit {
                write!(f, " LIMIT {}", n)?;
            }
            if limit.offset > 0 {
                write!(f, " OFFSET {}", limit.offset)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_select_display() {
        let select = SelectStatement {
            select_list: vec![SelectItem {
                expr: Expression::column(Some("d"), "k"),
                alias: Some(String::from("key")),
            }],
            from_table: Some(TableRef::Join(Box::new(JoinDefinition {
                join_type: JoinType::Left,
                left: TableRef::table("a", None),
                right: TableRef::table("b", Some("d")),
                condition: Some(Expression::eq(
                    Expression::column(Some("a"), "x"),
                    Expression::column(Some("d"), "k"),
                )),
            }))),
            where_clause: None,
            group_by: None,
            order_by: vec![],
            limit: Some(LimitDescription {
                limit: Some(3),
                offset: 0,
            }),
            select_distinct: true,
        };
        assert_eq!(
            select.to_string(),
            "SELECT DISTINCT d.k AS key FROM a LEFT JOIN b AS d ON a.x = d.k LIMIT 3"
        );
    }

    #[test]
    fn test_has_aggregate() {
        let mut select = SelectStatement::default();
        select.select_list.push(SelectItem::new(Expression::column(None, "a")));
        assert!(!select.has_aggregate());
        select.select_list.push(SelectItem::new(Expression::Function(FunctionCall {
            name: String::from("sum"),
            args: vec![Expression::column(None, "b")],
            distinct: false,
        })));
        assert!(select.has_aggregate());
    }
}
