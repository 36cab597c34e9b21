//! SQL front end: parses text with `sqlparser` and converts its tree into [`crate::ast`].

use crate::ast::*;
use crate::{get_attr, get_name, Attribute, CrustyError};
use log::debug;
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Parser for the SQL dialect the planner accepts.
pub struct SQLParser {
    dialect: GenericDialect,
}

impl Default for SQLParser {
    fn default() -> Self {
        SQLParser::new()
    }
}

impl SQLParser {
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// Parses every statement in `sql`.
    ///
    /// # Arguments
    ///
    /// * `sql` - One or more SQL statements separated by semicolons.
    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>, CrustyError> {
        let statements = Parser::parse_sql(&self.dialect, sql.to_string())?;
        debug!("Parsed {} statement(s)", statements.len());
        statements.iter().map(convert_statement).collect()
    }

    /// Parses text that must contain exactly one statement.
    pub fn parse_one(&self, sql: &str) -> Result<Statement, CrustyError> {
        let mut statements = self.parse(sql)?;
        match statements.len() {
            1 => Ok(statements.remove(0)),
            n => Err(CrustyError::ValidationError(format!(
                "expected one statement, found {}",
                n
            ))),
        }
    }
}

fn unsupported(what: &str) -> CrustyError {
    CrustyError::ValidationError(format!("{} not supported", what))
}

fn convert_table_name(name: &sqlast::ObjectName) -> Result<TableName, CrustyError> {
    match name.0.as_slice() {
        [table] => Ok(TableName::new(table)),
        [database, table] => Ok(TableName {
            database: Some(database.to_lowercase()),
            name: table.to_lowercase(),
        }),
        _ => Err(CrustyError::ValidationError(format!(
            "invalid table name {}",
            name
        ))),
    }
}

fn lowercase_all(idents: &[sqlast::Ident]) -> Vec<String> {
    idents.iter().map(|i| i.to_lowercase()).collect()
}

/// Converts one `sqlparser` statement.
pub fn convert_statement(statement: &sqlast::Statement) -> Result<Statement, CrustyError> {
    match statement {
        sqlast::Statement::Query(query) => Ok(Statement::Select(Box::new(convert_query(query)?))),
        sqlast::Statement::Insert {
            table_name,
            columns,
            source,
            ..
        } => {
            let source = match &source.body {
                sqlast::SetExpr::Values(values) => {
                    let rows = values
                        .0
                        .iter()
                        .map(|row| row.iter().map(convert_expr).collect())
                        .collect::<Result<Vec<Vec<Expression>>, CrustyError>>()?;
                    InsertSource::Values(rows)
                }
                _ => InsertSource::Select(Box::new(convert_query(source)?)),
            };
            Ok(Statement::Insert(InsertStatement {
                table: convert_table_name(table_name)?,
                columns: lowercase_all(columns),
                source,
            }))
        }
        sqlast::Statement::Update {
            table_name,
            assignments,
            selection,
            ..
        } => {
            let updates = assignments
                .iter()
                .map(|a| {
                    Ok(UpdateClause {
                        column: a.id.to_lowercase(),
                        value: convert_expr(&a.value)?,
                    })
                })
                .collect::<Result<Vec<_>, CrustyError>>()?;
            Ok(Statement::Update(UpdateStatement {
                table: convert_table_name(table_name)?,
                updates,
                where_clause: convert_optional_expr(selection)?,
            }))
        }
        sqlast::Statement::Delete {
            table_name,
            selection,
            ..
        } => Ok(Statement::Delete(DeleteStatement {
            table: convert_table_name(table_name)?,
            expr: convert_optional_expr(selection)?,
        })),
        sqlast::Statement::CreateTable { name, columns, .. } => {
            let mut attrs = Vec::new();
            for col in columns {
                attrs.push(Attribute::new(col.name.to_lowercase(), get_attr(&col.data_type)?));
            }
            Ok(Statement::Create(CreateStatement {
                table: convert_table_name(name)?,
                columns: attrs,
            }))
        }
        sqlast::Statement::Drop {
            names, if_exists, ..
        } => Ok(Statement::Drop(DropStatement {
            tables: names
                .iter()
                .map(convert_table_name)
                .collect::<Result<Vec<_>, CrustyError>>()?,
            if_exists: *if_exists,
        })),
        sqlast::Statement::Copy {
            table_name,
            columns,
            ..
        } => Ok(Statement::Copy(CopyStatement {
            table: convert_table_name(table_name)?,
            columns: lowercase_all(columns),
        })),
        sqlast::Statement::StartTransaction { .. } => Ok(Statement::Transaction(TransactionStatement {
            kind: TransactionKind::Begin,
        })),
        sqlast::Statement::Commit { .. } => Ok(Statement::Transaction(TransactionStatement {
            kind: TransactionKind::Commit,
        })),
        sqlast::Statement::Rollback { .. } => Ok(Statement::Transaction(TransactionStatement {
            kind: TransactionKind::Rollback,
        })),
        _ => Err(unsupported(&format!("statement {}", statement))),
    }
}

fn convert_query(query: &sqlast::Query) -> Result<SelectStatement, CrustyError> {
    if !query.ctes.is_empty() {
        return Err(unsupported("WITH clause"));
    }
    let mut select = match &query.body {
        sqlast::SetExpr::Select(select) => convert_select(select)?,
        sqlast::SetExpr::Query(inner) => convert_query(inner)?,
        sqlast::SetExpr::SetOperation { .. } => return Err(unsupported("set operation")),
        _ => return Err(unsupported("VALUES outside of INSERT")),
    };
    if !query.order_by.is_empty() {
        select.order_by = query
            .order_by
            .iter()
            .map(|o| {
                Ok(OrderByDescription {
                    expr: convert_expr(&o.expr)?,
                    ascending: o.asc.unwrap_or(true),
                })
            })
            .collect::<Result<Vec<_>, CrustyError>>()?;
    }
    if query.limit.is_some() || query.offset.is_some() {
        let limit = match &query.limit {
            Some(expr) => Some(convert_count(expr)?),
            None => None,
        };
        let offset = match &query.offset {
            Some(expr) => convert_count(expr)?,
            None => 0,
        };
        select.limit = Some(LimitDescription { limit, offset });
    }
    Ok(select)
}

fn convert_count(expr: &sqlast::Expr) -> Result<u64, CrustyError> {
    match expr {
        sqlast::Expr::Value(sqlast::Value::Number(n)) => n.parse::<u64>().map_err(|_| {
            CrustyError::ValidationError(format!("{} is not a valid row count", n))
        }),
        _ => Err(CrustyError::ValidationError(format!(
            "{} is not a valid row count",
            expr
        ))),
    }
}

fn convert_select(select: &sqlast::Select) -> Result<SelectStatement, CrustyError> {
    let mut select_list = Vec::new();
    for item in &select.projection {
        match item {
            sqlast::SelectItem::UnnamedExpr(expr) => {
                select_list.push(SelectItem::new(convert_expr(expr)?))
            }
            sqlast::SelectItem::ExprWithAlias { expr, alias } => select_list.push(SelectItem {
                expr: convert_expr(expr)?,
                alias: Some(alias.to_lowercase()),
            }),
            sqlast::SelectItem::Wildcard => select_list.push(SelectItem::new(Expression::Star)),
            _ => return Err(unsupported("qualified wildcard")),
        }
    }

    let having = convert_optional_expr(&select.having)?;
    let group_by = if select.group_by.is_empty() {
        if having.is_some() {
            return Err(unsupported("HAVING without GROUP BY"));
        }
        None
    } else {
        let columns = select
            .group_by
            .iter()
            .map(convert_expr)
            .collect::<Result<Vec<_>, CrustyError>>()?;
        Some(GroupByDescription { columns, having })
    };

    let mut from = select
        .from
        .iter()
        .map(convert_table_with_joins)
        .collect::<Result<Vec<_>, CrustyError>>()?;
    let from_table = match from.len() {
        0 | 1 => from.pop(),
        _ => Some(TableRef::CrossProduct(from)),
    };

    Ok(SelectStatement {
        select_list,
        from_table,
        where_clause: convert_optional_expr(&select.selection)?,
        group_by,
        order_by: Vec::new(),
        limit: None,
        select_distinct: select.distinct,
    })
}

/// Folds `a JOIN b JOIN c` into `(a JOIN b) JOIN c`.
fn convert_table_with_joins(table: &sqlast::TableWithJoins) -> Result<TableRef, CrustyError> {
    let mut table_ref = convert_table_factor(&table.relation)?;
    for join in &table.joins {
        let right = convert_table_factor(&join.relation)?;
        let (join_type, condition) = match &join.join_operator {
            sqlast::JoinOperator::Inner(constraint) => {
                (JoinType::Inner, convert_join_constraint(constraint)?)
            }
            sqlast::JoinOperator::LeftOuter(constraint) => {
                (JoinType::Left, convert_join_constraint(constraint)?)
            }
            sqlast::JoinOperator::RightOuter(constraint) => {
                (JoinType::Right, convert_join_constraint(constraint)?)
            }
            sqlast::JoinOperator::FullOuter(constraint) => {
                (JoinType::Outer, convert_join_constraint(constraint)?)
            }
            sqlast::JoinOperator::CrossJoin => (JoinType::Inner, None),
            _ => (JoinType::Invalid, None),
        };
        table_ref = TableRef::Join(Box::new(JoinDefinition {
            join_type,
            left: table_ref,
            right,
            condition,
        }));
    }
    Ok(table_ref)
}

fn convert_join_constraint(
    constraint: &sqlast::JoinConstraint,
) -> Result<Option<Expression>, CrustyError> {
    match constraint {
        sqlast::JoinConstraint::On(expr) => Ok(Some(convert_expr(expr)?)),
        _ => Err(unsupported("USING and NATURAL joins")),
    }
}

fn convert_table_factor(factor: &sqlast::TableFactor) -> Result<TableRef, CrustyError> {
    match factor {
        sqlast::TableFactor::Table { name, alias, .. } => Ok(TableRef::Table {
            name: convert_table_name(name)?,
            alias: convert_table_alias(alias)?,
        }),
        sqlast::TableFactor::Derived {
            subquery, alias, ..
        } => Ok(TableRef::Select {
            select: Box::new(convert_query(subquery)?),
            alias: convert_table_alias(alias)?,
        }),
        sqlast::TableFactor::NestedJoin(inner) => convert_table_with_joins(inner),
        #[allow(unreachable_patterns)]
        _ => Err(unsupported("table expression")),
    }
}

fn convert_table_alias(alias: &Option<sqlast::TableAlias>) -> Result<Option<String>, CrustyError> {
    match alias {
        Some(alias) if !alias.columns.is_empty() => Err(unsupported("column aliases in FROM")),
        Some(alias) => Ok(Some(alias.name.to_lowercase())),
        None => Ok(None),
    }
}

fn convert_optional_expr(expr: &Option<sqlast::Expr>) -> Result<Option<Expression>, CrustyError> {
    match expr {
        Some(expr) => Ok(Some(convert_expr(expr)?)),
        None => Ok(None),
    }
}

fn operator(op: OperatorKind, children: Vec<Expression>) -> Expression {
    Expression::Operator { op, children }
}

/// Converts one `sqlparser` expression.
pub fn convert_expr(expr: &sqlast::Expr) -> Result<Expression, CrustyError> {
    match expr {
        sqlast::Expr::Identifier(name) => Ok(Expression::column(None, name)),
        sqlast::Expr::CompoundIdentifier(names) => match names.as_slice() {
            [table, column] => Ok(Expression::column(Some(table), column)),
            _ => Err(CrustyError::ValidationError(format!(
                "invalid column reference {}",
                expr
            ))),
        },
        sqlast::Expr::Wildcard => Ok(Expression::Star),
        sqlast::Expr::IsNull(inner) => Ok(operator(OperatorKind::IsNull, vec![convert_expr(inner)?])),
        sqlast::Expr::IsNotNull(inner) => {
            Ok(operator(OperatorKind::IsNotNull, vec![convert_expr(inner)?]))
        }
        sqlast::Expr::InList {
            expr: lhs,
            list,
            negated,
        } => {
            let mut children = vec![convert_expr(lhs)?];
            for item in list {
                children.push(convert_expr(item)?);
            }
            let op = if *negated {
                OperatorKind::NotInList
            } else {
                OperatorKind::InList
            };
            Ok(operator(op, children))
        }
        sqlast::Expr::InSubquery {
            expr: lhs,
            subquery,
            negated,
        } => {
            let op = if *negated {
                ComparisonOp::NotIn
            } else {
                ComparisonOp::In
            };
            Ok(Expression::compare(
                op,
                convert_expr(lhs)?,
                Expression::Subquery(Box::new(convert_query(subquery)?)),
            ))
        }
        sqlast::Expr::Between {
            expr: value,
            negated,
            low,
            high,
        } => {
            let op = if *negated {
                OperatorKind::NotBetween
            } else {
                OperatorKind::Between
            };
            Ok(operator(
                op,
                vec![convert_expr(value)?, convert_expr(low)?, convert_expr(high)?],
            ))
        }
        sqlast::Expr::BinaryOp { left, op, right } => {
            let left = convert_expr(left)?;
            let right = convert_expr(right)?;
            let comparison = match op {
                sqlast::BinaryOperator::Eq => Some(ComparisonOp::Equal),
                sqlast::BinaryOperator::NotEq => Some(ComparisonOp::NotEqual),
                sqlast::BinaryOperator::Lt => Some(ComparisonOp::LessThan),
                sqlast::BinaryOperator::LtEq => Some(ComparisonOp::LessThanOrEqual),
                sqlast::BinaryOperator::Gt => Some(ComparisonOp::GreaterThan),
                sqlast::BinaryOperator::GtEq => Some(ComparisonOp::GreaterThanOrEqual),
                sqlast::BinaryOperator::Like => Some(ComparisonOp::Like),
                sqlast::BinaryOperator::NotLike => Some(ComparisonOp::NotLike),
                _ => None,
            };
            if let Some(cmp) = comparison {
                return Ok(Expression::compare(cmp, left, right));
            }
            let arithmetic = match op {
                sqlast::BinaryOperator::Plus => OperatorKind::Plus,
                sqlast::BinaryOperator::Minus => OperatorKind::Minus,
                sqlast::BinaryOperator::Multiply => OperatorKind::Multiply,
                sqlast::BinaryOperator::Divide => OperatorKind::Divide,
                sqlast::BinaryOperator::Modulus => OperatorKind::Modulo,
                sqlast::BinaryOperator::And => return Ok(Expression::and(left, right)),
                sqlast::BinaryOperator::Or => return Ok(Expression::or(left, right)),
                _ => return Err(unsupported(&format!("operator {}", op))),
            };
            Ok(operator(arithmetic, vec![left, right]))
        }
        sqlast::Expr::UnaryOp { op, expr: inner } => {
            let inner = convert_expr(inner)?;
            match op {
                sqlast::UnaryOperator::Not => Ok(operator(OperatorKind::Not, vec![inner])),
                sqlast::UnaryOperator::Minus => Ok(operator(OperatorKind::Negate, vec![inner])),
                sqlast::UnaryOperator::Plus => Ok(inner),
                #[allow(unreachable_patterns)]
                _ => Err(unsupported(&format!("operator {}", op))),
            }
        }
        sqlast::Expr::Nested(inner) => convert_expr(inner),
        sqlast::Expr::Value(value) => Ok(Expression::Constant(convert_value(value)?)),
        sqlast::Expr::Function(func) => {
            let args = func
                .args
                .iter()
                .map(convert_expr)
                .collect::<Result<Vec<_>, CrustyError>>()?;
            Ok(Expression::Function(FunctionCall {
                name: get_name(&func.name)?,
                args,
                distinct: func.distinct,
            }))
        }
        sqlast::Expr::Exists(query) => Ok(operator(
            OperatorKind::Exists,
            vec![Expression::Subquery(Box::new(convert_query(query)?))],
        )),
        sqlast::Expr::Subquery(query) => Ok(Expression::Subquery(Box::new(convert_query(query)?))),
        _ => Err(unsupported(&format!("expression {}", expr))),
    }
}

fn convert_value(value: &sqlast::Value) -> Result<ConstantValue, CrustyError> {
    match value {
        sqlast::Value::Number(n) => match n.parse::<i64>() {
            Ok(i) => Ok(ConstantValue::Integer(i)),
            Err(_) => Ok(ConstantValue::Decimal(n.clone())),
        },
        sqlast::Value::SingleQuotedString(s) => Ok(ConstantValue::String(s.clone())),
        sqlast::Value::Boolean(b) => Ok(ConstantValue::Boolean(*b)),
        sqlast::Value::Null => Ok(ConstantValue::Null),
        _ => Err(unsupported(&format!("literal {}", value))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_select(sql: &str) -> SelectStatement {
        match SQLParser::new().parse_one(sql).unwrap() {
            Statement::Select(select) => *select,
            other => panic!("expected select, got {:?}", other),
        }
    }

    #[test]
    fn test_implicit_join_list() {
        let select = parse_select("SELECT * FROM a, b AS bb WHERE a.x = bb.y AND a.z = 1");
        assert_eq!(select.select_list, vec![SelectItem::new(Expression::Star)]);
        assert_eq!(
            select.from_table,
            Some(TableRef::CrossProduct(vec![
                TableRef::table("a", None),
                TableRef::table("b", Some("bb")),
            ]))
        );
        assert_eq!(
            select.where_clause.unwrap().to_string(),
            "a.x = bb.y AND a.z = 1"
        );
    }

    #[test]
    fn test_explicit_joins_fold_left() {
        let select =
            parse_select("SELECT a.x FROM a JOIN b ON a.x = b.y LEFT JOIN c ON b.y = c.w");
        let outer = match select.from_table {
            Some(TableRef::Join(join)) => join,
            other => panic!("expected join, got {:?}", other),
        };
        assert_eq!(outer.join_type, JoinType::Left);
        assert_eq!(outer.right, TableRef::table("c", None));
        match &outer.left {
            TableRef::Join(inner) => {
                assert_eq!(inner.join_type, JoinType::Inner);
                assert_eq!(inner.left, TableRef::table("a", None));
                assert_eq!(inner.condition.as_ref().unwrap().to_string(), "a.x = b.y");
            }
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn test_derived_table_and_group_by() {
        let select = parse_select(
            "SELECT d.k, COUNT(*) AS n FROM (SELECT id AS k FROM t) d GROUP BY d.k HAVING COUNT(*) > 1",
        );
        assert_eq!(select.select_list[1].alias, Some(String::from("n")));
        assert!(select.has_aggregate());
        let group_by = select.group_by.unwrap();
        assert_eq!(group_by.columns, vec![Expression::column(Some("d"), "k")]);
        assert_eq!(group_by.having.unwrap().to_string(), "count(*) > 1");
        match select.from_table {
            Some(TableRef::Select { select, alias }) => {
                assert_eq!(alias, Some(String::from("d")));
                assert_eq!(select.select_list[0].alias, Some(String::from("k")));
            }
            other => panic!("expected derived table, got {:?}", other),
        }
    }

    #[test]
    fn test_limit_and_distinct() {
        let select = parse_select("SELECT DISTINCT a FROM t ORDER BY a DESC LIMIT 10");
        assert!(select.select_distinct);
        assert_eq!(
            select.limit,
            Some(LimitDescription {
                limit: Some(10),
                offset: 0
            })
        );
        assert_eq!(select.order_by.len(), 1);
        assert!(!select.order_by[0].ascending);
    }

    #[test]
    fn test_insert_values() {
        let statement = SQLParser::new()
            .parse_one("INSERT INTO T (a, b) VALUES (1, 'x'), (2, NULL)")
            .unwrap();
        match statement {
            Statement::Insert(insert) => {
                assert_eq!(insert.table, TableName::new("t"));
                assert_eq!(insert.columns, vec![String::from("a"), String::from("b")]);
                match insert.source {
                    InsertSource::Values(rows) => {
                        assert_eq!(rows.len(), 2);
                        assert_eq!(rows[1][1], Expression::Constant(ConstantValue::Null));
                    }
                    other => panic!("expected values, got {:?}", other),
                }
            }
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_update_delete_create() {
        let parser = SQLParser::new();
        let statements = parser
            .parse(
                "UPDATE t SET x = x + 1 WHERE id = 2; DELETE FROM t WHERE x > 5; CREATE TABLE u (id INT, name VARCHAR(10))",
            )
            .unwrap();
        assert_eq!(statements.len(), 3);
        match &statements[0] {
            Statement::Update(update) => {
                assert_eq!(update.updates[0].to_string(), "x = x + 1");
                assert_eq!(update.where_clause.as_ref().unwrap().to_string(), "id = 2");
            }
            other => panic!("expected update, got {:?}", other),
        }
        assert_eq!(statements[1].kind(), "DELETE");
        match &statements[2] {
            Statement::Create(create) => {
                assert_eq!(create.table.name, "u");
                assert_eq!(create.columns[1].dtype, crate::DataType::String);
            }
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_sql() {
        assert!(matches!(
            SQLParser::new().parse("SELEC * FROM"),
            Err(CrustyError::ParseError(_))
        ));
        assert!(SQLParser::new().parse_one("SELECT 1; SELECT 2").is_err());
    }
}
