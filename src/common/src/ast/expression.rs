use super::SelectStatement;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate functions recognized in select lists.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AggOp {
    Avg,
    Count,
    Max,
    Min,
    Sum,
}

impl AggOp {
    /// Maps a function name to its aggregate, if it is one.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "avg" => Some(AggOp::Avg),
            "count" => Some(AggOp::Count),
            "max" => Some(AggOp::Max),
            "min" => Some(AggOp::Min),
            "sum" => Some(AggOp::Sum),
            _ => None,
        }
    }
}

impl fmt::Display for AggOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            AggOp::Avg => "avg",
            AggOp::Count => "count",
            AggOp::Max => "max",
            AggOp::Min => "min",
            AggOp::Sum => "sum",
        };
        write!(f, "{}", op_str)
    }
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConjunctionKind {
    And,
    Or,
}

impl fmt::Display for ConjunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConjunctionKind::And => write!(f, "AND"),
            ConjunctionKind::Or => write!(f, "OR"),
        }
    }
}

/// Binary predicates producing a boolean.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Like,
    NotLike,
    /// Right operand is a subquery.
    In,
    NotIn,
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessThanOrEqual => "<=",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterThanOrEqual => ">=",
            ComparisonOp::Like => "LIKE",
            ComparisonOp::NotLike => "NOT LIKE",
            ComparisonOp::In => "IN",
            ComparisonOp::NotIn => "NOT IN",
        };
        write!(f, "{}", op_str)
    }
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperatorKind {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Negate,
    Not,
    IsNull,
    IsNotNull,
    /// Single subquery child.
    Exists,
    /// First child is the tested value, the rest the list.
    InList,
    NotInList,
    /// Children are value, low, high.
    Between,
    NotBetween,
}

impl OperatorKind {
    fn arithmetic_symbol(self) -> Option<&'static str> {
        match self {
            OperatorKind::Plus => Some("+"),
            OperatorKind::Minus => Some("-"),
            OperatorKind::Multiply => Some("*"),
            OperatorKind::Divide => Some("/"),
            OperatorKind::Modulo => Some("%"),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Lowercase table alias, filled in by binding when the query leaves it out.
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: Option<&str>, column: &str) -> Self {
        Self {
            table: table.map(|t| t.to_lowercase()),
            column: column.to_lowercase(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum ConstantValue {
    Integer(i64),
    /// Kept as written to avoid float rounding.
    Decimal(String),
    String(String),
    Boolean(bool),
    Null,
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Integer(i) => write!(f, "{}", i),
            ConstantValue::Decimal(d) => write!(f, "{}", d),
            ConstantValue::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            ConstantValue::Boolean(true) => write!(f, "TRUE"),
            ConstantValue::Boolean(false) => write!(f, "FALSE"),
            ConstantValue::Null => write!(f, "NULL"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// Lowercase function name.
    pub name: String,
    pub args: Vec<Expression>,
    pub distinct: bool,
}

impl FunctionCall {
    /// The aggregate this call computes, if any.
    pub fn aggregate(&self) -> Option<AggOp> {
        AggOp::from_name(&self.name)
    }
}

/// Scalar and boolean expressions.
///
/// Every node owns its children, so `clone` is a deep copy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Expression {
    Conjunction {
        kind: ConjunctionKind,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Operator {
        op: OperatorKind,
        children: Vec<Expression>,
    },
    ColumnRef(ColumnRef),
    Constant(ConstantValue),
    Star,
    Function(FunctionCall),
    Subquery(Box<SelectStatement>),
}

impl Expression {
    pub fn column(table: Option<&str>, column: &str) -> Self {
        Expression::ColumnRef(ColumnRef::new(table, column))
    }

    pub fn int(value: i64) -> Self {
        Expression::Constant(ConstantValue::Integer(value))
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::Conjunction {
            kind: ConjunctionKind::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Conjunction {
            kind: ConjunctionKind::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Expression::compare(ComparisonOp::Equal, left, right)
    }

    /// Direct children, not descending into subquery bodies.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Conjunction { left, right, .. }
            | Expression::Comparison { left, right, .. } => vec![&**left, &**right],
            Expression::Operator { children, .. } => children.iter().collect(),
            Expression::Function(func) => func.args.iter().collect(),
            Expression::ColumnRef(_)
            | Expression::Constant(_)
            | Expression::Star
            | Expression::Subquery(_) => Vec::new(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expression> {
        match self {
            Expression::Conjunction { left, right, .. }
            | Expression::Comparison { left, right, .. } => vec![&mut **left, &mut **right],
            Expression::Operator { children, .. } => children.iter_mut().collect(),
            Expression::Function(func) => func.args.iter_mut().collect(),
            Expression::ColumnRef(_)
            | Expression::Constant(_)
            | Expression::Star
            | Expression::Subquery(_) => Vec::new(),
        }
    }

    /// Whether an aggregate call appears anywhere outside nested subqueries.
    pub fn contains_aggregate(&self) -> bool {
        if let Expression::Function(func) = self {
            if func.aggregate().is_some() {
                return true;
            }
        }
        self.children().iter().any(|child| child.contains_aggregate())
    }

    /// Whether a subquery appears anywhere in the expression.
    pub fn has_subquery(&self) -> bool {
        matches!(self, Expression::Subquery(_)) || self.children().iter().any(|c| c.has_subquery())
    }

    /// Column references outside nested subqueries, in left-to-right order.
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        let mut refs = Vec::new();
        self.collect_column_refs(&mut refs);
        refs
    }

    fn collect_column_refs<'a>(&'a self, refs: &mut Vec<&'a ColumnRef>) {
        if let Expression::ColumnRef(col) = self {
            refs.push(col);
        }
        for child in self.children() {
            child.collect_column_refs(refs);
        }
    }

    fn needs_parens_under(&self, parent: &Expression) -> bool {
        match (parent, self) {
            (
                Expression::Conjunction { kind: outer, .. },
                Expression::Conjunction { kind: inner, .. },
            ) => outer != inner,
            (Expression::Conjunction { .. }, _) => false,
            (_, Expression::Conjunction { .. }) | (_, Expression::Comparison { .. }) => true,
            (Expression::Comparison { .. }, _) => false,
            (_, Expression::Operator { op, .. }) => op.arithmetic_symbol().is_some(),
            _ => false,
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, child: &Expression, parent: &Expression) -> fmt::Result {
    if child.needs_parens_under(parent) {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Conjunction { kind, left, right } => {
                write_operand(f, left, self)?;
                write!(f, " {} ", kind)?;
                write_operand(f, right, self)
            }
            Expression::Comparison { op, left, right } => {
                write_operand(f, left, self)?;
                write!(f, " {} ", op)?;
                write_operand(f, right, self)
            }
            Expression::Operator { op, children } => match (op, children.as_slice()) {
                (_, [l, r]) if op.arithmetic_symbol().is_some() => {
                    write_operand(f, l, self)?;
                    write!(f, " {} ", op.arithmetic_symbol().unwrap_or("?"))?;
                    write_operand(f, r, self)
                }
                (OperatorKind::Negate, [e]) => {
                    write!(f, "-")?;
                    write_operand(f, e, self)
                }
                (OperatorKind::Not, [e]) => {
                    write!(f, "NOT ")?;
                    write_operand(f, e, self)
                }
                (OperatorKind::IsNull, [e]) => {
                    write_operand(f, e, self)?;
                    write!(f, " IS NULL")
                }
                (OperatorKind::IsNotNull, [e]) => {
                    write_operand(f, e, self)?;
                    write!(f, " IS NOT NULL")
                }
                (OperatorKind::Exists, [e]) => write!(f, "EXISTS {}", e),
                (OperatorKind::InList, [e, list @ ..]) | (OperatorKind::NotInList, [e, list @ ..]) => {
                    write_operand(f, e, self)?;
                    if *op == OperatorKind::NotInList {
                        write!(f, " NOT")?;
                    }
                    write!(f, " IN (")?;
                    write_list(f, list)?;
                    write!(f, ")")
                }
                (OperatorKind::Between, [e, low, high]) | (OperatorKind::NotBetween, [e, low, high]) => {
                    write_operand(f, e, self)?;
                    if *op == OperatorKind::NotBetween {
                        write!(f, " NOT")?;
                    }
                    write!(f, " BETWEEN ")?;
                    write_operand(f, low, self)?;
                    write!(f, " AND ")?;
                    write_operand(f, high, self)
                }
                _ => {
                    write!(f, "{:?}(", op)?;
                    write_list(f, children)?;
                    write!(f, ")")
                }
            },
            Expression::ColumnRef(col) => write!(f, "{}", col),
            Expression::Constant(value) => write!(f, "{}", value),
            Expression::Star => write!(f, "*"),
            Expression::Function(func) => {
                write!(f, "{}(", func.name)?;
                if func.distinct {
                    write!(f, "DISTINCT ")?;
                }
                write_list(f, &func.args)?;
                write!(f, ")")
            }
            Expression::Subquery(select) => write!(f, "({})", select),
        }
    }
}
