//! Predicate decomposition, classification, and recombination.
//!
//! WHERE and ON conditions are split into their top-level AND terms, each term
//! is annotated with the table aliases it references, and terms are handed out
//! to the lowest operator whose inputs cover those aliases.

use common::ast::{ConjunctionKind, Expression, SelectItem, SelectStatement, TableRef};
use common::CrustyError;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Lowercase table aliases an expression references.
pub type TableAliasSet = HashSet<String>;

/// A conjunct paired with the aliases it references.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedExpression {
    pub expr: Expression,
    pub table_alias_set: TableAliasSet,
}

impl AnnotatedExpression {
    pub fn new(expr: Expression) -> Self {
        let table_alias_set = alias_set_of(&expr);
        Self {
            expr,
            table_alias_set,
        }
    }
}

/// Conjuncts waiting to be attached to an operator.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PredicatePools {
    /// Conjuncts over exactly one alias, keyed by that alias.
    pub single_table_predicates: HashMap<String, Vec<Expression>>,
    /// Everything else, in the order the conjuncts were seen.
    pub join_predicates: Vec<AnnotatedExpression>,
}

impl PredicatePools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes each conjunct to the single-table bucket of its alias or to the join pool.
    pub fn classify(&mut self, conjuncts: Vec<Expression>) {
        for expr in conjuncts {
            let annotated = AnnotatedExpression::new(expr);
            if annotated.table_alias_set.len() == 1 {
                if let Some(alias) = annotated.table_alias_set.iter().next() {
                    self.single_table_predicates
                        .entry(alias.clone())
                        .or_insert_with(Vec::new)
                        .push(annotated.expr);
                    continue;
                }
            }
            self.join_predicates.push(annotated);
        }
    }

    /// Appends conjuncts to the join pool regardless of how many aliases they touch.
    pub fn add_join_predicates(&mut self, conjuncts: Vec<Expression>) {
        self.join_predicates
            .extend(conjuncts.into_iter().map(AnnotatedExpression::new));
    }

    /// Removes and returns the single-table conjuncts of `alias`.
    pub fn take_single_table(&mut self, alias: &str) -> Vec<Expression> {
        self.single_table_predicates
            .remove(alias)
            .unwrap_or_default()
    }

    /// Moves everything in `other` into this pool.
    pub fn append(&mut self, other: PredicatePools) {
        for (alias, mut preds) in other.single_table_predicates {
            self.single_table_predicates
                .entry(alias)
                .or_insert_with(Vec::new)
                .append(&mut preds);
        }
        self.join_predicates.extend(other.join_predicates);
    }

    /// Empties the pools. Single-table conjuncts come first, ordered by alias,
    /// then join conjuncts in pool order.
    pub fn drain_all(&mut self) -> Vec<Expression> {
        let mut aliases: Vec<String> = self.single_table_predicates.keys().cloned().collect();
        aliases.sort();
        let mut leftovers = Vec::new();
        for alias in aliases {
            leftovers.extend(self.take_single_table(&alias));
        }
        leftovers.extend(self.join_predicates.drain(..).map(|p| p.expr));
        leftovers
    }

    /// Total number of pooled conjuncts.
    pub fn len(&self) -> usize {
        self.single_table_predicates
            .values()
            .map(|v| v.len())
            .sum::<usize>()
            + self.join_predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits nested ANDs into deep copies of their terms. OR nodes are kept whole.
pub fn decompose_conjuncts(expr: &Expression) -> Vec<Expression> {
    let mut conjuncts = Vec::new();
    collect_conjuncts(expr, &mut conjuncts);
    conjuncts
}

fn collect_conjuncts(expr: &Expression, out: &mut Vec<Expression>) {
    match expr {
        Expression::Conjunction {
            kind: ConjunctionKind::And,
            left,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        _ => out.push(expr.clone()),
    }
}

/// Table aliases of every qualified column reference.
///
/// A nested subquery contributes the aliases it borrows from enclosing
/// queries, never the ones its own FROM clause binds.
pub fn alias_set_of(expr: &Expression) -> TableAliasSet {
    let mut set = TableAliasSet::new();
    collect_aliases(expr, &mut set);
    set
}

fn collect_aliases(expr: &Expression, out: &mut TableAliasSet) {
    match expr {
        Expression::ColumnRef(col) => {
            if let Some(table) = &col.table {
                out.insert(table.to_lowercase());
            }
        }
        Expression::Subquery(select) => out.extend(outer_aliases_of(select)),
        _ => {
            for child in expr.children() {
                collect_aliases(child, out);
            }
        }
    }
}

/// Aliases a select references without binding them in its own FROM clause.
pub fn outer_aliases_of(select: &SelectStatement) -> TableAliasSet {
    let mut bound = TableAliasSet::new();
    let mut referenced = TableAliasSet::new();
    if let Some(from) = &select.from_table {
        collect_from_aliases(from, &mut bound, &mut referenced);
    }
    let group_by = select.group_by.iter().flat_map(|g| g.columns.iter().chain(g.having.iter()));
    let exprs = select
        .select_list
        .iter()
        .map(|item| &item.expr)
        .chain(select.where_clause.iter())
        .chain(group_by)
        .chain(select.order_by.iter().map(|o| &o.expr));
    for expr in exprs {
        collect_aliases(expr, &mut referenced);
    }
    referenced.retain(|alias| !bound.contains(alias));
    referenced
}

/// Aliases a FROM entry binds, plus the aliases its ON conditions reference.
pub fn collect_from_aliases(table_ref: &TableRef, bound: &mut TableAliasSet, referenced: &mut TableAliasSet) {
    match table_ref {
        TableRef::Table { name, alias } => {
            bound.insert(alias.as_ref().unwrap_or(&name.name).to_lowercase());
        }
        TableRef::Select { alias, .. } => {
            if let Some(alias) = alias {
                bound.insert(alias.to_lowercase());
            }
        }
        TableRef::Join(join) => {
            collect_from_aliases(&join.left, bound, referenced);
            collect_from_aliases(&join.right, bound, referenced);
            if let Some(condition) = &join.condition {
                collect_aliases(condition, referenced);
            }
        }
        TableRef::CrossProduct(list) => {
            for entry in list {
                collect_from_aliases(entry, bound, referenced);
            }
        }
    }
}

/// Splits `conjuncts` into fresh pools.
pub fn classify(conjuncts: Vec<Expression>) -> PredicatePools {
    let mut pools = PredicatePools::new();
    pools.classify(conjuncts);
    pools
}

/// Right-folds the expressions into one AND tree. Returns `None` for no input.
pub fn combine(exprs: Vec<Expression>) -> Option<Expression> {
    let mut iter = exprs.into_iter().rev();
    let last = iter.next()?;
    Some(iter.fold(last, |acc, expr| Expression::and(expr, acc)))
}

/// Removes every pooled join conjunct whose aliases are all in `covering` and
/// combines them in pool order.
pub fn construct_join_predicate(
    covering: &TableAliasSet,
    join_predicates: &mut Vec<AnnotatedExpression>,
) -> Option<Expression> {
    let (eligible, remaining): (Vec<_>, Vec<_>) = join_predicates
        .drain(..)
        .partition(|p| p.table_alias_set.is_subset(covering));
    *join_predicates = remaining;
    combine(eligible.into_iter().map(|p| p.expr).collect())
}

/// Maps each output name of a select list to a copy of its expression.
///
/// The name is the explicit alias or, for plain column references, the column
/// name. Other unnamed items cannot be referenced from outside and are skipped.
/// When two items share a name the first one wins.
pub fn construct_select_element_map(select_list: &[SelectItem]) -> BTreeMap<String, Expression> {
    let mut map = BTreeMap::new();
    for item in select_list {
        let name = match (&item.alias, &item.expr) {
            (Some(alias), _) => alias.to_lowercase(),
            (None, Expression::ColumnRef(col)) => col.column.to_lowercase(),
            _ => continue,
        };
        map.entry(name).or_insert_with(|| item.expr.clone());
    }
    map
}

/// Rewrites a predicate over a derived table so it refers to the inner query's expressions.
///
/// # Arguments
///
/// * `alias` - Alias of the derived table.
/// * `alias_to_expr_map` - Output name to inner expression, from [`construct_select_element_map`].
/// * `predicate` - Predicate whose references to `alias` get replaced.
pub fn rewrite_derived_table_predicates(
    alias: &str,
    alias_to_expr_map: &BTreeMap<String, Expression>,
    mut predicate: Expression,
) -> Result<Expression, CrustyError> {
    rewrite_in_place(&alias.to_lowercase(), alias_to_expr_map, &mut predicate)?;
    Ok(predicate)
}

fn rewrite_in_place(
    alias: &str,
    alias_to_expr_map: &BTreeMap<String, Expression>,
    expr: &mut Expression,
) -> Result<(), CrustyError> {
    let replacement = match expr {
        Expression::ColumnRef(col) if col.table.as_deref() == Some(alias) => Some(
            alias_to_expr_map
                .get(&col.column)
                .cloned()
                .ok_or_else(|| {
                    CrustyError::ValidationError(format!(
                        "column {}.{} does not exist",
                        alias, col.column
                    ))
                })?,
        ),
        _ => None,
    };
    if let Some(inner) = replacement {
        *expr = inner;
        return Ok(());
    }
    for child in expr.children_mut() {
        rewrite_in_place(alias, alias_to_expr_map, child)?;
    }
    Ok(())
}
