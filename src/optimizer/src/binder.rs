use common::ast::*;
use common::catalog::Catalog;
use common::ids::TransactionId;
use common::table::TableHandle;
use common::CrustyError;
use log::trace;

/// Columns one FROM entry makes visible.
#[derive(Debug, Clone)]
struct ScopeTable {
    alias: String,
    columns: Vec<String>,
}

/// FROM entries of one select, chained to the select it is nested in.
struct BindScope<'p> {
    tables: Vec<ScopeTable>,
    parent: Option<&'p BindScope<'p>>,
}

impl<'p> BindScope<'p> {
    fn new(parent: Option<&'p BindScope<'p>>) -> Self {
        Self {
            tables: Vec::new(),
            parent,
        }
    }

    fn add_table(&mut self, alias: String, columns: Vec<String>) -> Result<(), CrustyError> {
        if self.tables.iter().any(|t| t.alias == alias) {
            return Err(CrustyError::ValidationError(format!(
                "table name \"{}\" specified more than once",
                alias
            )));
        }
        self.tables.push(ScopeTable { alias, columns });
        Ok(())
    }

    /// Scope holding only the entries added from `start` on, with the same parent.
    fn view_from(&self, start: usize) -> BindScope<'p> {
        BindScope {
            tables: self.tables[start..].to_vec(),
            parent: self.parent,
        }
    }

    /// Given a column reference, figure out which FROM entry provides it.
    ///
    /// Unqualified names are looked up in the innermost scope first and then in
    /// enclosing ones. Returns the reference qualified with the entry's alias.
    fn resolve(&self, col: &ColumnRef) -> Result<ColumnRef, CrustyError> {
        let mut scope = Some(self);
        match &col.table {
            Some(table) => {
                while let Some(s) = scope {
                    if let Some(entry) = s.tables.iter().find(|t| t.alias == *table) {
                        if entry.columns.contains(&col.column) {
                            return Ok(col.clone());
                        }
                        return Err(CrustyError::ValidationError(format!(
                            "The field {} is not present in tables listed in the query",
                            col
                        )));
                    }
                    scope = s.parent;
                }
                Err(CrustyError::ValidationError(format!(
                    "missing FROM-clause entry for table \"{}\"",
                    table
                )))
            }
            None => {
                while let Some(s) = scope {
                    let mut field = None;
                    for entry in &s.tables {
                        let hits = entry.columns.iter().filter(|c| **c == col.column).count();
                        if hits > 1 || (hits == 1 && field.is_some()) {
                            return Err(CrustyError::ValidationError(format!(
                                "The field {} could refer to more than one table listed in the query",
                                col
                            )));
                        }
                        if hits == 1 {
                            field = Some(ColumnRef::new(Some(&entry.alias), &col.column));
                        }
                    }
                    if let Some(field) = field {
                        return Ok(field);
                    }
                    scope = s.parent;
                }
                Err(CrustyError::ValidationError(format!(
                    "The field {} is not present in tables listed in the query",
                    col
                )))
            }
        }
    }
}

/// Output names of a select list: the alias, else the column name.
fn output_names(select_list: &[SelectItem]) -> Vec<String> {
    select_list
        .iter()
        .filter_map(|item| match (&item.alias, &item.expr) {
            (Some(alias), _) => Some(alias.clone()),
            (None, Expression::ColumnRef(col)) => Some(col.column.clone()),
            _ => None,
        })
        .collect()
}

/// Qualifies every column reference of a statement with the alias of the table providing it.
/// Validates the tables and columns referenced using the catalog.
pub struct Binder<'a, C: Catalog> {
    /// Catalog to validate the references.
    catalog: &'a C,
    tid: TransactionId,
}

impl<'a, C: 'a + Catalog> Binder<'a, C> {
    pub fn new(catalog: &'a C, tid: TransactionId) -> Self {
        Self { catalog, tid }
    }

    /// Returns a bound deep copy of `statement`. Statements without expressions are copied as is.
    pub fn bind_statement(&self, statement: &Statement) -> Result<Statement, CrustyError> {
        trace!("Binding {} statement", statement.kind());
        match statement {
            Statement::Select(select) => Ok(Statement::Select(Box::new(self.bind_select(select)?))),
            Statement::Insert(insert) => {
                let source = match &insert.source {
                    InsertSource::Values(rows) => {
                        let scope = BindScope::new(None);
                        let mut bound_rows = Vec::with_capacity(rows.len());
                        for row in rows {
                            let mut bound_row = Vec::with_capacity(row.len());
                            for expr in row {
                                bound_row.push(self.bind_expr(expr, &scope)?);
                            }
                            bound_rows.push(bound_row);
                        }
                        InsertSource::Values(bound_rows)
                    }
                    InsertSource::Select(select) => {
                        InsertSource::Select(Box::new(self.bind_select(select)?))
                    }
                };
                Ok(Statement::Insert(InsertStatement {
                    table: insert.table.clone(),
                    columns: insert.columns.iter().map(|c| c.to_lowercase()).collect(),
                    source,
                }))
            }
            Statement::Delete(delete) => {
                let (scope, _) = self.target_scope(&delete.table)?;
                Ok(Statement::Delete(DeleteStatement {
                    table: delete.table.clone(),
                    expr: self.bind_optional(&delete.expr, &scope)?,
                }))
            }
            Statement::Update(update) => {
                let (scope, table) = self.target_scope(&update.table)?;
                let mut updates = Vec::with_capacity(update.updates.len());
                for clause in &update.updates {
                    let column = clause.column.to_lowercase();
                    if !table.schema.contains(&column) {
                        return Err(CrustyError::ValidationError(format!(
                            "column \"{}\" of relation \"{}\" does not exist",
                            column, table.name
                        )));
                    }
                    updates.push(UpdateClause {
                        column,
                        value: self.bind_expr(&clause.value, &scope)?,
                    });
                }
                Ok(Statement::Update(UpdateStatement {
                    table: update.table.clone(),
                    updates,
                    where_clause: self.bind_optional(&update.where_clause, &scope)?,
                }))
            }
            other => Ok(other.clone()),
        }
    }

    /// Binds a top-level select.
    pub fn bind_select(&self, select: &SelectStatement) -> Result<SelectStatement, CrustyError> {
        self.bind_select_in(select, None, false)
    }

    /// Scope of a DELETE or UPDATE: the target table under its own name.
    fn target_scope(&self, name: &TableName) -> Result<(BindScope<'static>, TableHandle), CrustyError> {
        let table = self
            .catalog
            .lookup_table(name.database.as_deref(), &name.name, self.tid)?;
        let mut scope = BindScope::new(None);
        scope.add_table(name.name.to_lowercase(), table.schema.column_names())?;
        Ok((scope, table))
    }

    /// Binds a select whose unresolved names may come from `parent`.
    ///
    /// # Arguments
    ///
    /// * `select` - Select to bind.
    /// * `parent` - Scope of the enclosing select for subquery expressions.
    /// * `expand_star` - Replace `*` with the qualified columns of the FROM clause.
    fn bind_select_in(
        &self,
        select: &SelectStatement,
        parent: Option<&BindScope>,
        expand_star: bool,
    ) -> Result<SelectStatement, CrustyError> {
        let mut scope = BindScope::new(parent);
        let from_table = match &select.from_table {
            Some(table_ref) => Some(self.bind_table_ref(table_ref, &mut scope)?),
            None => None,
        };

        let mut select_list = Vec::new();
        for item in &select.select_list {
            match &item.expr {
                Expression::Star if expand_star => {
                    for table in &scope.tables {
                        for column in &table.columns {
                            select_list.push(SelectItem::new(Expression::column(
                                Some(table.alias.as_str()),
                                column,
                            )));
                        }
                    }
                }
                expr => select_list.push(SelectItem {
                    expr: self.bind_expr(expr, &scope)?,
                    alias: item.alias.as_ref().map(|a| a.to_lowercase()),
                }),
            }
        }

        let where_clause = self.bind_optional(&select.where_clause, &scope)?;
        let group_by = match &select.group_by {
            Some(group_by) => {
                let mut columns = Vec::with_capacity(group_by.columns.len());
                for column in &group_by.columns {
                    columns.push(self.bind_expr(column, &scope)?);
                }
                Some(GroupByDescription {
                    columns,
                    having: self.bind_optional(&group_by.having, &scope)?,
                })
            }
            None => None,
        };

        let outputs = output_names(&select_list);
        let mut order_by = Vec::with_capacity(select.order_by.len());
        for order in &select.order_by {
            let names_output = match &order.expr {
                Expression::ColumnRef(col) => col.table.is_none() && outputs.contains(&col.column),
                _ => false,
            };
            let expr = if names_output {
                order.expr.clone()
            } else {
                self.bind_expr(&order.expr, &scope)?
            };
            order_by.push(OrderByDescription {
                expr,
                ascending: order.ascending,
            });
        }

        Ok(SelectStatement {
            select_list,
            from_table,
            where_clause,
            group_by,
            order_by,
            limit: select.limit.clone(),
            select_distinct: select.select_distinct,
        })
    }

    /// Binds one FROM entry and registers the aliases it introduces in `scope`.
    fn bind_table_ref(&self, table_ref: &TableRef, scope: &mut BindScope) -> Result<TableRef, CrustyError> {
        match table_ref {
            TableRef::Table { name, alias } => {
                let table = self
                    .catalog
                    .lookup_table(name.database.as_deref(), &name.name, self.tid)?;
                let alias = alias.as_ref().unwrap_or(&name.name).to_lowercase();
                scope.add_table(alias.clone(), table.schema.column_names())?;
                Ok(TableRef::Table {
                    name: name.clone(),
                    alias: Some(alias),
                })
            }
            TableRef::Select { select, alias } => {
                let alias = alias
                    .as_ref()
                    .ok_or_else(|| {
                        CrustyError::ValidationError(String::from(
                            "subquery in FROM must have an alias",
                        ))
                    })?
                    .to_lowercase();
                let bound = self.bind_select_in(select, None, true)?;
                scope.add_table(alias.clone(), output_names(&bound.select_list))?;
                Ok(TableRef::Select {
                    select: Box::new(bound),
                    alias: Some(alias),
                })
            }
            TableRef::Join(join) => {
                let start = scope.tables.len();
                let left = self.bind_table_ref(&join.left, scope)?;
                let right = self.bind_table_ref(&join.right, scope)?;
                // ON only sees the two sides of its own join.
                let condition = match &join.condition {
                    Some(cond) => Some(self.bind_expr(cond, &scope.view_from(start))?),
                    None => None,
                };
                Ok(TableRef::Join(Box::new(JoinDefinition {
                    join_type: join.join_type,
                    left,
                    right,
                    condition,
                })))
            }
            TableRef::CrossProduct(list) => {
                let mut bound = Vec::with_capacity(list.len());
                for item in list {
                    bound.push(self.bind_table_ref(item, scope)?);
                }
                Ok(TableRef::CrossProduct(bound))
            }
        }
    }

    fn bind_optional(
        &self,
        expr: &Option<Expression>,
        scope: &BindScope,
    ) -> Result<Option<Expression>, CrustyError> {
        match expr {
            Some(expr) => Ok(Some(self.bind_expr(expr, scope)?)),
            None => Ok(None),
        }
    }

    fn bind_expr(&self, expr: &Expression, scope: &BindScope) -> Result<Expression, CrustyError> {
        let mut bound = expr.clone();
        self.bind_in_place(&mut bound, scope)?;
        Ok(bound)
    }

    fn bind_in_place(&self, expr: &mut Expression, scope: &BindScope) -> Result<(), CrustyError> {
        if let Expression::ColumnRef(col) = expr {
            let resolved = scope.resolve(col)?;
            *col = resolved;
            return Ok(());
        }
        if let Expression::Subquery(select) = expr {
            let bound = self.bind_select_in(select, Some(scope), true)?;
            **select = bound;
            return Ok(());
        }
        for child in expr.children_mut() {
            self.bind_in_place(child, scope)?;
        }
        Ok(())
    }
}
