// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # SQL statement representation
//!
//! This module represents the SELECT-only subset of SQL this compiler
//! ever needs to emit: the write-path statement shapes (`INSERT`,
//! `UPDATE`, `DELETE`) belong to a sibling system and have no type here.
//!
//! Expressions inside a [`SelectStatement`] are carried as pre-rendered
//! SQL text rather than as a further expression tree: by the time a
//! property tree becomes a query tree, every scalar has already been
//! translated to SQL by the C7 translation context, so there is nothing
//! left for this IR to interpret — it only assembles clauses and leaves
//! dialect-sensitive syntax (range, temp tables, identifier quoting) to
//! the driver.

use unified_fetch_driver::Driver;

/// Item in a SELECT projection list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// A rendered expression, aliased to `alias` in the output markup.
    Expr { expr: String, alias: String },
    /// `table.*`, used only for the anchor-table indirection shape.
    Wildcard { table: String },
}

/// Table reference in a FROM clause, with its joins attached.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
    pub joins: Vec<Join>,
}

impl TableRef {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            joins: Vec::new(),
        }
    }

    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }
}

/// JOIN clause. Only `INNER`/`LEFT` are representable: this spec's join
/// policy never needs `RIGHT`/`FULL`/`CROSS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    /// Rendered `ON` condition text.
    pub condition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: String,
    pub direction: SortDirection,
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub from: TableRef,
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderBy>,
    /// Applied last, via `Driver::make_ranged_select`.
    pub range: Option<(u64, u64)>,
}

impl SelectStatement {
    pub fn new(from: TableRef) -> Self {
        Self {
            distinct: false,
            projection: Vec::new(),
            from,
            where_clause: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            range: None,
        }
    }

    pub fn with_projection(mut self, projection: Vec<SelectItem>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn with_group_by(mut self, exprs: Vec<String>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn with_order_by(mut self, order_by: Vec<OrderBy>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_range(mut self, offset: u64, limit: u64) -> Self {
        self.range = Some((offset, limit));
        self
    }

    fn render_table(table: &TableRef, driver: &dyn Driver) -> String {
        let mut sql = format!("{} {}", table.table, table.alias);
        for join in &table.joins {
            let keyword = match join.join_type {
                JoinType::Inner => "INNER JOIN",
                JoinType::Left => "LEFT OUTER JOIN",
            };
            sql.push_str(&format!(
                " {keyword} {} ON {}",
                Self::render_table(&join.table, driver),
                join.condition
            ));
        }
        sql
    }

    /// Renders this statement to SQL text, delegating every
    /// dialect-sensitive fragment to `driver`.
    pub fn render(&self, driver: &dyn Driver) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        let items: Vec<String> = self
            .projection
            .iter()
            .map(|item| match item {
                SelectItem::Expr { expr, alias } => format!("{expr} AS {}", driver.safe_label(alias)),
                SelectItem::Wildcard { table } => format!("{table}.*"),
            })
            .collect();
        sql.push_str(&items.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&Self::render_table(&self.from, driver));
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let items: Vec<String> = self
                .order_by
                .iter()
                .map(|o| {
                    let dir = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {dir}", o.expr)
                })
                .collect();
            sql.push_str(&items.join(", "));
        }
        if let Some((offset, limit)) = self.range {
            sql = driver.make_ranged_select(&sql, offset, limit);
        }
        sql
    }
}

/// A compiled SQL statement in one of the shapes the fetch compiler
/// emits: a plain SELECT, or one half of the temp-table indirection
/// used for anchored queries.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    CreateTempTableAs { name: String, query: Box<SelectStatement> },
    DropTempTable { name: String },
}

impl Statement {
    pub fn render(&self, driver: &dyn Driver) -> String {
        match self {
            Statement::Select(select) => select.render(driver),
            Statement::CreateTempTableAs { name, query } => {
                let inner = query.render(driver);
                driver.make_select_into_temp_table(&inner, name).0
            }
            Statement::DropTempTable { name } => {
                driver.make_select_into_temp_table("", name).1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unified_fetch_driver::MySqlLikeDriver;

    #[test]
    fn renders_simple_select() {
        let driver = MySqlLikeDriver;
        let stmt = SelectStatement::new(TableRef::new("customers", "z"))
            .with_projection(vec![SelectItem::Expr {
                expr: "z.name".to_string(),
                alias: "name".to_string(),
            }])
            .with_where("z.active = 1".to_string());
        let sql = stmt.render(&driver);
        assert_eq!(
            sql,
            "SELECT z.name AS `name` FROM customers z WHERE z.active = 1"
        );
    }

    #[test]
    fn renders_joins_in_declaration_order() {
        let driver = MySqlLikeDriver;
        let from = TableRef::new("customers", "z").with_join(Join {
            join_type: JoinType::Left,
            table: TableRef::new("orders", "a"),
            condition: "a.customer_id = z.id".to_string(),
        });
        let stmt = SelectStatement::new(from).with_projection(vec![SelectItem::Expr {
            expr: "z.id".to_string(),
            alias: "id".to_string(),
        }]);
        let sql = stmt.render(&driver);
        assert!(sql.contains("LEFT OUTER JOIN orders a ON a.customer_id = z.id"));
    }

    #[test]
    fn applies_range_last() {
        let driver = MySqlLikeDriver;
        let stmt = SelectStatement::new(TableRef::new("customers", "z"))
            .with_projection(vec![SelectItem::Expr {
                expr: "z.id".to_string(),
                alias: "id".to_string(),
            }])
            .with_range(5, 10);
        let sql = stmt.render(&driver);
        assert!(sql.ends_with("LIMIT 5, 10"));
    }

    #[test]
    fn temp_table_pair_delegates_to_driver() {
        let driver = MySqlLikeDriver;
        let query = SelectStatement::new(TableRef::new("customers", "z")).with_projection(vec![
            SelectItem::Expr {
                expr: "z.id".to_string(),
                alias: "id".to_string(),
            },
        ]);
        let create = Statement::CreateTempTableAs {
            name: "tmp_anchor".to_string(),
            query: Box::new(query),
        };
        let drop = Statement::DropTempTable {
            name: "tmp_anchor".to_string(),
        };
        assert!(create.render(&driver).starts_with("CREATE TEMPORARY TABLE tmp_anchor AS"));
        assert_eq!(drop.render(&driver), "DROP TEMPORARY TABLE IF EXISTS tmp_anchor");
    }
}
