//! SQL statement generation for the record store
//!
//! Statements use `$n` positional placeholders, which both PostgreSQL and the
//! SQLite driver accept. Column and table names are checked to be plain
//! identifiers before they are spliced into SQL text.

use regex::Regex;
use std::{fmt::Write, sync::OnceLock};

use super::value::Value;
use crate::error::{StoreError, StoreResult};

/// Sort direction for `ORDER BY`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Lenient parse: anything but `desc` (any case) sorts ascending
    pub fn parse(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Comparison used by a criteria condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Like,
    Gte,
    NotNull,
}

impl Operator {
    fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Like => "LIKE",
            Operator::Gte => ">=",
            Operator::NotNull => "IS NOT NULL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

/// AND-conjunction of column conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    conditions: Vec<Condition>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Operator::Eq, value)
    }

    pub fn like(self, column: impl Into<String>, pattern: impl Into<Value>) -> Self {
        self.with(column, Operator::Like, pattern)
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Operator::Gte, value)
    }

    pub fn not_null(self, column: impl Into<String>) -> Self {
        self.with(column, Operator::NotNull, Value::Null)
    }

    fn with(mut self, column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Criteria::new(), |criteria, (column, value)| criteria.eq(column, value))
    }
}

/// `ORDER BY` column list, kept in the caller's order
pub type OrderBy = Vec<(String, Direction)>;

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

fn identifier_pattern() -> &'static Regex {
    static IDENTIFIER_REGEX: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Failed to compile identifier regex")
    })
}

/// Ensure a name can be used unquoted as a table or column
pub fn ident(name: &str) -> StoreResult<&str> {
    if identifier_pattern().is_match(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

fn push_where(sql: &mut String, params: &mut Vec<Value>, criteria: &Criteria) -> StoreResult<()> {
    if criteria.is_empty() {
        return Ok(());
    }

    let mut clauses = Vec::with_capacity(criteria.conditions.len());
    for condition in &criteria.conditions {
        let column = ident(&condition.column)?;
        if condition.operator == Operator::NotNull {
            clauses.push(format!("{} {}", column, condition.operator.as_sql()));
            continue;
        }
        params.push(condition.value.clone());
        clauses.push(format!(
            "{} {} ${}",
            column,
            condition.operator.as_sql(),
            params.len()
        ));
    }

    let _ = write!(sql, " WHERE {}", clauses.join(" AND "));
    Ok(())
}

fn push_order(sql: &mut String, order_by: &[(String, Direction)]) -> StoreResult<()> {
    if order_by.is_empty() {
        return Ok(());
    }

    let clauses = order_by
        .iter()
        .map(|(column, direction)| Ok(format!("{} {}", ident(column)?, direction.as_sql())))
        .collect::<StoreResult<Vec<_>>>()?;

    let _ = write!(sql, " ORDER BY {}", clauses.join(", "));
    Ok(())
}

/// `SELECT *` filtered, ordered and paginated
pub fn select(
    table: &str,
    criteria: &Criteria,
    order_by: &[(String, Direction)],
    limit: Option<u32>,
    offset: u32,
) -> StoreResult<Statement> {
    let mut sql = format!("SELECT * FROM {}", ident(table)?);
    let mut params = Vec::new();

    push_where(&mut sql, &mut params, criteria)?;
    push_order(&mut sql, order_by)?;

    if let Some(limit) = limit {
        let _ = write!(sql, " LIMIT {limit}");
        if offset > 0 {
            let _ = write!(sql, " OFFSET {offset}");
        }
    }

    Ok(Statement { sql, params })
}

/// `SELECT COUNT(*)` over the criteria
pub fn count(table: &str, criteria: &Criteria) -> StoreResult<Statement> {
    let mut sql = format!("SELECT COUNT(*) AS total FROM {}", ident(table)?);
    let mut params = Vec::new();
    push_where(&mut sql, &mut params, criteria)?;
    Ok(Statement { sql, params })
}

/// `INSERT` returning the generated primary key
pub fn insert(table: &str, primary_key: &str, columns: Vec<(&str, Value)>) -> StoreResult<Statement> {
    let mut names = Vec::with_capacity(columns.len());
    let mut placeholders = Vec::with_capacity(columns.len());
    let mut params = Vec::with_capacity(columns.len());

    for (column, value) in columns {
        names.push(ident(column)?);
        params.push(value);
        placeholders.push(format!("${}", params.len()));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        ident(table)?,
        names.join(", "),
        placeholders.join(", "),
        ident(primary_key)?
    );

    Ok(Statement { sql, params })
}

/// `UPDATE` of the given columns for one primary key
pub fn update(
    table: &str,
    primary_key: &str,
    id: i64,
    columns: Vec<(&str, Value)>,
) -> StoreResult<Statement> {
    let mut assignments = Vec::with_capacity(columns.len());
    let mut params = Vec::with_capacity(columns.len() + 1);

    for (column, value) in columns {
        params.push(value);
        assignments.push(format!("{} = ${}", ident(column)?, params.len()));
    }
    params.push(Value::Int(id));

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        ident(table)?,
        assignments.join(", "),
        ident(primary_key)?,
        params.len()
    );

    Ok(Statement { sql, params })
}

/// `DELETE` of one primary key
pub fn delete(table: &str, primary_key: &str, id: i64) -> StoreResult<Statement> {
    Ok(Statement {
        sql: format!("DELETE FROM {} WHERE {} = $1", ident(table)?, ident(primary_key)?),
        params: vec![Value::Int(id)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_with_criteria_order_and_page() {
        let criteria = Criteria::new().eq("is_active", true).like("quartier", "%hipo%");
        let order = vec![
            ("created_at".to_string(), Direction::Desc),
            ("id".to_string(), Direction::Asc),
        ];

        let statement = select("users", &criteria, &order, Some(20), 40).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT * FROM users WHERE is_active = $1 AND quartier LIKE $2 \
             ORDER BY created_at DESC, id ASC LIMIT 20 OFFSET 40"
        );
        assert_eq!(
            statement.params,
            vec![Value::Bool(true), Value::Text("%hipo%".to_string())]
        );
    }

    #[test]
    fn test_not_null_takes_no_parameter() {
        let criteria = Criteria::new()
            .not_null("email_verified_at")
            .gte("created_at", "2025-01-01 00:00:00");
        let statement = count("users", &criteria).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) AS total FROM users WHERE email_verified_at IS NOT NULL AND created_at >= $1"
        );
        assert_eq!(statement.params.len(), 1);
    }

    #[test]
    fn test_offset_is_ignored_without_limit() {
        let statement = select("users", &Criteria::new(), &[], None, 10).unwrap();
        assert_eq!(statement.sql, "SELECT * FROM users");
    }

    #[test]
    fn test_criteria_from_pairs() {
        let criteria: Criteria = [("email", "a@b.mg"), ("phone", "0321234567")]
            .into_iter()
            .collect();
        let statement = count("users", &criteria).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) AS total FROM users WHERE email = $1 AND phone = $2"
        );
    }

    #[test]
    fn test_insert_and_update_numbering() {
        let insert = insert(
            "users",
            "id",
            vec![("email", Value::from("a@b.mg")), ("blocked_reason", Value::Null)],
        )
        .unwrap();
        assert_eq!(
            insert.sql,
            "INSERT INTO users (email, blocked_reason) VALUES ($1, $2) RETURNING id"
        );

        let update = update("users", "id", 7, vec![("is_blocked", Value::Bool(true))]).unwrap();
        assert_eq!(update.sql, "UPDATE users SET is_blocked = $1 WHERE id = $2");
        assert_eq!(update.params, vec![Value::Bool(true), Value::Int(7)]);
    }

    #[test]
    fn test_rejects_injected_identifiers() {
        let order = vec![("id; DROP TABLE users".to_string(), Direction::Asc)];
        assert!(matches!(
            select("users", &Criteria::new(), &order, None, 0),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_direction_parse_is_lenient() {
        assert_eq!(Direction::parse("desc"), Direction::Desc);
        assert_eq!(Direction::parse("DESC"), Direction::Desc);
        assert_eq!(Direction::parse("sideways"), Direction::Asc);
    }
}
