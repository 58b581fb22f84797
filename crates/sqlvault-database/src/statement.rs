//! Structured statements.
//!
//! A [`Statement`] carries its SQL text together with the parts the executor
//! needs for auditing: verb, affected table, SET columns and WHERE filter.
//! Statements built with the constructors carry those parts directly; raw SQL
//! is parsed once on conversion.

use crate::codec::{split_header, ValueCodec};
use crate::ids::is_entry_id;
use crate::models::ENTRY_ID_COLUMN;
use crate::value::{OriginalFormat, Value};
use crate::{DatabaseError, DatabaseResult};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Statement verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Update,
    Delete,
    Select,
    Create,
}

impl Action {
    /// Keyword scan order when the leading token is not a known verb.
    const PRIORITY: [Action; 5] = [
        Action::Insert,
        Action::Update,
        Action::Delete,
        Action::Select,
        Action::Create,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Insert => "INSERT",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
            Action::Select => "SELECT",
            Action::Create => "CREATE",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|action| word.eq_ignore_ascii_case(action.as_str()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SET clause of an UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetClause {
    pub columns: Vec<String>,
    /// Number of `?` placeholders inside the SET clause.
    pub placeholders: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    action: Option<Action>,
    table: Option<String>,
    set: Option<SetClause>,
    filter: Option<String>,
    clause_error: Option<String>,
}

fn record_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(?i)sys_eid\s*=\s*['"]?([^'"\s]+)['"]?"#).ok())
        .as_ref()
}

fn keyword_pattern(keyword: &'static str) -> Option<&'static Regex> {
    static SET: OnceLock<Option<Regex>> = OnceLock::new();
    static WHERE: OnceLock<Option<Regex>> = OnceLock::new();
    let cell = if keyword == "SET" { &SET } else { &WHERE };
    cell.get_or_init(|| Regex::new(&format!(r"(?i)\b{}\b", keyword)).ok())
        .as_ref()
}

fn find_keyword(sql: &str, keyword: &'static str) -> Option<(usize, usize)> {
    keyword_pattern(keyword)?
        .find(sql)
        .map(|m| (m.start(), m.end()))
}

/// Strip quoting, trailing punctuation and an attached column list from a name.
fn clean_identifier(token: &str) -> Option<String> {
    let name = token.split('(').next().unwrap_or_default();
    let name = name
        .trim_end_matches([';', ','])
        .trim_matches(|c| c == '"' || c == '`' || c == '\'' || c == '[' || c == ']');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn word_after<'a>(words: &[&'a str], keyword: &str) -> Option<&'a str> {
    let position = words.iter().position(|w| w.eq_ignore_ascii_case(keyword))?;
    words.get(position + 1).copied()
}

fn trim_clause(clause: &str) -> String {
    clause.trim().trim_end_matches(';').trim().to_string()
}

impl Statement {
    /// Parse raw SQL text.
    pub fn parse(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let words: Vec<&str> = sql.split_whitespace().collect();

        let action = words
            .first()
            .and_then(|w| Action::from_keyword(w.trim_start_matches('(')))
            .or_else(|| {
                Action::PRIORITY.into_iter().find(|action| {
                    words
                        .iter()
                        .any(|w| w.trim_matches(|c| c == '(' || c == ')').eq_ignore_ascii_case(action.as_str()))
                })
            });

        let table = match action {
            Some(Action::Select) | Some(Action::Delete) => word_after(&words, "FROM"),
            Some(Action::Insert) => word_after(&words, "INTO"),
            Some(Action::Update) => word_after(&words, "UPDATE"),
            Some(Action::Create) => {
                let position = words.iter().position(|w| w.eq_ignore_ascii_case("TABLE"));
                position.and_then(|p| {
                    let rest = &words[p + 1..];
                    let has_guard = rest.len() > 3
                        && rest[0].eq_ignore_ascii_case("IF")
                        && rest[1].eq_ignore_ascii_case("NOT")
                        && rest[2].eq_ignore_ascii_case("EXISTS");
                    if has_guard {
                        rest.get(3).copied()
                    } else {
                        rest.first().copied()
                    }
                })
            }
            None => None,
        }
        .and_then(clean_identifier);

        let where_match = find_keyword(&sql, "WHERE");
        let filter = where_match.map(|(_, end)| trim_clause(&sql[end..]));

        let mut set = None;
        let mut clause_error = None;
        if action == Some(Action::Update) {
            match (find_keyword(&sql, "SET"), where_match) {
                (None, _) => clause_error = Some("UPDATE without SET clause".to_string()),
                (Some(_), None) => clause_error = Some("UPDATE without WHERE clause".to_string()),
                (Some((set_start, _)), Some((where_start, _))) if where_start < set_start => {
                    clause_error = Some("WHERE clause precedes SET clause".to_string())
                }
                (Some((_, set_end)), Some((where_start, _))) => {
                    let clause = &sql[set_end..where_start];
                    set = Some(SetClause {
                        columns: clause
                            .split(',')
                            .filter_map(|assignment| assignment.split('=').next())
                            .map(str::trim)
                            .filter_map(clean_identifier)
                            .collect(),
                        placeholders: clause.matches('?').count(),
                    });
                }
            }
        }

        Self {
            sql,
            action,
            table,
            set,
            filter,
            clause_error,
        }
    }

    /// `INSERT INTO <table> (<columns>) VALUES (?, ...)`
    pub fn insert(table: &str, columns: &[&str]) -> Self {
        let placeholders = vec!["?"; columns.len()].join(", ");
        Self {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            ),
            action: Some(Action::Insert),
            table: Some(table.to_string()),
            set: None,
            filter: None,
            clause_error: None,
        }
    }

    /// `UPDATE <table> SET <col> = ?, ... WHERE <filter>`
    pub fn update(table: &str, set_columns: &[&str], filter: &str) -> Self {
        let assignments: Vec<String> = set_columns.iter().map(|c| format!("{} = ?", c)).collect();
        Self {
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                table,
                assignments.join(", "),
                filter
            ),
            action: Some(Action::Update),
            table: Some(table.to_string()),
            set: Some(SetClause {
                columns: set_columns.iter().map(|c| c.to_string()).collect(),
                placeholders: set_columns.len(),
            }),
            filter: Some(filter.to_string()),
            clause_error: None,
        }
    }

    /// `DELETE FROM <table> WHERE <filter>`
    pub fn delete(table: &str, filter: &str) -> Self {
        Self {
            sql: format!("DELETE FROM {} WHERE {}", table, filter),
            action: Some(Action::Delete),
            table: Some(table.to_string()),
            set: None,
            filter: Some(filter.to_string()),
            clause_error: None,
        }
    }

    /// `SELECT <columns> FROM <table> [WHERE <filter>]`; no columns selects `*`.
    pub fn select(table: &str, columns: &[&str], filter: Option<&str>) -> Self {
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        let sql = match filter {
            Some(filter) => format!("SELECT {} FROM {} WHERE {}", projection, table, filter),
            None => format!("SELECT {} FROM {}", projection, table),
        };
        Self {
            sql,
            action: Some(Action::Select),
            table: Some(table.to_string()),
            set: None,
            filter: filter.map(str::to_string),
            clause_error: None,
        }
    }

    /// `CREATE TABLE [IF NOT EXISTS] <table> (<definitions>)`
    pub fn create_table(table: &str, definitions: &[String], if_not_exists: bool) -> Self {
        let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
        Self {
            sql: format!(
                "CREATE TABLE {}{} ({})",
                guard,
                table,
                definitions.join(", ")
            ),
            action: Some(Action::Create),
            table: Some(table.to_string()),
            set: None,
            filter: None,
            clause_error: None,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn action(&self) -> Option<Action> {
        self.action
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// SET clause and WHERE filter of an UPDATE.
    pub fn set_clause(&self) -> DatabaseResult<(&SetClause, &str)> {
        if let Some(error) = &self.clause_error {
            return Err(DatabaseError::MalformedClause(error.clone()));
        }
        let set = self
            .set
            .as_ref()
            .ok_or_else(|| DatabaseError::MalformedClause("missing SET clause".to_string()))?;
        let filter = self
            .filter
            .as_deref()
            .ok_or_else(|| DatabaseError::MalformedClause("missing WHERE clause".to_string()))?;
        Ok((set, filter))
    }

    /// Literal `sys_eid = <value>` in the SQL text. Placeholders do not count.
    pub fn literal_record_id(&self) -> Option<String> {
        let captures = record_id_pattern()?.captures(&self.sql)?;
        let id = captures
            .get(1)?
            .as_str()
            .trim_end_matches([')', ';', ',']);
        if id.is_empty() || id.starts_with(['?', ':', '@', '$']) {
            None
        } else {
            Some(id.to_string())
        }
    }

    /// Record id from the SQL text, or else the first bound entry id.
    ///
    /// Encrypted string arguments are decrypted before the entry-id check.
    pub fn record_id(&self, args: &[Value], codec: &ValueCodec) -> Option<String> {
        if let Some(id) = self.literal_record_id() {
            return Some(id);
        }

        args.iter().find_map(|arg| {
            let text = arg.as_str()?;
            if is_entry_id(text) {
                return Some(text.to_string());
            }
            let (tag, _) = split_header(text)?;
            if OriginalFormat::parse(tag) != Some(OriginalFormat::String) {
                return None;
            }
            match codec.decode(text) {
                Ok(Value::Str(plain)) if is_entry_id(&plain) => Some(plain),
                _ => None,
            }
        })
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::parse(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::parse(sql)
    }
}

impl From<&Statement> for Statement {
    fn from(statement: &Statement) -> Self {
        statement.clone()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// `a = ? AND b = ?`
pub fn where_eq(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("{} = ?", c))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Filter on the entry id column.
pub fn where_entry_id() -> String {
    where_eq(&[ENTRY_ID_COLUMN])
}
