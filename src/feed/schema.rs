use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::FeedError;
use crate::Result;
use crate::RouterError;

/// Logical entities the change feed can report on. One kind per table the
/// application renders live views over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Clients,
    Projects,
    Tasks,
    TimeEntries,
    Notes,
    Leads,
    Invoices,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Clients,
        EntityKind::Projects,
        EntityKind::Tasks,
        EntityKind::TimeEntries,
        EntityKind::Notes,
        EntityKind::Leads,
        EntityKind::Invoices,
    ];

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "clients" => Ok(EntityKind::Clients),
            "projects" => Ok(EntityKind::Projects),
            "tasks" => Ok(EntityKind::Tasks),
            "time_entries" => Ok(EntityKind::TimeEntries),
            "notes" => Ok(EntityKind::Notes),
            "leads" => Ok(EntityKind::Leads),
            "invoices" => Ok(EntityKind::Invoices),
            other => Err(RouterError::UnknownEntity(other.to_string()).into()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Clients => "clients",
            EntityKind::Projects => "projects",
            EntityKind::Tasks => "tasks",
            EntityKind::TimeEntries => "time_entries",
            EntityKind::Notes => "notes",
            EntityKind::Leads => "leads",
            EntityKind::Invoices => "invoices",
        }
    }

    /// Identifying columns the feed carries for rows of this entity: the
    /// primary key plus every column a filter or target template may
    /// reference.
    pub fn schema(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Clients => &["id", "workspace_id"],
            EntityKind::Projects => &["id", "workspace_id", "client_id", "status"],
            EntityKind::Tasks => &["id", "workspace_id", "project_id", "status", "assignee_id"],
            EntityKind::TimeEntries => &["id", "workspace_id", "project_id", "task_id", "user_id"],
            EntityKind::Notes => &["id", "workspace_id", "project_id", "client_id"],
            EntityKind::Leads => &["id", "workspace_id", "status"],
            EntityKind::Invoices => &["id", "workspace_id", "client_id", "project_id", "status"],
        }
    }

    pub fn has_column(
        &self,
        column: &str,
    ) -> bool {
        self.schema().contains(&column)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar value of one identifying field. Rows cross the feed boundary as
/// typed fields; nothing downstream touches raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Canonical string form used for filter comparison and cache-key
    /// parameters. Filters compare canonical strings so that `42` and
    /// `"42"` arriving from different serializers still match.
    pub fn canonical(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Null => "null".to_string(),
        }
    }

    /// Scalar JSON values map directly; arrays and objects are not
    /// identifying fields and yield `None`.
    pub fn from_json(value: &Value) -> Option<FieldValue> {
        match value {
            Value::Null => Some(FieldValue::Null),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(FieldValue::Int(i)),
                None => Some(FieldValue::Str(n.to_string())),
            },
            Value::String(s) => Some(FieldValue::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Identifying fields of one changed row, keyed by column name
pub type RowFields = HashMap<String, FieldValue>;

/// Decodes a wire row into typed fields, keeping only scalar values. Fails
/// when the payload is not an object at all; a row that cannot be decoded
/// cannot be matched against any filter or template.
pub fn decode_row(
    entity: EntityKind,
    payload: &Value,
) -> Result<RowFields> {
    let object = payload.as_object().ok_or_else(|| FeedError::MalformedEvent {
        entity: entity.as_str().to_string(),
        reason: format!("expected a row object, got {}", json_kind(payload)),
    })?;

    let mut row = RowFields::new();
    for (column, value) in object {
        if let Some(field) = FieldValue::from_json(value) {
            row.insert(column.clone(), field);
        }
    }
    Ok(row)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Single-column equality predicate scoping a subscription, e.g.
/// `project_id = P1`. Comparison happens on canonical string forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterExpression {
    pub column: String,
    pub value: String,
}

impl FilterExpression {
    /// Parses `column = value` and checks the column against the entity's
    /// schema. Quotes around the value are stripped.
    pub fn parse(
        entity: EntityKind,
        raw: &str,
    ) -> Result<Self> {
        let (column, value) = raw
            .split_once('=')
            .ok_or_else(|| RouterError::InvalidFilter(raw.to_string()))?;
        let column = column.trim();
        let value = value.trim().trim_matches('\'').trim_matches('"');

        if column.is_empty() || value.is_empty() {
            return Err(RouterError::InvalidFilter(raw.to_string()).into());
        }
        if !entity.has_column(column) {
            return Err(RouterError::UnknownColumn {
                entity: entity.as_str().to_string(),
                column: column.to_string(),
            }
            .into());
        }

        Ok(Self {
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    /// Whether the changed row satisfies this predicate. A row that does not
    /// carry the filtered column cannot be proven irrelevant, so it matches:
    /// an extra invalidation is benign, a missed one serves stale data.
    pub fn matches(
        &self,
        row: &RowFields,
    ) -> bool {
        match row.get(&self.column) {
            Some(field) => field.canonical() == self.value,
            None => true,
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}
