use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::connectors::apple_common::parse::Record;
use crate::error::{ErrorCode, ThingsError};

// ============================================================================
// Status and lists
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Open,
    Completed,
    Canceled,
}

impl Status {
    /// Unknown or empty values read as `Open`.
    pub fn from_applescript(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "completed" => Status::Completed,
            "canceled" | "cancelled" => Status::Canceled,
            _ => Status::Open,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Open => write!(f, "open"),
            Status::Completed => write!(f, "completed"),
            Status::Canceled => write!(f, "canceled"),
        }
    }
}

/// Things' built-in lists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinList {
    Inbox,
    Today,
    Upcoming,
    Anytime,
    Someday,
    Logbook,
    Trash,
}

impl BuiltinList {
    pub const ALL: [BuiltinList; 7] = [
        BuiltinList::Inbox,
        BuiltinList::Today,
        BuiltinList::Upcoming,
        BuiltinList::Anytime,
        BuiltinList::Someday,
        BuiltinList::Logbook,
        BuiltinList::Trash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinList::Inbox => "inbox",
            BuiltinList::Today => "today",
            BuiltinList::Upcoming => "upcoming",
            BuiltinList::Anytime => "anytime",
            BuiltinList::Someday => "someday",
            BuiltinList::Logbook => "logbook",
            BuiltinList::Trash => "trash",
        }
    }

    /// Name as it appears in Things' AppleScript dictionary.
    pub fn things_name(&self) -> &'static str {
        match self {
            BuiltinList::Inbox => "Inbox",
            BuiltinList::Today => "Today",
            BuiltinList::Upcoming => "Upcoming",
            BuiltinList::Anytime => "Anytime",
            BuiltinList::Someday => "Someday",
            BuiltinList::Logbook => "Logbook",
            BuiltinList::Trash => "Trash",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|list| list.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for BuiltinList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a todo lives, or where it should go. Exactly one variant applies.
///
/// Parsed from `project:<id>`, `area:<id>` or a bare built-in list name, and
/// rendered back in the same form.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Location {
    List { name: BuiltinList },
    Project { id: String },
    Area { id: String },
}

impl Location {
    pub fn list(name: BuiltinList) -> Self {
        Location::List { name }
    }

    /// Validate a destination string before any subprocess is spawned.
    pub fn parse_destination(input: &str) -> Result<Self, ThingsError> {
        let trimmed = input.trim();
        let invalid = || {
            ThingsError::validation(
                ErrorCode::InvalidDestination,
                format!(
                    "Invalid destination '{}': use a list name (inbox, today, upcoming, anytime, someday, logbook, trash), 'project:<id>' or 'area:<id>'",
                    input
                ),
            )
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        let Some((prefix, id)) = trimmed.split_once(':') else {
            return BuiltinList::from_name(trimmed)
                .map(Location::list)
                .ok_or_else(invalid);
        };

        if id.contains(':') {
            return Err(invalid());
        }
        let id = id.trim();

        match prefix.trim().to_ascii_lowercase().as_str() {
            "project" if id.is_empty() => Err(ThingsError::validation(
                ErrorCode::EmptyProjectId,
                "Project destination requires an id: 'project:<id>'",
            )),
            "project" => Ok(Location::Project { id: id.to_string() }),
            "area" if id.is_empty() => Err(ThingsError::validation(
                ErrorCode::EmptyAreaId,
                "Area destination requires an id: 'area:<id>'",
            )),
            "area" => Ok(Location::Area { id: id.to_string() }),
            "list" => BuiltinList::from_name(id)
                .map(Location::list)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::List { name } => write!(f, "{}", name),
            Location::Project { id } => write!(f, "project:{}", id),
            Location::Area { id } => write!(f, "area:{}", id),
        }
    }
}

// ============================================================================
// Scheduling values
// ============================================================================

/// Accepted values for `when`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    Today,
    Tomorrow,
    Evening,
    Anytime,
    Someday,
    Date(NaiveDate),
}

impl When {
    pub fn parse(value: &str) -> Result<Self, ThingsError> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "today" => Ok(When::Today),
            "tomorrow" => Ok(When::Tomorrow),
            "evening" | "this evening" => Ok(When::Evening),
            "anytime" => Ok(When::Anytime),
            "someday" => Ok(When::Someday),
            _ => parse_iso_date("when", trimmed).map(When::Date),
        }
    }

    pub fn as_url_value(&self) -> String {
        match self {
            When::Today => "today".to_string(),
            When::Tomorrow => "tomorrow".to_string(),
            When::Evening => "evening".to_string(),
            When::Anytime => "anytime".to_string(),
            When::Someday => "someday".to_string(),
            When::Date(date) => date.format("%Y-%m-%d").to_string(),
        }
    }
}

pub fn parse_iso_date(field: &str, value: &str) -> Result<NaiveDate, ThingsError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ThingsError::validation(
            ErrorCode::InvalidDate,
            format!("Invalid {} '{}': expected YYYY-MM-DD", field, value),
        )
    })
}

/// Dates emitted by our scripts; the time part, when present, is dropped.
fn record_date(record: &Record, key: &str) -> Option<NaiveDate> {
    let raw = record.optional(key)?;
    let date_part = raw.split('T').next().unwrap_or(&raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    /// Scheduled ("when") date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<String>,
}

impl Todo {
    /// `None` when the record has no id.
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = record.optional("id")?;
        Some(Self {
            id,
            title: record.text("title"),
            notes: record.text("notes"),
            status: Status::from_applescript(&record.text("status")),
            tags: record.list("tags"),
            deadline: record_date(record, "due"),
            activation_date: record_date(record, "activation"),
            project_id: record.optional("project"),
            area_id: record.optional("area"),
            creation_date: record.optional("created"),
            modification_date: record.optional("modified"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<String>,
}

impl Project {
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = record.optional("id")?;
        Some(Self {
            id,
            title: record.text("title"),
            notes: record.text("notes"),
            status: Status::from_applescript(&record.text("status")),
            tags: record.list("tags"),
            area_id: record.optional("area"),
            deadline: record_date(record, "due"),
            activation_date: record_date(record, "activation"),
            creation_date: record.optional("created"),
            modification_date: record.optional("modified"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Area {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Area {
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            id: record.optional("id")?,
            title: record.text("title"),
            tags: record.list("tags"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
}

impl Tag {
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            id: record.optional("id")?,
            title: record.text("title"),
            parent: record.optional("parent"),
            shortcut: record.optional("shortcut"),
        })
    }
}

// ============================================================================
// Write requests
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddTodoRequest {
    pub title: String,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub when: Option<When>,
    pub deadline: Option<NaiveDate>,
    pub list_id: Option<String>,
    pub list_title: Option<String>,
    pub heading: Option<String>,
    pub checklist_items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddProjectRequest {
    pub title: String,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub area_id: Option<String>,
    pub area_title: Option<String>,
    pub when: Option<When>,
    pub deadline: Option<NaiveDate>,
    pub todos: Vec<String>,
}

/// Partial update for a todo or a project; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub id: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub when: Option<When>,
    pub deadline: Option<NaiveDate>,
    pub completed: Option<bool>,
    pub canceled: Option<bool>,
}

impl UpdateRequest {
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.notes.is_some()
            || self.tags.is_some()
            || self.when.is_some()
            || self.deadline.is_some()
            || self.completed.is_some()
            || self.canceled.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::apple_common::parse::parse_record;

    fn code_of(result: Result<Location, ThingsError>) -> ErrorCode {
        result.unwrap_err().code()
    }

    #[test]
    fn test_parse_project_destination() {
        let dest = Location::parse_destination("project:ABC123").unwrap();
        assert_eq!(dest, Location::Project { id: "ABC123".into() });
        assert_eq!(
            serde_json::to_value(&dest).unwrap(),
            serde_json::json!({"type": "project", "id": "ABC123"})
        );
    }

    #[test]
    fn test_parse_list_destination() {
        let dest = Location::parse_destination("inbox").unwrap();
        assert_eq!(
            serde_json::to_value(&dest).unwrap(),
            serde_json::json!({"type": "list", "name": "inbox"})
        );
        assert_eq!(
            Location::parse_destination(" Anytime ").unwrap(),
            Location::list(BuiltinList::Anytime)
        );
    }

    #[test]
    fn test_parse_destination_errors() {
        assert_eq!(code_of(Location::parse_destination("area:")), ErrorCode::EmptyAreaId);
        assert_eq!(
            code_of(Location::parse_destination("project:  ")),
            ErrorCode::EmptyProjectId
        );
        assert_eq!(
            code_of(Location::parse_destination("bogus:thing:extra")),
            ErrorCode::InvalidDestination
        );
        assert_eq!(
            code_of(Location::parse_destination("bogus:thing")),
            ErrorCode::InvalidDestination
        );
        assert_eq!(
            code_of(Location::parse_destination("nowhere")),
            ErrorCode::InvalidDestination
        );
        assert_eq!(code_of(Location::parse_destination("")), ErrorCode::InvalidDestination);
    }

    #[test]
    fn test_location_display_round_trips() {
        for input in ["today", "project:P1", "area:A9"] {
            let parsed = Location::parse_destination(input).unwrap();
            assert_eq!(parsed.to_string(), input);
        }
    }

    #[test]
    fn test_when_parsing() {
        assert_eq!(When::parse("Today").unwrap(), When::Today);
        assert_eq!(
            When::parse("2026-03-05").unwrap().as_url_value(),
            "2026-03-05"
        );
        assert_eq!(
            When::parse("next week").unwrap_err().code(),
            ErrorCode::InvalidDate
        );
    }

    #[test]
    fn test_todo_from_record_defaults() {
        let record = parse_record("ID:abc|TITLE:Buy milk").unwrap();
        let todo = Todo::from_record(&record).unwrap();
        assert_eq!(todo.status, Status::Open);
        assert!(todo.tags.is_empty());
        assert_eq!(todo.notes, "");
        assert!(todo.project_id.is_none());
    }

    #[test]
    fn test_todo_from_full_record() {
        let record = parse_record(
            "ID:abc|TITLE:Pay rent|STATUS:completed|TAGS:{bills, home}|DUE:2026-01-31|ACTIVATION:2026-01-30|PROJECT:P1|CREATED:2026-01-01T09:30:00",
        )
        .unwrap();
        let todo = Todo::from_record(&record).unwrap();
        assert_eq!(todo.status, Status::Completed);
        assert_eq!(todo.tags, vec!["bills", "home"]);
        assert_eq!(todo.deadline, NaiveDate::from_ymd_opt(2026, 1, 31));
        assert_eq!(todo.activation_date, NaiveDate::from_ymd_opt(2026, 1, 30));
        assert_eq!(todo.project_id.as_deref(), Some("P1"));
        assert_eq!(todo.creation_date.as_deref(), Some("2026-01-01T09:30:00"));
    }

    #[test]
    fn test_record_without_id_is_skipped() {
        let record = parse_record("TITLE:orphan").unwrap();
        assert!(Todo::from_record(&record).is_none());
    }

    #[test]
    fn test_status_lenient() {
        assert_eq!(Status::from_applescript("cancelled"), Status::Canceled);
        assert_eq!(Status::from_applescript(""), Status::Open);
    }
}
