//! Core data structures shared by the engine and the HTTP collaborators
//!
//! Wire types mirror the JSON envelopes returned by the task pool API:
//! every response carries an `errno`/`errmsg` pair next to its `data`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Number of rows requested per listing page
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ============================================================================
// Task Kind
// ============================================================================

/// Kind of work item the engine claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskKind {
    /// Review tasks, identified by `taskID`
    #[default]
    #[serde(rename = "audittask")]
    Audit,

    /// Production tasks, identified by `clueID`
    #[serde(rename = "producetask")]
    Produce,
}

impl TaskKind {
    /// Path segment used by the listing and label endpoints
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audit => "audittask",
            Self::Produce => "producetask",
        }
    }

    /// Path segment used by the claim endpoint
    pub fn commit_path(&self) -> &'static str {
        match self {
            Self::Audit => "audittaskcommit",
            Self::Produce => "producetaskcommit",
        }
    }

    /// JSON key carrying identifiers in a claim request body
    pub fn id_field(&self) -> &'static str {
        match self {
            Self::Audit => "taskIDs",
            Self::Produce => "clueIDs",
        }
    }

    /// Label used for identifiers in log lines
    pub fn id_label(&self) -> &'static str {
        match self {
            Self::Audit => "TaskID",
            Self::Produce => "ClueID",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    /// An empty string selects the primary kind.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "audittask" | "audit" => Ok(Self::Audit),
            "producetask" | "produce" => Ok(Self::Produce),
            other => Err(Error::config(format!("unknown task type: {other}"))),
        }
    }
}

// ============================================================================
// Listing
// ============================================================================

/// One claimable work unit returned by the listing endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskItem {
    #[serde(rename = "taskID")]
    pub task_id: u64,

    #[serde(rename = "clueID")]
    pub clue_id: u64,

    pub brief: String,

    pub step: i64,

    pub subject: i64,

    pub state: i64,

    #[serde(rename = "stepName")]
    pub step_name: String,

    #[serde(rename = "subjectName")]
    pub subject_name: String,

    #[serde(rename = "clueType")]
    pub clue_type: i64,

    #[serde(rename = "clueTypeName")]
    pub clue_type_name: String,

    #[serde(rename = "stateName")]
    pub state_name: String,

    #[serde(rename = "createTime")]
    pub create_time: String,

    #[serde(rename = "dispatchTime")]
    pub dispatch_time: String,
}

impl TaskItem {
    /// Identifier to claim this item with, depending on the task kind
    pub fn claim_id(&self, kind: TaskKind) -> String {
        match kind {
            TaskKind::Audit => self.task_id.to_string(),
            TaskKind::Produce => self.clue_id.to_string(),
        }
    }
}

/// Payload of a listing response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskListData {
    pub total: u64,
    pub list: Option<Vec<TaskItem>>,
}

/// Listing response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskListResponse {
    pub errno: i64,
    pub errmsg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub data: TaskListData,
}

/// Category filters and page selection for one listing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub kind: TaskKind,
    pub page: u32,
    pub page_size: u32,
    pub step: i64,
    pub subject: i64,
    pub clue_type: i64,
}

impl ListQuery {
    /// Query string pairs in the order the API expects them
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("pn", self.page.to_string()),
            ("rn", self.page_size.to_string()),
            ("clueID", String::new()),
            ("clueType", self.clue_type.to_string()),
            ("step", self.step.to_string()),
            ("subject", self.subject.to_string()),
        ]
    }
}

// ============================================================================
// Claiming
// ============================================================================

/// Claim response envelope
///
/// `data` is loosely typed upstream; use [`ClaimResponse::payload`] to read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimResponse {
    pub errno: i64,
    pub errmsg: String,
    pub data: Value,
}

impl ClaimResponse {
    /// Interpreted claim payload
    pub fn payload(&self) -> ClaimData {
        ClaimData::from(&self.data)
    }

    /// Number of items this call claimed; zero for any unrecognised payload
    pub fn success_count(&self) -> u64 {
        if self.errno != 0 {
            return 0;
        }
        self.payload().success_count()
    }
}

/// Shapes a claim payload can take
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimData {
    /// Object carrying a numeric `success` field
    Counted { success: u64 },

    /// No payload at all
    Empty,

    /// Anything else; counts as zero successes
    Unknown(Value),
}

impl ClaimData {
    pub fn success_count(&self) -> u64 {
        match self {
            Self::Counted { success } => *success,
            Self::Empty | Self::Unknown(_) => 0,
        }
    }
}

impl From<&Value> for ClaimData {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Object(map) => match map.get("success") {
                Some(Value::Number(n)) => {
                    let success = n
                        .as_u64()
                        .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
                        .unwrap_or(0);
                    Self::Counted { success }
                }
                _ => Self::Unknown(value.clone()),
            },
            other => Self::Unknown(other.clone()),
        }
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// One selectable value inside a label filter group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelOption {
    pub id: i64,
    pub name: String,
}

/// A label filter group (step, subject, clue type, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelFilter {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub list: Vec<LabelOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelData {
    pub filter: Vec<LabelFilter>,
}

/// Label metadata response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelResponse {
    pub errno: i64,
    pub errmsg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub data: LabelData,
}

impl LabelResponse {
    /// Find a filter group by id
    pub fn filter(&self, id: &str) -> Option<&LabelFilter> {
        self.data.filter.iter().find(|f| f.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    #[serde(rename = "roleLinks")]
    pub role_links: Vec<String>,
    #[serde(rename = "roleNames")]
    pub role_names: Vec<String>,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub avatar: String,
}

/// User info response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfoResponse {
    pub errno: i64,
    pub errmsg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub data: UserInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_kind_parse() {
        assert_eq!("".parse::<TaskKind>().unwrap(), TaskKind::Audit);
        assert_eq!("audittask".parse::<TaskKind>().unwrap(), TaskKind::Audit);
        assert_eq!("ProduceTask".parse::<TaskKind>().unwrap(), TaskKind::Produce);
        assert!("reviewtask".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_task_kind_paths() {
        assert_eq!(TaskKind::Audit.commit_path(), "audittaskcommit");
        assert_eq!(TaskKind::Produce.commit_path(), "producetaskcommit");
        assert_eq!(TaskKind::Produce.id_field(), "clueIDs");
    }

    #[test]
    fn test_task_kind_serde_names() {
        let json = serde_json::to_string(&TaskKind::Produce).unwrap();
        assert_eq!(json, "\"producetask\"");
    }

    #[test]
    fn test_claim_id_by_kind() {
        let item = TaskItem {
            task_id: 11,
            clue_id: 22,
            ..Default::default()
        };
        assert_eq!(item.claim_id(TaskKind::Audit), "11");
        assert_eq!(item.claim_id(TaskKind::Produce), "22");
    }

    #[test]
    fn test_task_list_deserialize() {
        let body = json!({
            "errno": 0,
            "errmsg": "success",
            "data": {
                "total": 2,
                "list": [
                    {"taskID": 1, "clueID": 10, "brief": "Algebra", "dispatchTime": "2024-01-10 09:00:00"},
                    {"taskID": 2, "clueID": 20, "brief": "Geometry", "extra": true}
                ]
            }
        });
        let resp: TaskListResponse = serde_json::from_value(body).unwrap();
        let list = resp.data.list.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].dispatch_time, "2024-01-10 09:00:00");
        assert_eq!(list[1].clue_id, 20);
    }

    #[test]
    fn test_null_data_envelope() {
        let resp: TaskListResponse =
            serde_json::from_value(json!({"errno": 2, "errmsg": "not logged in", "data": null}))
                .unwrap();
        assert_eq!(resp.errno, 2);
        assert!(resp.data.list.is_none());
    }

    #[test]
    fn test_claim_data_counted() {
        let data = ClaimData::from(&json!({"success": 1, "fail": 0}));
        assert_eq!(data, ClaimData::Counted { success: 1 });
        assert_eq!(ClaimData::from(&json!({"success": 2.0})).success_count(), 2);
    }

    #[test]
    fn test_claim_data_unknown_shapes_count_zero() {
        assert_eq!(ClaimData::from(&Value::Null), ClaimData::Empty);
        assert_eq!(ClaimData::from(&json!({"success": "1"})).success_count(), 0);
        assert_eq!(ClaimData::from(&json!([1, 2])).success_count(), 0);
        assert_eq!(ClaimData::from(&json!({"ok": true})).success_count(), 0);
        assert_eq!(ClaimData::from(&json!({"success": -3})).success_count(), 0);
    }

    #[test]
    fn test_claim_response_errno_counts_zero() {
        let resp = ClaimResponse {
            errno: 1001,
            errmsg: "already claimed".to_string(),
            data: json!({"success": 1}),
        };
        assert_eq!(resp.success_count(), 0);
    }

    #[test]
    fn test_list_query_params() {
        let query = ListQuery {
            kind: TaskKind::Audit,
            page: 3,
            page_size: DEFAULT_PAGE_SIZE,
            step: 1,
            subject: 2,
            clue_type: 1,
        };
        let params = query.params();
        assert_eq!(params[0], ("pn", "3".to_string()));
        assert_eq!(params[1], ("rn", "20".to_string()));
        assert_eq!(params[2], ("clueID", String::new()));
    }

    #[test]
    fn test_label_filter_lookup() {
        let resp: LabelResponse = serde_json::from_value(json!({
            "errno": 0,
            "data": {"filter": [{"id": "subject", "name": "Subject", "type": "radio", "list": [{"id": 2, "name": "Math"}]}]}
        }))
        .unwrap();
        let subject = resp.filter("subject").unwrap();
        assert_eq!(subject.list[0].name, "Math");
        assert!(resp.filter("step").is_none());
    }
}
