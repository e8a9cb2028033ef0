use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const UNASSIGNED_COLUMN_ID: &str = "UNASSIGNED_COLUMN_ID";
pub const UNASSIGNED_COLUMN_NAME: &str = "Unassigned";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Identifies a column of a board, including the implicit column that
/// holds tasks with no `column_id`.
///
/// `Unassigned` sorts before every real column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ColumnKey {
    Unassigned,
    Column(Uuid),
}

impl ColumnKey {
    pub fn as_column_id(&self) -> Option<Uuid> {
        match self {
            ColumnKey::Unassigned => None,
            ColumnKey::Column(id) => Some(*id),
        }
    }
}

impl From<Option<Uuid>> for ColumnKey {
    fn from(column_id: Option<Uuid>) -> Self {
        match column_id {
            Some(id) => ColumnKey::Column(id),
            None => ColumnKey::Unassigned,
        }
    }
}

impl From<Uuid> for ColumnKey {
    fn from(id: Uuid) -> Self {
        ColumnKey::Column(id)
    }
}

impl std::fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKey::Unassigned => write!(f, "{}", UNASSIGNED_COLUMN_ID),
            ColumnKey::Column(id) => write!(f, "{}", id),
        }
    }
}

impl std::str::FromStr for ColumnKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == UNASSIGNED_COLUMN_ID {
            return Ok(ColumnKey::Unassigned);
        }
        Uuid::parse_str(s)
            .map(ColumnKey::Column)
            .map_err(|_| format!("Invalid column id: {}", s))
    }
}

impl From<ColumnKey> for String {
    fn from(key: ColumnKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for ColumnKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
