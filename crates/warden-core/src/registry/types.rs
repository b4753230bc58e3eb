//! Registry document types.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Everything known about one coordination domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub version: u64,
    pub domain: String,
    #[serde(default)]
    pub participants: BTreeMap<String, Participant>,
    #[serde(default)]
    pub streams: BTreeMap<String, WorkStream>,
}

impl Registry {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            version: 1,
            domain: domain.into(),
            participants: BTreeMap::new(),
            streams: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParticipantStatus {
    Active,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub started: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: ParticipantStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_stream: Option<String>,
    #[serde(default)]
    pub locked_files: BTreeSet<String>,
    #[serde(default)]
    pub commits: u64,
}

impl Participant {
    pub fn new(id: impl Into<String>, work_stream: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            started: now,
            last_heartbeat: now,
            status: ParticipantStatus::Active,
            work_stream,
            locked_files: BTreeSet::new(),
            commits: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StreamStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStream {
    pub name: String,
    pub owner: String,
    pub status: StreamStatus,
    #[serde(default)]
    pub file_patterns: BTreeSet<String>,
    pub started: DateTime<Utc>,
}

/// Two streams claiming overlapping patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub first_stream: String,
    pub first_pattern: String,
    pub second_stream: String,
    pub second_pattern: String,
}
