//! Validation queue state machine
//!
//! Items start `pending` and take exactly one reviewer action:
//! `pending → approved` or `pending → rejected`. Both outcomes are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::CandidatePlace;

/// Review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Awaiting review
    Pending,
    /// Accepted for import
    Approved,
    /// Discarded
    Rejected,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Status reached by applying `action`, if the edge exists
    pub fn apply(&self, action: QueueAction) -> Option<QueueStatus> {
        match (self, action) {
            (Self::Pending, QueueAction::Approve) => Some(Self::Approved),
            (Self::Pending, QueueAction::Reject) => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown queue status: {}", other)),
        }
    }
}

/// Reviewer action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
    Approve,
    Reject,
}

impl fmt::Display for QueueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => f.write_str("approve"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

impl FromStr for QueueAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown queue action: {}", other)),
        }
    }
}

/// A candidate awaiting (or past) human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationQueueItem {
    pub id: Uuid,
    /// City slug the candidate was discovered for
    pub city: String,
    pub status: QueueStatus,
    pub candidate: CandidatePlace,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ValidationQueueItem {
    /// New pending item
    pub fn new(city: impl Into<String>, candidate: CandidatePlace) -> Self {
        Self {
            id: Uuid::new_v4(),
            city: city.into(),
            status: QueueStatus::Pending,
            candidate,
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }
}

/// Listing filter; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueueFilter {
    pub status: Option<QueueStatus>,
    pub city: Option<String>,
    pub min_confidence: Option<i64>,
}

/// Per-status totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}
