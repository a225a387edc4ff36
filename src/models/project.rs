use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Open => "open",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    Completed,
}

/// A freelancer's proposal against an open project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub freelancer_id: String,
    #[serde(default)]
    pub message: String,
    pub amount: f64,
    pub status: BidStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// The negotiated terms between the project's client and one freelancer.
/// Only the latest negotiation is kept on the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub project_id: String,
    pub client_id: String,
    pub freelancer_id: String,
    pub price: f64,
    #[serde(with = "timestamp")]
    pub deadline: DateTime<Utc>,
    pub status: ContractStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn is_pending(&self) -> bool {
        self.status == ContractStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub title: String,
    pub status: MilestoneStatus,
    #[serde(default, with = "timestamp::option")]
    pub due_date: Option<DateTime<Utc>>,
    /// Set exactly when `status` becomes completed.
    #[serde(default, with = "timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLog {
    #[serde(with = "timestamp")]
    pub start: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub end: Option<DateTime<Utc>>,
    /// Minutes.
    pub duration: Option<i64>,
}

/// The project document. Bids, contract, milestones and time logs live
/// inside it and have no lifecycle of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub requirements: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub deadline: Option<DateTime<Utc>>,
    pub client_id: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub bids: Vec<Bid>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub time_logs: Vec<TimeLog>,
    pub assigned_freelancer: Option<String>,
    pub contract: Option<Contract>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Bumped by the store on every committed write; used as the CAS token.
    #[serde(default)]
    pub version: i64,
}

impl Project {
    pub fn new(
        client_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Project {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            requirements: None,
            deadline: None,
            client_id: client_id.into(),
            status: ProjectStatus::Open,
            bids: Vec::new(),
            progress: 0,
            milestones: Vec::new(),
            time_logs: Vec::new(),
            assigned_freelancer: None,
            contract: None,
            created_at: now,
            version: 0,
        }
    }

    pub fn is_owned_by(&self, actor_id: &str) -> bool {
        self.client_id == actor_id
    }

    pub fn has_accepted_contract(&self) -> bool {
        matches!(&self.contract, Some(c) if c.status == ContractStatus::Accepted)
    }

    pub fn pending_contract(&self) -> Option<&Contract> {
        self.contract.as_ref().filter(|c| c.is_pending())
    }

    pub fn pending_contract_mut(&mut self) -> Option<&mut Contract> {
        self.contract.as_mut().filter(|c| c.is_pending())
    }

    /// `assignedFreelancer` is set iff the project is in progress or completed,
    /// and an accepted contract names the assigned freelancer.
    pub fn assignment_is_consistent(&self) -> bool {
        let executing = matches!(
            self.status,
            ProjectStatus::InProgress | ProjectStatus::Completed
        );
        if executing != self.assigned_freelancer.is_some() {
            return false;
        }
        match &self.contract {
            Some(c) if c.status == ContractStatus::Accepted => {
                self.assigned_freelancer.as_deref() == Some(c.freelancer_id.as_str())
            }
            _ => true,
        }
    }
}
