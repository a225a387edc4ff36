// src/lifecycle.rs
//! Project status machine and execution-phase data.
//!
//! `open -> in_progress -> completed` and `open -> cancelled`. The move to
//! `in_progress` happens only through offer acceptance (see `negotiation`).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::error::{AppError, AppResult};
use crate::models::{ContractStatus, Milestone, MilestoneStatus, Project, ProjectStatus, TimeLog};

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub title: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMilestone {
    pub title: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTimeLog {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
}

/// How a milestone is addressed: by position (unstable under concurrent
/// insertion) or by the id assigned at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MilestoneRef {
    Index(usize),
    Id(String),
}

impl From<&str> for MilestoneRef {
    fn from(raw: &str) -> Self {
        match raw.parse::<usize>() {
            Ok(idx) => MilestoneRef::Index(idx),
            Err(_) => MilestoneRef::Id(raw.to_string()),
        }
    }
}

fn required_text(value: &Option<String>, field: &str) -> AppResult<String> {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(AppError::validation(format!("{} is required.", field))),
    }
}

pub fn create_project(actor: &Actor, input: &NewProject, now: DateTime<Utc>) -> AppResult<Project> {
    actor.require_role(&[Role::Client])?;
    let title = required_text(&input.title, "Title")?;
    let description = required_text(&input.description, "Description")?;

    let mut project = Project::new(actor.id.clone(), title, description, now);
    project.requirements = input.requirements.clone();
    project.deadline = input.deadline;
    Ok(project)
}

fn require_owner(project: &Project, actor: &Actor) -> AppResult<()> {
    actor.require_role(&[Role::Client])?;
    actor.require_identity(&project.client_id, "Only the project owner can do this.")
}

/// Edits descriptive fields while the project is still open.
pub fn update_details(project: &mut Project, actor: &Actor, patch: &ProjectPatch) -> AppResult<()> {
    require_owner(project, actor)?;
    if patch.title.is_none()
        && patch.description.is_none()
        && patch.requirements.is_none()
        && patch.deadline.is_none()
    {
        return Err(AppError::validation("No fields to update."));
    }
    if project.status != ProjectStatus::Open {
        return Err(AppError::invalid_state("Only open projects can be edited."));
    }
    if patch.title.is_some() {
        project.title = required_text(&patch.title, "Title")?;
    }
    if patch.description.is_some() {
        project.description = required_text(&patch.description, "Description")?;
    }
    if let Some(requirements) = &patch.requirements {
        project.requirements = Some(requirements.clone());
    }
    if let Some(deadline) = patch.deadline {
        project.deadline = Some(deadline);
    }
    Ok(())
}

pub fn ensure_deletable(project: &Project, actor: &Actor) -> AppResult<()> {
    require_owner(project, actor)?;
    match project.status {
        ProjectStatus::Open | ProjectStatus::Cancelled => Ok(()),
        _ => Err(AppError::invalid_state(
            "Projects with an assigned freelancer cannot be deleted.",
        )),
    }
}

/// `open -> cancelled`. A pending offer is withdrawn along with the project.
pub fn cancel_project(project: &mut Project, actor: &Actor, now: DateTime<Utc>) -> AppResult<()> {
    require_owner(project, actor)?;
    if project.status != ProjectStatus::Open {
        return Err(AppError::invalid_state("Only open projects can be cancelled."));
    }
    project.status = ProjectStatus::Cancelled;
    if let Some(contract) = project.pending_contract_mut() {
        contract.status = ContractStatus::Cancelled;
        contract.updated_at = now;
    }
    Ok(())
}

/// Execution-phase writes are reserved to the assigned freelancer of an
/// in-progress project.
fn require_executing(project: &Project, actor: &Actor) -> AppResult<()> {
    actor.require_role(&[Role::Freelancer])?;
    if project.assigned_freelancer.as_deref() != Some(actor.id.as_str()) {
        return Err(AppError::forbidden(
            "Only the assigned freelancer can update execution details.",
        ));
    }
    if project.status != ProjectStatus::InProgress {
        return Err(AppError::invalid_state("Project is not in progress."));
    }
    Ok(())
}

pub fn update_progress(project: &mut Project, actor: &Actor, value: Option<i64>) -> AppResult<u8> {
    let value = value.ok_or_else(|| AppError::validation("Progress is required."))?;
    let value = u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| AppError::validation("Progress must be between 0 and 100."))?;
    require_executing(project, actor)?;
    project.progress = value;
    Ok(value)
}

pub fn add_milestone<'p>(
    project: &'p mut Project,
    actor: &Actor,
    input: &NewMilestone,
) -> AppResult<&'p [Milestone]> {
    let title = required_text(&input.title, "Title")?;
    require_executing(project, actor)?;
    project.milestones.push(Milestone {
        id: Uuid::new_v4().to_string(),
        title,
        status: MilestoneStatus::Pending,
        due_date: input.due_date,
        completed_at: None,
    });
    Ok(&project.milestones)
}

pub fn set_milestone_status<'p>(
    project: &'p mut Project,
    actor: &Actor,
    target: &MilestoneRef,
    status: MilestoneStatus,
    now: DateTime<Utc>,
) -> AppResult<&'p Milestone> {
    require_executing(project, actor)?;
    let milestone = match target {
        MilestoneRef::Index(idx) => project.milestones.get_mut(*idx),
        MilestoneRef::Id(id) => project.milestones.iter_mut().find(|m| &m.id == id),
    }
    .ok_or_else(|| {
        let label = match target {
            MilestoneRef::Index(idx) => idx.to_string(),
            MilestoneRef::Id(id) => id.clone(),
        };
        AppError::not_found("milestone", label)
    })?;

    milestone.status = status;
    milestone.completed_at = match status {
        MilestoneStatus::Completed => Some(now),
        MilestoneStatus::Pending => None,
    };
    Ok(milestone)
}

pub fn add_time_log<'p>(
    project: &'p mut Project,
    actor: &Actor,
    input: &NewTimeLog,
) -> AppResult<&'p [TimeLog]> {
    let start = input
        .start
        .ok_or_else(|| AppError::validation("Start time is required."))?;
    if matches!(input.end, Some(end) if end < start) {
        return Err(AppError::validation("End time must not precede start time."));
    }
    if matches!(input.duration, Some(d) if d < 0) {
        return Err(AppError::validation("Duration must not be negative."));
    }
    require_executing(project, actor)?;

    let duration = input
        .duration
        .or_else(|| input.end.map(|end| (end - start).num_minutes()));
    project.time_logs.push(TimeLog {
        start,
        end: input.end,
        duration,
    });
    Ok(&project.time_logs)
}

/// Only the assigned freelancer may close the project. Milestone state is
/// not consulted.
pub fn mark_completed(project: &mut Project, actor: &Actor) -> AppResult<()> {
    if project.assigned_freelancer.as_deref() != Some(actor.id.as_str()) {
        return Err(AppError::forbidden(
            "Only assigned freelancer can mark as completed.",
        ));
    }
    if project.status != ProjectStatus::InProgress {
        return Err(AppError::invalid_state("Project is not in progress."));
    }
    project.status = ProjectStatus::Completed;
    Ok(())
}
