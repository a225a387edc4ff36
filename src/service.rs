// src/service.rs
//! Request-level operations on projects.
//!
//! Each mutation loads the project, applies one domain function in memory
//! and commits with a version check. A lost race reloads and reapplies; a
//! domain error ends the request. Bid and contract changes are published
//! only after the commit has landed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::auth::Actor;
use crate::bids::{self, BidAnalytics, BidPatch, NewBid};
use crate::error::{AppError, AppResult};
use crate::fanout::{EventPublisher, ProjectEvent};
use crate::lifecycle::{
    self, MilestoneRef, NewMilestone, NewProject, NewTimeLog, ProjectPatch,
};
use crate::models::{Bid, Contract, Milestone, MilestoneStatus, Project, TimeLog};
use crate::negotiation::{self, OfferPatch, OfferPolicy, OfferResponse, OfferTerms};
use crate::store::{CommitOutcome, ProjectFilter, ProjectStore};

pub struct ProjectService {
    store: Arc<dyn ProjectStore>,
    publisher: Arc<dyn EventPublisher>,
    commit_attempts: u32,
    offer_policy: OfferPolicy,
}

impl ProjectService {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        publisher: Arc<dyn EventPublisher>,
        commit_attempts: u32,
        offer_policy: OfferPolicy,
    ) -> Self {
        ProjectService {
            store,
            publisher,
            commit_attempts: commit_attempts.max(1),
            offer_policy,
        }
    }

    async fn load(&self, project_id: &str) -> AppResult<Project> {
        self.store
            .get(project_id)
            .await?
            .ok_or_else(|| AppError::not_found("project", project_id))
    }

    /// Load, apply, compare-and-swap; repeated until the swap lands or the
    /// attempt budget runs out.
    async fn commit<T, F>(&self, project_id: &str, mut apply: F) -> AppResult<(Project, T)>
    where
        F: FnMut(&mut Project, DateTime<Utc>) -> AppResult<T>,
    {
        for attempt in 1..=self.commit_attempts {
            let mut project = self.load(project_id).await?;
            let out = apply(&mut project, Utc::now())?;
            debug_assert!(
                project.assignment_is_consistent(),
                "assignment out of step with status on project {}",
                project_id
            );
            match self.store.replace_if_current(&project).await? {
                CommitOutcome::Committed { version } => {
                    project.version = version;
                    return Ok((project, out));
                }
                CommitOutcome::Stale { current_version } => {
                    warn!(
                        "Version conflict on project {} (attempt {}/{}, had {}, store has {:?}); reloading",
                        project_id, attempt, self.commit_attempts, project.version, current_version
                    );
                }
            }
        }
        Err(AppError::write_collision(format!(
            "Project {} is being modified concurrently; retry the request.",
            project_id
        )))
    }

    /// Best effort. A failed publish never undoes the committed change.
    fn publish(&self, event: ProjectEvent) {
        let kind = event.kind();
        let project_id = event.project_id().to_string();
        match self.publisher.notify(event) {
            Ok(()) => debug!("Queued {} for project {}", kind, project_id),
            Err(e) => warn!(
                "Delivery gap: {} for project {} was not published: {}",
                kind, project_id, e
            ),
        }
    }

    fn publish_bids(&self, project: &Project) {
        self.publish(ProjectEvent::BidUpdate {
            project_id: project.id.clone(),
            bids: project.bids.clone(),
        });
    }

    fn publish_contract(&self, project_id: &str, contract: &Contract) {
        self.publish(ProjectEvent::ContractUpdate {
            project_id: project_id.to_string(),
            contract: contract.clone(),
        });
    }

    // ─── PROJECTS ────────────────────────────────────────────────────────────

    pub async fn create_project(&self, actor: &Actor, input: &NewProject) -> AppResult<Project> {
        let project = lifecycle::create_project(actor, input, Utc::now())?;
        self.store.insert(&project).await?;
        info!("Project created {} by {}", project.id, actor.id);
        Ok(project)
    }

    pub async fn list_projects(&self, filter: &ProjectFilter) -> AppResult<Vec<Project>> {
        self.store.list(filter).await
    }

    pub async fn get_project(&self, project_id: &str) -> AppResult<Project> {
        self.load(project_id).await
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        actor: &Actor,
        patch: &ProjectPatch,
    ) -> AppResult<Project> {
        let (project, ()) = self
            .commit(project_id, |p, _| lifecycle::update_details(p, actor, patch))
            .await?;
        info!("Project {} updated", project_id);
        Ok(project)
    }

    pub async fn delete_project(&self, project_id: &str, actor: &Actor) -> AppResult<()> {
        for attempt in 1..=self.commit_attempts {
            let project = self.load(project_id).await?;
            lifecycle::ensure_deletable(&project, actor)?;
            if self
                .store
                .delete_if_current(project_id, project.version)
                .await?
            {
                info!("Project {} deleted", project_id);
                return Ok(());
            }
            warn!(
                "Version conflict deleting project {} (attempt {}/{}); reloading",
                project_id, attempt, self.commit_attempts
            );
        }
        Err(AppError::write_collision(format!(
            "Project {} is being modified concurrently; retry the request.",
            project_id
        )))
    }

    pub async fn cancel_project(&self, project_id: &str, actor: &Actor) -> AppResult<Project> {
        let (project, had_offer) = self
            .commit(project_id, |p, now| {
                let had_offer = p.pending_contract().is_some();
                lifecycle::cancel_project(p, actor, now).map(|()| had_offer)
            })
            .await?;
        info!("Project {} cancelled", project_id);
        if had_offer {
            if let Some(contract) = &project.contract {
                self.publish_contract(project_id, contract);
            }
        }
        Ok(project)
    }

    // ─── BIDS ────────────────────────────────────────────────────────────────

    pub async fn add_bid(&self, project_id: &str, actor: &Actor, bid: &NewBid) -> AppResult<Vec<Bid>> {
        let (project, added) = self
            .commit(project_id, |p, now| {
                bids::add_bid(p, actor, bid, now).map(|b| b.id.clone())
            })
            .await?;
        info!("Bid {} added to project {} by {}", added, project_id, actor.id);
        self.publish_bids(&project);
        Ok(project.bids)
    }

    pub async fn edit_bid(
        &self,
        project_id: &str,
        actor: &Actor,
        bid_id: &str,
        patch: &BidPatch,
    ) -> AppResult<Bid> {
        let (project, bid) = self
            .commit(project_id, |p, _| bids::edit_bid(p, actor, bid_id, patch).cloned())
            .await?;
        info!("Bid {} on project {} updated", bid_id, project_id);
        self.publish_bids(&project);
        Ok(bid)
    }

    pub async fn list_bids(&self, project_id: &str) -> AppResult<Vec<Bid>> {
        Ok(self.load(project_id).await?.bids)
    }

    pub async fn bid_analytics(&self, project_id: &str) -> AppResult<BidAnalytics> {
        let project = self.load(project_id).await?;
        Ok(bids::analytics(&project.bids))
    }

    // ─── EXECUTION ───────────────────────────────────────────────────────────

    pub async fn update_progress(
        &self,
        project_id: &str,
        actor: &Actor,
        value: Option<i64>,
    ) -> AppResult<u8> {
        let (_, progress) = self
            .commit(project_id, |p, _| lifecycle::update_progress(p, actor, value))
            .await?;
        info!("Project {} progress set to {}", project_id, progress);
        Ok(progress)
    }

    pub async fn add_milestone(
        &self,
        project_id: &str,
        actor: &Actor,
        input: &NewMilestone,
    ) -> AppResult<Vec<Milestone>> {
        let (project, ()) = self
            .commit(project_id, |p, _| {
                lifecycle::add_milestone(p, actor, input).map(|_| ())
            })
            .await?;
        Ok(project.milestones)
    }

    pub async fn set_milestone_status(
        &self,
        project_id: &str,
        actor: &Actor,
        target: &MilestoneRef,
        status: MilestoneStatus,
    ) -> AppResult<Milestone> {
        let (_, milestone) = self
            .commit(project_id, |p, now| {
                lifecycle::set_milestone_status(p, actor, target, status, now).cloned()
            })
            .await?;
        Ok(milestone)
    }

    pub async fn add_time_log(
        &self,
        project_id: &str,
        actor: &Actor,
        input: &NewTimeLog,
    ) -> AppResult<Vec<TimeLog>> {
        let (project, ()) = self
            .commit(project_id, |p, _| {
                lifecycle::add_time_log(p, actor, input).map(|_| ())
            })
            .await?;
        Ok(project.time_logs)
    }

    pub async fn mark_completed(&self, project_id: &str, actor: &Actor) -> AppResult<Project> {
        let (project, ()) = self
            .commit(project_id, |p, _| lifecycle::mark_completed(p, actor))
            .await?;
        info!("Project {} completed by {}", project_id, actor.id);
        Ok(project)
    }

    // ─── OFFERS ──────────────────────────────────────────────────────────────

    pub async fn send_offer(
        &self,
        project_id: &str,
        actor: &Actor,
        terms: &OfferTerms,
    ) -> AppResult<Contract> {
        let policy = self.offer_policy;
        let (_, contract) = self
            .commit(project_id, |p, now| {
                negotiation::send_offer(p, actor, terms, policy, now).cloned()
            })
            .await?;
        info!(
            "Offer sent on project {} to {}",
            project_id, contract.freelancer_id
        );
        self.publish_contract(project_id, &contract);
        Ok(contract)
    }

    pub async fn edit_offer(
        &self,
        project_id: &str,
        actor: &Actor,
        patch: &OfferPatch,
    ) -> AppResult<Contract> {
        let (_, contract) = self
            .commit(project_id, |p, now| {
                negotiation::edit_offer(p, actor, patch, now).cloned()
            })
            .await?;
        self.publish_contract(project_id, &contract);
        Ok(contract)
    }

    pub async fn cancel_offer(&self, project_id: &str, actor: &Actor) -> AppResult<Contract> {
        let (_, contract) = self
            .commit(project_id, |p, now| {
                negotiation::cancel_offer(p, actor, now).cloned()
            })
            .await?;
        info!("Offer on project {} cancelled by {}", project_id, actor.id);
        self.publish_contract(project_id, &contract);
        Ok(contract)
    }

    pub async fn respond_to_offer(
        &self,
        project_id: &str,
        actor: &Actor,
        response: OfferResponse,
    ) -> AppResult<Contract> {
        let (project, contract) = self
            .commit(project_id, |p, now| {
                negotiation::respond_to_offer(p, actor, response, now).cloned()
            })
            .await?;
        info!(
            "Offer on project {} answered {:?} by {}",
            project_id, response, actor.id
        );
        self.publish_contract(project_id, &contract);
        if response == OfferResponse::Accept {
            self.publish_bids(&project);
        }
        Ok(contract)
    }
}
