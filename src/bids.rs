// src/bids.rs
//! Bid ledger: proposal intake, partial edits and aggregation over the
//! ordered bid sequence embedded in a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::error::{AppError, AppResult};
use crate::models::{Bid, BidStatus, Project, ProjectStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct NewBid {
    #[serde(default)]
    pub message: Option<String>,
    pub amount: Option<f64>,
}

/// Only the supplied fields change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BidPatch {
    pub message: Option<String>,
    pub amount: Option<f64>,
    pub status: Option<BidStatus>,
}

impl BidPatch {
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.amount.is_none() && self.status.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidAnalytics {
    pub count: usize,
    pub avg_amount: f64,
}

fn validate_amount(amount: f64) -> AppResult<f64> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::validation("Amount must be a non-negative number."));
    }
    Ok(amount)
}

/// Appends a pending bid from `actor` and returns it.
pub fn add_bid<'p>(
    project: &'p mut Project,
    actor: &Actor,
    bid: &NewBid,
    now: DateTime<Utc>,
) -> AppResult<&'p Bid> {
    actor.require_role(&[Role::Freelancer])?;
    let amount = bid
        .amount
        .ok_or_else(|| AppError::validation("Amount is required."))
        .and_then(validate_amount)?;
    if project.status != ProjectStatus::Open {
        return Err(AppError::invalid_state("Project is not open for bids."));
    }

    project.bids.push(Bid {
        id: Uuid::new_v4().to_string(),
        freelancer_id: actor.id.clone(),
        message: bid.message.clone().unwrap_or_default(),
        amount,
        status: BidStatus::Pending,
        created_at: now,
    });
    let idx = project.bids.len() - 1;
    Ok(&project.bids[idx])
}

/// Applies `patch` to the bid with `bid_id`. Either the bidding freelancer or
/// the project's client may edit, until a contract has been accepted.
pub fn edit_bid<'p>(
    project: &'p mut Project,
    actor: &Actor,
    bid_id: &str,
    patch: &BidPatch,
) -> AppResult<&'p Bid> {
    actor.require_role(&[Role::Client, Role::Freelancer])?;
    if patch.is_empty() {
        return Err(AppError::validation("No fields to update."));
    }
    if let Some(amount) = patch.amount {
        validate_amount(amount)?;
    }
    if project.has_accepted_contract() {
        return Err(AppError::invalid_state(
            "Bids are frozen once a contract has been accepted.",
        ));
    }

    let is_client = project.is_owned_by(&actor.id);
    let bid = project
        .bids
        .iter_mut()
        .find(|b| b.id == bid_id)
        .ok_or_else(|| AppError::not_found("bid", bid_id))?;
    if !is_client && bid.freelancer_id != actor.id {
        return Err(AppError::forbidden("Not authorized to edit this bid."));
    }

    if let Some(message) = &patch.message {
        bid.message = message.clone();
    }
    if let Some(amount) = patch.amount {
        bid.amount = amount;
    }
    if let Some(status) = patch.status {
        bid.status = status;
    }
    Ok(bid)
}

/// Count and mean amount over every bid regardless of status; mean is 0 when empty.
pub fn analytics(bids: &[Bid]) -> BidAnalytics {
    let count = bids.len();
    let avg_amount = if count == 0 {
        0.0
    } else {
        bids.iter().map(|b| b.amount).sum::<f64>() / count as f64
    };
    BidAnalytics { count, avg_amount }
}

/// Marks every bid from `freelancer_id` accepted and every other bid rejected.
/// Matching is by freelancer, not by bid id.
pub fn settle(bids: &mut [Bid], freelancer_id: &str) {
    for bid in bids.iter_mut() {
        bid.status = if bid.freelancer_id == freelancer_id {
            BidStatus::Accepted
        } else {
            BidStatus::Rejected
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contract, ContractStatus};

    fn open_project() -> Project {
        Project::new("client-1", "Landing page", "One pager", Utc::now())
    }

    fn freelancer(id: &str) -> Actor {
        Actor::new(id, Role::Freelancer)
    }

    fn bid(amount: f64) -> NewBid {
        NewBid {
            message: Some("I can do it".to_string()),
            amount: Some(amount),
        }
    }

    #[test]
    fn add_bid_appends_pending_bid_in_order() {
        let mut project = open_project();
        add_bid(&mut project, &freelancer("f-1"), &bid(100.0), Utc::now()).unwrap();
        add_bid(&mut project, &freelancer("f-2"), &bid(200.0), Utc::now()).unwrap();

        assert_eq!(project.bids.len(), 2);
        assert_eq!(project.bids[0].freelancer_id, "f-1");
        assert_eq!(project.bids[1].freelancer_id, "f-2");
        assert!(project.bids.iter().all(|b| b.status == BidStatus::Pending));
    }

    #[test]
    fn add_bid_requires_amount_and_freelancer_role() {
        let mut project = open_project();
        let missing = NewBid {
            message: None,
            amount: None,
        };
        assert!(matches!(
            add_bid(&mut project, &freelancer("f-1"), &missing, Utc::now()),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            add_bid(&mut project, &freelancer("f-1"), &bid(-5.0), Utc::now()),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            add_bid(&mut project, &Actor::new("c-9", Role::Client), &bid(10.0), Utc::now()),
            Err(AppError::Forbidden(_))
        ));
        assert!(project.bids.is_empty());
    }

    #[test]
    fn zero_amount_is_a_valid_bid() {
        let mut project = open_project();
        let added = add_bid(&mut project, &freelancer("f-1"), &bid(0.0), Utc::now()).unwrap();
        assert_eq!(added.amount, 0.0);
    }

    #[test]
    fn add_bid_on_closed_project_is_invalid_state() {
        let mut project = open_project();
        project.status = ProjectStatus::Cancelled;
        assert!(matches!(
            add_bid(&mut project, &freelancer("f-1"), &bid(10.0), Utc::now()),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn edit_bid_changes_only_supplied_fields() {
        let mut project = open_project();
        let id = add_bid(&mut project, &freelancer("f-1"), &bid(100.0), Utc::now())
            .unwrap()
            .id
            .clone();

        let patch = BidPatch {
            amount: Some(120.0),
            ..BidPatch::default()
        };
        let edited = edit_bid(&mut project, &freelancer("f-1"), &id, &patch).unwrap();
        assert_eq!(edited.amount, 120.0);
        assert_eq!(edited.message, "I can do it");
        assert_eq!(edited.status, BidStatus::Pending);
    }

    #[test]
    fn client_may_edit_status_but_other_freelancers_may_not() {
        let mut project = open_project();
        let id = add_bid(&mut project, &freelancer("f-1"), &bid(100.0), Utc::now())
            .unwrap()
            .id
            .clone();

        let reject = BidPatch {
            status: Some(BidStatus::Rejected),
            ..BidPatch::default()
        };
        assert!(matches!(
            edit_bid(&mut project, &freelancer("f-2"), &id, &reject),
            Err(AppError::Forbidden(_))
        ));
        let client = Actor::new("client-1", Role::Client);
        let edited = edit_bid(&mut project, &client, &id, &reject).unwrap();
        assert_eq!(edited.status, BidStatus::Rejected);
    }

    #[test]
    fn edit_missing_bid_is_not_found() {
        let mut project = open_project();
        let patch = BidPatch {
            message: Some("hi".to_string()),
            ..BidPatch::default()
        };
        assert!(matches!(
            edit_bid(&mut project, &freelancer("f-1"), "nope", &patch),
            Err(AppError::NotFound { .. })
        ));
    }

    #[test]
    fn edit_after_accepted_contract_is_invalid_state() {
        let mut project = open_project();
        let id = add_bid(&mut project, &freelancer("f-1"), &bid(100.0), Utc::now())
            .unwrap()
            .id
            .clone();
        project.contract = Some(Contract {
            project_id: project.id.clone(),
            client_id: "client-1".to_string(),
            freelancer_id: "f-1".to_string(),
            price: 100.0,
            deadline: Utc::now(),
            status: ContractStatus::Accepted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        let patch = BidPatch {
            amount: Some(1.0),
            ..BidPatch::default()
        };
        assert!(matches!(
            edit_bid(&mut project, &freelancer("f-1"), &id, &patch),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn analytics_tracks_count_and_mean() {
        let mut project = open_project();
        assert_eq!(
            analytics(&project.bids),
            BidAnalytics {
                count: 0,
                avg_amount: 0.0
            }
        );

        for (i, amount) in [100.0, 200.0, 0.0, 300.0].into_iter().enumerate() {
            add_bid(&mut project, &freelancer(&format!("f-{i}")), &bid(amount), Utc::now())
                .unwrap();
        }
        let first = project.bids[0].id.clone();
        let patch = BidPatch {
            amount: Some(400.0),
            status: Some(BidStatus::Rejected),
            ..BidPatch::default()
        };
        edit_bid(&mut project, &freelancer("f-0"), &first, &patch).unwrap();

        let stats = analytics(&project.bids);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.avg_amount, 225.0);
    }

    #[test]
    fn settle_partitions_by_freelancer() {
        let mut project = open_project();
        for id in ["f-1", "f-2", "f-1", "f-3"] {
            add_bid(&mut project, &freelancer(id), &bid(50.0), Utc::now()).unwrap();
        }
        settle(&mut project.bids, "f-1");
        let statuses: Vec<_> = project.bids.iter().map(|b| b.status).collect();
        assert_eq!(
            statuses,
            vec![
                BidStatus::Accepted,
                BidStatus::Rejected,
                BidStatus::Accepted,
                BidStatus::Rejected
            ]
        );
    }
}
