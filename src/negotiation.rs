// src/negotiation.rs
//! Offer/contract sub-protocol.
//!
//! A project holds at most one contract value. `pending` moves to exactly one
//! of `accepted`, `rejected` or `cancelled`, all terminal; a later offer
//! replaces a terminal contract outright.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::{Actor, Role};
use crate::bids;
use crate::error::{AppError, AppResult};
use crate::models::{Contract, ContractStatus, Project, ProjectStatus};

/// What `send_offer` does with a pending offer addressed to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OfferPolicy {
    /// Replace it silently.
    #[default]
    Overwrite,
    /// Refuse until it has been cancelled or answered.
    RequireCancel,
}

impl std::str::FromStr for OfferPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(OfferPolicy::Overwrite),
            "require_cancel" => Ok(OfferPolicy::RequireCancel),
            other => Err(format!("unknown offer policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferTerms {
    pub freelancer_id: Option<String>,
    pub price: Option<f64>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferPatch {
    pub price: Option<f64>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferResponse {
    Accept,
    Reject,
}

fn validate_price(price: f64) -> AppResult<f64> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::validation("Price must be greater than zero."));
    }
    Ok(price)
}

fn no_pending(action: &str) -> AppError {
    AppError::invalid_state(format!("No pending offer to {}.", action))
}

pub fn send_offer<'p>(
    project: &'p mut Project,
    actor: &Actor,
    terms: &OfferTerms,
    policy: OfferPolicy,
    now: DateTime<Utc>,
) -> AppResult<&'p Contract> {
    actor.require_role(&[Role::Client])?;
    let (freelancer_id, price, deadline) = match (&terms.freelancer_id, terms.price, terms.deadline) {
        (Some(f), Some(p), Some(d)) if !f.trim().is_empty() => (f.clone(), p, d),
        _ => {
            return Err(AppError::validation(
                "Freelancer, price, and deadline are required.",
            ))
        }
    };
    let price = validate_price(price)?;
    actor.require_identity(&project.client_id, "Not authorized.")?;
    if project.status != ProjectStatus::Open {
        return Err(AppError::invalid_state("Project is not open for offers."));
    }

    if let Some(pending) = project.pending_contract() {
        if pending.freelancer_id == freelancer_id {
            return Err(AppError::duplicate("Offer already sent to this freelancer."));
        }
        if policy == OfferPolicy::RequireCancel {
            return Err(AppError::duplicate(
                "Another offer is pending; cancel it before sending a new one.",
            ));
        }
    }

    let contract = project.contract.insert(Contract {
        project_id: project.id.clone(),
        client_id: actor.id.clone(),
        freelancer_id,
        price,
        deadline,
        status: ContractStatus::Pending,
        created_at: now,
        updated_at: now,
    });
    Ok(contract)
}

pub fn edit_offer<'p>(
    project: &'p mut Project,
    actor: &Actor,
    patch: &OfferPatch,
    now: DateTime<Utc>,
) -> AppResult<&'p Contract> {
    actor.require_role(&[Role::Client])?;
    if project.pending_contract().is_none() {
        return Err(no_pending("edit"));
    }
    actor.require_identity(&project.client_id, "Not authorized.")?;
    if let Some(price) = patch.price {
        validate_price(price)?;
    }

    let contract = project.pending_contract_mut().ok_or_else(|| no_pending("edit"))?;
    if let Some(price) = patch.price {
        contract.price = price;
    }
    if let Some(deadline) = patch.deadline {
        contract.deadline = deadline;
    }
    contract.updated_at = now;
    Ok(contract)
}

/// Either side may withdraw a pending offer. Project status and bids are untouched.
pub fn cancel_offer<'p>(
    project: &'p mut Project,
    actor: &Actor,
    now: DateTime<Utc>,
) -> AppResult<&'p Contract> {
    let client_id = project.client_id.clone();
    let contract = project
        .pending_contract_mut()
        .ok_or_else(|| no_pending("cancel"))?;
    if actor.id != client_id && actor.id != contract.freelancer_id {
        return Err(AppError::forbidden("Not authorized."));
    }
    contract.status = ContractStatus::Cancelled;
    contract.updated_at = now;
    Ok(contract)
}

/// The addressed freelancer accepts or rejects. Acceptance assigns the
/// freelancer, starts the project and settles every bid in one step.
pub fn respond_to_offer<'p>(
    project: &'p mut Project,
    actor: &Actor,
    response: OfferResponse,
    now: DateTime<Utc>,
) -> AppResult<&'p Contract> {
    actor.require_role(&[Role::Freelancer])?;
    let addressee = project
        .pending_contract()
        .map(|c| c.freelancer_id.clone())
        .ok_or_else(|| no_pending("respond to"))?;
    actor.require_identity(&addressee, "Not authorized.")?;

    match response {
        OfferResponse::Accept => {
            if project.status != ProjectStatus::Open {
                return Err(AppError::invalid_state("Project is no longer open."));
            }
            project.status = ProjectStatus::InProgress;
            project.assigned_freelancer = Some(actor.id.clone());
            bids::settle(&mut project.bids, &actor.id);
        }
        OfferResponse::Reject => {}
    }

    let contract = project
        .pending_contract_mut()
        .ok_or_else(|| no_pending("respond to"))?;
    contract.status = match response {
        OfferResponse::Accept => ContractStatus::Accepted,
        OfferResponse::Reject => ContractStatus::Rejected,
    };
    contract.updated_at = now;
    Ok(contract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bids::{add_bid, NewBid};
    use crate::models::BidStatus;
    use chrono::Duration;

    fn client() -> Actor {
        Actor::new("client-1", Role::Client)
    }

    fn freelancer(id: &str) -> Actor {
        Actor::new(id, Role::Freelancer)
    }

    fn terms(freelancer_id: &str, price: f64) -> OfferTerms {
        OfferTerms {
            freelancer_id: Some(freelancer_id.to_string()),
            price: Some(price),
            deadline: Some(Utc::now() + Duration::days(14)),
        }
    }

    fn project_with_bids(bidders: &[(&str, f64)]) -> Project {
        let mut project = Project::new("client-1", "API", "Build an API", Utc::now());
        for (id, amount) in bidders {
            let bid = NewBid {
                message: None,
                amount: Some(*amount),
            };
            add_bid(&mut project, &freelancer(id), &bid, Utc::now()).unwrap();
        }
        project
    }

    #[test]
    fn scenario_offer_accepted_assigns_and_settles_bids() {
        let mut project = project_with_bids(&[("f-1", 100.0), ("f-2", 200.0)]);
        send_offer(&mut project, &client(), &terms("f-1", 150.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();
        let contract =
            respond_to_offer(&mut project, &freelancer("f-1"), OfferResponse::Accept, Utc::now())
                .unwrap();
        assert_eq!(contract.status, ContractStatus::Accepted);

        assert_eq!(project.status, ProjectStatus::InProgress);
        assert_eq!(project.assigned_freelancer.as_deref(), Some("f-1"));
        assert_eq!(project.bids[0].status, BidStatus::Accepted);
        assert_eq!(project.bids[1].status, BidStatus::Rejected);
        assert!(project.assignment_is_consistent());
    }

    #[test]
    fn second_offer_to_other_freelancer_overwrites_first() {
        let mut project = project_with_bids(&[]);
        send_offer(&mut project, &client(), &terms("f-1", 150.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();
        send_offer(&mut project, &client(), &terms("f-2", 175.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();

        let contract = project.contract.as_ref().unwrap();
        assert_eq!(contract.freelancer_id, "f-2");
        assert_eq!(contract.price, 175.0);
        assert!(contract.is_pending());
    }

    #[test]
    fn require_cancel_policy_refuses_to_replace_pending_offer() {
        let mut project = project_with_bids(&[]);
        send_offer(&mut project, &client(), &terms("f-1", 150.0), OfferPolicy::RequireCancel, Utc::now())
            .unwrap();
        let err = send_offer(
            &mut project,
            &client(),
            &terms("f-2", 175.0),
            OfferPolicy::RequireCancel,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict { retryable: false, .. }));

        cancel_offer(&mut project, &client(), Utc::now()).unwrap();
        send_offer(&mut project, &client(), &terms("f-2", 175.0), OfferPolicy::RequireCancel, Utc::now())
            .unwrap();
        assert_eq!(project.contract.as_ref().unwrap().freelancer_id, "f-2");
    }

    #[test]
    fn duplicate_offer_to_same_freelancer_conflicts() {
        let mut project = project_with_bids(&[]);
        send_offer(&mut project, &client(), &terms("f-1", 150.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();
        let err = send_offer(&mut project, &client(), &terms("f-1", 160.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { retryable: false, .. }));
        assert_eq!(project.contract.as_ref().unwrap().price, 150.0);
    }

    #[test]
    fn offer_after_rejection_to_same_freelancer_is_allowed() {
        let mut project = project_with_bids(&[]);
        send_offer(&mut project, &client(), &terms("f-1", 150.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();
        respond_to_offer(&mut project, &freelancer("f-1"), OfferResponse::Reject, Utc::now()).unwrap();
        assert_eq!(project.status, ProjectStatus::Open);

        send_offer(&mut project, &client(), &terms("f-1", 180.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();
        assert!(project.contract.as_ref().unwrap().is_pending());
    }

    #[test]
    fn send_offer_checks_owner_status_and_fields() {
        let mut project = project_with_bids(&[]);
        let stranger = Actor::new("client-2", Role::Client);
        assert!(matches!(
            send_offer(&mut project, &stranger, &terms("f-1", 10.0), OfferPolicy::Overwrite, Utc::now()),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            send_offer(&mut project, &client(), &terms("f-1", 0.0), OfferPolicy::Overwrite, Utc::now()),
            Err(AppError::Validation(_))
        ));
        let mut incomplete = terms("f-1", 10.0);
        incomplete.deadline = None;
        assert!(matches!(
            send_offer(&mut project, &client(), &incomplete, OfferPolicy::Overwrite, Utc::now()),
            Err(AppError::Validation(_))
        ));

        project.status = ProjectStatus::Cancelled;
        assert!(matches!(
            send_offer(&mut project, &client(), &terms("f-1", 10.0), OfferPolicy::Overwrite, Utc::now()),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn edit_offer_patches_pending_contract_only() {
        let mut project = project_with_bids(&[]);
        let patch = OfferPatch {
            price: Some(300.0),
            deadline: None,
        };
        assert!(matches!(
            edit_offer(&mut project, &client(), &patch, Utc::now()),
            Err(AppError::InvalidState(_))
        ));

        send_offer(&mut project, &client(), &terms("f-1", 150.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();
        let before = project.contract.as_ref().unwrap().deadline;
        let later = Utc::now() + Duration::seconds(5);
        let edited = edit_offer(&mut project, &client(), &patch, later).unwrap();
        assert_eq!(edited.price, 300.0);
        assert_eq!(edited.deadline, before);
        assert_eq!(edited.updated_at, later);

        let stranger = Actor::new("client-2", Role::Client);
        assert!(matches!(
            edit_offer(&mut project, &stranger, &patch, Utc::now()),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn cancel_offer_by_either_party_leaves_project_untouched() {
        let mut project = project_with_bids(&[("f-1", 100.0)]);
        send_offer(&mut project, &client(), &terms("f-1", 150.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();
        assert!(matches!(
            cancel_offer(&mut project, &freelancer("f-9"), Utc::now()),
            Err(AppError::Forbidden(_))
        ));

        let cancelled = cancel_offer(&mut project, &freelancer("f-1"), Utc::now()).unwrap();
        assert_eq!(cancelled.status, ContractStatus::Cancelled);
        assert_eq!(project.status, ProjectStatus::Open);
        assert_eq!(project.bids[0].status, BidStatus::Pending);

        assert!(matches!(
            cancel_offer(&mut project, &client(), Utc::now()),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn only_addressed_freelancer_may_respond() {
        let mut project = project_with_bids(&[]);
        send_offer(&mut project, &client(), &terms("f-1", 150.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();
        assert!(matches!(
            respond_to_offer(&mut project, &freelancer("f-2"), OfferResponse::Accept, Utc::now()),
            Err(AppError::Forbidden(_))
        ));
        assert!(project.contract.as_ref().unwrap().is_pending());
        assert_eq!(project.status, ProjectStatus::Open);
    }

    #[test]
    fn terminal_contract_cannot_be_answered_again() {
        let mut project = project_with_bids(&[]);
        send_offer(&mut project, &client(), &terms("f-1", 150.0), OfferPolicy::Overwrite, Utc::now())
            .unwrap();
        respond_to_offer(&mut project, &freelancer("f-1"), OfferResponse::Accept, Utc::now()).unwrap();
        assert!(matches!(
            respond_to_offer(&mut project, &freelancer("f-1"), OfferResponse::Reject, Utc::now()),
            Err(AppError::InvalidState(_))
        ));
        assert_eq!(
            project.contract.as_ref().unwrap().status,
            ContractStatus::Accepted
        );
    }

    #[test]
    fn acceptance_partition_holds_for_any_number_of_bids() {
        for n in 0..6 {
            let bidders: Vec<(String, f64)> =
                (0..n).map(|i| (format!("f-{i}"), 10.0 * i as f64)).collect();
            let refs: Vec<(&str, f64)> = bidders.iter().map(|(id, a)| (id.as_str(), *a)).collect();
            let mut project = project_with_bids(&refs);

            send_offer(&mut project, &client(), &terms("f-0", 99.0), OfferPolicy::Overwrite, Utc::now())
                .unwrap();
            respond_to_offer(&mut project, &freelancer("f-0"), OfferResponse::Accept, Utc::now())
                .unwrap();

            let accepted = project
                .bids
                .iter()
                .filter(|b| b.status == BidStatus::Accepted)
                .count();
            let rejected = project
                .bids
                .iter()
                .filter(|b| b.status == BidStatus::Rejected)
                .count();
            assert_eq!(accepted, usize::from(n > 0));
            assert_eq!(accepted + rejected, n);
        }
    }

    #[test]
    fn offer_policy_parses_from_config_strings() {
        assert_eq!("overwrite".parse::<OfferPolicy>(), Ok(OfferPolicy::Overwrite));
        assert_eq!(
            "REQUIRE_CANCEL".parse::<OfferPolicy>(),
            Ok(OfferPolicy::RequireCancel)
        );
        assert!("sometimes".parse::<OfferPolicy>().is_err());
    }
}
