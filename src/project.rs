// src/project.rs

use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::{Actor, Role};
use crate::bids::{BidPatch, NewBid};
use crate::error::AppError;
use crate::lifecycle::{MilestoneRef, NewMilestone, NewProject, NewTimeLog, ProjectPatch};
use crate::models::MilestoneStatus;
use crate::negotiation::{OfferPatch, OfferResponse, OfferTerms};
use crate::store::ProjectFilter;
use crate::ws::ws_index;

type HandlerResult = Result<HttpResponse, AppError>;

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub progress: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MilestoneStatusRequest {
    pub status: Option<MilestoneStatus>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub action: Option<OfferResponse>,
}

/// GET /api/health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

// ─── PROJECTS ────────────────────────────────────────────────────────────────

/// POST /api/projects
pub async fn create_project(
    data: web::Data<AppState>,
    actor: Actor,
    body: web::Json<NewProject>,
) -> HandlerResult {
    debug!("create_project by {} with payload: {:?}", actor.id, body);
    actor.require_role(&[Role::Client])?;
    let project = data.projects.create_project(&actor, &body).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Project created successfully.",
        "project": project,
    })))
}

/// GET /api/projects?status=open&clientId=...
pub async fn list_projects(
    data: web::Data<AppState>,
    filter: web::Query<ProjectFilter>,
) -> HandlerResult {
    let projects = data.projects.list_projects(&filter).await?;
    Ok(HttpResponse::Ok().json(projects))
}

/// GET /api/projects/{project_id}
pub async fn get_project(data: web::Data<AppState>, project_id: web::Path<String>) -> HandlerResult {
    let project = data.projects.get_project(&project_id).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// PUT /api/projects/{project_id}
pub async fn update_project(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
    body: web::Json<ProjectPatch>,
) -> HandlerResult {
    debug!("update_project {} with payload: {:?}", project_id, body);
    actor.require_role(&[Role::Client])?;
    let project = data
        .projects
        .update_project(&project_id, &actor, &body)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Project updated.", "project": project })))
}

/// DELETE /api/projects/{project_id}
pub async fn delete_project(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
) -> HandlerResult {
    actor.require_role(&[Role::Client])?;
    data.projects.delete_project(&project_id, &actor).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Project deleted." })))
}

/// POST /api/projects/{project_id}/cancel
pub async fn cancel_project(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
) -> HandlerResult {
    actor.require_role(&[Role::Client])?;
    let project = data.projects.cancel_project(&project_id, &actor).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Project cancelled.", "project": project })))
}

// ─── BIDS ────────────────────────────────────────────────────────────────────

/// POST /api/projects/{project_id}/bids
pub async fn add_bid(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
    body: web::Json<NewBid>,
) -> HandlerResult {
    debug!("add_bid on {} by {}: {:?}", project_id, actor.id, body);
    actor.require_role(&[Role::Freelancer])?;
    let bids = data.projects.add_bid(&project_id, &actor, &body).await?;
    Ok(HttpResponse::Created().json(json!({ "message": "Bid added.", "bids": bids })))
}

/// GET /api/projects/{project_id}/bids
pub async fn list_bids(
    data: web::Data<AppState>,
    _actor: Actor,
    project_id: web::Path<String>,
) -> HandlerResult {
    let bids = data.projects.list_bids(&project_id).await?;
    Ok(HttpResponse::Ok().json(bids))
}

/// GET /api/projects/{project_id}/bids/analytics
pub async fn bid_analytics(
    data: web::Data<AppState>,
    _actor: Actor,
    project_id: web::Path<String>,
) -> HandlerResult {
    let stats = data.projects.bid_analytics(&project_id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

/// PUT /api/projects/{project_id}/bids/{bid_id}
pub async fn edit_bid(
    data: web::Data<AppState>,
    actor: Actor,
    path: web::Path<(String, String)>,
    body: web::Json<BidPatch>,
) -> HandlerResult {
    let (project_id, bid_id) = path.into_inner();
    debug!("edit_bid {} on {}: {:?}", bid_id, project_id, body);
    actor.require_role(&[Role::Client, Role::Freelancer])?;
    let bid = data
        .projects
        .edit_bid(&project_id, &actor, &bid_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Bid updated.", "bid": bid })))
}

// ─── EXECUTION ───────────────────────────────────────────────────────────────

/// PATCH /api/projects/{project_id}/progress
pub async fn update_progress(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
    body: web::Json<ProgressRequest>,
) -> HandlerResult {
    actor.require_role(&[Role::Freelancer])?;
    let progress = data
        .projects
        .update_progress(&project_id, &actor, body.progress)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Progress updated.", "progress": progress })))
}

/// POST /api/projects/{project_id}/milestones
pub async fn add_milestone(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
    body: web::Json<NewMilestone>,
) -> HandlerResult {
    actor.require_role(&[Role::Freelancer])?;
    let milestones = data
        .projects
        .add_milestone(&project_id, &actor, &body)
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Milestone added.",
        "milestones": milestones,
    })))
}

/// PATCH /api/projects/{project_id}/milestones/{milestone}
/// `milestone` is either a zero-based position or a milestone id.
pub async fn update_milestone(
    data: web::Data<AppState>,
    actor: Actor,
    path: web::Path<(String, String)>,
    body: web::Json<MilestoneStatusRequest>,
) -> HandlerResult {
    let (project_id, milestone) = path.into_inner();
    actor.require_role(&[Role::Freelancer])?;
    let status = body
        .status
        .ok_or_else(|| AppError::validation("Status is required."))?;
    let milestone = data
        .projects
        .set_milestone_status(&project_id, &actor, &MilestoneRef::from(milestone.as_str()), status)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Milestone status updated.",
        "milestone": milestone,
    })))
}

/// POST /api/projects/{project_id}/timelogs
pub async fn add_time_log(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
    body: web::Json<NewTimeLog>,
) -> HandlerResult {
    actor.require_role(&[Role::Freelancer])?;
    let time_logs = data
        .projects
        .add_time_log(&project_id, &actor, &body)
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Time log added.",
        "timeLogs": time_logs,
    })))
}

/// POST /api/projects/{project_id}/complete
pub async fn mark_completed(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
) -> HandlerResult {
    actor.require_role(&[Role::Freelancer])?;
    data.projects.mark_completed(&project_id, &actor).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Project marked as completed." })))
}

// ─── OFFERS ──────────────────────────────────────────────────────────────────

/// POST /api/projects/{project_id}/offer
pub async fn send_offer(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
    body: web::Json<OfferTerms>,
) -> HandlerResult {
    debug!("send_offer on {}: {:?}", project_id, body);
    actor.require_role(&[Role::Client])?;
    let contract = data.projects.send_offer(&project_id, &actor, &body).await?;
    Ok(HttpResponse::Created().json(json!({ "message": "Offer sent.", "contract": contract })))
}

/// PUT /api/projects/{project_id}/offer
pub async fn edit_offer(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
    body: web::Json<OfferPatch>,
) -> HandlerResult {
    actor.require_role(&[Role::Client])?;
    let contract = data.projects.edit_offer(&project_id, &actor, &body).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Offer updated.", "contract": contract })))
}

/// POST /api/projects/{project_id}/offer/cancel
pub async fn cancel_offer(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
) -> HandlerResult {
    let contract = data.projects.cancel_offer(&project_id, &actor).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Offer cancelled.", "contract": contract })))
}

/// POST /api/projects/{project_id}/offer/respond
pub async fn respond_to_offer(
    data: web::Data<AppState>,
    actor: Actor,
    project_id: web::Path<String>,
    body: web::Json<RespondRequest>,
) -> HandlerResult {
    actor.require_role(&[Role::Freelancer])?;
    let action = body
        .action
        .ok_or_else(|| AppError::validation("Invalid action."))?;
    let contract = data
        .projects
        .respond_to_offer(&project_id, &actor, action)
        .await?;
    let message = match action {
        OfferResponse::Accept => "Offer accepted.",
        OfferResponse::Reject => "Offer rejected.",
    };
    Ok(HttpResponse::Ok().json(json!({ "message": message, "contract": contract })))
}

fn json_error(err: actix_web::error::JsonPayloadError, _: &HttpRequest) -> actix_web::Error {
    AppError::validation(format!("Invalid request body: {}", err)).into()
}

fn path_error(err: actix_web::error::PathError, _: &HttpRequest) -> actix_web::Error {
    AppError::validation(format!("Invalid path: {}", err)).into()
}

fn query_error(err: actix_web::error::QueryPayloadError, _: &HttpRequest) -> actix_web::Error {
    AppError::validation(format!("Invalid query: {}", err)).into()
}

/// Registers the `/api` routes and the `/ws` upgrade. Callers supply
/// `web::Data<AppState>` and the `Authentication` middleware.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(health))
                .service(
                    web::scope("/projects")
                        .route("", web::post().to(create_project))
                        .route("", web::get().to(list_projects))
                        .service(
                            web::scope("/{project_id}")
                                .route("", web::get().to(get_project))
                                .route("", web::put().to(update_project))
                                .route("", web::delete().to(delete_project))
                                .route("/cancel", web::post().to(cancel_project))
                                .route("/complete", web::post().to(mark_completed))
                                .route("/progress", web::patch().to(update_progress))
                                .route("/timelogs", web::post().to(add_time_log))
                                .service(
                                    web::scope("/bids")
                                        .route("", web::post().to(add_bid))
                                        .route("", web::get().to(list_bids))
                                        .route("/analytics", web::get().to(bid_analytics))
                                        .route("/{bid_id}", web::put().to(edit_bid)),
                                )
                                .service(
                                    web::scope("/milestones")
                                        .route("", web::post().to(add_milestone))
                                        .route("/{milestone}", web::patch().to(update_milestone)),
                                )
                                .service(
                                    web::scope("/offer")
                                        .route("", web::post().to(send_offer))
                                        .route("", web::put().to(edit_offer))
                                        .route("/cancel", web::post().to(cancel_offer))
                                        .route("/respond", web::post().to(respond_to_offer)),
                                ),
                        ),
                ),
        )
        .service(web::resource("/ws").route(web::get().to(ws_index)));
}
