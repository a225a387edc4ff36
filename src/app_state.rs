use crate::fanout::FanoutServer;
use crate::service::ProjectService;
use actix::Addr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub fanout: Addr<FanoutServer>,
    pub projects: Arc<ProjectService>,
}
