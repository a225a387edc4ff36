// src/fanout.rs
//! Project-scoped broadcast of bid and contract changes.
//!
//! Delivery is at-most-once to whoever is in the room at publish time. Mailboxes
//! are unbounded for publishes, so a burst of commits reaches every live
//! member in order. There is no replay; late joiners re-fetch over HTTP.

use actix::prelude::*;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::models::{Bid, Contract};

#[derive(Message, Debug, Clone, PartialEq, Serialize)]
#[rtype(result = "()")]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProjectEvent {
    #[serde(rename_all = "camelCase")]
    BidUpdate { project_id: String, bids: Vec<Bid> },
    #[serde(rename_all = "camelCase")]
    ContractUpdate {
        project_id: String,
        contract: Contract,
    },
}

impl ProjectEvent {
    pub fn project_id(&self) -> &str {
        match self {
            ProjectEvent::BidUpdate { project_id, .. } => project_id,
            ProjectEvent::ContractUpdate { project_id, .. } => project_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProjectEvent::BidUpdate { .. } => "bidUpdate",
            ProjectEvent::ContractUpdate { .. } => "contractUpdate",
        }
    }
}

pub type SessionId = u64;

#[derive(Message)]
#[rtype(result = "SessionId")]
pub struct Connect {
    pub addr: Recipient<ProjectEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub session_id: SessionId,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Join {
    pub session_id: SessionId,
    pub project_id: String,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Leave {
    pub session_id: SessionId,
    pub project_id: String,
}

/// Publish to every session in the event's project room. Resolves to the
/// number of sessions the event was handed to.
#[derive(Message)]
#[rtype(result = "usize")]
pub struct Notify(pub ProjectEvent);

#[derive(Default)]
pub struct FanoutServer {
    sessions: HashMap<SessionId, Recipient<ProjectEvent>>,
    rooms: HashMap<String, HashSet<SessionId>>,
    next_id: SessionId,
}

impl FanoutServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn drop_session(&mut self, session_id: SessionId) {
        self.sessions.remove(&session_id);
        self.rooms.retain(|_, members| {
            members.remove(&session_id);
            !members.is_empty()
        });
    }
}

impl Actor for FanoutServer {
    type Context = Context<Self>;
}

impl Handler<Connect> for FanoutServer {
    type Result = SessionId;

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) -> SessionId {
        self.next_id += 1;
        let id = self.next_id;
        self.sessions.insert(id, msg.addr);
        info!("Session {} connected (WS)", id);
        id
    }
}

impl Handler<Disconnect> for FanoutServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        info!("Session {} disconnected (WS)", msg.session_id);
        self.drop_session(msg.session_id);
    }
}

impl Handler<Join> for FanoutServer {
    type Result = ();

    fn handle(&mut self, msg: Join, _: &mut Context<Self>) {
        if !self.sessions.contains_key(&msg.session_id) {
            warn!("Join from unknown session {}", msg.session_id);
            return;
        }
        debug!("Session {} joined project {}", msg.session_id, msg.project_id);
        self.rooms
            .entry(msg.project_id)
            .or_default()
            .insert(msg.session_id);
    }
}

impl Handler<Leave> for FanoutServer {
    type Result = ();

    fn handle(&mut self, msg: Leave, _: &mut Context<Self>) {
        debug!("Session {} left project {}", msg.session_id, msg.project_id);
        if let Some(members) = self.rooms.get_mut(&msg.project_id) {
            members.remove(&msg.session_id);
            if members.is_empty() {
                self.rooms.remove(&msg.project_id);
            }
        }
    }
}

impl Handler<Notify> for FanoutServer {
    type Result = usize;

    fn handle(&mut self, Notify(event): Notify, _: &mut Context<Self>) -> usize {
        let members: Vec<SessionId> = match self.rooms.get(event.project_id()) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut gone = Vec::new();
        for session_id in members {
            match self.sessions.get(&session_id) {
                Some(addr) if addr.connected() => {
                    addr.do_send(event.clone());
                    delivered += 1;
                }
                _ => {
                    warn!(
                        "Dropped {} for project {}: session {} is gone",
                        event.kind(),
                        event.project_id(),
                        session_id
                    );
                    gone.push(session_id);
                }
            }
        }
        for session_id in gone {
            self.drop_session(session_id);
        }
        debug!(
            "Published {} for project {} to {} session(s)",
            event.kind(),
            event.project_id(),
            delivered
        );
        delivered
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("fan-out server is not running")]
    Closed,
}

/// The publish half of the fan-out, as seen by the commit path.
pub trait EventPublisher: Send + Sync {
    fn notify(&self, event: ProjectEvent) -> Result<(), PublishError>;
}

impl EventPublisher for Addr<FanoutServer> {
    fn notify(&self, event: ProjectEvent) -> Result<(), PublishError> {
        if !self.connected() {
            return Err(PublishError::Closed);
        }
        self.do_send(Notify(event));
        Ok(())
    }
}
