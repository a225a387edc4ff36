// src/ws.rs

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::app_state::AppState;
use crate::fanout::{Connect, Disconnect, FanoutServer, Join, Leave, ProjectEvent, SessionId};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames a client may send.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
enum IncomingFrame {
    #[serde(rename_all = "camelCase")]
    JoinProjectRoom { project_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveProjectRoom { project_id: String },
}

pub struct WebSocketConnection {
    pub session_id: Option<SessionId>,
    pub hb: Instant,
    pub addr: Addr<FanoutServer>,
}

impl WebSocketConnection {
    pub fn new(addr: Addr<FanoutServer>) -> Self {
        WebSocketConnection {
            session_id: None,
            hb: Instant::now(),
            addr,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                info!("WebSocket client heartbeat failed, disconnecting.");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_frame(&self, text: &str) {
        let Some(session_id) = self.session_id else {
            warn!("Frame received before session registration; ignoring");
            return;
        };
        match serde_json::from_str::<IncomingFrame>(text) {
            Ok(IncomingFrame::JoinProjectRoom { project_id }) => {
                self.addr.do_send(Join {
                    session_id,
                    project_id,
                });
            }
            Ok(IncomingFrame::LeaveProjectRoom { project_id }) => {
                self.addr.do_send(Leave {
                    session_id,
                    project_id,
                });
            }
            Err(e) => debug!("Failed to parse frame: {}", e),
        }
    }
}

impl Actor for WebSocketConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);

        let addr = ctx.address();
        self.addr
            .send(Connect {
                addr: addr.recipient(),
            })
            .into_actor(self)
            .then(|res, act, ctx| {
                match res {
                    Ok(id) => act.session_id = Some(id),
                    Err(e) => {
                        error!("Failed to register with fan-out server: {}", e);
                        ctx.stop();
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        if let Some(session_id) = self.session_id {
            self.addr.do_send(Disconnect { session_id });
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebSocketConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.handle_frame(&text);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<ProjectEvent> for WebSocketConnection {
    type Result = ();

    fn handle(&mut self, msg: ProjectEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(&msg) {
            Ok(outgoing) => ctx.text(outgoing),
            Err(e) => error!("Failed to encode {} event: {}", msg.kind(), e),
        }
    }
}

/// GET /ws
/// Subscriptions are not authorized here; room contents are the same data
/// the public project endpoints expose.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(WebSocketConnection::new(data.fanout.clone()), &req, stream)
}
