//! One actor per WebSocket connection
//!
//! Inbound frames are handled strictly in order: every event that touches
//! shared state runs under `ctx.wait`, which suspends the actor's mailbox and
//! streams until it completes. Frames routed to this connection by other
//! sessions arrive through the outbox stream.

use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler, WrapFuture};
use actix_web_actors::ws;
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::message_types::{RouteKind, WsInboundEvent, WsOutboundEvent};
use super::{ConnectionHandle, ConnectionId};
use crate::models::{MessagePayload, UserId};
use crate::state::AppState;

pub struct WsSession {
    id: ConnectionId,
    handle: ConnectionHandle,
    outbox: Option<UnboundedReceiver<String>>,
    /// Identity announced on this connection, if any
    identity: Option<UserId>,
    hb: Instant,
    state: AppState,
}

impl WsSession {
    pub fn new(state: AppState) -> Self {
        let id = ConnectionId::new();
        let (tx, rx) = unbounded_channel();

        Self {
            id,
            handle: ConnectionHandle::new(id, tx),
            outbox: Some(rx),
            identity: None,
            hb: Instant::now(),
            state,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.state.config.ws.heartbeat_interval;
        let timeout = self.state.config.ws.client_timeout;

        ctx.run_interval(interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(connection_id = %act.id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_event(ctx: &mut ws::WebsocketContext<Self>, event: WsOutboundEvent) {
        ctx.text(event.to_frame());
    }

    /// Senders may only speak for the identity announced on this connection
    fn check_sender(&self, from: UserId) -> Result<(), &'static str> {
        match self.identity {
            Some(identity) if identity == from => Ok(()),
            Some(_) => Err("Sender does not match the announced identity"),
            None => Err("Announce an identity before sending"),
        }
    }

    fn handle_event(&mut self, event: WsInboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        let payload: Option<MessagePayload> = match event.payload() {
            Some(Ok(payload)) => Some(payload),
            Some(Err(e)) => {
                tracing::debug!(connection_id = %self.id, error = %e, "rejected message payload");
                Self::send_event(ctx, WsOutboundEvent::error(e.to_string()));
                return;
            }
            None => None,
        };

        match (event, payload) {
            (WsInboundEvent::AnnounceIdentity { user_id }, _) => {
                let presence = self.state.presence.clone();
                let handle = self.handle.clone();

                ctx.wait(
                    async move { presence.announce(user_id, handle).await }
                        .into_actor(self)
                        .map(move |replaced, act, ctx| {
                            act.identity = Some(user_id);
                            if let Some(old) = replaced {
                                tracing::info!(
                                    user_id = %user_id,
                                    connection_id = %act.id,
                                    replaced_connection = %old,
                                    "identity moved to a new connection"
                                );
                            }
                            Self::send_event(
                                ctx,
                                WsOutboundEvent::IdentityAnnounced {
                                    user_id,
                                    replaced: replaced.is_some(),
                                },
                            );
                        }),
                );
            }

            (WsInboundEvent::SendDirect { to, from, .. }, Some(payload)) => {
                if let Err(reason) = self.check_sender(from) {
                    Self::send_event(ctx, WsOutboundEvent::error(reason));
                    return;
                }

                let router = self.state.router.clone();
                ctx.wait(
                    async move { router.route_direct(from, to, &payload).await }
                        .into_actor(self)
                        .map(|delivered, _act, ctx| {
                            Self::send_event(
                                ctx,
                                WsOutboundEvent::DeliveryReport {
                                    target: RouteKind::Direct,
                                    delivered,
                                    delivered_count: usize::from(delivered),
                                },
                            );
                        }),
                );
            }

            (
                WsInboundEvent::SendGroup {
                    group_id,
                    from,
                    members,
                    ..
                },
                Some(payload),
            ) => {
                if let Err(reason) = self.check_sender(from) {
                    Self::send_event(ctx, WsOutboundEvent::error(reason));
                    return;
                }

                let router = self.state.router.clone();
                ctx.wait(
                    async move { router.route_group(from, group_id, &members, &payload).await }
                        .into_actor(self)
                        .map(|delivered_count, _act, ctx| {
                            Self::send_event(
                                ctx,
                                WsOutboundEvent::DeliveryReport {
                                    target: RouteKind::Group,
                                    delivered: delivered_count > 0,
                                    delivered_count,
                                },
                            );
                        }),
                );
            }

            // payload() is Some for every send event
            (WsInboundEvent::SendDirect { .. } | WsInboundEvent::SendGroup { .. }, None) => {}
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(connection_id = %self.id, "WebSocket session started");

        self.hb(ctx);

        if let Some(outbox) = self.outbox.take() {
            ctx.add_stream(UnboundedReceiverStream::new(outbox));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            connection_id = %self.id,
            user_id = ?self.identity,
            "WebSocket session stopped"
        );

        let presence = self.state.presence.clone();
        let connection_id = self.id;
        actix::spawn(async move {
            presence.release(connection_id).await;
        });
    }
}

/// Frames routed to this connection by other sessions
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    // The session holds a sender itself, so the outbox only ends with the actor
    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
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
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(event) => self.handle_event(event, ctx),
                    Err(e) => {
                        tracing::warn!(connection_id = %self.id, error = %e, "failed to parse WS message");
                        Self::send_event(ctx, WsOutboundEvent::error(format!("Invalid event: {e}")));
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(connection_id = %self.id, "binary WebSocket messages not supported");
                Self::send_event(ctx, WsOutboundEvent::error("Binary frames are not supported"));
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(connection_id = %self.id, ?reason, "WebSocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(connection_id = %self.id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}
