//! Channel handler runtime (spec §4.3): the per-topic isolated worker that
//! owns a `Socket` and drives the user's `ChannelHandler` callbacks.
//!
//! Modeled the way the teacher's `host_client.rs` `wire_worker` task is: a
//! `tokio::spawn`ed task owning a mailbox (`WorkerCommand` over an
//! `mpsc::UnboundedSender`), generalized here from one task per connection
//! to one task per joined channel. Crash isolation falls out of
//! `tokio::spawn` itself — a panic inside the task unwinds only that task,
//! and the caller observes it as the spawned future dropping its oneshot/
//! event senders rather than the process dying.

use std::sync::Arc;

use serde_json::json;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    channel::{ChannelHandler, HandlerResult, JoinResult, Reason, Response},
    handles::{ChannelId, ChannelPid, TransportPid},
    message::{Broadcast, Message, Outbound, Reply, EVENT_PHX_LEAVE},
    serializer::Serializer,
    socket::Socket,
};

/// Messages a channel worker's mailbox accepts.
pub enum WorkerCommand {
    /// A decoded inbound `Message` for this topic (includes `phx_leave`,
    /// handled specially without invoking a callback).
    Inbound(Message),
    /// A pub/sub broadcast this worker opted to intercept.
    Broadcast(Broadcast),
    /// Forced close from the multiplexer (spec §4.3 "Forced close").
    Close,
}

/// Outcome of the join protocol, reported back to the multiplexer over a
/// oneshot channel so the inbound frame that triggered the join can block
/// on it (spec §4.3: "runs once, synchronously from the multiplexer's
/// point of view").
pub struct JoinOutcome {
    pub id: ChannelId,
    /// `Some` only when the join succeeded and the worker is now running.
    pub pid: Option<ChannelPid>,
    pub reply: Reply,
}

/// Everything needed to spawn one channel worker.
pub struct SpawnParams<S: Serializer> {
    pub handler: Box<dyn ChannelHandler>,
    pub socket: Socket,
    pub topic: String,
    pub join_ref: String,
    pub join_payload: serde_json::Value,
    pub serializer: Arc<S>,
    /// Dropped (or changed to stopped) by the multiplexer when the
    /// transport/connection goes away, so the worker can stop without
    /// waiting on a reply that will never be read (spec §4.3 "Transport
    /// death notice").
    pub transport_alive: watch::Receiver<bool>,
    /// The registered channel module's name, carried along only so a bad
    /// callback return (spec §7.5) can name the offending module.
    pub module_name: &'static str,
}

/// Spawns a channel worker. Creates the worker's mailbox and `ChannelId`
/// synchronously so the caller can build `socket.channel_pid` before the
/// join callback runs (spec §4.3 step 1), then hands the rest of the
/// protocol to a `tokio::spawn`ed task.
///
/// Returns the worker's id immediately and a oneshot the caller awaits for
/// the join result.
pub fn spawn<S: Serializer>(
    mut params: SpawnParams<S>,
) -> (ChannelId, oneshot::Receiver<JoinOutcome>, JoinHandle<()>) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<WorkerCommand>();
    let id = ChannelId::next();
    let pid = ChannelPid { id, tx: cmd_tx };
    params.socket.channel_pid = Some(pid);
    let (outcome_tx, outcome_rx) = oneshot::channel();

    let SpawnParams {
        mut handler,
        mut socket,
        topic,
        join_ref,
        join_payload,
        serializer,
        mut transport_alive,
        module_name,
    } = params;
    let transport_pid = socket.transport_pid.clone();

    let join_handle = tokio::spawn(async move {
        let join_result = handler.join(&topic, join_payload, socket).await;
        let (reply_payload, mut socket, registered) = match join_result {
            JoinResult::Ok(s) => (json!({}), s, true),
            JoinResult::OkWithReply(payload, s) => (payload, s, true),
            JoinResult::Error(payload) => {
                let reply = Reply::err(Some(join_ref.clone()), Some(join_ref.clone()), topic.clone(), payload);
                let _ = outcome_tx.send(JoinOutcome { id, pid: None, reply });
                return;
            }
        };
        socket.joined = true;
        let reply = Reply::ok(Some(join_ref.clone()), Some(join_ref.clone()), topic.clone(), reply_payload);
        let pid = socket.channel_pid.clone();
        if outcome_tx.send(JoinOutcome { id, pid, reply }).is_err() {
            // The multiplexer that spawned us is already gone; nothing to
            // serve, exit quietly.
            return;
        }

        loop {
            tokio::select! {
                biased;
                changed = transport_alive.changed() => {
                    if changed.is_err() || !*transport_alive.borrow() {
                        return;
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None => return,
                        Some(WorkerCommand::Close) => {
                            handler.terminate(Reason::ShutdownClosed, socket.clone()).await;
                            if let Some(tp) = &transport_pid {
                                tp.notify(crate::multiplexer::MultiplexerEvent::ChannelGracefulExit {
                                    id,
                                    final_message: None,
                                });
                            }
                            return;
                        }
                        Some(WorkerCommand::Inbound(msg)) if msg.event == EVENT_PHX_LEAVE => {
                            let reply = Reply::ok(socket.join_ref.clone(), msg.ref_.clone(), topic.clone(), json!({}));
                            handler.terminate(Reason::ShutdownLeft, socket.clone()).await;
                            if let Some(tp) = &transport_pid {
                                tp.notify(crate::multiplexer::MultiplexerEvent::ChannelGracefulExit {
                                    id,
                                    final_message: Some(Outbound::Reply(reply)),
                                });
                            }
                            return;
                        }
                        Some(WorkerCommand::Inbound(msg)) => {
                            socket.ref_ = msg.ref_.clone();
                            let join_ref_now = socket.join_ref.clone();
                            let ref_now = msg.ref_.clone();
                            let result = handler.handle_in(&msg.event, msg.payload, socket).await;
                            let (next_socket, pending_reply, stop) = resolve_result(
                                result,
                                module_name,
                                "handle_in",
                                true,
                                join_ref_now,
                                ref_now,
                                topic.clone(),
                            );
                            if let Some(reply) = pending_reply {
                                push(&serializer, &transport_pid, Outbound::Reply(reply));
                            }
                            match stop {
                                Some(reason) => {
                                    handler.terminate(reason.clone(), next_socket.clone()).await;
                                    if let Some(tp) = &transport_pid {
                                        let final_message = if reason.is_normal() {
                                            None
                                        } else {
                                            Some(Outbound::Message(Message::phx_error(
                                                next_socket.join_ref.clone(),
                                                topic.clone(),
                                            )))
                                        };
                                        if reason.is_normal() {
                                            tp.notify(crate::multiplexer::MultiplexerEvent::ChannelGracefulExit {
                                                id,
                                                final_message,
                                            });
                                        } else {
                                            tp.notify(crate::multiplexer::MultiplexerEvent::ChannelDied {
                                                id,
                                                reason,
                                            });
                                        }
                                    }
                                    return;
                                }
                                None => {
                                    socket = next_socket;
                                    socket.clear_ref();
                                }
                            }
                        }
                        Some(WorkerCommand::Broadcast(b)) => {
                            let join_ref_now = socket.join_ref.clone();
                            let result = handler.handle_out(&b.event, b.payload, socket).await;
                            let (next_socket, pending_reply, stop) = resolve_result(
                                result,
                                module_name,
                                "handle_out",
                                false,
                                join_ref_now,
                                None,
                                topic.clone(),
                            );
                            debug_assert!(pending_reply.is_none(), "handle_out must not reply");
                            match stop {
                                Some(reason) => {
                                    handler.terminate(reason.clone(), next_socket.clone()).await;
                                    if let Some(tp) = &transport_pid {
                                        if reason.is_normal() {
                                            tp.notify(crate::multiplexer::MultiplexerEvent::ChannelGracefulExit {
                                                id,
                                                final_message: None,
                                            });
                                        } else {
                                            tp.notify(crate::multiplexer::MultiplexerEvent::ChannelDied {
                                                id,
                                                reason,
                                            });
                                        }
                                    }
                                    return;
                                }
                                None => socket = next_socket,
                            }
                        }
                    }
                }
            }
        }
    });

    (id, outcome_rx, join_handle)
}

/// Interprets a callback's `HandlerResult`, enforcing that `Reply`/
/// `StopWithReply` only come from `handle_in` (spec §4.3: "A reply outside
/// `handle_in` is a programmer error" — raised as a panic, which
/// `tokio::spawn` turns into an isolated worker crash, not a connection
/// crash).
fn resolve_result(
    result: HandlerResult,
    module_name: &'static str,
    callback: &'static str,
    allow_reply: bool,
    join_ref: Option<String>,
    ref_: Option<String>,
    topic: String,
) -> (Socket, Option<Reply>, Option<Reason>) {
    let stamp = |resp: Response| {
        let (status, payload) = resp.into_parts();
        Reply { join_ref: join_ref.clone(), ref_: ref_.clone(), topic: topic.clone(), status, payload }
    };
    let bad_return = || crate::error::ChannelError::BadReturn {
        module: module_name,
        callback,
        accepted: "no_reply/no_reply_hibernate/stop, not reply/stop_with_reply",
    };
    match result {
        HandlerResult::NoReply(s) => (s, None, None),
        HandlerResult::NoReplyHibernate(s) => (s, None, None),
        HandlerResult::Reply(resp, s) => {
            if !allow_reply {
                panic!("{}", bad_return());
            }
            (s, Some(stamp(resp)), None)
        }
        HandlerResult::Stop(reason, s) => (s, None, Some(reason)),
        HandlerResult::StopWithReply(reason, resp, s) => {
            if !allow_reply {
                panic!("{}", bad_return());
            }
            (s, Some(stamp(resp)), Some(reason))
        }
    }
}

/// Encode failure here is the worker's own message, not a transport fault,
/// so it's treated as a channel worker crash (spec §7 item 6): panicking
/// lets the enclosing `tokio::spawn` isolate it the same way a handler
/// panic would, and the reaper task reports it as `ChannelDied`.
fn push<S: Serializer>(serializer: &Arc<S>, transport_pid: &Option<TransportPid>, msg: Outbound) {
    let Some(tp) = transport_pid else { return };
    match serializer.encode(&msg) {
        Ok(frame) => tp.notify(crate::multiplexer::MultiplexerEvent::SocketPush(frame)),
        Err(err) => {
            let err: crate::error::ChannelError = crate::error::ChannelError::EncodeFailed(Box::new(err));
            panic!("{err}");
        }
    }
}
