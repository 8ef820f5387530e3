//! Fan-out dispatcher (spec §4.4): given a broadcast and a topic's
//! subscriber list, deliver to each subscriber using the fastlane
//! optimization, caching one encode per serializer per fan-out call.

use std::collections::HashMap;

use crate::{
    handles::{ChannelPid, TransportPid},
    message::Broadcast,
    pubsub::Subscriber,
    serializer::{EncodedFrame, Serializer},
    worker::WorkerCommand,
};

/// What the caller does with a subscriber once `dispatch` has decided how
/// to reach it.
pub enum Delivery {
    /// Forward the raw broadcast to the channel worker's own mailbox; it
    /// will invoke `handle_out`.
    ToChannelWorker(ChannelPid, WorkerCommand),
    /// Push this already-encoded frame directly to the subscribing
    /// connection's multiplexer, bypassing the channel worker entirely.
    Fastlane(TransportPid, EncodedFrame),
}

/// Computes the delivery plan for every subscriber of `broadcast`'s topic,
/// per spec §4.4's rules:
/// - skip subscribers whose handle equals `from`,
/// - route to the channel worker when there's no fastlane hint, or when the
///   broadcast's event is in that hint's intercepted set,
/// - otherwise fastlane-encode once per serializer and reuse it.
///
/// The per-call encode cache is a plain local `HashMap`, scoped to this one
/// invocation — it is never stored on `self` so it can't leak stale
/// encodings across broadcasts (spec §9 "Fastlane cache").
pub fn dispatch<S>(subscribers: Vec<Subscriber<S>>, from: Option<&ChannelPid>, broadcast: &Broadcast) -> Vec<Delivery>
where
    S: Serializer,
{
    let mut cache: HashMap<*const (), EncodedFrame> = HashMap::new();
    let mut out = Vec::with_capacity(subscribers.len());

    for sub in subscribers {
        if let Some(from) = from {
            if &sub.recipient == from {
                continue;
            }
        }

        match sub.fastlane {
            None => out.push(Delivery::ToChannelWorker(sub.recipient, WorkerCommand::Broadcast(broadcast.clone()))),
            Some(hint) if hint.intercepted_events.contains(&broadcast.event.as_str()) => {
                out.push(Delivery::ToChannelWorker(sub.recipient, WorkerCommand::Broadcast(broadcast.clone())))
            }
            Some(hint) => {
                let key = std::sync::Arc::as_ptr(&hint.serializer) as *const ();
                let frame = if let Some(cached) = cache.get(&key) {
                    cached.clone()
                } else {
                    match hint.serializer.fastlane(broadcast) {
                        Ok(frame) => {
                            cache.insert(key, frame.clone());
                            frame
                        }
                        Err(err) => {
                            tracing::error!(error = %err, topic = %broadcast.topic, "fastlane encode failed");
                            continue;
                        }
                    }
                };
                out.push(Delivery::Fastlane(hint.fastlane_pid, frame));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pubsub::FastlaneHint, serializer::JsonSerializer};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::sync::mpsc;

    fn fake_pid() -> ChannelPid {
        let (tx, _rx) = mpsc::unbounded_channel();
        ChannelPid { id: crate::handles::ChannelId::next(), tx }
    }

    fn fake_transport_pid() -> TransportPid {
        let (tx, _rx) = mpsc::unbounded_channel();
        TransportPid { events: tx }
    }

    struct CountingSerializer {
        encodes: Arc<AtomicUsize>,
        inner: JsonSerializer,
    }

    impl Serializer for CountingSerializer {
        type Error = <JsonSerializer as Serializer>::Error;
        fn decode(&self, payload: &[u8]) -> Result<crate::message::Message, Self::Error> {
            self.inner.decode(payload)
        }
        fn encode(&self, msg: &crate::message::Outbound) -> Result<EncodedFrame, Self::Error> {
            self.inner.encode(msg)
        }
        fn fastlane(&self, msg: &Broadcast) -> Result<EncodedFrame, Self::Error> {
            self.encodes.fetch_add(1, Ordering::SeqCst);
            self.inner.fastlane(msg)
        }
    }

    fn broadcast(event: &str) -> Broadcast {
        Broadcast { topic: "room:42".into(), event: event.into(), payload: serde_json::json!({}) }
    }

    #[test]
    fn skips_the_publisher_itself() {
        let pid = fake_pid();
        let subs = vec![Subscriber::<JsonSerializer> { recipient: pid.clone(), fastlane: None }];
        let out = dispatch(subs, Some(&pid), &broadcast("msg"));
        assert!(out.is_empty());
    }

    #[test]
    fn no_fastlane_hint_routes_through_channel_worker() {
        let pid = fake_pid();
        let subs = vec![Subscriber::<JsonSerializer> { recipient: pid.clone(), fastlane: None }];
        let out = dispatch(subs, None, &broadcast("msg"));
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Delivery::ToChannelWorker(_, _)));
    }

    #[test]
    fn intercepted_event_bypasses_fastlane() {
        let ser = Arc::new(JsonSerializer);
        let pid = fake_pid();
        let subs = vec![Subscriber {
            recipient: pid.clone(),
            fastlane: Some(FastlaneHint { fastlane_pid: fake_transport_pid(), serializer: ser, intercepted_events: &["msg"] }),
        }];
        let out = dispatch(subs, None, &broadcast("msg"));
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Delivery::ToChannelWorker(_, _)));
    }

    #[test]
    fn non_intercepted_event_uses_fastlane_and_caches_per_serializer() {
        let encodes = Arc::new(AtomicUsize::new(0));
        let ser = Arc::new(CountingSerializer { encodes: encodes.clone(), inner: JsonSerializer });
        let subs = vec![
            Subscriber {
                recipient: fake_pid(),
                fastlane: Some(FastlaneHint { fastlane_pid: fake_transport_pid(), serializer: ser.clone(), intercepted_events: &[] }),
            },
            Subscriber {
                recipient: fake_pid(),
                fastlane: Some(FastlaneHint { fastlane_pid: fake_transport_pid(), serializer: ser.clone(), intercepted_events: &[] }),
            },
        ];
        let out = dispatch(subs, None, &broadcast("msg"));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| matches!(d, Delivery::Fastlane(_, _))));
        assert_eq!(encodes.load(Ordering::SeqCst), 1, "one encode should be shared across both subscribers");
    }
}
