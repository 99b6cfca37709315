//! The engine task: one owner for every mutable relay structure.
//!
//! All protocol callbacks, cache mutations, and fan-out dispatches run
//! inside a single tokio task driven by `select!` over the command
//! channel, the inbound event channel, and the last-seen broadcast
//! interval. A callback runs to completion before the next one begins,
//! which is what makes the in-place bunch replacement safe without
//! locks. External code talks to the task through [`EngineHandle`].
//!
//! Nothing in the pipeline is allowed to propagate an error past a cache
//! append or a publish: every stage degrades to "skip this event".
//! Authorization of viewer commands happens before the handle — the
//! engine trusts whoever holds one.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use veranda_shared::config::RelayConfig;
use veranda_shared::event::{CanonicalEvent, EventBody};
use veranda_shared::types::SubjectId;
use veranda_store::{ChatLogSink, LastSeenStore};

use crate::cache::{AppendOutcome, SubjectCache};
use crate::error::{RelayError, SendError};
use crate::lastseen::LastSeenTracker;
use crate::normalize::EventNormalizer;
use crate::outgoing::OutgoingRelay;
use crate::recipients::{Push, RecipientHandle, RecipientId, RecipientRegistry};
use crate::supervisor::{ConnectionSnapshot, ConnectionSupervisor};
use crate::transport::{InboundEvent, RawEvent, TransportFactory};

/// Commands sent *into* the engine task.
enum EngineCommand {
    Subscribe {
        subject: SubjectId,
        recipient: RecipientHandle,
    },
    Unsubscribe {
        subject: SubjectId,
        recipient: RecipientId,
    },
    WatchLastSeen {
        recipient: RecipientHandle,
    },
    UnwatchLastSeen {
        recipient: RecipientId,
    },
    /// A viewer disconnected; forget it everywhere.
    DropRecipient {
        recipient: RecipientId,
    },
    History {
        subject: SubjectId,
        reply: oneshot::Sender<Vec<CanonicalEvent>>,
    },
    Send {
        subject: SubjectId,
        text: String,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    Recalibrate,
    Connections {
        reply: oneshot::Sender<Vec<ConnectionSnapshot>>,
    },
    Shutdown,
}

/// Cloneable handle to a running engine task.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Subscribe a recipient to a subject. A newly subscribed recipient
    /// receives a one-time [`Push::History`] replay of the cached events.
    pub async fn subscribe(
        &self,
        subject: SubjectId,
        recipient: RecipientHandle,
    ) -> Result<(), RelayError> {
        self.command(EngineCommand::Subscribe { subject, recipient })
            .await
    }

    pub async fn unsubscribe(
        &self,
        subject: SubjectId,
        recipient: RecipientId,
    ) -> Result<(), RelayError> {
        self.command(EngineCommand::Unsubscribe { subject, recipient })
            .await
    }

    /// Register interest in the system-wide batched last-seen updates.
    pub async fn watch_last_seen(&self, recipient: RecipientHandle) -> Result<(), RelayError> {
        self.command(EngineCommand::WatchLastSeen { recipient })
            .await
    }

    pub async fn unwatch_last_seen(&self, recipient: RecipientId) -> Result<(), RelayError> {
        self.command(EngineCommand::UnwatchLastSeen { recipient })
            .await
    }

    /// Forget a disconnected viewer everywhere.
    pub async fn drop_recipient(&self, recipient: RecipientId) -> Result<(), RelayError> {
        self.command(EngineCommand::DropRecipient { recipient })
            .await
    }

    /// On-demand ordered replay of a subject's cached history.
    pub async fn request_history(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<CanonicalEvent>, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.command(EngineCommand::History { subject, reply }).await?;
        rx.await.map_err(|_| RelayError::EngineStopped)
    }

    /// Send an outbound message to a subject under the operator's nick.
    /// On success the message has already been looped back through the
    /// normal pipeline, so the sender's own view includes it.
    pub async fn send(&self, subject: SubjectId, text: String) -> Result<(), SendError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(EngineCommand::Send {
                subject,
                text,
                reply,
            })
            .await
            .map_err(|_| SendError::EngineStopped)?;
        rx.await.map_err(|_| SendError::EngineStopped)?
    }

    /// Recompute the multi-network collision set from configuration.
    pub async fn recalibrate(&self) -> Result<(), RelayError> {
        self.command(EngineCommand::Recalibrate).await
    }

    /// Status snapshot of every network connection.
    pub async fn connections(&self) -> Result<Vec<ConnectionSnapshot>, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.command(EngineCommand::Connections { reply }).await?;
        rx.await.map_err(|_| RelayError::EngineStopped)
    }

    /// Flush the pending last-seen batch and stop the engine task.
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        self.command(EngineCommand::Shutdown).await
    }

    async fn command(&self, cmd: EngineCommand) -> Result<(), RelayError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| RelayError::EngineStopped)
    }
}

/// All engine state, owned exclusively by the engine task.
struct Engine {
    supervisor: ConnectionSupervisor,
    normalizer: EventNormalizer,
    cache: SubjectCache,
    registry: RecipientRegistry,
    last_seen: LastSeenTracker,
    outgoing: OutgoingRelay,
    nick: String,
    /// Kept so the inbound channel never closes, even with zero
    /// configured networks.
    _event_tx: mpsc::UnboundedSender<InboundEvent>,
}

/// Load persisted state, connect every configured network, and spawn the
/// engine task. Returns the handle external layers use to talk to it.
pub async fn spawn_engine(
    config: RelayConfig,
    factory: &dyn TransportFactory,
) -> anyhow::Result<EngineHandle> {
    let store = LastSeenStore::load(&config.data_dir)?;
    let sink = ChatLogSink::new(&config.log_dir);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<InboundEvent>();
    let supervisor = ConnectionSupervisor::connect_all(&config.networks, factory, event_tx.clone());

    let mut engine = Engine {
        supervisor,
        normalizer: EventNormalizer::new(&config, sink),
        cache: SubjectCache::new(config.cache_capacity),
        registry: RecipientRegistry::new(),
        last_seen: LastSeenTracker::new(store),
        outgoing: OutgoingRelay::new(config.nick.clone()),
        nick: config.nick.clone(),
        _event_tx: event_tx,
    };

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<EngineCommand>(256);
    let interval = Duration::from_millis(config.last_seen_interval_ms.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        info!(networks = engine.supervisor.list_connections().len(), "Relay engine started");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(EngineCommand::Shutdown) => {
                            engine.flush_last_seen();
                            info!("Engine shutdown requested");
                            break;
                        }
                        Some(cmd) => engine.handle_command(cmd),
                        None => {
                            info!("Command channel closed, stopping engine");
                            break;
                        }
                    }
                }

                event = event_rx.recv() => {
                    if let Some(event) = event {
                        engine.handle_inbound(event);
                    }
                }

                _ = ticker.tick() => {
                    engine.flush_last_seen();
                }
            }
        }

        info!("Relay engine terminated");
    });

    Ok(EngineHandle { cmd_tx })
}

impl Engine {
    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Subscribe { subject, recipient } => {
                let replay_to = recipient.clone();
                if self.registry.subscribe(subject.clone(), recipient) {
                    // One-time replay to the new recipient only.
                    let events = self.cache.history(&subject);
                    if !replay_to.deliver(Push::History { subject, events }) {
                        debug!("New subscriber went stale before history replay");
                    }
                }
            }
            EngineCommand::Unsubscribe { subject, recipient } => {
                self.registry.unsubscribe(&subject, recipient);
            }
            EngineCommand::WatchLastSeen { recipient } => {
                self.registry.watch_last_seen(recipient);
            }
            EngineCommand::UnwatchLastSeen { recipient } => {
                self.registry.unwatch_last_seen(recipient);
            }
            EngineCommand::DropRecipient { recipient } => {
                self.registry.drop_recipient(recipient);
            }
            EngineCommand::History { subject, reply } => {
                let _ = reply.send(self.cache.history(&subject));
            }
            EngineCommand::Send {
                subject,
                text,
                reply,
            } => {
                let _ = reply.send(self.handle_send(&subject, &text));
            }
            EngineCommand::Recalibrate => {
                self.supervisor.recalibrate_subject_collisions();
            }
            EngineCommand::Connections { reply } => {
                let _ = reply.send(self.supervisor.list_connections());
            }
            EngineCommand::Shutdown => {
                // Handled in the task loop.
            }
        }
    }

    /// Relay an outgoing message, then loop it back through the exact
    /// pipeline an inbound message takes.
    fn handle_send(&mut self, subject: &SubjectId, text: &str) -> Result<(), SendError> {
        let raw = self.outgoing.send(&self.supervisor, subject, text)?;
        self.handle_inbound(InboundEvent {
            network: subject.network.clone(),
            subject_kind: subject.kind,
            subject_name: subject.name.clone(),
            raw,
            at: None,
        });
        Ok(())
    }

    /// The core pipeline: normalize, cache (append/evict/bunch), fan
    /// out, record last-seen.
    fn handle_inbound(&mut self, inbound: InboundEvent) {
        let subject = SubjectId {
            network: inbound.network,
            kind: inbound.subject_kind,
            name: inbound.subject_name,
        };

        // Membership bookkeeping for our own nick; user lists bypass the
        // cache entirely.
        match &inbound.raw {
            RawEvent::UserList { users } => {
                let push = Push::UserList {
                    subject: subject.clone(),
                    users: users.clone(),
                };
                self.registry.publish(&subject, push);
                return;
            }
            RawEvent::Join { who } if who.eq_ignore_ascii_case(&self.nick) => {
                self.supervisor.note_joined(&subject.network, &subject.name);
            }
            RawEvent::Part { who, .. } | RawEvent::Kick { who, .. }
                if who.eq_ignore_ascii_case(&self.nick) =>
            {
                self.supervisor.note_left(&subject.network, &subject.name);
            }
            _ => {}
        }

        let display_label = self.supervisor.display_name(&subject);
        let Some(event) = self
            .normalizer
            .normalize(&subject, &display_label, inbound.raw, inbound.at)
        else {
            return;
        };
        debug!(subject = %display_label, kind = event.kind_str(), "Normalized inbound event");

        // Qualifying activity: someone said something.
        if let EventBody::Message { from, .. } | EventBody::Action { from, .. } = &event.body {
            self.last_seen
                .record(&display_label, from, event.at, event.relationship);
        }

        let push = match self.cache.append(event) {
            AppendOutcome::Appended(event) => Push::Event {
                subject: subject.clone(),
                event,
            },
            AppendOutcome::Bunched { event, retired } => Push::Replace {
                subject: subject.clone(),
                retired,
                event,
            },
        };
        self.registry.publish(&subject, push);
    }

    fn flush_last_seen(&mut self) {
        if let Some(batch) = self.last_seen.take_batch() {
            debug!(
                subjects = batch.subjects.len(),
                people = batch.people.len(),
                "Broadcasting last-seen batch"
            );
            self.registry.broadcast_last_seen(batch);
        }
    }
}
