//! Send-and-wait state machine for chat sessions.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::chat::bridge::Bridge;
use crate::chat::events::{Event, EventKind};
use crate::chat::transport::{OutgoingMessage, StreamError, Transport};
use crate::config::ClientConfig;
use crate::envelope::{MessageEnvelope, VerificationStatus};
use crate::error::{Error, Result};
use crate::trust::{SenderContext, TrustOutcome, TrustPipeline};

/// Fires a [`CancelSignal`]. Dropping the handle without calling
/// [`CancelHandle::cancel`] never cancels.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> CancelSignal {
        Self::pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pending forever if the handle is dropped first.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// Existing session; `None` starts a new conversation.
    pub session_id: Option<String>,
    pub to: Vec<String>,
    pub body: String,
    /// Generated when absent.
    pub message_id: Option<String>,
    /// Reply wait; falls back to the configured default.
    pub wait: Option<Duration>,
    /// `wait` was set deliberately and must be honored as given.
    pub wait_explicit: bool,
    /// Tell the session we are leaving; never waits.
    pub leaving: bool,
    /// Tell the recipients we are waiting on them.
    pub waiting: bool,
    /// Signed envelope to forward with the message.
    pub envelope: Option<MessageEnvelope>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// Delivered without waiting.
    Sent,
    Replied,
    SenderLeft,
    Timeout,
    TargetsLeft,
    StreamEnded,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub from: String,
    pub body: String,
    pub message_id: String,
    /// The replier is now waiting on us.
    pub sender_waiting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust: Option<TrustOutcome>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    pub status: SendStatus,
    pub session_id: String,
    /// Id of our outgoing message; empty in listen mode.
    pub message_id: String,
    /// Events observed while waiting, in stream order.
    pub events: Vec<Event>,
    pub reply: Option<Reply>,
    pub waited: Duration,
}

enum Mode {
    /// Only targets count, and only after our own message has gone by.
    Reply { message_id: String, body: String },
    /// Anyone but us counts.
    Listen,
}

enum Step {
    Continue,
    Extend(i64),
    Finish(SendStatus, Option<Reply>),
}

struct WaitState {
    mode: Mode,
    self_address: String,
    targets: BTreeSet<String>,
    left: BTreeSet<String>,
    seen_echo: bool,
    events: Vec<Event>,
}

impl WaitState {
    fn is_echo(&self, ev: &Event) -> bool {
        let Mode::Reply { message_id, body } = &self.mode else {
            return false;
        };
        if !ev.message_id.is_empty() && !message_id.is_empty() {
            return ev.message_id == *message_id;
        }
        ev.from_agent == self.self_address && ev.body == *body
    }

    fn accepts(&self, ev: &Event) -> bool {
        if ev.from_agent == self.self_address {
            return false;
        }
        match self.mode {
            Mode::Reply { .. } => self.targets.contains(&ev.from_agent),
            Mode::Listen => true,
        }
    }
}

pub struct ChatEngine {
    transport: Arc<dyn Transport>,
    address: String,
    config: ClientConfig,
    trust: Option<Arc<TrustPipeline>>,
}

impl ChatEngine {
    /// `address` is this agent's own address, used to recognize its echoes.
    pub fn new(
        transport: Arc<dyn Transport>,
        address: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            address: address.into(),
            config,
            trust: None,
        }
    }

    /// Run accepted replies through `pipeline` (subject to `verify_replies`).
    pub fn with_trust(mut self, pipeline: Arc<TrustPipeline>) -> Self {
        self.trust = Some(pipeline);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Wait that applies to `opts`. New conversations get the longer
    /// conversation wait unless the caller pinned one.
    pub fn effective_wait(&self, opts: &SendOptions) -> Duration {
        if opts.session_id.is_none() && !opts.wait_explicit {
            return self.config.conversation_wait();
        }
        opts.wait.unwrap_or_else(|| self.config.default_wait())
    }

    pub async fn send(&self, opts: SendOptions, cancel: CancelSignal) -> Result<SendResult> {
        let message = OutgoingMessage {
            session_id: opts.session_id.clone(),
            to: opts.to.clone(),
            body: opts.body.clone(),
            message_id: opts
                .message_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            leaving: opts.leaving,
            waiting: opts.waiting,
            envelope: opts.envelope.clone(),
        };

        let wait = self.effective_wait(&opts);
        if opts.leaving || wait.is_zero() {
            let delivery = self.transport.send(&message).await?;
            return Ok(SendResult {
                status: SendStatus::Sent,
                session_id: delivery.session_id,
                message_id: non_empty_or(delivery.message_id, &message.message_id),
                events: Vec::new(),
                reply: None,
                waited: Duration::ZERO,
            });
        }

        let safety = wait.max(self.config.stream_safety());

        // With a known session the stream opens first so nothing is missed.
        let (delivery, bridge) = match &opts.session_id {
            Some(session_id) => {
                let stream = self.transport.open_stream(session_id, safety).await?;
                let mut bridge = Bridge::spawn(stream, self.config.event_queue_capacity);
                match self.transport.send(&message).await {
                    Ok(delivery) => (delivery, bridge),
                    Err(err) => {
                        bridge.shutdown().await;
                        return Err(err);
                    }
                }
            }
            None => {
                let delivery = self.transport.send(&message).await?;
                let stream = self
                    .transport
                    .open_stream(&delivery.session_id, safety)
                    .await?;
                (delivery, Bridge::spawn(stream, self.config.event_queue_capacity))
            }
        };

        let message_id = non_empty_or(delivery.message_id, &message.message_id);
        tracing::debug!(
            session_id = %delivery.session_id,
            message_id = %message_id,
            wait_secs = wait.as_secs(),
            "message sent, waiting for reply"
        );

        let state = WaitState {
            mode: Mode::Reply {
                message_id: message_id.clone(),
                body: opts.body,
            },
            self_address: self.address.clone(),
            targets: opts.to.into_iter().collect(),
            left: BTreeSet::new(),
            seen_echo: false,
            events: Vec::new(),
        };

        self.wait(bridge, state, delivery.session_id, message_id, wait, cancel)
            .await
    }

    /// Wait on an existing session for any participant's message without sending.
    pub async fn listen(
        &self,
        session_id: &str,
        wait: Option<Duration>,
        cancel: CancelSignal,
    ) -> Result<SendResult> {
        let wait = wait.unwrap_or_else(|| self.config.default_wait());
        let safety = wait.max(self.config.stream_safety());
        let stream = self.transport.open_stream(session_id, safety).await?;
        let bridge = Bridge::spawn(stream, self.config.event_queue_capacity);

        let state = WaitState {
            mode: Mode::Listen,
            self_address: self.address.clone(),
            targets: BTreeSet::new(),
            left: BTreeSet::new(),
            seen_echo: true,
            events: Vec::new(),
        };

        self.wait(bridge, state, session_id.to_string(), String::new(), wait, cancel)
            .await
    }

    async fn wait(
        &self,
        mut bridge: Bridge,
        mut state: WaitState,
        session_id: String,
        message_id: String,
        wait: Duration,
        mut cancel: CancelSignal,
    ) -> Result<SendResult> {
        let started = Instant::now();
        let mut deadline = deadline_after(started, wait);
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        let finished = loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                _ = &mut sleep => break Some((SendStatus::Timeout, None)),
                item = bridge.recv() => item,
            };

            let ev = match item {
                Some(Ok(ev)) => ev,
                Some(Err(StreamError::Ended)) | None => {
                    break Some((SendStatus::StreamEnded, None));
                }
                Some(Err(StreamError::Transport(err))) => {
                    tracing::warn!(session_id = %session_id, error = %err, "event stream failed");
                    break Some((SendStatus::Timeout, None));
                }
            };

            match self.observe(&mut state, ev).await {
                Step::Continue => {}
                Step::Extend(secs) => {
                    if secs > 0 {
                        let extra = Duration::from_secs(secs.unsigned_abs());
                        deadline = deadline_after(deadline.max(Instant::now()), extra);
                        sleep.as_mut().reset(deadline);
                        tracing::debug!(
                            session_id = %session_id,
                            extend_secs = secs,
                            "wait deadline extended"
                        );
                    }
                }
                Step::Finish(status, reply) => break Some((status, reply)),
            }
        };

        bridge.shutdown().await;

        let Some((status, reply)) = finished else {
            tracing::debug!(session_id = %session_id, "wait cancelled");
            return Err(Error::Cancelled);
        };

        Ok(SendResult {
            status,
            session_id,
            message_id,
            events: state.events,
            reply,
            waited: started.elapsed(),
        })
    }

    async fn observe(&self, state: &mut WaitState, ev: Event) -> Step {
        match ev.kind {
            EventKind::Message => {
                if !state.seen_echo {
                    if state.is_echo(&ev) {
                        state.seen_echo = true;
                    }
                    tracing::debug!(
                        message_id = %ev.message_id,
                        from = %ev.from_agent,
                        "discarded message before own echo"
                    );
                    return Step::Continue;
                }
                if state.is_echo(&ev) || !state.accepts(&ev) {
                    tracing::debug!(
                        message_id = %ev.message_id,
                        from = %ev.from_agent,
                        "ignored message"
                    );
                    return Step::Continue;
                }

                if ev.hang_on {
                    let secs = ev.extends_wait_seconds;
                    state.events.push(ev);
                    return Step::Extend(secs);
                }

                let status = if ev.sender_leaving {
                    SendStatus::SenderLeft
                } else {
                    SendStatus::Replied
                };
                let reply = Reply {
                    from: ev.from_agent.clone(),
                    body: ev.body.clone(),
                    message_id: ev.message_id.clone(),
                    sender_waiting: ev.sender_waiting,
                    trust: self.verify_reply(&ev).await,
                };
                state.events.push(ev);
                Step::Finish(status, Some(reply))
            }
            EventKind::ReadReceipt | EventKind::Extend => {
                let secs = ev.extends_wait_seconds;
                state.events.push(ev);
                Step::Extend(secs)
            }
            EventKind::ParticipantLeft => {
                if state.targets.contains(&ev.from_agent) {
                    state.left.insert(ev.from_agent.clone());
                }
                state.events.push(ev);
                if !state.targets.is_empty() && state.left.len() == state.targets.len() {
                    Step::Finish(SendStatus::TargetsLeft, None)
                } else {
                    Step::Continue
                }
            }
            EventKind::Other(_) => {
                state.events.push(ev);
                Step::Continue
            }
        }
    }

    async fn verify_reply(&self, ev: &Event) -> Option<TrustOutcome> {
        let pipeline = self.trust.as_ref().filter(|_| self.config.verify_replies)?;

        let Some(env) = ev.envelope.as_ref() else {
            return Some(TrustOutcome {
                status: VerificationStatus::Unverified,
                pin: None,
                rotated: false,
            });
        };
        if env.from != ev.from_agent {
            tracing::warn!(
                from = %ev.from_agent,
                envelope_from = %env.from,
                "reply envelope names a different sender"
            );
            return Some(TrustOutcome {
                status: VerificationStatus::Failed,
                pin: None,
                rotated: false,
            });
        }

        let sender = SenderContext {
            custody: ev.custody,
            lifetime: ev.lifetime,
            handle: None,
            server: ev.server.clone(),
            rotation: ev.rotation.clone(),
        };
        Some(pipeline.verify_inbound_async(env, &sender).await)
    }
}

/// Longest a single wait may be pushed out; tokio treats this as never.
const MAX_WAIT_HORIZON: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(base: Instant, extra: Duration) -> Instant {
    base.checked_add(extra.min(MAX_WAIT_HORIZON)).unwrap_or(base)
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
