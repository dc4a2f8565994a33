//! State synchronizer: keeps the local lightbulb in step with the shared row.
//!
//! DESIGN
//! ======
//! One spawned task (the actor) owns the [`WidgetState`] and publishes a
//! copy through a `watch` channel after every change. It multiplexes with
//! `tokio::select!` over shell commands, push-channel events, the poll
//! timer, completions of spawned network calls, and the two overlay
//! deadlines (update flash, error banner). Network calls run in their own
//! tasks and report back on an internal channel, so a slow write never
//! stalls polling or push handling.
//!
//! MODES
//! =====
//! The push channel is primary. Polling runs underneath at the normal
//! period while the channel is healthy and at the fast period once it has
//! failed. Only a successful subscription (initial or via reconnect)
//! leaves polling-only mode. There is exactly one poll timer; switching
//! period replaces it.
//!
//! ERROR HANDLING
//! ==============
//! Initial load failure is returned to the caller and nothing is spawned.
//! After that nothing is fatal: channel failures demote to polling, poll
//! failures set a warning line, write failures revert the optimistic flip
//! and raise a timed banner. A failed reconnect is also reported to its
//! caller as [`SyncError::Subscription`].

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncTuning;
use crate::error::{BackendError, ErrorCode, SubscriptionError, SyncError, describe_backend_error};
use crate::realtime::{ChannelEvent, RealtimeTransport, Subscription};
use crate::state::{ConnectionStatus, Reconcile, ToggleState, WidgetState};
use crate::store::ToggleStore;

const COMMAND_BUFFER: usize = 16;
/// Floor for the poll period; `interval` panics on zero.
const MIN_POLL_PERIOD: Duration = Duration::from_millis(100);

// =============================================================================
// SYNCHRONIZER
// =============================================================================

/// Wires a row store and a push transport into a running synchronizer.
pub struct Synchronizer {
    store: Arc<dyn ToggleStore>,
    realtime: Arc<dyn RealtimeTransport>,
    tuning: SyncTuning,
}

impl Synchronizer {
    #[must_use]
    pub fn new(store: Arc<dyn ToggleStore>, realtime: Arc<dyn RealtimeTransport>, tuning: SyncTuning) -> Self {
        Self { store, realtime, tuning }
    }

    /// One-shot read of the singleton row. No retry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connection`] if the row cannot be read.
    pub async fn load_initial(&self) -> Result<ToggleState, SyncError> {
        match self.store.fetch().await {
            Ok(row) => {
                info!(id = row.id, value = row.value, "initial lightbulb state loaded");
                Ok(row)
            }
            Err(e) => {
                warn!(error = %e, code = e.backend_code().unwrap_or(e.error_code()), "initial load failed");
                Err(SyncError::Connection(e))
            }
        }
    }

    /// Load the row, then start the actor with a push subscription attempt
    /// and the poll timer running.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connection`] if the initial read fails.
    pub async fn start(self) -> Result<SyncHandle, SyncError> {
        let initial = self.load_initial().await?;
        Ok(self.spawn(initial))
    }

    /// Start the actor from an already-loaded row.
    #[must_use]
    pub fn spawn(self, initial: ToggleState) -> SyncHandle {
        let state = WidgetState::new(initial, self.tuning.poll_interval);
        let (publish, watch_rx) = watch::channel(state.clone());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let actor = SyncActor {
            client_id: Uuid::new_v4(),
            store: self.store,
            realtime: self.realtime,
            tuning: self.tuning,
            poll: poll_timer(self.tuning.poll_interval),
            state,
            publish,
            commands: commands_rx,
            completions_tx,
            completions: completions_rx,
            subscription: None,
            attempt: 0,
            link_waiters: Vec::new(),
            polling_only: false,
            poll_in_flight: false,
            repoll: false,
            pending_write: None,
            flash_until: None,
            banner_until: None,
        };
        let task = tokio::spawn(actor.run());

        SyncHandle { commands: SyncCommands { tx: commands_tx }, state: watch_rx, task }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

enum Command {
    Toggle { reply: oneshot::Sender<Result<ToggleState, SyncError>> },
    Reconnect { reply: oneshot::Sender<Result<(), SyncError>> },
    PollNow,
    Shutdown,
}

/// Cloneable sender half for shell intents.
#[derive(Debug, Clone)]
pub struct SyncCommands {
    tx: mpsc::Sender<Command>,
}

impl SyncCommands {
    /// Optimistically flip, write, and resolve with the settled row.
    ///
    /// # Errors
    ///
    /// [`SyncError::Busy`] if a write is already in flight,
    /// [`SyncError::Write`] if the write failed (local state was reverted),
    /// [`SyncError::Stopped`] if the synchronizer has ended.
    pub async fn toggle(&self) -> Result<ToggleState, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Toggle { reply }).await?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Re-attempt the push subscription and resolve once the attempt settles.
    ///
    /// # Errors
    ///
    /// [`SyncError::Subscription`] if the attempt failed (polling continues),
    /// [`SyncError::Stopped`] if the synchronizer has ended.
    pub async fn reconnect(&self) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reconnect { reply }).await?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Poll once now, outside the timer.
    ///
    /// # Errors
    ///
    /// [`SyncError::Stopped`] if the synchronizer has ended.
    pub async fn poll_now(&self) -> Result<(), SyncError> {
        self.send(Command::PollNow).await
    }

    async fn send(&self, command: Command) -> Result<(), SyncError> {
        self.tx.send(command).await.map_err(|_| SyncError::Stopped)
    }
}

/// Shell-side handle: state snapshots plus commands.
///
/// Dropping the handle (and every [`SyncCommands`] clone) stops the actor.
#[derive(Debug)]
pub struct SyncHandle {
    commands: SyncCommands,
    state: watch::Receiver<WidgetState>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Latest published snapshot.
    #[must_use]
    pub fn state(&self) -> WidgetState {
        self.state.borrow().clone()
    }

    /// A fresh receiver for snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<WidgetState> {
        self.state.clone()
    }

    /// Wait for the next published snapshot.
    ///
    /// # Errors
    ///
    /// [`SyncError::Stopped`] once the actor has ended.
    pub async fn changed(&mut self) -> Result<WidgetState, SyncError> {
        self.state.changed().await.map_err(|_| SyncError::Stopped)?;
        Ok(self.state.borrow_and_update().clone())
    }

    #[must_use]
    pub fn commands(&self) -> SyncCommands {
        self.commands.clone()
    }

    /// See [`SyncCommands::toggle`].
    ///
    /// # Errors
    ///
    /// As [`SyncCommands::toggle`].
    pub async fn toggle(&self) -> Result<ToggleState, SyncError> {
        self.commands.toggle().await
    }

    /// See [`SyncCommands::reconnect`].
    ///
    /// # Errors
    ///
    /// As [`SyncCommands::reconnect`].
    pub async fn reconnect(&self) -> Result<(), SyncError> {
        self.commands.reconnect().await
    }

    /// See [`SyncCommands::poll_now`].
    ///
    /// # Errors
    ///
    /// [`SyncError::Stopped`] if the synchronizer has ended.
    pub async fn poll_now(&self) -> Result<(), SyncError> {
        self.commands.poll_now().await
    }

    /// Cancel the subscription and poll timer and wait for the actor to end.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = self.task.await;
    }
}

// =============================================================================
// ACTOR
// =============================================================================

enum Completion {
    Polled(Result<ToggleState, BackendError>),
    Written(Result<ToggleState, BackendError>),
    Subscribed { attempt: u64, result: Result<Subscription, SubscriptionError> },
}

struct PendingWrite {
    previous: ToggleState,
    reply: oneshot::Sender<Result<ToggleState, SyncError>>,
}

struct SyncActor {
    client_id: Uuid,
    store: Arc<dyn ToggleStore>,
    realtime: Arc<dyn RealtimeTransport>,
    tuning: SyncTuning,

    state: WidgetState,
    publish: watch::Sender<WidgetState>,

    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,

    subscription: Option<Subscription>,
    /// Generation of the latest subscription attempt; older results are dropped.
    attempt: u64,
    /// Reconnect callers waiting on the current attempt.
    link_waiters: Vec<oneshot::Sender<Result<(), SyncError>>>,
    polling_only: bool,

    poll: Interval,
    poll_in_flight: bool,
    /// A poll was requested while one was in flight.
    repoll: bool,

    pending_write: Option<PendingWrite>,
    flash_until: Option<Instant>,
    banner_until: Option<Instant>,
}

impl SyncActor {
    async fn run(mut self) {
        info!(client_id = %self.client_id, "synchronizer started");
        self.subscribe_realtime();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(done) = self.completions.recv() => self.handle_completion(done),
                event = next_channel_event(&mut self.subscription) => self.handle_channel_event(event),
                _ = self.poll.tick() => self.poll_once(),
                () = sleep_until(self.flash_until) => {
                    self.flash_until = None;
                    self.state.update_flash = false;
                }
                () = sleep_until(self.banner_until) => {
                    self.banner_until = None;
                    self.state.banner = None;
                }
            }
            self.publish_state();
        }

        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        info!(client_id = %self.client_id, "synchronizer stopped");
    }

    /// Publish the latest state. Changes that render identically (a newer
    /// timestamp on the same value) are stored without waking receivers.
    fn publish_state(&self) {
        self.publish.send_if_modified(|current| {
            if *current == self.state {
                return false;
            }
            let visible = !current.renders_same(&self.state);
            current.clone_from(&self.state);
            visible
        });
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Toggle { reply } => self.toggle(reply),
            Command::Reconnect { reply } => self.reconnect(reply),
            Command::PollNow => self.poll_once(),
            Command::Shutdown => {}
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Polled(result) => self.on_polled(result),
            Completion::Written(result) => self.on_written(result),
            Completion::Subscribed { attempt, result } => self.on_subscribed(attempt, result),
        }
    }

    // =========================================================================
    // push channel
    // =========================================================================

    /// Drop any current channel and start a new subscription attempt.
    fn subscribe_realtime(&mut self) {
        if let Some(mut old) = self.subscription.take() {
            old.cancel();
        }
        self.attempt += 1;
        self.state.link = ConnectionStatus::Connecting;

        let attempt = self.attempt;
        let realtime = Arc::clone(&self.realtime);
        let timeout = self.tuning.subscribe_timeout;
        let done = self.completions_tx.clone();
        debug!(attempt, "subscribing to realtime channel");
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, realtime.subscribe()).await {
                Ok(result) => result,
                Err(_) => Err(SubscriptionError::TimedOut),
            };
            let _ = done.send(Completion::Subscribed { attempt, result });
        });
    }

    fn on_subscribed(&mut self, attempt: u64, result: Result<Subscription, SubscriptionError>) {
        if attempt != self.attempt {
            debug!(attempt, current = self.attempt, "dropping superseded subscription attempt");
            return;
        }
        let outcome = match result {
            Ok(subscription) => {
                info!(client_id = %self.client_id, attempt, "realtime updates active");
                self.subscription = Some(subscription);
                self.state.link = ConnectionStatus::RealtimeActive;
                self.polling_only = false;
                self.start_polling(self.tuning.poll_interval);
                Ok(())
            }
            Err(e) => {
                self.on_realtime_failure(&e);
                Err(e)
            }
        };
        for waiter in self.link_waiters.drain(..) {
            let _ = waiter.send(outcome.clone().map_err(SyncError::Subscription));
        }
    }

    fn handle_channel_event(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Update(row)) => {
                debug!(value = row.value, "push update received");
                self.offer_remote(&row);
                self.flash_update();
            }
            Some(ChannelEvent::Failed(e)) => self.on_realtime_failure(&e),
            None => self.on_realtime_failure(&SubscriptionError::Closed("subscription ended".to_owned())),
        }
    }

    fn on_realtime_failure(&mut self, e: &SubscriptionError) {
        warn!(
            client_id = %self.client_id,
            error = %e,
            code = e.error_code(),
            retryable = e.retryable(),
            "realtime updates failed; using polling fallback"
        );
        self.subscription = None;
        self.polling_only = true;
        self.state.link = ConnectionStatus::RealtimeFailed;
        self.start_polling(self.tuning.fast_poll_interval);
    }

    /// Manual retry. Polling-only mode (and its fast period) stays until
    /// the new attempt succeeds. A reconnect during an attempt restarts it,
    /// and every waiter gets the outcome of the attempt that finally settles.
    fn reconnect(&mut self, reply: oneshot::Sender<Result<(), SyncError>>) {
        info!(client_id = %self.client_id, polling_only = self.polling_only, "reconnecting realtime");
        self.link_waiters.push(reply);
        self.subscribe_realtime();
    }

    // =========================================================================
    // polling
    // =========================================================================

    /// Replace the poll timer. The first tick lands one full period from now.
    fn start_polling(&mut self, period: Duration) {
        self.poll = poll_timer(period);
        self.state.poll_interval = period;
        debug!(period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "poll timer started");
    }

    fn poll_once(&mut self) {
        if self.poll_in_flight {
            self.repoll = true;
            return;
        }
        self.poll_in_flight = true;
        let store = Arc::clone(&self.store);
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = done.send(Completion::Polled(store.fetch().await));
        });
    }

    fn on_polled(&mut self, result: Result<ToggleState, BackendError>) {
        self.poll_in_flight = false;
        match result {
            Ok(row) => {
                self.state.warning = None;
                if self.offer_remote(&row) {
                    self.flash_update();
                }
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), retryable = e.retryable(), "poll failed");
                self.state.warning = Some(describe_backend_error(&e));
            }
        }
        if self.state.link == ConnectionStatus::RealtimeFailed {
            self.state.link = ConnectionStatus::PollingOnly;
        }
        if std::mem::take(&mut self.repoll) {
            self.poll_once();
        }
    }

    /// Reconcile a remote snapshot from either path. Returns whether the
    /// displayed value changed.
    fn offer_remote(&mut self, row: &ToggleState) -> bool {
        let base = self.pending_write.as_ref().map(|pending| &pending.previous);
        let outcome = self.state.apply_remote(row, base);
        debug!(?outcome, value = row.value, "remote snapshot offered");
        outcome == Reconcile::Applied
    }

    fn flash_update(&mut self) {
        self.state.update_flash = true;
        self.flash_until = Some(Instant::now() + self.tuning.update_flash);
    }

    // =========================================================================
    // toggle
    // =========================================================================

    fn toggle(&mut self, reply: oneshot::Sender<Result<ToggleState, SyncError>>) {
        if self.pending_write.is_some() {
            let _ = reply.send(Err(SyncError::Busy));
            return;
        }

        let previous = self.state.flip_optimistic();
        let target = self.state.toggle.value;
        info!(client_id = %self.client_id, value = target, "toggling lightbulb");
        self.pending_write = Some(PendingWrite { previous, reply });

        let store = Arc::clone(&self.store);
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = done.send(Completion::Written(store.write(target).await));
        });
    }

    fn on_written(&mut self, result: Result<ToggleState, BackendError>) {
        let Some(PendingWrite { previous, reply }) = self.pending_write.take() else {
            return;
        };

        let outcome = match result {
            Ok(row) => {
                self.state.writing = false;
                self.state.apply_remote(&row, None);
                Ok(self.state.toggle.clone())
            }
            Err(e) => {
                warn!(
                    client_id = %self.client_id,
                    error = %e,
                    code = e.error_code(),
                    retryable = e.retryable(),
                    "toggle write failed; reverting"
                );
                self.state.revert_to(previous);
                self.state.banner = Some(format!("Error toggling lightbulb: {}", describe_backend_error(&e)));
                self.banner_until = Some(Instant::now() + self.tuning.banner_ttl);
                Err(SyncError::Write(e))
            }
        };
        let _ = reply.send(outcome);

        // Confirm convergence either way.
        self.poll_once();
    }
}

fn poll_timer(period: Duration) -> Interval {
    let period = period.max(MIN_POLL_PERIOD);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_channel_event(subscription: &mut Option<Subscription>) -> Option<ChannelEvent> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
#[path = "synchronizer_test.rs"]
mod tests;
