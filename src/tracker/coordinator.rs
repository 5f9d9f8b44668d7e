use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use futures_util::{
    stream::{self, BoxStream},
    StreamExt,
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{NightSummary, NightsSnapshot, SessionRecord, SessionStore, SleepQuality},
    error::{Error, Result},
};

use super::{TrackerState, TrackerStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// What a command did once it reached the front of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The guard rejected the command for the current state; nothing was written.
    Ignored,
}

#[derive(Debug, Clone, Copy)]
enum CommandKind {
    Initialize,
    Start,
    Stop,
    SetQuality(i32),
    Reset,
}

struct Command {
    kind: CommandKind,
    reply: oneshot::Sender<Result<Transition>>,
}

/// Completion handle for a queued command. Await it for the outcome, or drop it to
/// fire and forget; the command runs either way.
pub struct CommandReceipt {
    reply: oneshot::Receiver<Result<Transition>>,
}

impl IntoFuture for CommandReceipt {
    type Output = Result<Transition>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<Transition>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.reply.await.unwrap_or(Err(Error::Cancelled)) })
    }
}

/// Owns the "which night is open" state and serializes every lifecycle command through
/// a single task.
pub struct SessionCoordinator<S: SessionStore> {
    store: Arc<S>,
    commands: mpsc::UnboundedSender<Command>,
    current: watch::Receiver<Option<SessionRecord>>,
    cancel_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: SessionStore> SessionCoordinator<S> {
    /// Must be called inside a tokio runtime.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }

    pub fn with_clock(store: S, clock: impl Clock) -> Self {
        let store = Arc::new(store);
        let cancel_token = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (current_tx, current_rx) = watch::channel(None);

        let worker = CommandWorker {
            store: store.clone(),
            clock: Box::new(clock),
            state: TrackerState::new(),
            current_tx,
            cancel_token: cancel_token.clone(),
        };
        let handle = tokio::spawn(worker.run(command_rx));

        Self {
            store,
            commands: command_tx,
            current: current_rx,
            cancel_token,
            worker: Mutex::new(Some(handle)),
        }
    }

    fn submit(&self, kind: CommandKind) -> CommandReceipt {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cancel_token.is_cancelled() {
            return CommandReceipt { reply: reply_rx };
        }

        if self
            .commands
            .send(Command {
                kind,
                reply: reply_tx,
            })
            .is_err()
        {
            log_warn!("Dropped {kind:?}: command queue closed");
        }
        CommandReceipt { reply: reply_rx }
    }

    /// Derives the current night from the newest stored row.
    pub fn initialize(&self) -> CommandReceipt {
        self.submit(CommandKind::Initialize)
    }

    pub fn start(&self) -> CommandReceipt {
        self.submit(CommandKind::Start)
    }

    pub fn stop(&self) -> CommandReceipt {
        self.submit(CommandKind::Stop)
    }

    /// Rates the open night. `value` must be 0..=5.
    pub fn set_quality(&self, value: i32) -> CommandReceipt {
        self.submit(CommandKind::SetQuality(value))
    }

    /// Deletes every night and returns to idle.
    pub fn reset(&self) -> CommandReceipt {
        self.submit(CommandKind::Reset)
    }

    pub fn current_session(&self) -> Option<SessionRecord> {
        self.current.borrow().clone()
    }

    pub fn watch_current(&self) -> watch::Receiver<Option<SessionRecord>> {
        self.current.clone()
    }

    pub fn status(&self) -> TrackerStatus {
        match *self.current.borrow() {
            Some(_) => TrackerStatus::Tracking,
            None => TrackerStatus::Idle,
        }
    }

    /// Every stored night, newest first, re-emitted after each write. Ends when the
    /// coordinator shuts down.
    pub async fn history(&self) -> Result<BoxStream<'static, NightsSnapshot>> {
        if self.cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let nights = self.store.get_all_nights().await?;
        let token = self.cancel_token.clone();

        // Returning `None` drops the receiver, which detaches it from the live query.
        Ok(stream::unfold(Some((nights, token)), |attached| async move {
            let (mut nights, token) = attached?;
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                snapshot = nights.next() => {
                    snapshot.map(|snapshot| (snapshot, Some((nights, token))))
                }
            }
        })
        .boxed())
    }

    pub async fn history_summaries(&self) -> Result<BoxStream<'static, Vec<NightSummary>>> {
        let nights = self.history().await?;
        Ok(nights
            .map(|snapshot| snapshot.iter().map(NightSummary::from).collect::<Vec<_>>())
            .boxed())
    }

    /// Cancels queued and in-flight commands, ends history streams and waits for the
    /// command task to exit. A write the store already committed stays committed.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();

        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                log_warn!("Session command task failed to join: {err}");
            }
        }
    }
}

impl<S: SessionStore> Drop for SessionCoordinator<S> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

struct CommandWorker<S: SessionStore> {
    store: Arc<S>,
    clock: Box<dyn Clock>,
    state: TrackerState,
    current_tx: watch::Sender<Option<SessionRecord>>,
    cancel_token: CancellationToken,
}

impl<S: SessionStore> CommandWorker<S> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let token = self.cancel_token.clone();

        loop {
            let command = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            let kind = command.kind;
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = self.apply(kind) => result,
            };

            match &result {
                Ok(Transition::Applied) => log_info!("{kind:?} applied"),
                Ok(Transition::Ignored) => {
                    log_debug!("{kind:?} ignored in {:?} state", self.state.status())
                }
                Err(Error::InvalidQuality(_)) => {}
                Err(err) => {
                    log_warn!("{kind:?} failed: {err}");
                    self.state.invalidate();
                    self.publish();
                }
            }

            let _ = command.reply.send(result);
        }

        commands.close();
        while let Ok(pending) = commands.try_recv() {
            let _ = pending.reply.send(Err(Error::Cancelled));
        }
        log_debug!("Session command task stopped");
    }

    async fn apply(&mut self, kind: CommandKind) -> Result<Transition> {
        match kind {
            CommandKind::Initialize => {
                self.resync().await?;
                Ok(Transition::Applied)
            }
            CommandKind::Start => {
                self.ensure_synced().await?;
                if self.state.current().is_some() {
                    return Ok(Transition::Ignored);
                }

                let night = SessionRecord::begin(self.clock.now_millis());
                self.check_cancelled()?;
                self.store.insert(&night).await?;

                // Trust the store, not the local record.
                self.resync().await?;
                Ok(Transition::Applied)
            }
            CommandKind::Stop => {
                self.ensure_synced().await?;
                let Some(mut night) = self.state.current().cloned() else {
                    return Ok(Transition::Ignored);
                };

                // end == start would still read as open.
                let now = self.clock.now_millis();
                night.end_time_milli = if now == night.start_time_milli {
                    now.checked_add(1).unwrap_or(now - 1)
                } else {
                    now
                };
                self.check_cancelled()?;
                self.store.update(&night).await?;

                self.state.clear();
                self.publish();
                Ok(Transition::Applied)
            }
            CommandKind::SetQuality(value) => {
                if SleepQuality::from_rating(value).is_none() {
                    return Err(Error::InvalidQuality(value));
                }
                self.ensure_synced().await?;
                let Some(mut night) = self.state.current().cloned() else {
                    return Ok(Transition::Ignored);
                };

                night.quality_rating = value;
                self.check_cancelled()?;
                self.store.update(&night).await?;

                self.state.replace_current(night);
                self.publish();
                Ok(Transition::Applied)
            }
            CommandKind::Reset => {
                self.check_cancelled()?;
                self.store.clear().await?;

                self.state.clear();
                self.publish();
                Ok(Transition::Applied)
            }
        }
    }

    async fn ensure_synced(&mut self) -> Result<()> {
        if self.state.is_synced() {
            return Ok(());
        }
        self.resync().await
    }

    async fn resync(&mut self) -> Result<()> {
        self.state.invalidate();
        let tonight = self.store.get_tonight().await?;
        self.state.adopt_tonight(tonight);
        self.publish();
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn publish(&self) {
        self.current_tx.send_replace(self.state.current().cloned());
    }
}
