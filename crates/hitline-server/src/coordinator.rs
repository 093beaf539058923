//! The session actor.
//!
//! One tokio task owns the session aggregate, the hit aggregator, the
//! termination monitor and the dispatcher. Everything else talks to it
//! through [`SessionHandle`], so commands are applied one at a time in
//! arrival order and no lock guards the session state.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, WeakUnboundedSender};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use hitline_core::bus::{Callback, CoordinationBus, DEVICE_STOPPED, REQUEST_STOP};
use hitline_core::device::{DeviceCommandOutcome, DeviceId, DeviceMethod, DispatchOutcome};
use hitline_core::error::{SessionError, StateError, ValidationError};
use hitline_core::history::{FinalizeSnapshot, SessionHistoryEntry};
use hitline_core::lifecycle::Lifecycle;
use hitline_core::monitor::TerminationMonitor;
use hitline_core::scoring::{SessionScoreResult, is_run_valid};
use hitline_core::session::{HitRecord, Session, SessionParams, StopReason};
use hitline_core::telemetry::HitAggregator;

use crate::dispatcher::{DEFAULT_COMMAND_TIMEOUT, DeviceCommandDispatcher};
use crate::finalizer::{FinalizeReport, SessionFinalizer};
use crate::ports::{DeviceCommandPort, DeviceRegistry, GameHistoryPort};
use crate::ticker::{spawn_delayed_stop, spawn_duration_ticker};

/// Wall-clock source in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Tuning for a coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub command_timeout: Duration,
    pub tick_interval: Duration,
    /// Pause between a goal trigger and the stop it requests, so in-flight
    /// hits can still land.
    pub goal_settle_delay: Duration,
    /// Check device availability before every start.
    pub require_online: bool,
    pub broadcast_capacity: usize,
    /// Unsaved history entries kept for a later flush; the oldest is dropped
    /// beyond this.
    pub max_pending_history: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            tick_interval: Duration::from_secs(1),
            goal_settle_delay: Duration::from_millis(500),
            require_online: false,
            broadcast_capacity: 1024,
            max_pending_history: 1000,
        }
    }
}

/// External collaborators of a coordinator.
pub struct CoordinatorPorts {
    pub devices: Arc<dyn DeviceCommandPort>,
    pub registry: Option<Arc<dyn DeviceRegistry>>,
    pub history: Arc<dyn GameHistoryPort>,
    pub bus: Arc<CoordinationBus>,
    pub clock: Clock,
}

impl CoordinatorPorts {
    pub fn new(devices: Arc<dyn DeviceCommandPort>, history: Arc<dyn GameHistoryPort>) -> Self {
        Self {
            devices,
            registry: None,
            history,
            bus: Arc::new(CoordinationBus::new()),
            clock: Arc::new(hitline_core::time::now_ms),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn DeviceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_bus(mut self, bus: Arc<CoordinationBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

/// Commands accepted by the coordinator task.
#[derive(Debug)]
pub enum SessionCommand {
    Start {
        device_ids: Vec<DeviceId>,
        params: SessionParams,
        reply: oneshot::Sender<Result<DispatchOutcome, SessionError>>,
    },
    Stop {
        reason: StopReason,
        reply: Option<oneshot::Sender<Result<StopOutcome, SessionError>>>,
    },
    RetryFailed {
        device_ids: Option<Vec<DeviceId>>,
        reply: oneshot::Sender<Result<DispatchOutcome, SessionError>>,
    },
    RecordHit {
        hit: HitRecord,
        reply: Option<oneshot::Sender<bool>>,
    },
    DeviceStopped {
        device_id: DeviceId,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    FlushHistory {
        reply: oneshot::Sender<FlushSummary>,
    },
    Tick {
        generation: u64,
    },
    Shutdown,
}

/// Notifications fanned out to subscribers (SSE clients, tests).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    LifecycleChanged {
        from: Lifecycle,
        to: Lifecycle,
    },
    DeviceOutcome {
        device_id: DeviceId,
        outcome: DeviceCommandOutcome,
    },
    HitRecorded {
        device_id: DeviceId,
        timestamp_ms: u64,
        count: u32,
    },
    AutoStop {
        reason: StopReason,
    },
    Finalized {
        game_id: String,
        score: Option<f64>,
        is_valid: bool,
        persisted: bool,
    },
    PersistenceWarning {
        game_id: String,
        message: String,
    },
}

/// Answer to a stop request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StopOutcome {
    /// No session was running; nothing was sent.
    NotRunning { lifecycle: Lifecycle },
    /// An automatic stop whose trigger is no longer current.
    Ignored { reason: StopReason },
    Finalized {
        dispatch: DispatchOutcome,
        report: FinalizeReport,
    },
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub lifecycle: Lifecycle,
    pub session_id: Option<Uuid>,
    pub game_id: Option<String>,
    pub device_ids: Vec<DeviceId>,
    pub device_outcomes: BTreeMap<DeviceId, DeviceCommandOutcome>,
    pub started_at: Option<u64>,
    pub elapsed_secs: Option<u64>,
    pub desired_duration_seconds: Option<u64>,
    pub goal_shots_per_target: BTreeMap<DeviceId, u32>,
    pub hits_by_device: BTreeMap<DeviceId, u32>,
    pub total_hits: usize,
    pub goals_met: bool,
    pub live: Option<SessionScoreResult>,
    pub stopped_devices: Vec<DeviceId>,
    pub pending_history: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    pub persisted: usize,
    pub remaining: usize,
}

/// Cloneable front door to a running coordinator.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    bus: Arc<CoordinationBus>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| SessionError::CoordinatorGone)?;
        rx.await.map_err(|_| SessionError::CoordinatorGone)
    }

    pub async fn start(
        &self,
        device_ids: Vec<DeviceId>,
        params: SessionParams,
    ) -> Result<DispatchOutcome, SessionError> {
        self.request(|reply| SessionCommand::Start {
            device_ids,
            params,
            reply,
        })
        .await?
    }

    /// Manual stop. A no-op when nothing is running.
    pub async fn stop(&self) -> Result<StopOutcome, SessionError> {
        self.request(|reply| SessionCommand::Stop {
            reason: StopReason::Manual,
            reply: Some(reply),
        })
        .await?
    }

    pub async fn retry_failed(
        &self,
        device_ids: Option<Vec<DeviceId>>,
    ) -> Result<DispatchOutcome, SessionError> {
        self.request(|reply| SessionCommand::RetryFailed { device_ids, reply })
            .await?
    }

    /// Returns whether the hit was accepted.
    pub async fn record_hit(&self, hit: HitRecord) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::RecordHit {
            hit,
            reply: Some(reply),
        })
        .await
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    /// Resubmit history entries whose earlier write failed.
    pub async fn flush_pending_history(&self) -> Result<FlushSummary, SessionError> {
        self.request(|reply| SessionCommand::FlushHistory { reply })
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn bus(&self) -> &Arc<CoordinationBus> {
        &self.bus
    }

    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
    }
}

/// Spawn a coordinator task and wire its bus entries.
pub fn spawn_session_coordinator(
    ports: CoordinatorPorts,
    config: CoordinatorConfig,
) -> (SessionHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (events_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));

    register_bus_entries(&ports.bus, cmd_tx.downgrade());

    let outcome_events = events_tx.clone();
    let transition_events = events_tx.clone();
    let dispatcher = DeviceCommandDispatcher::new(ports.devices, config.command_timeout)
        .with_observer(Callback::new(
            move |(device_id, outcome): (DeviceId, DeviceCommandOutcome)| {
                let _ = outcome_events.send(SessionEvent::DeviceOutcome { device_id, outcome });
            },
        ))
        .with_transition_observer(Callback::new(move |(from, to): (Lifecycle, Lifecycle)| {
            let _ = transition_events.send(SessionEvent::LifecycleChanged { from, to });
        }));

    let coordinator = SessionCoordinator {
        session: Session::default(),
        aggregator: HitAggregator::new(),
        monitor: TerminationMonitor::new(),
        dispatcher,
        finalizer: SessionFinalizer::new(ports.history),
        registry: ports.registry,
        bus: Arc::clone(&ports.bus),
        clock: ports.clock,
        config,
        events: events_tx.clone(),
        self_tx: cmd_tx.downgrade(),
        running_since: None,
        tasks: None,
        generation: 0,
        start_failures: BTreeSet::new(),
        pending_history: VecDeque::new(),
    };

    let join = tokio::spawn(coordinator.run(cmd_rx));
    let handle = SessionHandle {
        cmd_tx,
        events: events_tx,
        bus: ports.bus,
    };
    (handle, join)
}

fn register_bus_entries(bus: &CoordinationBus, tx: WeakUnboundedSender<SessionCommand>) {
    let stop_tx = tx.clone();
    bus.register(&REQUEST_STOP, move |reason| {
        stop_tx
            .upgrade()
            .is_some_and(|tx| tx.send(SessionCommand::Stop { reason, reply: None }).is_ok())
    });
    bus.register(&DEVICE_STOPPED, move |device_id| {
        tx.upgrade()
            .is_some_and(|tx| tx.send(SessionCommand::DeviceStopped { device_id }).is_ok())
    });
}

/// Cancellation scope for the ticker and scheduled stops of one run.
struct RunScope {
    token: CancellationToken,
}

struct SessionCoordinator {
    session: Session,
    aggregator: HitAggregator,
    monitor: TerminationMonitor,
    dispatcher: DeviceCommandDispatcher,
    finalizer: SessionFinalizer,
    registry: Option<Arc<dyn DeviceRegistry>>,
    bus: Arc<CoordinationBus>,
    clock: Clock,
    config: CoordinatorConfig,
    events: broadcast::Sender<SessionEvent>,
    self_tx: WeakUnboundedSender<SessionCommand>,
    running_since: Option<Instant>,
    tasks: Option<RunScope>,
    /// Bumped for every run scope so late ticks from a cancelled ticker
    /// are recognised.
    generation: u64,
    /// Roster devices whose start command has failed and not since succeeded.
    start_failures: BTreeSet<DeviceId>,
    pending_history: VecDeque<SessionHistoryEntry>,
}

impl SessionCoordinator {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>) {
        tracing::info!("Session coordinator started");
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                SessionCommand::Start {
                    device_ids,
                    params,
                    reply,
                } => {
                    let result = self.handle_start(device_ids, params).await;
                    let _ = reply.send(result);
                },
                SessionCommand::Stop { reason, reply } => {
                    let result = self.handle_stop(reason).await;
                    if let Err(ref e) = result {
                        tracing::warn!(%reason, error = %e, "Stop failed");
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                },
                SessionCommand::RetryFailed { device_ids, reply } => {
                    let result = self.handle_retry(device_ids).await;
                    let _ = reply.send(result);
                },
                SessionCommand::RecordHit { hit, reply } => {
                    let accepted = self.handle_hit(hit);
                    if let Some(reply) = reply {
                        let _ = reply.send(accepted);
                    }
                },
                SessionCommand::DeviceStopped { device_id } => {
                    self.handle_device_stopped(&device_id);
                },
                SessionCommand::Status { reply } => {
                    let _ = reply.send(self.status());
                },
                SessionCommand::FlushHistory { reply } => {
                    let summary = self.flush_pending_history().await;
                    let _ = reply.send(summary);
                },
                SessionCommand::Tick { generation } => self.handle_tick(generation),
                SessionCommand::Shutdown => break,
            }
        }

        self.cancel_run_scope();
        self.bus.unregister(&REQUEST_STOP);
        self.bus.unregister(&DEVICE_STOPPED);
        tracing::info!("Session coordinator stopped");
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_lifecycle_change(&self, from: Lifecycle) {
        let to = self.session.lifecycle;
        if from != to {
            self.emit(SessionEvent::LifecycleChanged { from, to });
        }
    }

    fn set_lifecycle(&mut self, to: Lifecycle) -> Result<(), StateError> {
        let from = self.session.lifecycle;
        self.session.lifecycle.transition(to)?;
        self.emit_lifecycle_change(from);
        Ok(())
    }

    // -- start ------------------------------------------------------------

    async fn handle_start(
        &mut self,
        device_ids: Vec<DeviceId>,
        params: SessionParams,
    ) -> Result<DispatchOutcome, SessionError> {
        let lifecycle = self.session.lifecycle;
        if !lifecycle.accepts_start() {
            return Err(StateError::SessionActive(lifecycle).into());
        }
        if lifecycle != Lifecycle::Idle {
            self.reset()?;
        }

        self.set_lifecycle(Lifecycle::Configuring)?;
        if let Err(e) = self.validate_start(&device_ids, &params).await {
            tracing::warn!(error = %e, "Start rejected");
            self.set_lifecycle(Lifecycle::Idle)?;
            return Err(e.into());
        }

        self.session.configure(device_ids, &params);
        self.dispatcher.reset();
        self.aggregator.clear();
        tracing::info!(
            game_id = %self.session.game_id,
            devices = self.session.device_ids.len(),
            "Starting session"
        );

        let outcome = self
            .dispatcher
            .start(
                &mut self.session.lifecycle,
                &self.session.device_ids,
                &self.session.game_id,
                &params.custom,
            )
            .await?;
        self.start_failures = outcome.error_ids.iter().cloned().collect();

        if outcome.any_succeeded() {
            self.enter_running();
            Ok(outcome)
        } else {
            Err(SessionError::AllDevicesFailed {
                method: DeviceMethod::Start,
                outcome,
            })
        }
    }

    async fn validate_start(
        &self,
        device_ids: &[DeviceId],
        params: &SessionParams,
    ) -> Result<(), ValidationError> {
        params.validate(device_ids)?;
        if params.require_online || self.config.require_online {
            match self.registry {
                Some(ref registry) => {
                    DeviceCommandDispatcher::ensure_online(registry.as_ref(), device_ids).await?;
                },
                None => tracing::warn!("Online check requested but no device registry is wired"),
            }
        }
        Ok(())
    }

    fn enter_running(&mut self) {
        self.session.started_at = Some((self.clock)());
        self.running_since = Some(Instant::now());
        self.monitor.arm(
            &self.session.device_ids,
            &self.session.goal_shots_per_target,
            self.session.desired_duration_seconds,
        );
        self.open_run_scope();
        tracing::info!(game_id = %self.session.game_id, "Session running");
    }

    fn open_run_scope(&mut self) {
        self.cancel_run_scope();
        self.generation += 1;
        let token = CancellationToken::new();
        if self.session.desired_duration_seconds.is_some() {
            spawn_duration_ticker(
                self.config.tick_interval,
                self.generation,
                self.self_tx.clone(),
                token.clone(),
            );
        }
        self.tasks = Some(RunScope { token });
    }

    fn cancel_run_scope(&mut self) {
        if let Some(scope) = self.tasks.take() {
            scope.token.cancel();
        }
    }

    // -- retry ------------------------------------------------------------

    async fn handle_retry(
        &mut self,
        requested: Option<Vec<DeviceId>>,
    ) -> Result<DispatchOutcome, SessionError> {
        let from = self.session.lifecycle;
        if !matches!(from, Lifecycle::Running | Lifecycle::Error) {
            return Err(StateError::NotRunning(from).into());
        }

        let outcome = self
            .dispatcher
            .retry_failed(
                &mut self.session.lifecycle,
                &self.session.device_ids,
                requested.as_deref(),
            )
            .await?;
        for id in &outcome.success_ids {
            self.start_failures.remove(id);
        }
        self.start_failures.extend(outcome.error_ids.iter().cloned());

        match (from, self.session.lifecycle) {
            (Lifecycle::Error, Lifecycle::Running) => {
                self.enter_running();
                Ok(outcome)
            },
            (Lifecycle::Error, Lifecycle::Error) if outcome.all_failed() => {
                Err(SessionError::AllDevicesFailed {
                    method: DeviceMethod::Start,
                    outcome,
                })
            },
            _ => Ok(outcome),
        }
    }

    // -- telemetry --------------------------------------------------------

    fn handle_hit(&mut self, hit: HitRecord) -> bool {
        if self.session.lifecycle != Lifecycle::Running {
            tracing::debug!(device = %hit.device_id, "Dropping hit outside a running session");
            return false;
        }
        let count = self.aggregator.record(hit.clone());
        self.emit(SessionEvent::HitRecorded {
            device_id: hit.device_id.clone(),
            timestamp_ms: hit.timestamp_ms,
            count,
        });

        let goal = self
            .session
            .goal_shots_per_target
            .get(&hit.device_id)
            .copied()
            .unwrap_or(0);
        if goal > 0 && count == goal {
            tracing::info!(device = %hit.device_id, goal, "Device reached its goal");
            self.handle_device_stopped(&hit.device_id);
        }
        true
    }

    fn handle_device_stopped(&mut self, device_id: &str) {
        if self.session.lifecycle != Lifecycle::Running {
            return;
        }
        if let Some(reason) = self.monitor.mark_device_stopped(device_id) {
            self.schedule_auto_stop(reason, self.config.goal_settle_delay);
        }
    }

    fn handle_tick(&mut self, generation: u64) {
        if generation != self.generation || self.session.lifecycle != Lifecycle::Running {
            return;
        }
        let Some(since) = self.running_since else {
            return;
        };
        let elapsed = since.elapsed().as_secs();
        if let Some(reason) = self.monitor.on_tick(elapsed) {
            self.schedule_auto_stop(reason, Duration::ZERO);
        }
    }

    fn schedule_auto_stop(&mut self, reason: StopReason, delay: Duration) {
        tracing::info!(%reason, delay_ms = delay.as_millis() as u64, "Termination trigger fired");
        self.emit(SessionEvent::AutoStop { reason });
        let Some(ref scope) = self.tasks else {
            return;
        };
        spawn_delayed_stop(Arc::clone(&self.bus), reason, delay, scope.token.child_token());
    }

    fn trigger_is_current(&self, reason: StopReason) -> bool {
        match reason {
            StopReason::Manual => true,
            StopReason::Duration => self.monitor.duration_fired(),
            StopReason::Goal => self.monitor.goal_fired(),
        }
    }

    // -- stop and finalize ------------------------------------------------

    async fn handle_stop(&mut self, reason: StopReason) -> Result<StopOutcome, SessionError> {
        let lifecycle = self.session.lifecycle;
        match lifecycle {
            Lifecycle::Idle | Lifecycle::Completed | Lifecycle::Error => {
                tracing::debug!(%lifecycle, %reason, "Stop ignored, nothing running");
                return Ok(StopOutcome::NotRunning { lifecycle });
            },
            Lifecycle::Running => {},
            other => return Err(StateError::NotRunning(other).into()),
        }
        if !self.trigger_is_current(reason) {
            tracing::debug!(%reason, "Ignoring stale automatic stop");
            return Ok(StopOutcome::Ignored { reason });
        }

        tracing::info!(game_id = %self.session.game_id, %reason, "Stopping session");
        self.session.stop_reason = Some(reason);
        self.cancel_run_scope();
        self.monitor.suspend();

        let dispatch = self
            .dispatcher
            .stop(
                &mut self.session.lifecycle,
                &self.session.device_ids,
                &self.session.game_id,
            )
            .await?;

        let stopped_at = (self.clock)();
        self.session.stopped_at = Some(stopped_at);
        let failed_device_ids = self
            .session
            .device_ids
            .iter()
            .filter(|id| self.start_failures.contains(*id))
            .cloned()
            .collect();
        let snapshot = FinalizeSnapshot::capture(
            &self.session,
            self.aggregator.hits(),
            failed_device_ids,
            stopped_at,
        );

        let report = match self.finalizer.finalize(snapshot, None).await {
            Ok(report) => report,
            Err(e) => {
                self.roll_back_to_running()?;
                return Err(e.into());
            },
        };

        if !report.persisted {
            self.emit(SessionEvent::PersistenceWarning {
                game_id: report.entry.game_id.clone(),
                message: report.warning.clone().unwrap_or_default(),
            });
            self.queue_pending(report.entry.clone());
        }

        self.set_lifecycle(Lifecycle::Completed)?;
        self.emit(SessionEvent::Finalized {
            game_id: report.entry.game_id.clone(),
            score: report.entry.score.score,
            is_valid: report.entry.score.is_valid,
            persisted: report.persisted,
        });
        self.reset()?;
        Ok(StopOutcome::Finalized { dispatch, report })
    }

    /// Undo a stop whose finalize computation failed. The session keeps its
    /// hits and keeps running so the stop can be retried.
    fn roll_back_to_running(&mut self) -> Result<(), StateError> {
        let from = self.session.lifecycle;
        self.session.lifecycle.rollback_to_running()?;
        self.emit_lifecycle_change(from);
        self.session.stopped_at = None;
        self.session.stop_reason = None;
        self.monitor.resume();
        self.open_run_scope();
        Ok(())
    }

    /// Drop the finished session and return to `Idle`.
    fn reset(&mut self) -> Result<(), StateError> {
        self.cancel_run_scope();
        self.monitor.disarm();
        self.aggregator.clear();
        self.dispatcher.reset();
        self.running_since = None;
        self.start_failures.clear();
        if matches!(self.session.lifecycle, Lifecycle::Completed | Lifecycle::Error) {
            self.set_lifecycle(Lifecycle::Idle)?;
        }
        self.session.clear();
        Ok(())
    }

    fn queue_pending(&mut self, entry: SessionHistoryEntry) {
        while self.pending_history.len() >= self.config.max_pending_history.max(1) {
            if let Some(dropped) = self.pending_history.pop_front() {
                tracing::warn!(
                    game_id = %dropped.game_id,
                    max = self.config.max_pending_history,
                    "Pending history full, dropping oldest unsaved entry"
                );
            }
        }
        self.pending_history.push_back(entry);
    }

    async fn flush_pending_history(&mut self) -> FlushSummary {
        let pending = std::mem::take(&mut self.pending_history);
        let mut persisted = 0;
        for entry in pending {
            let report = self.finalizer.persist(entry).await;
            if report.persisted {
                persisted += 1;
            } else {
                self.queue_pending(report.entry);
            }
        }
        if persisted > 0 {
            tracing::info!(persisted, remaining = self.pending_history.len(), "Flushed pending history");
        }
        FlushSummary {
            persisted,
            remaining: self.pending_history.len(),
        }
    }

    // -- status -----------------------------------------------------------

    fn status(&self) -> SessionStatus {
        let session = &self.session;
        let has_session = !session.device_ids.is_empty();
        let live = session.started_at.map(|start| {
            self.aggregator.live_splits(
                &session.goal_shots_per_target,
                start,
                session.target_order.as_deref(),
            )
        });
        SessionStatus {
            lifecycle: session.lifecycle,
            session_id: has_session.then_some(session.id),
            game_id: has_session.then(|| session.game_id.clone()),
            device_ids: session.device_ids.clone(),
            device_outcomes: self.dispatcher.outcomes().clone(),
            started_at: session.started_at,
            elapsed_secs: self.running_since.map(|since| since.elapsed().as_secs()),
            desired_duration_seconds: session.desired_duration_seconds,
            goal_shots_per_target: session.goal_shots_per_target.clone(),
            hits_by_device: self.aggregator.counts().clone(),
            total_hits: self.aggregator.len(),
            goals_met: session.has_goals()
                && is_run_valid(self.aggregator.hits(), &session.goal_shots_per_target),
            live,
            stopped_devices: self.monitor.stopped_devices().iter().cloned().collect(),
            pending_history: self.pending_history.len(),
        }
    }
}
