//! Session supervisor.
//!
//! The supervisor drives one session attempt at a time through
//! [`AttemptState`]: log in, start the token refresh loop, open the event
//! stream, start the listener, subscribe, start the subscription refresh loop,
//! then wait. The first failure reported by any step or background loop of
//! the current attempt ends it. The attempt's tasks are cancelled and
//! awaited, the supervisor waits out the restart cooldown, and a new attempt
//! starts from login with fresh transports, session and subscription.
//!
//! # Failure channel
//!
//! All tasks report on one unbounded channel through a [`FailureReporter`]
//! stamped with the attempt generation. A reporter stays silent once its
//! attempt is cancelled, and the supervisor discards any [`Failure`] whose
//! generation is not the current one, so a dying task can never end the
//! attempt that replaced it.
//!
//! The only way out of [`Supervisor::run`] is the shutdown token.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use aci_core::{FabricError, FailureOrigin};
use aci_settings::AciSettings;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn};

use crate::listener::{EventSink, listen};
use crate::session::{Credentials, RefreshTiming, Session};
use crate::subscription::Subscription;
use crate::transport::{EventStream, TransportFactory};

/// Lifecycle state of one session attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Building transports and logging in.
    LoggingIn,
    /// Logged in; token refresh running, stream not yet open.
    Authenticated,
    /// Event stream open; listener running, not yet subscribed.
    StreamOpen,
    /// Subscription registered.
    Subscribed,
    /// All three background loops running.
    Running,
    /// The attempt ended; teardown and cooldown follow.
    Failed,
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::LoggingIn => "logging_in",
            Self::Authenticated => "authenticated",
            Self::StreamOpen => "stream_open",
            Self::Subscribed => "subscribed",
            Self::Running => "running",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Published on the supervisor's status channel at every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    /// Attempt number, starting at 1. Zero before the first attempt.
    pub generation: u64,
    /// State of that attempt.
    pub state: AttemptState,
}

/// A failure reported by one step or loop of an attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    /// Attempt that produced it.
    pub generation: u64,
    /// Step or loop that produced it.
    pub origin: FailureOrigin,
    /// What went wrong.
    pub error: FabricError,
}

/// Reports failures for one attempt.
#[derive(Clone, Debug)]
pub struct FailureReporter {
    tx: mpsc::UnboundedSender<Failure>,
    generation: u64,
    cancel: CancellationToken,
}

impl FailureReporter {
    /// Send a failure unless the attempt is already cancelled. Returns
    /// whether the failure was sent.
    pub fn report(&self, origin: FailureOrigin, error: FabricError) -> bool {
        if self.cancel.is_cancelled() {
            debug!(
                generation = self.generation,
                %origin,
                error = %error,
                "attempt already cancelled, dropping failure"
            );
            return false;
        }
        self.tx
            .send(Failure {
                generation: self.generation,
                origin,
                error,
            })
            .is_ok()
    }
}

/// Runtime configuration of the supervisor.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Login credentials.
    pub credentials: Credentials,
    /// Class to subscribe to.
    pub class: String,
    /// Query parameters of the subscribe call, besides `subscription=yes`.
    pub query: BTreeMap<String, String>,
    /// Token refresh cadence.
    pub token_refresh: RefreshTiming,
    /// Subscription refresh cadence.
    pub subscription_refresh: RefreshTiming,
    /// Pause between a failed attempt and the next one.
    pub restart_cooldown: Duration,
    /// Fail token refreshes on a non-2xx status or an error payload.
    pub strict_token_refresh: bool,
}

impl SupervisorConfig {
    /// Convert loaded settings into runtime durations.
    pub fn from_settings(settings: &AciSettings) -> Self {
        let tick = settings.session.tick();
        Self {
            credentials: Credentials::new(
                settings.apic.username.clone(),
                settings.apic.password.clone(),
            ),
            class: settings.subscription.class.clone(),
            query: settings.subscription.query_params(),
            token_refresh: RefreshTiming::new(tick, settings.session.token_refresh_threshold()),
            subscription_refresh: RefreshTiming::new(
                tick,
                settings.session.subscription_refresh_threshold(),
            ),
            restart_cooldown: settings.session.restart_cooldown(),
            strict_token_refresh: settings.session.strict_token_refresh,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_settings(&AciSettings::default())
    }
}

/// Why an attempt stopped.
#[derive(Debug)]
enum Interrupt {
    Failed(Failure),
    Shutdown,
}

/// Restarts controller sessions forever.
pub struct Supervisor {
    config: SupervisorConfig,
    factory: Arc<dyn TransportFactory>,
    sink: Arc<dyn EventSink>,
    status: watch::Sender<SupervisorStatus>,
    failures_tx: mpsc::UnboundedSender<Failure>,
    failures_rx: mpsc::UnboundedReceiver<Failure>,
    generation: u64,
}

impl Supervisor {
    /// Supervisor building transports with `factory` and delivering events
    /// to `sink`.
    pub fn new(
        config: SupervisorConfig,
        factory: Arc<dyn TransportFactory>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (status, _) = watch::channel(SupervisorStatus {
            generation: 0,
            state: AttemptState::LoggingIn,
        });
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            config,
            factory,
            sink,
            status,
            failures_tx,
            failures_rx,
            generation: 0,
        }
    }

    /// Follow attempt transitions.
    pub fn status(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.subscribe()
    }

    fn reporter(&self, cancel: CancellationToken) -> FailureReporter {
        FailureReporter {
            tx: self.failures_tx.clone(),
            generation: self.generation,
            cancel,
        }
    }

    /// Run attempts until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(class = %self.config.class, "supervisor started");
        loop {
            let failure = match self.run_attempt(&shutdown).await {
                Interrupt::Shutdown => break,
                Interrupt::Failed(failure) => failure,
            };
            info!(
                generation = failure.generation,
                cooldown_secs = self.config.restart_cooldown.as_secs_f64(),
                "restarting session after cooldown"
            );
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = time::sleep(self.config.restart_cooldown) => {}
            }
        }
        info!(generation = self.generation, "supervisor stopped");
    }

    fn publish(&self, state: AttemptState) {
        debug!(generation = self.generation, %state, "attempt state");
        let _ = self.status.send_replace(SupervisorStatus {
            generation: self.generation,
            state,
        });
    }

    /// One attempt, including teardown.
    async fn run_attempt(&mut self, shutdown: &CancellationToken) -> Interrupt {
        self.generation += 1;
        let generation = self.generation;
        let cancel = shutdown.child_token();
        let mut tasks = JoinSet::new();

        self.publish(AttemptState::LoggingIn);
        info!(generation, "session attempt starting");

        let interrupt = match self.set_up(&cancel, &mut tasks, shutdown).await {
            Ok(()) => {
                self.publish(AttemptState::Running);
                info!(generation, "session running");
                self.wait_for_failure(shutdown).await
            }
            Err(interrupt) => interrupt,
        };

        if let Interrupt::Failed(failure) = &interrupt {
            error!(
                generation,
                origin = %failure.origin,
                kind = failure.error.kind(),
                error = %failure.error,
                "session attempt failed"
            );
            self.publish(AttemptState::Failed);
        }

        cancel.cancel();
        let stopped = drain(&mut tasks).await;
        debug!(generation, tasks = stopped, "attempt torn down");
        interrupt
    }

    /// Steps 1 to 4: everything up to `Running`.
    async fn set_up(
        &mut self,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<()>,
        shutdown: &CancellationToken,
    ) -> Result<(), Interrupt> {
        let generation = self.generation;
        let reporter = self.reporter(cancel.clone());

        let transports = self.factory.build().map_err(|error| {
            Interrupt::Failed(Failure {
                generation,
                origin: FailureOrigin::Login,
                error,
            })
        })?;

        let mut session = Session::new(
            Arc::clone(&transports.http),
            self.config.credentials.clone(),
            self.config.strict_token_refresh,
        );
        race(
            &mut self.failures_rx,
            generation,
            shutdown,
            FailureOrigin::Login,
            session.login(),
        )
        .await?;
        self.publish(AttemptState::Authenticated);

        let token = session.token().to_string();
        let _ = tasks.spawn(
            token_refresh_task(
                session,
                self.config.token_refresh,
                cancel.clone(),
                reporter.clone(),
            )
            .with_current_subscriber(),
        );

        let stream = race(
            &mut self.failures_rx,
            generation,
            shutdown,
            FailureOrigin::StreamOpen,
            transports.dialer.open(&token),
        )
        .await?;
        self.publish(AttemptState::StreamOpen);

        let _ = tasks.spawn(
            listener_task(
                stream,
                Arc::clone(&self.sink),
                cancel.clone(),
                reporter.clone(),
            )
            .with_current_subscriber(),
        );

        let mut subscription = Subscription::new(
            Arc::clone(&transports.http),
            self.config.class.clone(),
            self.config.query.clone(),
        );
        race(
            &mut self.failures_rx,
            generation,
            shutdown,
            FailureOrigin::Subscribe,
            subscription.subscribe(),
        )
        .await?;
        self.publish(AttemptState::Subscribed);

        let _ = tasks.spawn(
            subscription_refresh_task(
                subscription,
                self.config.subscription_refresh,
                cancel.clone(),
                reporter,
            )
            .with_current_subscriber(),
        );
        Ok(())
    }

    /// Step 5: block until the current attempt fails or shutdown fires.
    async fn wait_for_failure(&mut self, shutdown: &CancellationToken) -> Interrupt {
        let generation = self.generation;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Interrupt::Shutdown,
                Some(failure) = self.failures_rx.recv() => {
                    if failure.generation == generation {
                        return Interrupt::Failed(failure);
                    }
                    discard_stale(&failure, generation);
                }
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Run a setup step while watching for shutdown and for failures of the
/// attempt's background tasks.
async fn race<T, F>(
    failures: &mut mpsc::UnboundedReceiver<Failure>,
    generation: u64,
    shutdown: &CancellationToken,
    origin: FailureOrigin,
    step: F,
) -> Result<T, Interrupt>
where
    F: Future<Output = aci_core::Result<T>>,
{
    tokio::pin!(step);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return Err(Interrupt::Shutdown),
            result = &mut step => {
                return result.map_err(|error| {
                    Interrupt::Failed(Failure { generation, origin, error })
                });
            }
            Some(failure) = failures.recv() => {
                if failure.generation == generation {
                    return Err(Interrupt::Failed(failure));
                }
                discard_stale(&failure, generation);
            }
        }
    }
}

fn discard_stale(failure: &Failure, current: u64) {
    debug!(
        stale_generation = failure.generation,
        current_generation = current,
        origin = %failure.origin,
        "discarding stale failure"
    );
}

/// Await every task of a torn-down attempt. Returns how many finished.
async fn drain(tasks: &mut JoinSet<()>) -> usize {
    let mut stopped = 0;
    while let Some(result) = tasks.join_next().await {
        stopped += 1;
        if let Err(e) = result {
            warn!(error = %e, "session task panicked");
        }
    }
    stopped
}

async fn token_refresh_task(
    mut session: Session,
    timing: RefreshTiming,
    cancel: CancellationToken,
    reporter: FailureReporter,
) {
    if let Err(error) = session.refresh_loop(timing, cancel).await {
        let _ = reporter.report(FailureOrigin::TokenRefresh, error);
    }
}

async fn listener_task(
    stream: Box<dyn EventStream>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
    reporter: FailureReporter,
) {
    match listen(stream, sink, cancel).await {
        Ok(stats) => debug!(
            delivered = stats.delivered,
            malformed = stats.malformed,
            "listener finished"
        ),
        Err(error) => {
            let _ = reporter.report(FailureOrigin::Listener, error);
        }
    }
}

async fn subscription_refresh_task(
    mut subscription: Subscription,
    timing: RefreshTiming,
    cancel: CancellationToken,
    reporter: FailureReporter,
) {
    let result = subscription.refresh_loop(timing, cancel).await;
    subscription.clear();
    if let Err(error) = result {
        let _ = reporter.report(FailureOrigin::SubscriptionRefresh, error);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
