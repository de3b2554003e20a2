use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Healthcheck;
use crate::dispatcher::ResultPublisher;
use crate::error::EngineError;

/// How a check gets scheduled, decided once when it is spawned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Execute every `interval`, first execution immediately
    Recurring(Duration),
    /// Execute once immediately, then retire
    OneOff,
}

impl Lifecycle {
    pub fn of<C: Healthcheck + ?Sized>(check: &C) -> Self {
        let base = check.base();
        if base.one_off { Lifecycle::OneOff } else { Lifecycle::Recurring(base.interval) }
    }
}

/// A validated and initialized check, ready to be spawned
pub struct Prepared<C> {
    check: C,
}

impl<C: Healthcheck + 'static> Prepared<C> {
    pub fn check(&self) -> &C {
        &self.check
    }

    /// Start supervising the check on the current runtime
    pub fn spawn(self, publisher: ResultPublisher, grace: Duration) -> Supervisor {
        let check = Arc::new(self.check);
        let name = check.identify().to_string();
        let lifecycle = Lifecycle::of(check.as_ref());
        let token = CancellationToken::new();

        info!(name = %name, ?lifecycle, "Starting healthcheck");
        let handle = tokio::spawn(supervise(check, lifecycle, publisher, token.clone(), grace));

        Supervisor { name, token, handle }
    }
}

/// Owns the background task running one check.
///
/// Dropping a supervisor without retiring it leaves the task running;
/// callers are expected to `retire` it.
#[derive(Debug)]
pub struct Supervisor {
    name: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Supervisor {
    /// Validate then initialize a check. Either failure is reported and the
    /// check is never scheduled.
    pub fn prepare<C: Healthcheck + 'static>(mut check: C) -> Result<Prepared<C>, EngineError> {
        check.validate()?;
        check.initialize()?;
        Ok(Prepared { check })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the task is gone: retired, or a one-off that already ran
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop scheduling new executions. Does not wait.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the supervising task to return
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(name = %self.name, error = %e, "healthcheck task ended abnormally");
        }
    }

    /// Cancel then join
    pub async fn retire(self) {
        self.cancel();
        self.join().await;
    }
}

async fn supervise<C: Healthcheck + 'static>(
    check: Arc<C>,
    lifecycle: Lifecycle,
    publisher: ResultPublisher,
    token: CancellationToken,
    grace: Duration,
) {
    let spawn_execution =
        || tokio::spawn(execute_and_publish(check.clone(), publisher.clone(), token.clone()));

    let in_flight = match lifecycle {
        Lifecycle::OneOff => {
            let mut execution = spawn_execution();
            tokio::select! {
                _ = &mut execution => None,
                _ = token.cancelled() => Some(execution),
            }
        }
        Lifecycle::Recurring(every) => {
            let mut in_flight: Option<JoinHandle<()>> = None;
            let mut timer = interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {
                        if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                            warn!(name = %check.identify(), "Previous execution still running, skipping this tick");
                            continue;
                        }
                        in_flight = Some(spawn_execution());
                    }
                }
            }
            in_flight
        }
    };

    if let Some(mut execution) = in_flight {
        if timeout(grace, &mut execution).await.is_err() {
            warn!(name = %check.identify(), ?grace, "Abandoning in-flight execution");
            execution.abort();
        }
    }
    info!(name = %check.identify(), "Healthcheck retired");
}

async fn execute_and_publish<C: Healthcheck>(
    check: Arc<C>,
    publisher: ResultPublisher,
    token: CancellationToken,
) {
    let deadline = Instant::now() + check.timeout();
    let result = check.execute(deadline).await;

    if token.is_cancelled() {
        debug!(name = %result.name, "Healthcheck retired during execution, discarding result");
        return;
    }
    if !result.success {
        debug!(name = %result.name, message = %result.message, "Healthcheck failed");
    }
    publisher.publish(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SetupError};
    use crate::healthcheck::{Base, CheckResult, ProbeConfig, TcpConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// A check that sleeps through its execution and records concurrency
    struct SlowCheck {
        base: Base,
        sleep: Duration,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
        executions: Arc<AtomicUsize>,
        valid: bool,
    }

    impl SlowCheck {
        fn new(interval: Duration, sleep: Duration, one_off: bool) -> Self {
            Self {
                base: Base { name: "slow".into(), interval, one_off, ..Base::default() },
                sleep,
                running: Arc::default(),
                max_running: Arc::default(),
                executions: Arc::default(),
                valid: true,
            }
        }
    }

    #[async_trait]
    impl Healthcheck for SlowCheck {
        fn validate(&self) -> Result<(), ConfigError> {
            if self.valid { Ok(()) } else { Err(ConfigError::Missing("healthcheck name")) }
        }

        fn initialize(&mut self) -> Result<(), SetupError> {
            Ok(())
        }

        async fn execute(&self, _deadline: Instant) -> CheckResult {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            self.executions.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.sleep).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            CheckResult::success(&self.base.name, "slept")
        }

        fn summary(&self) -> String {
            "sleeps".into()
        }

        fn base(&self) -> &Base {
            &self.base
        }

        fn timeout(&self) -> Duration {
            self.sleep
        }

        fn config(&self) -> ProbeConfig {
            ProbeConfig::Tcp(TcpConfig { base: self.base.clone(), ..TcpConfig::default() })
        }

        fn set_source(&mut self, source: &str) {
            self.base.source = source.to_string();
        }
    }

    #[test]
    fn test_lifecycle_of() {
        let recurring = SlowCheck::new(Duration::from_secs(3), Duration::ZERO, false);
        assert_eq!(Lifecycle::of(&recurring), Lifecycle::Recurring(Duration::from_secs(3)));

        let one_off = SlowCheck::new(Duration::ZERO, Duration::ZERO, true);
        assert_eq!(Lifecycle::of(&one_off), Lifecycle::OneOff);
    }

    #[test]
    fn test_prepare_rejects_invalid_check() {
        let mut check = SlowCheck::new(Duration::from_secs(3), Duration::ZERO, false);
        check.valid = false;
        assert!(matches!(Supervisor::prepare(check), Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_single_flight() {
        let (tx, mut rx) = mpsc::channel(100);
        let check = SlowCheck::new(Duration::from_millis(50), Duration::from_millis(300), false);
        let max_running = check.max_running.clone();
        let executions = check.executions.clone();

        let supervisor = Supervisor::prepare(check)
            .unwrap()
            .spawn(ResultPublisher::new(tx), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        supervisor.retire().await;

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        assert!(executions.load(Ordering::SeqCst) >= 2);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_one_off_runs_once_and_retires() {
        let (tx, mut rx) = mpsc::channel(10);
        let check = SlowCheck::new(Duration::ZERO, Duration::from_millis(10), true);
        let executions = check.executions.clone();

        let supervisor = Supervisor::prepare(check)
            .unwrap()
            .spawn(ResultPublisher::new(tx), Duration::from_secs(1));

        let result = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timeout waiting for result")
            .expect("Channel closed");
        assert_eq!(result.name, "slow");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(supervisor.is_finished());
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        supervisor.join().await;
    }

    #[tokio::test]
    async fn test_retire_discards_late_result() {
        let (tx, mut rx) = mpsc::channel(10);
        let check = SlowCheck::new(Duration::from_secs(60), Duration::from_millis(200), false);

        let supervisor = Supervisor::prepare(check)
            .unwrap()
            .spawn(ResultPublisher::new(tx), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(50)).await;
        supervisor.retire().await;

        // The execution finished inside the grace period but after retirement
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retire_abandons_execution_after_grace() {
        let (tx, _rx) = mpsc::channel(10);
        let check = SlowCheck::new(Duration::from_secs(60), Duration::from_secs(30), false);

        let supervisor = Supervisor::prepare(check)
            .unwrap()
            .spawn(ResultPublisher::new(tx), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = std::time::Instant::now();
        supervisor.retire().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
