/*!
Supervisor loop keeping the event workers alive while ftrack and the event
store are reachable.

Every pass re-probes the dependencies that are not known to be reachable,
tears both workers down while any dependency is missing and otherwise
starts absent workers. A worker found dead is cleared and both
dependencies are re-validated before it is started again.
*/

use std::time::Duration;

use tokio::time::sleep;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::probes::{Dependency, Probe};
use crate::core::workers::{WorkerHandle, WorkerLauncher, WorkerRole, WorkerSpec};

/// Loop timing
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    /// Delay after every pass
    pub poll_interval: Duration,
    /// Time a worker gets to exit when stopped
    pub stop_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Last known reachability of the dependencies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Connectivity {
    pub server: bool,
    pub store: bool,
}

impl Connectivity {
    pub fn all_reachable(&self) -> bool {
        self.server && self.store
    }

    pub fn get(&self, dependency: Dependency) -> bool {
        match dependency {
            Dependency::Server => self.server,
            Dependency::Store => self.store,
        }
    }

    fn set(&mut self, dependency: Dependency, reachable: bool) {
        match dependency {
            Dependency::Server => self.server = reachable,
            Dependency::Store => self.store = reachable,
        }
    }
}

/// Which dependency failures were already logged in the current streak
#[derive(Debug, Default)]
struct FailureLog {
    server: bool,
    store: bool,
}

impl FailureLog {
    fn flag(&mut self, dependency: Dependency) -> &mut bool {
        match dependency {
            Dependency::Server => &mut self.server,
            Dependency::Store => &mut self.store,
        }
    }

    /// Returns true the first time a failure is seen in a streak
    fn record_failure(&mut self, dependency: Dependency) -> bool {
        let flag = self.flag(dependency);
        !std::mem::replace(flag, true)
    }

    fn record_success(&mut self, dependency: Dependency) {
        *self.flag(dependency) = false;
    }
}

/// Corrective action taken for a worker during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerAction {
    Started(WorkerRole),
    /// The worker was found dead and cleared
    Exited(WorkerRole),
    /// The worker was stopped because a dependency is unreachable
    Stopped(WorkerRole),
    LaunchFailed(WorkerRole),
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Connectivity at the end of the pass
    pub connectivity: Connectivity,
    /// Dependencies whose failure was logged during this pass
    pub reported_failures: Vec<Dependency>,
    pub actions: Vec<WorkerAction>,
}

struct WorkerSlot {
    spec: WorkerSpec,
    handle: Option<WorkerHandle>,
}

/// Owns the connectivity state and the worker handles
pub struct Supervisor {
    server_probe: Box<dyn Probe>,
    store_probe: Box<dyn Probe>,
    launcher: Box<dyn WorkerLauncher>,
    /// Storer first, processor second
    slots: [WorkerSlot; 2],
    connectivity: Connectivity,
    failures: FailureLog,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(
        server_probe: Box<dyn Probe>,
        store_probe: Box<dyn Probe>,
        launcher: Box<dyn WorkerLauncher>,
        storer: WorkerSpec,
        processor: WorkerSpec,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            server_probe,
            store_probe,
            launcher,
            slots: [
                WorkerSlot {
                    spec: storer,
                    handle: None,
                },
                WorkerSlot {
                    spec: processor,
                    handle: None,
                },
            ],
            connectivity: Connectivity::default(),
            failures: FailureLog::default(),
            settings,
        }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Whether a handle for `role` is currently held
    pub fn is_running(&self, role: WorkerRole) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.spec.role == role && slot.handle.is_some())
    }

    pub fn running_workers(&self) -> usize {
        self.slots.iter().filter(|slot| slot.handle.is_some()).count()
    }

    /// Run until `shutdown` is cancelled, then stop the workers
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            "🚀 Supervising {} and {} (ftrack {}, event store {})",
            self.slots[0].spec.name,
            self.slots[1].spec.name,
            self.server_probe.target(),
            self.store_probe.target()
        );

        {
            let iterations = self.iterations();
            tokio::pin!(iterations);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    report = iterations.next() => match report {
                        Some(report) => debug!(?report, "Supervisor pass finished"),
                        None => break,
                    },
                }
            }
        }

        info!("Stopping workers");
        self.stop_workers(&mut Vec::new()).await;
        info!("🏁 Event server stopped");
    }

    /// Endless stream of passes separated by the poll interval
    pub fn iterations(&mut self) -> impl Stream<Item = IterationReport> + '_ {
        let interval = self.settings.poll_interval;
        async_stream::stream! {
            loop {
                let report = self.tick().await;
                yield report;
                sleep(interval).await;
            }
        }
    }

    /// Run a single reconciliation pass
    pub async fn tick(&mut self) -> IterationReport {
        let mut report = IterationReport::default();

        for dependency in [Dependency::Server, Dependency::Store] {
            if !self.connectivity.get(dependency) {
                let reachable = self.probe(dependency, &mut report).await;
                self.connectivity.set(dependency, reachable);
            }
        }

        if !self.connectivity.all_reachable() {
            self.stop_workers(&mut report.actions).await;
        } else {
            self.failures = FailureLog::default();
            for index in 0..self.slots.len() {
                self.reconcile(index, &mut report.actions).await;
            }
        }

        report.connectivity = self.connectivity;
        report
    }

    async fn probe(&mut self, dependency: Dependency, report: &mut IterationReport) -> bool {
        let probe = match dependency {
            Dependency::Server => &self.server_probe,
            Dependency::Store => &self.store_probe,
        };
        let result = probe.check().await;

        match result {
            Ok(()) => {
                debug!("{} {} is accessible", dependency, probe.target());
                self.failures.record_success(dependency);
                true
            }
            Err(e) => {
                if self.failures.record_failure(dependency) {
                    warn!("Can't access {} {}: {}", dependency, probe.target(), e);
                    report.reported_failures.push(dependency);
                }
                false
            }
        }
    }

    async fn reconcile(&mut self, index: usize, actions: &mut Vec<WorkerAction>) {
        let grace = self.settings.stop_timeout;
        let slot = &mut self.slots[index];
        let role = slot.spec.role;

        match slot.handle.as_mut().map(WorkerHandle::is_alive) {
            None => match WorkerHandle::start(self.launcher.as_ref(), &slot.spec) {
                Ok(handle) => {
                    slot.handle = Some(handle);
                    actions.push(WorkerAction::Started(role));
                }
                Err(e) => {
                    error!("{}", e);
                    actions.push(WorkerAction::LaunchFailed(role));
                    self.connectivity = Connectivity::default();
                }
            },
            Some(true) => {}
            Some(false) => {
                if let Some(handle) = slot.handle.take() {
                    info!(
                        "Worker {} exited after {}s, re-checking ftrack and event store",
                        handle.name,
                        handle.uptime().num_seconds()
                    );
                    if let Err(e) = handle.stop(grace).await {
                        warn!("{}", e);
                    }
                }
                actions.push(WorkerAction::Exited(role));
                self.connectivity = Connectivity::default();
            }
        }
    }

    async fn stop_workers(&mut self, actions: &mut Vec<WorkerAction>) {
        let grace = self.settings.stop_timeout;
        for slot in &mut self.slots {
            let Some(handle) = slot.handle.take() else {
                continue;
            };
            info!("Stopping {} worker {}", handle.role, handle.name);
            if let Err(e) = handle.stop(grace).await {
                warn!("{}", e);
            }
            actions.push(WorkerAction::Stopped(slot.spec.role));
        }
    }
}
