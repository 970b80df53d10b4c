/*!
Worker subprocesses supervised by the event server.

A worker is an opaque program listening on a fixed local port. The
supervisor only starts it, asks whether it is still alive and stops it.
*/

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::EventServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    /// Writes incoming ftrack events to the event store
    Storer,
    /// Runs event handlers on stored events
    Processor,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRole::Storer => f.write_str("storer"),
            WorkerRole::Processor => f.write_str("processor"),
        }
    }
}

/// How to launch the worker of one role
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub role: WorkerRole,
    pub name: String,
    pub port: u16,
    pub entry_point: PathBuf,
    pub interpreter: Option<String>,
    /// Extra environment handed to the subprocess
    pub env: Vec<(String, OsString)>,
}

impl WorkerSpec {
    fn command(&self) -> Command {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&self.entry_point);
                command
            }
            None => Command::new(&self.entry_point),
        };
        command
            .arg(self.port.to_string())
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

/// A started worker as seen by the supervisor
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id while the process runs
    fn id(&self) -> Option<u32>;

    /// Non-blocking liveness check; reaps the process once it has exited
    fn is_alive(&mut self) -> bool;

    /// Ask the process to exit, force it after `grace`
    async fn stop(&mut self, grace: Duration) -> Result<(), EventServerError>;
}

/// Starts worker processes from their specs
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, spec: &WorkerSpec) -> Result<Box<dyn WorkerProcess>, EventServerError>;
}

/// Launches workers as OS subprocesses
#[derive(Debug, Default, Clone, Copy)]
pub struct SubprocessLauncher;

impl WorkerLauncher for SubprocessLauncher {
    fn launch(&self, spec: &WorkerSpec) -> Result<Box<dyn WorkerProcess>, EventServerError> {
        let child = spec
            .command()
            .spawn()
            .map_err(|source| EventServerError::WorkerSpawn {
                name: spec.name.clone(),
                source,
            })?;
        debug!(
            "Spawned {} ({:?}) on port {} with pid {:?}",
            spec.name,
            spec.entry_point,
            spec.port,
            child.id()
        );
        Ok(Box::new(Subprocess {
            name: spec.name.clone(),
            child,
        }))
    }
}

pub struct Subprocess {
    name: String,
    child: Child,
}

impl Subprocess {
    #[cfg(unix)]
    fn terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: plain syscall on a pid we spawned and have not reaped yet
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc == 0 {
                return;
            }
        }
        let _ = self.child.start_kill();
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[async_trait]
impl WorkerProcess for Subprocess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Worker {} exited with {}", self.name, status);
                false
            }
            Err(e) => {
                warn!("Unable to query worker {}: {}", self.name, e);
                false
            }
        }
    }

    async fn stop(&mut self, grace: Duration) -> Result<(), EventServerError> {
        if !self.is_alive() {
            return Ok(());
        }

        self.terminate();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Worker {} stopped with {}", self.name, status);
                Ok(())
            }
            Ok(Err(source)) => Err(EventServerError::WorkerStop {
                name: self.name.clone(),
                source,
            }),
            Err(_) => {
                warn!(
                    "Worker {} did not stop within {:?}, killing it",
                    self.name, grace
                );
                self.child
                    .kill()
                    .await
                    .map_err(|source| EventServerError::WorkerStop {
                        name: self.name.clone(),
                        source,
                    })
            }
        }
    }
}

/// Supervisor-side record of a running worker
pub struct WorkerHandle {
    pub role: WorkerRole,
    pub name: String,
    pub port: u16,
    pub entry_point: PathBuf,
    pub started_at: DateTime<Utc>,
    process: Box<dyn WorkerProcess>,
}

impl WorkerHandle {
    /// Launch the worker described by `spec`
    pub fn start(launcher: &dyn WorkerLauncher, spec: &WorkerSpec) -> Result<Self, EventServerError> {
        let process = launcher.launch(spec)?;
        info!(
            "Started {} worker {} on port {} (pid {:?})",
            spec.role,
            spec.name,
            spec.port,
            process.id()
        );
        Ok(Self {
            role: spec.role,
            name: spec.name.clone(),
            port: spec.port,
            entry_point: spec.entry_point.clone(),
            started_at: Utc::now(),
            process,
        })
    }

    pub fn is_alive(&mut self) -> bool {
        self.process.is_alive()
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// Stop the process and consume the handle
    pub async fn stop(mut self, grace: Duration) -> Result<(), EventServerError> {
        self.process.stop(grace).await
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("role", &self.role)
            .field("name", &self.name)
            .field("port", &self.port)
            .field("entry_point", &self.entry_point)
            .field("started_at", &self.started_at)
            .field("pid", &self.process.id())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spec(program: &str, port: u16) -> WorkerSpec {
        WorkerSpec {
            role: WorkerRole::Storer,
            name: "StorerThread".to_string(),
            port,
            entry_point: PathBuf::from(program),
            interpreter: None,
            env: vec![("FTRACK_SERVER".to_string(), "https://studio.ftrackapp.com".into())],
        }
    }

    #[tokio::test]
    async fn running_worker_stops_within_grace() {
        // `sleep 10001` stands in for a long running worker
        let mut handle = WorkerHandle::start(&SubprocessLauncher, &spec("sleep", 10001)).unwrap();
        assert!(handle.is_alive());
        assert!(handle.uptime() >= chrono::Duration::zero());

        let started = std::time::Instant::now();
        handle.stop(Duration::from_secs(5)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn exited_worker_is_not_alive() {
        let mut handle = WorkerHandle::start(&SubprocessLauncher, &spec("true", 10011)).unwrap();
        let mut alive = true;
        for _ in 0..100 {
            alive = handle.is_alive();
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!alive);
        handle.stop(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn missing_program_fails_to_launch() {
        let result = WorkerHandle::start(
            &SubprocessLauncher,
            &spec("/nonexistent/sub_event_storer.py", 10001),
        );
        assert!(matches!(result, Err(EventServerError::WorkerSpawn { .. })));
    }

    #[test]
    fn interpreter_comes_first() {
        let mut worker = spec("/opt/events/sub_event_storer.py", 10001);
        worker.interpreter = Some("python3".to_string());
        let command = worker.command();
        let std = command.as_std();
        assert_eq!(std.get_program(), "python3");
        let args: Vec<_> = std.get_args().collect();
        assert_eq!(args, ["/opt/events/sub_event_storer.py", "10001"]);
    }
}
