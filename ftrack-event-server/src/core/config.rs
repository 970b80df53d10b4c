/*!
Configuration management for the event server.

Values are layered, lowest priority first: built-in defaults, an optional
TOML file, environment variables, stored credentials and finally the
command line.
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::credentials::Credentials;
use crate::error::EventServerError;

pub const SERVER_ENV: &str = "FTRACK_SERVER";
pub const USER_ENV: &str = "FTRACK_API_USER";
pub const API_KEY_ENV: &str = "FTRACK_API_KEY";
pub const EVENT_PATHS_ENV: &str = "FTRACK_EVENTS_PATH";
pub const STORE_URL_ENV: &str = "AVALON_MONGO";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// ftrack connection settings
    pub ftrack: FtrackConfig,
    /// Event store settings
    pub store: StoreConfig,
    /// Supervisor loop timing
    pub supervisor: SupervisorConfig,
    /// Worker subprocesses
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FtrackConfig {
    /// Site name, host or URL of the ftrack server
    pub server: Option<String>,
    pub user: Option<String>,
    pub api_key: Option<String>,
    /// Directories with event handlers, each entry may be a path list
    pub event_paths: Vec<String>,
    /// Timeout of server probes and the login check in milliseconds
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection string of the event store
    pub url: Option<String>,
    /// TCP connect timeout of the store probe in milliseconds
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Delay between two reconciliation passes in milliseconds
    pub poll_interval_ms: u64,
    /// How long a worker gets to exit after being asked to stop
    pub stop_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Program running the entry points; `None` executes them directly
    pub interpreter: Option<String>,
    /// Base directory for relative entry points, defaults to the
    /// directory of the running executable
    pub directory: Option<PathBuf>,
    pub storer: WorkerConfig,
    pub processor: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkerConfig {
    pub name: String,
    pub port: u16,
    pub entry_point: PathBuf,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server: Option<String>,
    pub user: Option<String>,
    pub api_key: Option<String>,
    pub event_paths: Vec<String>,
}

impl Default for FtrackConfig {
    fn default() -> Self {
        Self {
            server: None,
            user: None,
            api_key: None,
            event_paths: vec![],
            timeout_ms: 5000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_ms: 1000,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            stop_timeout_ms: 5000,
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            interpreter: Some("python".to_string()),
            directory: None,
            storer: WorkerConfig {
                name: "StorerThread".to_string(),
                port: 10001,
                entry_point: PathBuf::from("sub_event_storer.py"),
            },
            processor: WorkerConfig {
                name: "ProcessorThread".to_string(),
                port: 10011,
                entry_point: PathBuf::from("sub_event_processor.py"),
            },
        }
    }
}

impl ServerConfig {
    /// Load a TOML config file; missing sections fall back to defaults
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EventServerError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| EventServerError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        toml::from_str(&content).map_err(|source| EventServerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment variables; empty values count as unset
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(server) = get(SERVER_ENV) {
            self.ftrack.server = Some(server);
        }
        if let Some(user) = get(USER_ENV) {
            self.ftrack.user = Some(user);
        }
        if let Some(api_key) = get(API_KEY_ENV) {
            self.ftrack.api_key = Some(api_key);
        }
        if let Some(paths) = get(EVENT_PATHS_ENV) {
            self.ftrack.event_paths = vec![paths];
        }
        if let Some(url) = get(STORE_URL_ENV) {
            self.store.url = Some(url);
        }
    }

    /// Overlay stored credentials; only values actually stored are used
    pub fn apply_credentials(&mut self, credentials: &Credentials) {
        if let Some(user) = credentials.username.clone().filter(|v| !v.is_empty()) {
            self.ftrack.user = Some(user);
        }
        if let Some(api_key) = credentials.api_key.clone().filter(|v| !v.is_empty()) {
            self.ftrack.api_key = Some(api_key);
        }
    }

    pub fn apply_overrides(&mut self, overrides: CliOverrides) {
        if overrides.server.is_some() {
            self.ftrack.server = overrides.server;
        }
        if overrides.user.is_some() {
            self.ftrack.user = overrides.user;
        }
        if overrides.api_key.is_some() {
            self.ftrack.api_key = overrides.api_key;
        }
        if !overrides.event_paths.is_empty() {
            self.ftrack.event_paths = overrides.event_paths;
        }
    }
}

impl FtrackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl WorkersConfig {
    /// Absolute location of a worker's entry point
    pub fn entry_point(&self, worker: &WorkerConfig) -> PathBuf {
        if worker.entry_point.is_absolute() {
            return worker.entry_point.clone();
        }
        let base = self.directory.clone().unwrap_or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join(&worker.entry_point)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_worker_layout() {
        let config = ServerConfig::default();
        assert_eq!(config.workers.storer.port, 10001);
        assert_eq!(config.workers.processor.port, 10011);
        assert_eq!(config.workers.storer.name, "StorerThread");
        assert_eq!(config.supervisor.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.store.connect_timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event_server.toml");
        tokio::fs::write(
            &path,
            r#"
[ftrack]
server = "studio"
event_paths = ["/srv/events"]

[supervisor]
poll_interval_ms = 250

[workers.storer]
name = "Storer"
port = 12001
entry_point = "/opt/events/storer.py"
"#,
        )
        .await
        .unwrap();

        let config = ServerConfig::from_file(&path).await.unwrap();
        assert_eq!(config.ftrack.server.as_deref(), Some("studio"));
        assert_eq!(config.ftrack.event_paths, vec!["/srv/events".to_string()]);
        assert_eq!(config.ftrack.timeout_ms, 5000);
        assert_eq!(config.supervisor.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.supervisor.stop_timeout_ms, 5000);
        assert_eq!(config.workers.storer.port, 12001);
        assert_eq!(config.workers.processor.port, 10011);
        assert_eq!(config.workers.interpreter.as_deref(), Some("python"));
    }

    #[tokio::test]
    async fn unreadable_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            ServerConfig::from_file(&missing).await,
            Err(EventServerError::ConfigRead { .. })
        ));

        let broken = dir.path().join("broken.toml");
        tokio::fs::write(&broken, "[ftrack\nserver = 1").await.unwrap();
        assert!(matches!(
            ServerConfig::from_file(&broken).await,
            Err(EventServerError::ConfigParse { .. })
        ));
    }

    #[test]
    fn layering_precedence() {
        let mut config = ServerConfig::default();
        config.ftrack.server = Some("from-file".to_string());
        config.ftrack.user = Some("file.user".to_string());

        config.apply_env(env(&[
            (SERVER_ENV, "from-env"),
            (USER_ENV, "env.user"),
            (API_KEY_ENV, "env-key"),
            (EVENT_PATHS_ENV, "/a:/b"),
            (STORE_URL_ENV, "mongodb://localhost:27017"),
        ]));
        assert_eq!(config.ftrack.server.as_deref(), Some("from-env"));
        assert_eq!(config.ftrack.event_paths, vec!["/a:/b".to_string()]);
        assert_eq!(config.store.url.as_deref(), Some("mongodb://localhost:27017"));

        config.apply_credentials(&Credentials {
            username: Some("stored.user".to_string()),
            api_key: None,
        });
        assert_eq!(config.ftrack.user.as_deref(), Some("stored.user"));
        assert_eq!(config.ftrack.api_key.as_deref(), Some("env-key"));

        config.apply_overrides(CliOverrides {
            server: None,
            user: Some("cli.user".to_string()),
            api_key: None,
            event_paths: vec!["/c".to_string()],
        });
        assert_eq!(config.ftrack.server.as_deref(), Some("from-env"));
        assert_eq!(config.ftrack.user.as_deref(), Some("cli.user"));
        assert_eq!(config.ftrack.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.ftrack.event_paths, vec!["/c".to_string()]);
    }

    #[test]
    fn blank_environment_values_are_ignored() {
        let mut config = ServerConfig::default();
        config.ftrack.server = Some("studio".to_string());
        config.apply_env(env(&[(SERVER_ENV, "  "), (API_KEY_ENV, "")]));
        assert_eq!(config.ftrack.server.as_deref(), Some("studio"));
        assert!(config.ftrack.api_key.is_none());
    }

    #[test]
    fn relative_entry_points_use_directory() {
        let mut workers = WorkersConfig::default();
        workers.directory = Some(PathBuf::from("/opt/pype/ftrack_server"));
        assert_eq!(
            workers.entry_point(&workers.storer),
            PathBuf::from("/opt/pype/ftrack_server/sub_event_storer.py")
        );

        workers.processor.entry_point = PathBuf::from("/elsewhere/processor.py");
        assert_eq!(
            workers.entry_point(&workers.processor),
            PathBuf::from("/elsewhere/processor.py")
        );
    }
}
