/*!
Error type shared by the event server modules
*/

use std::io;
use std::path::PathBuf;

use ftrack_endpoints::EndpointError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventServerError {
    #[error("failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("credential file {path:?} is not accessible: {source}")]
    CredentialsIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("credential file {path:?} is malformed: {source}")]
    CredentialsFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("ftrack server {0} is not accessible")]
    ServerUnreachable(String),
    #[error("ftrack username is not set")]
    MissingUsername,
    #[error("ftrack API key is not set")]
    MissingApiKey,
    #[error("ftrack rejected the credentials of {user:?}: {reason}")]
    LoginRejected { user: String, reason: String },
    #[error("ftrack request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("event paths are not set")]
    NoEventPaths,
    #[error("none of the event paths exist: {0:?}")]
    EventPathsNotFound(Vec<PathBuf>),
    #[error("event store connection string is not set")]
    MissingStoreUrl,
    #[error("entry point of worker {name} does not exist: {path:?}")]
    MissingEntryPoint { name: String, path: PathBuf },
    #[error("failed to start worker {name}: {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to stop worker {name}: {source}")]
    WorkerStop {
        name: String,
        #[source]
        source: io::Error,
    },
}
