/*!
Errors produced while parsing endpoint configuration
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("ftrack server URL is not set")]
    EmptyServerUrl,
    #[error("invalid ftrack server URL {url:?}: {source}")]
    InvalidServerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("ftrack server URL {url:?} has no host")]
    MissingServerHost { url: String },
    #[error("event store connection string is not set")]
    EmptyStoreUrl,
    // The connection string carries credentials, so it is never echoed back
    #[error("invalid event store connection string: {0}")]
    InvalidStoreUrl(#[source] url::ParseError),
    #[error("event store connection string has no host")]
    MissingStoreHost,
    #[error("event paths cannot be joined: {0}")]
    JoinPaths(#[from] std::env::JoinPathsError),
}
