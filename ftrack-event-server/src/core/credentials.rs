/*!
Persistent storage of the ftrack login used by the event server
*/

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EventServerError;

const CREDENTIALS_DIR: &str = "openpype";
const CREDENTIALS_FILE: &str = "ftrack_event_server.json";

/// Stored ftrack login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub api_key: Option<String>,
}

/// JSON file holding the last successfully validated login
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Store inside the user's config directory, if the platform has one
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored credentials; a missing or empty file yields none
    pub async fn load(&self) -> Result<Credentials, EventServerError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No stored credentials at {:?}", self.path);
                return Ok(Credentials::default());
            }
            Err(source) => {
                return Err(EventServerError::CredentialsIo {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Credentials::default());
        }

        serde_json::from_str(&content).map_err(|source| EventServerError::CredentialsFormat {
            path: self.path.clone(),
            source,
        })
    }

    pub async fn save(&self, credentials: &Credentials) -> Result<(), EventServerError> {
        let io_error = |source: std::io::Error| EventServerError::CredentialsIo {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let json = serde_json::to_string_pretty(credentials).map_err(|source| {
            EventServerError::CredentialsFormat {
                path: self.path.clone(),
                source,
            }
        })?;
        tokio::fs::write(&self.path, json).await.map_err(io_error)?;

        // API keys are secrets, keep the file private to the user
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(io_error)?;
        }

        info!("Stored ftrack credentials to {:?}", self.path);
        Ok(())
    }
}
