/*!
Normalization of the configured ftrack server identifier.

Studios usually configure just their site name (`studio`), sometimes the
full host (`studio.ftrackapp.com`) and occasionally a complete URL for a
self-hosted server. All three end up as an absolute `https` URL without a
trailing slash.
*/

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::EndpointError;

/// Domain appended to bare site names
pub const FTRACK_DOMAIN: &str = "ftrackapp.com";

/// A normalized ftrack server URL, e.g. `https://studio.ftrackapp.com`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrl {
    normalized: String,
    parsed: Url,
}

impl ServerUrl {
    /// Normalize a site name, host or URL into a server URL
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let trimmed = input.trim_matches(|c| c == '/' || c == ' ');
        if trimmed.is_empty() {
            return Err(EndpointError::EmptyServerUrl);
        }

        let normalized = if trimmed.contains("://") {
            trimmed.to_string()
        } else if trimmed.ends_with(FTRACK_DOMAIN) {
            format!("https://{trimmed}")
        } else {
            format!("https://{trimmed}.{FTRACK_DOMAIN}")
        };

        let parsed = Url::parse(&normalized).map_err(|source| EndpointError::InvalidServerUrl {
            url: normalized.clone(),
            source,
        })?;

        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(EndpointError::MissingServerHost { url: normalized });
        }

        Ok(Self { normalized, parsed })
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn host(&self) -> &str {
        self.parsed.host_str().unwrap_or_default()
    }

    /// Endpoint of the ftrack JSON API
    pub fn api_url(&self) -> String {
        format!("{}/api", self.normalized)
    }
}

impl fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl FromStr for ServerUrl {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_site_name_gets_domain_and_scheme() {
        let url = ServerUrl::parse("studio").unwrap();
        assert_eq!(url.as_str(), "https://studio.ftrackapp.com");
        assert_eq!(url.host(), "studio.ftrackapp.com");
    }

    #[test]
    fn full_host_only_gets_scheme() {
        let url = ServerUrl::parse("studio.ftrackapp.com/").unwrap();
        assert_eq!(url.as_str(), "https://studio.ftrackapp.com");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let url = ServerUrl::parse("https://studio.example.com").unwrap();
        assert_eq!(url.as_str(), "https://studio.example.com");

        let url = ServerUrl::parse(" http://ftrack.local:8080/ ").unwrap();
        assert_eq!(url.as_str(), "http://ftrack.local:8080");
        assert_eq!(url.api_url(), "http://ftrack.local:8080/api");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(ServerUrl::parse(" / "), Err(EndpointError::EmptyServerUrl)));
        assert!(matches!(ServerUrl::parse(""), Err(EndpointError::EmptyServerUrl)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ServerUrl::parse("https://").is_err());
        assert!(ServerUrl::parse("studio name").is_err());
    }
}
