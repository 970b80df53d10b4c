/*!
ftrack Event Server

Keeps the event storer and processor workers running while ftrack and the
event store are reachable
*/

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::core::{
    bootstrap,
    config::{CliOverrides, ServerConfig},
    credentials::CredentialStore,
};

mod core;
mod error;

fn cli() -> Command {
    Command::new("ftrack Event Server")
        .version(clap::crate_version!())
        .about("Supervises the ftrack event storer and processor workers")
        .arg(
            Arg::new("ftrack-url")
                .long("ftrack-url")
                .help("URL or workspace name of the ftrack server")
                .value_name("URL"),
        )
        .arg(
            Arg::new("ftrack-user")
                .long("ftrack-user")
                .help("ftrack API user the workers log in as")
                .value_name("USER"),
        )
        .arg(
            Arg::new("ftrack-api-key")
                .long("ftrack-api-key")
                .help("API key of the ftrack user")
                .value_name("KEY"),
        )
        .arg(
            Arg::new("ftrack-event-paths")
                .long("ftrack-event-paths")
                .help("Directories with event handlers, separated by the OS path separator")
                .value_name("PATHS")
                .num_args(1..),
        )
        .arg(
            Arg::new("store-credentials")
                .long("store-credentials")
                .help("Save the validated user and API key for later runs")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-load-credentials")
                .long("no-load-credentials")
                .help("Ignore previously stored credentials")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("TOML configuration file")
                .value_name("PATH"),
        )
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!("Unable to listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();

    let mut config = match matches.get_one::<String>("config").map(PathBuf::from) {
        Some(path) => ServerConfig::from_file(&path).await?,
        None => ServerConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());

    let credential_store = CredentialStore::default_location();
    if !matches.get_flag("no-load-credentials") {
        if let Some(store) = &credential_store {
            match store.load().await {
                Ok(credentials) => config.apply_credentials(&credentials),
                Err(e) => warn!("Stored credentials ignored: {}", e),
            }
        }
    }

    config.apply_overrides(CliOverrides {
        server: matches.get_one::<String>("ftrack-url").cloned(),
        user: matches.get_one::<String>("ftrack-user").cloned(),
        api_key: matches.get_one::<String>("ftrack-api-key").cloned(),
        event_paths: matches
            .get_many::<String>("ftrack-event-paths")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
    });

    let mut supervisor = match bootstrap::prepare(
        &config,
        credential_store.as_ref(),
        matches.get_flag("store-credentials"),
    )
    .await
    {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("Event server can't start: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let signals = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("🛑 Interrupted"),
            _ = terminate_signal() => info!("🛑 Terminated"),
        }
        signals.cancel();
    });

    supervisor.run(shutdown).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn event_paths_take_several_values() {
        let matches = cli()
            .try_get_matches_from([
                "ftrack_event_server",
                "--ftrack-url",
                "studio",
                "--ftrack-event-paths",
                "/opt/events",
                "/srv/events",
                "--store-credentials",
            ])
            .unwrap();
        let paths: Vec<_> = matches
            .get_many::<String>("ftrack-event-paths")
            .unwrap()
            .cloned()
            .collect();
        assert_eq!(paths, ["/opt/events", "/srv/events"]);
        assert!(matches.get_flag("store-credentials"));
        assert!(!matches.get_flag("no-load-credentials"));
    }
}
