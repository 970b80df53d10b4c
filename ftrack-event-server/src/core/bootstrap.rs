/*!
Startup checks and assembly of the supervisor from the effective configuration
*/

use std::ffi::OsString;

use ftrack_endpoints::{EventPaths, ServerUrl, StoreAddress};
use tracing::{debug, info, warn};

use crate::core::{
    config::{
        API_KEY_ENV, EVENT_PATHS_ENV, SERVER_ENV, STORE_URL_ENV, ServerConfig, USER_ENV,
        WorkerConfig, WorkersConfig,
    },
    credentials::{CredentialStore, Credentials},
    probes::{Probe, ServerProbe, StoreProbe},
    session::validate_credentials,
    supervisor::{Supervisor, SupervisorSettings},
    workers::{SubprocessLauncher, WorkerRole, WorkerSpec},
};
use crate::error::EventServerError;

/// Validate the configuration the way the event server needs it and build
/// the supervisor. Any error here means the server cannot start.
pub async fn prepare(
    config: &ServerConfig,
    credential_store: Option<&CredentialStore>,
    store_credentials: bool,
) -> Result<Supervisor, EventServerError> {
    let server = ServerUrl::parse(config.ftrack.server.as_deref().unwrap_or_default())?;
    let server_probe = ServerProbe::new(server.clone(), config.ftrack.timeout())?;
    if let Err(e) = server_probe.check().await {
        warn!("ftrack server {} check failed: {}", server, e);
        return Err(EventServerError::ServerUnreachable(server.to_string()));
    }
    info!("ftrack server {} is accessible", server);

    let user = config.ftrack.user.clone().unwrap_or_default();
    let api_key = config.ftrack.api_key.clone().unwrap_or_default();
    validate_credentials(&server, &user, &api_key, config.ftrack.timeout()).await?;

    let event_paths = resolve_event_paths(&config.ftrack.event_paths)?;

    if store_credentials {
        match credential_store {
            Some(store) => {
                store
                    .save(&Credentials {
                        username: Some(user.clone()),
                        api_key: Some(api_key.clone()),
                    })
                    .await?
            }
            None => warn!("No config directory available, credentials were not stored"),
        }
    }

    let store_url = config
        .store
        .url
        .clone()
        .filter(|url| !url.trim().is_empty())
        .ok_or(EventServerError::MissingStoreUrl)?;
    let store_address = StoreAddress::parse(&store_url)?;
    let store_probe = StoreProbe::new(store_address, config.store.connect_timeout());

    let env: Vec<(String, OsString)> = vec![
        (SERVER_ENV.to_string(), server.as_str().into()),
        (USER_ENV.to_string(), user.into()),
        (API_KEY_ENV.to_string(), api_key.into()),
        (EVENT_PATHS_ENV.to_string(), event_paths.joined()?),
        (STORE_URL_ENV.to_string(), store_url.into()),
    ];
    let workers = &config.workers;
    let storer = worker_spec(workers, &workers.storer, WorkerRole::Storer, &env)?;
    let processor = worker_spec(workers, &workers.processor, WorkerRole::Processor, &env)?;

    let settings = SupervisorSettings {
        poll_interval: config.supervisor.poll_interval(),
        stop_timeout: config.supervisor.stop_timeout(),
    };
    Ok(Supervisor::new(
        Box::new(server_probe),
        Box::new(store_probe),
        Box::new(SubprocessLauncher),
        storer,
        processor,
        settings,
    ))
}

fn resolve_event_paths(values: &[String]) -> Result<EventPaths, EventServerError> {
    debug!("Processing event paths: {:?}", values);
    let paths = EventPaths::resolve(values);

    if !paths.missing().is_empty() {
        warn!("These paths were not found: {:?}", paths.missing());
    }
    if paths.is_empty() {
        if paths.missing().is_empty() {
            return Err(EventServerError::NoEventPaths);
        }
        return Err(EventServerError::EventPathsNotFound(paths.missing().to_vec()));
    }
    Ok(paths)
}

fn worker_spec(
    workers: &WorkersConfig,
    worker: &WorkerConfig,
    role: WorkerRole,
    env: &[(String, OsString)],
) -> Result<WorkerSpec, EventServerError> {
    let entry_point = workers.entry_point(worker);
    if !entry_point.exists() {
        return Err(EventServerError::MissingEntryPoint {
            name: worker.name.clone(),
            path: entry_point,
        });
    }

    Ok(WorkerSpec {
        role,
        name: worker.name.clone(),
        port: worker.port,
        entry_point,
        interpreter: workers.interpreter.clone(),
        env: env.to_vec(),
    })
}
