// Service lifecycle operations
// Creating, finding, starting, stopping and destroying Cerise containers

use std::io::Read;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{classify_lookup_error, classify_run_error, is_not_found, Error};
use crate::readiness::{wait_for_api, wait_until_running, WaitConfig};
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerStatus};

/// Port the Cerise service listens on inside its container.
pub const CERISE_INTERNAL_PORT: u16 = 29593;

/// Location of the service's internal log inside the container.
pub const CERISE_LOG_PATH: &str = "/var/log/cerise/cerise_backend.log";

/// File name of the log entry within the downloaded archive.
const CERISE_LOG_FILE: &str = "cerise_backend.log";

/// Launch description for a new managed service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// A unique name for the service. Must be a valid Docker container name.
    pub name: String,
    /// A unique host port the service will be made available on. It will
    /// listen on localhost only.
    pub port: u16,
    /// Name of the Docker image to launch.
    pub image: String,
    /// User name for connecting to the compute resource.
    pub username: Option<String>,
    /// Password for connecting to the compute resource.
    pub password: Option<String>,
    /// How long to wait for the container to come up after launch.
    pub ready: WaitConfig,
}

impl ServiceConfig {
    pub fn new(name: &str, port: u16, image: &str) -> Self {
        Self {
            name: name.to_string(),
            port,
            image: image.to_string(),
            username: None,
            password: None,
            ready: WaitConfig::default(),
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_ready_wait(mut self, ready: WaitConfig) -> Self {
        self.ready = ready;
        self
    }
}

/// A managed Cerise service in a Docker container.
///
/// The value is a handle, not a cache: it carries only the name and port
/// that identify the container, and every operation re-resolves the
/// container by name at call time. Serializing it yields exactly those
/// two fields, which is enough to rebuild the handle later with
/// [`service_from_dict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedService {
    name: String,
    port: u16,
}

impl ManagedService {
    /// Build a handle from a known name and port.
    ///
    /// This does not create or look up the Docker container; use
    /// [`create_service`], [`get_service`] or [`service_from_dict`] to
    /// obtain a handle with an actual corresponding service.
    pub fn new(name: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            port,
        }
    }

    /// The name of this service, and of its Docker container.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host port this service runs on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Root URL of the service's own job-submission API. Callers drive
    /// that API with their own HTTP client; this crate only manages the
    /// container behind it.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Wait until the service's HTTP API answers on the loopback port.
    ///
    /// A running container does not mean the service inside it is up yet;
    /// use this when the next step is talking to the API.
    pub async fn wait_until_ready(&self, wait: &WaitConfig) -> Result<(), Error> {
        wait_for_api(&self.name, self.port, wait).await
    }

    /// Get the internal Cerise log for this service.
    ///
    /// If things are not working as expected (e.g. a job reports a system
    /// error), the log may say what went wrong. The file is fetched from
    /// the container filesystem as a tar stream on every call.
    pub async fn get_log(&self, runtime: &impl ContainerRuntime) -> Result<String, Error> {
        let bytes = runtime
            .download_archive(&self.name, CERISE_LOG_PATH)
            .await
            .map_err(|err| classify_lookup_error(&self.name, err))?;

        let mut archive = tar::Archive::new(bytes.as_slice());
        for entry in archive.entries().map_err(Error::LogUnreadable)? {
            let mut entry = entry.map_err(Error::LogUnreadable)?;
            let is_log = entry
                .path()
                .map(|p| p.file_name() == Some(std::ffi::OsStr::new(CERISE_LOG_FILE)))
                .unwrap_or(false);
            if is_log {
                let mut text = String::new();
                entry
                    .read_to_string(&mut text)
                    .map_err(Error::LogUnreadable)?;
                return Ok(text);
            }
        }

        Err(Error::LogUnreadable(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "archive does not contain the log file",
        )))
    }
}

/// Check a name against Docker's container-name rule.
///
/// The daemon rejects anything else; this helper lets callers validate
/// up front instead of parsing the daemon's 400.
pub fn is_valid_service_name(name: &str) -> bool {
    static NAME_RULE: OnceLock<Regex> = OnceLock::new();
    let rule = NAME_RULE
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("static pattern"));
    rule.is_match(name)
}

/// Environment entries injected into the service container.
fn build_service_env(config: &ServiceConfig) -> Vec<String> {
    let mut env = vec![format!(
        "CERISE_STORE_LOCATION_CLIENT=http://localhost:{}/files",
        config.port
    )];

    match &config.username {
        Some(username) if !username.is_empty() => {
            env.push(format!("CERISE_USERNAME={}", username));
        }
        _ => {}
    }
    if let Some(password) = &config.password {
        env.push(format!("CERISE_PASSWORD={}", password));
    }

    env
}

/// Create a new service for a given user at a given port.
///
/// Launches a container from `config.image`, publishing the service's
/// internal port on `127.0.0.1:config.port`, then waits (bounded by
/// `config.ready`) for the container to report running.
///
/// # Errors
///
/// [`Error::ServiceAlreadyExists`] if a container with this name already
/// exists; [`Error::PortNotAvailable`] if the requested port is occupied;
/// [`Error::StartTimeout`] if the container never reaches the running
/// state. Other daemon failures pass through unclassified.
pub async fn create_service(
    runtime: &impl ContainerRuntime,
    config: &ServiceConfig,
) -> Result<ManagedService, Error> {
    if !is_valid_service_name(&config.name) {
        warn!(name = %config.name, "Name does not satisfy Docker's container name rules");
    }
    info!(name = %config.name, port = config.port, image = %config.image, "Creating service container");

    let spec = ContainerSpec {
        name: config.name.clone(),
        image: config.image.clone(),
        env: build_service_env(config),
        container_port: CERISE_INTERNAL_PORT,
        host_port: config.port,
    };
    runtime
        .run(&spec)
        .await
        .map_err(|err| classify_run_error(&config.name, config.port, err))?;

    wait_until_running(runtime, &config.name, &config.ready).await?;
    Ok(ManagedService::new(&config.name, config.port))
}

/// Destroy a service.
///
/// Stops and removes the backing container, deleting all jobs and data
/// the service held.
///
/// # Errors
///
/// [`Error::ServiceNotFound`] if no container with that name exists.
pub async fn destroy_service(
    runtime: &impl ContainerRuntime,
    service: &ManagedService,
) -> Result<(), Error> {
    info!(name = %service.name, "Destroying service container");
    runtime
        .stop(&service.name)
        .await
        .map_err(|err| classify_lookup_error(&service.name, err))?;
    runtime
        .remove(&service.name)
        .await
        .map_err(|err| classify_lookup_error(&service.name, err))?;
    Ok(())
}

/// Check whether a managed service with the given name exists.
///
/// A missing container is `false`, never an error; anything else the
/// daemon reports propagates.
pub async fn service_exists(
    runtime: &impl ContainerRuntime,
    name: &str,
) -> Result<bool, Error> {
    match runtime.status(name).await {
        Ok(_) => Ok(true),
        Err(err) if is_not_found(&err) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Get a managed service by name and port.
///
/// Does not check that `port` matches the port the container was created
/// with; the caller's value is taken on trust.
///
/// # Errors
///
/// [`Error::ServiceNotFound`] if the requested service does not exist.
pub async fn get_service(
    runtime: &impl ContainerRuntime,
    name: &str,
    port: u16,
) -> Result<ManagedService, Error> {
    if !service_exists(runtime, name).await? {
        return Err(Error::ServiceNotFound(name.to_string()));
    }
    Ok(ManagedService::new(name, port))
}

/// Create a new service, or return the existing one with that name.
///
/// # Errors
///
/// [`Error::PortNotAvailable`] and any other create failure propagate
/// unchanged; only the name conflict is converted into a lookup.
pub async fn require_service(
    runtime: &impl ContainerRuntime,
    config: &ServiceConfig,
) -> Result<ManagedService, Error> {
    match create_service(runtime, config).await {
        Err(Error::ServiceAlreadyExists(_)) => {
            get_service(runtime, &config.name, config.port).await
        }
        other => other,
    }
}

/// Check whether the managed service is running.
///
/// Any container status other than running, and a missing container,
/// yield `false`.
pub async fn service_is_running(
    runtime: &impl ContainerRuntime,
    service: &ManagedService,
) -> Result<bool, Error> {
    match runtime.status(&service.name).await {
        Ok(status) => Ok(status == ContainerStatus::Running),
        Err(err) if is_not_found(&err) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Start a stopped managed service and wait until it reports running.
///
/// Does nothing if the service is already running.
///
/// # Errors
///
/// [`Error::ServiceNotFound`] if the container is gone;
/// [`Error::StartTimeout`] if it never comes up within `wait`.
pub async fn start_service(
    runtime: &impl ContainerRuntime,
    service: &ManagedService,
    wait: &WaitConfig,
) -> Result<(), Error> {
    runtime
        .start(&service.name)
        .await
        .map_err(|err| classify_lookup_error(&service.name, err))?;
    wait_until_running(runtime, &service.name, wait).await
}

/// Stop a running managed service.
///
/// This must be done before shutting down the host, to ensure in-flight
/// work inside the container terminates cleanly. Does nothing if the
/// service is already stopped.
///
/// # Errors
///
/// [`Error::ServiceNotFound`] if the container is gone.
pub async fn stop_service(
    runtime: &impl ContainerRuntime,
    service: &ManagedService,
) -> Result<(), Error> {
    runtime
        .stop(&service.name)
        .await
        .map_err(|err| classify_lookup_error(&service.name, err))
}

/// Save the service handle to a plain dictionary value.
///
/// The result holds only the name and port, ready to be stored in any
/// structured format and handed back to [`service_from_dict`].
pub fn service_to_dict(service: &ManagedService) -> serde_json::Value {
    serde_json::json!({
        "name": service.name,
        "port": service.port,
    })
}

/// Rebuild a service handle from a dictionary value.
///
/// # Errors
///
/// [`Error::InvalidDict`] if the value does not hold a name and a port;
/// [`Error::ServiceNotFound`] if no container with that name exists.
pub async fn service_from_dict(
    runtime: &impl ContainerRuntime,
    dict: &serde_json::Value,
) -> Result<ManagedService, Error> {
    let service: ManagedService =
        serde_json::from_value(dict.clone()).map_err(Error::InvalidDict)?;
    get_service(runtime, &service.name, service.port).await
}
