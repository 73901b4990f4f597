// Cerise service manager
// Lifecycle management for Cerise job-execution services in Docker containers

//! Create, find, start, stop and destroy Cerise services running in local
//! Docker containers. A service is one named container publishing the
//! Cerise API on a loopback port; this crate manages the container and
//! hands callers a small [`ManagedService`] handle (name + port) that can
//! be serialized and rebuilt between process runs.
//!
//! ```no_run
//! use cerise_manager::{create_service, DockerClient, ServiceConfig};
//!
//! # async fn demo() -> Result<(), cerise_manager::Error> {
//! let docker = DockerClient::new()?;
//! let config = ServiceConfig::new("cerise-mdstudio", 29593, "mdstudio/cerise:develop");
//! let service = create_service(&docker, &config).await?;
//! println!("service API at {}", service.base_url());
//! # Ok(())
//! # }
//! ```

mod docker;
mod errors;
mod readiness;
mod runtime;
mod service;

#[cfg(test)]
mod testutil;

pub use docker::DockerClient;
pub use errors::Error;
pub use readiness::{wait_for_api, wait_until_running, WaitConfig};
pub use runtime::{ContainerRuntime, ContainerSpec, ContainerStatus};
pub use service::{
    create_service, destroy_service, get_service, is_valid_service_name, require_service,
    service_exists, service_from_dict, service_is_running, service_to_dict, start_service,
    stop_service, ManagedService, ServiceConfig, CERISE_INTERNAL_PORT, CERISE_LOG_PATH,
};
