// Readiness waiting for service containers
// Bounded poll loops with explicit timeout and interval

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::errors::{is_not_found, Error};
use crate::runtime::{ContainerRuntime, ContainerStatus};

/// Default overall wait budget for a service to come up.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default delay between poll attempts.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Per-request timeout for HTTP readiness probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long and how often to poll while waiting for a service.
#[derive(Debug, Clone, Copy)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl WaitConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Poll the runtime until the named container reports running.
///
/// Returns [`Error::StartTimeout`] if the deadline passes first and
/// [`Error::ServiceNotFound`] if the container disappears while waiting.
pub async fn wait_until_running(
    runtime: &impl ContainerRuntime,
    name: &str,
    wait: &WaitConfig,
) -> Result<(), Error> {
    let deadline = Instant::now() + wait.timeout;
    loop {
        match runtime.status(name).await {
            Ok(ContainerStatus::Running) => {
                debug!(name = %name, "Container is running");
                return Ok(());
            }
            Ok(status) => {
                debug!(name = %name, status = %status, "Waiting for container to start");
            }
            Err(err) if is_not_found(&err) => {
                return Err(Error::ServiceNotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        if Instant::now() >= deadline {
            warn!(name = %name, "Container did not reach the running state in time");
            return Err(Error::StartTimeout {
                name: name.to_string(),
                timeout: wait.timeout,
            });
        }
        sleep(wait.interval).await;
    }
}

/// Probe the service's HTTP API on the loopback port until it answers.
///
/// Any HTTP response counts: the service being able to answer at all is
/// the readiness signal, not a particular status code.
pub async fn wait_for_api(name: &str, port: u16, wait: &WaitConfig) -> Result<(), Error> {
    let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
    let url = format!("http://127.0.0.1:{}/", port);

    let deadline = Instant::now() + wait.timeout;
    loop {
        match client.get(&url).send().await {
            Ok(response) => {
                debug!(name = %name, port = port, status = %response.status(), "Service API answered");
                return Ok(());
            }
            Err(err) => {
                debug!(name = %name, port = port, error = %err, "Service API not reachable yet");
            }
        }

        if Instant::now() >= deadline {
            warn!(name = %name, port = port, "Service API did not answer in time");
            return Err(Error::StartTimeout {
                name: name.to_string(),
                timeout: wait.timeout,
            });
        }
        sleep(wait.interval).await;
    }
}
