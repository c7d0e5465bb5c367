//! Docker-backed `Deployment`. Pulls (or reuses a cached) image, binds a
//! free host port onto the container's runtime port, starts an
//! in-container runtime authenticated with a freshly generated bearer
//! token, and waits for it to answer its liveness probe.
//!
//! Shutdown escalates SIGTERM -> wait -> SIGKILL, giving up after three
//! kill attempts, mirroring the container-runtime shutdown dance of the
//! sandbox backend this crate's Deployment trait was modeled on.

use std::collections::HashMap;
use std::net::TcpListener;
use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use teamcore_foundation::{Error, Result};

use super::image_cache;
use super::{Deployment, LivenessReport, PullPolicy, RuntimeClient};

const CONTAINER_RUNTIME_PORT: u16 = 8000;
const KILL_WAIT: Duration = Duration::from_secs(10);
const MAX_KILL_ATTEMPTS: u32 = 3;

pub struct DockerDeploymentConfig {
    pub image: String,
    pub pull_policy: PullPolicy,
    pub startup_timeout_secs: u64,
    pub remove_image_on_stop: bool,
}

pub struct DockerDeployment {
    docker: Docker,
    config: DockerDeploymentConfig,
    container_id: Option<String>,
    runtime: Option<RuntimeClient>,
}

impl DockerDeployment {
    pub fn new(config: DockerDeploymentConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| Error::Docker(e.to_string()))?;
        Ok(Self { docker, config, container_id: None, runtime: None })
    }

    async fn image_present_locally(&self) -> Result<bool> {
        Ok(self.docker.inspect_image(&self.config.image).await.is_ok())
    }

    async fn pull_image(&self) -> Result<()> {
        let should_pull = match self.config.pull_policy {
            PullPolicy::Never => false,
            PullPolicy::Always => true,
            PullPolicy::Missing => !(self.image_present_locally().await? || image_cache::is_cached(&self.config.image)?),
        };
        if !should_pull {
            return Ok(());
        }
        let options = CreateImageOptions { from_image: self.config.image.as_str(), ..Default::default() };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(item) = stream.next().await {
            item.map_err(|e| Error::deployment(format!("image pull failed for {}: {e}", self.config.image)))?;
        }
        self.mark_image_cached()?;
        Ok(())
    }

    /// Records that `self.config.image` has been pulled, so the next
    /// `Missing`-policy start on this or any other instance sees
    /// `image_cache::is_cached` return true and skips the pull.
    /// Docker itself keeps the pulled layers, not this crate, so there
    /// is no downloaded blob to rename directly into the cache path —
    /// instead an empty marker file is written to a temp path first and
    /// renamed into place, preserving the same atomic commit-on-success
    /// shape `commit_download` expects.
    fn mark_image_cached(&self) -> Result<()> {
        let cache_dir = image_cache::cache_dir()?;
        std::fs::create_dir_all(&cache_dir)?;
        let tmp_path = cache_dir.join(format!(".tmp-{}", Uuid::new_v4()));
        std::fs::write(&tmp_path, b"")?;
        image_cache::commit_download(&self.config.image, &tmp_path)?;
        Ok(())
    }

    fn free_host_port() -> Result<u16> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        Ok(listener.local_addr()?.port())
    }
}

#[async_trait::async_trait]
impl Deployment for DockerDeployment {
    async fn start(&mut self) -> Result<()> {
        self.pull_image().await?;

        let token = Uuid::new_v4().to_string();
        let host_port = Self::free_host_port()?;

        let port_key = format!("{CONTAINER_RUNTIME_PORT}/tcp");
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key.clone(),
            Some(vec![bollard::models::PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(host_port.to_string()),
            }]),
        );
        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key, HashMap::new());

        let container_config = Config {
            image: Some(self.config.image.clone()),
            env: Some(vec![format!("TEAMCORE_RUNTIME_TOKEN={token}"), format!("TEAMCORE_RUNTIME_PORT={CONTAINER_RUNTIME_PORT}")]),
            exposed_ports: Some(exposed_ports),
            host_config: Some(bollard::models::HostConfig {
                port_bindings: Some(port_bindings),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let name = format!("teamcore-{}", Uuid::new_v4());
        let options = CreateContainerOptions { name: name.clone(), platform: None };

        let created = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::deployment(format!("failed to create container for {}: {e}", self.config.image)))?;
        self.container_id = Some(created.id.clone());

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::deployment(format!("failed to start container: {e}")))?;

        self.runtime = Some(RuntimeClient::new("127.0.0.1", host_port, token));

        let probe = self.is_alive(self.config.startup_timeout_secs).await?;
        if !probe.ok {
            let tail = self.collect_log_tail().await.unwrap_or_default();
            self.stop().await?;
            return Err(Error::deployment(format!(
                "container for {} did not become alive within {}s: {}\n{tail}",
                self.config.image, self.config.startup_timeout_secs, probe.message.unwrap_or_default()
            )));
        }

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(container_id) = self.container_id.take() else {
            return Ok(());
        };

        let _ = self
            .docker
            .kill_container(&container_id, Some(KillContainerOptions { signal: "SIGTERM" }))
            .await;

        let mut stopped = false;
        for _attempt in 0..MAX_KILL_ATTEMPTS {
            if timeout(KILL_WAIT, self.wait_until_exited(&container_id)).await.is_ok() {
                stopped = true;
                break;
            }
            let _ = self
                .docker
                .kill_container(&container_id, Some(KillContainerOptions { signal: "SIGKILL" }))
                .await;
        }
        if !stopped {
            tracing::warn!(container_id, "gave up waiting for container to exit after {MAX_KILL_ATTEMPTS} kill attempts");
        }

        let _ = self
            .docker
            .remove_container(&container_id, Some(RemoveContainerOptions { force: true, ..Default::default() }))
            .await;

        if self.config.remove_image_on_stop {
            if let Ok(path) = image_cache::image_cache_path(&self.config.image) {
                let _ = std::fs::remove_file(path);
            }
        }

        self.runtime = None;
        Ok(())
    }

    async fn is_alive(&self, timeout_secs: u64) -> Result<LivenessReport> {
        let Some(runtime) = &self.runtime else {
            return Ok(LivenessReport { ok: false, message: Some("runtime not started".into()) });
        };
        let deadline = Duration::from_secs(timeout_secs);
        let poll_interval = Duration::from_millis(500);
        let mut waited = Duration::ZERO;
        loop {
            if runtime.alive().await.unwrap_or(false) {
                return Ok(LivenessReport { ok: true, message: None });
            }
            if waited >= deadline {
                return Ok(LivenessReport { ok: false, message: Some("liveness probe never succeeded".into()) });
            }
            sleep(poll_interval).await;
            waited += poll_interval;
        }
    }

    fn runtime(&self) -> &RuntimeClient {
        self.runtime.as_ref().expect("Deployment::start must succeed before runtime() is used")
    }
}

impl DockerDeployment {
    async fn wait_until_exited(&self, container_id: &str) -> Result<()> {
        loop {
            let inspect = self
                .docker
                .inspect_container(container_id, None)
                .await
                .map_err(|e| Error::Docker(e.to_string()))?;
            if !inspect.state.and_then(|s| s.running).unwrap_or(false) {
                return Ok(());
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    async fn collect_log_tail(&self) -> Result<String> {
        use bollard::container::LogsOptions;
        let Some(container_id) = &self.container_id else {
            return Ok(String::new());
        };
        let options = LogsOptions::<String> { stdout: true, stderr: true, tail: "50".to_string(), ..Default::default() };
        let mut stream = self.docker.logs(container_id, Some(options));
        let mut out = String::new();
        while let Some(Ok(chunk)) = stream.next().await {
            out.push_str(&chunk.to_string());
        }
        Ok(out)
    }
}
