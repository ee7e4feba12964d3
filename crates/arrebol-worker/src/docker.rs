//! Container runtime driver.
//!
//! [`ContainerDriver`] is the set of primitives the executor needs from a
//! container runtime; [`DockerDriver`] implements it against the Docker API.
//! Stop and remove tolerate containers that are already gone so teardown can
//! stay best-effort.

use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Grace period given to a container before it is killed.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Parameters for creating a task container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Host bind mounts in `host:container` form.
    pub binds: Vec<String>,
}

/// Primitives the executor drives a container runtime with.
///
/// `exec` blocks until the command inside the container completes; a
/// non-zero exit status is an error. `read_file` returns the raw bytes of a
/// file inside the container.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container and return its runtime id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, cid: &str) -> Result<()>;

    async fn stop_container(&self, cid: &str) -> Result<()>;

    async fn remove_container(&self, cid: &str) -> Result<()>;

    /// Copy a file from the host into the container.
    async fn copy_into(&self, cid: &str, host_path: &Path, container_path: &str) -> Result<()>;

    /// Write `lines` to a file inside the container, one line each.
    async fn write_file(&self, cid: &str, lines: &[String], container_path: &str) -> Result<()>;

    /// Run a shell line inside the container and wait for it to finish.
    async fn exec(&self, cid: &str, shell_line: &str) -> Result<()>;

    async fn read_file(&self, cid: &str, container_path: &str) -> Result<Vec<u8>>;
}

/// Docker implementation of [`ContainerDriver`].
pub struct DockerDriver {
    docker: Docker,
}

impl DockerDriver {
    /// Connect to the runtime at `node_address`, or to the local Docker
    /// socket when no address is configured.
    pub fn connect(node_address: Option<&str>) -> Result<Self> {
        let docker = match node_address {
            Some(addr) if !addr.is_empty() => {
                info!(address = addr, "connecting to remote container runtime");
                Docker::connect_with_http(addr, 120, bollard::API_DEFAULT_VERSION)?
            }
            _ => Docker::connect_with_socket_defaults()?,
        };
        Ok(Self { docker })
    }

    /// Upload `data` as a single file at `container_path`.
    async fn upload_bytes(
        &self,
        cid: &str,
        data: &[u8],
        container_path: &str,
        mode: u32,
    ) -> Result<()> {
        let (dir, file_name) = split_container_path(container_path)?;

        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();

        let mut builder = tar::Builder::new(Vec::new());
        builder.append_data(&mut header, file_name, data)?;
        let archive = builder.into_inner()?;

        let options = UploadToContainerOptions { path: dir.to_string(), ..Default::default() };
        self.docker.upload_to_container(cid, Some(options), archive.into()).await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerDriver for DockerDriver {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!(image, "pulling image");

        let options = CreateImageOptions { from_image: image.to_string(), ..Default::default() };
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(progress) = stream.next().await {
            let info = progress?;
            if let Some(error) = info.error {
                return Err(WorkerError::Container(format!("pull of {image} failed: {error}")));
            }
            if let Some(status) = info.status {
                debug!(image, status, "pull progress");
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let options = CreateContainerOptions { name: spec.name.clone(), platform: None };
        let host_config = HostConfig {
            binds: if spec.binds.is_empty() { None } else { Some(spec.binds.clone()) },
            ..Default::default()
        };
        // A tty keeps the image's default shell alive so commands can be
        // exec'd into the container for the life of the task.
        let config = Config {
            image: Some(spec.image.clone()),
            tty: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), config).await?;
        debug!(name = %spec.name, cid = %response.id, "created container");
        Ok(response.id)
    }

    async fn start_container(&self, cid: &str) -> Result<()> {
        self.docker.start_container(cid, None::<StartContainerOptions<String>>).await?;
        Ok(())
    }

    async fn stop_container(&self, cid: &str) -> Result<()> {
        let options = StopContainerOptions { t: STOP_TIMEOUT_SECS };
        match self.docker.stop_container(cid, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped, 404: already gone
            Err(BollardError::DockerResponseServerError { status_code: 304, .. })
            | Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {
                debug!(cid, "container already stopped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_container(&self, cid: &str) -> Result<()> {
        let options = RemoveContainerOptions { force: true, v: true, ..Default::default() };
        match self.docker.remove_container(cid, Some(options)).await {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {
                debug!(cid, "container already removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn copy_into(&self, cid: &str, host_path: &Path, container_path: &str) -> Result<()> {
        let data = tokio::fs::read(host_path).await.map_err(|e| {
            WorkerError::Container(format!("cannot read {}: {e}", host_path.display()))
        })?;
        self.upload_bytes(cid, &data, container_path, 0o755).await
    }

    async fn write_file(&self, cid: &str, lines: &[String], container_path: &str) -> Result<()> {
        let mut contents = lines.join("\n");
        contents.push('\n');
        self.upload_bytes(cid, contents.as_bytes(), container_path, 0o644).await
    }

    async fn exec(&self, cid: &str, shell_line: &str) -> Result<()> {
        let options = CreateExecOptions {
            cmd: Some(vec!["/bin/sh".to_string(), "-c".to_string(), shell_line.to_string()]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self.docker.create_exec(cid, options).await?;

        match self.docker.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { mut output, .. } => {
                // Drain until the stream closes; that is the completion signal.
                while let Some(chunk) = output.next().await {
                    let _: LogOutput = chunk?;
                }
            }
            StartExecResults::Detached => {
                return Err(WorkerError::Container("exec detached unexpectedly".to_string()));
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        match inspect.exit_code {
            Some(0) | None => Ok(()),
            Some(code) => Err(WorkerError::Container(format!(
                "command `{shell_line}` exited with status {code}"
            ))),
        }
    }

    async fn read_file(&self, cid: &str, container_path: &str) -> Result<Vec<u8>> {
        let options = DownloadFromContainerOptions { path: container_path.to_string() };
        let mut stream = self.docker.download_from_container(cid, Some(options));

        let mut archive_bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            archive_bytes.extend_from_slice(&chunk?);
        }

        // The API hands back a tar archive holding the single requested file.
        let mut archive = tar::Archive::new(archive_bytes.as_slice());
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.header().entry_type().is_file() {
                let mut contents = Vec::new();
                entry.read_to_end(&mut contents)?;
                return Ok(contents);
            }
        }
        Err(WorkerError::Container(format!("{container_path} is not a regular file")))
    }
}

fn split_container_path(container_path: &str) -> Result<(&str, &str)> {
    match container_path.rsplit_once('/') {
        Some((dir, file)) if !file.is_empty() => Ok((if dir.is_empty() { "/" } else { dir }, file)),
        _ => Err(WorkerError::Container(format!(
            "container path {container_path} must name a file"
        ))),
    }
}
