//! Container image runtime seam.
//!
//! Trait-based so tests (and other CLIs such as podman) can stand in for
//! `docker`.

use std::{path::Path, process::Stdio};

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    fingerprint::BuildIdentity,
};

/// Output lines kept from a failed build.
pub const BUILD_TAIL_LINES: usize = 12;

/// Everything `docker build` needs for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest<'a> {
    pub tag: &'a str,
    pub context_dir: &'a Path,
    pub build_args: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
}

/// Result of one build attempt. A failed build is not an `Err`: the tail
/// holds the last lines of build output for the caller to show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    pub success: bool,
    pub tail: Vec<String>,
}

impl BuildOutcome {
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            success: true,
            tail: Vec::new(),
        }
    }

    /// Failure carrying the last [`BUILD_TAIL_LINES`] non-blank lines of
    /// `stderr` followed by `stdout`.
    #[must_use]
    pub fn failed(stderr: &str, stdout: &str) -> Self {
        let lines: Vec<String> = stderr
            .lines()
            .chain(stdout.lines())
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        let skip = lines.len().saturating_sub(BUILD_TAIL_LINES);
        Self {
            success: false,
            tail: lines.into_iter().skip(skip).collect(),
        }
    }
}

#[async_trait]
pub trait ImageRuntime: Send + Sync {
    /// Whether `image` exists locally.
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Value of label `key` on `image`; `None` when the image or the label
    /// is absent.
    async fn image_label(&self, image: &str, key: &str) -> Result<Option<String>>;

    /// Run one build. Only failing to start the build is an `Err`.
    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutcome>;
}

/// Values `docker inspect` prints for a missing label.
fn normalize_label(raw: &str) -> Option<String> {
    match raw.trim() {
        "" | "<no value>" | "<nil>" => None,
        value => Some(value.to_string()),
    }
}

/// `docker` (or a compatible CLI) driven through `tokio::process`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    cli: String,
}

impl DockerCli {
    pub fn new(cli: impl Into<String>) -> Self {
        Self { cli: cli.into() }
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.cli);
        cmd.kill_on_drop(true);
        cmd
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ImageRuntime for DockerCli {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        let status = self
            .command()
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::command(format!("{} image inspect", self.cli), e))?;
        Ok(status.success())
    }

    async fn image_label(&self, image: &str, key: &str) -> Result<Option<String>> {
        let format = format!("{{{{ index .Config.Labels \"{key}\" }}}}");
        let output = self
            .command()
            .args(["image", "inspect", "--format", &format, image])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::command(format!("{} image inspect", self.cli), e))?;
        if !output.status.success() {
            debug!(image, key, "image not inspectable, treating label as absent");
            return Ok(None);
        }
        Ok(normalize_label(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutcome> {
        let mut cmd = self.command();
        cmd.arg("build");
        for (key, value) in &request.build_args {
            cmd.arg("--build-arg").arg(format!("{key}={value}"));
        }
        for (key, value) in &request.labels {
            cmd.arg("--label").arg(format!("{key}={value}"));
        }
        cmd.args(["-t", request.tag]).arg(request.context_dir);

        info!(image = request.tag, "building image");
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::command(format!("{} build", self.cli), e))?;

        if output.status.success() {
            info!(image = request.tag, "image built");
            return Ok(BuildOutcome::succeeded());
        }
        warn!(image = request.tag, status = %output.status, "image build failed");
        Ok(BuildOutcome::failed(
            &String::from_utf8_lossy(&output.stderr),
            &String::from_utf8_lossy(&output.stdout),
        ))
    }
}

/// uid/gid of the invoking user, so bind mounts stay writable.
#[cfg(unix)]
#[must_use]
pub fn current_identity() -> BuildIdentity {
    use nix::unistd::{getgid, getuid};

    BuildIdentity {
        uid: getuid().as_raw(),
        gid: getgid().as_raw(),
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn current_identity() -> BuildIdentity {
    BuildIdentity::default()
}
