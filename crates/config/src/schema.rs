//! Resource schema types (Environment, SecurityProfile, AgentConfig,
//! Credential, Project) and the global defaults file.
//!
//! Resource names live in the envelope's `metadata.name`, never in `spec`,
//! so every `name` field below is skipped by serde and filled in by
//! [`crate::resource`].

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

macro_rules! lowercase_display {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ── Environment ─────────────────────────────────────────────────────────────

/// Whether skua runs a sidecar next to the agent container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentMode {
    /// Single agent container; monitoring is advisory only.
    #[default]
    Unmanaged,
    /// Sidecar mediates network, logs, and MCP endpoints.
    Managed,
}

lowercase_display!(EnvironmentMode {
    Unmanaged => "unmanaged",
    Managed => "managed",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[default]
    Docker,
    Compose,
    Kubernetes,
}

lowercase_display!(Driver {
    Docker => "docker",
    Compose => "compose",
    Kubernetes => "kubernetes",
});

impl Driver {
    /// Drivers that run plain Docker containers (and so honour a container
    /// runtime override and `docker diff` auditing).
    #[must_use]
    pub fn is_docker_based(self) -> bool {
        matches!(self, Self::Docker | Self::Compose)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostRuntime {
    #[default]
    Local,
    Remote,
}

lowercase_display!(HostRuntime {
    Local => "local",
    Remote => "remote",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    #[default]
    Ephemeral,
    Persistent,
}

lowercase_display!(CleanupPolicy {
    Ephemeral => "ephemeral",
    Persistent => "persistent",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    #[default]
    Bind,
    Volume,
}

lowercase_display!(PersistenceMode {
    Bind => "bind",
    Volume => "volume",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    None,
    #[default]
    Bridge,
    Internal,
    Host,
}

lowercase_display!(NetworkMode {
    None => "none",
    Bridge => "bridge",
    Internal => "internal",
    Host => "host",
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerDriverSpec {
    pub runtime: HostRuntime,
    /// `ssh://user@host`, used when `runtime` is remote.
    #[serde(alias = "remoteHost")]
    pub remote_host: String,
    pub cleanup: CleanupPolicy,
    /// Empty means the daemon default (runc); e.g. `runsc` for gVisor.
    #[serde(alias = "containerRuntime")]
    pub container_runtime: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeDriverSpec {
    pub runtime: HostRuntime,
    pub cleanup: CleanupPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesDriverSpec {
    pub context: String,
    pub namespace: String,
    #[serde(alias = "storageClass")]
    pub storage_class: String,
}

impl Default for KubernetesDriverSpec {
    fn default() -> Self {
        Self {
            context: String::new(),
            namespace: "skua".into(),
            storage_class: "standard".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSpec {
    pub mode: PersistenceMode,
    #[serde(alias = "basePath")]
    pub base_path: String,
    #[serde(alias = "volumePrefix")]
    pub volume_prefix: String,
}

impl Default for PersistenceSpec {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::Bind,
            base_path: "~/.config/skua/claude-data".into(),
            volume_prefix: "skua".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSpec {
    pub mode: NetworkMode,
}

/// Where and how sandbox containers run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    #[serde(skip)]
    pub name: String,
    pub mode: EnvironmentMode,
    pub driver: Driver,
    pub docker: DockerDriverSpec,
    pub compose: ComposeDriverSpec,
    pub kubernetes: KubernetesDriverSpec,
    pub persistence: PersistenceSpec,
    pub network: NetworkSpec,
}

impl Environment {
    /// The container runtime override, if any. Read from the docker
    /// sub-spec for every driver; only docker-based drivers apply it.
    #[must_use]
    pub fn container_runtime(&self) -> Option<&str> {
        let runtime = self.docker.container_runtime.trim();
        (!runtime.is_empty()).then_some(runtime)
    }

    /// Cleanup policy of the sub-spec matching the driver. Kubernetes has
    /// no cleanup policy.
    #[must_use]
    pub fn cleanup(&self) -> Option<CleanupPolicy> {
        match self.driver {
            Driver::Docker => Some(self.docker.cleanup),
            Driver::Compose => Some(self.compose.cleanup),
            Driver::Kubernetes => None,
        }
    }
}

// ── SecurityProfile ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundPolicy {
    #[default]
    Unrestricted,
    None,
    Proxy,
}

lowercase_display!(OutboundPolicy {
    Unrestricted => "unrestricted",
    None => "none",
    Proxy => "proxy",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    Unrestricted,
    Advisory,
    Verified,
    #[default]
    None,
}

lowercase_display!(InstallMode {
    Unrestricted => "unrestricted",
    Advisory => "advisory",
    Verified => "verified",
    None => "none",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    #[default]
    None,
    Advisory,
    Trusted,
}

lowercase_display!(AuditMode {
    None => "none",
    Advisory => "advisory",
    Trusted => "trusted",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageUpdateMode {
    #[default]
    Disabled,
    Suggest,
    Auto,
}

lowercase_display!(ImageUpdateMode {
    Disabled => "disabled",
    Suggest => "suggest",
    Auto => "auto",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageUpdateSource {
    #[default]
    Audit,
    Proxy,
}

lowercase_display!(ImageUpdateSource {
    Audit => "audit",
    Proxy => "proxy",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySpec {
    #[serde(alias = "allowedDomains")]
    pub allowed_domains: Vec<String>,
    #[serde(alias = "logRequests")]
    pub log_requests: bool,
}

impl Default for ProxySpec {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            log_requests: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityNetworkSpec {
    pub outbound: OutboundPolicy,
    pub proxy: ProxySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityAgentSpec {
    pub sudo: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifiedInstallSpec {
    #[serde(alias = "autoApprove")]
    pub auto_approve: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityInstallSpec {
    pub mode: InstallMode,
    pub verified: VerifiedInstallSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityAuditSpec {
    pub mode: AuditMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageUpdatesSpec {
    pub mode: ImageUpdateMode,
    pub source: ImageUpdateSource,
}

/// What the agent is and is not allowed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityProfile {
    #[serde(skip)]
    pub name: String,
    pub network: SecurityNetworkSpec,
    pub agent: SecurityAgentSpec,
    pub install: SecurityInstallSpec,
    pub audit: SecurityAuditSpec,
    #[serde(alias = "imageUpdates")]
    pub image_updates: ImageUpdatesSpec,
}

// ── AgentConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentInstallSpec {
    /// Shell commands run as the `dev` user to install the agent.
    pub commands: Vec<String>,
    #[serde(alias = "requiredPackages")]
    pub required_packages: Vec<String>,
    #[serde(alias = "baseImage")]
    pub base_image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentRuntimeSpec {
    pub command: String,
    /// Template for the non-interactive adapt run. Placeholders:
    /// `{prompt}`, `{prompt_shell}`, `{project}`.
    #[serde(alias = "adaptCommand")]
    pub adapt_command: String,
    pub env: BTreeMap<String, String>,
    #[serde(alias = "entrypointHooks")]
    pub entrypoint_hooks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentAuthSpec {
    /// Directory (relative to the container home) persisted across runs.
    pub dir: String,
    pub files: Vec<String>,
    #[serde(alias = "loginCommand")]
    pub login_command: String,
}

/// An AI coding agent: how to install, authenticate, and run it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    #[serde(skip)]
    pub name: String,
    pub install: AgentInstallSpec,
    pub runtime: AgentRuntimeSpec,
    pub auth: AgentAuthSpec,
}

// ── Credential ──────────────────────────────────────────────────────────────

/// Named set of host credential files for an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credential {
    #[serde(skip)]
    pub name: String,
    pub agent: String,
    #[serde(alias = "sourceDir")]
    pub source_dir: String,
    /// Explicit file paths; take priority over `source_dir`.
    pub files: Vec<String>,
}

impl Default for Credential {
    fn default() -> Self {
        Self {
            name: String::new(),
            agent: "claude".into(),
            source_dir: String::new(),
            files: Vec::new(),
        }
    }
}

// ── Project ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectGitSpec {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSshSpec {
    #[serde(alias = "privateKey")]
    pub private_key: String,
}

/// Per-project image customization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectImageSpec {
    #[serde(alias = "baseImage")]
    pub base_image: String,
    /// Existing image adapted as the Dockerfile parent; wins over `base_image`.
    #[serde(alias = "fromImage")]
    pub from_image: String,
    #[serde(alias = "extraPackages")]
    pub extra_packages: Vec<String>,
    #[serde(alias = "extraCommands")]
    pub extra_commands: Vec<String>,
    /// Bumped by one every time an applied customization changes.
    pub version: u32,
}

impl ProjectImageSpec {
    /// Whether this project overrides agent/global image defaults.
    #[must_use]
    pub fn has_customizations(&self) -> bool {
        !self.base_image.trim().is_empty()
            || !self.from_image.trim().is_empty()
            || !self.extra_packages.is_empty()
            || !self.extra_commands.is_empty()
    }
}

/// Ties an Environment, SecurityProfile, and AgentConfig to a codebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    #[serde(skip)]
    pub name: String,
    pub directory: String,
    /// Git URL cloned into the managed repos directory.
    pub repo: String,
    pub environment: String,
    pub security: String,
    pub agent: String,
    pub credential: String,
    pub git: ProjectGitSpec,
    pub ssh: ProjectSshSpec,
    pub image: ProjectImageSpec,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            name: String::new(),
            directory: String::new(),
            repo: String::new(),
            environment: DEFAULT_ENVIRONMENT.into(),
            security: DEFAULT_SECURITY.into(),
            agent: DEFAULT_AGENT.into(),
            credential: String::new(),
            git: ProjectGitSpec::default(),
            ssh: ProjectSshSpec::default(),
            image: ProjectImageSpec::default(),
        }
    }
}

// ── Global config ───────────────────────────────────────────────────────────

pub const DEFAULT_IMAGE_NAME: &str = "skua-base";
pub const DEFAULT_BASE_IMAGE: &str = "debian:bookworm-slim";
pub const DEFAULT_ENVIRONMENT: &str = "local-docker";
pub const DEFAULT_SECURITY: &str = "open";
pub const DEFAULT_AGENT: &str = "claude";

/// Contents of `global.{yaml,toml,json}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Prefix for every image tag skua builds.
    pub image_name: String,
    /// Default `FROM` image when neither agent nor project override it.
    pub base_image: String,
    /// Directory holding container build assets (`entrypoint.sh`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_dir: Option<PathBuf>,
    pub defaults: GlobalDefaults,
    pub git: ProjectGitSpec,
    pub image: GlobalImageConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            image_name: DEFAULT_IMAGE_NAME.into(),
            base_image: DEFAULT_BASE_IMAGE.into(),
            tool_dir: None,
            defaults: GlobalDefaults::default(),
            git: ProjectGitSpec::default(),
            image: GlobalImageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalDefaults {
    pub environment: String,
    pub security: String,
    pub agent: String,
    pub ssh_key: String,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.into(),
            security: DEFAULT_SECURITY.into(),
            agent: DEFAULT_AGENT.into(),
            ssh_key: String::new(),
        }
    }
}

/// Packages and setup commands added to every image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalImageConfig {
    pub extra_packages: Vec<String>,
    pub extra_commands: Vec<String>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_defaults_match_local_docker() {
        let env = Environment::default();
        assert_eq!(env.mode, EnvironmentMode::Unmanaged);
        assert_eq!(env.driver, Driver::Docker);
        assert_eq!(env.network.mode, NetworkMode::Bridge);
        assert_eq!(env.persistence.mode, PersistenceMode::Bind);
        assert_eq!(env.container_runtime(), None);
    }

    #[test]
    fn security_defaults_are_open() {
        let sec = SecurityProfile::default();
        assert_eq!(sec.network.outbound, OutboundPolicy::Unrestricted);
        assert!(!sec.agent.sudo);
        assert_eq!(sec.install.mode, InstallMode::None);
        assert_eq!(sec.audit.mode, AuditMode::None);
        assert_eq!(sec.image_updates.mode, ImageUpdateMode::Disabled);
        assert_eq!(sec.image_updates.source, ImageUpdateSource::Audit);
    }

    #[test]
    fn spec_accepts_camel_case_aliases() {
        let yaml = r#"
network:
  outbound: proxy
agent:
  sudo: false
imageUpdates:
  mode: suggest
  source: proxy
"#;
        let sec: SecurityProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(sec.network.outbound, OutboundPolicy::Proxy);
        assert_eq!(sec.image_updates.mode, ImageUpdateMode::Suggest);
        assert_eq!(sec.image_updates.source, ImageUpdateSource::Proxy);
    }

    #[test]
    fn cleanup_follows_driver() {
        let mut env = Environment::default();
        env.docker.cleanup = CleanupPolicy::Persistent;
        assert_eq!(env.cleanup(), Some(CleanupPolicy::Persistent));
        env.driver = Driver::Compose;
        assert_eq!(env.cleanup(), Some(CleanupPolicy::Ephemeral));
        env.driver = Driver::Kubernetes;
        assert_eq!(env.cleanup(), None);
    }

    #[test]
    fn blank_container_runtime_is_default() {
        let mut env = Environment::default();
        env.docker.container_runtime = "  ".into();
        assert_eq!(env.container_runtime(), None);
        env.docker.container_runtime = "runsc".into();
        assert_eq!(env.container_runtime(), Some("runsc"));
    }

    #[test]
    fn project_customization_detection() {
        let mut image = ProjectImageSpec::default();
        assert!(!image.has_customizations());
        image.version = 3;
        assert!(!image.has_customizations());
        image.extra_packages = vec!["libpq-dev".into()];
        assert!(image.has_customizations());
    }

    #[test]
    fn global_config_reads_camel_case() {
        let yaml = r#"
imageName: registry.local:5000/skua
baseImage: ubuntu:24.04
defaults:
  security: locked
image:
  extraPackages: [ripgrep]
"#;
        let global: GlobalConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(global.image_name, "registry.local:5000/skua");
        assert_eq!(global.base_image, "ubuntu:24.04");
        assert_eq!(global.defaults.security, "locked");
        assert_eq!(global.defaults.agent, DEFAULT_AGENT);
        assert_eq!(global.image.extra_packages, vec!["ripgrep"]);
    }

    #[test]
    fn enum_display_is_lowercase() {
        assert_eq!(NetworkMode::Internal.to_string(), "internal");
        assert_eq!(EnvironmentMode::Managed.to_string(), "managed");
        assert_eq!(InstallMode::Verified.to_string(), "verified");
    }
}
