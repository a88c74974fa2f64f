//! Cross-resource validation engine.
//!
//! Every check is a pure function over the resources it is handed and
//! returns a [`ValidationResult`]. Problems are accumulated, never raised,
//! so callers see the full picture in one pass and decide the exit status
//! themselves.

use serde::Serialize;

use crate::{
    capabilities::{capabilities, required_capabilities},
    schema::{
        AgentConfig, AuditMode, Driver, Environment, EnvironmentMode, ImageUpdateMode,
        ImageUpdateSource, InstallMode, NetworkMode, OutboundPolicy, Project, SecurityProfile,
    },
};

/// Severity level for a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Ordered errors and warnings collected by one or more checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// `true` when no errors were recorded. Warnings never affect validity.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Append `other`'s findings after this result's own.
    pub fn merge(&mut self, other: Self) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Errors first, then warnings, each in recorded order.
    pub fn iter(&self) -> impl Iterator<Item = (Severity, &str)> {
        self.errors
            .iter()
            .map(|m| (Severity::Error, m.as_str()))
            .chain(self.warnings.iter().map(|m| (Severity::Warning, m.as_str())))
    }
}

/// Self-contradictions within a single Environment.
#[must_use]
pub fn validate_environment_internal(env: &Environment) -> ValidationResult {
    let mut result = ValidationResult::default();

    if env.mode == EnvironmentMode::Managed && env.driver == Driver::Docker {
        result.error(
            "mode 'managed' requires driver 'compose' or 'kubernetes': the skua sidecar needs \
             multi-container orchestration. Use driver 'compose' for local managed mode.",
        );
    }

    if let Some(runtime) = env.container_runtime()
        && !env.driver.is_docker_based()
    {
        result.warn(format!(
            "container_runtime '{runtime}' is ignored for driver '{}': gVisor/kata apply to \
             Docker containers only.",
            env.driver
        ));
    }

    if env.mode == EnvironmentMode::Unmanaged
        && env.driver == Driver::Docker
        && env.network.mode == NetworkMode::Internal
    {
        result.warn(
            "driver 'docker' with network.mode 'internal' behaves as network=none (true \
             internal networks require compose). Use network.mode 'none' to be explicit, or \
             switch to driver 'compose'.",
        );
    }

    result
}

/// Self-contradictions within a single SecurityProfile.
#[must_use]
pub fn validate_security_internal(security: &SecurityProfile) -> ValidationResult {
    let mut result = ValidationResult::default();
    let sudo = security.agent.sudo;
    let install = security.install.mode;
    let outbound = security.network.outbound;
    let audit = security.audit.mode;

    if install == InstallMode::Verified && sudo {
        result.error(
            "install.mode 'verified' requires agent.sudo to be false: the agent could bypass \
             the proxy with sudo",
        );
    }
    if install == InstallMode::None && sudo {
        result.warn(
            "install.mode 'none' with agent.sudo true: the agent can still install packages \
             directly via sudo",
        );
    }
    if matches!(install, InstallMode::Advisory | InstallMode::Unrestricted) && !sudo {
        result.error(format!(
            "install.mode '{install}' requires agent.sudo to be true: the agent needs sudo to \
             install packages"
        ));
    }

    if outbound == OutboundPolicy::Proxy && sudo {
        result.warn(
            "network.outbound 'proxy' with agent.sudo true: the agent could bypass the proxy \
             via raw sockets or iptables changes",
        );
    }

    if audit == AuditMode::Trusted && outbound != OutboundPolicy::Proxy {
        result.error(
            "audit.mode 'trusted' requires network.outbound 'proxy': trusted audit needs proxy \
             mediation",
        );
    }

    if security.image_updates.source == ImageUpdateSource::Proxy && audit != AuditMode::Trusted {
        result.error("imageUpdates.source 'proxy' requires audit.mode 'trusted'");
    }

    if security.image_updates.mode != ImageUpdateMode::Disabled && audit == AuditMode::None {
        result.warn(format!(
            "imageUpdates.mode '{}' with audit.mode 'none': no install data will be available \
             for image updates",
            security.image_updates.mode
        ));
    }

    result
}

/// One error per capability the profile requires but the environment lacks.
#[must_use]
pub fn validate_security_environment(
    security: &SecurityProfile,
    env: &Environment,
) -> ValidationResult {
    let mut result = ValidationResult::default();
    let provided = capabilities(env);

    for cap in required_capabilities(security).difference(&provided) {
        let hint = cap.hint().map(|h| format!(" {h}")).unwrap_or_default();
        result.error(format!(
            "security '{}' requires capability '{cap}', but environment '{}' (mode: {}, driver: \
             {}, network: {}) does not provide it.{hint}",
            security.name, env.name, env.mode, env.driver, env.network.mode
        ));
    }

    result
}

/// Agent requirements that the profile makes unreachable.
#[must_use]
pub fn validate_agent_security(agent: &AgentConfig, security: &SecurityProfile) -> ValidationResult {
    let mut result = ValidationResult::default();
    let login = agent.auth.login_command.trim();

    if !login.is_empty() && security.network.outbound == OutboundPolicy::None {
        result.warn(format!(
            "agent '{}' loginCommand '{login}' requires network access, but security '{}' has \
             network.outbound 'none'. Pre-authenticate before running.",
            agent.name, security.name
        ));
    }

    result
}

/// Full check of a project and the resources it references.
///
/// Runs environment, security, environment x security, and agent x
/// security checks in that order; all of them always run.
#[must_use]
pub fn validate_project(
    project: &Project,
    env: &Environment,
    security: &SecurityProfile,
    agent: &AgentConfig,
) -> ValidationResult {
    let mut result = ValidationResult::default();
    result.merge(validate_environment_internal(env));
    result.merge(validate_security_internal(security));
    result.merge(validate_security_environment(security, env));
    result.merge(validate_agent_security(agent, security));

    if project.directory.trim().is_empty() {
        result.warn("project has no directory set");
    }

    result
}
