//! Capability tokens: what an Environment provides and what a
//! SecurityProfile requires from it.
//!
//! Both sides are derived from current field values on every call and
//! never stored on the resources themselves.

use std::{collections::BTreeSet, str::FromStr};

use serde::{Serialize, Serializer};

use crate::{
    error::Error,
    schema::{
        AuditMode, CleanupPolicy, Environment, EnvironmentMode, ImageUpdateSource, InstallMode,
        NetworkMode, OutboundPolicy, SecurityProfile,
    },
};

/// A guarantee an Environment can provide.
///
/// Ordering follows declaration order, so a `BTreeSet<Capability>` always
/// iterates the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    NetworkInternet,
    NetworkIsolation,
    NetworkInternal,
    Sidecar,
    TrustedProxy,
    TrustedLog,
    TrustedMcp,
    ContainerSudo,
    ContainerNoSudo,
    IsolationGvisor,
    AuditDockerDiff,
}

pub type CapabilitySet = BTreeSet<Capability>;

impl Capability {
    pub const ALL: [Self; 11] = [
        Self::NetworkInternet,
        Self::NetworkIsolation,
        Self::NetworkInternal,
        Self::Sidecar,
        Self::TrustedProxy,
        Self::TrustedLog,
        Self::TrustedMcp,
        Self::ContainerSudo,
        Self::ContainerNoSudo,
        Self::IsolationGvisor,
        Self::AuditDockerDiff,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkInternet => "network.internet",
            Self::NetworkIsolation => "network.isolation",
            Self::NetworkInternal => "network.internal",
            Self::Sidecar => "sidecar",
            Self::TrustedProxy => "trusted.proxy",
            Self::TrustedLog => "trusted.log",
            Self::TrustedMcp => "trusted.mcp",
            Self::ContainerSudo => "container.sudo",
            Self::ContainerNoSudo => "container.no-sudo",
            Self::IsolationGvisor => "isolation.gvisor",
            Self::AuditDockerDiff => "audit.docker-diff",
        }
    }

    /// How to change an Environment so it provides this capability.
    #[must_use]
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Self::TrustedProxy | Self::TrustedLog | Self::Sidecar => {
                Some("Switch to mode 'managed' (requires driver 'compose' or 'kubernetes').")
            },
            Self::TrustedMcp => Some("Switch to mode 'managed' for trusted MCP endpoints."),
            Self::NetworkInternet => Some("Change network.mode to 'bridge' or 'host'."),
            Self::NetworkIsolation => {
                Some("Change network.mode to 'bridge', 'internal', or 'none'.")
            },
            Self::NetworkInternal => Some("Change network.mode to 'internal' or 'none'."),
            Self::IsolationGvisor => {
                Some("Set docker.container_runtime (e.g. 'runsc') on a docker or compose driver.")
            },
            Self::AuditDockerDiff => {
                Some("Set cleanup to 'persistent' (non-ephemeral containers).")
            },
            Self::ContainerSudo | Self::ContainerNoSudo => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cap| cap.as_str() == s)
            .ok_or_else(|| Error::Message(format!("unknown capability: {s}")))
    }
}

/// Capabilities an Environment provides.
#[must_use]
pub fn capabilities(env: &Environment) -> CapabilitySet {
    let mut caps = CapabilitySet::new();

    match env.network.mode {
        NetworkMode::Bridge => {
            caps.insert(Capability::NetworkInternet);
            caps.insert(Capability::NetworkIsolation);
        },
        NetworkMode::Internal | NetworkMode::None => {
            caps.insert(Capability::NetworkIsolation);
            caps.insert(Capability::NetworkInternal);
        },
        NetworkMode::Host => {
            caps.insert(Capability::NetworkInternet);
        },
    }

    if env.mode == EnvironmentMode::Managed {
        caps.extend([
            Capability::Sidecar,
            Capability::TrustedProxy,
            Capability::TrustedLog,
            Capability::TrustedMcp,
        ]);
    }

    // Sudo is decided when the image is built, not by the environment.
    caps.insert(Capability::ContainerSudo);
    caps.insert(Capability::ContainerNoSudo);

    if env.driver.is_docker_based() {
        if env.container_runtime().is_some() {
            caps.insert(Capability::IsolationGvisor);
        }
        if env.cleanup() == Some(CleanupPolicy::Persistent) {
            caps.insert(Capability::AuditDockerDiff);
        }
    }

    caps
}

/// Capabilities a SecurityProfile needs from its Environment.
#[must_use]
pub fn required_capabilities(security: &SecurityProfile) -> CapabilitySet {
    let mut caps = CapabilitySet::new();

    match security.network.outbound {
        OutboundPolicy::Unrestricted => {
            caps.insert(Capability::NetworkInternet);
        },
        OutboundPolicy::None => {
            caps.insert(Capability::NetworkIsolation);
        },
        OutboundPolicy::Proxy => {
            caps.insert(Capability::TrustedProxy);
            caps.insert(Capability::NetworkInternal);
        },
    }

    if security.audit.mode == AuditMode::Trusted {
        caps.insert(Capability::TrustedLog);
    }
    if security.install.mode == InstallMode::Verified {
        caps.insert(Capability::TrustedProxy);
    }
    if security.image_updates.source == ImageUpdateSource::Proxy {
        caps.insert(Capability::TrustedLog);
    }

    caps
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::Driver, rstest::rstest};

    use Capability::*;

    fn env(mode: EnvironmentMode, driver: Driver, network: NetworkMode) -> Environment {
        let mut env = Environment {
            mode,
            driver,
            ..Environment::default()
        };
        env.network.mode = network;
        env
    }

    #[rstest]
    #[case(NetworkMode::Bridge, &[NetworkInternet, NetworkIsolation])]
    #[case(NetworkMode::Internal, &[NetworkIsolation, NetworkInternal])]
    #[case(NetworkMode::None, &[NetworkIsolation, NetworkInternal])]
    #[case(NetworkMode::Host, &[NetworkInternet])]
    fn network_mode_capabilities(#[case] network: NetworkMode, #[case] expected: &[Capability]) {
        let caps = capabilities(&env(EnvironmentMode::Unmanaged, Driver::Docker, network));
        let mut want: CapabilitySet = expected.iter().copied().collect();
        want.insert(ContainerSudo);
        want.insert(ContainerNoSudo);
        assert_eq!(caps, want);
    }

    #[test]
    fn managed_mode_adds_sidecar_capabilities() {
        let caps = capabilities(&env(
            EnvironmentMode::Managed,
            Driver::Compose,
            NetworkMode::Internal,
        ));
        for cap in [Sidecar, TrustedProxy, TrustedLog, TrustedMcp] {
            assert!(caps.contains(&cap), "missing {cap}");
        }
    }

    #[rstest]
    #[case(Driver::Docker, "runsc", true)]
    #[case(Driver::Compose, "kata-runtime", true)]
    #[case(Driver::Kubernetes, "runsc", false)]
    #[case(Driver::Docker, "", false)]
    fn container_runtime_yields_gvisor(
        #[case] driver: Driver,
        #[case] runtime: &str,
        #[case] expected: bool,
    ) {
        let mut e = env(EnvironmentMode::Unmanaged, driver, NetworkMode::Bridge);
        e.docker.container_runtime = runtime.into();
        assert_eq!(capabilities(&e).contains(&IsolationGvisor), expected);
    }

    #[test]
    fn persistent_cleanup_enables_docker_diff() {
        let mut e = env(EnvironmentMode::Unmanaged, Driver::Compose, NetworkMode::Bridge);
        assert!(!capabilities(&e).contains(&AuditDockerDiff));
        e.compose.cleanup = CleanupPolicy::Persistent;
        assert!(capabilities(&e).contains(&AuditDockerDiff));
        e.driver = Driver::Kubernetes;
        assert!(!capabilities(&e).contains(&AuditDockerDiff));
    }

    #[rstest]
    #[case(OutboundPolicy::Unrestricted, &[NetworkInternet])]
    #[case(OutboundPolicy::None, &[NetworkIsolation])]
    #[case(OutboundPolicy::Proxy, &[TrustedProxy, NetworkInternal])]
    fn outbound_requirements(#[case] outbound: OutboundPolicy, #[case] expected: &[Capability]) {
        let mut sec = SecurityProfile::default();
        sec.network.outbound = outbound;
        let want: CapabilitySet = expected.iter().copied().collect();
        assert_eq!(required_capabilities(&sec), want);
    }

    #[test]
    fn audit_install_and_updates_requirements() {
        let mut sec = SecurityProfile::default();
        sec.network.outbound = OutboundPolicy::Proxy;
        sec.audit.mode = AuditMode::Trusted;
        sec.install.mode = InstallMode::Verified;
        sec.image_updates.source = ImageUpdateSource::Proxy;
        let want: CapabilitySet = [TrustedProxy, NetworkInternal, TrustedLog]
            .into_iter()
            .collect();
        assert_eq!(required_capabilities(&sec), want);
    }

    #[test]
    fn dotted_names_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(cap.to_string().parse::<Capability>().unwrap(), cap);
        }
        assert!("network.wifi".parse::<Capability>().is_err());
    }

    #[test]
    fn hints_cover_every_derivable_capability() {
        for cap in Capability::ALL {
            if !matches!(cap, ContainerSudo | ContainerNoSudo) {
                assert!(cap.hint().is_some(), "{cap} has no hint");
            }
        }
    }

    #[test]
    fn serializes_as_dotted_name() {
        assert_eq!(
            serde_json::to_value(TrustedProxy).unwrap(),
            serde_json::json!("trusted.proxy")
        );
    }
}
