//! Kubernetes-style resource envelope and kind dispatch.
//!
//! Every resource file is a single YAML document:
//!
//! ```yaml
//! apiVersion: skua/v1
//! kind: Environment
//! metadata:
//!   name: local-docker
//! spec:
//!   driver: docker
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::{Error, Result},
    schema::{AgentConfig, Credential, Environment, Project, SecurityProfile},
};

pub const API_VERSION: &str = "skua/v1";

/// Closed set of resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Environment,
    SecurityProfile,
    AgentConfig,
    Credential,
    Project,
}

impl ResourceKind {
    pub const ALL: [Self; 5] = [
        Self::Environment,
        Self::SecurityProfile,
        Self::AgentConfig,
        Self::Credential,
        Self::Project,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "Environment",
            Self::SecurityProfile => "SecurityProfile",
            Self::AgentConfig => "AgentConfig",
            Self::Credential => "Credential",
            Self::Project => "Project",
        }
    }

    /// Subdirectory of the config dir holding this kind's files.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Environment => "environments",
            Self::SecurityProfile => "security",
            Self::AgentConfig => "agents",
            Self::Credential => "credentials",
            Self::Project => "projects",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub name: String,
}

/// On-disk shape of a resource file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: serde_yaml::Value,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

/// A resource of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Environment(Environment),
    SecurityProfile(SecurityProfile),
    AgentConfig(AgentConfig),
    Credential(Credential),
    Project(Project),
}

impl Resource {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Environment(_) => ResourceKind::Environment,
            Self::SecurityProfile(_) => ResourceKind::SecurityProfile,
            Self::AgentConfig(_) => ResourceKind::AgentConfig,
            Self::Credential(_) => ResourceKind::Credential,
            Self::Project(_) => ResourceKind::Project,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Environment(r) => &r.name,
            Self::SecurityProfile(r) => &r.name,
            Self::AgentConfig(r) => &r.name,
            Self::Credential(r) => &r.name,
            Self::Project(r) => &r.name,
        }
    }

    /// Reconstruct a typed resource from its envelope.
    pub fn from_document(doc: Document) -> Result<Self> {
        let kind: ResourceKind = doc.kind.parse()?;
        let name = doc.metadata.name;
        // An empty `spec:` parses as null; treat it as all defaults.
        let spec = if doc.spec.is_null() {
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        } else {
            doc.spec
        };
        Ok(match kind {
            ResourceKind::Environment => Self::Environment(named(spec, name)?),
            ResourceKind::SecurityProfile => Self::SecurityProfile(named(spec, name)?),
            ResourceKind::AgentConfig => Self::AgentConfig(named(spec, name)?),
            ResourceKind::Credential => Self::Credential(named(spec, name)?),
            ResourceKind::Project => Self::Project(named(spec, name)?),
        })
    }

    pub fn to_document(&self) -> Result<Document> {
        let spec = match self {
            Self::Environment(r) => serde_yaml::to_value(r)?,
            Self::SecurityProfile(r) => serde_yaml::to_value(r)?,
            Self::AgentConfig(r) => serde_yaml::to_value(r)?,
            Self::Credential(r) => serde_yaml::to_value(r)?,
            Self::Project(r) => serde_yaml::to_value(r)?,
        };
        Ok(Document {
            api_version: API_VERSION.to_string(),
            kind: self.kind().as_str().to_string(),
            metadata: Metadata {
                name: self.name().to_string(),
            },
            spec,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let doc: Document = serde_yaml::from_str(raw)?;
        Self::from_document(doc)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_document()?)?)
    }
}

fn named<T: NamedResource>(spec: serde_yaml::Value, name: String) -> Result<T> {
    let mut resource: T = serde_yaml::from_value(spec)?;
    resource.set_name(name);
    Ok(resource)
}

/// Typed access to one resource kind, so callers can write
/// `store.load::<Environment>("local-docker")`.
pub trait NamedResource: Sized + DeserializeOwned {
    const KIND: ResourceKind;

    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
    fn into_resource(self) -> Resource;
    fn from_resource(resource: Resource) -> Option<Self>;
}

macro_rules! named_resource {
    ($ty:ident) => {
        impl NamedResource for $ty {
            const KIND: ResourceKind = ResourceKind::$ty;

            fn name(&self) -> &str {
                &self.name
            }

            fn set_name(&mut self, name: String) {
                self.name = name;
            }

            fn into_resource(self) -> Resource {
                Resource::$ty(self)
            }

            fn from_resource(resource: Resource) -> Option<Self> {
                match resource {
                    Resource::$ty(r) => Some(r),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Resource {
            fn from(r: $ty) -> Self {
                Resource::$ty(r)
            }
        }
    };
}

named_resource!(Environment);
named_resource!(SecurityProfile);
named_resource!(AgentConfig);
named_resource!(Credential);
named_resource!(Project);
