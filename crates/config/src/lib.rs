//! Resource model, capability validation, and on-disk resource store.
//!
//! Resources (Environment, SecurityProfile, AgentConfig, Credential,
//! Project) are YAML documents under `~/.config/skua/<kind-dir>/`.
//! The global defaults file is `global.{yaml,yml,toml,json}`.

pub mod capabilities;
pub mod error;
pub mod loader;
pub mod request;
pub mod resource;
pub mod schema;
pub mod validate;

pub use {
    capabilities::{Capability, CapabilitySet, capabilities, required_capabilities},
    error::{Error, Result},
    loader::{ConfigStore, config_dir, validate_name},
    request::{ImageRequest, ensure_adapt_workspace, load_image_request, write_applied_image_request},
    resource::{NamedResource, Resource, ResourceKind},
    schema::{
        AgentConfig, Credential, Environment, GlobalConfig, Project, ProjectImageSpec,
        SecurityProfile,
    },
    validate::{
        Severity, ValidationResult, validate_agent_security, validate_environment_internal,
        validate_project, validate_security_environment, validate_security_internal,
    },
};
