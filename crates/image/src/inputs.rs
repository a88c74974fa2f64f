use {
    skua_common::text::merge_unique,
    skua_config::{AgentConfig, Project},
};

/// Old codex preset image, replaced by the lightweight default base.
pub const LEGACY_CODEX_UNIVERSAL_IMAGE: &str = "ghcr.io/openai/codex-universal:latest";

/// Base image for `agent`, falling back to `default_base`.
#[must_use]
pub fn base_image_for_agent(default_base: &str, agent: Option<&AgentConfig>) -> String {
    let Some(agent) = agent else {
        return default_base.to_string();
    };
    let configured = agent.install.base_image.trim();
    if configured.is_empty() {
        return default_base.to_string();
    }
    // The legacy codex preset without its own install data builds fine on
    // the default base.
    if agent.name == "codex"
        && configured == LEGACY_CODEX_UNIVERSAL_IMAGE
        && agent.install.commands.is_empty()
        && agent.install.required_packages.is_empty()
    {
        return default_base.to_string();
    }
    configured.to_string()
}

/// Resolved `FROM` image and extras for one project image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInputs {
    pub base_image: String,
    pub extra_packages: Vec<String>,
    pub extra_commands: Vec<String>,
}

/// Merge global and project image settings.
///
/// The base is the project's `from_image`, else its `base_image`, else the
/// agent's. Extras are global first, then project, deduplicated in order.
#[must_use]
pub fn resolve_project_image_inputs(
    default_base: &str,
    agent: Option<&AgentConfig>,
    project: &Project,
    global_packages: &[String],
    global_commands: &[String],
) -> ImageInputs {
    let image = &project.image;
    let from_image = image.from_image.trim();
    let base_image = image.base_image.trim();
    let base_image = if !from_image.is_empty() {
        from_image.to_string()
    } else if !base_image.is_empty() {
        base_image.to_string()
    } else {
        base_image_for_agent(default_base, agent)
    };

    ImageInputs {
        base_image,
        extra_packages: merge_unique(global_packages.iter().chain(&image.extra_packages)),
        extra_commands: merge_unique(global_commands.iter().chain(&image.extra_commands)),
    }
}
