//! Image tags per agent and per customized project.

use {
    skua_common::text::sanitize_component,
    skua_config::{
        Project,
        schema::{DEFAULT_AGENT, DEFAULT_IMAGE_NAME},
    },
};

/// Split `image` into repository and `:tag` suffix.
///
/// The last `:` only starts a tag when it comes after the last `/`, so a
/// registry `host:port` stays part of the repository.
#[must_use]
pub fn split_tag(image: &str) -> (&str, &str) {
    match (image.rfind(':'), image.rfind('/')) {
        (Some(colon), Some(slash)) if colon > slash => image.split_at(colon),
        (Some(colon), None) => image.split_at(colon),
        _ => (image, ""),
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() { default } else { value }
}

/// `<repo>-<agent>[:tag]`. Idempotent when the repository already ends
/// with the agent suffix.
#[must_use]
pub fn image_name_for_agent(base_name: &str, agent: &str) -> String {
    let base = or_default(base_name, DEFAULT_IMAGE_NAME);
    let agent = or_default(agent, DEFAULT_AGENT);
    let (repo, tag) = split_tag(base);
    let suffix = format!("-{agent}");
    if repo.ends_with(&suffix) {
        return base.to_string();
    }
    format!("{repo}{suffix}{tag}")
}

/// The agent image when the project has no image customization, otherwise
/// `<repo>-<agent>-<project>-v<version>[:tag]` with `version >= 1`.
#[must_use]
pub fn image_name_for_project(base_name: &str, project: &Project) -> String {
    let agent_image = image_name_for_agent(base_name, &project.agent);
    if !project.image.has_customizations() {
        return agent_image;
    }
    let (repo, tag) = split_tag(&agent_image);
    let project_part = sanitize_component(&project.name);
    let version = project.image.version.max(1);
    format!("{repo}-{project_part}-v{version}{tag}")
}
