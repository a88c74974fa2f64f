//! Per-project image requests.
//!
//! An agent running inside the project container fills in
//! `.skua/image-request.yaml`; the host then folds the request into the
//! project's image customization and bumps its version.

use std::path::{Path, PathBuf};

use {
    serde::{Deserialize, Serialize},
    serde_yaml::{Mapping, Value},
    skua_common::text::merge_unique,
    tracing::debug,
};

use crate::{error::Result, schema::Project};

pub const ADAPT_DIRNAME: &str = ".skua";
pub const ADAPT_GUIDE_NAME: &str = "ADAPT.md";
pub const IMAGE_REQUEST_NAME: &str = "image-request.yaml";

const STATUS_DRAFT: &str = "draft";
const STATUS_APPLIED: &str = "applied";

/// Normalized contents of an image request file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub schema_version: u32,
    pub status: String,
    pub summary: String,
    pub base_image: String,
    pub from_image: String,
    pub packages: Vec<String>,
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_version: Option<u32>,
}

impl Default for ImageRequest {
    fn default() -> Self {
        Self {
            schema_version: 1,
            status: STATUS_DRAFT.into(),
            summary: String::new(),
            base_image: String::new(),
            from_image: String::new(),
            packages: Vec::new(),
            commands: Vec::new(),
            applied_version: None,
        }
    }
}

impl ImageRequest {
    /// Build a request from a loosely shaped YAML value.
    ///
    /// Accepts camelCase and snake_case keys plus the `extraPackages` /
    /// `extraCommands` spellings; lists from every spelling are merged.
    /// Anything that is not a mapping reads as an empty draft.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let empty = Mapping::new();
        let map = value.as_mapping().unwrap_or(&empty);

        let schema_version = map
            .get("schemaVersion")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(1);
        let status = pick(map, &["status"]).to_lowercase();

        Self {
            schema_version,
            status: if status.is_empty() {
                STATUS_DRAFT.into()
            } else {
                status
            },
            summary: pick(map, &["summary"]),
            base_image: pick(map, &["baseImage", "base_image"]),
            from_image: pick(map, &["fromImage", "from_image"]),
            packages: list(map, &["packages", "extraPackages", "extra_packages"]),
            commands: list(map, &["commands", "extraCommands", "extra_commands"]),
            applied_version: map
                .get("appliedVersion")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok()),
        }
    }

    /// Trim strings and dedup lists, keeping first-occurrence order.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.status = self.status.trim().to_lowercase();
        if self.status.is_empty() {
            self.status = STATUS_DRAFT.into();
        }
        self.summary = self.summary.trim().to_string();
        self.base_image = self.base_image.trim().to_string();
        self.from_image = self.from_image.trim().to_string();
        self.packages = merge_unique(&self.packages);
        self.commands = merge_unique(&self.commands);
        self
    }

    /// Whether the request carries any image customization.
    #[must_use]
    pub fn has_updates(&self) -> bool {
        !self.base_image.trim().is_empty()
            || !self.from_image.trim().is_empty()
            || self.packages.iter().any(|p| !p.trim().is_empty())
            || self.commands.iter().any(|c| !c.trim().is_empty())
    }

    /// Replace the project's image customization with this request.
    ///
    /// Returns `false` and leaves the project untouched when nothing would
    /// change; otherwise bumps `image.version` by exactly one.
    pub fn apply_to_project(&self, project: &mut Project) -> bool {
        let req = self.clone().normalize();
        let image = &mut project.image;
        let unchanged = image.base_image.trim() == req.base_image
            && image.from_image.trim() == req.from_image
            && image.extra_packages == req.packages
            && image.extra_commands == req.commands;
        if unchanged {
            return false;
        }

        image.base_image = req.base_image;
        image.from_image = req.from_image;
        image.extra_packages = req.packages;
        image.extra_commands = req.commands;
        image.version = image.version.saturating_add(1);
        debug!(project = %project.name, version = image.version, "applied image request");
        true
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn pick(map: &Mapping, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(scalar)
        .unwrap_or_default()
}

fn list(map: &Mapping, keys: &[&str]) -> Vec<String> {
    let items = keys
        .iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_sequence))
        .flatten()
        .filter_map(scalar);
    merge_unique(items)
}

pub fn adapt_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(ADAPT_DIRNAME)
}

pub fn image_request_path(project_dir: &Path) -> PathBuf {
    adapt_dir(project_dir).join(IMAGE_REQUEST_NAME)
}

pub fn adapt_guide_path(project_dir: &Path) -> PathBuf {
    adapt_dir(project_dir).join(ADAPT_GUIDE_NAME)
}

/// Read and normalize a request file. A missing or empty file is an
/// empty draft.
pub fn load_image_request(path: &Path) -> Result<ImageRequest> {
    if !path.exists() {
        return Ok(ImageRequest::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let value: Value = if raw.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(&raw)?
    };
    Ok(ImageRequest::from_value(&value))
}

/// Rewrite the request file with status `applied` and the project image
/// version it produced.
pub fn write_applied_image_request(
    path: &Path,
    request: &ImageRequest,
    version: u32,
) -> Result<()> {
    let mut req = request.clone().normalize();
    req.status = STATUS_APPLIED.into();
    req.applied_version = Some(version);
    std::fs::write(path, serde_yaml::to_string(&req)?)?;
    Ok(())
}

/// Create `.skua/ADAPT.md` and `.skua/image-request.yaml` when missing and
/// hide both from git. Returns `(guide, request)` paths.
pub fn ensure_adapt_workspace(
    project_dir: &Path,
    project: &str,
    agent: &str,
) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(adapt_dir(project_dir))?;

    let guide = adapt_guide_path(project_dir);
    if !guide.exists() {
        std::fs::write(&guide, adapt_guide_text(project, agent))?;
    }
    let request = image_request_path(project_dir);
    if !request.exists() {
        std::fs::write(&request, IMAGE_REQUEST_TEMPLATE)?;
    }

    ensure_git_exclude(project_dir, &[
        format!("{ADAPT_DIRNAME}/{IMAGE_REQUEST_NAME}"),
        format!("{ADAPT_DIRNAME}/{ADAPT_GUIDE_NAME}"),
    ])?;
    Ok((guide, request))
}

fn ensure_git_exclude(project_dir: &Path, patterns: &[String]) -> Result<()> {
    let git_dir = project_dir.join(".git");
    if !git_dir.is_dir() {
        return Ok(());
    }
    let exclude = git_dir.join("info").join("exclude");
    if let Some(parent) = exclude.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let existing = std::fs::read_to_string(&exclude).unwrap_or_default();
    let present: Vec<&str> = existing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let missing: Vec<&String> = patterns
        .iter()
        .filter(|p| !present.contains(&p.as_str()))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut out = existing.clone();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    for pattern in missing {
        out.push_str(pattern);
        out.push('\n');
    }
    std::fs::write(&exclude, out)?;
    Ok(())
}

fn adapt_guide_text(project: &str, agent: &str) -> String {
    format!(
        "# Skua Image Adapt ({project})

Use this workflow to let `{agent}` suggest container image changes without writing a Dockerfile.

1. Run the project container: `skua run {project}`
2. Ask `{agent}` to inspect the repo and update:
   - `{ADAPT_DIRNAME}/{IMAGE_REQUEST_NAME}`
3. On the host, apply that request:
   - `skua adapt {project}`
4. Start again with the updated image config:
   - `skua run {project}`

Request rules:
- Prefer `packages` for apt package names.
- Use `baseImage` to switch to a different base image.
- Use `fromImage` to adapt an existing working image as the parent image.
- Use `commands` for additional setup commands.
- Do not write a Dockerfile directly; only update `{ADAPT_DIRNAME}/{IMAGE_REQUEST_NAME}`.
"
    )
}

const IMAGE_REQUEST_TEMPLATE: &str = r#"# Skua image request (filled by your agent and applied by `skua adapt`)
schemaVersion: 1
status: draft
summary: ""

# Option A: switch to a different base image for the generated Dockerfile.
baseImage: ""

# Option B: adapt an existing image (used as the Dockerfile FROM image).
fromImage: ""

# Apt package names to install.
packages: []

# Additional setup commands (RUN lines).
commands: []
"#;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn request(yaml: &str) -> ImageRequest {
        ImageRequest::from_value(&serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn template_is_an_empty_draft() {
        let req = request(IMAGE_REQUEST_TEMPLATE);
        assert_eq!(req, ImageRequest::default());
        assert!(!req.has_updates());
    }

    #[test]
    fn accepts_every_key_spelling() {
        let req = request(
            r#"
status: READY
base_image: " ubuntu:24.04 "
packages: [git]
extraPackages: [jq, git]
extra_commands: ["pip install uv"]
"#,
        );
        assert_eq!(req.status, "ready");
        assert_eq!(req.base_image, "ubuntu:24.04");
        assert_eq!(req.packages, vec!["git", "jq"]);
        assert_eq!(req.commands, vec!["pip install uv"]);
        assert!(req.has_updates());
    }

    #[test]
    fn non_mapping_is_empty() {
        assert_eq!(request("- a\n- b\n"), ImageRequest::default());
    }

    #[test]
    fn apply_bumps_version_only_on_change() {
        let mut project = Project::default();
        let req = request("packages: [libpq-dev]\n");

        assert!(req.apply_to_project(&mut project));
        assert_eq!(project.image.version, 1);
        assert_eq!(project.image.extra_packages, vec!["libpq-dev"]);

        assert!(!req.apply_to_project(&mut project));
        assert_eq!(project.image.version, 1);

        let req = request("packages: [libpq-dev]\ncommands: [make deps]\n");
        assert!(req.apply_to_project(&mut project));
        assert_eq!(project.image.version, 2);
    }

    #[test]
    fn clearing_also_bumps_version() {
        let mut project = Project::default();
        project.image.extra_packages = vec!["jq".into()];
        project.image.version = 4;
        assert!(ImageRequest::default().apply_to_project(&mut project));
        assert_eq!(project.image.version, 5);
        assert!(!project.image.has_customizations());
    }

    #[test]
    fn applied_request_records_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(IMAGE_REQUEST_NAME);
        write_applied_image_request(&path, &request("packages: [jq]\n"), 3).unwrap();

        let back = load_image_request(&path).unwrap();
        assert_eq!(back.status, "applied");
        assert_eq!(back.applied_version, Some(3));
        assert_eq!(back.packages, vec!["jq"]);
    }

    #[test]
    fn missing_request_file_is_draft() {
        let dir = tempfile::tempdir().unwrap();
        let req = load_image_request(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(req.status, "draft");
    }

    #[test]
    fn workspace_files_created_once_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();

        let (guide, req) = ensure_adapt_workspace(dir.path(), "web", "codex").unwrap();
        assert!(std::fs::read_to_string(&guide).unwrap().contains("`codex`"));
        std::fs::write(&req, "packages: [jq]\n").unwrap();

        ensure_adapt_workspace(dir.path(), "web", "codex").unwrap();
        assert_eq!(std::fs::read_to_string(&req).unwrap(), "packages: [jq]\n");

        let exclude = std::fs::read_to_string(dir.path().join(".git/info/exclude")).unwrap();
        assert_eq!(exclude.matches(".skua/image-request.yaml").count(), 1);
        assert_eq!(exclude.matches(".skua/ADAPT.md").count(), 1);
    }
}
