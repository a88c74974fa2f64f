use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    error::{Context, Error, Result},
    resource::{NamedResource, Resource, ResourceKind},
    schema::{AgentConfig, Credential, Environment, GlobalConfig, Project, SecurityProfile},
};

/// Global config file names, checked in order.
const GLOBAL_FILENAMES: &[&str] = &["global.yaml", "global.yml", "global.toml", "global.json"];

/// System-wide location of packaged container assets.
const SYSTEM_CONTAINER_DIR: &str = "/usr/lib/skua/container";

/// Returns the user-global config directory (`~/.config/skua/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "skua").map(|d| d.config_dir().to_path_buf())
}

/// Resource files on disk, one YAML document per resource.
///
/// ```text
/// <config_dir>/
/// ├── global.yaml
/// ├── environments/
/// ├── security/
/// ├── agents/
/// ├── credentials/
/// ├── projects/
/// ├── claude-data/    bind-mode persistence for claude
/// └── agent-data/     bind-mode persistence for other agents
/// ```
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Store rooted at `~/.config/skua/`.
    pub fn discover() -> Result<Self> {
        config_dir()
            .map(Self::new)
            .context("could not determine the user config directory")
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        for kind in ResourceKind::ALL {
            std::fs::create_dir_all(self.kind_dir(kind))?;
        }
        Ok(())
    }

    // ── Global config ───────────────────────────────────────────────────

    /// Path of the existing global config file, or `global.yaml`.
    pub fn global_path(&self) -> PathBuf {
        GLOBAL_FILENAMES
            .iter()
            .map(|name| self.config_dir.join(name))
            .find(|p| p.exists())
            .unwrap_or_else(|| self.config_dir.join(GLOBAL_FILENAMES[0]))
    }

    pub fn is_initialized(&self) -> bool {
        GLOBAL_FILENAMES
            .iter()
            .any(|name| self.config_dir.join(name).exists())
    }

    /// Load the global config. A missing file yields the defaults.
    pub fn load_global(&self) -> Result<GlobalConfig> {
        let path = self.global_path();
        if !path.exists() {
            debug!(path = %path.display(), "no global config, using defaults");
            return Ok(GlobalConfig::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        debug!(path = %path.display(), "loading global config");
        parse_config(&raw, &path)
    }

    /// Write the global config in the format of the existing file.
    pub fn save_global(&self, config: &GlobalConfig) -> Result<PathBuf> {
        self.ensure_dirs()?;
        let path = self.global_path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("yaml");
        let raw = match ext {
            "toml" => toml::to_string_pretty(config)?,
            "json" => serde_json::to_string_pretty(config)?,
            _ => serde_yaml::to_string(config)?,
        };
        std::fs::write(&path, raw)?;
        debug!(path = %path.display(), "saved global config");
        Ok(path)
    }

    // ── Resource CRUD ───────────────────────────────────────────────────

    fn kind_dir(&self, kind: ResourceKind) -> PathBuf {
        self.config_dir.join(kind.dir_name())
    }

    fn resource_path(&self, kind: ResourceKind, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.kind_dir(kind).join(format!("{name}.yaml")))
    }

    pub fn save_resource(&self, resource: &Resource) -> Result<PathBuf> {
        self.ensure_dirs()?;
        let path = self.resource_path(resource.kind(), resource.name())?;
        std::fs::write(&path, resource.to_yaml_string()?)?;
        debug!(kind = %resource.kind(), name = resource.name(), "saved resource");
        Ok(path)
    }

    /// Load a resource by kind and name. `Ok(None)` when the file is absent
    /// or empty.
    pub fn load_resource(&self, kind: ResourceKind, name: &str) -> Result<Option<Resource>> {
        let path = self.resource_path(kind, name)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let resource = Resource::from_yaml_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if resource.kind() != kind {
            return Err(Error::Message(format!(
                "{} holds a {} resource, expected {kind}",
                path.display(),
                resource.kind()
            )));
        }
        if resource.name() != name {
            warn!(
                path = %path.display(),
                metadata_name = resource.name(),
                "resource name does not match its file name"
            );
        }
        Ok(Some(resource))
    }

    /// Typed load, e.g. `store.load::<Environment>("local-docker")`.
    pub fn load<R: NamedResource>(&self, name: &str) -> Result<Option<R>> {
        Ok(self
            .load_resource(R::KIND, name)?
            .and_then(R::from_resource))
    }

    /// Like [`Self::load`], but a missing resource is an error.
    pub fn require<R: NamedResource>(&self, name: &str) -> Result<R> {
        self.load(name)?
            .ok_or_else(|| Error::not_found(R::KIND, name))
    }

    pub fn load_environment(&self, name: &str) -> Result<Option<Environment>> {
        self.load(name)
    }

    pub fn load_security(&self, name: &str) -> Result<Option<SecurityProfile>> {
        self.load(name)
    }

    pub fn load_agent(&self, name: &str) -> Result<Option<AgentConfig>> {
        self.load(name)
    }

    pub fn load_credential(&self, name: &str) -> Result<Option<Credential>> {
        self.load(name)
    }

    pub fn load_project(&self, name: &str) -> Result<Option<Project>> {
        self.load(name)
    }

    /// Delete a resource file. Returns whether it existed.
    pub fn delete_resource(&self, kind: ResourceKind, name: &str) -> Result<bool> {
        let path = self.resource_path(kind, name)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        debug!(%kind, name, "deleted resource");
        Ok(true)
    }

    /// Names of every resource of `kind`, sorted.
    pub fn list_resources(&self, kind: ResourceKind) -> Result<Vec<String>> {
        let dir = self.kind_dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Every resource of type `R`, in name order. Unreadable files are
    /// skipped with a warning.
    pub fn load_all<R: NamedResource>(&self) -> Result<Vec<R>> {
        let mut out = Vec::new();
        for name in self.list_resources(R::KIND)? {
            match self.load::<R>(&name) {
                Ok(Some(r)) => out.push(r),
                Ok(None) => {},
                Err(e) => warn!(kind = %R::KIND, %name, error = %e, "skipping resource"),
            }
        }
        Ok(out)
    }

    /// Load a project and fill unset fields from the global config.
    pub fn resolve_project(&self, name: &str) -> Result<Option<Project>> {
        let Some(mut project) = self.load_project(name)? else {
            return Ok(None);
        };
        let global = self.load_global()?;
        fill_blank(&mut project.git.name, &global.git.name);
        fill_blank(&mut project.git.email, &global.git.email);
        fill_blank(&mut project.ssh.private_key, &global.defaults.ssh_key);
        fill_blank(&mut project.environment, &global.defaults.environment);
        fill_blank(&mut project.security, &global.defaults.security);
        fill_blank(&mut project.agent, &global.defaults.agent);
        Ok(Some(project))
    }

    /// Copy shipped preset YAML files into the store. Existing files are
    /// kept unless `overwrite` is set. Returns how many files were written.
    pub fn install_presets(&self, preset_dir: &Path, overwrite: bool) -> Result<usize> {
        self.ensure_dirs()?;
        let mut written = 0;
        for kind in ResourceKind::ALL {
            let src_dir = preset_dir.join(kind.dir_name());
            if !src_dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&src_dir)? {
                let src = entry?.path();
                if src.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    continue;
                }
                let Some(file_name) = src.file_name() else {
                    continue;
                };
                let dest = self.kind_dir(kind).join(file_name);
                if overwrite || !dest.exists() {
                    std::fs::copy(&src, &dest)?;
                    written += 1;
                }
            }
        }
        debug!(preset_dir = %preset_dir.display(), written, "installed presets");
        Ok(written)
    }

    // ── Paths ───────────────────────────────────────────────────────────

    /// Bind-mount persistence directory for a project/agent pair.
    pub fn project_data_dir(&self, project: &str, agent: &str) -> PathBuf {
        if agent.is_empty() || agent == "claude" {
            self.config_dir.join("claude-data").join(project)
        } else {
            self.config_dir.join("agent-data").join(agent).join(project)
        }
    }

    /// Directory holding container build assets (`entrypoint.sh`).
    ///
    /// Checks `toolDir` from the global config, then
    /// `<config_dir>/container`, then the system package location.
    pub fn container_dir(&self, global: &GlobalConfig) -> Option<PathBuf> {
        let candidates = global
            .tool_dir
            .iter()
            .cloned()
            .chain([
                self.config_dir.join("container"),
                PathBuf::from(SYSTEM_CONTAINER_DIR),
            ]);
        for dir in candidates {
            if dir.join("entrypoint.sh").is_file() {
                return Some(dir);
            }
        }
        None
    }
}

fn fill_blank(field: &mut String, fallback: &str) {
    if field.trim().is_empty() {
        *field = fallback.to_string();
    }
}

/// Resource names become file names, so they may not contain separators.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_name(name, "name is empty"));
    }
    if name.starts_with('.') {
        return Err(Error::invalid_name(name, "name may not start with '.'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::invalid_name(
            name,
            "only letters, digits, '-', '_' and '.' are allowed",
        ));
    }
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> Result<GlobalConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("yaml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        // An empty YAML file is a null document.
        "yaml" | "yml" if raw.trim().is_empty() => Ok(GlobalConfig::default()),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}
