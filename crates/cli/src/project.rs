//! Loading a project together with the resources it references.

use {
    anyhow::{Context, Result},
    skua_config::{AgentConfig, ConfigStore, Environment, GlobalConfig, Project, SecurityProfile},
    skua_image::{
        BuildAssets, BuildIdentity, BuildPlan, image_name_for_project,
        resolve_project_image_inputs,
    },
};

/// A resolved project and its environment, security profile and agent.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub project: Project,
    pub environment: Environment,
    pub security: SecurityProfile,
    pub agent: AgentConfig,
}

impl ProjectContext {
    /// Resolve `name` against global defaults and load every referenced
    /// resource. A missing project or resource is an error.
    pub fn load(store: &ConfigStore, name: &str) -> Result<Self> {
        let project = store
            .resolve_project(name)?
            .with_context(|| format!("project '{name}' not found"))?;
        let environment = store
            .require::<Environment>(&project.environment)
            .with_context(|| format!("project '{name}' references a missing environment"))?;
        let security = store
            .require::<SecurityProfile>(&project.security)
            .with_context(|| format!("project '{name}' references a missing security profile"))?;
        let agent = store
            .require::<AgentConfig>(&project.agent)
            .with_context(|| format!("project '{name}' references a missing agent"))?;
        Ok(Self {
            project,
            environment,
            security,
            agent,
        })
    }

    pub fn image_tag(&self, global: &GlobalConfig) -> String {
        image_name_for_project(&global.image_name, &self.project)
    }

    pub fn build_plan(
        &self,
        global: &GlobalConfig,
        assets: BuildAssets,
        identity: BuildIdentity,
    ) -> BuildPlan {
        let inputs = resolve_project_image_inputs(
            &global.base_image,
            Some(&self.agent),
            &self.project,
            &global.image.extra_packages,
            &global.image.extra_commands,
        );
        BuildPlan::new(
            self.image_tag(global),
            std::slice::from_ref(&self.agent),
            &self.security,
            &inputs,
            assets,
            identity,
        )
    }
}

/// Store from `--config-dir`, or the default location.
pub fn open_store(config_dir: Option<&std::path::Path>) -> Result<ConfigStore> {
    match config_dir {
        Some(dir) => Ok(ConfigStore::new(dir)),
        None => Ok(ConfigStore::discover()?),
    }
}

/// Entrypoint and agent settings defaults for image builds.
pub fn load_build_assets(store: &ConfigStore, global: &GlobalConfig) -> Result<BuildAssets> {
    let container_dir = store.container_dir(global);
    if container_dir.is_none() {
        tracing::warn!("no container directory with entrypoint.sh found");
    }
    let defaults_dir = directories::BaseDirs::new().map(|d| d.home_dir().join(".claude"));
    Ok(BuildAssets::load(
        container_dir.as_deref(),
        defaults_dir.as_deref(),
    )?)
}


#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, test_support::seeded_store};

    #[test]
    fn loads_project_with_global_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let ctx = ProjectContext::load(&store, "web").unwrap();
        assert_eq!(ctx.environment.name, "local-docker");
        assert_eq!(ctx.security.name, "open");
        assert_eq!(ctx.agent.name, "claude");
        assert_eq!(ctx.image_tag(&GlobalConfig::default()), "skua-base-claude");
    }

    #[test]
    fn missing_reference_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let mut project = store.load_project("web").unwrap().unwrap();
        project.security = "locked".into();
        store.save_resource(&project.into()).unwrap();

        let err = ProjectContext::load(&store, "web").unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("missing security profile"), "{chain}");
        assert!(chain.contains("'locked' not found"), "{chain}");
    }

    #[test]
    fn missing_project_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let err = ProjectContext::load(&store, "nope").unwrap_err();
        assert_eq!(err.to_string(), "project 'nope' not found");
    }
}
