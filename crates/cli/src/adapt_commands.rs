use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result, bail},
    clap::Args,
    skua_config::{
        ConfigStore, ImageRequest, Project, ensure_adapt_workspace,
        load_image_request,
        request::{adapt_dir, image_request_path},
        write_applied_image_request,
    },
    tracing::info,
};

use crate::{
    project::ProjectContext,
    validate_commands::{print_diagnostics, validate_context},
};

#[derive(Debug, Default, Args)]
pub struct AdaptArgs {
    /// Project name.
    pub project: String,
    /// Apply the existing `.skua/image-request.yaml` without preparing the
    /// adapt workspace.
    #[arg(long)]
    pub apply_only: bool,
    /// Drop every image customization from the project.
    #[arg(long, conflicts_with_all = ["package", "command", "base_image", "from_image"])]
    pub clear: bool,
    /// Extra apt package (repeatable).
    #[arg(long = "package", value_name = "PACKAGE")]
    pub package: Vec<String>,
    /// Extra build command (repeatable).
    #[arg(long = "command", value_name = "COMMAND")]
    pub command: Vec<String>,
    /// Base image for the agent layers.
    #[arg(long)]
    pub base_image: Option<String>,
    /// Image to build on instead of the base image.
    #[arg(long)]
    pub from_image: Option<String>,
}

impl AdaptArgs {
    fn has_overrides(&self) -> bool {
        !self.package.is_empty()
            || !self.command.is_empty()
            || self.base_image.is_some()
            || self.from_image.is_some()
    }

    /// Request built from command-line flags. Fields not given keep the
    /// project's current values, packages and commands are appended.
    fn to_request(&self, project: &Project) -> ImageRequest {
        let image = &project.image;
        ImageRequest {
            summary: "requested on the command line".into(),
            base_image: self
                .base_image
                .clone()
                .unwrap_or_else(|| image.base_image.clone()),
            from_image: self
                .from_image
                .clone()
                .unwrap_or_else(|| image.from_image.clone()),
            packages: image
                .extra_packages
                .iter()
                .chain(&self.package)
                .cloned()
                .collect(),
            commands: image
                .extra_commands
                .iter()
                .chain(&self.command)
                .cloned()
                .collect(),
            ..ImageRequest::default()
        }
        .normalize()
    }
}

fn project_dir(project: &Project) -> Option<PathBuf> {
    let dir = project.directory.trim();
    (!dir.is_empty()).then(|| PathBuf::from(dir))
}

/// Load the request the in-container agent wrote. `None` when it has
/// nothing to apply.
fn request_from_workspace(
    dir: &Path,
    project: &Project,
    agent: &str,
    apply_only: bool,
) -> Result<Option<ImageRequest>> {
    if !apply_only {
        let (guide, request) = ensure_adapt_workspace(dir, &project.name, agent)?;
        println!("Adapt guide:   {}", guide.display());
        println!("Image request: {}", request.display());
    }
    let path = image_request_path(dir);
    let request = load_image_request(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if !request.has_updates() {
        println!("No image updates requested in {}.", path.display());
        if !apply_only {
            println!("Fill it in, then run `skua adapt {} --apply-only`.", project.name);
        }
        return Ok(None);
    }
    Ok(Some(request))
}

pub fn handle_adapt(store: &ConfigStore, args: &AdaptArgs) -> Result<()> {
    let name = args.project.as_str();
    let mut project = store
        .load::<Project>(name)?
        .with_context(|| format!("project '{name}' not found"))?;
    let dir = project_dir(&project);

    let ctx = ProjectContext::load(store, name)?;
    let validation = validate_context(&ctx);
    if !validation.is_valid() {
        print_diagnostics(&validation);
        bail!(
            "project '{name}' has {} configuration error(s); fix them before adapting its image",
            validation.errors.len()
        );
    }

    let request = if args.clear {
        ImageRequest::default()
    } else if args.has_overrides() {
        args.to_request(&project)
    } else {
        let Some(dir) = dir.as_deref() else {
            bail!(
                "project '{name}' has no directory; pass --package, --command, --base-image or \
                 --from-image instead"
            );
        };
        match request_from_workspace(dir, &project, &ctx.agent.name, args.apply_only)? {
            Some(request) => request,
            None => return Ok(()),
        }
    };

    if !request.apply_to_project(&mut project) {
        println!(
            "Image for '{name}' already matches the request (v{}).",
            project.image.version
        );
        return Ok(());
    }
    let version = project.image.version;
    store.save_resource(&project.into())?;
    info!(project = %name, version, "project image updated");

    if let Some(dir) = dir.filter(|d| d.is_dir()) {
        std::fs::create_dir_all(adapt_dir(&dir))?;
        write_applied_image_request(&image_request_path(&dir), &request, version)?;
    }
    println!("Project '{name}' image is now v{version}. Run `skua build` to rebuild it.");
    Ok(())
}
