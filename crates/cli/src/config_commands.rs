use std::path::PathBuf;

use {
    anyhow::Result,
    clap::Subcommand,
    skua_config::{ConfigStore, NamedResource, Project, ValidationResult},
};

use crate::{
    project::ProjectContext,
    validate_commands::{BOLD, RED, RESET, print_diagnostics, validate_context},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate every project against the resources it references.
    Check,
    /// Create the config directory layout and write the global config.
    Init {
        /// Directory of preset resources to copy in.
        #[arg(long)]
        presets: Option<PathBuf>,
        /// Replace resources that already exist.
        #[arg(long)]
        overwrite: bool,
    },
    /// Print the config directory.
    Path,
}

pub fn handle_config(store: &ConfigStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check => check(store),
        ConfigAction::Init { presets, overwrite } => init(store, presets, overwrite),
        ConfigAction::Path => {
            println!("{}", store.config_dir().display());
            Ok(())
        },
    }
}

/// Per-project results; a project whose resources cannot be loaded counts
/// as one error.
fn check_all(store: &ConfigStore) -> Result<Vec<(String, ValidationResult)>> {
    let mut out = Vec::new();
    for name in store.list_resources(Project::KIND)? {
        let result = match ProjectContext::load(store, &name) {
            Ok(ctx) => validate_context(&ctx),
            Err(e) => {
                let mut result = ValidationResult::default();
                result.error(format!("{e:#}"));
                result
            },
        };
        out.push((name, result));
    }
    Ok(out)
}

fn check(store: &ConfigStore) -> Result<()> {
    eprintln!("Checking {}\n", store.config_dir().display());

    let results = check_all(store)?;
    if results.is_empty() {
        eprintln!("No projects found.");
        return Ok(());
    }

    let mut errors = 0;
    let mut warnings = 0;
    for (name, result) in &results {
        errors += result.errors.len();
        warnings += result.warnings.len();
        if result.errors.is_empty() && result.warnings.is_empty() {
            continue;
        }
        eprintln!("{BOLD}{name}{RESET}");
        print_diagnostics(result);
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found in {} project(s).", results.len());
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        let invalid = results.iter().filter(|(_, r)| !r.is_valid()).count();
        eprintln!("{BOLD}{RED}{invalid} project(s) invalid{RESET}");
        std::process::exit(1);
    }

    Ok(())
}

fn init(store: &ConfigStore, presets: Option<PathBuf>, overwrite: bool) -> Result<()> {
    store.ensure_dirs()?;
    if !store.is_initialized() {
        let path = store.save_global(&store.load_global()?)?;
        println!("Wrote {}", path.display());
    }
    if let Some(dir) = presets {
        let count = store.install_presets(&dir, overwrite)?;
        println!("Installed {count} preset resource(s) from {}", dir.display());
    }
    println!("Config directory: {}", store.config_dir().display());
    Ok(())
}
