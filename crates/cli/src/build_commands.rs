use std::collections::BTreeMap;

use {
    anyhow::Result,
    skua_config::{ConfigStore, NamedResource, Project},
    skua_image::{BuildPlan, DockerCli, EnsureOutcome, ImageCache, current_identity},
    tracing::{info, warn},
};

use crate::{
    project::{ProjectContext, load_build_assets},
    validate_commands::{BOLD, GREEN, RED, RESET, YELLOW, print_diagnostics, validate_context},
};

/// Build plans for every valid project, one per distinct image tag. The
/// first project (in name order) that maps to a tag wins. Projects that
/// cannot be loaded or fail validation are skipped and counted.
fn collect_plans(store: &ConfigStore) -> Result<(BTreeMap<String, BuildPlan>, usize)> {
    let global = store.load_global()?;
    let assets = load_build_assets(store, &global)?;
    let identity = current_identity();

    let mut plans = BTreeMap::new();
    let mut skipped = 0;
    for name in store.list_resources(Project::KIND)? {
        let ctx = match ProjectContext::load(store, &name) {
            Ok(ctx) => ctx,
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(project = %name, error = %reason, "skipping project");
                eprintln!("  {BOLD}{YELLOW}skipped{RESET} {name}: {reason}");
                skipped += 1;
                continue;
            },
        };
        let validation = validate_context(&ctx);
        if !validation.is_valid() {
            warn!(project = %name, errors = validation.errors.len(), "skipping invalid project");
            eprintln!("  {BOLD}{YELLOW}skipped{RESET} {name}: configuration is invalid");
            print_diagnostics(&validation);
            skipped += 1;
            continue;
        }
        let plan = ctx.build_plan(&global, assets.clone(), identity);
        plans.entry(plan.tag.clone()).or_insert(plan);
    }
    Ok((plans, skipped))
}

pub async fn handle_build(store: &ConfigStore, force: bool) -> Result<()> {
    let (plans, skipped) = collect_plans(store)?;
    if plans.is_empty() {
        println!("No projects configured, nothing to build.");
        return Ok(());
    }

    let cache = ImageCache::new(DockerCli::default());
    let mut failed = skipped;
    for plan in plans.values() {
        match cache.ensure(plan, force).await {
            Ok(EnsureOutcome::Reused) => println!("Image up to date: {}", plan.tag),
            Ok(EnsureOutcome::Built) => println!("{GREEN}Image built:{RESET} {}", plan.tag),
            Ok(EnsureOutcome::Failed(outcome)) => {
                failed += 1;
                eprintln!("  {BOLD}{RED}error{RESET} build failed for {}", plan.tag);
                for line in &outcome.tail {
                    eprintln!("    {line}");
                }
            },
            Err(e) => {
                failed += 1;
                eprintln!("  {BOLD}{RED}error{RESET} {}: {e}", plan.tag);
            },
        }
    }

    info!(images = plans.len(), failed, "build finished");
    if failed > 0 {
        eprintln!("{failed} image(s) failed");
        std::process::exit(1);
    }
    Ok(())
}

pub async fn handle_image(store: &ConfigStore, name: &str) -> Result<()> {
    let ctx = ProjectContext::load(store, name)?;
    let global = store.load_global()?;
    let assets = load_build_assets(store, &global)?;
    let plan = ctx.build_plan(&global, assets, current_identity());

    let cache = ImageCache::new(DockerCli::default());
    let status = cache.status(&plan).await?;
    println!("{} {status}", plan.tag);
    Ok(())
}
