mod adapt_commands;
mod build_commands;
mod config_commands;
mod project;
mod validate_commands;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "skua",
    version,
    about = "Skua: sandboxed containers for coding agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/skua/).
    #[arg(long, global = true, env = "SKUA_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a project's environment satisfies its security profile.
    Validate {
        /// Project name.
        project: String,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Build every project image whose inputs changed.
    Build {
        /// Rebuild even when the existing image is up to date.
        #[arg(long)]
        force: bool,
    },
    /// Show a project's image tag and whether it is fresh, stale or missing.
    Image {
        /// Project name.
        project: String,
    },
    /// Apply an image request to a project.
    Adapt(adapt_commands::AdaptArgs),
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "skua starting");

    let store = project::open_store(cli.config_dir.as_deref())?;
    debug!(config_dir = %store.config_dir().display(), "using config directory");

    match cli.command {
        Commands::Validate { project, json } => {
            validate_commands::handle_validate(&store, &project, json)
        },
        Commands::Build { force } => build_commands::handle_build(&store, force).await,
        Commands::Image { project } => build_commands::handle_image(&store, &project).await,
        Commands::Adapt(args) => adapt_commands::handle_adapt(&store, &args),
        Commands::Config { action } => config_commands::handle_config(&store, action),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn adapt_flags_parse() {
        let cli = Cli::try_parse_from([
            "skua", "adapt", "web", "--package", "jq", "--package", "ripgrep", "--from-image",
            "node:22",
        ])
        .unwrap();
        let Commands::Adapt(args) = cli.command else {
            panic!("expected adapt");
        };
        assert_eq!(args.project, "web");
        assert_eq!(args.package, vec!["jq", "ripgrep"]);
        assert_eq!(args.from_image.as_deref(), Some("node:22"));
    }

    #[test]
    fn clear_conflicts_with_overrides() {
        assert!(Cli::try_parse_from(["skua", "adapt", "web", "--clear", "--package", "jq"]).is_err());
    }
}
