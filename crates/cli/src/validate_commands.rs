use {
    anyhow::Result,
    serde::Serialize,
    skua_config::{
        Capability, ConfigStore, Severity, ValidationResult, capabilities, required_capabilities,
        validate_project,
    },
};

use crate::project::ProjectContext;

/// ANSI color codes.
pub(crate) const RED: &str = "\x1b[31m";
pub(crate) const YELLOW: &str = "\x1b[33m";
pub(crate) const GREEN: &str = "\x1b[32m";
pub(crate) const BOLD: &str = "\x1b[1m";
pub(crate) const RESET: &str = "\x1b[0m";

/// One capability row: provided by the environment and/or required by the
/// security profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilityRow {
    #[serde(rename = "name")]
    pub capability: Capability,
    pub provided: bool,
    pub required: bool,
}

/// Union of provided and required capabilities, in capability order.
pub fn capability_rows(ctx: &ProjectContext) -> Vec<CapabilityRow> {
    let provided = capabilities(&ctx.environment);
    let required = required_capabilities(&ctx.security);
    provided
        .union(&required)
        .map(|&capability| CapabilityRow {
            capability,
            provided: provided.contains(&capability),
            required: required.contains(&capability),
        })
        .collect()
}

pub fn validate_context(ctx: &ProjectContext) -> ValidationResult {
    validate_project(&ctx.project, &ctx.environment, &ctx.security, &ctx.agent)
}

pub(crate) fn print_diagnostics(result: &ValidationResult) {
    for (severity, message) in result.iter() {
        let (color, label) = match severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };
        eprintln!("  {BOLD}{color}{label}{RESET} {message}");
    }
}

/// Machine-readable `validate --json` output.
#[derive(Debug, Serialize)]
struct ValidateReport<'a> {
    project: &'a str,
    environment: &'a str,
    security: &'a str,
    agent: &'a str,
    capabilities: Vec<CapabilityRow>,
    #[serde(flatten)]
    result: &'a ValidationResult,
    valid: bool,
}

fn report_json(
    name: &str,
    ctx: &ProjectContext,
    result: &ValidationResult,
) -> Result<serde_json::Value> {
    let report = ValidateReport {
        project: name,
        environment: &ctx.environment.name,
        security: &ctx.security.name,
        agent: &ctx.agent.name,
        capabilities: capability_rows(ctx),
        result,
        valid: result.is_valid(),
    };
    Ok(serde_json::to_value(report)?)
}

fn report_text(ctx: &ProjectContext, result: &ValidationResult) {
    eprintln!(
        "Project {BOLD}{}{RESET}: environment '{}', security '{}', agent '{}'\n",
        ctx.project.name, ctx.environment.name, ctx.security.name, ctx.agent.name
    );
    eprintln!("Capabilities:");
    for row in capability_rows(ctx) {
        let mark = if row.provided {
            format!("{GREEN}+{RESET}")
        } else {
            format!("{RED}-{RESET}")
        };
        let required = if row.required {
            " (required)"
        } else {
            ""
        };
        eprintln!("  {mark} {}{required}", row.capability);
    }
    eprintln!();
    print_diagnostics(result);
    if result.is_valid() {
        eprintln!("Compatible ({} warning(s)).", result.warnings.len());
    } else {
        eprintln!(
            "{} error(s), {} warning(s)",
            result.errors.len(),
            result.warnings.len()
        );
    }
}

pub fn handle_validate(store: &ConfigStore, name: &str, as_json: bool) -> Result<()> {
    let ctx = match ProjectContext::load(store, name) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("  {BOLD}{RED}error{RESET} {e:#}");
            std::process::exit(1);
        },
    };
    let result = validate_context(&ctx);

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report_json(name, &ctx, &result)?)?
        );
    } else {
        report_text(&ctx, &result);
    }

    if !result.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}
