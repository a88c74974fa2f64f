//! Dockerfile synthesis.
//!
//! Output is a pure function of the arguments: package and command lists
//! keep the caller's order (first occurrence wins) and nothing is read from
//! the clock or the process environment.

use {
    skua_common::text::merge_unique,
    skua_config::{AgentConfig, SecurityProfile, schema::DEFAULT_AGENT},
};

/// Installed first in every image.
pub const CORE_PACKAGES: &[&str] = &[
    "ca-certificates",
    "curl",
    "wget",
    "git",
    "openssh-client",
    "sudo",
    "vim",
];

/// Default toolbox.
pub const DEFAULT_PACKAGES: &[&str] = &[
    "python3",
    "python3-pip",
    "procps",
    "coreutils",
    "findutils",
    "grep",
    "gawk",
    "sed",
    "less",
    "tree",
    "file",
    "htop",
    "jq",
    "tmux",
    "zip",
    "unzip",
    "tar",
    "gzip",
    "bzip2",
    "xz-utils",
    "diffutils",
    "patch",
    "man-db",
    "manpages",
    "net-tools",
    "iputils-ping",
    "dnsutils",
];

const CODEX_INSTALL: &str = "npm install -g --prefix /home/dev/.local @openai/codex";
const LEGACY_CODEX_INSTALL: &str = "npm install -g @openai/codex";

/// Install commands for known agents that do not configure their own.
#[must_use]
pub fn default_agent_install(agent: &str) -> &'static [&'static str] {
    match agent {
        "claude" => &["curl -fsSL https://claude.ai/install.sh | bash"],
        "codex" => &[CODEX_INSTALL],
        _ => &[],
    }
}

/// Packages a known agent always needs, on top of its configured ones.
#[must_use]
pub fn default_agent_packages(agent: &str) -> &'static [&'static str] {
    match agent {
        "codex" => &["nodejs", "npm"],
        _ => &[],
    }
}

/// Rewrite install commands that predate the user-local npm prefix.
fn normalize_install_commands(agent: &str, commands: &[String]) -> Vec<String> {
    commands
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| {
            if agent == "codex" && c == LEGACY_CODEX_INSTALL {
                CODEX_INSTALL.to_string()
            } else {
                c.to_string()
            }
        })
        .collect()
}

fn install_commands(agents: &[AgentConfig]) -> Vec<String> {
    if agents.is_empty() {
        return merge_unique(default_agent_install(DEFAULT_AGENT));
    }
    let commands = agents.iter().flat_map(|agent| {
        if agent.install.commands.is_empty() {
            default_agent_install(&agent.name)
                .iter()
                .map(|c| (*c).to_string())
                .collect::<Vec<_>>()
        } else {
            normalize_install_commands(&agent.name, &agent.install.commands)
        }
    });
    merge_unique(commands)
}

fn packages(agents: &[AgentConfig], extra_packages: &[String]) -> Vec<String> {
    let agent_packages = agents.iter().flat_map(|agent| {
        default_agent_packages(&agent.name)
            .iter()
            .map(|p| (*p).to_string())
            .chain(agent.install.required_packages.iter().cloned())
    });
    merge_unique(
        CORE_PACKAGES
            .iter()
            .chain(DEFAULT_PACKAGES)
            .map(|p| (*p).to_string())
            .chain(agent_packages)
            .chain(extra_packages.iter().cloned()),
    )
}

fn run_lines(commands: &[String]) -> String {
    commands
        .iter()
        .map(|c| format!("RUN {c}\n"))
        .collect()
}

/// Strips the dev user's sudo rights, then fails the build if `sudo` still
/// works so a labeled image never carries an unverified revocation.
const SUDO_REVOCATION: &str = r#"
# ── Remove sudo (security: agent.sudo=false) ─────────────────────────
RUN sudo sh -c 'deluser dev sudo 2>/dev/null || true; \
    sed -i "/^dev /d" /etc/sudoers; \
    rm -f /etc/sudoers.d/*; \
    chmod 0440 /etc/sudoers'
RUN if sudo -n true 2>/dev/null; then \
        echo "sudo revocation failed: user dev can still run sudo" >&2; exit 1; \
    fi
"#;

/// Render the Dockerfile for `agents` under `security`.
///
/// Packages are core, toolbox, per-agent, then `extra_packages`; install
/// commands come from each agent (or the built-in default for its name);
/// `extra_commands` run last. Every list is deduplicated keeping the first
/// occurrence and is never re-sorted.
#[must_use]
pub fn generate_build_description(
    agents: &[AgentConfig],
    security: &SecurityProfile,
    base_image: &str,
    extra_packages: &[String],
    extra_commands: &[String],
) -> String {
    let package_line = packages(agents, extra_packages).join(" \\\n    ");
    let install_lines = run_lines(&install_commands(agents));
    let extra_lines = run_lines(&merge_unique(extra_commands));
    let sudo_revocation = if security.agent.sudo {
        ""
    } else {
        SUDO_REVOCATION
    };
    let base_image = base_image.trim();

    format!(
        r#"FROM {base_image}

ARG DEBIAN_FRONTEND=noninteractive
ARG USER_UID=1000
ARG USER_GID=1000

# ── Core system packages ─────────────────────────────────────────────
RUN apt-get update && apt-get install -y --no-install-recommends \
    {package_line} \
    && rm -rf /var/lib/apt/lists/*

# ── Create non-root user (match host UID/GID when possible) ──────────
RUN set -eux; \
    if ! getent group "$USER_GID" >/dev/null; then groupadd --gid "$USER_GID" dev; fi; \
    if getent passwd "$USER_UID" >/dev/null; then \
        existing_user="$(getent passwd "$USER_UID" | cut -d: -f1)"; \
        if [ "$existing_user" != "dev" ]; then usermod -l dev "$existing_user"; fi; \
        usermod -d /home/dev -m dev; \
        usermod -g "$USER_GID" dev; \
    else \
        useradd --uid "$USER_UID" --gid "$USER_GID" -m -s /bin/bash dev; \
    fi; \
    echo "dev ALL=(ALL) NOPASSWD:ALL" >> /etc/sudoers

# ── Install agent ────────────────────────────────────────────────────
ENV NPM_CONFIG_PREFIX="/home/dev/.local"
USER dev
{install_lines}WORKDIR /home/dev
{extra_lines}
# ── Non-sensitive config defaults (copied into volume on first run) ──
COPY --chown=dev:dev claude-settings/ /home/dev/.claude-defaults/

# ── Placeholder directories ─────────────────────────────────────────
RUN mkdir -p /home/dev/.ssh /home/dev/project /home/dev/.claude

# ── Environment ──────────────────────────────────────────────────────
ENV EDITOR=vim
ENV PATH="/home/dev/.local/bin:${{PATH}}"
{sudo_revocation}
# ── Entrypoint ───────────────────────────────────────────────────────
COPY --chown=dev:dev entrypoint.sh /home/dev/entrypoint.sh
RUN chmod +x /home/dev/entrypoint.sh

ENTRYPOINT ["/home/dev/entrypoint.sh"]
"#
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> AgentConfig {
        AgentConfig {
            name: name.into(),
            ..AgentConfig::default()
        }
    }

    fn open() -> SecurityProfile {
        let mut sec = SecurityProfile::default();
        sec.agent.sudo = true;
        sec
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    /// The `apt-get install` block, one package per entry.
    fn package_block(dockerfile: &str) -> Vec<String> {
        let start = dockerfile.find("--no-install-recommends \\\n").unwrap();
        let rest = &dockerfile[start..];
        let end = rest.find("&& rm -rf").unwrap();
        rest[..end]
            .lines()
            .skip(1)
            .map(|l| l.trim().trim_end_matches('\\').trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    #[test]
    fn identical_inputs_render_identically() {
        let agents = [agent("claude"), agent("codex")];
        let extras = strings(&["ripgrep", "jq"]);
        let a = generate_build_description(&agents, &open(), "debian:bookworm-slim", &extras, &[]);
        let b = generate_build_description(&agents, &open(), "debian:bookworm-slim", &extras, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn package_order_follows_each_call() {
        let agents = [agent("claude")];
        let first = generate_build_description(
            &agents,
            &open(),
            "debian:bookworm-slim",
            &strings(&["libpq-dev", "make"]),
            &[],
        );
        let second = generate_build_description(
            &agents,
            &open(),
            "debian:bookworm-slim",
            &strings(&["make", "libpq-dev"]),
            &[],
        );
        let first = package_block(&first);
        let second = package_block(&second);
        assert_eq!(&first[first.len() - 2..], ["libpq-dev", "make"]);
        assert_eq!(&second[second.len() - 2..], ["make", "libpq-dev"]);
    }

    #[test]
    fn packages_are_deduplicated_in_precedence_order() {
        let mut codex = agent("codex");
        codex.install.required_packages = strings(&["npm", "ripgrep"]);
        let dockerfile = generate_build_description(
            &[codex],
            &open(),
            "debian:bookworm-slim",
            &strings(&["git", "ripgrep", "fd-find"]),
            &[],
        );
        let block = package_block(&dockerfile);
        assert_eq!(block[0], "ca-certificates");
        assert_eq!(block.iter().filter(|p| *p == "git").count(), 1);
        assert_eq!(block.iter().filter(|p| *p == "npm").count(), 1);
        let tail = &block[block.len() - 4..];
        assert_eq!(tail, ["nodejs", "npm", "ripgrep", "fd-find"]);
    }

    #[test]
    fn unknown_agent_without_commands_installs_nothing() {
        let dockerfile =
            generate_build_description(&[agent("aider")], &open(), "debian:bookworm-slim", &[], &[]);
        assert!(!dockerfile.contains("claude.ai/install.sh"));
    }

    #[test]
    fn no_agents_installs_claude() {
        let dockerfile = generate_build_description(&[], &open(), "debian:bookworm-slim", &[], &[]);
        assert!(dockerfile.contains("RUN curl -fsSL https://claude.ai/install.sh | bash\n"));
    }

    #[test]
    fn legacy_codex_install_is_rewritten() {
        let mut codex = agent("codex");
        codex.install.commands = strings(&["npm install -g @openai/codex", "  "]);
        let dockerfile =
            generate_build_description(&[codex], &open(), "debian:bookworm-slim", &[], &[]);
        assert!(dockerfile.contains(&format!("RUN {CODEX_INSTALL}\n")));
        assert!(!dockerfile.contains("RUN npm install -g @openai/codex\n"));
    }

    #[test]
    fn shared_install_commands_run_once() {
        let mut a = agent("one");
        a.install.commands = strings(&["pip install shared-tool"]);
        let mut b = agent("two");
        b.install.commands = strings(&["pip install shared-tool"]);
        let dockerfile = generate_build_description(&[a, b], &open(), "debian:bookworm-slim", &[], &[]);
        assert_eq!(dockerfile.matches("RUN pip install shared-tool").count(), 1);
    }

    #[test]
    fn extra_commands_follow_workdir() {
        let dockerfile = generate_build_description(
            &[agent("claude")],
            &open(),
            "ubuntu:24.04",
            &[],
            &strings(&["make deps"]),
        );
        assert!(dockerfile.starts_with("FROM ubuntu:24.04\n"));
        let workdir = dockerfile.find("WORKDIR /home/dev").unwrap();
        let extra = dockerfile.find("RUN make deps").unwrap();
        assert!(extra > workdir);
    }

    #[test]
    fn sudo_revocation_only_without_sudo() {
        let with_sudo =
            generate_build_description(&[agent("claude")], &open(), "debian:bookworm-slim", &[], &[]);
        assert!(!with_sudo.contains("Remove sudo"));

        let locked = SecurityProfile::default();
        let dockerfile =
            generate_build_description(&[agent("claude")], &locked, "debian:bookworm-slim", &[], &[]);
        let revoke = dockerfile.find("deluser dev sudo").unwrap();
        let verify = dockerfile.find("if sudo -n true").unwrap();
        let entrypoint = dockerfile.find("ENTRYPOINT").unwrap();
        assert!(revoke < verify && verify < entrypoint);
    }
}
