//! Build-context fingerprint.
//!
//! The digest covers every input that changes what `docker build` would
//! produce. It is attached to the image as a label and recomputed on
//! demand; nothing caches it between runs.

use std::path::{Path, PathBuf};

use {
    sha2::{Digest, Sha256},
    tracing::debug,
};

use crate::error::Result;

/// Label carrying the fingerprint.
pub const BUILD_CONTEXT_HASH_LABEL: &str = "skua.build-context-hash";
/// Label marking images built by skua.
pub const MANAGED_IMAGE_LABEL: &str = "skua.managed";

/// Bump when the segment layout changes so old labels stop matching.
const FINGERPRINT_VERSION: &str = "v1";
const MISSING: &[u8] = b"<missing>";

pub const ENTRYPOINT_FILE: &str = "entrypoint.sh";
/// Agent settings files copied into the image as first-run defaults.
pub const LOCAL_DEFAULT_FILES: &[&str] = &["settings.json", "settings.local.json"];

/// Numeric identity of the `dev` user inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl Default for BuildIdentity {
    fn default() -> Self {
        Self {
            uid: 1000,
            gid: 1000,
        }
    }
}

/// A named optional file copied into the build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDefault {
    pub name: String,
    pub bytes: Option<Vec<u8>>,
}

/// Static build assets. Absent files are recorded as `None`, never
/// dropped, so removing one changes the fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildAssets {
    /// Where `entrypoint.sh` was looked up, for error messages.
    pub container_dir: Option<PathBuf>,
    pub entrypoint: Option<Vec<u8>>,
    pub local_defaults: Vec<LocalDefault>,
}

impl BuildAssets {
    /// Read `entrypoint.sh` from `container_dir` and the agent settings
    /// files from `defaults_dir` (usually `~/.claude`).
    pub fn load(container_dir: Option<&Path>, defaults_dir: Option<&Path>) -> Result<Self> {
        let entrypoint = match container_dir {
            Some(dir) => read_optional(&dir.join(ENTRYPOINT_FILE))?,
            None => None,
        };
        let mut local_defaults = Vec::with_capacity(LOCAL_DEFAULT_FILES.len());
        for name in LOCAL_DEFAULT_FILES {
            let bytes = match defaults_dir {
                Some(dir) => read_optional(&dir.join(name))?,
                None => None,
            };
            local_defaults.push(LocalDefault {
                name: (*name).to_string(),
                bytes,
            });
        }
        debug!(
            entrypoint = entrypoint.is_some(),
            local_defaults = local_defaults.iter().filter(|d| d.bytes.is_some()).count(),
            "loaded build assets"
        );
        Ok(Self {
            container_dir: container_dir.map(Path::to_path_buf),
            entrypoint,
            local_defaults,
        })
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `marker \0 value \0`, with an explicit sentinel for absent values.
fn update_segment(hasher: &mut Sha256, marker: &str, value: Option<&[u8]>) {
    hasher.update(marker.as_bytes());
    hasher.update(b"\0");
    hasher.update(value.unwrap_or(MISSING));
    hasher.update(b"\0");
}

/// SHA-256 over the version tag, build description, entrypoint, uid, gid
/// and each local default, in that order. Lowercase hex.
#[must_use]
pub fn build_fingerprint(
    description: &str,
    entrypoint: Option<&[u8]>,
    identity: BuildIdentity,
    local_defaults: &[LocalDefault],
) -> String {
    let mut hasher = Sha256::new();
    update_segment(&mut hasher, "version", Some(FINGERPRINT_VERSION.as_bytes()));
    update_segment(&mut hasher, "dockerfile", Some(description.as_bytes()));
    update_segment(&mut hasher, "entrypoint", entrypoint);
    update_segment(&mut hasher, "uid", Some(identity.uid.to_string().as_bytes()));
    update_segment(&mut hasher, "gid", Some(identity.gid.to_string().as_bytes()));
    for default in local_defaults {
        update_segment(
            &mut hasher,
            &format!("claude-default:{}", default.name),
            default.bytes.as_deref(),
        );
    }
    format!("{:x}", hasher.finalize())
}
