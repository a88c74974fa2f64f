//! Build-or-reuse decisions.
//!
//! Freshness is always re-derived from the image's fingerprint label; an
//! image without one is never trusted. Two builds of the same tag race
//! with last-write-wins semantics in the image store.

use {
    serde::Serialize,
    skua_config::{AgentConfig, SecurityProfile},
    tracing::{debug, info, warn},
};

use crate::{
    dockerfile::generate_build_description,
    error::{Error, Result},
    fingerprint::{
        BUILD_CONTEXT_HASH_LABEL, BuildAssets, BuildIdentity, ENTRYPOINT_FILE,
        MANAGED_IMAGE_LABEL, build_fingerprint,
    },
    inputs::ImageInputs,
    runtime::{BuildOutcome, BuildRequest, ImageRuntime},
};

/// Directory inside the build context holding agent settings defaults.
const LOCAL_DEFAULTS_DIR: &str = "claude-settings";

/// A fully resolved image build: the tag, the rendered Dockerfile, and
/// every other byte that goes into the build context.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub tag: String,
    pub description: String,
    pub assets: BuildAssets,
    pub identity: BuildIdentity,
}

impl BuildPlan {
    /// Render the Dockerfile for `tag` from resolved inputs.
    #[must_use]
    pub fn new(
        tag: impl Into<String>,
        agents: &[AgentConfig],
        security: &SecurityProfile,
        inputs: &ImageInputs,
        assets: BuildAssets,
        identity: BuildIdentity,
    ) -> Self {
        Self {
            tag: tag.into(),
            description: generate_build_description(
                agents,
                security,
                &inputs.base_image,
                &inputs.extra_packages,
                &inputs.extra_commands,
            ),
            assets,
            identity,
        }
    }

    /// Fingerprint of the current inputs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        build_fingerprint(
            &self.description,
            self.assets.entrypoint.as_deref(),
            self.identity,
            &self.assets.local_defaults,
        )
    }
}

/// Whether the image's fingerprint label equals the current fingerprint.
/// A missing label never matches.
pub async fn image_matches_build_context<R: ImageRuntime + ?Sized>(
    runtime: &R,
    plan: &BuildPlan,
) -> Result<bool> {
    let Some(actual) = runtime.image_label(&plan.tag, BUILD_CONTEXT_HASH_LABEL).await? else {
        debug!(image = %plan.tag, "image has no fingerprint label");
        return Ok(false);
    };
    let expected = plan.fingerprint();
    let matches = actual == expected;
    debug!(image = %plan.tag, matches, "compared build fingerprint");
    Ok(matches)
}

/// Write the build context into a fresh temporary directory and build.
///
/// The directory is removed when this returns, on every path. Only
/// infrastructure problems (no entrypoint, unwritable temp dir, no
/// `docker`) are `Err`; a failing build is a [`BuildOutcome`].
pub async fn build_image<R: ImageRuntime + ?Sized>(
    runtime: &R,
    plan: &BuildPlan,
) -> Result<BuildOutcome> {
    let entrypoint = plan.assets.entrypoint.as_deref().ok_or_else(|| {
        let dir = plan.assets.container_dir.clone().unwrap_or_default();
        Error::MissingAsset(dir.join(ENTRYPOINT_FILE))
    })?;

    let context = tempfile::Builder::new()
        .prefix("skua-build-")
        .tempdir()?;
    let dir = context.path();
    std::fs::write(dir.join("Dockerfile"), &plan.description)?;
    std::fs::write(dir.join(ENTRYPOINT_FILE), entrypoint)?;
    let defaults_dir = dir.join(LOCAL_DEFAULTS_DIR);
    std::fs::create_dir_all(&defaults_dir)?;
    for default in &plan.assets.local_defaults {
        if let Some(bytes) = &default.bytes {
            std::fs::write(defaults_dir.join(&default.name), bytes)?;
        }
    }

    let fingerprint = plan.fingerprint();
    let request = BuildRequest {
        tag: &plan.tag,
        context_dir: dir,
        build_args: vec![
            ("USER_UID".into(), plan.identity.uid.to_string()),
            ("USER_GID".into(), plan.identity.gid.to_string()),
        ],
        labels: vec![
            (MANAGED_IMAGE_LABEL.into(), "true".into()),
            (BUILD_CONTEXT_HASH_LABEL.into(), fingerprint),
        ],
    };
    runtime.build(&request).await
}

/// Local state of an image relative to the current inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Missing,
    Stale,
    Fresh,
}

impl std::fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Stale => write!(f, "stale"),
            Self::Fresh => write!(f, "fresh"),
        }
    }
}

/// What [`ImageCache::ensure`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The existing image matched and was kept.
    Reused,
    /// A new image was built.
    Built,
    /// The build ran and failed.
    Failed(BuildOutcome),
}

/// Reuse-or-build driver over an [`ImageRuntime`].
pub struct ImageCache<R> {
    runtime: R,
}

impl<R: ImageRuntime> ImageCache<R> {
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub async fn status(&self, plan: &BuildPlan) -> Result<ImageStatus> {
        if !self.runtime.image_exists(&plan.tag).await? {
            return Ok(ImageStatus::Missing);
        }
        if image_matches_build_context(&self.runtime, plan).await? {
            Ok(ImageStatus::Fresh)
        } else {
            Ok(ImageStatus::Stale)
        }
    }

    /// Reuse the image when it is fresh, otherwise build it once. `force`
    /// skips the freshness check. Failed builds are not retried.
    pub async fn ensure(&self, plan: &BuildPlan, force: bool) -> Result<EnsureOutcome> {
        if !force {
            let status = self.status(plan).await?;
            if status == ImageStatus::Fresh {
                info!(image = %plan.tag, "image is up to date, skipping build");
                return Ok(EnsureOutcome::Reused);
            }
            info!(image = %plan.tag, %status, "image needs build");
        }

        let outcome = build_image(&self.runtime, plan).await?;
        if outcome.success {
            Ok(EnsureOutcome::Built)
        } else {
            warn!(image = %plan.tag, "build failed");
            Ok(EnsureOutcome::Failed(outcome))
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::fingerprint::LocalDefault,
        async_trait::async_trait,
        std::{collections::HashMap, sync::Mutex},
    };

    /// In-memory image store. `build` records the labels it was given and
    /// snapshots the context directory.
    #[derive(Default)]
    struct FakeRuntime {
        labels: Mutex<HashMap<String, HashMap<String, String>>>,
        builds: Mutex<Vec<Vec<String>>>,
        context_dirs: Mutex<Vec<std::path::PathBuf>>,
        fail: bool,
    }

    impl FakeRuntime {
        fn with_image(tag: &str, labels: &[(&str, &str)]) -> Self {
            let rt = Self::default();
            rt.labels.lock().unwrap().insert(
                tag.into(),
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            );
            rt
        }

        fn build_count(&self) -> usize {
            self.builds.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ImageRuntime for FakeRuntime {
        async fn image_exists(&self, image: &str) -> Result<bool> {
            Ok(self.labels.lock().unwrap().contains_key(image))
        }

        async fn image_label(&self, image: &str, key: &str) -> Result<Option<String>> {
            Ok(self
                .labels
                .lock()
                .unwrap()
                .get(image)
                .and_then(|l| l.get(key).cloned()))
        }

        async fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutcome> {
            let mut files: Vec<String> = walk(request.context_dir);
            files.sort();
            self.builds.lock().unwrap().push(files);
            self.context_dirs
                .lock()
                .unwrap()
                .push(request.context_dir.to_path_buf());
            if self.fail {
                return Ok(BuildOutcome::failed("E: Unable to locate package nope\n", ""));
            }
            self.labels
                .lock()
                .unwrap()
                .insert(request.tag.into(), request.labels.iter().cloned().collect());
            Ok(BuildOutcome::succeeded())
        }
    }

    fn walk(dir: &std::path::Path) -> Vec<String> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let rel = path.strip_prefix(dir).unwrap().display().to_string();
            if path.is_dir() {
                out.extend(walk(&path).into_iter().map(|f| format!("{rel}/{f}")));
            } else {
                out.push(rel);
            }
        }
        out
    }

    fn plan() -> BuildPlan {
        let assets = BuildAssets {
            container_dir: None,
            entrypoint: Some(b"#!/bin/sh\nexec \"$@\"\n".to_vec()),
            local_defaults: vec![
                LocalDefault {
                    name: "settings.json".into(),
                    bytes: Some(b"{}".to_vec()),
                },
                LocalDefault {
                    name: "settings.local.json".into(),
                    bytes: None,
                },
            ],
        };
        let inputs = ImageInputs {
            base_image: "debian:bookworm-slim".into(),
            extra_packages: vec!["jq".into()],
            extra_commands: Vec::new(),
        };
        BuildPlan::new(
            "skua-base-claude",
            &[],
            &SecurityProfile::default(),
            &inputs,
            assets,
            BuildIdentity::default(),
        )
    }

    #[tokio::test]
    async fn unlabeled_image_never_matches() {
        let rt = FakeRuntime::with_image("skua-base-claude", &[(MANAGED_IMAGE_LABEL, "true")]);
        assert!(!image_matches_build_context(&rt, &plan()).await.unwrap());
    }

    #[tokio::test]
    async fn matching_label_is_fresh() {
        let plan = plan();
        let fingerprint = plan.fingerprint();
        let rt = FakeRuntime::with_image(&plan.tag, &[(
            BUILD_CONTEXT_HASH_LABEL,
            fingerprint.as_str(),
        )]);
        let cache = ImageCache::new(rt);
        assert_eq!(cache.status(&plan).await.unwrap(), ImageStatus::Fresh);
        assert_eq!(cache.ensure(&plan, false).await.unwrap(), EnsureOutcome::Reused);
        assert_eq!(cache.runtime().build_count(), 0);
    }

    #[tokio::test]
    async fn stale_image_is_rebuilt_once() {
        let plan = plan();
        let rt = FakeRuntime::with_image(&plan.tag, &[(BUILD_CONTEXT_HASH_LABEL, "old")]);
        let cache = ImageCache::new(rt);
        assert_eq!(cache.status(&plan).await.unwrap(), ImageStatus::Stale);
        assert_eq!(cache.ensure(&plan, false).await.unwrap(), EnsureOutcome::Built);
        assert_eq!(cache.status(&plan).await.unwrap(), ImageStatus::Fresh);
        assert_eq!(cache.ensure(&plan, false).await.unwrap(), EnsureOutcome::Reused);
        assert_eq!(cache.runtime().build_count(), 1);
    }

    #[tokio::test]
    async fn force_rebuilds_fresh_image() {
        let plan = plan();
        let fingerprint = plan.fingerprint();
        let rt = FakeRuntime::with_image(&plan.tag, &[(
            BUILD_CONTEXT_HASH_LABEL,
            fingerprint.as_str(),
        )]);
        let cache = ImageCache::new(rt);
        assert_eq!(cache.ensure(&plan, true).await.unwrap(), EnsureOutcome::Built);
        assert_eq!(cache.runtime().build_count(), 1);
    }

    #[tokio::test]
    async fn build_writes_context_and_labels() {
        let plan = plan();
        let cache = ImageCache::new(FakeRuntime::default());
        assert_eq!(cache.status(&plan).await.unwrap(), ImageStatus::Missing);
        cache.ensure(&plan, false).await.unwrap();

        let rt = cache.runtime();
        assert_eq!(rt.builds.lock().unwrap()[0], vec![
            "Dockerfile",
            "claude-settings/settings.json",
            "entrypoint.sh"
        ]);
        let labels = rt.labels.lock().unwrap();
        let labels = labels.get(&plan.tag).unwrap();
        assert_eq!(labels.get(MANAGED_IMAGE_LABEL).unwrap(), "true");
        assert_eq!(
            labels.get(BUILD_CONTEXT_HASH_LABEL).unwrap(),
            &plan.fingerprint()
        );
    }

    #[tokio::test]
    async fn context_dir_removed_after_failure() {
        let plan = plan();
        let rt = FakeRuntime {
            fail: true,
            ..FakeRuntime::default()
        };
        let cache = ImageCache::new(rt);
        let EnsureOutcome::Failed(outcome) = cache.ensure(&plan, false).await.unwrap() else {
            panic!("expected a failed build");
        };
        assert_eq!(outcome.tail, vec!["E: Unable to locate package nope"]);
        let dirs = cache.runtime().context_dirs.lock().unwrap();
        assert!(!dirs[0].exists());
        // A failed build leaves no label behind.
        assert!(!cache.runtime().labels.lock().unwrap().contains_key(&plan.tag));
    }

    #[tokio::test]
    async fn missing_entrypoint_is_error() {
        let mut plan = plan();
        plan.assets.entrypoint = None;
        let cache = ImageCache::new(FakeRuntime::default());
        let err = cache.ensure(&plan, false).await.unwrap_err();
        assert!(matches!(err, Error::MissingAsset(_)));
        assert_eq!(cache.runtime().build_count(), 0);
    }
}
