//! Image synthesis, fingerprinting, naming, and the build-or-reuse cache.
//!
//! Callers resolve a project's resources with `skua-config`, turn them into
//! a [`BuildPlan`], and hand it to [`ImageCache::ensure`].

pub mod cache;
pub mod dockerfile;
pub mod error;
pub mod fingerprint;
pub mod inputs;
pub mod naming;
pub mod runtime;

pub use {
    cache::{
        BuildPlan, EnsureOutcome, ImageCache, ImageStatus, build_image,
        image_matches_build_context,
    },
    dockerfile::generate_build_description,
    error::{Error, Result},
    fingerprint::{
        BUILD_CONTEXT_HASH_LABEL, BuildAssets, BuildIdentity, LocalDefault, MANAGED_IMAGE_LABEL,
        build_fingerprint,
    },
    inputs::{ImageInputs, base_image_for_agent, resolve_project_image_inputs},
    naming::{image_name_for_agent, image_name_for_project},
    runtime::{BuildOutcome, BuildRequest, DockerCli, ImageRuntime, current_identity},
};
