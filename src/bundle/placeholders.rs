// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Placeholder substitution in secret-derived values files.
//!
//! Catalog profiles and user overrides may carry well-known tokens that are
//! resolved at generation time. `%PreHookCredential%` is deliberately left
//! in place; its presence switches the generator to the pre-hook secret
//! bundle layout.

use super::GeneratorError;

/// Replaced with the bundle name; requires image-registry credentials.
pub const GENERATED_DOCKER_CREDENTIAL: &str = "%GeneratedDockerCredential%";

/// Retained verbatim; marks the app as needing a pre-hook secret bundle.
pub const PRE_HOOK_CREDENTIAL: &str = "%PreHookCredential%";

/// Replaced with the bare image registry URL.
pub const IMAGE_REGISTRY_URL: &str = "%ImageRegistryURL%";

/// Replaced with the harbor project name resolved from the project lookup.
pub const REGISTRY_PROJECT_NAME: &str = "%RegistryProjectName%";

/// Strip transport prefixes and a trailing slash from a registry URL.
#[must_use]
pub fn strip_registry_prefix(url: &str) -> String {
    let bare = url
        .trim_start_matches("oci://")
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    bare.trim_end_matches('/').to_string()
}

/// Substitute `%GeneratedDockerCredential%` when image credentials exist and
/// reject contents that still carry the token afterwards.
pub fn substitute_docker_credential(
    contents: &str,
    bundle_name: &str,
    has_image_credentials: bool,
    strict: bool,
) -> Result<String, GeneratorError> {
    let contents = if has_image_credentials {
        contents.replace(GENERATED_DOCKER_CREDENTIAL, bundle_name)
    } else {
        contents.to_string()
    };

    if strict && contents.contains(GENERATED_DOCKER_CREDENTIAL) {
        return Err(GeneratorError::Config(
            "token string present without Docker credentials".to_string(),
        ));
    }
    Ok(contents)
}

/// Substitute `%ImageRegistryURL%` with the bare registry URL.
pub fn substitute_image_registry(
    contents: &str,
    app_name: &str,
    image_registry: Option<&str>,
) -> Result<String, GeneratorError> {
    if !contents.contains(IMAGE_REGISTRY_URL) {
        return Ok(contents.to_string());
    }
    let registry = image_registry.filter(|r| !r.is_empty()).ok_or_else(|| {
        GeneratorError::Config(format!(
            "imageRegistry not set for app {app_name} but '{IMAGE_REGISTRY_URL}' tag is present"
        ))
    })?;
    Ok(contents.replace(IMAGE_REGISTRY_URL, &strip_registry_prefix(registry)))
}

/// Whether the contents request a pre-hook secret bundle.
#[must_use]
pub fn has_pre_hook(contents: &str) -> bool {
    contents.contains(PRE_HOOK_CREDENTIAL)
}

#[cfg(test)]
#[path = "placeholders_tests.rs"]
mod placeholders_tests;
