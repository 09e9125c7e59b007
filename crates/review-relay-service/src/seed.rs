//! Merchant integration seeding.
//!
//! In-memory deployments load their integrations from a seed file at
//! startup. The file carries a single `integrations` list; YAML, JSON, and
//! TOML all work, selected by file extension.
//!
//! Minimal entries need only `id`, `user_id`, and `provider`; the boolean
//! flags default to enabled.

use review_relay_api::ConfigError;
use review_relay_core::Integration;
use serde::Deserialize;

/// Top-level shape of a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub integrations: Vec<Integration>,
}

/// Load integrations from the file at `path`.
pub fn load_integrations(path: &str) -> Result<Vec<Integration>, ConfigError> {
    let raw = config::Config::builder()
        .add_source(config::File::with_name(path).required(true))
        .build()
        .map_err(|e| ConfigError::Invalid {
            message: format!("Failed to read integrations file '{}': {}", path, e),
        })?;

    let seed: SeedFile = raw.try_deserialize().map_err(|e| ConfigError::Invalid {
        message: format!("Failed to parse integrations file '{}': {}", path, e),
    })?;

    Ok(seed.integrations)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "seed_tests.rs"]
mod tests;
