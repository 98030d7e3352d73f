// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as known provider names and threshold ranges.

use crate::diagnostic::ConfigError;
use crate::model::ReverieConfig;

/// Providers the binary knows how to construct.
const KNOWN_PROVIDERS: &[&str] = &["openai", "ollama"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ReverieConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !KNOWN_PROVIDERS.contains(&config.llm.provider.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "llm.provider `{}` is not supported (expected one of: {})",
                config.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            ),
        });
    }

    if config.llm.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "llm.timeout_secs must be at least 1".to_string(),
        });
    }

    if config.memory.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "memory.database_path must not be empty".to_string(),
        });
    }

    if config.memory.embedding_dim == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.embedding_dim must be at least 1".to_string(),
        });
    }

    if config.memory.max_results == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.max_results must be at least 1".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.memory.relevance_threshold) {
        errors.push(ConfigError::Validation {
            message: format!(
                "memory.relevance_threshold must be in 0.0..=1.0, got {}",
                config.memory.relevance_threshold
            ),
        });
    }

    if config.persona.name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "persona.name must not be empty".to_string(),
        });
    }

    if config.reflection.max_cycles == 0 {
        errors.push(ConfigError::Validation {
            message: "reflection.max_cycles must be at least 1".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
