// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding service: local model first, provider fallback second.
//!
//! The service is the only embedding entry point for the store and the
//! retriever. It hides which backend produced a vector; callers only see
//! [`ReverieError::EmbeddingUnavailable`] once every backend has failed.
//!
//! Every vector handed out has exactly the configured dimension. A backend
//! that answers with the wrong length counts as a failed backend: storing
//! such a vector would make the row permanently unretrievable once queries
//! come from a correctly-sized backend, whereas a row stored without a
//! vector is re-embedded on its next update.

use std::sync::Arc;

use reverie_core::{EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, ReverieError};
use tracing::warn;

/// Two-tier embedding frontend with a fixed output dimension.
pub struct EmbeddingService {
    primary: Arc<dyn EmbeddingAdapter>,
    fallback: Option<Arc<dyn EmbeddingAdapter>>,
    dimensions: usize,
}

impl EmbeddingService {
    /// Create a service with a primary backend, an optional fallback, and
    /// the dimension every returned vector must have.
    pub fn new(
        primary: Arc<dyn EmbeddingAdapter>,
        fallback: Option<Arc<dyn EmbeddingAdapter>>,
        dimensions: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            dimensions,
        }
    }

    /// Embed a single text, trying the primary backend then the fallback.
    ///
    /// Fallback vectors are re-normalized on receipt so the unit-length
    /// invariant holds store-wide regardless of which backend answered.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ReverieError> {
        let input = EmbeddingInput::single(text);
        let primary_err = match self.primary.embed(input).await {
            Ok(output) => match self.first_checked(output, self.primary.name()) {
                Ok(vector) => return Ok(vector),
                Err(e) => e,
            },
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };

        warn!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            error = %primary_err,
            "primary embedder failed, trying fallback"
        );

        match fallback.embed(EmbeddingInput::single(text)).await {
            Ok(output) => self
                .first_checked(output, fallback.name())
                .map(|v| l2_normalize(&v)),
            Err(fallback_err) => Err(ReverieError::EmbeddingUnavailable {
                message: format!(
                    "all embedding backends failed (primary: {primary_err}; fallback: {fallback_err})"
                ),
                source: Some(Box::new(fallback_err)),
            }),
        }
    }

    /// Extract the first vector and enforce the configured dimension.
    fn first_checked(
        &self,
        output: EmbeddingOutput,
        backend: &str,
    ) -> Result<Vec<f32>, ReverieError> {
        let vector = output
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| ReverieError::EmbeddingUnavailable {
                message: format!("{backend} returned no vectors"),
                source: None,
            })?;
        if vector.len() != self.dimensions {
            return Err(ReverieError::EmbeddingUnavailable {
                message: format!(
                    "{backend} returned a {}-dimensional vector, expected {}",
                    vector.len(),
                    self.dimensions
                ),
                source: None,
            });
        }
        Ok(vector)
    }
}

/// L2-normalize a vector. Zero vectors are returned unchanged.
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_test_utils::{FailingEmbedder, HashEmbedder};

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let service = EmbeddingService::new(
            Arc::new(HashEmbedder::new(64)),
            Some(Arc::new(FailingEmbedder::new())),
            64,
        );
        let vector = service.embed("hello world").await.unwrap();
        assert_eq!(vector.len(), 64);
    }

    #[tokio::test]
    async fn fallback_covers_primary_failure() {
        let service = EmbeddingService::new(
            Arc::new(FailingEmbedder::new()),
            Some(Arc::new(HashEmbedder::new(64))),
            64,
        );
        let vector = service.embed("hello world").await.unwrap();
        assert_eq!(vector.len(), 64);
        // Re-normalization keeps the unit-length invariant.
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn both_backends_failing_is_embedding_unavailable() {
        let service = EmbeddingService::new(
            Arc::new(FailingEmbedder::new()),
            Some(Arc::new(FailingEmbedder::new())),
            64,
        );
        let err = service.embed("hello").await.unwrap_err();
        assert!(matches!(err, ReverieError::EmbeddingUnavailable { .. }));
    }

    #[tokio::test]
    async fn no_fallback_propagates_primary_error() {
        let service = EmbeddingService::new(Arc::new(FailingEmbedder::new()), None, 64);
        let err = service.embed("hello").await.unwrap_err();
        assert!(matches!(err, ReverieError::EmbeddingUnavailable { .. }));
    }

    #[tokio::test]
    async fn wrong_dimension_primary_falls_through_to_fallback() {
        let service = EmbeddingService::new(
            Arc::new(HashEmbedder::new(64)),
            Some(Arc::new(HashEmbedder::new(128))),
            128,
        );
        let vector = service.embed("hello world").await.unwrap();
        assert_eq!(vector.len(), 128);
    }

    #[tokio::test]
    async fn wrong_dimension_fallback_is_rejected() {
        let service = EmbeddingService::new(
            Arc::new(FailingEmbedder::new()),
            Some(Arc::new(HashEmbedder::new(64))),
            128,
        );
        let err = service.embed("hello world").await.unwrap_err();
        match err {
            ReverieError::EmbeddingUnavailable { message, .. } => {
                assert!(message.contains("64"), "got: {message}");
                assert!(message.contains("128"), "got: {message}");
            }
            other => panic!("expected EmbeddingUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn l2_normalize_general_vector() {
        let n = l2_normalize(&[3.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 0.001);
        assert!((n[1] - 0.8).abs() < 0.001);
    }

    #[test]
    fn l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
