//! Design generation service.
//!
//! Prompt → optional translation → text-to-image → object storage →
//! `designs` row → request cache. The prompt is validated before any
//! external call, and nothing is persisted unless both generation and
//! upload succeed.

use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use tee_studio_core::{DesignId, Placement, PlacementError, UserId};

use crate::clients::{
    ArtifactStore, GenerationError, ImageGenerator, RequestCache, StorageError, TranslationError,
    Translator,
};
use crate::config::TranslationPolicy;
use crate::db::{DesignStore, RepositoryError};
use crate::models::{Design, NewDesign};

/// Longest accepted prompt, in characters.
const MAX_PROMPT_LENGTH: usize = 1000;

/// Content type of generated artifacts.
const ARTIFACT_CONTENT_TYPE: &str = "image/png";

/// Errors that can occur while generating or reading designs.
#[derive(Debug, Error)]
pub enum DesignError {
    #[error("prompt is required")]
    EmptyPrompt,

    #[error("prompt must be at most 1000 characters")]
    PromptTooLong,

    #[error("invalid placement: {0}")]
    InvalidPlacement(#[from] PlacementError),

    /// Translation failed and the policy is to fail closed.
    #[error("translation failed: {0}")]
    TranslationFailed(#[source] TranslationError),

    #[error("image generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),

    #[error("artifact upload failed: {0}")]
    StorageFailed(#[from] StorageError),

    #[error("design not found")]
    NotFound,

    /// The design exists but belongs to another user.
    #[error("design belongs to another user")]
    Forbidden,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A validated generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateDesign {
    pub prompt: String,
    pub placement: Placement,
}

impl GenerateDesign {
    /// Trim and validate a raw prompt and placement.
    ///
    /// # Errors
    ///
    /// Returns `DesignError::EmptyPrompt`, `PromptTooLong`, or `InvalidPlacement`.
    pub fn new(
        prompt: &str,
        x: Option<f64>,
        y: Option<f64>,
        scale: Option<f64>,
    ) -> Result<Self, DesignError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(DesignError::EmptyPrompt);
        }
        if prompt.chars().count() > MAX_PROMPT_LENGTH {
            return Err(DesignError::PromptTooLong);
        }
        let placement = Placement::from_parts(x, y, scale)?;

        Ok(Self {
            prompt: prompt.to_owned(),
            placement,
        })
    }
}

/// Object key for a generated artifact.
#[must_use]
pub fn artifact_key(user_id: UserId, request_id: &Uuid) -> String {
    format!("designs/{user_id}/{request_id}.png")
}

/// Design generation service.
pub struct DesignService<'a> {
    designs: &'a dyn DesignStore,
    generator: &'a dyn ImageGenerator,
    translator: Option<&'a dyn Translator>,
    translation_policy: TranslationPolicy,
    artifacts: &'a dyn ArtifactStore,
    cache: &'a dyn RequestCache,
}

impl<'a> DesignService<'a> {
    /// Create a new design service.
    #[must_use]
    pub const fn new(
        designs: &'a dyn DesignStore,
        generator: &'a dyn ImageGenerator,
        translator: Option<&'a dyn Translator>,
        translation_policy: TranslationPolicy,
        artifacts: &'a dyn ArtifactStore,
        cache: &'a dyn RequestCache,
    ) -> Self {
        Self {
            designs,
            generator,
            translator,
            translation_policy,
            artifacts,
            cache,
        }
    }

    /// Generate, store, and persist a new design.
    ///
    /// # Errors
    ///
    /// Returns `TranslationFailed` (fail-closed policy only), `GenerationFailed`,
    /// `StorageFailed`, or `Repository`.
    #[instrument(skip(self, request), fields(%user_id))]
    pub async fn generate(
        &self,
        user_id: UserId,
        request: GenerateDesign,
    ) -> Result<Design, DesignError> {
        let translated_prompt = self.translate(&request.prompt).await?;
        let generation_prompt = translated_prompt.as_deref().unwrap_or(&request.prompt);

        let request_id = Uuid::new_v4();
        if let Err(e) = self
            .cache
            .record_request(&request_id.to_string(), user_id, &request.prompt)
            .await
        {
            tracing::warn!(
                %request_id,
                retryable = e.is_retryable(),
                error = %e,
                "Failed to record generation request"
            );
        }

        let bytes = self.generator.generate(generation_prompt).await?;

        let storage_key = artifact_key(user_id, &request_id);
        let image_url = self
            .artifacts
            .put(&storage_key, bytes, ARTIFACT_CONTENT_TYPE)
            .await?;

        let design = self
            .designs
            .insert(NewDesign {
                user_id,
                prompt: request.prompt,
                translated_prompt,
                image_url,
                storage_key,
                placement: request.placement,
            })
            .await?;

        if let Err(e) = self.cache.cache_artifact(design.id, &design.image_url).await {
            tracing::warn!(design_id = %design.id, error = %e, "Failed to cache artifact URL");
        }

        tracing::info!(design_id = %design.id, %request_id, "Design generated");
        Ok(design)
    }

    /// The user's designs, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DesignError::Repository` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Design>, DesignError> {
        Ok(self.designs.list_for_user(user_id).await?)
    }

    /// One design, if the user owns it.
    ///
    /// # Errors
    ///
    /// Returns `DesignError::NotFound` or `DesignError::Forbidden`.
    pub async fn get(&self, user_id: UserId, id: DesignId) -> Result<Design, DesignError> {
        let design = self.designs.get(id).await?.ok_or(DesignError::NotFound)?;
        if design.user_id != user_id {
            return Err(DesignError::Forbidden);
        }
        Ok(design)
    }

    /// Translate the prompt under the configured policy.
    ///
    /// `Ok(None)` means generate from the original prompt.
    async fn translate(&self, prompt: &str) -> Result<Option<String>, DesignError> {
        let Some(translator) = self.translator else {
            return Ok(None);
        };

        match translator.translate(prompt).await {
            Ok(translated) if translated.trim() == prompt => Ok(None),
            Ok(translated) => Ok(Some(translated)),
            Err(e) => match self.translation_policy {
                TranslationPolicy::Fallback => {
                    tracing::warn!(
                        retryable = e.is_retryable(),
                        error = %e,
                        "Translation failed, using original prompt"
                    );
                    Ok(None)
                }
                TranslationPolicy::FailClosed => Err(DesignError::TranslationFailed(e)),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clients::MemoryRequestCache;
    use crate::testing::{FakeArtifactStore, FakeImageGenerator, FakeTranslator, InMemoryStore};

    struct Harness {
        store: InMemoryStore,
        generator: FakeImageGenerator,
        translator: FakeTranslator,
        artifacts: FakeArtifactStore,
        cache: MemoryRequestCache,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: InMemoryStore::new(),
                generator: FakeImageGenerator::new(),
                translator: FakeTranslator::new(),
                artifacts: FakeArtifactStore::new(),
                cache: MemoryRequestCache::new(),
            }
        }

        fn service(&self, policy: TranslationPolicy) -> DesignService<'_> {
            DesignService::new(
                &self.store,
                &self.generator,
                Some(&self.translator),
                policy,
                &self.artifacts,
                &self.cache,
            )
        }
    }

    #[test]
    fn test_empty_prompt_rejected() {
        assert!(matches!(
            GenerateDesign::new("   ", None, None, None),
            Err(DesignError::EmptyPrompt)
        ));
        assert!(matches!(
            GenerateDesign::new("cat", None, None, Some(0.0)),
            Err(DesignError::InvalidPlacement(_))
        ));
    }

    #[test]
    fn test_artifact_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            artifact_key(UserId::new(5), &id),
            "designs/5/00000000-0000-0000-0000-000000000000.png"
        );
    }

    #[tokio::test]
    async fn test_generate_persists_translated_design() {
        let h = Harness::new();
        let user = h.store.seed_user("a@example.com").await;
        h.translator.respond_with("a cat surfing");

        let request = GenerateDesign::new("波に乗る猫", Some(10.0), None, Some(1.5)).unwrap();
        let design = h
            .service(TranslationPolicy::Fallback)
            .generate(user.id, request)
            .await
            .unwrap();

        assert_eq!(design.prompt, "波に乗る猫");
        assert_eq!(design.translated_prompt.as_deref(), Some("a cat surfing"));
        assert_eq!(h.generator.prompts(), vec!["a cat surfing".to_string()]);
        assert!(design.storage_key.starts_with(&format!("designs/{}/", user.id)));
        assert_eq!(h.artifacts.keys(), vec![design.storage_key.clone()]);
        assert!((design.placement.scale - 1.5).abs() < f64::EPSILON);
        assert_eq!(
            h.cache.artifact_url(design.id).await.as_deref(),
            Some(design.image_url.as_str())
        );
    }

    #[tokio::test]
    async fn test_translation_failure_policies() {
        let h = Harness::new();
        let user = h.store.seed_user("a@example.com").await;
        h.translator.fail();

        let request = GenerateDesign::new("夕焼け", None, None, None).unwrap();
        let design = h
            .service(TranslationPolicy::Fallback)
            .generate(user.id, request.clone())
            .await
            .unwrap();
        assert_eq!(design.translated_prompt, None);
        assert_eq!(h.generator.prompts(), vec!["夕焼け".to_string()]);

        let err = h
            .service(TranslationPolicy::FailClosed)
            .generate(user.id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, DesignError::TranslationFailed(_)));
        assert_eq!(h.generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_writes_nothing() {
        let h = Harness::new();
        let user = h.store.seed_user("a@example.com").await;
        h.generator.fail();

        let request = GenerateDesign::new("a robot", None, None, None).unwrap();
        let err = h
            .service(TranslationPolicy::Fallback)
            .generate(user.id, request)
            .await
            .unwrap_err();

        assert!(matches!(err, DesignError::GenerationFailed(_)));
        assert!(h.artifacts.keys().is_empty());
        assert!(h.store.list_designs(user.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_writes_no_row() {
        let h = Harness::new();
        let user = h.store.seed_user("a@example.com").await;
        h.artifacts.fail();

        let request = GenerateDesign::new("a robot", None, None, None).unwrap();
        let err = h
            .service(TranslationPolicy::Fallback)
            .generate(user.id, request)
            .await
            .unwrap_err();

        assert!(matches!(err, DesignError::StorageFailed(_)));
        assert!(h.store.list_designs(user.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_get_enforces_ownership() {
        let h = Harness::new();
        let owner = h.store.seed_user("owner@example.com").await;
        let other = h.store.seed_user("other@example.com").await;
        let design = h.store.seed_design(owner.id).await;
        let service = h.service(TranslationPolicy::Fallback);

        assert_eq!(service.get(owner.id, design.id).await.unwrap().id, design.id);
        assert!(matches!(
            service.get(other.id, design.id).await,
            Err(DesignError::Forbidden)
        ));
        assert!(matches!(
            service.get(owner.id, DesignId::new(404)).await,
            Err(DesignError::NotFound)
        ));
    }
}
