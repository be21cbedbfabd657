//! Thin clients for the third-party services the API delegates to.
//!
//! Each client is a trait with one production implementation. Services hold
//! them as `Arc<dyn Trait>` so tests can substitute the doubles in
//! [`crate::testing`].
//!
//! | Trait | Production | Backing service |
//! |-------|------------|-----------------|
//! | [`PaymentGateway`] | [`StripeClient`] | Stripe payment intents |
//! | [`ImageGenerator`] | [`StabilityClient`] | Stability text-to-image |
//! | [`Translator`] | [`DeeplClient`] | `DeepL` translation |
//! | [`ArtifactStore`] | [`S3ArtifactStore`] | Amazon S3 |
//! | [`RequestCache`] | [`DynamoRequestCache`], [`MemoryRequestCache`] | `DynamoDB` or in-process |
//! | [`Mailer`] | [`SmtpMailer`] | SMTP relay |

pub mod cache;
pub mod email;
pub mod generation;
pub mod payment;
pub mod storage;
pub mod translation;

pub use cache::{CacheError, DynamoRequestCache, MemoryRequestCache, PendingRequest, RequestCache};
pub use email::{EmailError, Mailer, OutgoingEmail, SmtpMailer};
pub use generation::{GenerationError, ImageGenerator, StabilityClient};
pub use payment::{CreateIntent, PaymentError, PaymentGateway, PaymentIntent, StripeClient};
pub use storage::{ArtifactStore, S3ArtifactStore, StorageError};
pub use translation::{DeeplClient, TranslationError, Translator};
