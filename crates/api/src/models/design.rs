//! Generated design domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tee_studio_core::{DesignId, Placement, UserId};

/// A generated artwork and where it sits on the mockup.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Design {
    pub id: DesignId,
    pub user_id: UserId,
    /// The prompt as the user typed it.
    pub prompt: String,
    /// The prompt actually sent to the generator, when it was translated.
    pub translated_prompt: Option<String>,
    pub image_url: String,
    /// Object key of the stored artifact.
    pub storage_key: String,
    #[serde(flatten)]
    pub placement: Placement,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to persist a freshly generated design.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDesign {
    pub user_id: UserId,
    pub prompt: String,
    pub translated_prompt: Option<String>,
    pub image_url: String,
    pub storage_key: String,
    pub placement: Placement,
}
