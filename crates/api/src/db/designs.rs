//! Design repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use tee_studio_core::{DesignId, Placement, UserId};

use super::{DesignStore, RepositoryError};
use crate::models::{Design, NewDesign};

/// Repository for design database operations.
#[derive(Clone)]
pub struct DesignRepository {
    pool: PgPool,
}

impl DesignRepository {
    /// Create a new design repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DesignRow {
    id: i32,
    user_id: i32,
    prompt: String,
    translated_prompt: Option<String>,
    image_url: String,
    storage_key: String,
    position_x: f64,
    position_y: f64,
    scale: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<DesignRow> for Design {
    type Error = RepositoryError;

    fn try_from(row: DesignRow) -> Result<Self, Self::Error> {
        let placement = Placement::new(row.position_x, row.position_y, row.scale).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid placement on design {}: {e}", row.id))
        })?;

        Ok(Self {
            id: DesignId::new(row.id),
            user_id: UserId::new(row.user_id),
            prompt: row.prompt,
            translated_prompt: row.translated_prompt,
            image_url: row.image_url,
            storage_key: row.storage_key,
            placement,
            created_at: row.created_at,
        })
    }
}

const DESIGN_COLUMNS: &str = "id, user_id, prompt, translated_prompt, image_url, storage_key, \
                              position_x, position_y, scale, created_at";

#[async_trait]
impl DesignStore for DesignRepository {
    async fn insert(&self, design: NewDesign) -> Result<Design, RepositoryError> {
        let sql = format!(
            "INSERT INTO designs
                (user_id, prompt, translated_prompt, image_url, storage_key,
                 position_x, position_y, scale)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {DESIGN_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DesignRow>(&sql)
            .bind(design.user_id)
            .bind(&design.prompt)
            .bind(&design.translated_prompt)
            .bind(&design.image_url)
            .bind(&design.storage_key)
            .bind(design.placement.x)
            .bind(design.placement.y)
            .bind(design.placement.scale)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn get(&self, id: DesignId) -> Result<Option<Design>, RepositoryError> {
        let sql = format!("SELECT {DESIGN_COLUMNS} FROM designs WHERE id = $1");
        let row = sqlx::query_as::<_, DesignRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Design::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Design>, RepositoryError> {
        let sql = format!(
            "SELECT {DESIGN_COLUMNS} FROM designs
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, DesignRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Design::try_from).collect()
    }
}
