use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{ResponseEditId, ResponseId};

/// ResponseEdit - audit record of one in-place edit.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResponseEdit {
    pub id: ResponseEditId,
    pub response_id: ResponseId,
    pub edit_number: i32,

    pub previous_content: String,
    pub new_content: String,
    pub characters_changed: i32,

    pub edited_at: DateTime<Utc>,
}

impl ResponseEdit {
    pub async fn create(
        response_id: ResponseId,
        edit_number: i32,
        previous_content: &str,
        new_content: &str,
        characters_changed: i32,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let edit = sqlx::query_as::<_, ResponseEdit>(
            r#"
            INSERT INTO response_edits (id, response_id, edit_number, previous_content, new_content, characters_changed)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(ResponseEditId::new())
        .bind(response_id)
        .bind(edit_number)
        .bind(previous_content)
        .bind(new_content)
        .bind(characters_changed)
        .fetch_one(executor)
        .await?;
        Ok(edit)
    }

    /// Edit history for a response, in order.
    pub async fn find_by_response(response_id: ResponseId, pool: &PgPool) -> Result<Vec<Self>> {
        let edits = sqlx::query_as::<_, ResponseEdit>(
            "SELECT * FROM response_edits WHERE response_id = $1 ORDER BY edit_number",
        )
        .bind(response_id)
        .fetch_all(pool)
        .await?;
        Ok(edits)
    }
}
