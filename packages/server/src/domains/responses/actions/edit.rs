//! In-place response editing under a character-change budget.
//!
//! A response may change at most `response_edit_percentage` percent of its
//! original character count across all edits, in at most
//! `response_edit_limit` edits. Every edit leaves an audit row.

use similar::{DiffOp, TextDiff};
use sqlx::PgPool;
use tracing::info;

use crate::common::{DomainError, DomainResult, ResponseId, UserId};
use crate::domains::platform::PlatformConfig;
use crate::domains::responses::models::{Response, ResponseEdit};

/// Characters changed between two versions: deletions plus insertions, with
/// replacements counted once at the larger side's length.
pub fn characters_changed(old: &str, new: &str) -> i32 {
    let diff = TextDiff::from_chars(old, new);
    let mut changed = 0usize;
    for op in diff.ops() {
        match op {
            DiffOp::Delete { old_len, .. } => changed += old_len,
            DiffOp::Insert { new_len, .. } => changed += new_len,
            DiffOp::Replace {
                old_len, new_len, ..
            } => changed += (*old_len).max(*new_len),
            DiffOp::Equal { .. } => {}
        }
    }
    changed as i32
}

/// Remaining character budget for a response.
pub fn remaining_budget(response: &Response, config: &PlatformConfig) -> i32 {
    let max_changeable = response.character_count * config.response_edit_percentage / 100;
    (max_changeable - response.characters_changed_total).max(0)
}

/// Edit a response in place.
pub async fn edit(
    pool: &PgPool,
    response_id: ResponseId,
    user_id: UserId,
    new_content: &str,
) -> DomainResult<Response> {
    if new_content.trim().is_empty() {
        return Err(DomainError::ContentEmpty);
    }

    let mut tx = pool.begin().await?;

    let response = Response::lock_for_update(response_id, &mut tx).await?;
    if response.user_id != user_id {
        return Err(DomainError::NotOwner);
    }
    if response.is_locked {
        return Err(DomainError::ResponseLocked);
    }

    let config = PlatformConfig::load_with(&mut *tx).await?;
    if response.edit_count >= config.response_edit_limit {
        return Err(DomainError::EditLimitExceeded {
            limit: config.response_edit_limit,
        });
    }

    let requested = characters_changed(&response.content, new_content);
    let remaining = remaining_budget(&response, &config);
    if requested > remaining {
        return Err(DomainError::EditBudgetExceeded {
            requested,
            remaining,
        });
    }

    ResponseEdit::create(
        response.id,
        response.edit_count + 1,
        &response.content,
        new_content,
        requested,
        &mut *tx,
    )
    .await?;
    let updated = Response::apply_edit(response.id, new_content, requested, &mut *tx).await?;

    tx.commit().await?;

    info!(
        response_id = %response_id,
        characters_changed = requested,
        edit_number = updated.edit_count,
        "response edited"
    );
    Ok(updated)
}
