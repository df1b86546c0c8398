//! Transactional application of merge plans.

use sqlx::SqlitePool;
use tracing::info;

use crate::db::{self, RetryPolicy, StoreError};

use super::MergePlan;

/// Apply one group's merge: update the survivor's gap fields and delete the
/// duplicates, atomically, retrying the whole transaction on lock
/// contention.
pub async fn apply_merge(
    pool: &SqlitePool,
    policy: RetryPolicy,
    plan: &MergePlan,
) -> Result<u64, StoreError> {
    let deleted = db::with_retry(policy, "merge group", db::is_busy, move || async move {
        let mut tx = pool.begin().await?;

        if !plan.updates.is_empty() {
            let updates: Vec<_> = plan
                .updates
                .iter()
                .map(|(field, value)| (field.column(), value.clone()))
                .collect();
            db::update_columns(&mut *tx, plan.survivor_id, &updates).await?;
        }

        let placeholders = vec!["?"; plan.delete_ids.len()].join(", ");
        let sql = format!("DELETE FROM places WHERE id IN ({})", placeholders);
        let mut query = sqlx::query(&sql);
        for id in &plan.delete_ids {
            query = query.bind(*id);
        }
        let deleted = query.execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        Ok(deleted)
    })
    .await?;

    info!(
        "Merged group {}: kept id={}, removed {} row(s)",
        plan.key, plan.survivor_id, deleted
    );
    Ok(deleted)
}
