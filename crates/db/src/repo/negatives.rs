use sqlx::SqlitePool;

/// Check for a live failure record.
///
/// A record older than `ttl_secs` is treated as absent and deleted as a side
/// effect of the read, so the next resolution attempt retries discovery.
pub async fn is_failed(
    pool: &SqlitePool,
    external_id: &str,
    ttl_secs: i64,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT checked_at FROM failed_lookup WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(pool)
            .await?;

    let Some((checked_at,)) = row else {
        return Ok(false);
    };

    let now = chrono::Utc::now().timestamp();
    if now - checked_at > ttl_secs {
        sqlx::query("DELETE FROM failed_lookup WHERE external_id = ?")
            .bind(external_id)
            .execute(pool)
            .await?;
        return Ok(false);
    }

    Ok(true)
}

/// Record (or refresh) a failed resolution attempt for an external id.
///
/// Guarded against a concurrent discovery that just succeeded: if a mapping
/// for the external id exists, no failure record is written.
pub async fn record_failure(pool: &SqlitePool, external_id: &str) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO failed_lookup (external_id, checked_at) \
         SELECT ?1, ?2 \
         WHERE NOT EXISTS (SELECT 1 FROM mapping WHERE external_id = ?1) \
         ON CONFLICT(external_id) DO UPDATE SET checked_at = excluded.checked_at",
    )
    .bind(external_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete all failure records older than `ttl_secs`. Returns the number removed.
pub async fn purge_expired(pool: &SqlitePool, ttl_secs: i64) -> Result<u64, sqlx::Error> {
    let cutoff = chrono::Utc::now().timestamp() - ttl_secs;
    let result = sqlx::query("DELETE FROM failed_lookup WHERE checked_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = crate::connect(":memory:").await.unwrap();
        crate::migrate::run(&pool).await.unwrap();
        pool
    }

    async fn backdate(pool: &SqlitePool, external_id: &str, secs: i64) {
        let ts = chrono::Utc::now().timestamp() - secs;
        sqlx::query("UPDATE failed_lookup SET checked_at = ? WHERE external_id = ?")
            .bind(ts)
            .bind(external_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fresh_record_is_live() {
        let pool = test_pool().await;
        record_failure(&pool, "tt9999999").await.unwrap();
        assert!(is_failed(&pool, "tt9999999", 3600).await.unwrap());
    }

    #[tokio::test]
    async fn expired_record_is_deleted_on_read() {
        let pool = test_pool().await;
        record_failure(&pool, "tt9999999").await.unwrap();
        backdate(&pool, "tt9999999", 7200).await;

        assert!(!is_failed(&pool, "tt9999999", 3600).await.unwrap());

        // The read removed the row entirely
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT checked_at FROM failed_lookup WHERE external_id = ?")
                .bind("tt9999999")
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn repeat_failure_refreshes_timestamp() {
        let pool = test_pool().await;
        record_failure(&pool, "tt9999999").await.unwrap();
        backdate(&pool, "tt9999999", 3000).await;
        record_failure(&pool, "tt9999999").await.unwrap();

        // Refreshed inside the window, still live
        assert!(is_failed(&pool, "tt9999999", 3600).await.unwrap());
    }

    #[tokio::test]
    async fn failure_is_not_recorded_over_a_live_mapping() {
        let pool = test_pool().await;
        crate::repo::mappings::upsert(&pool, "frieren", "4242", "tt22248376")
            .await
            .unwrap();

        record_failure(&pool, "tt22248376").await.unwrap();
        assert!(!is_failed(&pool, "tt22248376", 3600).await.unwrap());
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let pool = test_pool().await;
        record_failure(&pool, "tt0000001").await.unwrap();
        record_failure(&pool, "tt0000002").await.unwrap();
        backdate(&pool, "tt0000001", 7200).await;

        let removed = purge_expired(&pool, 3600).await.unwrap();
        assert_eq!(removed, 1);
        assert!(is_failed(&pool, "tt0000002", 3600).await.unwrap());
    }
}
