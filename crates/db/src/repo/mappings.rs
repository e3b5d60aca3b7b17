use sqlx::SqlitePool;

/// A persisted slug ↔ external id relation. `provider_id` is the metadata
/// service's own id for the title, kept so artwork lookups can skip the
/// find-by-external-id round trip.
#[derive(Debug, Clone)]
pub struct MappingRow {
    pub slug: String,
    pub provider_id: String,
    pub external_id: String,
    pub created_ts: i64,
    pub updated_ts: i64,
}

pub async fn get_by_slug(
    pool: &SqlitePool,
    slug: &str,
) -> Result<Option<MappingRow>, sqlx::Error> {
    let row: Option<(String, String, String, i64, i64)> = sqlx::query_as(
        "SELECT slug, provider_id, external_id, created_ts, updated_ts \
         FROM mapping WHERE slug = ?",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_mapping))
}

pub async fn get_by_external_id(
    pool: &SqlitePool,
    external_id: &str,
) -> Result<Option<MappingRow>, sqlx::Error> {
    let row: Option<(String, String, String, i64, i64)> = sqlx::query_as(
        "SELECT slug, provider_id, external_id, created_ts, updated_ts \
         FROM mapping WHERE external_id = ?",
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_mapping))
}

/// Upsert a mapping keyed by slug.
///
/// One transaction: any stale row holding the same external id under a
/// different slug is removed first (external_id carries a unique index), and
/// any failure record for the external id is cleared — a live mapping and a
/// live failure record must never coexist.
pub async fn upsert(
    pool: &SqlitePool,
    slug: &str,
    provider_id: &str,
    external_id: &str,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM mapping WHERE external_id = ? AND slug <> ?")
        .bind(external_id)
        .bind(slug)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO mapping (slug, provider_id, external_id, created_ts, updated_ts) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(slug) DO UPDATE SET \
             provider_id = excluded.provider_id, \
             external_id = excluded.external_id, \
             updated_ts = excluded.updated_ts",
    )
    .bind(slug)
    .bind(provider_id)
    .bind(external_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM failed_lookup WHERE external_id = ?")
        .bind(external_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mapping")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

fn row_to_mapping(r: (String, String, String, i64, i64)) -> MappingRow {
    MappingRow {
        slug: r.0,
        provider_id: r.1,
        external_id: r.2,
        created_ts: r.3,
        updated_ts: r.4,
    }
}
