//! Persistent embedding cache keyed by `(content_hash, model)`.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::EmbedError;

/// `SQLite` bind-parameter headroom per lookup query.
const LOOKUP_BATCH: usize = 500;

#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    pool: SqlitePool,
}

impl EmbeddingCache {
    /// Open (or create) the cache database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str) -> Result<Self, EmbedError> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EmbedError::Cache(sqlx::Error::Io(e)))?;
            }
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // An in-memory database lives per connection.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("../../migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Look up cached vectors for `hashes` under `model`. Missing keys are absent
    /// from the returned map.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_many(
        &self,
        hashes: &[String],
        model: &str,
    ) -> Result<HashMap<String, Vec<f32>>, EmbedError> {
        let mut found = HashMap::with_capacity(hashes.len());
        for batch in hashes.chunks(LOOKUP_BATCH) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT content_hash, vector FROM embedding_cache WHERE model = ");
            qb.push_bind(model);
            qb.push(" AND content_hash IN (");
            let mut list = qb.separated(", ");
            for hash in batch {
                list.push_bind(hash);
            }
            list.push_unseparated(")");

            let rows: Vec<(String, Vec<u8>)> =
                qb.build_query_as().fetch_all(&self.pool).await?;
            for (hash, blob) in rows {
                found.insert(hash, decode_vector(&blob));
            }
        }
        Ok(found)
    }

    /// Store vectors for `model`, replacing existing entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn put_many(&self, model: &str, entries: &[(String, Vec<f32>)]) -> Result<(), EmbedError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for (hash, vector) in entries {
            sqlx::query(
                "INSERT OR REPLACE INTO embedding_cache (content_hash, model, dimension, vector) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(hash)
            .bind(model)
            .bind(i64::try_from(vector.len()).unwrap_or(i64::MAX))
            .bind(encode_vector(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Number of cached vectors for `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self, model: &str) -> Result<u64, EmbedError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embedding_cache WHERE model = ?")
            .bind(model)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_encoding_preserves_values() {
        let v = vec![0.25_f32, -1.5, f32::MIN_POSITIVE, 3.0e8];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }

    #[tokio::test]
    async fn hits_are_scoped_by_model() {
        let cache = EmbeddingCache::open(":memory:").await.unwrap();
        cache
            .put_many("model-a", &[("h1".into(), vec![1.0, 2.0])])
            .await
            .unwrap();

        let hits = cache
            .get_many(&["h1".into(), "h2".into()], "model-a")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits["h1"], vec![1.0, 2.0]);

        let other = cache.get_many(&["h1".into()], "model-b").await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let cache = EmbeddingCache::open(":memory:").await.unwrap();
        cache.put_many("m", &[("h".into(), vec![1.0])]).await.unwrap();
        cache.put_many("m", &[("h".into(), vec![2.0])]).await.unwrap();
        assert_eq!(cache.count("m").await.unwrap(), 1);
        let hits = cache.get_many(&["h".into()], "m").await.unwrap();
        assert_eq!(hits["h"], vec![2.0]);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache.db");
        let path = path.to_str().unwrap();
        {
            let cache = EmbeddingCache::open(path).await.unwrap();
            cache.put_many("m", &[("h".into(), vec![0.5])]).await.unwrap();
        }
        let cache = EmbeddingCache::open(path).await.unwrap();
        assert_eq!(cache.count("m").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lookup_spans_multiple_query_batches() {
        let cache = EmbeddingCache::open(":memory:").await.unwrap();
        let entries: Vec<(String, Vec<f32>)> = (0..LOOKUP_BATCH + 10)
            .map(|i| (format!("h{i}"), vec![1.0]))
            .collect();
        cache.put_many("m", &entries).await.unwrap();
        let hashes: Vec<String> = entries.iter().map(|(h, _)| h.clone()).collect();
        assert_eq!(cache.get_many(&hashes, "m").await.unwrap().len(), LOOKUP_BATCH + 10);
    }
}
