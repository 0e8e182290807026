use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode};
use tracing::{debug, info, warn};

use super::embeddings::EmbeddingProvider;
use super::error::{MemoryError, Result};
use super::schema;
use super::types::{MemoryRecord, Metadata};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// An embedding-indexed, append-only store of text records.
///
/// The store embeds content itself; callers hand over text and metadata only.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist one record and its embedding. Adding an id that already exists
    /// is an error, never an overwrite.
    async fn add(&self, id: &str, content: &str, metadata: &Metadata) -> Result<()>;

    /// Return up to `k` records nearest to `query`, closest first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<MemoryRecord>>;

    /// Total number of persisted records.
    async fn count(&self) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// Distance
// ---------------------------------------------------------------------------

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// A zero vector has no direction; its distance to anything is `1.0`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 2.0)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// [`VectorStore`] backed by a single SQLite file.
///
/// Search is brute force: every stored embedding is compared with the query.
/// That is plenty for a personal notebook. The connection sits behind a
/// mutex that is never held across an `.await`.
#[derive(Clone)]
pub struct SqliteVectorStore {
    db: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteVectorStore {
    /// Open (or create) the store at `path`, applying schema migrations.
    pub fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Config(format!(
                    "cannot create memory directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        schema::run_migrations(&conn)?;

        info!(
            db = %path.display(),
            model = embedder.model_name(),
            "vector store ready"
        );

        Ok(Self::from_connection(conn, embedder))
    }

    /// A throwaway store, mainly for tests.
    pub fn open_in_memory(embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self::from_connection(conn, embedder))
    }

    fn from_connection(conn: Connection, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            embedder,
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(&[text.to_string()])
            .await
            .map_err(MemoryError::Embedding)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                MemoryError::Embedding(anyhow::anyhow!("embedding provider returned no vector"))
            })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add(&self, id: &str, content: &str, metadata: &Metadata) -> Result<()> {
        let embedding = self.embed_one(content).await?;
        let metadata_json = serde_json::to_string(metadata)?;
        let created_at = chrono::Utc::now().to_rfc3339();

        let db = self.db.lock();
        let inserted = db.execute(
            "INSERT INTO memories (id, content, metadata, embedding, model, dimensions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                content,
                metadata_json,
                encode_embedding(&embedding),
                self.embedder.model_name(),
                embedding.len() as i64,
                created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(MemoryError::DuplicateId(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<MemoryRecord>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embed_one(query).await?;

        let rows = {
            let db = self.db.lock();
            let mut stmt = db.prepare(
                "SELECT id, content, metadata, embedding, model, dimensions
                 FROM memories ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        // Vectors from another model live in a different space even when the
        // sizes agree, so only rows from the current model are comparable.
        let model = self.embedder.model_name();
        let dimensions = query_embedding.len() as i64;
        let mut skipped = 0usize;
        let mut scored = Vec::with_capacity(rows.len());
        for (id, content, metadata_json, blob, row_model, row_dimensions) in rows {
            if row_model != model || row_dimensions != dimensions {
                skipped += 1;
                continue;
            }
            let embedding = decode_embedding(&blob);
            let metadata: Metadata = serde_json::from_str(&metadata_json)?;
            scored.push(MemoryRecord {
                distance: Some(cosine_distance(&query_embedding, &embedding)),
                id,
                content,
                metadata,
            });
        }

        if skipped > 0 {
            warn!(
                skipped,
                model = %model,
                dimensions,
                "skipped memories embedded with a different model"
            );
        }

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| {
            a.distance
                .unwrap_or(f64::MAX)
                .total_cmp(&b.distance.unwrap_or(f64::MAX))
        });
        scored.truncate(k);

        debug!(k, returned = scored.len(), "vector search");
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        let db = self.db.lock();
        let count: i64 = db.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
