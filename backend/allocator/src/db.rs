//! Database layer: migrations and committed-distribution storage.

use std::str::FromStr;

use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use crate::distribution::{MerkleDistribution, RoundPhase};
use crate::errors::{AllocatorError, Result};
use crate::types::DistributionEntry;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Every connection to `:memory:` opens its own empty database.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

#[derive(Debug, sqlx::FromRow)]
struct DistributionRow {
    chain_id: i64,
    round_id: String,
    root: String,
    leaves: String,
    status: String,
    publish_tx: Option<String>,
    created_at: i64,
}

/// A distribution as persisted, with its lifecycle status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDistribution {
    pub chain_id: u64,
    pub round_id: String,
    pub root: String,
    pub leaves: Vec<DistributionEntry>,
    pub status: RoundPhase,
    pub publish_tx: Option<String>,
    pub created_at: i64,
}

impl StoredDistribution {
    /// Rebuild the tree so proofs can be served; the root must match.
    pub fn tree(&self) -> Result<MerkleDistribution> {
        let tree = MerkleDistribution::from_leaves(self.leaves.clone())?;
        if tree.root().to_string() != self.root {
            return Err(AllocatorError::Source(format!(
                "stored distribution {} does not rebuild to its root",
                self.root
            )));
        }
        Ok(tree)
    }
}

impl TryFrom<DistributionRow> for StoredDistribution {
    type Error = AllocatorError;

    fn try_from(row: DistributionRow) -> Result<Self> {
        Ok(StoredDistribution {
            chain_id: row.chain_id as u64,
            round_id: row.round_id,
            leaves: serde_json::from_str(&row.leaves)?,
            status: RoundPhase::parse(&row.status).ok_or_else(|| {
                AllocatorError::Source(format!("unknown distribution status {:?}", row.status))
            })?,
            root: row.root,
            publish_tx: row.publish_tx,
            created_at: row.created_at,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Persist a committed distribution and make it the round's latest.
///
/// Committing a root that is already stored (the same leaves again, or a
/// revert to an earlier input set) writes no new row but moves that row to
/// the front of the commit order. Returns whether a row was written.
pub async fn insert_distribution(
    pool: &SqlitePool,
    chain_id: u64,
    round_id: &str,
    tree: &MerkleDistribution,
) -> Result<bool> {
    let leaves = serde_json::to_string(tree.leaves())?;
    let root = tree.root().to_string();
    let mut tx = pool.begin().await?;

    let (next_seq,): (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(MAX(committed_seq), 0) + 1
        FROM   distributions
        WHERE  chain_id = ?1 AND round_id = ?2
        "#,
    )
    .bind(chain_id as i64)
    .bind(round_id)
    .fetch_one(&mut *tx)
    .await?;

    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM distributions WHERE chain_id = ?1 AND round_id = ?2 AND root = ?3",
    )
    .bind(chain_id as i64)
    .bind(round_id)
    .bind(&root)
    .fetch_optional(&mut *tx)
    .await?;

    let created = match existing {
        Some((id,)) => {
            sqlx::query("UPDATE distributions SET committed_seq = ?1 WHERE id = ?2")
                .bind(next_seq)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            false
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO distributions (chain_id, round_id, root, leaves, status, committed_seq)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(chain_id as i64)
            .bind(round_id)
            .bind(&root)
            .bind(leaves)
            .bind(RoundPhase::Committed.as_str())
            .bind(next_seq)
            .execute(&mut *tx)
            .await?;
            true
        }
    };

    tx.commit().await?;
    Ok(created)
}

/// Record that `root` has been handed to the chain in `publish_tx`.
pub async fn mark_published(
    pool: &SqlitePool,
    chain_id: u64,
    round_id: &str,
    root: &str,
    publish_tx: &str,
) -> Result<StoredDistribution> {
    let current = get_distribution(pool, chain_id, round_id, root)
        .await?
        .ok_or_else(|| AllocatorError::NotFound(format!("distribution {root}")))?;
    let next = current.status.advance_to(RoundPhase::Published)?;

    let rows_affected = sqlx::query(
        r#"
        UPDATE distributions
        SET    status = ?1, publish_tx = ?2
        WHERE  chain_id = ?3 AND round_id = ?4 AND root = ?5 AND status = ?6
        "#,
    )
    .bind(next.as_str())
    .bind(publish_tx)
    .bind(chain_id as i64)
    .bind(round_id)
    .bind(root)
    .bind(current.status.as_str())
    .execute(pool)
    .await?
    .rows_affected();

    if rows_affected == 0 {
        return Err(AllocatorError::InvalidTransition(format!(
            "distribution {root} changed status concurrently"
        )));
    }

    Ok(StoredDistribution {
        status: next,
        publish_tx: Some(publish_tx.to_string()),
        ..current
    })
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn get_distribution(
    pool: &SqlitePool,
    chain_id: u64,
    round_id: &str,
    root: &str,
) -> Result<Option<StoredDistribution>> {
    let row = sqlx::query_as::<_, DistributionRow>(
        r#"
        SELECT chain_id, round_id, root, leaves, status, publish_tx, created_at
        FROM   distributions
        WHERE  chain_id = ?1 AND round_id = ?2 AND root = ?3
        "#,
    )
    .bind(chain_id as i64)
    .bind(round_id)
    .bind(root)
    .fetch_optional(pool)
    .await?;
    row.map(StoredDistribution::try_from).transpose()
}

/// Most recently committed distribution for a round, by commit order.
pub async fn latest_distribution(
    pool: &SqlitePool,
    chain_id: u64,
    round_id: &str,
) -> Result<Option<StoredDistribution>> {
    let row = sqlx::query_as::<_, DistributionRow>(
        r#"
        SELECT chain_id, round_id, root, leaves, status, publish_tx, created_at
        FROM   distributions
        WHERE  chain_id = ?1 AND round_id = ?2
        ORDER  BY committed_seq DESC, id DESC
        LIMIT  1
        "#,
    )
    .bind(chain_id as i64)
    .bind(round_id)
    .fetch_optional(pool)
    .await?;
    row.map(StoredDistribution::try_from).transpose()
}
