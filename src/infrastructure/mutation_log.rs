use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::domain::mutation::{Mutation, MutationStatus, PendingMutation, Sequence};
use crate::error::SyncError;

/// Durable, ordered storage behind the sync queue.
///
/// Status changes are guarded: an update only applies when the row is in the
/// expected source state, otherwise `SyncError::InvalidTransition` is returned.
#[async_trait]
pub trait MutationLog: Send + Sync {
    /// Persists `mutation` as pending and returns it with its sequence.
    async fn append(&self, mutation: &Mutation) -> Result<PendingMutation, SyncError>;

    /// Lowest sequence still in the log.
    async fn head(&self) -> Result<Option<PendingMutation>, SyncError>;

    /// Pending -> InFlight, counting one attempt.
    async fn mark_in_flight(&self, sequence: Sequence) -> Result<(), SyncError>;

    /// InFlight -> Pending, keeping the failure reason when there is one.
    async fn release_to_pending(&self, sequence: Sequence, error: Option<&str>) -> Result<(), SyncError>;

    /// InFlight -> Acknowledged. The row is erased.
    async fn acknowledge(&self, sequence: Sequence) -> Result<(), SyncError>;

    /// Every InFlight row back to Pending. Returns how many moved.
    async fn reset_in_flight(&self) -> Result<u64, SyncError>;

    async fn list(&self) -> Result<Vec<PendingMutation>, SyncError>;

    async fn len(&self) -> Result<usize, SyncError>;
}

#[derive(FromRow)]
struct MutationRow {
    sequence: i64,
    id: String,
    payload: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    enqueued_at: DateTime<Utc>,
}

impl TryFrom<MutationRow> for PendingMutation {
    type Error = SyncError;

    fn try_from(row: MutationRow) -> Result<Self, Self::Error> {
        Ok(PendingMutation {
            mutation: serde_json::from_str(&row.payload)?,
            status: row.status.parse()?,
            attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
            id: row.id,
            sequence: row.sequence,
            last_error: row.last_error,
            enqueued_at: row.enqueued_at,
        })
    }
}

/// Called with every mutation appended inside another component's
/// transaction, once that transaction has committed.
pub type AppendHook = Arc<dyn Fn(&PendingMutation) + Send + Sync>;

/// Appends `mutation` as pending on `conn`.
///
/// Run inside the transaction of the local write it records, the mutation
/// and the write commit or roll back together, and the sequence follows
/// commit order.
pub async fn append_on(conn: &mut SqliteConnection, mutation: &Mutation) -> Result<PendingMutation, SyncError> {
    let id = uuid::Uuid::new_v4().to_string();
    let payload = serde_json::to_string(mutation)?;
    let enqueued_at = Utc::now();

    let sequence: i64 = sqlx::query_scalar(
        "INSERT INTO pending_mutations (id, entity_type, action, entity_key, payload, enqueued_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING sequence",
    )
    .bind(&id)
    .bind(mutation.entity_type().as_str())
    .bind(mutation.action().as_str())
    .bind(mutation.person_code())
    .bind(&payload)
    .bind(enqueued_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(PendingMutation {
        id,
        sequence,
        mutation: mutation.clone(),
        status: MutationStatus::Pending,
        attempts: 0,
        last_error: None,
        enqueued_at,
    })
}

const SELECT_COLUMNS: &str =
    "SELECT sequence, id, payload, status, attempts, last_error, enqueued_at FROM pending_mutations";

pub struct SqliteMutationLog {
    pool: SqlitePool,
}

impl SqliteMutationLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, sequence: Sequence) -> Result<MutationStatus, SyncError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM pending_mutations WHERE sequence = ?1")
                .bind(sequence)
                .fetch_optional(&self.pool)
                .await?;

        // a missing row has already been acknowledged
        match status {
            Some(s) => Ok(s.parse()?),
            None => Ok(MutationStatus::Acknowledged),
        }
    }

    async fn rejected_transition(
        &self,
        sequence: Sequence,
        to: MutationStatus,
    ) -> Result<(), SyncError> {
        let from = self.current_status(sequence).await?;
        Err(SyncError::InvalidTransition { sequence, from, to })
    }
}

#[async_trait]
impl MutationLog for SqliteMutationLog {
    async fn append(&self, mutation: &Mutation) -> Result<PendingMutation, SyncError> {
        let mut conn = self.pool.acquire().await?;
        append_on(&mut conn, mutation).await
    }

    async fn head(&self) -> Result<Option<PendingMutation>, SyncError> {
        let row: Option<MutationRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY sequence ASC LIMIT 1"))
            .fetch_optional(&self.pool)
            .await?;
        row.map(PendingMutation::try_from).transpose()
    }

    async fn mark_in_flight(&self, sequence: Sequence) -> Result<(), SyncError> {
        let result = sqlx::query(
            "UPDATE pending_mutations SET status = 'in_flight', attempts = attempts + 1
             WHERE sequence = ?1 AND status = 'pending'",
        )
        .bind(sequence)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self.rejected_transition(sequence, MutationStatus::InFlight).await;
        }
        Ok(())
    }

    async fn release_to_pending(&self, sequence: Sequence, error: Option<&str>) -> Result<(), SyncError> {
        let result = sqlx::query(
            "UPDATE pending_mutations SET status = 'pending', last_error = COALESCE(?2, last_error)
             WHERE sequence = ?1 AND status = 'in_flight'",
        )
        .bind(sequence)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self.rejected_transition(sequence, MutationStatus::Pending).await;
        }
        Ok(())
    }

    async fn acknowledge(&self, sequence: Sequence) -> Result<(), SyncError> {
        let result = sqlx::query("DELETE FROM pending_mutations WHERE sequence = ?1 AND status = 'in_flight'")
            .bind(sequence)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return self.rejected_transition(sequence, MutationStatus::Acknowledged).await;
        }
        Ok(())
    }

    async fn reset_in_flight(&self) -> Result<u64, SyncError> {
        let result = sqlx::query("UPDATE pending_mutations SET status = 'pending' WHERE status = 'in_flight'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list(&self) -> Result<Vec<PendingMutation>, SyncError> {
        let rows: Vec<MutationRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY sequence ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PendingMutation::try_from).collect()
    }

    async fn len(&self) -> Result<usize, SyncError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_mutations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
