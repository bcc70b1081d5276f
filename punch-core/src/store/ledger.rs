use sqlx::{Executor, Sqlite, SqliteConnection};

const REVISION_PARAM: &str = "revision";

/// The last revision this database has reconciled with the server.
///
/// Stored as the `revision` row of `params`; a database that has never
/// synced is at revision 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ledger {
    revision: i64,
}

impl Ledger {
    pub fn revision(&self) -> i64 {
        self.revision
    }

    /// Reads the ledger as the first statement of a sync round.
    ///
    /// The row is touched with a write before it is read, which makes the
    /// surrounding transaction take the database write lock immediately.
    /// Nothing else can change pending records until the round ends.
    pub async fn load(conn: &mut SqliteConnection) -> Result<Self, sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO params (param, value) VALUES (?, '0')")
            .bind(REVISION_PARAM)
            .execute(&mut *conn)
            .await?;

        Self::read(&mut *conn).await
    }

    /// Reads the ledger without locking.
    pub async fn read<'e, E>(executor: E) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let value: Option<(String,)> = sqlx::query_as("SELECT value FROM params WHERE param = ?")
            .bind(REVISION_PARAM)
            .fetch_optional(executor)
            .await?;

        let revision = match value {
            Some((v,)) => v.trim().parse::<i64>().map_err(|e| {
                sqlx::Error::Decode(format!("invalid stored revision '{}': {}", v, e).into())
            })?,
            None => 0,
        };

        Ok(Self { revision })
    }

    /// Moves the ledger forward to `revision`. The ledger never moves back.
    pub async fn advance(
        &mut self,
        conn: &mut SqliteConnection,
        revision: i64,
    ) -> Result<(), sqlx::Error> {
        let next = revision.max(self.revision);

        sqlx::query(
            "INSERT INTO params (param, value) VALUES (?, ?) \
             ON CONFLICT(param) DO UPDATE SET value = excluded.value",
        )
        .bind(REVISION_PARAM)
        .bind(next.to_string())
        .execute(&mut *conn)
        .await?;

        self.revision = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::init_db;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ledger_starts_at_zero_and_advances() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("clock.db")).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let mut ledger = Ledger::load(&mut tx).await.unwrap();
        assert_eq!(ledger.revision(), 0);

        ledger.advance(&mut tx, 7).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(Ledger::read(&pool).await.unwrap().revision(), 7);
    }

    #[tokio::test]
    async fn test_ledger_never_moves_back() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("clock.db")).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let mut ledger = Ledger::load(&mut conn).await.unwrap();
        ledger.advance(&mut conn, 9).await.unwrap();
        ledger.advance(&mut conn, 4).await.unwrap();

        assert_eq!(ledger.revision(), 9);
        assert_eq!(Ledger::read(&mut *conn).await.unwrap().revision(), 9);
    }

    #[tokio::test]
    async fn test_rolled_back_advance_is_not_visible() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("clock.db")).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let mut ledger = Ledger::load(&mut tx).await.unwrap();
        ledger.advance(&mut tx, 3).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(Ledger::read(&pool).await.unwrap().revision(), 0);
    }
}
