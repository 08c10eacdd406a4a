use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full scheduler schema: questions, sessions with their group
/// history, the answer ledger, per-user settings, issue reports, and indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    bank_id INTEGER NOT NULL,
                    kind TEXT NOT NULL,
                    content TEXT NOT NULL,
                    options TEXT NOT NULL,
                    standard_answer TEXT NOT NULL,
                    mastery INTEGER NOT NULL CHECK (mastery >= 0),
                    favorite INTEGER NOT NULL DEFAULT 0,
                    reported INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS practice_sessions (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    round INTEGER NOT NULL CHECK (round >= 1),
                    bank_ids TEXT NOT NULL,
                    type_ratio TEXT NOT NULL,
                    target_count INTEGER NOT NULL CHECK (target_count > 0),
                    realtime_analysis INTEGER NOT NULL,
                    current_epoch INTEGER NOT NULL,
                    next_epoch INTEGER NOT NULL,
                    used_question_ids TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS practice_groups (
                    session_id TEXT NOT NULL,
                    epoch INTEGER NOT NULL,
                    mode TEXT NOT NULL,
                    question_ids TEXT NOT NULL,
                    current_index INTEGER NOT NULL CHECK (current_index >= 0),
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (session_id, epoch),
                    FOREIGN KEY (session_id) REFERENCES practice_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS practice_answers (
                    session_id TEXT NOT NULL,
                    question_id INTEGER NOT NULL,
                    epoch INTEGER NOT NULL,
                    submitted TEXT NOT NULL,
                    is_correct INTEGER NOT NULL,
                    counted INTEGER NOT NULL,
                    answered_at TEXT NOT NULL,
                    PRIMARY KEY (session_id, question_id, epoch),
                    FOREIGN KEY (session_id) REFERENCES practice_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS practice_settings (
                    user_id INTEGER PRIMARY KEY,
                    bank_ids TEXT NOT NULL,
                    type_ratio TEXT NOT NULL,
                    target_count INTEGER NOT NULL CHECK (target_count > 0),
                    realtime_analysis INTEGER NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS question_issues (
                    id INTEGER PRIMARY KEY,
                    question_id INTEGER NOT NULL,
                    reason TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_bank_kind_mastery
                    ON questions (bank_id, kind, mastery);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_user_status_created
                    ON practice_sessions (user_id, status, created_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_answers_session_epoch
                    ON practice_answers (session_id, epoch);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
