use chrono::{DateTime, Utc};
use practice_core::model::QuestionId;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{question_id_from_i64, question_id_to_i64, ser};
use crate::repository::{IssueReport, IssueRepository, StorageError};

#[async_trait::async_trait]
impl IssueRepository for SqliteRepository {
    async fn report_issue(
        &self,
        question_id: QuestionId,
        reason: &str,
        reported_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO question_issues (question_id, reason, created_at)
            VALUES (?1, ?2, ?3)
            ",
        )
        .bind(question_id_to_i64(question_id)?)
        .bind(reason.to_owned())
        .bind(reported_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn list_issues(&self) -> Result<Vec<IssueReport>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT question_id, reason, created_at
            FROM question_issues
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut issues = Vec::with_capacity(rows.len());
        for row in rows {
            issues.push(IssueReport {
                question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
                reason: row.try_get("reason").map_err(ser)?,
                reported_at: row.try_get("created_at").map_err(ser)?,
            });
        }
        Ok(issues)
    }
}
