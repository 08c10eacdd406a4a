use practice_core::model::{AnswerKey, AnswerRecord, GroupEpoch, SessionId};

use super::SqliteRepository;
use super::mapping::{epoch_to_i64, map_answer_row, question_id_to_i64};
use crate::repository::{AnswerRepository, CounterMutation, StorageError};

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn get_answer(&self, key: &AnswerKey) -> Result<Option<AnswerRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT session_id, question_id, epoch, submitted, is_correct, counted, answered_at
            FROM practice_answers
            WHERE session_id = ?1 AND question_id = ?2 AND epoch = ?3
            ",
        )
        .bind(key.session_id.to_string())
        .bind(question_id_to_i64(key.question_id)?)
        .bind(epoch_to_i64(key.epoch)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|row| map_answer_row(&row)).transpose()
    }

    async fn put_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO practice_answers (
                session_id, question_id, epoch, submitted, is_correct, counted, answered_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(session_id, question_id, epoch) DO UPDATE SET
                submitted = excluded.submitted,
                is_correct = excluded.is_correct,
                counted = excluded.counted,
                answered_at = excluded.answered_at
            ",
        )
        .bind(record.key().session_id.to_string())
        .bind(question_id_to_i64(record.key().question_id)?)
        .bind(epoch_to_i64(record.key().epoch)?)
        .bind(record.submitted().to_owned())
        .bind(record.is_correct())
        .bind(record.is_counted())
        .bind(record.answered_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn commit_counted(
        &self,
        record: &AnswerRecord,
        mutation: CounterMutation,
    ) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let counter_sql = match mutation {
            CounterMutation::Increment => {
                Some("UPDATE questions SET mastery = mastery + 1 WHERE id = ?1")
            }
            CounterMutation::Reset => Some("UPDATE questions SET mastery = 0 WHERE id = ?1"),
            CounterMutation::None => None,
        };

        if let Some(sql) = counter_sql {
            let result = sqlx::query(sql)
                .bind(question_id_to_i64(record.key().question_id)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            // Rolling back (via drop) keeps the ledger free of a counted
            // entry whose counter never moved.
            if result.rows_affected() == 0 {
                return Err(StorageError::NotFound);
            }
        }

        sqlx::query(
            r"
            INSERT INTO practice_answers (
                session_id, question_id, epoch, submitted, is_correct, counted, answered_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(session_id, question_id, epoch) DO UPDATE SET
                submitted = excluded.submitted,
                is_correct = excluded.is_correct,
                counted = excluded.counted,
                answered_at = excluded.answered_at
            ",
        )
        .bind(record.key().session_id.to_string())
        .bind(question_id_to_i64(record.key().question_id)?)
        .bind(epoch_to_i64(record.key().epoch)?)
        .bind(record.submitted().to_owned())
        .bind(record.is_correct())
        .bind(record.is_counted())
        .bind(record.answered_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn answers_for_epoch(
        &self,
        session_id: SessionId,
        epoch: GroupEpoch,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT session_id, question_id, epoch, submitted, is_correct, counted, answered_at
            FROM practice_answers
            WHERE session_id = ?1 AND epoch = ?2
            ",
        )
        .bind(session_id.to_string())
        .bind(epoch_to_i64(epoch)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(map_answer_row(&row)?);
        }
        Ok(records)
    }

    async fn delete_for_session(&self, session_id: SessionId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM practice_answers WHERE session_id = ?1")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
