use std::collections::{BTreeMap, HashMap};

use practice_core::model::{BankId, Question, QuestionId, QuestionType};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    bank_id_to_i64, map_question_row, question_id_to_i64, ser, to_json, u32_from_i64,
};
use crate::repository::{QuestionRepository, StorageError};

/// Builds `bank_id IN (?N, ?N+1, …)` with placeholders starting at `start`.
fn in_placeholders(count: usize, start: usize) -> String {
    let mut sql = String::new();
    for i in 0..count {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        sql.push_str(&(start + i).to_string());
    }
    sql
}

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO questions (
                id, bank_id, kind, content, options, standard_answer,
                mastery, favorite, reported, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                -- keep created_at from the original insert; only update mutable fields
                bank_id = excluded.bank_id,
                kind = excluded.kind,
                content = excluded.content,
                options = excluded.options,
                standard_answer = excluded.standard_answer,
                mastery = excluded.mastery,
                favorite = excluded.favorite,
                reported = excluded.reported
            ",
        )
        .bind(question_id_to_i64(question.id())?)
        .bind(bank_id_to_i64(question.bank_id())?)
        .bind(question.kind().as_str())
        .bind(question.content().to_owned())
        .bind(to_json(&question.options().to_vec())?)
        .bind(question.standard_answer().to_owned())
        .bind(i64::from(question.mastery()))
        .bind(question.is_favorite())
        .bind(question.is_reported())
        .bind(question.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, bank_id, kind, content, options, standard_answer,
                   mastery, favorite, reported, created_at
            FROM questions
            WHERE id = ?1
            ",
        )
        .bind(question_id_to_i64(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_question_row(&row)
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT id, bank_id, kind, content, options, standard_answer,
                   mastery, favorite, reported, created_at
            FROM questions
            WHERE id IN (
            ",
        );
        sql.push_str(&in_placeholders(ids.len(), 1));
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(question_id_to_i64(*id)?);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut by_id: HashMap<u64, Question> = HashMap::with_capacity(rows.len());
        for row in rows {
            let question = map_question_row(&row)?;
            by_id.insert(question.id().value(), question);
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match by_id.remove(&id.value()) {
                Some(question) => out.push(question),
                None => return Err(StorageError::NotFound),
            }
        }

        Ok(out)
    }

    async fn list_candidates(
        &self,
        bank_ids: &[BankId],
        kind: Option<QuestionType>,
        exclude_reported: bool,
    ) -> Result<Vec<Question>, StorageError> {
        if bank_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT id, bank_id, kind, content, options, standard_answer,
                   mastery, favorite, reported, created_at
            FROM questions
            WHERE bank_id IN (
            ",
        );
        sql.push_str(&in_placeholders(bank_ids.len(), 1));
        sql.push(')');
        if kind.is_some() {
            sql.push_str(&format!(" AND kind = ?{}", bank_ids.len() + 1));
        }
        if exclude_reported {
            sql.push_str(" AND reported = 0");
        }
        sql.push_str(" ORDER BY id ASC");

        let mut q = sqlx::query(&sql);
        for bank_id in bank_ids {
            q = q.bind(bank_id_to_i64(*bank_id)?);
        }
        if let Some(kind) = kind {
            q = q.bind(kind.as_str());
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(map_question_row(&row)?);
        }
        Ok(questions)
    }

    async fn increment_mastery(&self, id: QuestionId) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE questions SET mastery = mastery + 1 WHERE id = ?1")
            .bind(question_id_to_i64(id)?)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn reset_mastery(&self, id: QuestionId) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE questions SET mastery = 0 WHERE id = ?1")
            .bind(question_id_to_i64(id)?)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn mark_reported(&self, id: QuestionId) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE questions SET reported = 1 WHERE id = ?1")
            .bind(question_id_to_i64(id)?)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn mastery_distribution(
        &self,
        bank_ids: &[BankId],
    ) -> Result<BTreeMap<u32, u64>, StorageError> {
        if bank_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut sql = String::from(
            r"
            SELECT mastery, COUNT(*) AS n
            FROM questions
            WHERE reported = 0 AND bank_id IN (
            ",
        );
        sql.push_str(&in_placeholders(bank_ids.len(), 1));
        sql.push_str(") GROUP BY mastery ORDER BY mastery ASC");

        let mut q = sqlx::query(&sql);
        for bank_id in bank_ids {
            q = q.bind(bank_id_to_i64(*bank_id)?);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut buckets = BTreeMap::new();
        for row in rows {
            let level = u32_from_i64("mastery", row.try_get::<i64, _>("mastery").map_err(ser)?)?;
            let count: i64 = row.try_get("n").map_err(ser)?;
            let count = u64::try_from(count)
                .map_err(|_| StorageError::Serialization(format!("invalid count: {count}")))?;
            buckets.insert(level, count);
        }
        Ok(buckets)
    }
}
