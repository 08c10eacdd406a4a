use std::collections::HashSet;

use practice_core::model::{
    BankId, Group, GroupMode, PracticeSession, PracticeSettings, QuestionId, SessionId,
    SessionStatus, TypeRatio, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{epoch_from_i64, epoch_to_i64, from_json, ser, to_json, u32_from_i64, user_id_to_i64};
use crate::repository::{SessionRepository, StorageError};

fn map_session_rows(
    session_row: &SqliteRow,
    group_row: &SqliteRow,
) -> Result<PracticeSession, StorageError> {
    let id: SessionId = session_row
        .try_get::<String, _>("id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let user_id = UserId::new(
        u64::try_from(session_row.try_get::<i64, _>("user_id").map_err(ser)?)
            .map_err(|_| StorageError::Serialization("user_id sign overflow".into()))?,
    );
    let status = SessionStatus::parse(&session_row.try_get::<String, _>("status").map_err(ser)?)
        .map_err(ser)?;
    let round = u32_from_i64("round", session_row.try_get::<i64, _>("round").map_err(ser)?)?;

    let bank_ids: Vec<BankId> =
        from_json(&session_row.try_get::<String, _>("bank_ids").map_err(ser)?)?;
    let type_ratio: TypeRatio =
        from_json(&session_row.try_get::<String, _>("type_ratio").map_err(ser)?)?;
    let target_count = u32_from_i64(
        "target_count",
        session_row.try_get::<i64, _>("target_count").map_err(ser)?,
    )?;
    let realtime_analysis: bool = session_row.try_get("realtime_analysis").map_err(ser)?;
    let settings = PracticeSettings::new(bank_ids, type_ratio, target_count, realtime_analysis)
        .map_err(ser)?;

    let next_epoch = epoch_from_i64(session_row.try_get::<i64, _>("next_epoch").map_err(ser)?)?;
    let used_question_ids: HashSet<QuestionId> = from_json::<Vec<QuestionId>>(
        &session_row
            .try_get::<String, _>("used_question_ids")
            .map_err(ser)?,
    )?
    .into_iter()
    .collect();

    let mode = GroupMode::parse(&group_row.try_get::<String, _>("mode").map_err(ser)?)
        .map_err(ser)?;
    let question_ids: Vec<QuestionId> =
        from_json(&group_row.try_get::<String, _>("question_ids").map_err(ser)?)?;
    let current_index = usize::try_from(group_row.try_get::<i64, _>("current_index").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("current_index sign overflow".into()))?;
    let group = Group::from_persisted(
        epoch_from_i64(group_row.try_get::<i64, _>("epoch").map_err(ser)?)?,
        mode,
        question_ids,
        current_index,
        group_row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)?;

    PracticeSession::from_persisted(
        id,
        user_id,
        status,
        round,
        settings,
        group,
        next_epoch,
        used_question_ids,
        session_row.try_get("created_at").map_err(ser)?,
        session_row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

impl SqliteRepository {
    async fn load_session_by_row(
        &self,
        session_row: SqliteRow,
    ) -> Result<PracticeSession, StorageError> {
        let id: String = session_row.try_get("id").map_err(ser)?;
        let current_epoch: i64 = session_row.try_get("current_epoch").map_err(ser)?;

        let group_row = sqlx::query(
            r"
            SELECT epoch, mode, question_ids, current_index, created_at
            FROM practice_groups
            WHERE session_id = ?1 AND epoch = ?2
            ",
        )
        .bind(&id)
        .bind(current_epoch)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_session_rows(&session_row, &group_row)
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn save_session(&self, session: &PracticeSession) -> Result<(), StorageError> {
        let id = session.id().to_string();
        let user_id = user_id_to_i64(session.user_id())?;
        let group = session.current_group();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if !session.is_completed() {
            let clash = sqlx::query(
                r"
                SELECT 1 FROM practice_sessions
                WHERE user_id = ?1 AND status != 'completed' AND id != ?2
                LIMIT 1
                ",
            )
            .bind(user_id)
            .bind(&id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
            if clash.is_some() {
                return Err(StorageError::Conflict);
            }
        }

        sqlx::query(
            r"
            INSERT INTO practice_sessions (
                id, user_id, status, round, bank_ids, type_ratio, target_count,
                realtime_analysis, current_epoch, next_epoch, used_question_ids,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                -- identity, owner, and settings snapshot are frozen at start
                status = excluded.status,
                round = excluded.round,
                current_epoch = excluded.current_epoch,
                next_epoch = excluded.next_epoch,
                used_question_ids = excluded.used_question_ids,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&id)
        .bind(user_id)
        .bind(session.status().as_str())
        .bind(i64::from(session.round()))
        .bind(to_json(&session.settings().bank_ids().to_vec())?)
        .bind(to_json(session.settings().type_ratio())?)
        .bind(i64::from(session.settings().target_count()))
        .bind(session.settings().realtime_analysis())
        .bind(epoch_to_i64(group.epoch())?)
        .bind(epoch_to_i64(session.next_epoch())?)
        .bind(to_json(&session.used_question_ids().iter().copied().collect::<Vec<_>>())?)
        .bind(session.created_at())
        .bind(session.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO practice_groups (
                session_id, epoch, mode, question_ids, current_index, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(session_id, epoch) DO UPDATE SET
                current_index = excluded.current_index
            ",
        )
        .bind(&id)
        .bind(epoch_to_i64(group.epoch())?)
        .bind(group.mode().as_str())
        .bind(to_json(&group.question_ids().to_vec())?)
        .bind(i64::try_from(group.current_index()).map_err(|_| {
            StorageError::Serialization("current_index overflow".into())
        })?)
        .bind(group.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<PracticeSession, StorageError> {
        let session_row = sqlx::query(
            r"
            SELECT id, user_id, status, round, bank_ids, type_ratio, target_count,
                   realtime_analysis, current_epoch, next_epoch, used_question_ids,
                   created_at, updated_at
            FROM practice_sessions
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        self.load_session_by_row(session_row).await
    }

    async fn active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<PracticeSession>, StorageError> {
        let session_row = sqlx::query(
            r"
            SELECT id, user_id, status, round, bank_ids, type_ratio, target_count,
                   realtime_analysis, current_epoch, next_epoch, used_question_ids,
                   created_at, updated_at
            FROM practice_sessions
            WHERE user_id = ?1 AND status != 'completed'
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match session_row {
            Some(row) => Ok(Some(self.load_session_by_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        // Groups and ledger entries cascade via foreign keys.
        sqlx::query("DELETE FROM practice_sessions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
