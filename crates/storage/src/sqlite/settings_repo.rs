use practice_core::model::{BankId, PracticeSettings, TypeRatio, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{from_json, ser, to_json, u32_from_i64, user_id_to_i64};
use crate::repository::{SettingsRepository, StorageError};

#[async_trait::async_trait]
impl SettingsRepository for SqliteRepository {
    async fn latest_settings(
        &self,
        user_id: UserId,
    ) -> Result<Option<PracticeSettings>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT bank_ids, type_ratio, target_count, realtime_analysis
            FROM practice_settings
            WHERE user_id = ?1
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let bank_ids: Vec<BankId> = from_json(&row.try_get::<String, _>("bank_ids").map_err(ser)?)?;
        let type_ratio: TypeRatio =
            from_json(&row.try_get::<String, _>("type_ratio").map_err(ser)?)?;
        let target_count =
            u32_from_i64("target_count", row.try_get::<i64, _>("target_count").map_err(ser)?)?;
        let realtime_analysis: bool = row.try_get("realtime_analysis").map_err(ser)?;

        PracticeSettings::new(bank_ids, type_ratio, target_count, realtime_analysis)
            .map(Some)
            .map_err(ser)
    }

    async fn save_settings(
        &self,
        user_id: UserId,
        settings: &PracticeSettings,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO practice_settings (
                user_id, bank_ids, type_ratio, target_count, realtime_analysis, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                bank_ids = excluded.bank_ids,
                type_ratio = excluded.type_ratio,
                target_count = excluded.target_count,
                realtime_analysis = excluded.realtime_analysis,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(to_json(&settings.bank_ids().to_vec())?)
        .bind(to_json(settings.type_ratio())?)
        .bind(i64::from(settings.target_count()))
        .bind(settings.realtime_analysis())
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
