use practice_core::model::{
    AnswerKey, AnswerRecord, BankId, ChoiceOption, GroupEpoch, Question, QuestionId, QuestionType,
    SessionId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn question_id_to_i64(id: QuestionId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("question_id overflow".into()))
}

pub(crate) fn bank_id_to_i64(id: BankId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("bank_id overflow".into()))
}

pub(crate) fn user_id_to_i64(id: practice_core::model::UserId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("user_id overflow".into()))
}

pub(crate) fn session_id_from_str(s: &str) -> Result<SessionId, StorageError> {
    s.parse::<SessionId>().map_err(ser)
}

pub(crate) fn epoch_from_i64(v: i64) -> Result<GroupEpoch, StorageError> {
    Ok(GroupEpoch::new(i64_to_u64("epoch", v)?))
}

pub(crate) fn epoch_to_i64(epoch: GroupEpoch) -> Result<i64, StorageError> {
    i64::try_from(epoch.value()).map_err(|_| StorageError::Serialization("epoch overflow".into()))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// JSON TEXT column helpers. Options, bank-id sets, and group orderings are
/// stored as JSON arrays, mirroring the document columns the source schema
/// used for the same data.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let kind_str: String = row.try_get("kind").map_err(ser)?;
    let kind = QuestionType::parse(&kind_str).map_err(ser)?;

    let options: Vec<ChoiceOption> = from_json(&row.try_get::<String, _>("options").map_err(ser)?)?;

    let mastery_i64: i64 = row.try_get("mastery").map_err(ser)?;

    Question::from_persisted(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        BankId::new(i64_to_u64("bank_id", row.try_get::<i64, _>("bank_id").map_err(ser)?)?),
        kind,
        row.try_get::<String, _>("content").map_err(ser)?,
        options,
        row.try_get::<String, _>("standard_answer").map_err(ser)?,
        u32_from_i64("mastery", mastery_i64)?,
        row.try_get("favorite").map_err(ser)?,
        row.try_get("reported").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerRecord, StorageError> {
    let session_id = session_id_from_str(&row.try_get::<String, _>("session_id").map_err(ser)?)?;
    let question_id = question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
    let epoch = epoch_from_i64(row.try_get::<i64, _>("epoch").map_err(ser)?)?;

    Ok(AnswerRecord::new(
        AnswerKey::new(session_id, question_id, epoch),
        row.try_get::<String, _>("submitted").map_err(ser)?,
        row.try_get("is_correct").map_err(ser)?,
        row.try_get("counted").map_err(ser)?,
        row.try_get("answered_at").map_err(ser)?,
    ))
}
