// src/services/store.rs

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::{
    config::{MAX_TRANSACTION_ATTEMPTS, RETRY_DELAY},
    error::AppError,
    models::{question::QuestionDefinition, submission::GradedAnswer},
};

pub type Tx = Transaction<'static, Postgres>;

/// Opens a transaction at SERIALIZABLE isolation.
///
/// Concurrent transactions that read and write the same rows fail with a
/// serialization error instead of silently losing an update; callers wrap
/// the whole operation in [`with_conflict_retry`].
pub async fn begin_serializable(pool: &PgPool) -> Result<Tx, AppError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Runs `op` and re-runs it while it fails with `AppError::TransientConflict`,
/// up to `MAX_TRANSACTION_ATTEMPTS` runs with `RETRY_DELAY` in between.
pub async fn with_conflict_retry<T, F, Fut>(operation: &str, op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    retry_transient(operation, MAX_TRANSACTION_ATTEMPTS, RETRY_DELAY, op).await
}

async fn retry_transient<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < max_attempts => {
                tracing::warn!(
                    "{} hit a write conflict, retrying (attempt {}/{}): {}",
                    operation,
                    attempt,
                    max_attempts,
                    err
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

/// Serializes a structured payload for a text column.
pub fn encode_payload(value: &Value) -> String {
    value.to_string()
}

/// Parses a stored payload. Missing or malformed text yields `None`.
pub fn decode_payload(raw: Option<&str>) -> Option<Value> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring malformed stored payload: {}", e);
            None
        }
    }
}

/// Inserts all questions of one section with a single statement.
/// Order index is the position in `questions`.
pub async fn bulk_insert_questions(
    tx: &mut Tx,
    section_id: i64,
    questions: &[QuestionDefinition],
) -> Result<(), AppError> {
    if questions.is_empty() {
        return Ok(());
    }

    let mut query_builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO questions (section_id, type, content, content_data, points, media_url, order_index) ",
    );
    query_builder.push_values(questions.iter().enumerate(), |mut row, (index, q)| {
        row.push_bind(section_id)
            .push_bind(q.question_type.as_str())
            .push_bind(q.content.clone())
            .push_bind(encode_payload(&q.stored_content_data()))
            .push_bind(q.points)
            .push_bind(q.media_url.clone())
            .push_bind(index as i32);
    });

    query_builder.build().execute(&mut **tx).await?;
    Ok(())
}

/// Inserts one answer row per graded question with a single statement.
pub async fn bulk_insert_answers(
    tx: &mut Tx,
    submission_id: i64,
    answers: &[GradedAnswer],
) -> Result<(), AppError> {
    if answers.is_empty() {
        return Ok(());
    }

    let mut query_builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO answers (submission_id, question_id, answer_data, is_correct, score) ",
    );
    query_builder.push_values(answers, |mut row, answer| {
        row.push_bind(submission_id)
            .push_bind(answer.question_id)
            .push_bind(answer.response.as_ref().map(encode_payload))
            .push_bind(answer.is_correct)
            .push_bind(answer.score);
    });

    query_builder.build().execute(&mut **tx).await?;
    Ok(())
}
