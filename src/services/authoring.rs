// src/services/authoring.rs

use std::collections::HashMap;

use sqlx::{PgExecutor, PgPool};
use validator::Validate;

use crate::{
    config::ARCHIVED_ORDER_INDEX,
    error::AppError,
    models::{
        exam::{Exam, ExamDefinition, ExamResponse, ExamViewMode, Section, SectionDefinition, SectionResponse},
        question::{Question, QuestionResponse},
    },
    services::{
        redaction::present_content_data,
        scoring::{AnswerKey, round_score},
        store::{Tx, begin_serializable, bulk_insert_questions, with_conflict_retry},
    },
    utils::html::sanitize_text,
};

const EXAM_COLUMNS: &str = "id, class_id, title, description, start_time, end_time, \
     duration_minutes, max_attempts, view_answer_mode, created_by, created_at, updated_at";

/// What `update_exam` did with the previous content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentReplacement {
    /// Old sections were kept, marked archived, for existing submissions.
    Archived,
    /// No submissions existed; old sections and questions were deleted.
    Purged,
}

pub(crate) async fn fetch_exam<'e, E>(executor: E, exam_id: i64) -> Result<Exam, AppError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT {} FROM exams WHERE id = $1", EXAM_COLUMNS);
    sqlx::query_as::<_, Exam>(&sql)
        .bind(exam_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))
}

/// Field validation plus a check that every answer key fits its question type.
fn validate_definition(def: &ExamDefinition) -> Result<(), AppError> {
    def.validate()?;

    for (s_idx, section) in def.sections.iter().enumerate() {
        for (q_idx, question) in section.questions.iter().enumerate() {
            AnswerKey::parse(question.question_type, &question.stored_content_data()).map_err(|e| {
                AppError::BadRequest(format!(
                    "Section {} question {}: invalid {} answer key: {}",
                    s_idx + 1,
                    q_idx + 1,
                    question.question_type.as_str(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

/// Creates an exam and its content tree in one serializable transaction,
/// retried on write conflicts like every other engine mutation.
pub async fn create_exam(
    pool: &PgPool,
    author_id: i64,
    def: &ExamDefinition,
) -> Result<i64, AppError> {
    validate_definition(def)?;

    with_conflict_retry("create_exam", move || create_once(pool, author_id, def)).await
}

async fn create_once(pool: &PgPool, author_id: i64, def: &ExamDefinition) -> Result<i64, AppError> {
    let mut tx = begin_serializable(pool).await?;

    let exam_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO exams (
            class_id, title, description, start_time, end_time,
            duration_minutes, max_attempts, view_answer_mode, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(def.class_id)
    .bind(sanitize_text(&def.title))
    .bind(sanitize_text(&def.description))
    .bind(def.start_time)
    .bind(def.end_time)
    .bind(def.duration_minutes)
    .bind(def.max_attempts)
    .bind(def.view_answer_mode.as_str())
    .bind(author_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create exam: {:?}", e);
        AppError::from(e)
    })?;

    insert_sections_and_questions(&mut tx, exam_id, &def.sections).await?;

    tx.commit().await?;

    tracing::info!(
        "User {} created exam {} with {} sections",
        author_id,
        exam_id,
        def.sections.len()
    );
    Ok(exam_id)
}

/// Re-edits an exam.
///
/// Scalar fields are always updated. The content tree is replaced: archived
/// when submissions reference the exam, deleted otherwise. All or nothing.
pub async fn update_exam(
    pool: &PgPool,
    exam_id: i64,
    def: &ExamDefinition,
) -> Result<ContentReplacement, AppError> {
    validate_definition(def)?;

    with_conflict_retry("update_exam", move || update_once(pool, exam_id, def)).await
}

async fn update_once(
    pool: &PgPool,
    exam_id: i64,
    def: &ExamDefinition,
) -> Result<ContentReplacement, AppError> {
    let mut tx = begin_serializable(pool).await?;

    let updated = sqlx::query(
        r#"
        UPDATE exams SET
            class_id = $1, title = $2, description = $3, start_time = $4, end_time = $5,
            duration_minutes = $6, max_attempts = $7, view_answer_mode = $8, updated_at = NOW()
        WHERE id = $9
        "#,
    )
    .bind(def.class_id)
    .bind(sanitize_text(&def.title))
    .bind(sanitize_text(&def.description))
    .bind(def.start_time)
    .bind(def.end_time)
    .bind(def.duration_minutes)
    .bind(def.max_attempts)
    .bind(def.view_answer_mode.as_str())
    .bind(exam_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    let has_submissions: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM submissions WHERE exam_id = $1)")
            .bind(exam_id)
            .fetch_one(&mut *tx)
            .await?;

    let replacement = if has_submissions {
        let archived = archive_sections(&mut tx, exam_id).await?;
        tracing::debug!("Archived {} sections of exam {}", archived, exam_id);
        ContentReplacement::Archived
    } else {
        purge_content(&mut tx, exam_id).await?;
        ContentReplacement::Purged
    };

    insert_sections_and_questions(&mut tx, exam_id, &def.sections).await?;

    tx.commit().await?;

    tracing::info!("Exam {} updated, previous content {:?}", exam_id, replacement);
    Ok(replacement)
}

/// Marks the exam's active sections as archived. Already archived sections
/// are left untouched.
async fn archive_sections(tx: &mut Tx, exam_id: i64) -> Result<u64, AppError> {
    let archived = sqlx::query(
        "UPDATE sections SET order_index = $1 WHERE exam_id = $2 AND order_index >= 0",
    )
    .bind(ARCHIVED_ORDER_INDEX)
    .bind(exam_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok(archived)
}

async fn purge_content(tx: &mut Tx, exam_id: i64) -> Result<(), AppError> {
    sqlx::query(
        "DELETE FROM questions WHERE section_id IN (SELECT id FROM sections WHERE exam_id = $1)",
    )
    .bind(exam_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM sections WHERE exam_id = $1")
        .bind(exam_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Inserts sections in the given order, each followed by its questions.
async fn insert_sections_and_questions(
    tx: &mut Tx,
    exam_id: i64,
    sections: &[SectionDefinition],
) -> Result<(), AppError> {
    for (index, section) in sections.iter().enumerate() {
        let section_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sections (exam_id, title, description, order_index)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(exam_id)
        .bind(sanitize_text(&section.title))
        .bind(sanitize_text(&section.description))
        .bind(index as i32)
        .fetch_one(&mut **tx)
        .await?;

        bulk_insert_questions(tx, section_id, &section.questions).await?;
    }
    Ok(())
}

/// Deletes an exam. Sections, questions, submissions and answers cascade.
pub async fn delete_exam(pool: &PgPool, exam_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM exams WHERE id = $1")
        .bind(exam_id)
        .execute(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete exam {}: {:?}", exam_id, e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    tracing::info!("Exam {} deleted", exam_id);
    Ok(())
}

/// Loads an exam with its current content. `Taking` mode strips answer keys.
pub async fn get_exam(
    pool: &PgPool,
    exam_id: i64,
    mode: ExamViewMode,
) -> Result<ExamResponse, AppError> {
    let exam = fetch_exam(pool, exam_id).await?;

    let sections = sqlx::query_as::<_, Section>(
        r#"
        SELECT id, exam_id, title, description, order_index
        FROM sections
        WHERE exam_id = $1 AND order_index >= 0
        ORDER BY order_index, id
        "#,
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT q.id, q.section_id, q.type, q.content, q.content_data,
               q.points, q.media_url, q.order_index
        FROM questions q
        JOIN sections s ON q.section_id = s.id
        WHERE s.exam_id = $1 AND s.order_index >= 0
        ORDER BY q.section_id, q.order_index, q.id
        "#,
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    let reveal = mode == ExamViewMode::Edit;
    let mut by_section: HashMap<i64, Vec<QuestionResponse>> = HashMap::new();
    let mut total_points = 0.0;

    for q in questions {
        total_points += q.points;
        by_section.entry(q.section_id).or_default().push(QuestionResponse {
            id: q.id,
            content_data: present_content_data(q.content_data.as_deref(), reveal),
            question_type: q.question_type,
            content: q.content,
            points: q.points,
            media_url: q.media_url,
            order_index: q.order_index,
        });
    }

    let sections = sections
        .into_iter()
        .map(|s| SectionResponse {
            questions: by_section.remove(&s.id).unwrap_or_default(),
            order_index: s.state().order_index(),
            id: s.id,
            title: s.title,
            description: s.description,
        })
        .collect();

    Ok(ExamResponse {
        view_answer_mode: exam.answer_mode(),
        id: exam.id,
        class_id: exam.class_id,
        title: exam.title,
        description: exam.description,
        start_time: exam.start_time,
        end_time: exam.end_time,
        duration_minutes: exam.duration_minutes,
        max_attempts: exam.max_attempts,
        total_points: round_score(total_points),
        sections,
    })
}
