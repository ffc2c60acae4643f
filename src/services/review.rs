// src/services/review.rs

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::{
    error::AppError,
    models::{
        exam::{SectionState, ViewAnswerMode},
        submission::{
            AttemptState, ReviewQuestion, ReviewRow, ReviewSection, SubmissionDetail,
            SubmissionListItem,
        },
        user::Viewer,
    },
    services::{
        attempt::regrade_deadline,
        authoring::fetch_exam,
        redaction::{present_content_data, reveal_answer_key},
        scoring::round_score,
        store::decode_payload,
    },
};

/// Submission joined with its exam and learner.
#[derive(Debug, FromRow)]
struct ReviewHeader {
    id: i64,
    exam_id: i64,
    user_id: i64,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    score: f64,
    exam_title: String,
    exam_end_time: DateTime<Utc>,
    exam_duration_minutes: i32,
    view_answer_mode: String,
    username: String,
}

/// Builds the graded view of a submission.
///
/// * Only the owning learner and instructors may read it.
/// * Answer keys are stripped unless the visibility policy allows them and
///   the attempt can no longer be re-graded.
pub async fn get_submission_detail(
    pool: &PgPool,
    grace_seconds: i64,
    submission_id: i64,
    viewer: Viewer,
) -> Result<SubmissionDetail, AppError> {
    let header = sqlx::query_as::<_, ReviewHeader>(
        r#"
        SELECT
            s.id, s.exam_id, s.user_id, s.started_at, s.submitted_at, s.score,
            e.title AS exam_title, e.end_time AS exam_end_time,
            e.duration_minutes AS exam_duration_minutes, e.view_answer_mode,
            u.username
        FROM submissions s
        JOIN exams e ON e.id = s.exam_id
        JOIN users u ON u.id = s.user_id
        WHERE s.id = $1
        "#,
    )
    .bind(submission_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Submission not found".to_string()))?;

    if !viewer.is_instructor() && header.user_id != viewer.user_id {
        tracing::warn!(
            "User {} tried to read submission {} of user {}",
            viewer.user_id,
            header.id,
            header.user_id
        );
        return Err(AppError::Forbidden("Not your submission".to_string()));
    }

    // Archived sections are reached through the answers' question ids.
    let rows = sqlx::query_as::<_, ReviewRow>(
        r#"
        SELECT
            sec.id AS section_id,
            sec.title AS section_title,
            sec.description AS section_description,
            sec.order_index AS section_order_index,
            q.id AS question_id,
            q.type AS question_type,
            q.content,
            q.content_data,
            q.points,
            q.media_url,
            q.order_index AS question_order_index,
            a.answer_data,
            a.is_correct,
            a.score AS answer_score
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        JOIN sections sec ON sec.id = q.section_id
        WHERE a.submission_id = $1
        ORDER BY sec.id, q.order_index, q.id
        "#,
    )
    .bind(submission_id)
    .fetch_all(pool)
    .await?;

    let regrade_until = regrade_deadline(
        header.started_at,
        header.exam_duration_minutes,
        header.exam_end_time,
        grace_seconds,
    );
    let reveal = reveal_answer_key(
        ViewAnswerMode::from_tag(&header.view_answer_mode),
        header.exam_end_time,
        regrade_until,
        Utc::now(),
        viewer.is_instructor(),
    );
    let (sections, max_score) = assemble_sections(rows, reveal);

    let status = if header.submitted_at.is_some() {
        AttemptState::Submitted
    } else {
        AttemptState::InProgress
    };

    Ok(SubmissionDetail {
        submission_id: header.id,
        exam_id: header.exam_id,
        exam_title: header.exam_title,
        learner_id: header.user_id,
        learner_name: header.username,
        status,
        started_at: header.started_at,
        submitted_at: header.submitted_at,
        score: header.score,
        max_score,
        answers_revealed: reveal,
        sections,
    })
}

/// Groups review rows by section in first-seen order, keeping each question
/// once. Returns the sections and the sum of their questions' points.
pub fn assemble_sections(rows: Vec<ReviewRow>, reveal: bool) -> (Vec<ReviewSection>, f64) {
    let mut sections: Vec<ReviewSection> = Vec::new();
    let mut seen_questions = HashSet::new();
    let mut max_score = 0.0;

    for row in rows {
        if !seen_questions.insert(row.question_id) {
            continue;
        }
        max_score += row.points;

        let question = ReviewQuestion {
            question_id: row.question_id,
            content_data: present_content_data(row.content_data.as_deref(), reveal),
            learner_answer: decode_payload(row.answer_data.as_deref()).unwrap_or(Value::Null),
            question_type: row.question_type,
            content: row.content,
            points: row.points,
            media_url: row.media_url,
            is_correct: row.is_correct,
            score: row.answer_score,
        };

        if sections.last().is_none_or(|s| s.section_id != row.section_id) {
            sections.push(ReviewSection {
                section_id: row.section_id,
                title: row.section_title,
                description: row.section_description,
                archived: SectionState::from_order_index(row.section_order_index).is_archived(),
                questions: Vec::new(),
            });
        }
        if let Some(section) = sections.last_mut() {
            section.questions.push(question);
        }
    }

    (sections, round_score(max_score))
}

/// Lists every attempt at an exam, numbered per learner by start time.
pub async fn list_exam_submissions(
    pool: &PgPool,
    exam_id: i64,
) -> Result<Vec<SubmissionListItem>, AppError> {
    fetch_exam(pool, exam_id).await?;

    let submissions = sqlx::query_as::<_, SubmissionListItem>(
        r#"
        SELECT
            s.id, s.user_id, u.username, s.started_at, s.submitted_at, s.score,
            CASE WHEN s.submitted_at IS NULL THEN 'in_progress' ELSE 'submitted' END AS status,
            ROW_NUMBER() OVER (PARTITION BY s.user_id ORDER BY s.started_at, s.id) AS attempt_number
        FROM submissions s
        JOIN users u ON u.id = s.user_id
        WHERE s.exam_id = $1
        ORDER BY u.username, attempt_number
        "#,
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list submissions of exam {}: {:?}", exam_id, e);
        AppError::from(e)
    })?;

    Ok(submissions)
}
