// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::exam::{ExamDefinition, ExamViewMode, ExamViewParams},
    services::{
        attempt,
        authoring::{self, ContentReplacement},
        review,
    },
    utils::jwt::Claims,
};

/// Creates an exam with its sections and questions.
/// Instructor only. Returns 201 Created with the new id.
pub async fn create_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ExamDefinition>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.viewer()?;
    let exam_id = authoring::create_exam(&pool, viewer.user_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(json!({ "examId": exam_id }))))
}

/// Re-edits an exam. Previous content is archived when submissions exist.
/// Instructor only.
pub async fn update_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<ExamDefinition>,
) -> Result<impl IntoResponse, AppError> {
    let replacement = authoring::update_exam(&pool, id, &payload).await?;

    Ok(Json(json!({
        "examId": id,
        "archivedPreviousContent": replacement == ContentReplacement::Archived,
    })))
}

/// Deletes an exam and everything attached to it.
/// Instructor only.
pub async fn delete_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    authoring::delete_exam(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns an exam with its current content.
///
/// `?mode=taking` strips answer keys. Learners always get the taking view.
pub async fn get_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Query(params): Query<ExamViewParams>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.viewer()?;
    let mode = if viewer.is_instructor() {
        params.mode
    } else {
        ExamViewMode::Taking
    };

    let exam = authoring::get_exam(&pool, id, mode).await?;
    Ok(Json(exam))
}

/// Lists the exams of a class with the caller's attempt statistics.
pub async fn list_class_exams(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.viewer()?;
    let exams = attempt::list_class_exams(&pool, class_id, viewer.user_id).await?;
    Ok(Json(exams))
}

/// Lists all submissions of an exam with per-learner attempt numbers.
/// Instructor only.
pub async fn list_exam_submissions(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let submissions = review::list_exam_submissions(&pool, id).await?;
    Ok(Json(submissions))
}
