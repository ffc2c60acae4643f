// src/handlers/attempt.rs

use axum::{Extension, Json, extract::{Path, State}, response::IntoResponse};
use sqlx::PgPool;

use crate::{
    config::Config,
    error::AppError,
    models::submission::{StartAttemptRequest, SubmitRequest},
    services::{attempt, review, scoring},
    utils::jwt::Claims,
};

/// Opens a new attempt for the calling learner.
///
/// * 404 if the exam does not exist.
/// * 400 outside the exam window or once the attempt limit is reached.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.viewer()?;
    let ticket = attempt::start_attempt(&pool, req.exam_id, viewer.user_id).await?;
    Ok(Json(ticket))
}

/// Grades and stores the answers of an attempt.
/// Submitting again replaces the previous answers.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.viewer()?;
    let result = scoring::submit(
        &pool,
        config.submit_grace_seconds,
        req.submission_id,
        viewer.user_id,
        &req.answers,
    )
    .await?;

    Ok(Json(result))
}

/// Graded view of a submission, filtered by the exam's visibility policy.
pub async fn get_submission(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.viewer()?;
    let detail =
        review::get_submission_detail(&pool, config.submit_grace_seconds, id, viewer).await?;
    Ok(Json(detail))
}
