// src/services/attempt.rs

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::{
    config::UNLIMITED_ATTEMPTS,
    error::AppError,
    models::{
        exam::{ClassExamSummary, Exam},
        submission::{AttemptTicket, Submission},
    },
    services::{
        authoring::fetch_exam,
        store::{begin_serializable, with_conflict_retry},
    },
};

/// Fails unless `now` lies within the exam's [start, end] window.
pub fn check_window(exam: &Exam, now: DateTime<Utc>) -> Result<(), AppError> {
    if now < exam.start_time {
        return Err(AppError::OutOfWindow("Exam has not started yet".to_string()));
    }
    if now > exam.end_time {
        return Err(AppError::OutOfWindow("Exam has ended".to_string()));
    }
    Ok(())
}

/// Every existing attempt counts, submitted or abandoned.
pub fn check_attempt_limit(prior_attempts: i64, max_attempts: i32) -> Result<(), AppError> {
    if max_attempts != UNLIMITED_ATTEMPTS && prior_attempts >= i64::from(max_attempts) {
        return Err(AppError::AttemptsExhausted(format!(
            "Maximum attempts reached ({})",
            max_attempts
        )));
    }
    Ok(())
}

/// Last instant an attempt may be submitted: the end of its own timer or
/// the closing of the exam, whichever comes first.
pub fn attempt_deadline(
    started_at: DateTime<Utc>,
    duration_minutes: i32,
    exam_end: DateTime<Utc>,
) -> DateTime<Utc> {
    (started_at + Duration::minutes(i64::from(duration_minutes))).min(exam_end)
}

/// Last instant a submit of the attempt is still accepted and re-graded.
pub fn regrade_deadline(
    started_at: DateTime<Utc>,
    duration_minutes: i32,
    exam_end: DateTime<Utc>,
    grace_seconds: i64,
) -> DateTime<Utc> {
    attempt_deadline(started_at, duration_minutes, exam_end) + Duration::seconds(grace_seconds)
}

pub fn ensure_before_deadline(
    submission: &Submission,
    exam: &Exam,
    now: DateTime<Utc>,
    grace_seconds: i64,
) -> Result<(), AppError> {
    let deadline = regrade_deadline(
        submission.started_at,
        exam.duration_minutes,
        exam.end_time,
        grace_seconds,
    );
    if now > deadline {
        tracing::info!(
            "Rejecting late submit of submission {} (accepted until {})",
            submission.id,
            deadline
        );
        return Err(AppError::OutOfWindow("Submission deadline has passed".to_string()));
    }
    Ok(())
}

/// Opens a new attempt for the learner.
///
/// * Fails with `NotFound`, `OutOfWindow` or `AttemptsExhausted`.
/// * Counting and inserting happen in one serializable transaction, so two
///   concurrent starts cannot both pass the limit.
pub async fn start_attempt(
    pool: &PgPool,
    exam_id: i64,
    user_id: i64,
) -> Result<AttemptTicket, AppError> {
    with_conflict_retry("start_attempt", move || start_once(pool, exam_id, user_id)).await
}

async fn start_once(pool: &PgPool, exam_id: i64, user_id: i64) -> Result<AttemptTicket, AppError> {
    let mut tx = begin_serializable(pool).await?;

    let exam = fetch_exam(&mut *tx, exam_id).await?;
    let now = Utc::now();
    check_window(&exam, now)?;

    let prior_attempts: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM submissions WHERE exam_id = $1 AND user_id = $2",
    )
    .bind(exam_id)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    check_attempt_limit(prior_attempts, exam.max_attempts)?;

    let submission_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO submissions (exam_id, user_id, started_at, score)
        VALUES ($1, $2, $3, 0)
        RETURNING id
        "#,
    )
    .bind(exam_id)
    .bind(user_id)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "User {} started attempt {} of exam {} (submission {})",
        user_id,
        prior_attempts + 1,
        exam_id,
        submission_id
    );

    Ok(AttemptTicket {
        submission_id,
        started_at: now,
        duration_minutes: exam.duration_minutes,
        deadline: attempt_deadline(now, exam.duration_minutes, exam.end_time),
    })
}

/// Lists the exams of a class with the caller's own attempt statistics.
pub async fn list_class_exams(
    pool: &PgPool,
    class_id: i64,
    user_id: i64,
) -> Result<Vec<ClassExamSummary>, AppError> {
    let exams = sqlx::query_as::<_, ClassExamSummary>(
        r#"
        SELECT
            e.id, e.title, e.description, e.start_time, e.end_time,
            e.duration_minutes, e.max_attempts, e.view_answer_mode,
            COUNT(s.id) AS attempt_count,
            MAX(s.score) FILTER (WHERE s.submitted_at IS NOT NULL) AS best_score,
            (
                SELECT s2.id FROM submissions s2
                WHERE s2.exam_id = e.id AND s2.user_id = $2 AND s2.submitted_at IS NOT NULL
                ORDER BY s2.submitted_at DESC, s2.id DESC
                LIMIT 1
            ) AS last_submission_id
        FROM exams e
        LEFT JOIN submissions s ON s.exam_id = e.id AND s.user_id = $2
        WHERE e.class_id = $1
        GROUP BY e.id
        ORDER BY e.start_time DESC, e.id DESC
        "#,
    )
    .bind(class_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list exams of class {}: {:?}", class_id, e);
        AppError::from(e)
    })?;

    Ok(exams)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exam(start_offset_min: i64, end_offset_min: i64, max_attempts: i32) -> Exam {
        let now = Utc::now();
        Exam {
            id: 1,
            class_id: 1,
            title: "Quiz".to_string(),
            description: String::new(),
            start_time: now + Duration::minutes(start_offset_min),
            end_time: now + Duration::minutes(end_offset_min),
            duration_minutes: 30,
            max_attempts,
            view_answer_mode: "always".to_string(),
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_window_bounds() {
        let now = Utc::now();
        assert!(check_window(&exam(-10, 10, 1), now).is_ok());
        assert!(matches!(
            check_window(&exam(5, 10, 1), now),
            Err(AppError::OutOfWindow(_))
        ));
        assert!(matches!(
            check_window(&exam(-20, -10, 1), now),
            Err(AppError::OutOfWindow(_))
        ));
    }

    #[test]
    fn test_attempt_limit() {
        assert!(check_attempt_limit(0, 1).is_ok());
        assert!(matches!(check_attempt_limit(1, 1), Err(AppError::AttemptsExhausted(_))));
        assert!(check_attempt_limit(2, 3).is_ok());
        assert!(matches!(check_attempt_limit(3, 3), Err(AppError::AttemptsExhausted(_))));
        assert!(check_attempt_limit(500, UNLIMITED_ATTEMPTS).is_ok());
    }

    #[test]
    fn test_deadline_is_capped_by_exam_end() {
        let started = Utc::now();
        let far_end = started + Duration::hours(5);
        let near_end = started + Duration::minutes(10);

        assert_eq!(attempt_deadline(started, 30, far_end), started + Duration::minutes(30));
        assert_eq!(attempt_deadline(started, 30, near_end), near_end);
    }

    #[test]
    fn test_regrade_deadline_adds_grace() {
        let started = Utc::now();
        let end = started + Duration::hours(5);

        assert_eq!(
            regrade_deadline(started, 30, end, 60),
            started + Duration::minutes(31)
        );
    }

    #[test]
    fn test_late_submit_is_rejected_after_grace() {
        let exam = exam(-120, 120, 1);
        let started = Utc::now() - Duration::minutes(31);
        let submission = Submission {
            id: 5,
            exam_id: 1,
            user_id: 2,
            started_at: started,
            submitted_at: None,
            score: 0.0,
        };

        // 30 minute timer ran out a minute ago
        assert!(ensure_before_deadline(&submission, &exam, Utc::now(), 120).is_ok());
        assert!(matches!(
            ensure_before_deadline(&submission, &exam, Utc::now(), 0),
            Err(AppError::OutOfWindow(_))
        ));
    }
}
