// src/models/submission.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Represents the 'submissions' table: one row per attempt.
#[derive(Debug, Clone, FromRow)]
pub struct Submission {
    pub id: i64,
    pub exam_id: i64,
    pub user_id: i64,
    pub started_at: DateTime<Utc>,
    /// NULL while the attempt is in progress.
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: f64,
}

/// Lifecycle of a learner's attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    NotStarted,
    InProgress,
    Submitted,
}

impl AttemptState {
    pub fn of(submission: Option<&Submission>) -> Self {
        match submission {
            None => AttemptState::NotStarted,
            Some(s) if s.submitted_at.is_some() => AttemptState::Submitted,
            Some(_) => AttemptState::InProgress,
        }
    }
}

/// DTO for opening an attempt. The learner comes from the token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptRequest {
    pub exam_id: i64,
}

/// Returned when an attempt is opened; the client runs the timer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptTicket {
    pub submission_id: i64,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i32,
    /// Latest instant the server accepts the submission (before grace).
    pub deadline: DateTime<Utc>,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub submission_id: i64,

    /// Key: Question ID. Value: raw response, shape depends on the question type.
    #[serde(default)]
    pub answers: HashMap<i64, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub score: f64,
    pub total_score: f64,
    pub correct_count: usize,
    pub total_questions: usize,
}

/// A graded answer ready to be written to the 'answers' table.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedAnswer {
    pub question_id: i64,
    /// Learner response as submitted; `None` when nothing was sent.
    pub response: Option<Value>,
    pub is_correct: bool,
    pub score: f64,
}

/// Row of the instructor's submission list.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionListItem {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: f64,
    /// `in_progress` or `submitted`.
    pub status: String,
    /// 1 for the learner's first attempt, 2 for the second, ...
    pub attempt_number: i64,
}

/// Flat row of the review join: one per persisted answer.
#[derive(Debug, Clone, FromRow)]
pub struct ReviewRow {
    pub section_id: i64,
    pub section_title: String,
    pub section_description: String,
    pub section_order_index: i32,
    pub question_id: i64,
    pub question_type: String,
    pub content: String,
    pub content_data: Option<String>,
    pub points: f64,
    pub media_url: Option<String>,
    pub question_order_index: i32,
    pub answer_data: Option<String>,
    pub is_correct: bool,
    pub answer_score: f64,
}

/// Graded view of one submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDetail {
    pub submission_id: i64,
    pub exam_id: i64,
    pub exam_title: String,
    pub learner_id: i64,
    pub learner_name: String,
    pub status: AttemptState,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: f64,
    pub max_score: f64,
    pub answers_revealed: bool,
    pub sections: Vec<ReviewSection>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSection {
    pub section_id: i64,
    pub title: String,
    pub description: String,
    pub archived: bool,
    pub questions: Vec<ReviewQuestion>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQuestion {
    pub question_id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub content: String,
    pub content_data: Value,
    pub points: f64,
    pub media_url: Option<String>,
    pub learner_answer: Value,
    pub is_correct: bool,
    pub score: f64,
}
