// src/models/exam.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::config::{ARCHIVED_ORDER_INDEX, UNLIMITED_ATTEMPTS};
use crate::models::question::{QuestionDefinition, QuestionResponse};

/// Largest attempt limit an instructor may configure (besides unlimited).
const MAX_CONFIGURABLE_ATTEMPTS: i32 = 100;

/// When learners may see the answer key of their graded submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewAnswerMode {
    Always,
    #[default]
    AfterClose,
    Never,
}

impl ViewAnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewAnswerMode::Always => "always",
            ViewAnswerMode::AfterClose => "after_close",
            ViewAnswerMode::Never => "never",
        }
    }

    /// Parses the stored column value. Unknown values fall back to `Never`
    /// so a corrupted row can only hide answers, not leak them.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "always" => ViewAnswerMode::Always,
            "after_close" => ViewAnswerMode::AfterClose,
            _ => ViewAnswerMode::Never,
        }
    }
}

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Exam {
    pub id: i64,
    pub class_id: i64,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,

    /// Attempts allowed per learner; `UNLIMITED_ATTEMPTS` disables the limit.
    pub max_attempts: i32,

    /// Stored as text: 'always', 'after_close' or 'never'.
    pub view_answer_mode: String,

    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exam {
    pub fn answer_mode(&self) -> ViewAnswerMode {
        ViewAnswerMode::from_tag(&self.view_answer_mode)
    }
}

/// Whether a section belongs to the current exam content or only survives
/// for historical submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    Active(i32),
    Archived,
}

impl SectionState {
    pub fn from_order_index(order_index: i32) -> Self {
        if order_index >= 0 {
            SectionState::Active(order_index)
        } else {
            SectionState::Archived
        }
    }

    pub fn order_index(&self) -> i32 {
        match self {
            SectionState::Active(index) => *index,
            SectionState::Archived => ARCHIVED_ORDER_INDEX,
        }
    }

    pub fn is_archived(&self) -> bool {
        matches!(self, SectionState::Archived)
    }
}

/// Represents the 'sections' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Section {
    pub id: i64,
    pub exam_id: i64,
    pub title: String,
    pub description: String,
    pub order_index: i32,
}

impl Section {
    pub fn state(&self) -> SectionState {
        SectionState::from_order_index(self.order_index)
    }
}

/// DTO for creating or re-editing an exam, including its full content tree.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_exam_definition))]
pub struct ExamDefinition {
    pub class_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: i32,
    #[serde(default)]
    #[validate(nested)]
    pub sections: Vec<SectionDefinition>,
    #[serde(default)]
    pub view_answer_mode: ViewAnswerMode,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

fn default_max_attempts() -> i32 {
    1
}

fn validate_exam_definition(def: &ExamDefinition) -> Result<(), validator::ValidationError> {
    if def.end_time <= def.start_time {
        return Err(validator::ValidationError::new("end_time_must_follow_start_time"));
    }
    let attempts_ok = def.max_attempts == UNLIMITED_ATTEMPTS
        || (1..=MAX_CONFIGURABLE_ATTEMPTS).contains(&def.max_attempts);
    if !attempts_ok {
        return Err(validator::ValidationError::new("invalid_max_attempts"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SectionDefinition {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<QuestionDefinition>,
}

/// `mode` query parameter of the exam read endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamViewMode {
    /// Instructor view including answer keys.
    #[default]
    Edit,
    /// Learner view while attempting; answer keys are stripped.
    Taking,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExamViewParams {
    #[serde(default)]
    pub mode: ExamViewMode,
}

/// Exam with its current (non-archived) content.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResponse {
    pub id: i64,
    pub class_id: i64,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub max_attempts: i32,
    pub view_answer_mode: ViewAnswerMode,
    pub total_points: f64,
    pub sections: Vec<SectionResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub order_index: i32,
    pub questions: Vec<QuestionResponse>,
}

/// Exam listing row for a learner, with their own attempt statistics.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClassExamSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub max_attempts: i32,
    pub view_answer_mode: String,
    pub attempt_count: i64,
    /// Best score over submitted attempts; absent until one is submitted.
    pub best_score: Option<f64>,
    pub last_submission_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn definition(max_attempts: i32, hours: i64) -> ExamDefinition {
        let start = Utc::now();
        ExamDefinition {
            class_id: 1,
            title: "Midterm".to_string(),
            description: String::new(),
            start_time: start,
            end_time: start + Duration::hours(hours),
            duration_minutes: 30,
            sections: vec![],
            view_answer_mode: ViewAnswerMode::default(),
            max_attempts,
        }
    }

    #[test]
    fn test_section_state_from_order_index() {
        assert_eq!(SectionState::from_order_index(0), SectionState::Active(0));
        assert_eq!(SectionState::from_order_index(4), SectionState::Active(4));
        assert_eq!(SectionState::from_order_index(-1), SectionState::Archived);
        assert_eq!(SectionState::Archived.order_index(), ARCHIVED_ORDER_INDEX);
    }

    #[test]
    fn test_view_answer_mode_tags() {
        for mode in [ViewAnswerMode::Always, ViewAnswerMode::AfterClose, ViewAnswerMode::Never] {
            assert_eq!(ViewAnswerMode::from_tag(mode.as_str()), mode);
        }
        assert_eq!(ViewAnswerMode::from_tag("garbage"), ViewAnswerMode::Never);
    }

    #[test]
    fn test_definition_validation() {
        assert!(definition(1, 2).validate().is_ok());
        assert!(definition(UNLIMITED_ATTEMPTS, 2).validate().is_ok());
        assert!(definition(0, 2).validate().is_err());
        assert!(definition(1, -2).validate().is_err());
    }

    #[test]
    fn test_definition_parses_camel_case_body() {
        let body = serde_json::json!({
            "classId": 7,
            "title": "Quiz",
            "startTime": "2026-01-01T08:00:00Z",
            "endTime": "2026-01-01T10:00:00Z",
            "durationMinutes": 45,
            "viewAnswerMode": "never",
            "sections": [{ "title": "Part A" }]
        });
        let def: ExamDefinition = serde_json::from_value(body).unwrap();
        assert_eq!(def.class_id, 7);
        assert_eq!(def.max_attempts, 1);
        assert_eq!(def.view_answer_mode, ViewAnswerMode::Never);
        assert!(def.sections[0].questions.is_empty());
    }
}
