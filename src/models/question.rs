// src/models/question.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::prelude::FromRow;
use url::Url;
use validator::Validate;

/// The four supported answer formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    FillInBlank,
    Matching,
    Ordering,
}

impl QuestionType {
    pub const ALL: [QuestionType; 4] = [
        QuestionType::MultipleChoice,
        QuestionType::FillInBlank,
        QuestionType::Matching,
        QuestionType::Ordering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::FillInBlank => "fill_in_blank",
            QuestionType::Matching => "matching",
            QuestionType::Ordering => "ordering",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "multiple_choice" => Some(QuestionType::MultipleChoice),
            "fill_in_blank" => Some(QuestionType::FillInBlank),
            "matching" => Some(QuestionType::Matching),
            "ordering" => Some(QuestionType::Ordering),
            _ => None,
        }
    }

    /// Fields of the content payload that make up the answer key.
    pub fn answer_key_fields(&self) -> &'static [&'static str] {
        match self {
            QuestionType::MultipleChoice => &["correct_answers"],
            QuestionType::FillInBlank => &["correct_answer"],
            QuestionType::Matching => &["pairs"],
            QuestionType::Ordering => &["correct_order"],
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Question {
    pub id: i64,
    pub section_id: i64,

    /// Type tag, mapped from the column 'type' since `type` is a reserved keyword in Rust.
    #[sqlx(rename = "type")]
    pub question_type: String,

    /// Prompt text shown to the learner.
    pub content: String,

    /// Serialized JSON object with display data and the answer key.
    pub content_data: Option<String>,

    pub points: f64,
    pub media_url: Option<String>,
    pub order_index: i32,
}

impl Question {
    pub fn kind(&self) -> Option<QuestionType> {
        QuestionType::from_tag(&self.question_type)
    }
}

/// Question as returned to clients. `content_data` may have been redacted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub content: String,
    pub content_data: Value,
    pub points: f64,
    pub media_url: Option<String>,
    pub order_index: i32,
}

/// DTO for one question inside an exam definition.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDefinition {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    /// Display data (options, items to match, items to order).
    #[serde(default)]
    pub content_data: Value,
    /// Type-specific correct answer, merged into the stored content payload.
    #[serde(default)]
    pub answer_key: Value,
    #[validate(range(min = 0.0))]
    pub points: f64,
    #[validate(length(max = 500), custom(function = validate_media_url))]
    pub media_url: Option<String>,
}

impl QuestionDefinition {
    /// Builds the stored content payload: display data with the answer key
    /// fields laid over it. Non-object inputs contribute nothing.
    pub fn stored_content_data(&self) -> Value {
        let mut merged = match &self.content_data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        if let Value::Object(key) = &self.answer_key {
            for (field, value) in key {
                merged.insert(field.clone(), value.clone());
            }
        }
        Value::Object(merged)
    }
}

fn validate_media_url(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}
