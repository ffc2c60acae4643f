// src/services/scoring.rs

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        question::{Question, QuestionType},
        submission::{AttemptState, GradedAnswer, Submission, SubmitResult},
    },
    services::{
        attempt::ensure_before_deadline,
        authoring::fetch_exam,
        store::{Tx, begin_serializable, bulk_insert_answers, decode_payload, with_conflict_retry},
    },
};

/// A correct-answer definition able to judge a learner response.
pub trait Scorable {
    fn is_correct(&self, response: &Value) -> bool;
}

/// Answer key of a `multiple_choice` question: ids of the correct options.
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceKey {
    pub correct_answers: Vec<Value>,
}

/// Answer key of a `fill_in_blank` question.
#[derive(Debug, Clone, Deserialize)]
pub struct BlankKey {
    pub correct_answer: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchPair {
    pub left: Value,
    pub right: Value,
}

/// Answer key of a `matching` question: the correct left -> right pairs.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingKey {
    pub pairs: Vec<MatchPair>,
}

/// Answer key of an `ordering` question: items in their correct order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderingKey {
    pub correct_order: Vec<Value>,
}

impl Scorable for ChoiceKey {
    fn is_correct(&self, response: &Value) -> bool {
        let Some(selected) = value_as_text(response) else {
            return false;
        };
        self.correct_answers
            .iter()
            .filter_map(value_as_text)
            .any(|id| id == selected)
    }
}

impl Scorable for BlankKey {
    fn is_correct(&self, response: &Value) -> bool {
        let (Some(given), Some(expected)) =
            (value_as_text(response), value_as_text(&self.correct_answer))
        else {
            return false;
        };
        let expected = normalize_blank(&expected);
        !expected.is_empty() && normalize_blank(&given) == expected
    }
}

impl Scorable for MatchingKey {
    fn is_correct(&self, response: &Value) -> bool {
        let Value::Object(mapping) = response else {
            return false;
        };
        if self.pairs.is_empty() {
            return false;
        }
        self.pairs.iter().all(|pair| {
            let (Some(left), Some(right)) = (value_as_text(&pair.left), value_as_text(&pair.right))
            else {
                return false;
            };
            mapping.get(&left).and_then(value_as_text) == Some(right)
        })
    }
}

impl Scorable for OrderingKey {
    fn is_correct(&self, response: &Value) -> bool {
        let Value::Array(items) = response else {
            return false;
        };
        if self.correct_order.is_empty() || items.len() != self.correct_order.len() {
            return false;
        }
        items.iter().zip(&self.correct_order).all(|(given, expected)| {
            matches!(
                (value_as_text(given), value_as_text(expected)),
                (Some(g), Some(e)) if g == e
            )
        })
    }
}

/// Answer key of any question type, parsed from the stored content payload.
#[derive(Debug, Clone)]
pub enum AnswerKey {
    MultipleChoice(ChoiceKey),
    FillInBlank(BlankKey),
    Matching(MatchingKey),
    Ordering(OrderingKey),
}

impl AnswerKey {
    pub fn parse(kind: QuestionType, content_data: &Value) -> Result<Self, serde_json::Error> {
        match kind {
            QuestionType::MultipleChoice => {
                ChoiceKey::deserialize(content_data).map(AnswerKey::MultipleChoice)
            }
            QuestionType::FillInBlank => BlankKey::deserialize(content_data).map(AnswerKey::FillInBlank),
            QuestionType::Matching => MatchingKey::deserialize(content_data).map(AnswerKey::Matching),
            QuestionType::Ordering => OrderingKey::deserialize(content_data).map(AnswerKey::Ordering),
        }
    }

    /// Extracts the key of a stored question. Unknown type tags and
    /// malformed payloads yield `None`: the question can then never be
    /// answered correctly, but grading goes on.
    pub fn of_question(question: &Question) -> Option<Self> {
        let Some(kind) = question.kind() else {
            tracing::warn!(
                "Question {} has unknown type '{}'",
                question.id,
                question.question_type
            );
            return None;
        };
        let content_data = decode_payload(question.content_data.as_deref())?;
        match AnswerKey::parse(kind, &content_data) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!("Question {} has an unusable answer key: {}", question.id, e);
                None
            }
        }
    }
}

impl Scorable for AnswerKey {
    fn is_correct(&self, response: &Value) -> bool {
        match self {
            AnswerKey::MultipleChoice(key) => key.is_correct(response),
            AnswerKey::FillInBlank(key) => key.is_correct(response),
            AnswerKey::Matching(key) => key.is_correct(response),
            AnswerKey::Ordering(key) => key.is_correct(response),
        }
    }
}

/// Text form used to compare ids and items: strings as-is, numbers and
/// booleans rendered. Arrays, objects and null have no text form.
fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn normalize_blank(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A response that counts as "not answered".
pub fn is_blank(response: Option<&Value>) -> bool {
    match response {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Rounds to two decimal places, halves away from zero.
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

pub fn grade_question(question: &Question, response: Option<&Value>) -> GradedAnswer {
    let is_correct = !is_blank(response)
        && match (AnswerKey::of_question(question), response) {
            (Some(key), Some(value)) => key.is_correct(value),
            _ => false,
        };

    GradedAnswer {
        question_id: question.id,
        response: response.filter(|v| !v.is_null()).cloned(),
        is_correct,
        score: if is_correct { question.points } else { 0.0 },
    }
}

#[derive(Debug, Clone)]
pub struct GradeReport {
    pub answers: Vec<GradedAnswer>,
    /// Sum of points of correctly answered questions, rounded.
    pub earned: f64,
    /// Sum of points of every graded question.
    pub total: f64,
    pub correct_count: usize,
}

/// Grades every question once, even if `questions` repeats an id.
pub fn grade_submission(questions: &[Question], responses: &HashMap<i64, Value>) -> GradeReport {
    let mut seen = HashSet::new();
    let mut answers = Vec::with_capacity(questions.len());
    let mut earned = 0.0;
    let mut total = 0.0;
    let mut correct_count = 0;

    for question in questions {
        if !seen.insert(question.id) {
            continue;
        }
        let graded = grade_question(question, responses.get(&question.id));
        total += question.points;
        if graded.is_correct {
            earned += graded.score;
            correct_count += 1;
        }
        answers.push(graded);
    }

    GradeReport {
        answers,
        earned: round_score(earned),
        total: round_score(total),
        correct_count,
    }
}

/// Grades a submission and stores the result.
///
/// * Replaces any previous answers of the submission, so re-submitting is idempotent.
/// * Retries the whole transaction on serialization conflicts.
pub async fn submit(
    pool: &PgPool,
    grace_seconds: i64,
    submission_id: i64,
    user_id: i64,
    responses: &HashMap<i64, Value>,
) -> Result<SubmitResult, AppError> {
    with_conflict_retry("submit", move || {
        submit_once(pool, grace_seconds, submission_id, user_id, responses)
    })
    .await
}

async fn submit_once(
    pool: &PgPool,
    grace_seconds: i64,
    submission_id: i64,
    user_id: i64,
    responses: &HashMap<i64, Value>,
) -> Result<SubmitResult, AppError> {
    let mut tx = begin_serializable(pool).await?;

    // Lock the attempt row; a concurrent submit of the same attempt waits here.
    let submission = sqlx::query_as::<_, Submission>(
        "SELECT id, exam_id, user_id, started_at, submitted_at, score
         FROM submissions WHERE id = $1 FOR UPDATE",
    )
    .bind(submission_id)
    .fetch_optional(&mut *tx)
    .await?
    .filter(|s| s.user_id == user_id)
    .ok_or(AppError::NotFound("Submission not found".to_string()))?;

    let exam = fetch_exam(&mut *tx, submission.exam_id).await?;
    let now = Utc::now();
    ensure_before_deadline(&submission, &exam, now, grace_seconds)?;

    if AttemptState::of(Some(&submission)) == AttemptState::Submitted {
        tracing::info!("Re-grading submission {}", submission.id);
    }

    let questions = fetch_active_questions(&mut tx, submission.exam_id).await?;
    let report = grade_submission(&questions, responses);

    let ignored = responses
        .keys()
        .filter(|id| !report.answers.iter().any(|a| a.question_id == **id))
        .count();
    if ignored > 0 {
        tracing::debug!(
            "Submission {}: ignoring {} answers to questions outside the current exam",
            submission.id,
            ignored
        );
    }

    sqlx::query("DELETE FROM answers WHERE submission_id = $1")
        .bind(submission.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE submissions SET submitted_at = $1, score = $2 WHERE id = $3")
        .bind(now)
        .bind(report.earned)
        .bind(submission.id)
        .execute(&mut *tx)
        .await?;

    bulk_insert_answers(&mut tx, submission.id, &report.answers).await?;

    tx.commit().await?;

    tracing::info!(
        "Submission {} graded: {}/{} ({} of {} correct)",
        submission.id,
        report.earned,
        report.total,
        report.correct_count,
        report.answers.len()
    );

    Ok(SubmitResult {
        score: report.earned,
        total_score: report.total,
        correct_count: report.correct_count,
        total_questions: report.answers.len(),
    })
}

/// Questions of the exam's non-archived sections, one row per question.
async fn fetch_active_questions(tx: &mut Tx, exam_id: i64) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT DISTINCT ON (q.id)
            q.id, q.section_id, q.type, q.content, q.content_data,
            q.points, q.media_url, q.order_index
        FROM questions q
        JOIN sections s ON q.section_id = s.id
        WHERE s.exam_id = $1 AND s.order_index >= 0
        ORDER BY q.id
        "#,
    )
    .bind(exam_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(questions)
}
