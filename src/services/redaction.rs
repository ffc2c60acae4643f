// src/services/redaction.rs

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    models::{exam::ViewAnswerMode, question::QuestionType},
    services::store::decode_payload,
};

/// Decides whether a viewer of a graded submission may see the answer key.
///
/// Instructors always may. A learner never does while the attempt can still
/// be re-graded (`now <= regrade_until`); after that the exam's policy
/// applies, with `after_close` opening once the exam window has ended.
pub fn reveal_answer_key(
    mode: ViewAnswerMode,
    exam_end: DateTime<Utc>,
    regrade_until: DateTime<Utc>,
    now: DateTime<Utc>,
    viewer_is_instructor: bool,
) -> bool {
    if viewer_is_instructor {
        return true;
    }
    if now <= regrade_until {
        return false;
    }
    match mode {
        ViewAnswerMode::Always => true,
        ViewAnswerMode::AfterClose => now > exam_end,
        ViewAnswerMode::Never => false,
    }
}

/// Removes every answer-key field from a question's content payload.
///
/// All types' key fields are stripped regardless of the question's own
/// type, so a payload carrying a stray key of another type is covered too.
pub fn redact_answer_key(content_data: &mut Value) {
    if let Value::Object(fields) = content_data {
        for kind in QuestionType::ALL {
            for field in kind.answer_key_fields() {
                fields.remove(*field);
            }
        }
    }
}

/// Turns a stored content payload into the value sent to clients.
/// Missing or malformed payloads become an empty object.
pub fn present_content_data(raw: Option<&str>, reveal: bool) -> Value {
    let mut content_data = decode_payload(raw).unwrap_or_else(|| Value::Object(Map::new()));
    if !reveal {
        redact_answer_key(&mut content_data);
    }
    content_data
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_redaction_strips_every_key_field() {
        let mut data = json!({
            "options": [{"id": "1", "text": "A"}],
            "correct_answers": ["1"],
            "correct_answer": "A",
            "left_items": ["x"],
            "pairs": [{"left": "x", "right": "y"}],
            "items": ["b", "a"],
            "correct_order": ["a", "b"]
        });
        redact_answer_key(&mut data);

        assert_eq!(
            data,
            json!({
                "options": [{"id": "1", "text": "A"}],
                "left_items": ["x"],
                "items": ["b", "a"]
            })
        );
    }

    #[test]
    fn test_present_content_data() {
        let raw = r#"{"options":[],"correct_answers":["2"]}"#;
        assert_eq!(present_content_data(Some(raw), false), json!({"options": []}));
        assert_eq!(present_content_data(Some(raw), true)["correct_answers"], json!(["2"]));
        assert_eq!(present_content_data(Some("garbage"), true), json!({}));
        assert_eq!(present_content_data(None, false), json!({}));
    }

    #[test]
    fn test_reveal_policy() {
        let now = Utc::now();
        let open = now + Duration::hours(1);
        let closed = now - Duration::hours(1);
        let expired = now - Duration::minutes(5);

        assert!(reveal_answer_key(ViewAnswerMode::Always, open, expired, now, false));
        assert!(!reveal_answer_key(ViewAnswerMode::AfterClose, open, expired, now, false));
        assert!(reveal_answer_key(ViewAnswerMode::AfterClose, closed, expired, now, false));
        assert!(!reveal_answer_key(ViewAnswerMode::Never, closed, expired, now, false));
        assert!(reveal_answer_key(ViewAnswerMode::Never, open, expired, now, true));
    }

    #[test]
    fn test_key_hidden_while_attempt_can_be_regraded() {
        let now = Utc::now();
        let open = now + Duration::hours(1);
        let still_open = now + Duration::minutes(10);

        assert!(!reveal_answer_key(ViewAnswerMode::Always, open, still_open, now, false));
        assert!(!reveal_answer_key(ViewAnswerMode::Always, open, now, now, false));
        assert!(reveal_answer_key(ViewAnswerMode::Always, open, still_open, now, true));
    }
}
