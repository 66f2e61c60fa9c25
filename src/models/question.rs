// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Question type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Choice,
    Boolean,
    FreeText,
}

/// One selectable option of a CHOICE question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub text: String,
    pub is_correct: bool,
}

/// The grading key of a question, keyed by its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerKey {
    Choice { options: Vec<ChoiceOption> },
    /// `correct_answer` is `"true"` or `"false"`.
    Boolean { correct_answer: String },
    FreeText { correct_answer: String },
}

impl AnswerKey {
    pub fn question_type(&self) -> QuestionType {
        match self {
            AnswerKey::Choice { .. } => QuestionType::Choice,
            AnswerKey::Boolean { .. } => QuestionType::Boolean,
            AnswerKey::FreeText { .. } => QuestionType::FreeText,
        }
    }
}

/// A question belonging to one exam. Looked up by exam id, never embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub exam_id: i64,
    pub content: String,
    #[serde(flatten)]
    pub key: AnswerKey,
    pub marks: i64,
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        self.key.question_type()
    }
}

/// DTO for sending question to client (excludes the answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub content: String,
    /// Option texts of a CHOICE question, empty otherwise.
    pub options: Vec<String>,
    pub marks: i64,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        let options = match &q.key {
            AnswerKey::Choice { options } => options.iter().map(|o| o.text.clone()).collect(),
            _ => Vec::new(),
        };
        Self {
            id: q.id,
            question_type: q.question_type(),
            content: q.content.clone(),
            options,
            marks: q.marks,
        }
    }
}

/// Fields the store needs to persist a new question.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub content: String,
    pub key: AnswerKey,
    pub marks: i64,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[serde(flatten)]
    #[validate(custom(function = validate_key))]
    pub key: AnswerKey,
    #[validate(range(min = 0, max = 1000))]
    pub marks: i64,
}

impl From<CreateQuestionRequest> for NewQuestion {
    fn from(req: CreateQuestionRequest) -> Self {
        Self { content: req.content, key: req.key, marks: req.marks }
    }
}

fn validate_key(key: &AnswerKey) -> Result<(), validator::ValidationError> {
    match key {
        AnswerKey::Choice { options } => {
            if options.is_empty() {
                return Err(validator::ValidationError::new("options_cannot_be_empty"));
            }
            for opt in options {
                if opt.text.is_empty() || opt.text.len() > 500 {
                    return Err(validator::ValidationError::new("invalid_option_text"));
                }
            }
        }
        AnswerKey::Boolean { correct_answer } => {
            if correct_answer != "true" && correct_answer != "false" {
                return Err(validator::ValidationError::new("boolean_answer_must_be_true_or_false"));
            }
        }
        AnswerKey::FreeText { correct_answer } => {
            if correct_answer.len() > 2000 {
                return Err(validator::ValidationError::new("answer_too_long"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_deserializes_by_type_tag() {
        let req: CreateQuestionRequest = serde_json::from_value(serde_json::json!({
            "content": "Pick B",
            "type": "CHOICE",
            "options": [
                {"text": "A", "is_correct": false},
                {"text": "B", "is_correct": true}
            ],
            "marks": 10
        }))
        .unwrap();

        assert_eq!(req.key.question_type(), QuestionType::Choice);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_boolean_key_must_be_literal() {
        let req = CreateQuestionRequest {
            content: "Sky is blue".to_string(),
            key: AnswerKey::Boolean { correct_answer: "yes".to_string() },
            marks: 1,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_negative_marks_rejected() {
        let req = CreateQuestionRequest {
            content: "Essay".to_string(),
            key: AnswerKey::FreeText { correct_answer: String::new() },
            marks: -1,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_public_question_hides_key() {
        let q = Question {
            id: 1,
            exam_id: 1,
            content: "Pick".to_string(),
            key: AnswerKey::Choice {
                options: vec![ChoiceOption { text: "A".to_string(), is_correct: true }],
            },
            marks: 5,
        };
        let public = serde_json::to_value(PublicQuestion::from(&q)).unwrap();
        assert_eq!(public["options"], serde_json::json!(["A"]));
        assert!(public.get("is_correct").is_none());
    }
}
