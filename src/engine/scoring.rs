// src/engine/scoring.rs

use crate::models::{
    question::{AnswerKey, Question, QuestionType},
    submission::AnswerValue,
};

/// Marks awarded for one answer.
///
/// * CHOICE: full marks iff the answer is the text of the only option flagged
///   correct. No flagged option, or several, awards nothing.
/// * BOOLEAN / FREE_TEXT: full marks iff the answer equals `correct_answer`
///   exactly. FREE_TEXT marks are only a suggestion for the reviewer.
///
/// An answer of the wrong type scores 0.
pub fn score(question: &Question, answer: &AnswerValue) -> i64 {
    let correct = match (&question.key, answer) {
        (AnswerKey::Choice { options }, AnswerValue::Choice(text)) => {
            let mut flagged = options.iter().filter(|o| o.is_correct);
            match (flagged.next(), flagged.next()) {
                (Some(only), None) => only.text == *text,
                _ => false,
            }
        }
        (AnswerKey::Boolean { correct_answer }, AnswerValue::Boolean(value)) => {
            value.to_string() == *correct_answer
        }
        (AnswerKey::FreeText { correct_answer }, AnswerValue::FreeText(text)) => {
            text == correct_answer
        }
        _ => false,
    };

    if correct { question.marks } else { 0 }
}

/// Whether a submission to an exam with these questions waits for a human.
pub fn needs_review(questions: &[Question]) -> bool {
    questions.iter().any(|q| q.question_type() == QuestionType::FreeText)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::ChoiceOption;

    fn choice(options: &[(&str, bool)], marks: i64) -> Question {
        Question {
            id: 1,
            exam_id: 1,
            content: "Pick one".to_string(),
            key: AnswerKey::Choice {
                options: options
                    .iter()
                    .map(|(text, is_correct)| ChoiceOption {
                        text: text.to_string(),
                        is_correct: *is_correct,
                    })
                    .collect(),
            },
            marks,
        }
    }

    fn keyed(key: AnswerKey, marks: i64) -> Question {
        Question { id: 2, exam_id: 1, content: "Answer".to_string(), key, marks }
    }

    #[test]
    fn test_choice_correct_option() {
        let q = choice(&[("A", false), ("B", true), ("C", false)], 10);
        assert_eq!(score(&q, &AnswerValue::Choice("B".to_string())), 10);
        assert_eq!(score(&q, &AnswerValue::Choice("A".to_string())), 0);
    }

    #[test]
    fn test_choice_without_single_correct_option_awards_nothing() {
        let none = choice(&[("A", false), ("B", false)], 10);
        assert_eq!(score(&none, &AnswerValue::Choice("A".to_string())), 0);

        let several = choice(&[("A", true), ("B", true)], 10);
        assert_eq!(score(&several, &AnswerValue::Choice("A".to_string())), 0);
    }

    #[test]
    fn test_boolean_matches_literal() {
        let q = keyed(AnswerKey::Boolean { correct_answer: "false".to_string() }, 3);
        assert_eq!(score(&q, &AnswerValue::Boolean(false)), 3);
        assert_eq!(score(&q, &AnswerValue::Boolean(true)), 0);
    }

    #[test]
    fn test_free_text_is_exact_match_only() {
        let q = keyed(AnswerKey::FreeText { correct_answer: "Photosynthesis".to_string() }, 5);
        assert_eq!(score(&q, &AnswerValue::FreeText("Photosynthesis".to_string())), 5);
        assert_eq!(score(&q, &AnswerValue::FreeText("photosynthesis".to_string())), 0);
        assert_eq!(score(&q, &AnswerValue::FreeText(" Photosynthesis".to_string())), 0);
    }

    #[test]
    fn test_mismatched_answer_type_scores_zero() {
        let q = choice(&[("true", true)], 4);
        assert_eq!(score(&q, &AnswerValue::Boolean(true)), 0);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let q = choice(&[("A", true)], 7);
        let answer = AnswerValue::Choice("A".to_string());
        let first = score(&q, &answer);
        for _ in 0..10 {
            assert_eq!(score(&q, &answer), first);
        }
    }

    #[test]
    fn test_needs_review_only_with_free_text() {
        let objective = vec![choice(&[("A", true)], 1)];
        assert!(!needs_review(&objective));

        let mut mixed = objective.clone();
        mixed.push(keyed(AnswerKey::FreeText { correct_answer: String::new() }, 1));
        assert!(needs_review(&mixed));
    }
}
