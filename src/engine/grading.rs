// src/engine/grading.rs

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::models::{
    exam_session::SubmittedAnswer,
    question::{AnswerId, Question, QuestionId, QuestionPool},
};

/// Deduplicates and sorts a selection.
pub fn normalize_answer_ids(ids: &[AnswerId]) -> Vec<AnswerId> {
    ids.iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// A selection is correct iff, as a set, it equals the set of correct answers.
/// No partial credit.
pub fn is_correct(submitted: &[AnswerId], question: &Question) -> bool {
    let submitted: BTreeSet<&AnswerId> = submitted.iter().collect();
    let expected: BTreeSet<&AnswerId> = question.correct_answer_ids().collect();
    submitted == expected
}

/// Verdict for a single submitted question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionVerdict {
    pub question_id: QuestionId,
    pub answer_ids: Vec<AnswerId>,
    pub is_correct: bool,
}

/// Outcome of grading a whole submission.
#[derive(Debug, Default)]
pub struct GradedSubmission {
    pub verdicts: Vec<QuestionVerdict>,
    /// Entries ignored because they were repeated, not part of the session, or unknown to the pool.
    pub skipped: usize,
}

impl GradedSubmission {
    pub fn score(&self) -> i32 {
        self.verdicts.iter().filter(|v| v.is_correct).count() as i32
    }

    pub fn total(&self) -> i32 {
        self.verdicts.len() as i32
    }
}

/// Grades the entries of a submission against the questions selected for the session.
///
/// Each question is graded at most once (first entry wins). Entries for
/// questions outside the session selection or missing from the pool are
/// skipped instead of failing the batch.
pub fn grade_submission(
    entries: &[SubmittedAnswer],
    selected: &[QuestionId],
    pool: &QuestionPool,
) -> GradedSubmission {
    let selected: HashSet<&QuestionId> = selected.iter().collect();
    let mut seen: HashSet<&QuestionId> = HashSet::new();
    let mut graded = GradedSubmission::default();

    for entry in entries {
        if !seen.insert(&entry.question_id) || !selected.contains(&entry.question_id) {
            graded.skipped += 1;
            continue;
        }

        let Some(question) = pool.find(&entry.question_id) else {
            tracing::warn!(
                question_id = %entry.question_id,
                pool = %pool.name,
                "Submitted question not found in pool, skipping"
            );
            graded.skipped += 1;
            continue;
        };

        let answer_ids = normalize_answer_ids(&entry.answer_ids);
        let is_correct = is_correct(&answer_ids, question);

        graded.verdicts.push(QuestionVerdict {
            question_id: entry.question_id.clone(),
            answer_ids,
            is_correct,
        });
    }

    graded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Answer;

    fn ids(raw: &[&str]) -> Vec<AnswerId> {
        raw.iter().map(|s| AnswerId::from(*s)).collect()
    }

    fn question(id: &str, correct: &[&str]) -> Question {
        Question {
            id: QuestionId::from(id),
            content: format!("Question {}", id),
            answers: ["A", "B", "C", "D"]
                .iter()
                .map(|a| Answer {
                    id: AnswerId::from(*a),
                    content: format!("Option {}", a),
                    is_correct: correct.contains(a),
                })
                .collect(),
            explanation: None,
        }
    }

    fn pool() -> QuestionPool {
        QuestionPool {
            name: "demo".to_string(),
            description: None,
            questions: vec![
                question("Q1", &["A"]),
                question("Q2", &["A", "B"]),
                question("Q3", &["B"]),
            ],
        }
    }

    fn entry(q: &str, answers: &[&str]) -> SubmittedAnswer {
        SubmittedAnswer {
            question_id: QuestionId::from(q),
            answer_ids: ids(answers),
        }
    }

    #[test]
    fn test_set_equality_ignores_order_and_duplicates() {
        let q = question("Q", &["A", "B"]);
        assert!(is_correct(&normalize_answer_ids(&ids(&["B", "A", "A"])), &q));
        assert!(is_correct(&ids(&["A", "B"]), &q));
    }

    #[test]
    fn test_subset_and_superset_are_incorrect() {
        let q = question("Q", &["A", "B"]);
        assert!(!is_correct(&ids(&["A"]), &q));
        assert!(!is_correct(&ids(&["A", "B", "C"]), &q));
        assert!(!is_correct(&[], &q));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let once = normalize_answer_ids(&ids(&["B", "A", "A"]));
        assert_eq!(once, ids(&["A", "B"]));
        assert_eq!(normalize_answer_ids(&once), once);
    }

    #[test]
    fn test_grading_restricted_to_selected_questions() {
        let pool = pool();
        let selected = vec![QuestionId::from("Q1"), QuestionId::from("Q2")];
        let entries = vec![entry("Q1", &["A"]), entry("Q2", &["A"]), entry("Q3", &["B"])];

        let graded = grade_submission(&entries, &selected, &pool);
        assert_eq!(graded.score(), 1);
        assert_eq!(graded.total(), 2);
        assert_eq!(graded.skipped, 1);
        assert!(graded.verdicts[0].is_correct);
        assert!(!graded.verdicts[1].is_correct);
    }

    #[test]
    fn test_repeated_question_is_graded_once() {
        let pool = pool();
        let selected = vec![QuestionId::from("Q1")];
        let entries = vec![entry("Q1", &["B"]), entry("Q1", &["A"])];

        let graded = grade_submission(&entries, &selected, &pool);
        assert_eq!(graded.total(), 1);
        assert_eq!(graded.score(), 0);
        assert_eq!(graded.skipped, 1);
    }

    #[test]
    fn test_unknown_question_is_skipped() {
        let pool = pool();
        let selected = vec![QuestionId::from("Q1"), QuestionId::from("gone")];
        let entries = vec![entry("gone", &["A"]), entry("Q1", &["A"])];

        let graded = grade_submission(&entries, &selected, &pool);
        assert_eq!(graded.total(), 1);
        assert_eq!(graded.score(), 1);
        assert_eq!(graded.skipped, 1);
    }
}
