// src/engine/report.rs

use std::collections::HashMap;

use crate::engine::scoring::ScoreWeights;
use crate::models::{
    question::{QuestionId, QuestionPool},
    stats::{AttemptStats, OverallStats, QuestionStatsEntry, StatsResponse},
};

const WORST_QUESTIONS_LIMIT: usize = 5;

/// Builds the per-question report of one user on one pool.
///
/// Rows are sorted worst score first, then by number of attempts (most first).
/// Stats rows for questions no longer in the pool are ignored.
pub fn build_report(
    pool: &QuestionPool,
    stats: &[AttemptStats],
    session_count: i64,
    weights: &ScoreWeights,
) -> StatsResponse {
    let by_question: HashMap<&QuestionId, &AttemptStats> =
        stats.iter().map(|s| (&s.question_id, s)).collect();

    let mut rows: Vec<QuestionStatsEntry> = pool
        .questions
        .iter()
        .map(|q| {
            let (correct, incorrect, last) = by_question
                .get(&q.id)
                .map(|s| (s.count_correct.max(0), s.count_incorrect.max(0), s.last_attempted_at))
                .unwrap_or((0, 0, None));
            let total = correct + incorrect;

            QuestionStatsEntry {
                question_id: q.id.clone(),
                count_correct: correct,
                count_incorrect: incorrect,
                total_attempts: total,
                accuracy: percent(i64::from(correct), i64::from(total)).round() as i32,
                score: weights.score(correct as u32, incorrect as u32),
                last_attempted_at: last,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then(b.total_attempts.cmp(&a.total_attempts))
    });

    let total_correct: i64 = rows.iter().map(|r| i64::from(r.count_correct)).sum();
    let total_incorrect: i64 = rows.iter().map(|r| i64::from(r.count_incorrect)).sum();
    let total_attempts = total_correct + total_incorrect;
    let seen = rows.iter().filter(|r| r.total_attempts > 0).count() as i64;

    let worst_questions = rows
        .iter()
        .filter(|r| r.total_attempts > 0 && r.score < 0.0)
        .take(WORST_QUESTIONS_LIMIT)
        .map(|r| r.question_id.clone())
        .collect();

    let overall = OverallStats {
        total_attempts,
        total_correct,
        total_incorrect,
        accuracy_percent: (percent(total_correct, total_attempts) * 100.0).round() / 100.0,
        session_count,
        unique_questions_seen: seen,
        total_questions_in_pool: rows.len() as i64,
        worst_questions,
        never_attempted: rows.len() as i64 - seen,
    };

    StatsResponse {
        question_pool: pool.name.clone(),
        question_stats: rows,
        overall_stats: overall,
    }
}

fn percent(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}
