//! Strategy orchestration: preprocess with each strategy in turn, fuse the
//! recognition results and stop at the first complete answer.

use super::captured::CapturedImage;
use super::extract::{fit_to_answer, ANSWER_LEN};
use super::preprocess::{preprocess, Strategy};
use super::recognition::{fuse, Recognizer};

/// A fused reading of at least three digits from one strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub confidence: f32,
    pub strategy: Strategy,
}

pub struct StrategyOrchestrator<'a> {
    recognizer: &'a dyn Recognizer,
    strategies: &'a [Strategy],
}

impl<'a> StrategyOrchestrator<'a> {
    pub fn new(recognizer: &'a dyn Recognizer) -> Self {
        Self {
            recognizer,
            strategies: &Strategy::ALL,
        }
    }

    /// Runs the strategies until one yields four digits. Returns a 4-digit
    /// answer, or `None` if no strategy produced a usable candidate.
    pub fn solve(&self, raw: &CapturedImage) -> Option<String> {
        let mut candidates = Vec::new();

        for &strategy in self.strategies {
            let processed = preprocess(raw, strategy);
            let results = self.recognizer.recognize_all(&processed);

            let Some(fused) = fuse(&results) else {
                tracing::debug!("Strategy {}: no usable reading", strategy);
                continue;
            };
            tracing::info!(
                "Strategy {}: '{}' via {} ({:.1})",
                strategy,
                fused.text,
                fused.config_name,
                fused.confidence
            );
            if fused.text.len() < 3 {
                continue;
            }

            let complete = fused.text.len() == ANSWER_LEN;
            candidates.push(Candidate {
                text: fused.text,
                confidence: fused.confidence,
                strategy,
            });
            if complete {
                break;
            }
        }

        select_candidate(&candidates)
    }
}

/// Prefers a 4-digit candidate, then the longest. Among equally long
/// candidates the latest strategy wins. The winner is padded or cut to four
/// digits.
pub fn select_candidate(candidates: &[Candidate]) -> Option<String> {
    let best = candidates
        .iter()
        .find(|c| c.text.len() == ANSWER_LEN)
        .or_else(|| {
            candidates.iter().fold(None::<&Candidate>, |best, c| match best {
                Some(b) if b.text.len() > c.text.len() => Some(b),
                _ => Some(c),
            })
        })?;
    Some(fit_to_answer(&best.text))
}
