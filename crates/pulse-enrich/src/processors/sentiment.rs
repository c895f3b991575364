//! Lexicon-backed sentiment processor.
//!
//! A deliberately small local capability: scores a record's text against a
//! word-weight lexicon and maps the score to a label with per-class scores.
//! Useful as the default sentiment stage when no external model is wired up.

use std::collections::BTreeMap;

use async_trait::async_trait;

use pulse_core::{AnalysisResult, LatencyClass, ScrapedRecord, Stage};

use crate::processor::{StageError, StageProcessor};

/// Word weights for social-media text. Values in `(0.0, 1.0]` are positive,
/// in `[-1.0, 0.0)` negative. The summed score is clamped to `[-1.0, 1.0]`.
const LEXICON: &[(&str, f32)] = &[
    // Positive signals
    ("great", 0.4),
    ("good", 0.3),
    ("excellent", 0.5),
    ("amazing", 0.5),
    ("awesome", 0.5),
    ("love", 0.5),
    ("loved", 0.5),
    ("best", 0.5),
    ("recommend", 0.4),
    ("happy", 0.4),
    ("excited", 0.4),
    ("win", 0.4),
    ("launch", 0.2),
    ("thanks", 0.3),
    ("helpful", 0.3),
    // Negative signals
    ("bad", -0.4),
    ("terrible", -0.6),
    ("worst", -0.6),
    ("awful", -0.6),
    ("hate", -0.6),
    ("scam", -0.7),
    ("broken", -0.4),
    ("fail", -0.4),
    ("failed", -0.4),
    ("outage", -0.5),
    ("angry", -0.5),
    ("disappointed", -0.5),
    ("refund", -0.3),
    ("lawsuit", -0.5),
    ("boycott", -0.6),
];

/// Threshold on the clamped score separating `neutral` from a polar label.
const NEUTRAL_BAND: f32 = 0.15;

/// Score a text string against the lexicon.
///
/// Splits into lowercase words, strips non-alphabetic edges, sums matching
/// weights, clamps to `[-1.0, 1.0]`. Unknown text scores `0.0`.
#[must_use]
pub fn lexicon_score(text: &str) -> f32 {
    let mut score = 0.0_f32;
    for word in text.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        for &(lex_word, weight) in LEXICON {
            if w == lex_word {
                score += weight;
                break;
            }
        }
    }
    score.clamp(-1.0, 1.0)
}

pub struct LexiconSentimentProcessor;

#[async_trait]
impl StageProcessor for LexiconSentimentProcessor {
    fn stage(&self) -> Stage {
        Stage::Sentiment
    }

    fn latency_class(&self) -> LatencyClass {
        LatencyClass::Fast
    }

    async fn process(&self, record: &ScrapedRecord) -> Result<AnalysisResult, StageError> {
        if record.text.trim().is_empty() {
            return Err(StageError::Permanent("record text is empty".to_string()));
        }

        let score = lexicon_score(&record.text);
        let positive = score.max(0.0);
        let negative = (-score).max(0.0);
        let neutral = 1.0 - score.abs();

        let label = if score > NEUTRAL_BAND {
            "positive"
        } else if score < -NEUTRAL_BAND {
            "negative"
        } else {
            "neutral"
        };

        let mut scores = BTreeMap::new();
        scores.insert("positive".to_string(), positive);
        scores.insert("negative".to_string(), negative);
        scores.insert("neutral".to_string(), neutral);

        let confidence = match label {
            "positive" => positive,
            "negative" => negative,
            _ => neutral,
        };

        Ok(AnalysisResult::Sentiment {
            label: label.to_string(),
            confidence,
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::SourcePlatform;

    fn record(text: &str) -> ScrapedRecord {
        ScrapedRecord::new(SourcePlatform::Twitter, text, Utc::now())
    }

    #[test]
    fn empty_string_scores_zero() {
        assert_eq!(lexicon_score(""), 0.0);
    }

    #[test]
    fn unknown_text_scores_zero() {
        assert_eq!(lexicon_score("the quick brown fox"), 0.0);
    }

    #[test]
    fn punctuation_stripped_from_words() {
        assert!(lexicon_score("great!") > 0.0);
    }

    #[test]
    fn score_clamps_to_unit_interval() {
        let text = "great excellent best love recommend amazing awesome happy win";
        assert_eq!(lexicon_score(text), 1.0);
        let text = "terrible worst hate scam awful boycott outage angry";
        assert_eq!(lexicon_score(text), -1.0);
    }

    #[tokio::test]
    async fn positive_text_gets_positive_label() {
        let result = LexiconSentimentProcessor
            .process(&record("love this launch, best release yet"))
            .await
            .unwrap();
        match result {
            AnalysisResult::Sentiment { label, confidence, .. } => {
                assert_eq!(label, "positive");
                assert!(confidence > 0.0);
            }
            other => panic!("expected sentiment result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mild_text_stays_neutral() {
        let result = LexiconSentimentProcessor
            .process(&record("the update shipped today"))
            .await
            .unwrap();
        match result {
            AnalysisResult::Sentiment { label, .. } => assert_eq!(label, "neutral"),
            other => panic!("expected sentiment result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_text_is_a_permanent_error() {
        let err = LexiconSentimentProcessor
            .process(&record("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Permanent(_)));
    }
}
