//! Round scorecard.
//!
//! A round is a fixed number of targets thrown for one shooter. Each target
//! gets exactly one result, either from the detector or entered by hand when
//! the operator overrides it. The score is the number of targets broken with
//! either shot.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RoundError;
use crate::types::{Outcome, TargetOutcome};

/// Targets in a standard round.
pub const DEFAULT_TARGET_COUNT: usize = 25;

/// Where a target result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Detected,
    Manual,
}

/// Result of one target in the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResult {
    /// 1-based target number.
    pub number: usize,
    pub first_shot_fired: bool,
    pub second_shot_fired: bool,
    pub outcome: Outcome,
    pub source: ResultSource,
}

/// Per-outcome totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub hit_first_shot: usize,
    pub hit_second_shot: usize,
    pub miss: usize,
}

/// Scorecard for one shooter's round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    shooter: String,
    target_count: usize,
    results: Vec<TargetResult>,
}

impl Round {
    /// Creates an empty round.
    pub fn new(shooter: impl Into<String>, target_count: usize) -> Result<Self, RoundError> {
        if target_count == 0 {
            return Err(RoundError::EmptyRound);
        }
        Ok(Self {
            shooter: shooter.into(),
            target_count,
            results: Vec::with_capacity(target_count),
        })
    }

    /// Creates a standard 25-target round.
    pub fn standard(shooter: impl Into<String>) -> Self {
        Self {
            shooter: shooter.into(),
            target_count: DEFAULT_TARGET_COUNT,
            results: Vec::with_capacity(DEFAULT_TARGET_COUNT),
        }
    }

    /// Records an outcome reported by the detector.
    pub fn record_detected(&mut self, target: &TargetOutcome) -> Result<&TargetResult, RoundError> {
        self.push(TargetResult {
            number: self.results.len() + 1,
            first_shot_fired: target.first_shot_ms.is_some(),
            second_shot_fired: target.second_shot_ms.is_some(),
            outcome: target.outcome,
            source: ResultSource::Detected,
        })
    }

    /// Records an outcome entered by the operator. Shots fired are inferred
    /// from the outcome.
    pub fn record_manual(&mut self, outcome: Outcome) -> Result<&TargetResult, RoundError> {
        self.push(TargetResult {
            number: self.results.len() + 1,
            first_shot_fired: true,
            second_shot_fired: outcome.shots_fired() == 2,
            outcome,
            source: ResultSource::Manual,
        })
    }

    /// Removes the most recent result so it can be re-entered.
    pub fn undo_last(&mut self) -> Option<TargetResult> {
        self.results.pop()
    }

    pub fn shooter(&self) -> &str {
        &self.shooter
    }

    pub fn target_count(&self) -> usize {
        self.target_count
    }

    pub fn results(&self) -> &[TargetResult] {
        &self.results
    }

    /// Targets broken with either shot.
    pub fn score(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_hit()).count()
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for result in &self.results {
            match result.outcome {
                Outcome::HitFirstShot => tally.hit_first_shot += 1,
                Outcome::HitSecondShot => tally.hit_second_shot += 1,
                Outcome::Miss => tally.miss += 1,
            }
        }
        tally
    }

    pub fn remaining(&self) -> usize {
        self.target_count.saturating_sub(self.results.len())
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() >= self.target_count
    }

    pub fn to_json(&self) -> Result<String, RoundError> {
        serde_json::to_string(self).map_err(|e| RoundError::Json(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, RoundError> {
        let round: Self = serde_json::from_str(json).map_err(|e| RoundError::Json(e.to_string()))?;
        if round.target_count == 0 {
            return Err(RoundError::EmptyRound);
        }
        if round.results.len() > round.target_count {
            return Err(RoundError::Json(format!(
                "{} results for a {}-target round",
                round.results.len(),
                round.target_count
            )));
        }
        Ok(round)
    }

    fn push(&mut self, result: TargetResult) -> Result<&TargetResult, RoundError> {
        if self.is_complete() {
            return Err(RoundError::RoundComplete(self.target_count));
        }
        debug!(
            number = result.number,
            outcome = result.outcome.as_str(),
            "target recorded"
        );
        self.results.push(result);
        Ok(&self.results[self.results.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected(outcome: Outcome, shots: &[u64]) -> TargetOutcome {
        TargetOutcome::from_shots(outcome, shots, 0)
    }

    #[test]
    fn test_standard_round() {
        let round = Round::standard("Ana");
        assert_eq!(round.target_count(), 25);
        assert_eq!(round.remaining(), 25);
        assert_eq!(round.score(), 0);
        assert!(!round.is_complete());
    }

    #[test]
    fn test_empty_round_rejected() {
        assert_eq!(Round::new("Ana", 0), Err(RoundError::EmptyRound));
    }

    #[test]
    fn test_record_detected_outcomes() {
        let mut round = Round::new("Ana", 3).unwrap();
        let first = round
            .record_detected(&detected(Outcome::HitFirstShot, &[100]))
            .unwrap();
        assert_eq!(first.number, 1);
        assert!(first.first_shot_fired);
        assert!(!first.second_shot_fired);

        round
            .record_detected(&detected(Outcome::HitSecondShot, &[5000, 6000]))
            .unwrap();
        round
            .record_detected(&detected(Outcome::Miss, &[9000, 9800]))
            .unwrap();

        assert_eq!(round.score(), 2);
        assert_eq!(
            round.tally(),
            Tally {
                hit_first_shot: 1,
                hit_second_shot: 1,
                miss: 1
            }
        );
        assert!(round.is_complete());
    }

    #[test]
    fn test_full_round_rejects_more() {
        let mut round = Round::new("Ana", 1).unwrap();
        round.record_manual(Outcome::Miss).unwrap();
        assert_eq!(
            round.record_manual(Outcome::HitFirstShot).unwrap_err(),
            RoundError::RoundComplete(1)
        );
    }

    #[test]
    fn test_manual_entry_and_undo() {
        let mut round = Round::standard("Luis");
        round.record_manual(Outcome::HitSecondShot).unwrap();
        assert_eq!(round.results()[0].source, ResultSource::Manual);
        assert!(round.results()[0].second_shot_fired);

        let undone = round.undo_last().unwrap();
        assert_eq!(undone.outcome, Outcome::HitSecondShot);
        assert_eq!(round.remaining(), 25);

        round.record_manual(Outcome::HitFirstShot).unwrap();
        assert_eq!(round.results()[0].number, 1);
    }

    #[test]
    fn test_json_uses_scorecard_tags() {
        let mut round = Round::new("Ana", 2).unwrap();
        round.record_manual(Outcome::Miss).unwrap();
        let json = round.to_json().unwrap();
        assert!(json.contains("\"fallo\""));

        let restored = Round::from_json(&json).unwrap();
        assert_eq!(restored, round);
    }

    #[test]
    fn test_from_json_rejects_overfull_round() {
        let json = r#"{"shooter":"Ana","target_count":1,"results":[
            {"number":1,"first_shot_fired":true,"second_shot_fired":false,"outcome":"acierto1","source":"manual"},
            {"number":2,"first_shot_fired":true,"second_shot_fired":false,"outcome":"acierto1","source":"manual"}
        ]}"#;
        assert!(matches!(Round::from_json(json), Err(RoundError::Json(_))));
    }
}
