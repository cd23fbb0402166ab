//! Risk scoring for near-earth objects.
//!
//! The score is a weighted sum of four independently capped terms:
//!
//! | term      | input                  | contribution                  |
//! |-----------|------------------------|-------------------------------|
//! | hazard    | hazardous flag         | fixed bonus                   |
//! | size      | mean diameter (m)      | grows with size, capped       |
//! | velocity  | relative velocity      | grows with speed, capped      |
//! | proximity | miss distance (km)     | shrinks with distance, ≥ 0    |
//!
//! The sum is rounded to two decimals and clamped to `[0, 99]`. Scoring never
//! fails: missing inputs produce [`RiskAssessment::Floor`].

use serde::{Deserialize, Serialize};

use crate::feed::ObjectRecord;

/// Lowest possible score, also returned for unscorable records.
pub const SCORE_FLOOR: f64 = 0.0;

/// Highest possible score.
pub const SCORE_CEILING: f64 = 99.0;

/// Term weights and caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    /// Bonus for objects flagged potentially hazardous
    pub hazard_bonus: f64,
    /// Meters of mean diameter per point
    pub size_meters_per_point: f64,
    pub size_cap: f64,
    /// km/h of relative velocity per point
    pub velocity_kph_per_point: f64,
    pub velocity_cap: f64,
    /// Kilometers of miss distance that cost one point
    pub proximity_km_per_point: f64,
    pub proximity_cap: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            hazard_bonus: 50.0,
            size_meters_per_point: 10.0,
            size_cap: 20.0,
            velocity_kph_per_point: 10_000.0,
            velocity_cap: 10.0,
            proximity_km_per_point: 1_000_000.0,
            proximity_cap: 20.0,
        }
    }
}

/// Input that prevented a record from being scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringGap {
    Diameter,
    Velocity,
    MissDistance,
}

impl std::fmt::Display for ScoringGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Diameter => write!(f, "diameter"),
            Self::Velocity => write!(f, "velocity"),
            Self::MissDistance => write!(f, "miss distance"),
        }
    }
}

/// Result of scoring one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskAssessment {
    /// All inputs present
    Scored { score: f64 },
    /// An input was missing or malformed; the score is [`SCORE_FLOOR`]
    Floor { gap: ScoringGap },
}

impl RiskAssessment {
    /// Numeric score, with the floor value for unscorable records.
    pub fn value(&self) -> f64 {
        match self {
            Self::Scored { score } => *score,
            Self::Floor { .. } => SCORE_FLOOR,
        }
    }

    pub fn is_floor(&self) -> bool {
        matches!(self, Self::Floor { .. })
    }
}

/// A record annotated with its score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredObject {
    #[serde(flatten)]
    pub record: ObjectRecord,
    pub risk_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_gap: Option<ScoringGap>,
}

impl ScoredObject {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }
}

/// Deterministic, stateless risk scorer.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: RiskWeights,
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl RiskScorer {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    /// Score a single record.
    pub fn score(&self, record: &ObjectRecord) -> RiskAssessment {
        let w = &self.weights;

        let Some(diameter) = usable(record.mean_diameter_m()) else {
            return RiskAssessment::Floor { gap: ScoringGap::Diameter };
        };
        let Some(velocity) = usable(record.velocity_kph) else {
            return RiskAssessment::Floor { gap: ScoringGap::Velocity };
        };
        let Some(miss) = usable(record.miss_distance_km) else {
            return RiskAssessment::Floor { gap: ScoringGap::MissDistance };
        };

        let hazard = if record.hazardous { w.hazard_bonus } else { 0.0 };
        let size = (diameter / w.size_meters_per_point).min(w.size_cap);
        let speed = (velocity / w.velocity_kph_per_point).min(w.velocity_cap);
        let proximity = (w.proximity_cap - miss / w.proximity_km_per_point).clamp(0.0, w.proximity_cap);

        let total = round2(hazard + size + speed + proximity).clamp(SCORE_FLOOR, SCORE_CEILING);
        RiskAssessment::Scored { score: total }
    }

    /// Score a batch, keeping feed order.
    pub fn score_all(&self, records: Vec<ObjectRecord>) -> Vec<ScoredObject> {
        records
            .into_iter()
            .map(|record| {
                let assessment = self.score(&record);
                if let RiskAssessment::Floor { gap } = assessment {
                    tracing::debug!(identity = %record.id, gap = %gap, "Record scored at floor");
                }
                ScoredObject {
                    risk_score: assessment.value(),
                    scoring_gap: match assessment {
                        RiskAssessment::Floor { gap } => Some(gap),
                        RiskAssessment::Scored { .. } => None,
                    },
                    record,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hazardous: bool, diameter: f64, velocity: f64, miss: f64) -> ObjectRecord {
        ObjectRecord {
            id: "3542519".into(),
            name: "(2010 PK9)".into(),
            hazardous,
            diameter_min_m: Some(diameter),
            diameter_max_m: Some(diameter),
            velocity_kph: Some(velocity),
            miss_distance_km: Some(miss),
        }
    }

    #[test]
    fn test_known_scores() {
        let scorer = RiskScorer::default();

        let mut big = record(true, 0.0, 50_000.0, 5_000_000.0);
        big.diameter_min_m = Some(100.0);
        big.diameter_max_m = Some(300.0);
        // 50 + 20 + 5 + 15
        assert_eq!(scorer.score(&big).value(), 90.0);

        // 0 + 5 + 2 + 0.5
        let small = record(false, 50.0, 20_000.0, 19_500_000.0);
        assert_eq!(scorer.score(&small).value(), 7.5);
    }

    #[test]
    fn test_rounds_to_two_decimals() {
        let scorer = RiskScorer::default();
        let r = record(false, 0.0, 12_345.678, 30_000_000.0);
        assert_eq!(scorer.score(&r).value(), 1.23);
    }

    #[test]
    fn test_ceiling_clamp() {
        let scorer = RiskScorer::default();
        let extreme = record(true, 10_000.0, 1_000_000.0, 0.0);
        assert_eq!(scorer.score(&extreme).value(), SCORE_CEILING);
    }

    #[test]
    fn test_bounded_over_grid() {
        let scorer = RiskScorer::default();
        for hazardous in [false, true] {
            for diameter in [0.0, 1.0, 75.0, 199.9, 200.0, 5_000.0] {
                for velocity in [0.0, 9_999.0, 55_000.0, 250_000.0] {
                    for miss in [0.0, 1.0, 7_500_000.0, 20_000_000.0, 1e12] {
                        let s = scorer.score(&record(hazardous, diameter, velocity, miss)).value();
                        assert!((SCORE_FLOOR..=SCORE_CEILING).contains(&s), "{s} out of range");
                    }
                }
            }
        }
    }

    #[test]
    fn test_monotone_in_diameter() {
        let scorer = RiskScorer::default();
        let mut previous = f64::MIN;
        for diameter in (0..400).map(|d| d as f64 * 1.7) {
            let s = scorer.score(&record(false, diameter, 40_000.0, 3_000_000.0)).value();
            assert!(s >= previous, "score fell at diameter {diameter}");
            previous = s;
        }
    }

    #[test]
    fn test_monotone_in_velocity() {
        let scorer = RiskScorer::default();
        let mut previous = f64::MIN;
        for velocity in (0..300).map(|v| v as f64 * 613.0) {
            let s = scorer.score(&record(true, 80.0, velocity, 3_000_000.0)).value();
            assert!(s >= previous, "score fell at velocity {velocity}");
            previous = s;
        }
    }

    #[test]
    fn test_miss_distance_never_increases_score() {
        let scorer = RiskScorer::default();
        let mut previous = f64::MAX;
        for miss in (0..300).map(|m| m as f64 * 83_333.0) {
            let s = scorer.score(&record(true, 80.0, 40_000.0, miss)).value();
            assert!(s <= previous, "score rose at miss distance {miss}");
            previous = s;
        }
    }

    #[test]
    fn test_missing_inputs_floor() {
        let scorer = RiskScorer::default();

        let mut r = record(true, 100.0, 40_000.0, 1_000.0);
        r.velocity_kph = None;
        assert_eq!(scorer.score(&r), RiskAssessment::Floor { gap: ScoringGap::Velocity });

        let mut r = record(true, 100.0, 40_000.0, 1_000.0);
        r.diameter_min_m = None;
        r.diameter_max_m = None;
        assert_eq!(scorer.score(&r).value(), SCORE_FLOOR);

        let mut r = record(true, 100.0, 40_000.0, 1_000.0);
        r.miss_distance_km = Some(f64::NAN);
        assert!(scorer.score(&r).is_floor());

        let mut r = record(true, 100.0, 40_000.0, 1_000.0);
        r.miss_distance_km = Some(-5.0);
        assert_eq!(scorer.score(&r), RiskAssessment::Floor { gap: ScoringGap::MissDistance });
    }

    #[test]
    fn test_deterministic() {
        let scorer = RiskScorer::default();
        let r = record(true, 123.4, 56_789.0, 2_345_678.0);
        let first = scorer.score(&r);
        for _ in 0..10 {
            assert_eq!(scorer.score(&r), first);
        }
    }

    #[test]
    fn test_score_all_keeps_order_and_gap() {
        let scorer = RiskScorer::default();
        let mut broken = record(false, 10.0, 10.0, 10.0);
        broken.id = "broken".into();
        broken.velocity_kph = None;

        let scored = scorer.score_all(vec![record(true, 10.0, 10.0, 10.0), broken]);
        assert_eq!(scored.len(), 2);
        assert!(scored[0].scoring_gap.is_none());
        assert_eq!(scored[1].id(), "broken");
        assert_eq!(scored[1].risk_score, 0.0);
        assert_eq!(scored[1].scoring_gap, Some(ScoringGap::Velocity));
    }

    #[test]
    fn test_scored_object_serializes_flat() {
        let scorer = RiskScorer::default();
        let scored = scorer.score_all(vec![record(true, 10.0, 10.0, 10.0)]);
        let json = serde_json::to_value(&scored[0]).unwrap();
        assert_eq!(json["id"], "3542519");
        assert!(json.get("risk_score").is_some());
        assert!(json.get("scoring_gap").is_none());
    }
}
