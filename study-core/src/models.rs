use crate::error::{Result, StudyError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Quality at or above which a response counts as correct.
pub const DEFAULT_CORRECT_THRESHOLD: f64 = 0.6;
/// Cards offered when nothing in the deck is due.
pub const DEFAULT_NEW_CARD_CAP: usize = 10;
pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const INITIAL_INTERVAL: u32 = 1;

/// A front/back card as registered in the record store's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub deck_id: String,
    pub front: String,
    pub back: String,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(deck_id: impl Into<String>, front: impl Into<String>, back: impl Into<String>) -> Self {
        Card {
            id: Uuid::new_v4().to_string(),
            deck_id: deck_id.into(),
            front: front.into(),
            back: back.into(),
            created_at: Utc::now(),
        }
    }
}

/// Per (user, card) spaced repetition state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingRecord {
    pub ease_factor: f64,
    pub interval: u32, // days
    pub repetitions: u32,
    pub next_review: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed: Option<DateTime<Utc>>,
}

impl SchedulingRecord {
    /// Record for a card that has never been studied: due immediately.
    pub fn new(now: DateTime<Utc>, settings: &StudySettings) -> Self {
        SchedulingRecord {
            ease_factor: settings.initial_ease_factor,
            interval: settings.initial_interval,
            repetitions: 0,
            next_review: now,
            last_reviewed: None,
        }
    }
}

/// Normalized response score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ReviewQuality(f64);

impl ReviewQuality {
    pub const KNEW_IT: ReviewQuality = ReviewQuality(1.0);
    pub const DIDNT_KNOW: ReviewQuality = ReviewQuality(0.0);

    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(ReviewQuality(value))
        } else {
            Err(StudyError::InvalidQuality(format!("{} is outside [0, 1]", value)))
        }
    }

    /// Binary "knew it" signal: 1 is full quality, 0 is a miss.
    pub fn from_binary(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::DIDNT_KNOW),
            1 => Ok(Self::KNEW_IT),
            _ => Err(StudyError::InvalidQuality(format!("binary quality must be 0 or 1, got {}", value))),
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for ReviewQuality {
    type Error = StudyError;

    fn try_from(value: f64) -> Result<Self> {
        ReviewQuality::new(value)
    }
}

impl From<ReviewQuality> for f64 {
    fn from(quality: ReviewQuality) -> f64 {
        quality.0
    }
}

impl FromStr for ReviewQuality {
    type Err = StudyError;

    /// Accepts the `correct` / `incorrect` labels as well as numeric scores.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "correct" => Ok(Self::KNEW_IT),
            "incorrect" => Ok(Self::DIDNT_KNOW),
            other => other
                .parse::<f64>()
                .map_err(|_| StudyError::InvalidQuality(format!("unrecognized quality '{}'", s)))
                .and_then(ReviewQuality::new),
        }
    }
}

/// Scheduler and session policy knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StudySettings {
    pub correct_threshold: f64,
    pub new_card_cap: usize,
    /// Ease floor, never below [`MIN_EASE_FACTOR`].
    pub min_ease_factor: f64,
    pub initial_ease_factor: f64,
    pub initial_interval: u32,
    /// Subtracted from the ease factor on an incorrect response. Zero keeps ease untouched.
    pub failure_ease_penalty: f64,
}

impl Default for StudySettings {
    fn default() -> Self {
        StudySettings {
            correct_threshold: DEFAULT_CORRECT_THRESHOLD,
            new_card_cap: DEFAULT_NEW_CARD_CAP,
            min_ease_factor: MIN_EASE_FACTOR,
            initial_ease_factor: INITIAL_EASE_FACTOR,
            initial_interval: INITIAL_INTERVAL,
            failure_ease_penalty: 0.0,
        }
    }
}

impl StudySettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.correct_threshold > 0.0 && self.correct_threshold <= 1.0) {
            return Err(StudyError::InvalidSettings(format!(
                "correct_threshold must be in (0, 1], got {}",
                self.correct_threshold
            )));
        }
        if self.new_card_cap == 0 {
            return Err(StudyError::InvalidSettings("new_card_cap must be at least 1".to_string()));
        }
        if !(self.min_ease_factor >= MIN_EASE_FACTOR) {
            return Err(StudyError::InvalidSettings(format!(
                "min_ease_factor must be at least {}, got {}",
                MIN_EASE_FACTOR, self.min_ease_factor
            )));
        }
        if !(self.initial_ease_factor >= self.min_ease_factor) {
            return Err(StudyError::InvalidSettings(format!(
                "initial_ease_factor {} is below min_ease_factor {}",
                self.initial_ease_factor, self.min_ease_factor
            )));
        }
        if self.initial_interval == 0 {
            return Err(StudyError::InvalidSettings("initial_interval must be at least 1 day".to_string()));
        }
        if !(self.failure_ease_penalty >= 0.0) {
            return Err(StudyError::InvalidSettings(format!(
                "failure_ease_penalty must not be negative, got {}",
                self.failure_ease_penalty
            )));
        }
        Ok(())
    }
}

/// A card offered in a study session together with its scheduling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyCard {
    #[serde(flatten)]
    pub card: Card,
    pub study_data: SchedulingRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySet {
    pub cards: Vec<StudyCard>,
    pub total_cards: usize,
    pub due_cards: usize,
    pub new_cards: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub next_review: DateTime<Utc>,
    pub interval: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyStats {
    pub total_cards: usize,
    pub due_cards: usize,
    pub reviewed_today: usize,
    pub average_ease_factor: f64,
}

/// Interval each answer would produce, for "again / knew it" buttons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalPreview {
    pub again: u32,
    pub knew_it: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_bounds() {
        assert!(ReviewQuality::new(0.0).is_ok());
        assert!(ReviewQuality::new(0.6).is_ok());
        assert!(ReviewQuality::new(1.0).is_ok());
        assert!(matches!(ReviewQuality::new(1.01), Err(StudyError::InvalidQuality(_))));
        assert!(matches!(ReviewQuality::new(-0.1), Err(StudyError::InvalidQuality(_))));
        assert!(matches!(ReviewQuality::new(f64::NAN), Err(StudyError::InvalidQuality(_))));
    }

    #[test]
    fn test_quality_from_binary() {
        assert_eq!(ReviewQuality::from_binary(1).unwrap().value(), 1.0);
        assert_eq!(ReviewQuality::from_binary(0).unwrap().value(), 0.0);
        assert!(ReviewQuality::from_binary(2).is_err());
    }

    #[test]
    fn test_quality_from_labels() {
        assert_eq!("correct".parse::<ReviewQuality>().unwrap(), ReviewQuality::KNEW_IT);
        assert_eq!("Incorrect".parse::<ReviewQuality>().unwrap(), ReviewQuality::DIDNT_KNOW);
        assert_eq!("0.75".parse::<ReviewQuality>().unwrap().value(), 0.75);
        assert!("maybe".parse::<ReviewQuality>().is_err());
        assert!("3".parse::<ReviewQuality>().is_err());
    }

    #[test]
    fn test_quality_deserialize_rejects_out_of_range() {
        let ok: ReviewQuality = serde_json::from_str("0.8").unwrap();
        assert_eq!(ok.value(), 0.8);
        assert!(serde_json::from_str::<ReviewQuality>("4").is_err());
    }

    #[test]
    fn test_new_record_defaults() {
        let now = Utc::now();
        let record = SchedulingRecord::new(now, &StudySettings::default());
        assert_eq!(record.ease_factor, 2.5);
        assert_eq!(record.interval, 1);
        assert_eq!(record.repetitions, 0);
        assert_eq!(record.next_review, now);
        assert!(record.last_reviewed.is_none());
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = StudySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.correct_threshold, 0.6);
        assert_eq!(settings.new_card_cap, 10);
        assert_eq!(settings.failure_ease_penalty, 0.0);
    }

    #[test]
    fn test_invalid_settings() {
        let cases = [
            StudySettings { correct_threshold: 0.0, ..Default::default() },
            StudySettings { correct_threshold: 1.5, ..Default::default() },
            StudySettings { new_card_cap: 0, ..Default::default() },
            StudySettings { min_ease_factor: 0.5, ..Default::default() },
            StudySettings { min_ease_factor: 1.0, initial_ease_factor: 1.3, ..Default::default() },
            StudySettings { min_ease_factor: 1.29, ..Default::default() },
            StudySettings { initial_ease_factor: 1.2, ..Default::default() },
            StudySettings { initial_interval: 0, ..Default::default() },
            StudySettings { failure_ease_penalty: -0.2, ..Default::default() },
        ];
        for settings in cases {
            assert!(
                matches!(settings.validate(), Err(StudyError::InvalidSettings(_))),
                "expected {:?} to be rejected",
                settings
            );
        }
    }

    #[test]
    fn test_partial_settings_json_uses_defaults() {
        let settings: StudySettings = serde_json::from_str(r#"{"newCardCap": 5}"#).unwrap();
        assert_eq!(settings.new_card_cap, 5);
        assert_eq!(settings.correct_threshold, 0.6);
    }

    #[test]
    fn test_settings_serialize_camel_case() {
        let value = serde_json::to_value(StudySettings::default()).unwrap();
        assert_eq!(value["correctThreshold"], 0.6);
        assert_eq!(value["newCardCap"], 10);
        assert_eq!(value["failureEasePenalty"], 0.0);
        assert!(value.get("new_card_cap").is_none());
    }

    #[test]
    fn test_study_card_serializes_flat() {
        let card = Card::new("deck1", "Hola", "Hello");
        let study_card = StudyCard {
            study_data: SchedulingRecord::new(Utc::now(), &StudySettings::default()),
            card: card.clone(),
        };
        let value = serde_json::to_value(&study_card).unwrap();
        assert_eq!(value["id"], card.id.as_str());
        assert_eq!(value["deckId"], "deck1");
        assert_eq!(value["studyData"]["easeFactor"], 2.5);
        assert!(value["studyData"].get("lastReviewed").is_none());
    }
}
