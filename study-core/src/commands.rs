//! Request-shaped entry points for an outer API layer.

use crate::error::Result;
use crate::models::{GradeOutcome, ReviewQuality, StudySet, StudyStats};
use crate::storage::ReviewStateStore;
use crate::study_service::StudyService;
use serde::Deserialize;

/// Quality as it arrives on the wire: a score in `[0, 1]`, a 0/1 flag or a
/// `correct` / `incorrect` label.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QualityInput {
    Score(f64),
    Label(String),
}

impl QualityInput {
    pub fn parse(&self) -> Result<ReviewQuality> {
        match self {
            QualityInput::Score(score) => ReviewQuality::new(*score),
            QualityInput::Label(label) => label.parse(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyResponseRequest {
    pub card_id: String,
    pub quality: QualityInput,
}

// Study session commands
pub fn get_study_cards<S: ReviewStateStore>(service: &StudyService<S>, user_id: &str, deck_id: &str) -> Result<StudySet> {
    service.fetch_study_set(user_id, deck_id)
}

pub fn submit_study_response<S: ReviewStateStore>(
    service: &StudyService<S>,
    user_id: &str,
    request: StudyResponseRequest,
) -> Result<GradeOutcome> {
    let quality = request.quality.parse()?;
    service.grade_card(user_id, &request.card_id, quality)
}

pub fn get_study_stats<S: ReviewStateStore>(
    service: &StudyService<S>,
    user_id: &str,
    deck_id: Option<&str>,
) -> Result<StudyStats> {
    service.get_stats(user_id, deck_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Card;
    use crate::storage::MemoryStore;

    fn request(json: &str) -> StudyResponseRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_quality_input_forms() {
        assert_eq!(request(r#"{"cardId":"c","quality":1}"#).quality.parse().unwrap().value(), 1.0);
        assert_eq!(request(r#"{"cardId":"c","quality":0.8}"#).quality.parse().unwrap().value(), 0.8);
        assert_eq!(request(r#"{"cardId":"c","quality":"incorrect"}"#).quality.parse().unwrap().value(), 0.0);
        assert!(request(r#"{"cardId":"c","quality":5}"#).quality.parse().is_err());
        assert!(request(r#"{"cardId":"c","quality":"hard"}"#).quality.parse().is_err());
    }

    #[test]
    fn test_study_round_trip() {
        let service = StudyService::new(MemoryStore::new()).unwrap();
        let card = Card::new("deck1", "Hola", "Hello");
        service.store().register_card(card.clone()).unwrap();

        let set = get_study_cards(&service, "user1", "deck1").unwrap();
        assert_eq!(set.cards.len(), 1);

        let body = format!(r#"{{"cardId":"{}","quality":"correct"}}"#, card.id);
        let outcome = submit_study_response(&service, "user1", request(&body)).unwrap();
        assert_eq!(outcome.interval, 1);

        let stats = get_study_stats(&service, "user1", Some("deck1")).unwrap();
        assert_eq!(stats.total_cards, 1);
        assert_eq!(stats.reviewed_today, 1);
    }

    #[test]
    fn test_error_status_codes() {
        let service = StudyService::new(MemoryStore::new()).unwrap();

        let missing_deck = get_study_cards(&service, "user1", "nope").unwrap_err();
        assert_eq!(missing_deck.status_code(), 404);

        let ungraded = submit_study_response(&service, "user1", request(r#"{"cardId":"c","quality":1}"#)).unwrap_err();
        assert_eq!(ungraded.status_code(), 404);

        let bad_quality = submit_study_response(&service, "user1", request(r#"{"cardId":"c","quality":1.5}"#)).unwrap_err();
        assert_eq!(bad_quality.status_code(), 400);
    }
}
