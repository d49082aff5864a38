use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StudyError};
use crate::models::{GradeOutcome, ReviewQuality, SchedulingRecord, StudyCard, StudySet, StudySettings, StudyStats};
use crate::spaced_repetition::SpacedRepetition;
use crate::storage::ReviewStateStore;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type GradingKey = (String, String);

/// Builds study sessions from a record store and applies graded responses.
pub struct StudyService<S: ReviewStateStore> {
    store: S,
    settings: Mutex<StudySettings>,
    clock: Arc<dyn Clock>,
    grading_locks: Mutex<HashMap<GradingKey, Arc<Mutex<()>>>>,
}

impl<S: ReviewStateStore> StudyService<S> {
    pub fn new(store: S) -> Result<Self> {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Settings come from the store when it has any, defaults otherwise.
    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Result<Self> {
        let settings = store.load_settings()?.unwrap_or_default();
        settings.validate()?;
        Ok(StudyService {
            store,
            settings: Mutex::new(settings),
            clock,
            grading_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cards to present for one sitting.
    ///
    /// Missing records are created on the way. When nothing is due the first
    /// `new_card_cap` cards of the deck are offered instead.
    pub fn fetch_study_set(&self, user_id: &str, deck_id: &str) -> Result<StudySet> {
        let now = self.clock.now();
        let settings = self.settings()?;

        let entries = self.store.get_all_for_deck(user_id, deck_id)?;
        let total_cards = entries.len();

        let missing = entries
            .iter()
            .filter(|(_, record)| record.is_none())
            .map(|(card, _)| (card.id.clone(), SchedulingRecord::new(now, &settings)))
            .collect();
        let mut created = self.create_missing(user_id, missing)?;

        let mut cards = Vec::with_capacity(total_cards);
        for (card, record) in entries {
            let study_data = match record.or_else(|| created.remove(&card.id)) {
                Some(record) => record,
                None => self.ensure_record(user_id, &card.id, now, &settings)?,
            };
            cards.push(StudyCard { card, study_data });
        }

        let due_cards = SpacedRepetition::count_due(cards.iter().map(|c| &c.study_data), now);
        let cards: Vec<StudyCard> = if due_cards > 0 {
            cards
                .into_iter()
                .filter(|c| SpacedRepetition::is_due(&c.study_data, now))
                .collect()
        } else {
            if total_cards > 0 {
                debug!(
                    "Nothing due in deck {} for user {}, offering up to {} cards",
                    deck_id, user_id, settings.new_card_cap
                );
            }
            cards.into_iter().take(settings.new_card_cap).collect()
        };

        Ok(StudySet {
            cards,
            total_cards,
            due_cards,
            new_cards: total_cards - due_cards,
        })
    }

    /// Reschedule a card after a response.
    pub fn grade_card(&self, user_id: &str, card_id: &str, quality: ReviewQuality) -> Result<GradeOutcome> {
        let settings = self.settings()?;
        let key_lock = self.grading_lock(user_id, card_id)?;

        let outcome = match key_lock.lock() {
            Ok(_guard) => self.apply_grade(user_id, card_id, quality, &settings),
            Err(_) => Err(StudyError::Lock("grading key")),
        };

        self.release_grading_lock(user_id, card_id, key_lock);
        outcome
    }

    // Caller holds the (user, card) grading lock.
    fn apply_grade(
        &self,
        user_id: &str,
        card_id: &str,
        quality: ReviewQuality,
        settings: &StudySettings,
    ) -> Result<GradeOutcome> {
        let current = self
            .store
            .get(user_id, card_id)?
            .ok_or_else(|| StudyError::not_found(user_id, card_id))?;

        let now = self.clock.now();
        let next = SpacedRepetition::next_state(&current, quality, now, settings);
        let outcome = GradeOutcome {
            next_review: next.next_review,
            interval: next.interval,
        };
        info!(
            "Graded card {} for user {} at quality {:.2}: interval {} -> {} days, ease {:.2} -> {:.2}",
            card_id,
            user_id,
            quality.value(),
            current.interval,
            next.interval,
            current.ease_factor,
            next.ease_factor
        );
        self.store.update(user_id, card_id, next)?;
        Ok(outcome)
    }

    /// Dashboard numbers for all of a user's records, or one deck's.
    pub fn get_stats(&self, user_id: &str, deck_id: Option<&str>) -> Result<StudyStats> {
        let records = self.store.get_all_for_user(user_id, deck_id)?;
        Ok(SpacedRepetition::calculate_stats(&records, self.clock.now()))
    }

    pub fn settings(&self) -> Result<StudySettings> {
        let settings = self.settings.lock().map_err(|_| StudyError::Lock("settings"))?;
        Ok(settings.clone())
    }

    pub fn update_settings(&self, new_settings: StudySettings) -> Result<StudySettings> {
        new_settings.validate()?;
        let mut settings = self.settings.lock().map_err(|_| StudyError::Lock("settings"))?;
        self.store.save_settings(&new_settings)?;
        info!("Study settings updated: {:?}", new_settings);
        *settings = new_settings.clone();
        Ok(new_settings)
    }

    // One batch write for every missing record. If another caller got to any
    // of them first nothing is created here and the cards go one at a time.
    fn create_missing(
        &self,
        user_id: &str,
        missing: Vec<(String, SchedulingRecord)>,
    ) -> Result<HashMap<String, SchedulingRecord>> {
        if missing.is_empty() {
            return Ok(HashMap::new());
        }
        let count = missing.len();
        match self.store.create_many(user_id, missing.clone()) {
            Ok(()) => {
                debug!("Created {} scheduling records for user {}", count, user_id);
                Ok(missing.into_iter().collect())
            }
            Err(StudyError::AlreadyExists { .. }) => {
                warn!("Scheduling records for user {} were created concurrently", user_id);
                Ok(HashMap::new())
            }
            Err(e) => Err(e),
        }
    }

    // Check-then-create; a concurrent creator wins and its record is used.
    fn ensure_record(
        &self,
        user_id: &str,
        card_id: &str,
        now: DateTime<Utc>,
        settings: &StudySettings,
    ) -> Result<SchedulingRecord> {
        let record = SchedulingRecord::new(now, settings);
        match self.store.create(user_id, card_id, record.clone()) {
            Ok(()) => {
                debug!("Created scheduling record for user {} card {}", user_id, card_id);
                Ok(record)
            }
            Err(StudyError::AlreadyExists { .. }) => {
                warn!("Scheduling record for user {} card {} was created concurrently", user_id, card_id);
                self.store
                    .get(user_id, card_id)?
                    .ok_or_else(|| StudyError::not_found(user_id, card_id))
            }
            Err(e) => Err(e),
        }
    }

    fn grading_lock(&self, user_id: &str, card_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.grading_locks.lock().map_err(|_| StudyError::Lock("grading locks"))?;
        Ok(locks
            .entry((user_id.to_string(), card_id.to_string()))
            .or_default()
            .clone())
    }

    // Drop the table entry once nobody else is waiting on it.
    fn release_grading_lock(&self, user_id: &str, card_id: &str, key_lock: Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.grading_locks.lock() {
            if Arc::strong_count(&key_lock) == 2 {
                locks.remove(&(user_id.to_string(), card_id.to_string()));
            }
        }
    }
}
