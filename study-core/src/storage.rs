//! Scheduling record persistence.
//!
//! One [`SchedulingRecord`] per (user, card). The store also keeps the card
//! catalog so a deck's records can be listed in card order; removing a card
//! drops every user's record for it.

use crate::error::{Result, StudyError};
use crate::models::{Card, SchedulingRecord, StudySettings};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const APP_DIR: &str = "spaced-study";
const DATA_FILE: &str = "records.json";
const SETTINGS_FILE: &str = "settings.json";

pub trait ReviewStateStore: Send + Sync {
    fn get(&self, user_id: &str, card_id: &str) -> Result<Option<SchedulingRecord>>;

    /// Every card of the deck, in catalog order, with the user's record if one exists.
    fn get_all_for_deck(&self, user_id: &str, deck_id: &str) -> Result<Vec<(Card, Option<SchedulingRecord>)>>;

    /// All of a user's records, optionally restricted to one deck.
    fn get_all_for_user(&self, user_id: &str, deck_id: Option<&str>) -> Result<Vec<SchedulingRecord>>;

    /// Fails with `AlreadyExists` if the key is taken.
    fn create(&self, user_id: &str, card_id: &str, record: SchedulingRecord) -> Result<()>;

    /// Fails with `NotFound` if the key is absent.
    fn update(&self, user_id: &str, card_id: &str, record: SchedulingRecord) -> Result<()>;

    /// Create several of a user's records at once. Either all are created
    /// or, on `AlreadyExists`, none are.
    fn create_many(&self, user_id: &str, records: Vec<(String, SchedulingRecord)>) -> Result<()>;

    fn register_deck(&self, deck_id: &str) -> Result<()>;

    /// Add or replace a catalog card. Registers its deck.
    fn register_card(&self, card: Card) -> Result<()>;

    /// Remove a card and every record that refers to it. Returns whether the card existed.
    fn remove_card(&self, card_id: &str) -> Result<bool>;

    fn load_settings(&self) -> Result<Option<StudySettings>> {
        Ok(None)
    }

    fn save_settings(&self, _settings: &StudySettings) -> Result<()> {
        Ok(())
    }
}

/// Catalog and records, shared by both store flavours.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    decks: BTreeSet<String>,
    #[serde(default)]
    cards: Vec<Card>,
    /// user id -> card id -> record
    #[serde(default)]
    records: HashMap<String, HashMap<String, SchedulingRecord>>,
}

impl StoreData {
    fn get(&self, user_id: &str, card_id: &str) -> Option<SchedulingRecord> {
        self.records.get(user_id).and_then(|by_card| by_card.get(card_id)).cloned()
    }

    fn ensure_deck(&self, deck_id: &str) -> Result<()> {
        if self.decks.contains(deck_id) {
            Ok(())
        } else {
            Err(StudyError::DeckNotFound(deck_id.to_string()))
        }
    }

    fn deck_cards<'a>(&'a self, deck_id: &'a str) -> Result<impl Iterator<Item = &'a Card> + 'a> {
        self.ensure_deck(deck_id)?;
        Ok(self.cards.iter().filter(move |card| card.deck_id == deck_id))
    }

    fn get_all_for_deck(&self, user_id: &str, deck_id: &str) -> Result<Vec<(Card, Option<SchedulingRecord>)>> {
        Ok(self
            .deck_cards(deck_id)?
            .map(|card| (card.clone(), self.get(user_id, &card.id)))
            .collect())
    }

    fn get_all_for_user(&self, user_id: &str, deck_id: Option<&str>) -> Result<Vec<SchedulingRecord>> {
        let Some(by_card) = self.records.get(user_id) else {
            if let Some(deck_id) = deck_id {
                self.ensure_deck(deck_id)?;
            }
            return Ok(Vec::new());
        };

        match deck_id {
            Some(deck_id) => Ok(self
                .deck_cards(deck_id)?
                .filter_map(|card| by_card.get(&card.id).cloned())
                .collect()),
            None => Ok(by_card.values().cloned().collect()),
        }
    }

    fn create(&mut self, user_id: &str, card_id: &str, record: SchedulingRecord) -> Result<()> {
        let by_card = self.records.entry(user_id.to_string()).or_default();
        if by_card.contains_key(card_id) {
            return Err(StudyError::already_exists(user_id, card_id));
        }
        by_card.insert(card_id.to_string(), record);
        Ok(())
    }

    fn create_many(&mut self, user_id: &str, records: Vec<(String, SchedulingRecord)>) -> Result<()> {
        let existing = self.records.get(user_id);
        let mut seen = HashSet::new();
        for (card_id, _) in &records {
            let taken = existing.map_or(false, |by_card| by_card.contains_key(card_id));
            if taken || !seen.insert(card_id.as_str()) {
                return Err(StudyError::already_exists(user_id, card_id));
            }
        }
        if records.is_empty() {
            return Ok(());
        }

        self.records.entry(user_id.to_string()).or_default().extend(records);
        Ok(())
    }

    fn update(&mut self, user_id: &str, card_id: &str, record: SchedulingRecord) -> Result<()> {
        match self.records.get_mut(user_id).and_then(|by_card| by_card.get_mut(card_id)) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StudyError::not_found(user_id, card_id)),
        }
    }

    fn register_card(&mut self, card: Card) {
        self.decks.insert(card.deck_id.clone());
        match self.cards.iter_mut().find(|existing| existing.id == card.id) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    fn remove_card(&mut self, card_id: &str) -> bool {
        let before = self.cards.len();
        self.cards.retain(|card| card.id != card_id);
        let removed = self.cards.len() != before;

        for by_card in self.records.values_mut() {
            by_card.remove(card_id);
        }
        self.records.retain(|_, by_card| !by_card.is_empty());
        removed
    }
}

fn lock_data(data: &Mutex<StoreData>) -> Result<MutexGuard<'_, StoreData>> {
    data.lock().map_err(|_| StudyError::Lock("review records"))
}

/// Volatile store, settings are kept for the lifetime of the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
    settings: Mutex<Option<StudySettings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewStateStore for MemoryStore {
    fn get(&self, user_id: &str, card_id: &str) -> Result<Option<SchedulingRecord>> {
        Ok(lock_data(&self.data)?.get(user_id, card_id))
    }

    fn get_all_for_deck(&self, user_id: &str, deck_id: &str) -> Result<Vec<(Card, Option<SchedulingRecord>)>> {
        lock_data(&self.data)?.get_all_for_deck(user_id, deck_id)
    }

    fn get_all_for_user(&self, user_id: &str, deck_id: Option<&str>) -> Result<Vec<SchedulingRecord>> {
        lock_data(&self.data)?.get_all_for_user(user_id, deck_id)
    }

    fn create(&self, user_id: &str, card_id: &str, record: SchedulingRecord) -> Result<()> {
        lock_data(&self.data)?.create(user_id, card_id, record)
    }

    fn update(&self, user_id: &str, card_id: &str, record: SchedulingRecord) -> Result<()> {
        lock_data(&self.data)?.update(user_id, card_id, record)
    }

    fn create_many(&self, user_id: &str, records: Vec<(String, SchedulingRecord)>) -> Result<()> {
        lock_data(&self.data)?.create_many(user_id, records)
    }

    fn register_deck(&self, deck_id: &str) -> Result<()> {
        lock_data(&self.data)?.decks.insert(deck_id.to_string());
        Ok(())
    }

    fn register_card(&self, card: Card) -> Result<()> {
        lock_data(&self.data)?.register_card(card);
        Ok(())
    }

    fn remove_card(&self, card_id: &str) -> Result<bool> {
        Ok(lock_data(&self.data)?.remove_card(card_id))
    }

    fn load_settings(&self) -> Result<Option<StudySettings>> {
        let settings = self.settings.lock().map_err(|_| StudyError::Lock("settings"))?;
        Ok(settings.clone())
    }

    fn save_settings(&self, settings: &StudySettings) -> Result<()> {
        let mut stored = self.settings.lock().map_err(|_| StudyError::Lock("settings"))?;
        *stored = Some(settings.clone());
        Ok(())
    }
}

/// Store persisted as pretty JSON, rewritten after every change.
/// Settings live in `settings.json` next to the data file.
pub struct JsonFileStore {
    data_file: PathBuf,
    settings_file: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    /// Store under the platform data directory (e.g. `~/.local/share/spaced-study/`)
    pub fn open_default() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no platform data directory"))?
            .join(APP_DIR);
        Self::new_with_path(data_dir.join(DATA_FILE))
    }

    pub fn new_with_path(data_file: PathBuf) -> Result<Self> {
        if let Some(parent) = data_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let settings_file = data_file.with_file_name(SETTINGS_FILE);
        let data = Self::load(&data_file)?;
        info!(
            "Loaded {} cards and records for {} users from {}",
            data.cards.len(),
            data.records.len(),
            data_file.display()
        );

        Ok(JsonFileStore {
            data_file,
            settings_file,
            data: Mutex::new(data),
        })
    }

    pub fn get_data_file_path(&self) -> &Path {
        &self.data_file
    }

    fn load(data_file: &Path) -> Result<StoreData> {
        if !data_file.exists() {
            return Ok(StoreData::default());
        }
        let file = File::open(data_file).map_err(|e| {
            warn!("Failed to open review records at {}: {}", data_file.display(), e);
            e
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            warn!("Failed to parse review records at {}: {}", data_file.display(), e);
            StudyError::from(e)
        })
    }

    fn save(&self, data: &StoreData) -> Result<()> {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&self.data_file)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, data)?;
        debug!("Saved review records to {}", self.data_file.display());
        Ok(())
    }

    /// Apply a change to a copy, persist it, then publish it.
    /// Memory is left untouched when the write fails.
    fn mutate<T>(&self, change: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        let mut data = lock_data(&self.data)?;
        let mut next = data.clone();
        let value = change(&mut next)?;
        if let Err(e) = self.save(&next) {
            warn!("Failed to save review records to {}: {}", self.data_file.display(), e);
            return Err(e);
        }
        *data = next;
        Ok(value)
    }
}

impl ReviewStateStore for JsonFileStore {
    fn get(&self, user_id: &str, card_id: &str) -> Result<Option<SchedulingRecord>> {
        Ok(lock_data(&self.data)?.get(user_id, card_id))
    }

    fn get_all_for_deck(&self, user_id: &str, deck_id: &str) -> Result<Vec<(Card, Option<SchedulingRecord>)>> {
        lock_data(&self.data)?.get_all_for_deck(user_id, deck_id)
    }

    fn get_all_for_user(&self, user_id: &str, deck_id: Option<&str>) -> Result<Vec<SchedulingRecord>> {
        lock_data(&self.data)?.get_all_for_user(user_id, deck_id)
    }

    fn create(&self, user_id: &str, card_id: &str, record: SchedulingRecord) -> Result<()> {
        self.mutate(|data| data.create(user_id, card_id, record))
    }

    fn update(&self, user_id: &str, card_id: &str, record: SchedulingRecord) -> Result<()> {
        self.mutate(|data| data.update(user_id, card_id, record))
    }

    fn create_many(&self, user_id: &str, records: Vec<(String, SchedulingRecord)>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.mutate(|data| data.create_many(user_id, records))
    }

    fn register_deck(&self, deck_id: &str) -> Result<()> {
        self.mutate(|data| {
            data.decks.insert(deck_id.to_string());
            Ok(())
        })
    }

    fn register_card(&self, card: Card) -> Result<()> {
        self.mutate(|data| {
            data.register_card(card);
            Ok(())
        })
    }

    fn remove_card(&self, card_id: &str) -> Result<bool> {
        self.mutate(|data| Ok(data.remove_card(card_id)))
    }

    fn load_settings(&self) -> Result<Option<StudySettings>> {
        if !self.settings_file.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&self.settings_file)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    fn save_settings(&self, settings: &StudySettings) -> Result<()> {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&self.settings_file)?;
        serde_json::to_writer_pretty(BufWriter::new(file), settings)?;
        Ok(())
    }
}
