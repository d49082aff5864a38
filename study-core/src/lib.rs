//! Spaced repetition scheduling for flashcard study sessions.
//!
//! [`spaced_repetition::SpacedRepetition`] holds the SM-2 derived rules,
//! [`study_service::StudyService`] turns them into study sets, grading and
//! statistics on top of a [`storage::ReviewStateStore`].

pub mod clock;
pub mod commands;
pub mod error;
pub mod models;
pub mod spaced_repetition;
pub mod storage;
pub mod study_service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Result, StudyError};
pub use models::*;
pub use spaced_repetition::SpacedRepetition;
pub use storage::{JsonFileStore, MemoryStore, ReviewStateStore};
pub use study_service::StudyService;

/// Install the `env_logger` backend for the `log` macros used here.
///
/// Debug builds log at `Info`, release builds only warnings. `RUST_LOG`
/// overrides either. Safe to call more than once.
pub fn init_logging() {
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
