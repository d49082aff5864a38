use crate::models::{IntervalPreview, ReviewQuality, SchedulingRecord, StudySettings, StudyStats, MIN_EASE_FACTOR};
use chrono::{DateTime, Duration, Utc};

/// Upper bound on a single interval, keeps `next_review` representable.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// SM-2 derived spaced repetition scheduler.
///
/// Stateless: every function takes the record, the response and `now`
/// explicitly and returns a fresh value.
pub struct SpacedRepetition;

impl SpacedRepetition {
    /// Check if a record is due for review at `now`
    pub fn is_due(record: &SchedulingRecord, now: DateTime<Utc>) -> bool {
        record.next_review <= now
    }

    /// Compute the replacement record after a graded response.
    ///
    /// A correct response (quality at or above the configured threshold)
    /// climbs the 1 day, 6 days, `interval * ease` ladder and adjusts the
    /// ease factor with the SM-2 formula on a 0-5 scale (`5 * quality`).
    /// The third rung multiplies by the ease factor the record carried into
    /// this review; the adjusted ease applies from the next review on.
    /// An incorrect response resets the ladder.
    pub fn next_state(
        record: &SchedulingRecord,
        quality: ReviewQuality,
        now: DateTime<Utc>,
        settings: &StudySettings,
    ) -> SchedulingRecord {
        let q = quality.value();

        let (repetitions, interval, ease_factor) = if q >= settings.correct_threshold {
            let repetitions = record.repetitions.saturating_add(1);
            let interval = match repetitions {
                1 => 1,
                2 => 6,
                _ => (record.interval as f64 * record.ease_factor).round() as u32,
            };
            (repetitions, interval, Self::adjusted_ease_factor(record.ease_factor, q))
        } else {
            (0, 1, record.ease_factor - settings.failure_ease_penalty)
        };

        let ease_factor = ease_factor.max(settings.min_ease_factor).max(MIN_EASE_FACTOR);

        let interval = interval.clamp(1, MAX_INTERVAL_DAYS);

        SchedulingRecord {
            ease_factor,
            interval,
            repetitions,
            next_review: now + Duration::days(interval as i64),
            last_reviewed: Some(now),
        }
    }

    /// EF' = EF + (0.1 - (5 - 5q) * (0.08 + (5 - 5q) * 0.02)), unfloored
    fn adjusted_ease_factor(ease_factor: f64, quality: f64) -> f64 {
        let miss = 5.0 - 5.0 * quality;
        ease_factor + (0.1 - miss * (0.08 + miss * 0.02))
    }

    /// Intervals the two answer buttons would produce
    pub fn preview_intervals(record: &SchedulingRecord, now: DateTime<Utc>, settings: &StudySettings) -> IntervalPreview {
        IntervalPreview {
            again: Self::next_state(record, ReviewQuality::DIDNT_KNOW, now, settings).interval,
            knew_it: Self::next_state(record, ReviewQuality::KNEW_IT, now, settings).interval,
        }
    }

    /// Count records that are due at `now`
    pub fn count_due<'a, I>(records: I, now: DateTime<Utc>) -> usize
    where
        I: IntoIterator<Item = &'a SchedulingRecord>,
    {
        records.into_iter().filter(|record| Self::is_due(record, now)).count()
    }

    /// Calculate dashboard statistics over a set of records
    pub fn calculate_stats(records: &[SchedulingRecord], now: DateTime<Utc>) -> StudyStats {
        if records.is_empty() {
            return StudyStats::default();
        }

        let today = now.date_naive();
        let reviewed_today = records
            .iter()
            .filter(|record| record.last_reviewed.map_or(false, |at| at.date_naive() == today))
            .count();
        let ease_sum: f64 = records.iter().map(|record| record.ease_factor).sum();

        StudyStats {
            total_cards: records.len(),
            due_cards: Self::count_due(records, now),
            reviewed_today,
            average_ease_factor: ease_sum / records.len() as f64,
        }
    }
}
