use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime, Timelike};
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::scheduling::{ranges_overlap, ConsultationType};
use shared_utils::time::day_of_week_index;

use crate::models::{AvailabilityOverride, AvailabilityPattern, ResolvedSlot};
use crate::services::overrides::OverrideStore;
use crate::services::patterns::PatternStore;

/// Combines a doctor's weekly patterns with the overrides for `date` into the
/// list of bookable windows, ordered by (start, end).
///
/// 1. Active patterns for the date's weekday are cut into back-to-back slots
///    of `slot_duration_minutes`; a trailing remainder shorter than one slot
///    is dropped.
/// 2. Generated slots that intersect any unavailable override are removed.
/// 3. Available overrides are added as extra windows.
/// 4. Windows with the same (start, end) are merged: allowed types are
///    unioned and the override id of the extra window is kept.
///
/// Pure: the same inputs always give the same output.
pub fn resolve_slots(
    patterns: &[AvailabilityPattern],
    overrides: &[AvailabilityOverride],
    date: NaiveDate,
    type_filter: Option<ConsultationType>,
) -> Vec<ResolvedSlot> {
    let weekday = day_of_week_index(date);

    let (unavailable, extra): (Vec<&AvailabilityOverride>, Vec<&AvailabilityOverride>) = overrides
        .iter()
        .filter(|o| o.date == date)
        .partition(|o| !o.is_available);

    let mut merged: BTreeMap<(NaiveTime, NaiveTime), ResolvedSlot> = BTreeMap::new();

    for pattern in patterns.iter().filter(|p| p.is_active && p.day_of_week == weekday) {
        for (start, end) in generate_windows(pattern.start_time, pattern.end_time, pattern.slot_duration_minutes) {
            let blocked = unavailable
                .iter()
                .any(|range| ranges_overlap(start, end, range.start_time, range.end_time));
            if blocked {
                continue;
            }
            merge_into(&mut merged, start, end, &pattern.allowed_types, None);
        }
    }

    for window in extra {
        merge_into(
            &mut merged,
            window.start_time,
            window.end_time,
            &window.allowed_types,
            Some(window.id),
        );
    }

    merged
        .into_values()
        .filter(|slot| type_filter.map_or(true, |t| slot.allows(t)))
        .collect()
}

fn merge_into(
    merged: &mut BTreeMap<(NaiveTime, NaiveTime), ResolvedSlot>,
    start: NaiveTime,
    end: NaiveTime,
    allowed_types: &[ConsultationType],
    override_id: Option<i64>,
) {
    let slot = merged.entry((start, end)).or_insert_with(|| ResolvedSlot {
        start_time: start,
        end_time: end,
        allowed_types: Vec::new(),
        override_id: None,
    });

    slot.allowed_types.extend_from_slice(allowed_types);
    slot.allowed_types.sort();
    slot.allowed_types.dedup();

    if override_id.is_some() {
        slot.override_id = override_id;
    }
}

/// Back-to-back `[start, end)` windows of `duration_minutes` inside the range.
///
/// Works in seconds from midnight so a window never wraps past 24:00.
fn generate_windows(start: NaiveTime, end: NaiveTime, duration_minutes: i32) -> Vec<(NaiveTime, NaiveTime)> {
    if duration_minutes <= 0 || start >= end {
        return Vec::new();
    }

    let step = duration_minutes as u32 * 60;
    let end_secs = end.num_seconds_from_midnight();
    let mut cursor = start.num_seconds_from_midnight();
    let mut windows = Vec::new();

    while cursor + step <= end_secs {
        let window_start = NaiveTime::from_num_seconds_from_midnight_opt(cursor, 0);
        let window_end = NaiveTime::from_num_seconds_from_midnight_opt(cursor + step, 0);
        match (window_start, window_end) {
            (Some(s), Some(e)) => windows.push((s, e)),
            _ => break,
        }
        cursor += step;
    }

    windows
}

/// Loads a doctor's patterns and overrides through one connection and runs
/// [`resolve_slots`]. Pass a transaction to read under its snapshot and locks.
pub struct SlotResolverService;

impl SlotResolverService {
    pub async fn resolve(
        conn: &mut PgConnection,
        doctor_id: Uuid,
        date: NaiveDate,
        type_filter: Option<ConsultationType>,
    ) -> Result<Vec<ResolvedSlot>, AppError> {
        let weekday = day_of_week_index(date);
        let patterns = PatternStore::active_for_day(&mut *conn, doctor_id, weekday).await?;
        let overrides = OverrideStore::for_date(&mut *conn, doctor_id, date).await?;

        let slots = resolve_slots(&patterns, &overrides, date, type_filter);
        debug!(
            "Resolved {} slots for doctor {} on {} ({} patterns, {} overrides)",
            slots.len(),
            doctor_id,
            date,
            patterns.len(),
            overrides.len()
        );
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn remainder_shorter_than_a_slot_is_dropped() {
        let windows = generate_windows(t(9, 0), t(10, 10), 30);
        assert_eq!(windows, vec![(t(9, 0), t(9, 30)), (t(9, 30), t(10, 0))]);
    }

    #[test]
    fn windows_never_wrap_past_midnight() {
        let windows = generate_windows(t(23, 0), t(23, 59), 30);
        assert_eq!(windows, vec![(t(23, 0), t(23, 30))]);
    }

    #[test]
    fn degenerate_inputs_generate_nothing() {
        assert!(generate_windows(t(9, 0), t(9, 0), 30).is_empty());
        assert!(generate_windows(t(9, 0), t(12, 0), 0).is_empty());
        assert!(generate_windows(t(9, 0), t(9, 20), 30).is_empty());
    }
}
