use carepoint_shared::{format_instant, parse_instant};
use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, Utc, Weekday};

use crate::doctor::DoctorAvailability;

/// First bookable hour (UTC).
pub const BUSINESS_START_HOUR: u32 = 9;
/// Bookable hours end before this hour (UTC).
pub const BUSINESS_END_HOUR: u32 = 17;

pub const DEFAULT_SLOT_INTERVAL_MINUTES: u32 = 30;
pub const DEFAULT_SLOT_WINDOW_DAYS: u32 = 3;
pub const MAX_DISPLAYED_SLOTS: usize = 20;

/// Candidate slots from today (UTC) for `days_ahead` days.
pub fn generate_slots(days_ahead: u32, interval_minutes: u32) -> Vec<DateTime<Utc>> {
    generate_slots_from(Utc::now().date_naive(), days_ahead, interval_minutes)
}

/// Weekday business-hour slots for `days_ahead` calendar days starting at
/// `today`, at `interval_minutes` offsets within each hour. Slots are anchored
/// to UTC so every client derives the same slot keys.
pub fn generate_slots_from(today: NaiveDate, days_ahead: u32, interval_minutes: u32) -> Vec<DateTime<Utc>> {
    if interval_minutes == 0 {
        tracing::warn!("Slot interval of 0 minutes requested, generating no slots");
        return Vec::new();
    }

    let mut slots = Vec::new();
    for offset in 0..days_ahead {
        let Some(day) = today.checked_add_days(Days::new(u64::from(offset))) else {
            break;
        };
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }

        for hour in BUSINESS_START_HOUR..BUSINESS_END_HOUR {
            for minute in (0..60).step_by(interval_minutes as usize) {
                if let Some(slot) = day.and_hms_opt(hour, minute, 0) {
                    slots.push(slot.and_utc());
                }
            }
        }
    }
    slots
}

/// Filter candidate slot strings to the window `(now, now + window_days]`.
pub fn future_slots<S: AsRef<str>>(candidates: &[S], window_days: u32) -> Vec<DateTime<Utc>> {
    future_slots_at(candidates, window_days, Utc::now())
}

/// Parseable candidates strictly after `now` and no later than
/// `now + window_days`, ascending, without duplicates. Unparseable entries
/// are dropped; an empty input gives an empty result.
pub fn future_slots_at<S: AsRef<str>>(candidates: &[S], window_days: u32, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    within_window(
        candidates.iter().filter_map(|c| parse_instant(c.as_ref())),
        window_days,
        now,
    )
}

fn within_window(
    instants: impl IntoIterator<Item = DateTime<Utc>>,
    window_days: u32,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let limit = now
        .checked_add_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let mut slots: Vec<DateTime<Utc>> = instants
        .into_iter()
        .filter(|slot| *slot > now && *slot <= limit)
        .collect();
    slots.sort();
    slots.dedup();
    slots
}

/// Calendar days of fallback generation that always hold `display_limit`
/// future slots. Every weekday yields at least one slot per business hour,
/// and today may already be over.
fn fallback_days(display_limit: usize) -> u32 {
    let hours = (BUSINESS_END_HOUR - BUSINESS_START_HOUR) as usize;
    let weekdays = display_limit.div_ceil(hours) + 1;
    u32::try_from(weekdays * 7 / 5 + 3).unwrap_or(u32::MAX)
}

/// Booking key of a slot.
pub fn slot_key(slot: &DateTime<Utc>) -> String {
    format_instant(slot)
}

/// Slot display policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPolicy {
    /// How far ahead slots are offered
    pub window_days: u32,

    /// Granularity of generated fallback slots
    pub interval_minutes: u32,

    /// Maximum slots shown per doctor
    pub display_limit: usize,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_SLOT_WINDOW_DAYS,
            interval_minutes: DEFAULT_SLOT_INTERVAL_MINUTES,
            display_limit: MAX_DISPLAYED_SLOTS,
        }
    }
}

/// Produces the bookable slot list shown for each doctor.
#[derive(Debug, Clone, Default)]
pub struct SlotEngine {
    policy: SlotPolicy,
}

impl SlotEngine {
    pub fn new(policy: SlotPolicy) -> Self {
        Self { policy }
    }

    /// The doctor's own future slots, or generated weekday slots when the
    /// doctor has none in the window. Truncated to the display limit.
    pub fn bookable_slots(&self, doctor: &DoctorAvailability, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut slots = future_slots_at(&doctor.avail_slots, self.policy.window_days, now);

        if slots.is_empty() {
            tracing::debug!("Doctor {} has no published slots, using generated fallback", doctor.doctor_id);
            let days = self.policy.window_days.min(fallback_days(self.policy.display_limit));
            let generated = generate_slots_from(now.date_naive(), days, self.policy.interval_minutes);
            slots = within_window(generated, self.policy.window_days, now);
        }

        slots.truncate(self.policy.display_limit);
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use std::collections::BTreeMap;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_future_slots_window() {
        let now = at(2024, 1, 1, 0, 0);
        let input = ["2023-12-31T23:00Z", "2024-01-01T12:00Z", "2024-01-03T00:00Z"];

        assert_eq!(future_slots_at(&input, 1, now), vec![at(2024, 1, 1, 12, 0)]);
    }

    #[test]
    fn test_future_slots_bounds_sorting_and_garbage() {
        let now = at(2024, 1, 1, 0, 0);
        let input = [
            "2024-01-02T00:00:00Z", // exactly now + 1 day: kept
            "2024-01-01T00:00:00Z", // exactly now: dropped
            "not a date",
            "2024-01-01T06:00:00Z",
            "2024-01-01T06:00:00.000Z",
        ];

        let result = future_slots_at(&input, 1, now);
        assert_eq!(result, vec![at(2024, 1, 1, 6, 0), at(2024, 1, 2, 0, 0)]);
        assert!(result.windows(2).all(|w| w[0] < w[1]));

        let empty: [&str; 0] = [];
        assert!(future_slots_at(&empty, 3, now).is_empty());
    }

    #[test]
    fn test_unbounded_window_does_not_overflow() {
        let input = ["2024-01-02T00:00:00Z", "9999-12-31T00:00:00Z"];
        let now = at(2024, 1, 1, 0, 0);
        assert_eq!(future_slots_at(&input, u32::MAX, now).len(), 2);

        let far_future = Utc::now() + Duration::days(365);
        let result = future_slots(&[far_future.to_rfc3339()], u32::MAX);
        assert_eq!(result, vec![far_future]);
        assert!(future_slots(&["2000-01-01T00:00:00Z"], 1).is_empty());
    }

    #[test]
    fn test_generate_week_excludes_weekends() {
        // 2024-01-01 is a Monday.
        let slots = generate_slots_from(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 7, 30);
        assert_eq!(slots.len(), 5 * 16);

        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for slot in &slots {
            assert!(!matches!(slot.weekday(), Weekday::Sat | Weekday::Sun));
            *per_day.entry(slot.date_naive()).or_default() += 1;
        }
        assert!(per_day.values().all(|count| *count == 16));

        assert_eq!(slots.first(), Some(&at(2024, 1, 1, 9, 0)));
        assert_eq!(slots.last(), Some(&at(2024, 1, 5, 16, 30)));
    }

    #[test]
    fn test_generate_from_weekend_start() {
        // Saturday start still spans five weekdays in seven days.
        let slots = generate_slots_from(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(), 7, 30);
        assert_eq!(slots.len(), 80);
        assert!(generate_slots(7, 30).len() == 80);
    }

    #[test]
    fn test_generate_other_intervals() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(generate_slots_from(monday, 1, 60).len(), 8);
        assert_eq!(generate_slots_from(monday, 1, 15).len(), 32);
        assert!(generate_slots_from(monday, 1, 0).is_empty());
        assert!(generate_slots_from(monday, 0, 30).is_empty());

        let slots = generate_slots_from(monday, 1, 45);
        assert!(slots.iter().all(|s| s.minute() == 0 || s.minute() == 45));
    }

    #[test]
    fn test_slot_key_format() {
        assert_eq!(slot_key(&at(2024, 1, 2, 9, 30)), "2024-01-02T09:30:00.000Z");
    }

    #[test]
    fn test_bookable_prefers_doctor_slots() {
        let now = at(2024, 1, 1, 8, 0);
        let doctor = DoctorAvailability {
            doctor_id: "doc-1".to_string(),
            avail_slots: vec!["2024-01-02T10:00:00Z".to_string(), "2023-12-01T10:00:00Z".to_string()],
            ..Default::default()
        };

        let engine = SlotEngine::default();
        assert_eq!(engine.bookable_slots(&doctor, now), vec![at(2024, 1, 2, 10, 0)]);
    }

    #[test]
    fn test_bookable_falls_back_and_truncates() {
        let now = at(2024, 1, 1, 8, 0);
        let doctor = DoctorAvailability {
            doctor_id: "doc-1".to_string(),
            ..Default::default()
        };

        let engine = SlotEngine::default();
        let slots = engine.bookable_slots(&doctor, now);
        assert_eq!(slots.len(), MAX_DISPLAYED_SLOTS);
        assert_eq!(slots[0], at(2024, 1, 1, 9, 0));
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_bookable_with_huge_window_fills_display_limit() {
        // Friday evening: today is over and the weekend follows.
        let now = at(2024, 1, 5, 18, 0);
        let doctor = DoctorAvailability {
            doctor_id: "doc-1".to_string(),
            ..Default::default()
        };

        for interval in [15, 60, 90] {
            let engine = SlotEngine::new(SlotPolicy {
                window_days: u32::MAX,
                interval_minutes: interval,
                display_limit: 50,
            });
            let slots = engine.bookable_slots(&doctor, now);
            assert_eq!(slots.len(), 50, "interval {}", interval);
            assert_eq!(slots[0], at(2024, 1, 8, 9, 0));
        }
    }
}
