use serde::{Deserialize, Serialize};

use crate::ids::SlotIndex;

/// One working-hour range within a day, in seconds since local midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DayRange {
    pub start_seconds: i64,
    pub end_seconds: i64,
}

/// A weekly template: for each of the seven weekdays (0 = Monday), the
/// working-hour ranges for that day. An empty vec means non-working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyTemplate {
    pub days: [Vec<DayRange>; 7],
}

impl WeeklyTemplate {
    pub fn always_working() -> Self {
        WeeklyTemplate {
            days: std::array::from_fn(|_| vec![DayRange { start_seconds: 0, end_seconds: 86_400 }]),
        }
    }
}

/// Absolute holiday or exception interval, in slot units, inclusive-start/exclusive-end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AbsoluteInterval {
    pub start: SlotIndex,
    pub end: SlotIndex,
}

/// A calendar (or a shift, which is structurally identical and just scoped
/// to a sub-interval by its owner). Composes a weekly template with
/// absolute holiday/exception intervals and an optional productivity
/// multiplier applied to efficiency when the calendar is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub name: String,
    pub template: WeeklyTemplate,
    pub holidays: Vec<AbsoluteInterval>,
    pub productivity: f64,
}

impl Default for Calendar {
    fn default() -> Self {
        Calendar { name: "default".to_string(), template: WeeklyTemplate::always_working(), holidays: Vec::new(), productivity: 1.0 }
    }
}

/// A lazily-built bitmap over `[project.start, project.end)` in slot units,
/// giving O(1) `working?` point queries and O(slots/64) range-popcount
/// queries, per the time grid's design.
#[derive(Debug, Clone)]
pub struct CalendarBitmap {
    words: Vec<u64>,
    len_slots: i64,
}

impl CalendarBitmap {
    /// Builds the bitmap for `calendar` over `[0, len_slots)`, where slot
    /// `i`'s wall-clock start is `epoch_seconds_for_slot(i)`.
    pub fn build<F>(calendar: &Calendar, len_slots: i64, epoch_seconds_for_slot: F) -> Self
    where
        F: Fn(i64) -> (i64, u8), // (seconds-since-local-midnight, weekday 0=Mon)
    {
        let word_count = ((len_slots + 63) / 64).max(0) as usize;
        let mut words = vec![0u64; word_count];

        for slot in 0..len_slots {
            let (sec_of_day, weekday) = epoch_seconds_for_slot(slot);
            let working = calendar.template.days[weekday as usize]
                .iter()
                .any(|r| sec_of_day >= r.start_seconds && sec_of_day < r.end_seconds)
                && !calendar.holidays.iter().any(|h| slot >= h.start && slot < h.end);

            if working {
                let word = (slot / 64) as usize;
                let bit = (slot % 64) as u32;
                words[word] |= 1u64 << bit;
            }
        }

        CalendarBitmap { words, len_slots }
    }

    pub fn working(&self, slot: SlotIndex) -> bool {
        if slot < 0 || slot >= self.len_slots {
            return false;
        }
        let word = (slot / 64) as usize;
        let bit = (slot % 64) as u32;
        self.words.get(word).map(|w| (w >> bit) & 1 == 1).unwrap_or(false)
    }

    /// Count of working slots in `[start, end)`, via word-level popcount.
    pub fn count_working(&self, start: SlotIndex, end: SlotIndex) -> i64 {
        let start = start.max(0);
        let end = end.min(self.len_slots);
        if start >= end {
            return 0;
        }

        let first_word = (start / 64) as usize;
        let last_word = ((end - 1) / 64) as usize;
        let mut total = 0u32;

        for word_idx in first_word..=last_word {
            let mut mask = u64::MAX;
            if word_idx == first_word {
                mask &= !0u64 << (start % 64);
            }
            if word_idx == last_word {
                let bits_in_last = ((end - 1) % 64) + 1;
                if bits_in_last < 64 {
                    mask &= (1u64 << bits_in_last) - 1;
                }
            }
            total += (self.words.get(word_idx).copied().unwrap_or(0) & mask).count_ones();
        }

        total as i64
    }
}
