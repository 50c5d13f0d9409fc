use chrono::{Datelike, Duration, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::ids::SlotIndex;

/// Global project configuration, per spec §3 "Project" entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub start_epoch_seconds: i64,
    pub end_epoch_seconds: i64,
    /// Slot duration in seconds; default 3600 (one hour).
    pub slot_seconds: i64,
    #[serde(with = "tz_serde")]
    pub timezone: Tz,
    pub currency_precision: u8,
    /// Seed for deterministic `random` allocation policy, per DESIGN NOTES §9.
    pub seed: u64,
}

mod tz_serde {
    use chrono_tz::Tz;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(tz: &Tz, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Tz, D::Error> {
        let name = String::deserialize(d)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl Project {
    pub fn total_slots(&self) -> i64 {
        ((self.end_epoch_seconds - self.start_epoch_seconds) / self.slot_seconds).max(0)
    }

    pub fn slot_to_epoch(&self, slot: SlotIndex) -> i64 {
        self.start_epoch_seconds + slot * self.slot_seconds
    }

    pub fn epoch_to_slot_floor(&self, epoch_seconds: i64) -> SlotIndex {
        (epoch_seconds - self.start_epoch_seconds).div_euclid(self.slot_seconds)
    }

    /// Returns (seconds-since-local-midnight, weekday 0=Mon) for a slot's
    /// wall-clock start, honouring the configured time zone and DST.
    pub fn local_day_position(&self, slot: SlotIndex) -> (i64, u8) {
        let epoch = self.slot_to_epoch(slot);
        let dt = self.timezone.timestamp_opt(epoch, 0).single().unwrap_or_else(|| self.timezone.timestamp_opt(epoch, 0).earliest().unwrap());
        let sec_of_day = dt.num_seconds_from_midnight() as i64;
        let weekday = dt.weekday().num_days_from_monday() as u8;
        (sec_of_day, weekday)
    }

    fn local_datetime(&self, slot: SlotIndex) -> chrono::DateTime<Tz> {
        let epoch = self.slot_to_epoch(slot);
        self.timezone.timestamp_opt(epoch, 0).single().unwrap_or_else(|| self.timezone.timestamp_opt(epoch, 0).earliest().unwrap())
    }

    /// `[start, end)` slot window covering the local calendar day `slot`
    /// falls in, for `maxSlotsPerDay` limit checks.
    pub fn day_window(&self, slot: SlotIndex) -> (SlotIndex, SlotIndex) {
        let dt = self.local_datetime(slot);
        let midnight = dt.date_naive().and_hms_opt(0, 0, 0).unwrap();
        let start_epoch = self.timezone.from_local_datetime(&midnight).single().unwrap_or_else(|| self.timezone.from_local_datetime(&midnight).earliest().unwrap()).timestamp();
        let next_epoch = self
            .timezone
            .from_local_datetime(&(midnight + Duration::days(1)))
            .single()
            .unwrap_or_else(|| self.timezone.from_local_datetime(&(midnight + Duration::days(1))).earliest().unwrap())
            .timestamp();
        (self.epoch_to_slot_floor(start_epoch), self.epoch_to_slot_floor(next_epoch))
    }

    /// `[start, end)` slot window covering the ISO week `slot` falls in,
    /// for `maxSlotsPerWeek` limit checks.
    pub fn week_window(&self, slot: SlotIndex) -> (SlotIndex, SlotIndex) {
        let dt = self.local_datetime(slot);
        let monday = dt.date_naive() - Duration::days(dt.weekday().num_days_from_monday() as i64);
        let midnight = monday.and_hms_opt(0, 0, 0).unwrap();
        let start_epoch = self.timezone.from_local_datetime(&midnight).single().unwrap_or_else(|| self.timezone.from_local_datetime(&midnight).earliest().unwrap()).timestamp();
        let next_epoch = self
            .timezone
            .from_local_datetime(&(midnight + Duration::days(7)))
            .single()
            .unwrap_or_else(|| self.timezone.from_local_datetime(&(midnight + Duration::days(7))).earliest().unwrap())
            .timestamp();
        (self.epoch_to_slot_floor(start_epoch), self.epoch_to_slot_floor(next_epoch))
    }

    /// `[start, end)` slot window covering the calendar month `slot` falls
    /// in, for `maxSlotsPerMonth` limit checks.
    pub fn month_window(&self, slot: SlotIndex) -> (SlotIndex, SlotIndex) {
        let dt = self.local_datetime(slot);
        let first = dt.date_naive().with_day(1).unwrap();
        let (next_year, next_month) = if dt.month() == 12 { (dt.year() + 1, 1) } else { (dt.year(), dt.month() + 1) };
        let next_first = first.with_year(next_year).unwrap().with_month(next_month).unwrap();
        let midnight = first.and_hms_opt(0, 0, 0).unwrap();
        let next_midnight = next_first.and_hms_opt(0, 0, 0).unwrap();
        let start_epoch = self.timezone.from_local_datetime(&midnight).single().unwrap_or_else(|| self.timezone.from_local_datetime(&midnight).earliest().unwrap()).timestamp();
        let next_epoch =
            self.timezone.from_local_datetime(&next_midnight).single().unwrap_or_else(|| self.timezone.from_local_datetime(&next_midnight).earliest().unwrap()).timestamp();
        (self.epoch_to_slot_floor(start_epoch), self.epoch_to_slot_floor(next_epoch))
    }
}
