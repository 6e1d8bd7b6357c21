//! Conversion of provider-local wall-clock time to UTC.
//!
//! Providers publish naive local timestamps. Around the autumn transition one
//! local hour occurs twice, in spring one local hour does not exist. Each
//! reader picks an [`Ambiguity`] policy matching the provider's convention.

use chrono::offset::LocalResult;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::error::ReadError;

/// How a repeated autumn wall-clock time is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ambiguity {
    /// First occurrence is daylight time, the second is standard time.
    Infer,
    /// Always daylight (summer) time.
    Daylight,
    /// Always standard (winter) time.
    Standard,
}

/// Kind of a DST transition in a local calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Clocks jump forward; the hour does not exist.
    Spring,
    /// Clocks fall back; the hour occurs twice.
    Autumn,
}

/// Converts local timestamps to UTC, one output per input, in input order.
///
/// Under [`Ambiguity::Infer`] occurrences of the same ambiguous local time
/// are counted in order; a lone occurrence is treated as daylight time.
pub fn localize(
    tz: Tz,
    stamps: &[NaiveDateTime],
    ambiguity: Ambiguity,
) -> Result<Vec<DateTime<Utc>>, ReadError> {
    let mut seen: HashMap<NaiveDateTime, usize> = HashMap::new();
    stamps
        .iter()
        .map(|local| match tz.from_local_datetime(local) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(daylight, standard) => {
                let pick_standard = match ambiguity {
                    Ambiguity::Daylight => false,
                    Ambiguity::Standard => true,
                    Ambiguity::Infer => {
                        let count = seen.entry(*local).or_default();
                        *count += 1;
                        match *count {
                            1 => false,
                            2 => true,
                            _ => return Err(ReadError::Ambiguous { local: *local, tz }),
                        }
                    }
                };
                let dt = if pick_standard { standard } else { daylight };
                Ok(dt.with_timezone(&Utc))
            }
            LocalResult::None => Err(ReadError::Nonexistent { local: *local, tz }),
        })
        .collect()
}

/// Converts a single local timestamp with a forced policy; `Infer` resolves
/// to daylight time.
pub fn localize_one(
    tz: Tz,
    local: NaiveDateTime,
    ambiguity: Ambiguity,
) -> Result<DateTime<Utc>, ReadError> {
    localize(tz, &[local], ambiguity)?
        .pop()
        .ok_or(ReadError::Nonexistent { local, tz })
}

/// Local wall-clock starts of the transition hours of `tz` in `year`.
///
/// Generated from the tz database by probing every day at 02:00, the hour
/// at which all European zones handled here switch.
pub fn transitions(tz: Tz, year: i32) -> Vec<(NaiveDateTime, Transition)> {
    let Some(mut day) = NaiveDate::from_ymd_opt(year, 1, 1) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    while day.year() == year {
        if let Some(probe) = day.and_hms_opt(2, 0, 0) {
            match tz.from_local_datetime(&probe) {
                LocalResult::None => out.push((probe, Transition::Spring)),
                LocalResult::Ambiguous(..) => out.push((probe, Transition::Autumn)),
                LocalResult::Single(_) => {}
            }
        }
        let Some(next) = day.succ_opt() else { break };
        day = next;
    }
    out
}

/// Spring transition hours of `tz` for every year in `years`.
pub fn spring_transitions(tz: Tz, years: impl IntoIterator<Item = i32>) -> BTreeSet<NaiveDateTime> {
    years
        .into_iter()
        .flat_map(|year| transitions(tz, year))
        .filter(|(_, kind)| *kind == Transition::Spring)
        .map(|(local, _)| local)
        .collect()
}

/// All transition hours (spring and autumn) of `tz` for every year in `years`.
pub fn all_transitions(tz: Tz, years: impl IntoIterator<Item = i32>) -> BTreeSet<NaiveDateTime> {
    let set: BTreeSet<_> = years
        .into_iter()
        .flat_map(|year| transitions(tz, year))
        .map(|(local, _)| local)
        .collect();
    debug!(tz = %tz, count = set.len(), "transition hours generated");
    set
}

/// Distinct calendar years covered by `stamps`.
pub fn years_of<'a>(stamps: impl IntoIterator<Item = &'a NaiveDateTime>) -> BTreeSet<i32> {
    stamps.into_iter().map(|s| s.year()).collect()
}
