//! Step count selection.
//!
//! Each run submits a random value from a range. By default the range grows
//! over the day (Beijing time) so scheduled runs report plausible totals.

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Timelike, Utc};
use rand::Rng;

/// UTC+8
const BEIJING_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRange {
    pub min: u32,
    pub max: u32,
}

impl StepRange {
    /// Build a range, swapping the bounds if given in reverse
    pub fn new(min: u32, max: u32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Range for the wall-clock time of `now`
    pub fn for_time<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        match (now.hour(), now.minute()) {
            (9, _) => Self::new(1_000, 10_000),
            (15, _) => Self::new(15_000, 25_000),
            (19, m) if m >= 30 => Self::new(30_000, 40_000),
            _ => Self::new(1_000, 10_000),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min..=self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepPolicy {
    /// Range depends on the Beijing time of day
    #[default]
    TimeOfDay,
    Fixed(StepRange),
}

impl StepPolicy {
    pub fn range_at(&self, now: DateTime<Utc>) -> StepRange {
        match self {
            StepPolicy::TimeOfDay => StepRange::for_time(&now.with_timezone(&beijing())),
            StepPolicy::Fixed(range) => *range,
        }
    }

    pub fn current_range(&self) -> StepRange {
        self.range_at(Utc::now())
    }
}

pub fn beijing() -> FixedOffset {
    FixedOffset::east_opt(BEIJING_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in Beijing
pub fn beijing_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&beijing())
}
