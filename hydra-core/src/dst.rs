//! Daylight-saving rules for scheduled-event evaluation.
//!
//! No timezone support, just automatic summer-time switching. A rule table
//! holds exactly two entries in calendar order; the latest rule at or before
//! the queried instant decides the season, and instants before the first
//! rule inherit the previous year's closing rule. The winter rule carries a
//! zero offset so disabling DST simply returns standard time.
//!
//! Protocol timing never goes through here; this feeds only the wall-clock
//! pause/unpause schedule.

const SECS_PER_DAY: i64 = 86_400;
const SECS_PER_HOUR: i64 = 3_600;

/// Which weekday-of-month a rule names.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Week {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

/// Season a rule switches into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Season {
    Summer,
    Winter,
}

/// One daylight-saving transition rule.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DstRule {
    pub to: Season,
    pub week: Week,
    /// Day of week, 0 = Sunday.
    pub dow: u8,
    /// Month, 1 = January.
    pub month: u8,
    /// Local standard hour of the transition.
    pub hour: u8,
}

/// United States: second Sunday of March 02:00 → first Sunday of November 02:00.
pub const US_DST_RULES: [DstRule; 2] = [
    DstRule {
        to: Season::Summer,
        week: Week::Second,
        dow: 0,
        month: 3,
        hour: 2,
    },
    DstRule {
        to: Season::Winter,
        week: Week::First,
        dow: 0,
        month: 11,
        hour: 2,
    },
];

/// Europe: last Sunday of March 01:00 → last Sunday of October 01:00.
pub const EU_DST_RULES: [DstRule; 2] = [
    DstRule {
        to: Season::Summer,
        week: Week::Last,
        dow: 0,
        month: 3,
        hour: 1,
    },
    DstRule {
        to: Season::Winter,
        week: Week::Last,
        dow: 0,
        month: 10,
        hour: 1,
    },
];

/// Australia: note the reversal due to the southern hemisphere.
pub const AU_DST_RULES: [DstRule; 2] = [
    DstRule {
        to: Season::Winter,
        week: Week::First,
        dow: 0,
        month: 4,
        hour: 2,
    },
    DstRule {
        to: Season::Summer,
        week: Week::First,
        dow: 0,
        month: 10,
        hour: 2,
    },
];

impl DstRule {
    /// Transition timestamp within the calendar year containing `t`.
    fn boundary(&self, t: i64) -> i64 {
        let (year, _, _) = civil_from_days(t.div_euclid(SECS_PER_DAY));

        let day = match self.week {
            Week::Last => {
                let (next_y, next_m) = if self.month == 12 {
                    (year + 1, 1)
                } else {
                    (year, self.month + 1)
                };
                let last = days_from_civil(next_y, next_m, 1) - 1;
                last - i64::from((weekday(last) + 7 - self.dow) % 7)
            }
            nth => {
                let first = days_from_civil(year, self.month, 1);
                let offset = i64::from((self.dow + 7 - weekday(first)) % 7);
                let week_index = match nth {
                    Week::First => 0,
                    Week::Second => 1,
                    Week::Third => 2,
                    Week::Fourth => 3,
                    Week::Last => unreachable!(),
                };
                first + offset + 7 * week_index
            }
        };

        day * SECS_PER_DAY + i64::from(self.hour) * SECS_PER_HOUR
    }
}

/// Whether local standard time `t` falls in summer time under `rules`.
pub fn is_summer(rules: &[DstRule; 2], t: i64) -> bool {
    // Latest rule at or before t wins; before the first rule of the year we
    // are still under the previous year's closing rule.
    for rule in rules.iter().rev() {
        if rule.boundary(t) <= t {
            return matches!(rule.to, Season::Summer);
        }
    }
    matches!(rules[1].to, Season::Summer)
}

/// Applies the summer offset to a standard-time instant.
pub fn to_dst(rules: &[DstRule; 2], t: i64) -> i64 {
    if is_summer(rules, t) {
        t + SECS_PER_HOUR
    } else {
        t
    }
}

/// Splits a local timestamp into (hour, minute, day-of-week with 0=Sunday)
/// for schedule matching.
pub fn clock_fields(t: i64) -> (u8, u8, u8) {
    let days = t.div_euclid(SECS_PER_DAY);
    let secs = t.rem_euclid(SECS_PER_DAY);
    (
        (secs / SECS_PER_HOUR) as u8,
        ((secs % SECS_PER_HOUR) / 60) as u8,
        weekday(days),
    )
}

/// Day of week for a day count since the epoch, 0 = Sunday.
fn weekday(days: i64) -> u8 {
    // 1970-01-01 was a Thursday.
    ((days + 4).rem_euclid(7)) as u8
}

// Gregorian conversions after Howard Hinnant's civil-days algorithms.

fn civil_from_days(z: i64) -> (i64, u8, u8) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = i64::from(if month > 2 { month - 3 } else { month + 9 });
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
