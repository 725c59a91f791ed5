//! Evaluation of the OpenStreetMap `opening_hours` tag.
//!
//! Only the common subset is understood: `24/7`, weekday selectors
//! (`Mo`, `Mo-Fr`, `Sa,Su`, wrapping ranges such as `Fr-Mo`), time spans
//! (`09:00-17:00`, `18:00-02:00`, `24:00` as end) and the `off`/`closed`
//! modifiers. Later rules replace earlier ones for the days they name.
//! Anything else (public holidays, months, sunrise, comments) yields
//! [`OpenState::Unknown`].
//!
//! Times are compared against the requester's wall clock, taken from the
//! slot's UTC offset.

use chrono::{Datelike, Timelike};

use crate::domain::{OpenState, SlotWindow};

const DAY: u32 = 24 * 60;
const WEEK: u32 = 7 * DAY;
const WEEKDAYS: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

/// Open spans in minutes since Monday 00:00. Spans may extend past the end
/// of the week when a time range wraps midnight on Sunday.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Schedule {
    days: [Vec<(u32, u32)>; 7],
}

/// Returns whether a venue with the given `opening_hours` value is open for
/// the whole `slot`.
#[must_use]
pub fn evaluate(opening_hours: Option<&str>, slot: &SlotWindow) -> OpenState {
    let Some(raw) = opening_hours.map(str::trim).filter(|s| !s.is_empty()) else {
        return OpenState::Unknown;
    };
    match parse(raw) {
        Some(schedule) if schedule.covers(slot) => OpenState::Open,
        Some(_) => OpenState::Closed,
        None => OpenState::Unknown,
    }
}

fn parse(raw: &str) -> Option<Schedule> {
    if raw == "24/7" {
        return Some(Schedule {
            days: std::array::from_fn(|_| vec![(0, DAY)]),
        });
    }

    let mut schedule = Schedule {
        days: std::array::from_fn(|_| Vec::new()),
    };
    for rule in raw.split(';').map(str::trim).filter(|r| !r.is_empty()) {
        let (days, rest) = match rule.split_once(' ') {
            Some((head, tail)) if starts_with_weekday(head) => (parse_days(head)?, tail.trim()),
            _ if starts_with_weekday(rule) => (parse_days(rule)?, ""),
            _ => ([true; 7], rule),
        };

        let spans = match rest {
            "off" | "closed" => Vec::new(),
            "" | "24/7" => vec![(0, DAY)],
            times => parse_times(times)?,
        };
        for (day, selected) in schedule.days.iter_mut().zip(days) {
            if selected {
                day.clone_from(&spans);
            }
        }
    }
    Some(schedule)
}

fn starts_with_weekday(token: &str) -> bool {
    WEEKDAYS.iter().any(|d| token.starts_with(d))
}

fn weekday_index(token: &str) -> Option<usize> {
    WEEKDAYS.iter().position(|d| *d == token)
}

fn parse_days(selector: &str) -> Option<[bool; 7]> {
    let mut days = [false; 7];
    for part in selector.split(',') {
        match part.split_once('-') {
            Some((from, to)) => {
                let from = weekday_index(from)?;
                let to = weekday_index(to)?;
                let mut day = from;
                loop {
                    *days.get_mut(day)? = true;
                    if day == to {
                        break;
                    }
                    day = (day + 1) % 7;
                }
            }
            None => *days.get_mut(weekday_index(part)?)? = true,
        }
    }
    Some(days)
}

fn parse_times(times: &str) -> Option<Vec<(u32, u32)>> {
    times
        .split(',')
        .map(|span| {
            let (start, end) = span.trim().split_once('-')?;
            let start = parse_clock(start)?;
            let end = parse_clock(end)?;
            if start >= DAY {
                return None;
            }
            // Spans ending at or before their start continue past midnight.
            Some(if end <= start { (start, end + DAY) } else { (start, end) })
        })
        .collect()
}

fn parse_clock(clock: &str) -> Option<u32> {
    let (h, m) = clock.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 24 || m > 59 || (h == 24 && m != 0) {
        return None;
    }
    Some(h * 60 + m)
}

impl Schedule {
    /// Merged open spans on a timeline long enough to test any slot that
    /// starts within the week.
    fn timeline(&self) -> Vec<(u32, u32)> {
        let mut spans: Vec<(u32, u32)> = Vec::new();
        for copy in 0..3 {
            for (offset, day) in (0..).map(|d: u32| d * DAY).zip(&self.days) {
                spans.extend(
                    day.iter()
                        .map(|(s, e)| (copy * WEEK + offset + s, copy * WEEK + offset + e)),
                );
            }
        }
        spans.sort_unstable();

        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        merged
    }

    fn covers(&self, slot: &SlotWindow) -> bool {
        let start = slot.local_start();
        // Anchor in the second week copy so spans wrapping from Sunday apply.
        let from = WEEK
            + start.weekday().num_days_from_monday() * DAY
            + start.hour() * 60
            + start.minute();
        let length = (slot.end - slot.start).num_minutes().max(1);
        let length = u32::try_from(length).unwrap_or(WEEK).min(WEEK);
        let to = from + length;

        self.timeline()
            .iter()
            .any(|&(s, e)| s <= from && to <= e)
    }
}
