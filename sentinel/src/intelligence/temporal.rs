//! Time-window detection for memory questions and evidence selection.

use std::sync::OnceLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::models::{StoredFact, TimeWindow};

fn clock_time() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})(?::(\d{2}))?\s*(am|pm)").expect("static regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayPart {
    Morning,
    Afternoon,
    Evening,
}

impl DayPart {
    fn detect(text: &str) -> Option<Self> {
        if text.contains("morning") {
            Some(Self::Morning)
        } else if text.contains("afternoon") {
            Some(Self::Afternoon)
        } else if text.contains("evening") || text.contains("night") {
            Some(Self::Evening)
        } else {
            None
        }
    }

    fn window(self, date: NaiveDate) -> TimeWindow {
        let (start, end) = match self {
            Self::Morning => (at(date, 5, 0), at(date, 12, 0)),
            Self::Afternoon => (at(date, 12, 0), at(date, 18, 0)),
            Self::Evening => (at(date, 18, 0), end_of_day(date)),
        };
        TimeWindow::new(start, end)
    }
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN))
}

/// Parse `H[:MM] am|pm` into 24-hour `(hour, minute)`, clamped to valid values.
fn explicit_clock(text: &str) -> Option<(u32, u32)> {
    let captures = clock_time().captures(text)?;
    let mut hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute = captures
        .get(2)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0)
        .min(59);

    match captures.get(3).map(|m| m.as_str()) {
        Some("pm") if hour != 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }

    Some((hour.min(23), minute))
}

/// Turn a temporal cue in `question` into a concrete window relative to `now`.
///
/// Recognized cues: "today"/"yesterday", an explicit clock time (a two-hour
/// window around it, clamped to the day), and the day parts morning,
/// afternoon, evening and night. A bare day word selects the whole day.
/// Returns `None` when the question carries no temporal cue.
pub fn detect_time_window(question: &str, now: NaiveDateTime) -> Option<TimeWindow> {
    let text = question.to_lowercase().replace('.', ":");

    let mut base_date = if text.contains("yesterday") {
        now.date().pred_opt()
    } else if text.contains("today") {
        Some(now.date())
    } else {
        None
    };

    let clock = explicit_clock(&text);
    let day_part = DayPart::detect(&text);

    if base_date.is_none() && (clock.is_some() || day_part.is_some()) {
        base_date = Some(now.date());
    }
    let date = base_date?;

    if let Some((hour, minute)) = clock {
        let center = at(date, hour, minute);
        let start = (center - Duration::hours(1)).max(at(date, 0, 0));
        let end = (center + Duration::hours(1)).min(end_of_day(date));
        return Some(TimeWindow::new(start, end));
    }

    if let Some(part) = day_part {
        return Some(part.window(date));
    }

    Some(TimeWindow::new(at(date, 0, 0), end_of_day(date)))
}

/// Prepare the evidence log for a question.
///
/// Facts inside `window` are preferred; when none fall inside it, all facts
/// are used. The result is ordered oldest first and keeps only the
/// `max_records` most recent entries.
pub fn select_evidence(
    facts: Vec<StoredFact>,
    window: Option<&TimeWindow>,
    max_records: usize,
) -> Vec<StoredFact> {
    let mut selected = match window {
        Some(window) => {
            let inside: Vec<StoredFact> = facts
                .iter()
                .filter(|fact| fact.local_time().is_some_and(|t| window.contains(t)))
                .cloned()
                .collect();
            if inside.is_empty() {
                tracing::debug!("No facts inside the time window, using all facts");
                facts
            } else {
                inside
            }
        }
        None => facts,
    };

    selected.sort_by(|a, b| {
        a.local_time()
            .cmp(&b.local_time())
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    if selected.len() > max_records {
        selected.drain(..selected.len() - max_records);
    }
    selected
}
