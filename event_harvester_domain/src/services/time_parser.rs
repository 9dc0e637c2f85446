// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Time Extraction
//!
//! Regex ladder over card HTML and description text for a start time.
//! Recognized cues, most specific first: `aanvang`, `vanaf`, `doors open`,
//! `starts at`, `om`, then bare clock forms with `uur`/`uhr` suffixes, am/pm
//! forms, and ranges (the start is taken). Output is 24-hour `HH:MM`;
//! anything unparseable or out of range (24:00 included) yields `None`, and
//! the normalizer stores `TBD`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Cue-prefixed times: "aanvang 20:00", "vanaf 20.30", "om 20:00",
/// "doors open 7:30 pm", "starts at 19h30".
static CUED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:aanvang|vanaf|doors?\s+open(?:\s+at)?|starts?\s+at|beginn|om|um|ab)\s*:?\s*(\d{1,2})(?:[:.h](\d{2}))?\s*(am|pm)?",
    )
    .expect("static regex")
});

/// Suffixed times: "20.00 uur", "20:00 Uhr", "8 pm".
static SUFFIXED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:[:.h](\d{2}))?\s*(uur|uhr|am|pm)\b").expect("static regex")
});

/// Bare clock forms, range-aware: "20:00", "20.30 - 23.00".
static BARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[:.](\d{2})\b").expect("static regex"));

/// Extracts a start time as `HH:MM` from free text, or `None`.
pub fn extract_time(text: &str) -> Option<String> {
    for caps in CUED_RE.captures_iter(text) {
        if let Some(time) = assemble(&caps, 1, 2, 3) {
            return Some(time);
        }
    }
    // Bare clock forms come before suffix forms so that a range start wins
    // over a suffixed range end ("van 14.00 tot 17.00 uur" reads 14:00).
    // Matches in currency context ("€ 12,50") are skipped.
    for caps in BARE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if in_currency_context(text, whole.start()) {
            continue;
        }
        if let Some(time) = assemble_parts(&caps[1], Some(&caps[2]), None) {
            return Some(time);
        }
    }
    // Hour-only suffix forms and meridiem forms: "20 uur", "8 pm".
    for caps in SUFFIXED_RE.captures_iter(text) {
        let suffix = caps.get(3).map(|m| m.as_str().to_lowercase());
        let meridiem = match suffix.as_deref() {
            Some("am") => Some("am"),
            Some("pm") => Some("pm"),
            _ => None,
        };
        if let Some(time) = assemble_parts(&caps[1], caps.get(2).map(|m| m.as_str()), meridiem) {
            return Some(time);
        }
    }
    None
}

/// True when a clock-shaped match sits next to a currency marker.
fn in_currency_context(text: &str, match_start: usize) -> bool {
    let prefix_start = match_start.saturating_sub(8);
    let mut prefix_end = match_start;
    while prefix_end > prefix_start && !text.is_char_boundary(prefix_end) {
        prefix_end -= 1;
    }
    let mut lead = prefix_start;
    while lead < prefix_end && !text.is_char_boundary(lead) {
        lead += 1;
    }
    let prefix = text[lead..prefix_end].to_lowercase();
    prefix.contains('€') || prefix.contains('$') || prefix.contains("eur") || prefix.contains('£')
}

fn assemble(caps: &regex::Captures<'_>, hour_idx: usize, minute_idx: usize, meridiem_idx: usize) -> Option<String> {
    let meridiem = caps
        .get(meridiem_idx)
        .map(|m| m.as_str().to_lowercase());
    assemble_parts(
        caps.get(hour_idx)?.as_str(),
        caps.get(minute_idx).map(|m| m.as_str()),
        meridiem.as_deref(),
    )
}

fn assemble_parts(hour: &str, minute: Option<&str>, meridiem: Option<&str>) -> Option<String> {
    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.unwrap_or("00").parse().ok()?;

    match meridiem {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        Some("am") | Some("pm") if hour > 12 => return None,
        _ => {}
    }

    // 24:00 is not a start time.
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{:02}:{:02}", hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dutch_cues() {
        assert_eq!(extract_time("Aanvang 20:00"), Some("20:00".into()));
        assert_eq!(extract_time("aanvang: 20.30"), Some("20:30".into()));
        assert_eq!(extract_time("vanaf 19:00 welkom"), Some("19:00".into()));
        assert_eq!(extract_time("Het concert begint om 21:15."), Some("21:15".into()));
    }

    #[test]
    fn test_suffix_forms() {
        assert_eq!(extract_time("20.00 uur"), Some("20:00".into()));
        assert_eq!(extract_time("Einlass 19:30 Uhr"), Some("19:30".into()));
    }

    #[test]
    fn test_english_cues_and_meridiem() {
        assert_eq!(extract_time("Doors open 7:30 pm"), Some("19:30".into()));
        assert_eq!(extract_time("starts at 8 pm"), Some("20:00".into()));
        assert_eq!(extract_time("doors open at 12 am"), Some("00:00".into()));
    }

    #[test]
    fn test_range_takes_start() {
        assert_eq!(extract_time("20:00 - 23:00"), Some("20:00".into()));
        assert_eq!(extract_time("van 14.00 tot 17.00 uur"), Some("14:00".into()));
    }

    #[test]
    fn test_invalid_times_rejected() {
        assert_eq!(extract_time("24:00"), None);
        assert_eq!(extract_time("aanvang 25:00"), None);
        assert_eq!(extract_time("om 20:71"), None);
        assert_eq!(extract_time("geen tijd bekend"), None);
    }

    #[test]
    fn test_hour_only_cue() {
        assert_eq!(extract_time("aanvang 20 uur"), Some("20:00".into()));
        assert_eq!(extract_time("om 9"), Some("09:00".into()));
    }

    #[test]
    fn test_price_context_not_mistaken_for_time() {
        assert_eq!(extract_time("Entree € 12.50"), None);
        assert_eq!(extract_time("Tickets EUR 12.50, aanvang 20:00"), Some("20:00".into()));
    }
}
