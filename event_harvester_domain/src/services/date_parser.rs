// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Date Parser
//!
//! Turns the wildly varied date text found on Dutch, English, and German
//! event pages into a canonical `NaiveDate`. Recognized forms:
//!
//! - ISO / RFC 3339: `2026-04-12`, `2026-04-12T20:00:00+02:00`
//! - European numeric: `12/4/2026`, `12-04-2026`, `12.4.26`
//! - Textual months, full or 3-letter, in nl/en/de: `12 april 2026`,
//!   `April 12, 2026`, `12. März 2026`, `12 mrt`
//! - Weekday-prefixed: `za 12 april`, `Saturday, April 12`
//! - Relative keywords: `vandaag`, `morgen`, `overmorgen`, `today`,
//!   `tomorrow`, `übermorgen`
//!
//! Dates with no explicit year resolve to the nearest occurrence on or
//! after `today`. Every candidate is validated against the calendar
//! ("31 februari" parses to nothing) and against the configured year
//! window; anything outside returns `None`.

use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Parser with a bounded year-acceptance window.
#[derive(Debug, Clone)]
pub struct DateParser {
    min_year: i32,
    max_year: i32,
}

static ISO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").expect("static regex"));

static EUROPEAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[./-](\d{1,2})[./-](\d{2,4})\b").expect("static regex"));

// "12 april 2026", "12. März 2026", "12 apr"
static DAY_MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\.?\s+([a-zäöüé]+)\.?(?:\s+(\d{4}))?").expect("static regex"));

// "april 12, 2026", "April 12"
static MONTH_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-zäöüé]+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?").expect("static regex"));

/// Month-name table for nl/en/de, full names and 3-letter abbreviations.
fn month_number(name: &str) -> Option<u32> {
    let name = name.trim_end_matches('.');
    Some(match name {
        "januari" | "january" | "januar" | "jan" => 1,
        "februari" | "february" | "februar" | "feb" => 2,
        "maart" | "march" | "märz" | "maerz" | "mrt" | "mar" | "mär" => 3,
        "april" | "apr" => 4,
        "mei" | "may" | "mai" => 5,
        "juni" | "june" | "jun" => 6,
        "juli" | "july" | "jul" => 7,
        "augustus" | "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "oktober" | "october" | "okt" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dezember" | "dec" | "dez" => 12,
        _ => return None,
    })
}

/// Weekday words stripped before parsing; their information is redundant.
const WEEKDAY_WORDS: &[&str] = &[
    // Dutch full + short
    "maandag", "dinsdag", "woensdag", "donderdag", "vrijdag", "zaterdag", "zondag",
    "ma", "di", "wo", "do", "vr", "za", "zo",
    // English full + short
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    "mon", "tue", "wed", "thu", "fri", "sat", "sun",
    // German full + short (short forms shared with Dutch are above)
    "montag", "dienstag", "mittwoch", "donnerstag", "freitag", "samstag", "sonntag",
    "mi", "fr", "sa", "so",
];

impl DateParser {
    /// Parser accepting only years in `[min_year, max_year]`.
    pub fn new(min_year: i32, max_year: i32) -> Self {
        Self { min_year, max_year }
    }

    /// Default window: the current year and the next.
    pub fn for_today(today: NaiveDate) -> Self {
        Self::new(today.year(), today.year() + 1)
    }

    /// Parses raw date text to a canonical date, or `None` if nothing in the
    /// text is a calendar-valid date inside the year window.
    pub fn parse(&self, raw: &str, today: NaiveDate) -> Option<NaiveDate> {
        let text = normalize(raw);
        if text.is_empty() {
            return None;
        }

        if let Some(date) = self.parse_relative(&text, today) {
            return self.in_window(date);
        }
        if let Some(date) = self.parse_iso(&text) {
            return self.in_window(date);
        }
        if let Some(date) = self.parse_european(&text) {
            return self.in_window(date);
        }
        if let Some(date) = self.parse_textual(&text, today) {
            return self.in_window(date);
        }
        None
    }

    fn parse_relative(&self, text: &str, today: NaiveDate) -> Option<NaiveDate> {
        // Longest keywords first: "overmorgen" contains "morgen".
        if text.contains("overmorgen") || text.contains("übermorgen") || text.contains("day after tomorrow") {
            return Some(today + Duration::days(2));
        }
        if text.contains("vandaag") || text.contains("today") || text.contains("heute") {
            return Some(today);
        }
        if text.contains("morgen") || text.contains("tomorrow") {
            return Some(today + Duration::days(1));
        }
        None
    }

    fn parse_iso(&self, text: &str) -> Option<NaiveDate> {
        let caps = ISO_RE.captures(text)?;
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    fn parse_european(&self, text: &str) -> Option<NaiveDate> {
        let caps = EUROPEAN_RE.captures(text)?;
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if year < 100 {
            year += 2000;
        }
        NaiveDate::from_ymd_opt(year, month, day)
    }

    fn parse_textual(&self, text: &str, today: NaiveDate) -> Option<NaiveDate> {
        // Day-first wins for nl/de; fall back to month-first for English.
        for caps in DAY_MONTH_RE.captures_iter(text) {
            let day: u32 = match caps[1].parse() {
                Ok(d) => d,
                Err(_) => continue,
            };
            let Some(month) = month_number(&caps[2]) else {
                continue;
            };
            let year = caps.get(3).and_then(|y| y.as_str().parse().ok());
            if let Some(date) = self.resolve_ymd(year, month, day, today) {
                return Some(date);
            }
        }
        for caps in MONTH_DAY_RE.captures_iter(text) {
            let Some(month) = month_number(&caps[1]) else {
                continue;
            };
            let day: u32 = match caps[2].parse() {
                Ok(d) => d,
                Err(_) => continue,
            };
            let year = caps.get(3).and_then(|y| y.as_str().parse().ok());
            if let Some(date) = self.resolve_ymd(year, month, day, today) {
                return Some(date);
            }
        }
        None
    }

    /// Resolves an optional year: explicit years stand as-is; a yearless
    /// date takes its nearest occurrence on or after today.
    fn resolve_ymd(&self, year: Option<i32>, month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
        if let Some(year) = year {
            return NaiveDate::from_ymd_opt(year, month, day);
        }
        let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
        if this_year >= today {
            Some(this_year)
        } else {
            NaiveDate::from_ymd_opt(today.year() + 1, month, day)
        }
    }

    fn in_window(&self, date: NaiveDate) -> Option<NaiveDate> {
        if (self.min_year..=self.max_year).contains(&date.year()) {
            Some(date)
        } else {
            None
        }
    }
}

/// Lowercases, strips weekday words and filler punctuation, collapses
/// whitespace.
fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut words: Vec<&str> = Vec::new();
    for word in lowered.split_whitespace() {
        let bare = word.trim_matches(|c: char| c == ',' || c == ';');
        if WEEKDAY_WORDS.contains(&bare) {
            continue;
        }
        words.push(word);
    }
    words.join(" ")
}
