// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Best-effort price extraction from card text. The raw string is always
//! preserved; numeric bounds and a currency are derived where the text
//! allows. Parsing never fails an item.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::value_objects::PriceInfo;

/// "€ 12,50", "EUR 15", "12.50 euro", "$20", "15 - 20 EUR".
static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(€|eur(?:o)?|\$|usd|£|gbp)?\s*(\d{1,4}(?:[.,]\d{2})?)\s*(?:[--]\s*(\d{1,4}(?:[.,]\d{2})?))?\s*(€|eur(?:o)?|\$|usd|£|gbp)?",
    )
    .expect("static regex")
});

static FREE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(gratis|free|vrije? (?:entree|toegang)|kostenlos|eintritt frei)\b").expect("static regex"));

fn currency_code(symbol: &str) -> Option<&'static str> {
    match symbol.to_lowercase().as_str() {
        "€" | "eur" | "euro" => Some("EUR"),
        "$" | "usd" => Some("USD"),
        "£" | "gbp" => Some("GBP"),
        _ => None,
    }
}

fn parse_amount(s: &str) -> Option<f64> {
    s.replace(',', ".").parse().ok()
}

/// Extracts price info from free text. Returns an empty `PriceInfo` when
/// nothing price-shaped is present.
pub fn extract_price(text: &str) -> PriceInfo {
    if FREE_RE.is_match(text) {
        return PriceInfo {
            raw: Some(first_free_phrase(text)),
            min: Some(0.0),
            max: Some(0.0),
            currency: None,
        };
    }

    for caps in PRICE_RE.captures_iter(text) {
        let lead = caps.get(1).map(|m| m.as_str());
        let trail = caps.get(4).map(|m| m.as_str());
        // A bare number with no currency marker on either side is more
        // likely a time, a date, or a house number.
        let Some(symbol) = lead.or(trail) else {
            continue;
        };
        let Some(min) = caps.get(2).and_then(|m| parse_amount(m.as_str())) else {
            continue;
        };
        let max = caps.get(3).and_then(|m| parse_amount(m.as_str())).unwrap_or(min);
        return PriceInfo {
            raw: Some(caps.get(0).map(|m| m.as_str().trim().to_string()).unwrap_or_default()),
            min: Some(min.min(max)),
            max: Some(min.max(max)),
            currency: currency_code(symbol).map(String::from),
        };
    }

    PriceInfo::default()
}

fn first_free_phrase(text: &str) -> String {
    FREE_RE
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "gratis".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euro_comma_decimal() {
        let price = extract_price("Entree € 12,50 aan de deur");
        assert_eq!(price.min, Some(12.5));
        assert_eq!(price.max, Some(12.5));
        assert_eq!(price.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_range() {
        let price = extract_price("Tickets 15 - 20 EUR");
        assert_eq!(price.min, Some(15.0));
        assert_eq!(price.max, Some(20.0));
        assert_eq!(price.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_free_keywords() {
        let price = extract_price("Toegang gratis, aanmelden verplicht");
        assert!(price.is_free());
        assert_eq!(price.min, Some(0.0));
    }

    #[test]
    fn test_bare_numbers_ignored() {
        let price = extract_price("Zaal open om 20:00, rij 12");
        assert!(price.is_empty());
    }

    #[test]
    fn test_no_price_text() {
        assert!(extract_price("Een avond vol verhalen").is_empty());
    }
}
