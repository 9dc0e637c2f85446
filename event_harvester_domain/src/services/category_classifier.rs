// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Keyword Category Classifier
//!
//! Maps free text (title + description + source hint) onto the closed
//! category key set. An exact hint match wins outright; otherwise keywords
//! vote and the best-scoring category is taken. Ambiguity - no votes or a
//! tie across categories - resolves to `Community`, the mandated default.

use crate::value_objects::Category;

/// Keyword table; Dutch, English, and German event vocabulary.
const KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Music,
        &[
            "concert", "muziek", "live music", "livemuziek", "band", "optreden", "orkest",
            "symfonie", "koor", "jazz", "hiphop", "singer-songwriter", "album", "gig",
            "konzert", "musik", "dj set",
        ],
    ),
    (
        Category::Nightlife,
        &[
            "club", "clubnacht", "nightlife", "party", "feest", "rave", "afterparty",
            "dansnacht", "uitgaan", "techno night", "nacht",
        ],
    ),
    (
        Category::Culture,
        &[
            "museum", "expositie", "tentoonstelling", "galerie", "theater", "toneel",
            "film", "cinema", "opera", "ballet", "dans", "poëzie", "lezing", "boekpresentatie",
            "exhibition", "ausstellung", "kunst", "erfgoed", "monument",
        ],
    ),
    (
        Category::Food,
        &[
            "food", "eten", "proeverij", "wijnproeverij", "tasting", "diner", "brunch",
            "foodtruck", "markt culinair", "culinair", "streetfood", "borrelhap", "kookworkshop",
        ],
    ),
    (
        Category::Active,
        &[
            "sport", "hardlopen", "run", "marathon", "wandeling", "wandeltocht", "fietstocht",
            "yoga", "bootcamp", "zwemmen", "toernooi", "training", "klimmen", "schaatsen",
        ],
    ),
    (
        Category::Family,
        &[
            "kinderen", "kids", "familie", "family", "gezin", "jeugd", "poppenkast",
            "speurtocht", "kindervoorstelling", "knutselen", "familiedag",
        ],
    ),
    (
        Category::Civic,
        &[
            "gemeente", "inspraak", "raadsvergadering", "verkiezing", "stemmen", "demonstratie",
            "protest", "manifestatie", "town hall", "referendum", "politiek debat",
        ],
    ),
    (
        Category::Social,
        &[
            "meetup", "borrel", "netwerk", "networking", "singles", "speeddate", "taalcafé",
            "language exchange", "community dinner", "pubquiz", "quiz night", "spelletjesavond",
        ],
    ),
    (
        Category::Community,
        &[
            "buurt", "wijkfeest", "vrijwilliger", "buurthuis", "open dag", "rommelmarkt",
            "braderie", "straatfeest", "kerkdienst", "herdenking",
        ],
    ),
];

/// Classifies text into the closed category set.
///
/// `hint` is the raw category text the source markup carried, if any.
pub fn classify(title: &str, description: Option<&str>, hint: Option<&str>) -> Category {
    if let Some(hint) = hint {
        if let Ok(category) = Category::parse(hint) {
            return category;
        }
    }

    let mut haystack = title.to_lowercase();
    if let Some(description) = description {
        haystack.push(' ');
        haystack.push_str(&description.to_lowercase());
    }
    if let Some(hint) = hint {
        haystack.push(' ');
        haystack.push_str(&hint.to_lowercase());
    }

    let mut best = Category::Community;
    let mut best_score = 0usize;
    let mut tied = false;
    for (category, keywords) in KEYWORDS {
        let score = keywords.iter().filter(|kw| haystack.contains(*kw)).count();
        if score > best_score {
            best = *category;
            best_score = score;
            tied = false;
        } else if score == best_score && score > 0 && *category != best {
            tied = true;
        }
    }

    if best_score == 0 || tied {
        Category::Community
    } else {
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_hint_wins() {
        assert_eq!(classify("Something vague", None, Some("MUSIC")), Category::Music);
        assert_eq!(classify("Something vague", None, Some("nightlife")), Category::Nightlife);
    }

    #[test]
    fn test_keyword_classification() {
        assert_eq!(
            classify("Voorjaarsconcert", Some("Het orkest speelt werken van Mahler"), None),
            Category::Music
        );
        assert_eq!(
            classify("Wijnproeverij in de kelder", None, None),
            Category::Food
        );
        assert_eq!(
            classify("Stadswandeling met gids", None, None),
            Category::Active
        );
    }

    #[test]
    fn test_ambiguous_defaults_to_community() {
        assert_eq!(classify("Bijeenkomst", None, None), Category::Community);
        assert_eq!(classify("", None, None), Category::Community);
    }

    #[test]
    fn test_unparseable_hint_still_feeds_keywords() {
        assert_eq!(
            classify("Avondprogramma", None, Some("concertreeks")),
            Category::Music
        );
    }
}
