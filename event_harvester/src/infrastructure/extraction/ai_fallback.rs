// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # AI Extraction Fallback
//!
//! The last rung of the waterfall: when every deterministic strategy came
//! up empty, the (truncated) page HTML goes to the LLM with a strict JSON
//! schema, the closed category key set, a target-year constraint, and an
//! original-language requirement. Output discipline is enforced on our
//! side: code fences stripped, non-JSON rejected, and any record whose ISO
//! date falls outside the target years dropped.

use serde::Deserialize;

use event_harvester_domain::value_objects::{Category, ParsingMethod, RawEventCard};
use event_harvester_domain::HarvestError;

use crate::infrastructure::ai::{strip_code_fences, LlmClient};

/// Target-year window for accepted records.
#[derive(Debug, Clone, Copy)]
pub struct TargetYears {
    pub min: i32,
    pub max: i32,
}

/// The schema the model must produce, mirrored as a deserialization type.
#[derive(Debug, Deserialize)]
struct AiEventRecord {
    title: String,
    /// ISO date `YYYY-MM-DD`.
    date: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

fn system_prompt() -> String {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_key()).collect();
    format!(
        "You extract public event listings from HTML. Respond with a JSON array only, no prose, \
         no markdown fences. Each element: {{\"title\": string, \"date\": \"YYYY-MM-DD\", \
         \"time\": \"HH:MM\" or null, \"location\": string or null, \"description\": string or \
         null, \"url\": string or null, \"image\": string or null, \"category\": one of \
         [{}] or null}}. Keep titles and descriptions in the page's original language. \
         Never invent events; extract only what the HTML shows.",
        categories.join(", ")
    )
}

fn user_prompt(html: &str, source_name: &str, years: TargetYears, max_chars: usize) -> String {
    let truncated: String = html.chars().take(max_chars).collect();
    format!(
        "Source: {}\nOnly include events dated between {}-01-01 and {}-12-31.\n\nHTML:\n{}",
        source_name, years.min, years.max, truncated
    )
}

/// Runs the AI fallback over a page.
pub async fn extract(
    llm: &dyn LlmClient,
    html: &str,
    source_name: &str,
    years: TargetYears,
    max_chars: usize,
) -> Result<Vec<RawEventCard>, HarvestError> {
    let response = llm
        .complete(&system_prompt(), &user_prompt(html, source_name, years, max_chars))
        .await?;

    let cleaned = strip_code_fences(&response);
    let records: Vec<AiEventRecord> = serde_json::from_str(cleaned).map_err(|e| {
        HarvestError::provider(format!("AI extraction returned unparseable JSON: {}", e))
    })?;

    Ok(records
        .into_iter()
        .filter(|record| year_in_window(&record.date, years))
        .filter(|record| !record.title.trim().is_empty())
        .map(|record| {
            let mut card = RawEventCard::new(record.title, ParsingMethod::AiFallback);
            card.date_text = Some(match record.time {
                Some(time) => format!("{} {}", record.date, time),
                None => record.date,
            });
            card.location_text = record.location;
            card.description = record.description;
            card.detail_url = record.url;
            card.image_url = record.image;
            card.category_hint = record.category;
            card
        })
        .collect())
}

/// Accepts only records whose parsed ISO year is inside the window.
fn year_in_window(date: &str, years: TargetYears) -> bool {
    let Some(year_str) = date.get(0..4) else {
        return false;
    };
    let Ok(year) = year_str.parse::<i32>() else {
        return false;
    };
    (years.min..=years.max).contains(&year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedLlm(String);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, HarvestError> {
            Ok(self.0.clone())
        }
    }

    fn years() -> TargetYears {
        TargetYears { min: 2026, max: 2027 }
    }

    #[tokio::test]
    async fn test_valid_json_with_fences() {
        let llm = CannedLlm(
            "```json\n[{\"title\":\"Voorjaarsconcert\",\"date\":\"2026-04-12\",\"time\":\"20:00\",\
             \"location\":\"Paradiso\",\"category\":\"MUSIC\"}]\n```"
                .to_string(),
        );
        let cards = extract(&llm, "<html/>", "paradiso", years(), 10_000).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Voorjaarsconcert");
        assert_eq!(cards[0].date_text.as_deref(), Some("2026-04-12 20:00"));
        assert_eq!(cards[0].category_hint.as_deref(), Some("MUSIC"));
        assert_eq!(cards[0].method, ParsingMethod::AiFallback);
    }

    #[tokio::test]
    async fn test_out_of_window_dates_dropped() {
        let llm = CannedLlm(
            r#"[{"title":"Oud","date":"2020-01-01"},{"title":"Goed","date":"2026-06-01"},
                {"title":"Ver weg","date":"2031-01-01"}]"#
                .to_string(),
        );
        let cards = extract(&llm, "<html/>", "x", years(), 10_000).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Goed");
    }

    #[tokio::test]
    async fn test_non_json_rejected() {
        let llm = CannedLlm("I found three events on this page.".to_string());
        let result = extract(&llm, "<html/>", "x", years(), 10_000).await;
        assert!(matches!(result, Err(HarvestError::ProviderError(_))));
    }

    #[tokio::test]
    async fn test_malformed_dates_dropped() {
        let llm = CannedLlm(
            r#"[{"title":"Vaag","date":"binnenkort"},{"title":"Leeg","date":""}]"#.to_string(),
        );
        let cards = extract(&llm, "<html/>", "x", years(), 10_000).await.unwrap();
        assert!(cards.is_empty());
    }
}
