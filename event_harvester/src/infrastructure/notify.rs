// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Slack alerting for error/fatal conditions. The webhook is optional
//! configuration; without it every notification is a silent no-op. Alert
//! delivery failures are logged, never propagated - alerting must not take
//! the pipeline down.

use std::time::Duration;
use tracing::warn;

/// Fire-and-forget Slack notifier.
#[derive(Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook: Option<String>,
}

impl SlackNotifier {
    pub fn new(webhook: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, webhook }
    }

    /// Sends an error-level alert. Errors and fatals only; informational
    /// traffic stays in the logs.
    pub async fn alert(&self, message: &str) {
        let Some(webhook) = &self.webhook else {
            return;
        };
        let body = serde_json::json!({ "text": message });
        if let Err(e) = self.client.post(webhook).json(&body).send().await {
            warn!(error = %e, "slack alert delivery failed");
        }
    }
}
