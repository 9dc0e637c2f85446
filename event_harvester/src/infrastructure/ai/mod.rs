// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Provider clients for the LLM and embedding contracts.

pub mod embedding_client;
pub mod llm_client;

pub use embedding_client::{pad_to_dimension, EmbeddingClient, HttpEmbeddingClient};
pub use llm_client::{is_rate_limited, strip_code_fences, HttpLlmClient, LlmClient};
