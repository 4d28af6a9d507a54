//! Traveller extraction: document content in, structured travellers out.

use crate::content::DocumentContent;
use crate::openai::{CompletionError, CompletionService, Message};
use crate::schema::{self, ExtractionResult, MAX_TRAVELLERS};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are an AI assistant that extracts traveller information from text or images. \
Extract information for up to 5 travellers. \
If gender is not explicitly mentioned, make an educated guess based on the name. \
Look for any information that applies to all passengers and put it in globalInfo. \
Always use full four-digit years for dates of birth and write them as eight digits, YYYYMMDD.";

/// Builds the completion request for one document and validates the answer.
#[derive(Clone)]
pub struct TravellerExtractor {
    completion: Arc<dyn CompletionService>,
}

impl TravellerExtractor {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn extract(&self, content: DocumentContent) -> Result<ExtractionResult, CompletionError> {
        let messages = build_messages(content);

        debug!("Calling completion service for traveller extraction");
        let response = self
            .completion
            .complete_json(messages, schema::SCHEMA_NAME, schema::response_schema())
            .await?;

        debug!("Raw completion content length: {} chars", response.len());

        let mut result: ExtractionResult = parse_llm_json(&response)?;

        let dropped = result.cap_travellers();
        if dropped > 0 {
            warn!(
                "Model returned {} travellers, keeping the first {}",
                dropped + MAX_TRAVELLERS,
                MAX_TRAVELLERS
            );
        }

        info!("Extracted {} travellers", result.travellers.len());
        Ok(result)
    }
}

/// System instruction plus one user message carrying the text or the image.
fn build_messages(content: DocumentContent) -> Vec<Message> {
    let user = match content {
        DocumentContent::Image { data_url } => {
            Message::user_with_image("Extract traveller information from this image:", data_url)
        }
        DocumentContent::Text(text) => Message::user(format!(
            "Extract traveller information from this content:\n\n{}",
            text
        )),
    };

    vec![Message::system(SYSTEM_PROMPT), user]
}

/// Parse model JSON, tolerating a surrounding markdown code fence.
fn parse_llm_json<T: serde::de::DeserializeOwned>(response: &str) -> Result<T, serde_json::Error> {
    let json_str = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
            .trim()
    } else if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response).trim()
    } else {
        response.trim()
    };

    serde_json::from_str(json_str)
}
