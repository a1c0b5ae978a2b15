//! Deep-thinking sub-agent: a reasoner-model call exposed to the outer
//! agent as the `deep_thinking_analysis` function tool, and invoked
//! directly by the `+think` command flow.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::prompt::{REASONING_SEPARATOR, THINKING_INSTRUCTIONS};
use crate::provider::{ResponsesClient, ResponsesInput, ResponsesRequest};

pub struct ThinkingAgent {
    client: Arc<dyn ResponsesClient>,
    model: String,
}

impl ThinkingAgent {
    pub fn new(client: Arc<dyn ResponsesClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Run the reasoner over `query` and return the formatted analysis.
    ///
    /// When the model emits a reasoning trace between sentinel separators,
    /// the trace is extracted into a fenced block preceding the conclusion.
    pub async fn analyze(&self, query: &str) -> Result<String> {
        let req = ResponsesRequest {
            model: self.model.clone(),
            input: ResponsesInput::Text(format!(
                "Provide comprehensive deep analysis for: {query}"
            )),
            instructions: Some(THINKING_INSTRUCTIONS.to_string()),
            tools: Vec::new(),
            tool_choice: None,
        };
        let output = self.client.complete(&req).await?;
        info!(chars = output.len(), "deep thinking analysis complete");
        Ok(format_with_trace(&output))
    }
}

/// Extract a sentinel-delimited reasoning trace, if present, and format it
/// as a fenced block followed by the cleaned conclusion.
pub fn format_with_trace(output: &str) -> String {
    if !output.contains(REASONING_SEPARATOR) {
        return output.to_string();
    }

    let parts: Vec<&str> = output.split(REASONING_SEPARATOR).collect();
    let trace = parts.iter().find(|part| {
        part.contains("UNDERSTAND") || part.contains("ANALYZE") || part.contains("EXPLORE")
    });

    match trace {
        Some(trace) => {
            let trace = trace.trim();
            let conclusion: String = parts
                .iter()
                .filter(|p| p.trim() != trace)
                .map(|p| p.trim())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
            format!("```\n{trace}\n```\n\n{conclusion}")
        }
        None => output.replace(REASONING_SEPARATOR, "").trim().to_string(),
    }
}

/// Split a long analysis into chat-sized parts on paragraph boundaries.
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.len() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for paragraph in message.split("\n\n") {
        if !current.is_empty() && current.len() + paragraph.len() + 2 > max_length {
            parts.push(current.trim().to_string());
            current = String::new();
        }
        if paragraph.len() > max_length {
            // Oversized paragraph: flush and hard-split.
            if !current.is_empty() {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            let mut rest = paragraph;
            while rest.len() > max_length {
                let mut split_at = floor_char_boundary(rest, max_length);
                if let Some(space) = rest[..split_at].rfind(' ') {
                    split_at = space;
                }
                parts.push(rest[..split_at].trim().to_string());
                rest = rest[split_at..].trim_start();
            }
            current.push_str(rest);
            current.push_str("\n\n");
        } else {
            current.push_str(paragraph);
            current.push_str("\n\n");
        }
    }

    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    parts
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_without_trace_passes_through() {
        assert_eq!(format_with_trace("Plain analysis."), "Plain analysis.");
    }

    #[test]
    fn trace_is_extracted_into_fenced_block() {
        let output = format!(
            "{REASONING_SEPARATOR}\n1. UNDERSTAND: the problem\n2. ANALYZE: parts\n{REASONING_SEPARATOR}\nFinal conclusion."
        );
        let formatted = format_with_trace(&output);
        assert!(formatted.starts_with("```\n"));
        assert!(formatted.contains("UNDERSTAND"));
        assert!(formatted.trim_end().ends_with("Final conclusion."));
    }

    #[test]
    fn separator_without_trace_is_stripped() {
        let output = format!("Intro {REASONING_SEPARATOR} outro");
        let formatted = format_with_trace(&output);
        assert!(!formatted.contains(REASONING_SEPARATOR));
    }

    #[test]
    fn short_message_is_single_part() {
        assert_eq!(split_long_message("short", 3000).len(), 1);
    }

    #[test]
    fn long_message_splits_on_paragraphs() {
        let para = "x".repeat(1200);
        let message = format!("{para}\n\n{para}\n\n{para}");
        let parts = split_long_message(&message, 3000);
        assert!(parts.len() >= 2);
        for p in &parts {
            assert!(p.len() <= 3000);
        }
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let message = "word ".repeat(1500);
        let parts = split_long_message(message.trim(), 3000);
        assert!(parts.len() >= 2);
        for p in &parts {
            assert!(p.len() <= 3000);
        }
    }
}
