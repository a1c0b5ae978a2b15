//! Capability-tag derivation.
//!
//! Pure functions: the presenter recomputes the tag set on every streaming
//! event and the final edit. Position 0 is always the effective model tag.
//! File-search is deliberately never surfaced — it is ambient RAG.

use std::sync::LazyLock;

use regex::Regex;

use vela_core::config::AgentConfig;

use crate::mcp::McpService;
use crate::stream::ToolCallEvent;

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s<>|]+").unwrap());

/// Hosts that appear in MCP output routinely and must not count as
/// web-search evidence.
const NON_SEARCH_HOSTS: &[&str] = &[
    "drive.google.com",
    "docs.google.com",
    "calendar.google.com",
];

const WEB_INDICATORS: &[&str] = &[
    "utm_source=openai",
    "search result",
    "according to",
    "source:",
    "based on search",
    "found on",
    "wikipedia.org",
    "search engine",
];

const IMAGE_GEN_KEYWORDS: &[&str] = &[
    "gere uma imagem",
    "gerar imagem",
    "criar imagem",
    "desenhe",
    "desenhar",
    "faça uma imagem",
    "fazer imagem",
    "generate image",
    "create image",
];

const THINKING_KEYWORDS: &[&str] = &[
    "+think",
    "thinking",
    "análise profunda",
    "análise detalhada",
    "brainstorm",
];

/// Everything the deriver looks at. All borrowed; derivation allocates only
/// the output list.
pub struct TagInputs<'a> {
    pub tool_calls: &'a [ToolCallEvent],
    pub has_images: bool,
    pub has_audio: bool,
    pub user_text: &'a str,
    pub response_text: &'a str,
    pub models: &'a AgentConfig,
}

/// Cumulative tag list for a (possibly partial) response.
pub fn derive_tags(inputs: &TagInputs<'_>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();

    let thinking_used = inputs.tool_calls.iter().any(is_thinking_call);

    // Position 0: effective model.
    if thinking_used {
        tags.push(inputs.models.reasoner_model.clone());
    } else if inputs.has_images {
        tags.push(inputs.models.vision_model.clone());
    } else {
        tags.push(inputs.models.text_model.clone());
    }

    if inputs.has_images {
        tags.push("Vision".to_string());
    }
    if inputs.has_audio {
        tags.push("AudioTranscribe".to_string());
    }

    // Structured tool-call evidence.
    for call in inputs.tool_calls {
        let name = call.name.to_lowercase();
        if name.contains("web_search") {
            push_unique(&mut tags, "WebSearch");
        } else if name.contains("image_generation") {
            push_unique(&mut tags, "ImageGen");
        } else if is_thinking_call(call) {
            push_unique(&mut tags, "Thinking");
        } else if name != "file_search" {
            // MCP gateway tool names carry the service slug.
            for service in McpService::all() {
                if name.contains(service.slug()) || name.contains("mcp") {
                    if name.contains(service.slug()) {
                        push_unique(&mut tags, service.tag());
                    }
                    break;
                }
            }
        }
        // file_search is skipped: RAG is background functionality.
    }

    // Fallback heuristics over text, papering over missing tool metadata.
    let response_lower = inputs.response_text.to_lowercase();
    let combined = format!("{response_lower} {}", inputs.user_text.to_lowercase());

    if !tags.iter().any(|t| t == "WebSearch") && looks_like_web_search(&response_lower) {
        tags.push("WebSearch".to_string());
    }

    for service in McpService::all() {
        if service
            .keywords()
            .iter()
            .any(|kw| combined.contains(kw))
        {
            push_unique(&mut tags, service.tag());
        }
    }

    tags
}

/// Header tags computed before any model call, from heuristics alone.
pub fn initial_tags(
    text: &str,
    has_audio: bool,
    has_images: bool,
    models: &AgentConfig,
) -> Vec<String> {
    let lower = text.to_lowercase();
    let thinking = THINKING_KEYWORDS.iter().any(|kw| lower.contains(kw));
    let image_gen = IMAGE_GEN_KEYWORDS.iter().any(|kw| lower.contains(kw));

    let mut tags = if thinking {
        vec![models.reasoner_model.clone(), "Thinking".to_string()]
    } else if has_images {
        vec![models.vision_model.clone()]
    } else {
        vec![models.text_model.clone()]
    };

    if image_gen {
        tags.push("ImageGen".to_string());
    }
    if has_audio {
        tags.push("AudioTranscribe".to_string());
    }
    if has_images && !image_gen {
        tags.push("Vision".to_string());
    }

    tags
}

/// Render the header: `` `⛭ model` `Tag` `Tag` ``.
pub fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .enumerate()
        .map(|(i, tag)| {
            if i == 0 {
                format!("`⛭ {tag}`")
            } else {
                format!("`{tag}`")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_thinking_call(call: &ToolCallEvent) -> bool {
    let name = call.name.to_lowercase();
    name.contains("deep_thinking_analysis") || name.contains("thinking")
}

fn push_unique(tags: &mut Vec<String>, tag: &str) {
    if !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
}

/// WebSearch only when the response carries an external URL *and* a phrase
/// indicator — URLs alone show up in MCP answers too.
fn looks_like_web_search(response_lower: &str) -> bool {
    let has_external_url = URL.find_iter(response_lower).any(|m| {
        !NON_SEARCH_HOSTS
            .iter()
            .any(|host| m.as_str().contains(host))
    });
    let has_indicator = WEB_INDICATORS
        .iter()
        .any(|ind| response_lower.contains(ind));
    has_external_url && has_indicator
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> AgentConfig {
        AgentConfig::default()
    }

    fn inputs<'a>(
        tool_calls: &'a [ToolCallEvent],
        user_text: &'a str,
        response_text: &'a str,
        models: &'a AgentConfig,
    ) -> TagInputs<'a> {
        TagInputs {
            tool_calls,
            has_images: false,
            has_audio: false,
            user_text,
            response_text,
            models,
        }
    }

    #[test]
    fn model_tag_is_always_first_and_unique() {
        let m = models();
        let tags = derive_tags(&inputs(&[], "oi", "olá!", &m));
        assert_eq!(tags[0], "gpt-4.1-mini");
        assert_eq!(
            tags.iter().filter(|t| t.contains("gpt") || t.contains("o3")).count(),
            1
        );
    }

    #[test]
    fn thinking_call_switches_model_tag() {
        let m = models();
        let calls = vec![ToolCallEvent::named("deep_thinking_analysis")];
        let tags = derive_tags(&inputs(&calls, "+think plano", "análise…", &m));
        assert_eq!(tags[0], "o3-mini");
        assert!(tags.iter().any(|t| t == "Thinking"));
    }

    #[test]
    fn vision_model_and_tag_for_images() {
        let m = models();
        let mut i = inputs(&[], "what is this?", "a cat", &m);
        i.has_images = true;
        let tags = derive_tags(&i);
        assert_eq!(tags[0], "gpt-4o");
        assert!(tags.iter().any(|t| t == "Vision"));
    }

    #[test]
    fn audio_adds_transcribe_tag() {
        let m = models();
        let mut i = inputs(&[], "", "resposta", &m);
        i.has_audio = true;
        assert!(derive_tags(&i).iter().any(|t| t == "AudioTranscribe"));
    }

    #[test]
    fn web_search_from_structured_call() {
        let m = models();
        let calls = vec![ToolCallEvent::named("web_search_call")];
        let tags = derive_tags(&inputs(&calls, "clima", "20°C", &m));
        assert!(tags.iter().any(|t| t == "WebSearch"));
    }

    #[test]
    fn web_search_heuristic_needs_url_and_indicator() {
        let m = models();
        // URL alone: no tag.
        let tags = derive_tags(&inputs(&[], "x", "veja https://example.com/page", &m));
        assert!(!tags.iter().any(|t| t == "WebSearch"));
        // URL + indicator: tag.
        let tags = derive_tags(&inputs(
            &[],
            "x",
            "According to https://example.com/page, yes.",
            &m,
        ));
        assert!(tags.iter().any(|t| t == "WebSearch"));
        // Excluded host + indicator: no tag.
        let tags = derive_tags(&inputs(
            &[],
            "x",
            "source: https://docs.google.com/d/1",
            &m,
        ));
        assert!(!tags.iter().any(|t| t == "WebSearch"));
    }

    #[test]
    fn mcp_tag_from_user_keywords() {
        let m = models();
        let tags = derive_tags(&inputs(&[], "track 2h on ev:273393148295192", "feito!", &m));
        assert!(tags.iter().any(|t| t == "McpTimeTracker"));
    }

    #[test]
    fn mcp_tag_from_gateway_tool_name() {
        let m = models();
        let calls = vec![ToolCallEvent::named("timetracker_add_time")];
        let tags = derive_tags(&inputs(&calls, "", "", &m));
        assert!(tags.iter().any(|t| t == "McpTimeTracker"));
    }

    #[test]
    fn file_search_never_tagged() {
        let m = models();
        let calls = vec![ToolCallEvent::named("file_search")];
        let tags = derive_tags(&inputs(&calls, "resuma o pdf", "resumo…", &m));
        assert!(!tags.iter().any(|t| t.contains("FileSearch")));
    }

    #[test]
    fn derivation_is_pure() {
        let m = models();
        let calls = vec![ToolCallEvent::named("web_search_call")];
        let a = derive_tags(&inputs(&calls, "previsão", "céu limpo", &m));
        let b = derive_tags(&inputs(&calls, "previsão", "céu limpo", &m));
        assert_eq!(a, b);
    }

    #[test]
    fn initial_tags_for_plain_text() {
        let m = models();
        assert_eq!(initial_tags("bom dia", false, false, &m), vec!["gpt-4.1-mini"]);
    }

    #[test]
    fn initial_tags_for_think_command() {
        let m = models();
        let tags = initial_tags("+think como escalar?", false, false, &m);
        assert_eq!(tags, vec!["o3-mini".to_string(), "Thinking".to_string()]);
    }

    #[test]
    fn initial_tags_image_generation() {
        let m = models();
        let tags = initial_tags("gere uma imagem de um farol", false, false, &m);
        assert!(tags.iter().any(|t| t == "ImageGen"));
    }

    #[test]
    fn format_gear_prefix() {
        let tags = vec!["gpt-4.1-mini".to_string(), "Vision".to_string()];
        assert_eq!(format_tags(&tags), "`⛭ gpt-4.1-mini` `Vision`");
    }
}
