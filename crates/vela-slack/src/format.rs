//! Markdown → Slack mrkdwn conversion.
//!
//! Model output arrives as standard markdown; Slack wants its own dialect
//! (`*bold*`, `_italic_`, `~strike~`, `<url|label>`). Code blocks and inline
//! code spans are left untouched by the emphasis passes.

use std::sync::LazyLock;

use regex::Regex;

static CODE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.+?```|`[^`\n]+?`").unwrap());
static MD_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static BOLD_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*\*([^\s*\n](?:[^*\n]*[^\s*\n])?)\*\*\*").unwrap());
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^\s*\n](?:[^*\n]*[^\s*\n])?)\*\*").unwrap());
static UNDER_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([^\s_\n](?:[^_\n]*[^\s_\n])?)__").unwrap());
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^\s*\n](?:[^*\n]*[^\s*\n])?)\*").unwrap());
static STRIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~([^\s~\n](?:[^~\n]*[^\s~\n])?)~~").unwrap());
static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>|\[\]]+").unwrap());
static URL_DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://(?:www\.)?([^/\s]+)").unwrap());

// The emphasis passes run in sequence, so bold output (`*x*`) must be hidden
// from the italic pass. Private-use sentinels stand in for the emitted `*`
// until the end of the pipeline.
const STAR_OPEN: char = '\u{E000}';
const STAR_CLOSE: char = '\u{E001}';

/// Complete formatting pipeline for outbound Slack messages.
pub fn format_message_for_slack(content: &str) -> String {
    let content = convert_markdown_links(content);
    let content = markdown_to_slack(&content);
    format_remaining_urls(&content)
}

/// Convert markdown links `[text](url)` to Slack's `<url|text>`.
pub fn convert_markdown_links(content: &str) -> String {
    MD_LINK.replace_all(content, "<$2|$1>").into_owned()
}

/// Convert markdown emphasis to mrkdwn, leaving code spans untouched.
pub fn markdown_to_slack(content: &str) -> String {
    map_outside_code(content, |part| {
        let part = BOLD_ITALIC.replace_all(part, format!("_{STAR_OPEN}${{1}}{STAR_CLOSE}_").as_str());
        let part = BOLD.replace_all(&part, format!("{STAR_OPEN}${{1}}{STAR_CLOSE}").as_str());
        let part = UNDER_BOLD.replace_all(&part, format!("{STAR_OPEN}${{1}}{STAR_CLOSE}").as_str());
        let part = ITALIC.replace_all(&part, "_$1_");
        let part = STRIKE.replace_all(&part, "~$1~");
        part.replace(STAR_OPEN, "*").replace(STAR_CLOSE, "*")
    })
}

/// Label bare URLs as `<url|label>`, skipping ones already in Slack format.
pub fn format_remaining_urls(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for m in BARE_URL.find_iter(content) {
        let preceded_by_angle = content[..m.start()].ends_with('<');
        let followed_by_pipe = content[m.end()..].starts_with('|');
        out.push_str(&content[last..m.start()]);
        if preceded_by_angle || followed_by_pipe {
            out.push_str(m.as_str());
        } else {
            let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
            let trailing = &m.as_str()[url.len()..];
            out.push_str(&format!("<{url}|{}>", url_label(url)));
            out.push_str(trailing);
        }
        last = m.end();
    }
    out.push_str(&content[last..]);
    out
}

fn url_label(url: &str) -> String {
    if url.contains("slack.com") {
        return "Ver mensagem no Slack".to_string();
    }
    if url.contains("youtube.com") || url.contains("youtu.be") {
        return "Vídeo YouTube".to_string();
    }
    if url.contains("drive.google.com") {
        return "Google Drive".to_string();
    }
    if url.contains("docs.google.com") {
        return "Google Docs".to_string();
    }
    if url.contains("calendar.google.com") {
        return "Google Calendar".to_string();
    }
    if url.contains("github.com") {
        return "GitHub".to_string();
    }
    URL_DOMAIN
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "Link".to_string())
}

/// Apply `f` to the stretches of `content` outside code blocks/spans.
fn map_outside_code(content: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for m in CODE_SPAN.find_iter(content) {
        out.push_str(&f(&content[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&f(&content[last..]));
    out
}
