//! Image extraction and pre-fetch.
//!
//! Two sources: `image/*` attachments and inline URLs in message text.
//! Platform-private attachment URLs cannot be fetched by the vision
//! endpoint, so they are downloaded with the bot credential and inlined as
//! data URLs before the agent is invoked.

use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;
use tracing::warn;

use vela_core::types::FileRef;
use vela_slack::ChatClient;

static DIRECT_IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://[^\s<>]+\.(?:jpg|jpeg|png|gif|webp|bmp|tiff)(?:\?[^\s<>]*)?")
        .unwrap()
});
static IMAGE_HOST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://[^\s<>]*(?:imgur|flickr|instagram|ichef\.bbci)[^\s<>]*").unwrap()
});
static SITE_IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://[^\s<>]*\.(?:com|org|net|co\.uk)/[^\s<>]*\.(?:jpg|jpeg|png|gif|webp)")
        .unwrap()
});

/// Collect image references from attachments and inline text URLs,
/// de-duplicated in discovery order. Trailing punctuation is stripped from
/// inline URLs.
pub fn extract_image_urls(text: &str, files: &[FileRef]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();

    for file in files {
        if file.mimetype.starts_with("image/") && !file.url_private.is_empty() {
            urls.push(file.url_private.clone());
        }
    }

    for pattern in [&*DIRECT_IMAGE_URL, &*IMAGE_HOST_URL, &*SITE_IMAGE_URL] {
        for m in pattern.find_iter(text) {
            let url = m
                .as_str()
                .trim_end_matches(['.', ',', ';', '!', '?'])
                .to_string();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }

    urls
}

/// Resolve each image reference into a URL the vision endpoint can load.
///
/// Platform-private URLs (files.slack.com) are downloaded with the bot
/// credential and inlined as `data:` URLs; public URLs pass through.
/// Failed downloads are dropped with a warning — the agent still runs with
/// whatever survived.
pub async fn prefetch_images(client: &dyn ChatClient, urls: &[String]) -> Vec<String> {
    let mut processed = Vec::with_capacity(urls.len());
    for url in urls {
        if !url.contains("files.slack.com") {
            processed.push(url.clone());
            continue;
        }
        match client.download(url).await {
            Ok(bytes) => {
                let mime = guess_mime(url);
                let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
                processed.push(format!("data:{mime};base64,{b64}"));
            }
            Err(e) => {
                warn!(url, error = %e, "image prefetch failed, dropping");
            }
        }
    }
    processed
}

fn guess_mime(url: &str) -> &'static str {
    let path = url.split('?').next().unwrap_or(url).to_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}
