//! Audio extraction and transcription.
//!
//! Anything with an `audio/*` MIME or a known audio extension is eligible;
//! files over 25 MiB are rejected before any transcription attempt.
//! Transcriptions (and failures) are injected into the prompt as visible
//! markers so the model can still respond when a file couldn't be read.

use async_trait::async_trait;
use tracing::{info, warn};

use vela_core::types::FileRef;
use vela_slack::ChatClient;

use crate::error::Result;

/// Transcription endpoint limit.
pub const MAX_AUDIO_BYTES: u64 = 25 * 1024 * 1024;

const AUDIO_EXTENSIONS: &[&str] = &[
    ".mp3", ".wav", ".m4a", ".ogg", ".flac", ".mp4", ".mpeg", ".mpga", ".webm",
];

/// Speech-to-text endpoint. Implemented by the provider client.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the given audio bytes; `language` is a BCP-47 hint.
    async fn transcribe(&self, file_name: &str, bytes: Vec<u8>, language: &str) -> Result<String>;
}

/// Pick the audio attachments out of an event's file list.
pub fn extract_audio_files(files: &[FileRef]) -> Vec<FileRef> {
    files
        .iter()
        .filter(|f| is_audio(&f.mimetype, &f.name))
        .cloned()
        .collect()
}

fn is_audio(mimetype: &str, name: &str) -> bool {
    if mimetype.starts_with("audio/") {
        return true;
    }
    let lower = name.to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Download and transcribe every audio file, returning one prompt line per
/// file: `🎵 Áudio 'name': text`, or an explicit error marker on failure.
///
/// Oversized files are rejected without download or transcription.
pub async fn transcribe_all(
    chat: &dyn ChatClient,
    transcriber: &dyn Transcriber,
    files: &[FileRef],
) -> Vec<String> {
    let mut lines = Vec::with_capacity(files.len());
    for file in files {
        lines.push(transcribe_one(chat, transcriber, file).await);
    }
    lines
}

async fn transcribe_one(
    chat: &dyn ChatClient,
    transcriber: &dyn Transcriber,
    file: &FileRef,
) -> String {
    if file.size > MAX_AUDIO_BYTES {
        warn!(name = %file.name, size = file.size, "audio file over limit, skipping");
        return failure_marker(&file.name);
    }

    let bytes = match chat.download(&file.url_private).await {
        Ok(b) => b,
        Err(e) => {
            warn!(name = %file.name, error = %e, "audio download failed");
            return failure_marker(&file.name);
        }
    };

    match transcriber.transcribe(&file.name, bytes, "pt-BR").await {
        Ok(text) => {
            info!(name = %file.name, chars = text.len(), "audio transcribed");
            format!("🎵 Áudio '{}': {}", file.name, text)
        }
        Err(e) => {
            warn!(name = %file.name, error = %e, "transcription failed");
            failure_marker(&file.name)
        }
    }
}

fn failure_marker(name: &str) -> String {
    format!("❌ Erro ao transcrever áudio '{name}'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use std::path::Path;
    use vela_slack::error::Result as ChatResult;
    use vela_slack::types::{ThreadMessage, UserProfile};
    use vela_slack::ChatError;

    fn audio_file(name: &str, mime: &str, size: u64) -> FileRef {
        FileRef {
            id: "F1".into(),
            name: name.into(),
            mimetype: mime.into(),
            size,
            url_private: "https://files.slack.com/f/F1".into(),
        }
    }

    #[test]
    fn mime_and_extension_both_match() {
        assert!(is_audio("audio/mpeg", "x.bin"));
        assert!(is_audio("application/octet-stream", "voice.M4A"));
        assert!(is_audio("", "note.webm"));
        assert!(!is_audio("image/png", "pic.png"));
    }

    #[test]
    fn extraction_filters_non_audio() {
        let files = vec![
            audio_file("a.mp3", "audio/mpeg", 10),
            audio_file("b.png", "image/png", 10),
        ];
        let audio = extract_audio_files(&files);
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].name, "a.mp3");
    }

    struct StubChat;

    #[async_trait]
    impl ChatClient for StubChat {
        async fn post_message(&self, _: &str, _: Option<&str>, _: &str) -> ChatResult<String> {
            Ok("1.0".into())
        }
        async fn update_message(&self, _: &str, _: &str, _: &str) -> ChatResult<()> {
            Ok(())
        }
        async fn delete_message(&self, _: &str, _: &str) -> ChatResult<()> {
            Ok(())
        }
        async fn upload_file(
            &self,
            _: &str,
            _: &Path,
            _: Option<&str>,
            _: Option<&str>,
            _: Option<&str>,
        ) -> ChatResult<()> {
            Ok(())
        }
        async fn thread_replies(&self, _: &str, _: &str, _: u32) -> ChatResult<Vec<ThreadMessage>> {
            Ok(Vec::new())
        }
        async fn user_info(&self, _: &str) -> ChatResult<UserProfile> {
            Ok(UserProfile::default())
        }
        async fn channel_is_im(&self, _: &str) -> ChatResult<bool> {
            Ok(false)
        }
        async fn auth_test(&self) -> ChatResult<String> {
            Ok("U0".into())
        }
        async fn download(&self, _: &str) -> ChatResult<Vec<u8>> {
            Ok(vec![1, 2, 3])
        }
    }

    struct OkTranscriber;

    #[async_trait]
    impl Transcriber for OkTranscriber {
        async fn transcribe(&self, _: &str, _: Vec<u8>, language: &str) -> Result<String> {
            assert_eq!(language, "pt-BR");
            Ok("olá mundo".into())
        }
    }

    struct FailTranscriber;

    #[async_trait]
    impl Transcriber for FailTranscriber {
        async fn transcribe(&self, _: &str, _: Vec<u8>, _: &str) -> Result<String> {
            Err(MediaError::Transcription("endpoint down".into()))
        }
    }

    #[tokio::test]
    async fn successful_transcription_line() {
        let lines =
            transcribe_all(&StubChat, &OkTranscriber, &[audio_file("voz.ogg", "audio/ogg", 10)])
                .await;
        assert_eq!(lines, vec!["🎵 Áudio 'voz.ogg': olá mundo"]);
    }

    #[tokio::test]
    async fn failure_yields_error_marker() {
        let lines = transcribe_all(
            &StubChat,
            &FailTranscriber,
            &[audio_file("voz.ogg", "audio/ogg", 10)],
        )
        .await;
        assert_eq!(lines, vec!["❌ Erro ao transcrever áudio 'voz.ogg'"]);
    }

    #[tokio::test]
    async fn oversized_file_rejected_without_transcription() {
        struct PanicTranscriber;
        #[async_trait]
        impl Transcriber for PanicTranscriber {
            async fn transcribe(&self, _: &str, _: Vec<u8>, _: &str) -> Result<String> {
                panic!("must not be called for oversized files");
            }
        }
        let over = audio_file("big.wav", "audio/wav", MAX_AUDIO_BYTES + 1);
        let lines = transcribe_all(&StubChat, &PanicTranscriber, &[over]).await;
        assert_eq!(lines, vec!["❌ Erro ao transcrever áudio 'big.wav'"]);
    }
}
