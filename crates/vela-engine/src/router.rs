//! Event router: decides, for every inbound message event, whether the
//! engine responds — and spawns a detached handler when it does.
//!
//! Guard order: self/bot filter → empty filter → allow-list → dedupe →
//! decide-to-respond → self-echo filter → `+think` branch → dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vela_core::config::SlackConfig;
use vela_core::types::Request;
use vela_media::audio::extract_audio_files;
use vela_media::documents::extract_document_files;
use vela_media::images::extract_image_urls;
use vela_slack::types::{contains_mention, strip_mention, ChatEvent};
use vela_slack::ChatClient;

use crate::state::EngineState;

/// Phrases that mark an event as the bot's own response echoed back.
const ECHO_PHRASES: &[&str] = &[
    "encontrei o arquivo",
    "você pode acessá-lo",
    "estou à disposição",
    "não consegui encontrar",
    "vou procurar",
    "aqui está",
];

/// Downstream handling of an accepted request. Implemented by the
/// orchestrator; tests substitute recorders.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request);

    /// The `+think` sub-flow: direct reasoner analysis.
    async fn handle_think(&self, channel: &str, thread_ts: &str, is_dm: bool, prompt: &str);
}

pub struct EventRouter {
    config: SlackConfig,
    client: Arc<dyn ChatClient>,
    state: Arc<EngineState>,
    handler: Arc<dyn RequestHandler>,
}

impl EventRouter {
    pub fn new(
        config: SlackConfig,
        client: Arc<dyn ChatClient>,
        state: Arc<EngineState>,
        handler: Arc<dyn RequestHandler>,
    ) -> Self {
        Self {
            config,
            client,
            state,
            handler,
        }
    }

    /// Filter one inbound event; spawn a detached handler when it warrants
    /// a response. Never blocks on the handler itself.
    pub async fn dispatch(&self, event: ChatEvent) {
        let Some(request) = self.evaluate(&event).await else {
            return;
        };

        info!(
            channel = %request.channel,
            user = %request.user,
            thread = %request.thread_ts,
            correlation = %request.id,
            "dispatching request"
        );

        let handler = Arc::clone(&self.handler);
        if request.text.starts_with("+think") {
            let prompt = request.text.trim_start_matches("+think").trim().to_string();
            let channel = request.channel.clone();
            let thread = request.thread_ts.clone();
            let is_dm = request.is_dm;
            tokio::spawn(async move {
                handler.handle_think(&channel, &thread, is_dm, &prompt).await;
            });
        } else {
            tokio::spawn(async move {
                handler.handle(request).await;
            });
        }
    }

    /// Run every guard; `Some(request)` means the engine will respond.
    async fn evaluate(&self, event: &ChatEvent) -> Option<Request> {
        // 1. Never respond to ourselves or to other bots.
        if event.from_bot() || event.user.is_empty() || event.user == self.config.bot_user_id {
            return None;
        }

        // 2. Nothing to respond to: no text and no audio.
        let audio = extract_audio_files(&event.files);
        if event.text.trim().is_empty() && audio.is_empty() {
            return None;
        }

        // 3. Allow-list.
        let is_dm = self.channel_allowed(&event.channel, &event.user).await?;

        // 4. Dedupe — insert before any work begins.
        if self.state.seen_before(&event.channel, &event.ts, &event.user) {
            debug!(channel = %event.channel, ts = %event.ts, "duplicate event, skipping");
            return None;
        }

        // 5. Decide-to-respond and pick the reply thread.
        let thread_ts = self.decide_thread(event, is_dm).await?;

        // 6. Self-echo detector.
        let lower = event.text.to_lowercase();
        if ECHO_PHRASES.iter().any(|p| lower.contains(p)) {
            debug!("bot response echo detected, skipping");
            return None;
        }

        let text = strip_mention(&event.text, &self.config.bot_user_id);
        let image_urls = extract_image_urls(&event.text, &event.files);
        let documents = extract_document_files(&event.files);

        Some(Request {
            id: Uuid::new_v4(),
            channel: event.channel.clone(),
            thread_ts,
            user: event.user.clone(),
            text,
            image_urls,
            audio,
            documents,
            is_dm,
            model_override: None,
        })
    }

    /// Allow-list check. Returns `Some(is_dm)` when the channel is
    /// permitted, `None` otherwise.
    ///
    /// Development mode: the channel set is the sole rule. Production mode
    /// additionally admits DMs from allowed users; resolved DM channels are
    /// cached so the platform is asked only once.
    async fn channel_allowed(&self, channel: &str, user: &str) -> Option<bool> {
        if self.config.allowed_channels.iter().any(|c| c == channel) {
            return Some(false);
        }
        if self.config.development_mode {
            return None;
        }

        if self.state.is_known_dm(channel) {
            return Some(true);
        }
        if self.config.allowed_users.iter().any(|u| u == user) {
            match self.client.channel_is_im(channel).await {
                Ok(true) => {
                    self.state.mark_dm_allowed(channel);
                    return Some(true);
                }
                Ok(false) => return None,
                Err(e) => {
                    warn!(channel, error = %e, "channel info lookup failed");
                    return None;
                }
            }
        }
        None
    }

    /// Returns the thread to reply in, or `None` when the engine should
    /// stay silent.
    async fn decide_thread(&self, event: &ChatEvent, is_dm: bool) -> Option<String> {
        if is_dm {
            return Some(event.thread_ts.clone().unwrap_or_else(|| event.ts.clone()));
        }

        match &event.thread_ts {
            // Threaded reply: respond iff the *first* message of the thread
            // mentioned the bot.
            Some(thread_ts) => {
                let replies = match self
                    .client
                    .thread_replies(&event.channel, thread_ts, 1)
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "thread root lookup failed, staying silent");
                        return None;
                    }
                };
                let root = replies.first()?;
                contains_mention(&root.text, &self.config.bot_user_id)
                    .then(|| thread_ts.clone())
            }
            // Top-level message: a mention roots a new thread here.
            None => contains_mention(&event.text, &self.config.bot_user_id)
                .then(|| event.ts.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use vela_core::types::FileRef;
    use vela_slack::error::Result as ChatResult;
    use vela_slack::types::{ThreadMessage, UserProfile};

    const BOT: &str = "U057233T98A";
    const CHANNEL: &str = "C059NNLU3E1";

    #[derive(Default)]
    struct StubChat {
        /// Root message text per thread ts.
        roots: Mutex<std::collections::HashMap<String, String>>,
        im_channels: Mutex<Vec<String>>,
    }

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
        async fn thread_replies(&self, _: &str, ts: &str, _: u32) -> ChatResult<Vec<ThreadMessage>> {
            let roots = self.roots.lock().unwrap();
            Ok(roots
                .get(ts)
                .map(|text| {
                    vec![ThreadMessage {
                        user: "U1".into(),
                        text: text.clone(),
                        ts: ts.into(),
                    }]
                })
                .unwrap_or_default())
        }
        async fn user_info(&self, _: &str) -> ChatResult<UserProfile> {
            Ok(UserProfile::default())
        }
        async fn channel_is_im(&self, channel: &str) -> ChatResult<bool> {
            Ok(self.im_channels.lock().unwrap().iter().any(|c| c == channel))
        }
        async fn auth_test(&self) -> ChatResult<String> {
            Ok(BOT.into())
        }
        async fn download(&self, _: &str) -> ChatResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<Request>>,
        thinks: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RequestHandler for Recorder {
        async fn handle(&self, request: Request) {
            self.requests.lock().unwrap().push(request);
        }
        async fn handle_think(&self, _: &str, _: &str, _: bool, prompt: &str) {
            self.thinks.lock().unwrap().push(prompt.to_string());
        }
    }

    fn config(dev: bool) -> SlackConfig {
        SlackConfig {
            bot_token: "xoxb".into(),
            app_token: "xapp".into(),
            team_id: String::new(),
            bot_user_id: BOT.into(),
            allowed_channels: vec![CHANNEL.into()],
            allowed_users: vec!["U_ALLOWED".into()],
            development_mode: dev,
            owner_handle: "<@U0>".into(),
        }
    }

    fn router(dev: bool, chat: Arc<StubChat>, handler: Arc<Recorder>) -> EventRouter {
        EventRouter::new(config(dev), chat, Arc::new(EngineState::new()), handler)
    }

    fn mention_event(text: &str) -> ChatEvent {
        ChatEvent {
            event_type: "message".into(),
            channel: CHANNEL.into(),
            user: "U1".into(),
            text: text.into(),
            ts: "100.1".into(),
            ..Default::default()
        }
    }

    async fn dispatched(router: &EventRouter, event: ChatEvent, rec: &Recorder) -> usize {
        router.dispatch(event).await;
        // Let the spawned handler task run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        rec.requests.lock().unwrap().len()
    }

    #[tokio::test]
    async fn mention_in_allowed_channel_dispatches() {
        let chat = Arc::new(StubChat::default());
        let rec = Arc::new(Recorder::default());
        let r = router(true, chat, Arc::clone(&rec));
        let n = dispatched(&r, mention_event(&format!("<@{BOT}> hello")), &rec).await;
        assert_eq!(n, 1);
        let requests = rec.requests.lock().unwrap();
        assert_eq!(requests[0].text, "hello");
        assert_eq!(requests[0].thread_ts, "100.1"); // mention roots a new thread
    }

    #[tokio::test]
    async fn no_mention_no_response() {
        let chat = Arc::new(StubChat::default());
        let rec = Arc::new(Recorder::default());
        let r = router(true, chat, Arc::clone(&rec));
        assert_eq!(dispatched(&r, mention_event("just chatting"), &rec).await, 0);
    }

    #[tokio::test]
    async fn disallowed_channel_is_silent() {
        let chat = Arc::new(StubChat::default());
        let rec = Arc::new(Recorder::default());
        let r = router(true, chat, Arc::clone(&rec));
        let mut ev = mention_event(&format!("<@{BOT}> hi"));
        ev.channel = "C_OTHER".into();
        assert_eq!(dispatched(&r, ev, &rec).await, 0);
    }

    #[tokio::test]
    async fn duplicate_event_is_dropped() {
        let chat = Arc::new(StubChat::default());
        let rec = Arc::new(Recorder::default());
        let r = router(true, chat, Arc::clone(&rec));
        let ev = mention_event(&format!("<@{BOT}> hi"));
        assert_eq!(dispatched(&r, ev.clone(), &rec).await, 1);
        assert_eq!(dispatched(&r, ev, &rec).await, 1); // unchanged
    }

    #[tokio::test]
    async fn bot_own_message_is_ignored() {
        let chat = Arc::new(StubChat::default());
        let rec = Arc::new(Recorder::default());
        let r = router(true, chat, Arc::clone(&rec));
        let mut ev = mention_event(&format!("<@{BOT}> hi"));
        ev.user = BOT.into();
        assert_eq!(dispatched(&r, ev, &rec).await, 0);
    }

    #[tokio::test]
    async fn threaded_reply_needs_mention_in_root() {
        let chat = Arc::new(StubChat::default());
        chat.roots
            .lock()
            .unwrap()
            .insert("50.0".into(), format!("<@{BOT}> help"));
        chat.roots
            .lock()
            .unwrap()
            .insert("60.0".into(), "unrelated thread".into());
        let rec = Arc::new(Recorder::default());
        let r = router(true, Arc::clone(&chat), Arc::clone(&rec));

        // Root mentions the bot → reply is handled (no mention needed).
        let mut ev = mention_event("what about the attached image?");
        ev.thread_ts = Some("50.0".into());
        assert_eq!(dispatched(&r, ev, &rec).await, 1);

        // Root does not mention the bot → even an explicit mention in the
        // reply stays silent.
        let mut ev2 = mention_event(&format!("<@{BOT}> please answer"));
        ev2.ts = "100.2".into();
        ev2.thread_ts = Some("60.0".into());
        assert_eq!(dispatched(&r, ev2, &rec).await, 1); // unchanged
    }

    #[tokio::test]
    async fn dm_from_allowed_user_in_production() {
        let chat = Arc::new(StubChat::default());
        chat.im_channels.lock().unwrap().push("D123".into());
        let rec = Arc::new(Recorder::default());
        let r = router(false, Arc::clone(&chat), Arc::clone(&rec));

        let mut ev = mention_event("oi, tudo bem?"); // no mention needed in DMs
        ev.channel = "D123".into();
        ev.user = "U_ALLOWED".into();
        assert_eq!(dispatched(&r, ev, &rec).await, 1);
        assert!(rec.requests.lock().unwrap()[0].is_dm);
    }

    #[tokio::test]
    async fn dm_from_unknown_user_is_blocked() {
        let chat = Arc::new(StubChat::default());
        chat.im_channels.lock().unwrap().push("D123".into());
        let rec = Arc::new(Recorder::default());
        let r = router(false, Arc::clone(&chat), Arc::clone(&rec));
        let mut ev = mention_event("oi");
        ev.channel = "D123".into();
        ev.user = "U_STRANGER".into();
        assert_eq!(dispatched(&r, ev, &rec).await, 0);
    }

    #[tokio::test]
    async fn dm_audio_without_text_is_processed() {
        let chat = Arc::new(StubChat::default());
        chat.im_channels.lock().unwrap().push("D123".into());
        let rec = Arc::new(Recorder::default());
        let r = router(false, Arc::clone(&chat), Arc::clone(&rec));
        let mut ev = mention_event("");
        ev.channel = "D123".into();
        ev.user = "U_ALLOWED".into();
        ev.files = vec![FileRef {
            id: "F1".into(),
            name: "voz.ogg".into(),
            mimetype: "audio/ogg".into(),
            size: 1024,
            url_private: "https://files.slack.com/f/F1".into(),
        }];
        assert_eq!(dispatched(&r, ev, &rec).await, 1);
        assert_eq!(rec.requests.lock().unwrap()[0].audio.len(), 1);
    }

    #[tokio::test]
    async fn empty_event_without_audio_is_dropped() {
        let chat = Arc::new(StubChat::default());
        let rec = Arc::new(Recorder::default());
        let r = router(true, chat, Arc::clone(&rec));
        assert_eq!(dispatched(&r, mention_event("  "), &rec).await, 0);
    }

    #[tokio::test]
    async fn echo_phrases_are_dropped() {
        let chat = Arc::new(StubChat::default());
        let rec = Arc::new(Recorder::default());
        let r = router(true, chat, Arc::clone(&rec));
        let ev = mention_event(&format!("<@{BOT}> Encontrei o arquivo que você pediu"));
        assert_eq!(dispatched(&r, ev, &rec).await, 0);
    }

    #[tokio::test]
    async fn think_command_branches() {
        let chat = Arc::new(StubChat::default());
        let rec = Arc::new(Recorder::default());
        let r = router(true, chat, Arc::clone(&rec));
        let ev = mention_event(&format!("<@{BOT}> +think how should we roll this out?"));
        r.dispatch(ev).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(rec.requests.lock().unwrap().is_empty());
        assert_eq!(
            rec.thinks.lock().unwrap().as_slice(),
            ["how should we roll this out?"]
        );
    }
}
