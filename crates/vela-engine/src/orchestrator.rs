//! Orchestrator: ties the router's requests to the pre-processing steps,
//! the routed pipelines and the presenter.
//!
//! Sequence per request: handler permit → placeholder → audio transcription
//! → document ingestion → image pre-fetch → thread history → route/run →
//! finalize. Exactly one top-level retry for transient failures; fixed
//! pt-BR error strings otherwise.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use vela_agent::processor::ProcessSpec;
use vela_agent::tags::{format_tags, initial_tags};
use vela_agent::{AgentRuntime, PipelineResult, ProviderError};
use vela_core::config::AgentConfig;
use vela_core::error::{Classify, ErrorClass};
use vela_core::types::Request;
use vela_media::audio::{transcribe_all, Transcriber};
use vela_media::documents::{ingest_documents, FileStore};
use vela_media::images::prefetch_images;
use vela_media::MediaError;
use vela_slack::{ChatClient, ChatError};

use crate::context::{count_tokens, ContextAssembler};
use crate::presenter::{Presenter, PLACEHOLDER_TEXT};
use crate::router::RequestHandler;
use crate::state::EngineState;
use crate::thinkflow;

/// Wait before the single top-level retry.
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

impl Classify for HandleError {
    fn class(&self) -> ErrorClass {
        match self {
            HandleError::Provider(e) => e.class(),
            HandleError::Chat(e) => e.class(),
            HandleError::Media(e) => e.class(),
        }
    }
}

pub struct Orchestrator {
    chat: Arc<dyn ChatClient>,
    runtime: AgentRuntime,
    transcriber: Arc<dyn Transcriber>,
    file_store: Arc<dyn FileStore>,
    assembler: ContextAssembler,
    state: Arc<EngineState>,
    models: AgentConfig,
    owner_handle: String,
    /// Process-wide back-pressure on event handling.
    handler_sem: Semaphore,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat: Arc<dyn ChatClient>,
        runtime: AgentRuntime,
        transcriber: Arc<dyn Transcriber>,
        file_store: Arc<dyn FileStore>,
        state: Arc<EngineState>,
        models: AgentConfig,
        owner_handle: String,
    ) -> Self {
        let assembler = ContextAssembler::new(Arc::clone(&chat));
        let handler_sem = Semaphore::new(models.max_concurrency);
        Self {
            chat,
            runtime,
            transcriber,
            file_store,
            assembler,
            state,
            models,
            owner_handle,
            handler_sem,
        }
    }

    fn effective_model(&self, request: &Request) -> String {
        if let Some(m) = &request.model_override {
            return m.clone();
        }
        if request.image_urls.is_empty() {
            self.models.text_model.clone()
        } else {
            self.models.vision_model.clone()
        }
    }

    async fn run(&self, request: &Request) {
        let _permit = self
            .handler_sem
            .acquire()
            .await
            .expect("handler semaphore never closed");

        let has_audio = !request.audio.is_empty();
        let has_images = !request.image_urls.is_empty();
        let header = format_tags(&initial_tags(
            &request.text,
            has_audio,
            has_images,
            &self.models,
        ));

        // The one message this request owns; everything else is an edit.
        let placeholder = format!("{header}\n\n{PLACEHOLDER_TEXT}");
        let message_ts = match self
            .chat
            .post_message(&request.channel, Some(&request.thread_ts), &placeholder)
            .await
        {
            Ok(ts) => ts,
            Err(e) => {
                error!(correlation = %request.id, error = %e, "placeholder post failed");
                return;
            }
        };

        let presenter = Presenter::new(
            Arc::clone(&self.chat),
            request.channel.clone(),
            message_ts,
            header,
            request.text.clone(),
            has_images,
            has_audio,
            self.models.clone(),
        );

        let mut outcome = self.run_once(request, &presenter).await;
        if let Err(e) = &outcome {
            if e.class().is_transient() {
                info!(correlation = %request.id, error = %e, "transient failure, retrying once");
                tokio::time::sleep(RETRY_DELAY).await;
                outcome = self.run_once(request, &presenter).await;
            }
        }

        match outcome {
            Ok((result, context_input)) => {
                self.finish(request, &presenter, result, &context_input).await;
            }
            Err(e) => {
                error!(correlation = %request.id, error = %e, "request failed");
                presenter.fail(&e.class().user_message(&self.owner_handle)).await;
            }
        }
    }

    /// One full pre-process → route → run pass. Returns the pipeline result
    /// together with the assembled context (for token estimation).
    async fn run_once(
        &self,
        request: &Request,
        presenter: &Presenter,
    ) -> Result<(PipelineResult, String), HandleError> {
        let mut context_input = request.text.clone();

        // Audio first: transcriptions become part of the prompt.
        if !request.audio.is_empty() {
            let lines = transcribe_all(
                self.chat.as_ref(),
                self.transcriber.as_ref(),
                &request.audio,
            )
            .await;
            let block = lines.join("\n\n");
            context_input = if context_input.is_empty() {
                block
            } else {
                format!("{context_input}\n\n{block}")
            };
        }

        // Documents must be indexed before the agent runs.
        if !request.documents.is_empty() {
            let note = self.ingest(request, presenter).await;
            if !context_input.is_empty() {
                context_input = format!("{context_input}\n\n{note}");
            } else {
                context_input = note;
            }
        }

        // Images are pre-fetched so the vision endpoint can load them.
        let image_urls = prefetch_images(self.chat.as_ref(), &request.image_urls).await;

        // Thread history, fail-soft.
        let model = self.effective_model(request);
        if let Some(history) = self
            .assembler
            .fetch_thread_history(&request.channel, &request.thread_ts, &model)
            .await
        {
            context_input = format!("{history}\n\nLatest message: {context_input}");
        }

        let vector_store = self.state.vector_store(&request.thread_key());
        let spec = ProcessSpec {
            text: &context_input,
            routing_text: &request.text,
            image_urls: &image_urls,
            vector_store_id: vector_store.as_deref(),
            model_override: request.model_override.as_deref(),
        };

        let result = self.runtime.process(&spec, presenter).await?;
        Ok((result, context_input))
    }

    /// Ingest attached documents; the placeholder doubles as the progress
    /// display. Returns the context note for the model (success or
    /// graceful-degradation).
    async fn ingest(&self, request: &Request, presenter: &Presenter) -> String {
        let _ = self
            .chat
            .update_message(
                &request.channel,
                presenter.message_ts(),
                "📄 Processando documentos...",
            )
            .await;

        let thread_key = request.thread_key();
        let existing = self.state.vector_store(&thread_key);
        let outcome = ingest_documents(
            self.chat.as_ref(),
            self.file_store.as_ref(),
            &request.documents,
            existing.as_deref(),
            &format!("Documentos - {}", request.channel),
        )
        .await;

        match outcome {
            Ok(outcome) => {
                self.state
                    .set_vector_store(&thread_key, &outcome.vector_store_id);
                info!(
                    correlation = %request.id,
                    vector_store = %outcome.vector_store_id,
                    files = outcome.uploaded_names.len(),
                    "documents indexed"
                );
                let _ = self
                    .chat
                    .update_message(
                        &request.channel,
                        presenter.message_ts(),
                        &format!("{}\n\n{PLACEHOLDER_TEXT}", outcome.summary()),
                    )
                    .await;
                format!(
                    "📄 O usuário enviou {} documento(s): {}. Os documentos foram processados e estão disponíveis para consulta via file_search.",
                    outcome.uploaded_names.len(),
                    outcome.uploaded_names.join(", ")
                )
            }
            Err(e) => {
                warn!(correlation = %request.id, error = %e, "document ingestion failed");
                "O usuário enviou documentos, mas houve erro no processamento.".to_string()
            }
        }
    }

    async fn finish(
        &self,
        request: &Request,
        presenter: &Presenter,
        result: PipelineResult,
        context_input: &str,
    ) {
        let model = self.effective_model(request);
        let total_tokens = if result.usage.is_reported() {
            result.usage.total() as u64
        } else {
            (count_tokens(context_input) + count_tokens(&result.text)) as u64
        };
        let warning = self
            .state
            .memory_warning(&request.thread_key(), total_tokens, &model)
            .unwrap_or("");

        info!(
            correlation = %request.id,
            model = %model,
            chars = result.text.len(),
            tokens = total_tokens,
            tools = result.tool_calls.len(),
            "sending final response"
        );

        presenter.finalize(&result.text, warning).await;

        if let Some(image) = &result.generated_image {
            self.deliver_image(request, &image.b64, image.revised_prompt.as_deref())
                .await;
        }
    }

    /// Write a generated image payload to a temp file and upload it into
    /// the thread. The temp file is released on every exit path.
    async fn deliver_image(&self, request: &Request, b64: &str, revised_prompt: Option<&str>) {
        let bytes = match base64::engine::general_purpose::STANDARD.decode(b64) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "generated image payload is not valid base64");
                return;
            }
        };
        let tmp = match tempfile::Builder::new().suffix(".png").tempfile() {
            Ok(mut f) => match f.write_all(&bytes).and_then(|_| f.flush()) {
                Ok(()) => f,
                Err(e) => {
                    warn!(error = %e, "temp image write failed");
                    return;
                }
            },
            Err(e) => {
                warn!(error = %e, "temp image create failed");
                return;
            }
        };

        if let Err(e) = self
            .chat
            .upload_file(
                &request.channel,
                tmp.path(),
                revised_prompt,
                None,
                Some(&request.thread_ts),
            )
            .await
        {
            warn!(error = %e, "generated image upload failed");
        }
    }
}

#[async_trait]
impl RequestHandler for Orchestrator {
    async fn handle(&self, request: Request) {
        self.run(&request).await;
    }

    async fn handle_think(&self, channel: &str, thread_ts: &str, is_dm: bool, prompt: &str) {
        let _permit = self
            .handler_sem
            .acquire()
            .await
            .expect("handler semaphore never closed");
        thinkflow::run(
            self.chat.as_ref(),
            &self.runtime,
            &self.assembler,
            &self.state,
            &self.models,
            &self.owner_handle,
            channel,
            thread_ts,
            is_dm,
            prompt,
        )
        .await;
    }
}
