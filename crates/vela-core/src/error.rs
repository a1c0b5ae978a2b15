use thiserror::Error;

/// Coarse failure classification shared by every crate in the workspace.
///
/// The class decides two things: whether the governor (and the orchestrator's
/// single top-level retry) may retry the operation, and which fixed
/// user-facing message gets edited into the placeholder. User-facing strings
/// are never model-generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connection reset, timeout, provider or platform rate-limit, 5xx.
    Transient,
    /// The model (or the mail service) rejected the request for length.
    ContextOverflow,
    /// Invalid credentials, missing scope, forbidden channel.
    Auth,
    /// Model or channel not found; schema rejection.
    NotFound,
    /// Out-of-memory or disk failure during media/document handling.
    Resource,
    /// Everything else. Logged with detail, surfaced generically.
    Internal,
}

impl ErrorClass {
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorClass::Transient)
    }

    /// Fixed user-facing message for this class. `owner` is the escalation
    /// handle appended to everything except the context-overflow case, which
    /// the user can resolve themselves by starting a new thread.
    pub fn user_message(self, owner: &str) -> String {
        match self {
            ErrorClass::Transient => {
                format!("Erro: Falha temporária na API. Se persistir entre em contato com: {owner}")
            }
            ErrorClass::ContextOverflow => {
                "Erro: Conversa muito longa. Comece uma nova thread.".to_string()
            }
            ErrorClass::Auth => {
                format!("Erro: Sem permissão. Se persistir entre em contato com: {owner}")
            }
            ErrorClass::NotFound => {
                format!("Erro: Recurso indisponível. Se persistir entre em contato com: {owner}")
            }
            ErrorClass::Resource => {
                format!("Erro: Recursos insuficientes. Se persistir entre em contato com: {owner}")
            }
            ErrorClass::Internal => {
                format!("Erro: Falha inesperada. Se persistir entre em contato com: {owner}")
            }
        }
    }
}

/// Implemented by every error type that crosses a crate boundary so the
/// governor and orchestrator can apply retry/messaging policy without
/// knowing the concrete error.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Heuristic classification from an error's rendered text, for errors that
/// arrive stringly-typed (gateway payloads, platform responses).
pub fn classify_message(msg: &str) -> ErrorClass {
    let lower = msg.to_lowercase();
    if lower.contains("context_length_exceeded") || lower.contains("maximum context") {
        ErrorClass::ContextOverflow
    } else if lower.contains("rate limit")
        || lower.contains("rate_limited")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("temporarily unavailable")
        || lower.contains("service unavailable")
    {
        ErrorClass::Transient
    } else if lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("invalid_auth")
        || lower.contains("missing_scope")
        || lower.contains("permission")
    {
        ErrorClass::Auth
    } else if lower.contains("not_found") || lower.contains("not found") {
        ErrorClass::NotFound
    } else if lower.contains("no space") || lower.contains("out of memory") {
        ErrorClass::Resource
    } else {
        ErrorClass::Internal
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for CoreError {
    fn class(&self) -> ErrorClass {
        match self {
            CoreError::Config(_) => ErrorClass::Internal,
            CoreError::Serialization(_) => ErrorClass::Internal,
            CoreError::Io(_) => ErrorClass::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
