//! Media adapters: image extraction and pre-fetch, audio transcription,
//! and the document-ingestion sub-pipeline feeding per-thread vector
//! indices.

pub mod audio;
pub mod documents;
pub mod error;
pub mod images;

pub use error::MediaError;
