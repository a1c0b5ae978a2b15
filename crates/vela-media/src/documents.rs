//! Document ingestion: upload attached documents to the provider file store
//! and bind them to an ephemeral per-thread vector index.
//!
//! Ingestion always completes before the agent is invoked on the same
//! request. Failure degrades gracefully — the agent proceeds without file
//! context and the user sees a note.

use std::io::Write;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use vela_core::types::FileRef;
use vela_slack::ChatClient;

use crate::error::{MediaError, Result};

const SUPPORTED_EXTENSIONS: &[&str] = &[".pdf", ".csv", ".xls", ".xlsx", ".doc", ".docx", ".txt"];

const SUPPORTED_MIMES: &[&str] = &[
    "application/pdf",
    "text/csv",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.google-apps.spreadsheet",
    "application/vnd.google-apps.document",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/msword",
    "text/plain",
];

/// Provider file-store surface used by the ingestor.
///
/// `create_vector_store` must create the index with a 1-day last-active
/// expiry — the engine never assumes persistence across restarts.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Upload a local file with purpose `assistants`; returns the file id.
    async fn upload_file(&self, path: &std::path::Path, file_name: &str) -> Result<String>;

    /// Create an ephemeral vector index and return its id.
    async fn create_vector_store(&self, name: &str) -> Result<String>;

    /// Attach uploaded file ids to an existing index.
    async fn add_files(&self, vector_store_id: &str, file_ids: &[String]) -> Result<()>;

    /// List file ids currently attached to an index.
    async fn list_files(&self, vector_store_id: &str) -> Result<Vec<String>>;
}

/// Result of a completed ingestion pass.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub vector_store_id: String,
    /// Names of the documents that made it into the index.
    pub uploaded_names: Vec<String>,
}

impl IngestOutcome {
    /// User-visible status line for the progress message.
    pub fn summary(&self) -> String {
        match self.uploaded_names.as_slice() {
            [] => "❌ Nenhum documento foi processado com sucesso.".to_string(),
            [one] => format!("Processado: {one}"),
            many => format!("Processados: {}", many.join(", ")),
        }
    }
}

/// Pick the supported documents out of an event's file list.
pub fn extract_document_files(files: &[FileRef]) -> Vec<FileRef> {
    files
        .iter()
        .filter(|f| is_supported_document(&f.mimetype, &f.name))
        .cloned()
        .collect()
}

fn is_supported_document(mimetype: &str, name: &str) -> bool {
    if SUPPORTED_MIMES.contains(&mimetype) {
        return true;
    }
    let lower = name.to_lowercase();
    // Compound suffixes like report.docx.pdf also count.
    SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Download, upload and index the given documents.
///
/// When `existing_store` is set the new file ids are appended to it;
/// otherwise a fresh index named `store_name` is created. Temp files are
/// removed on every exit path (NamedTempFile drops them).
pub async fn ingest_documents(
    chat: &dyn ChatClient,
    store: &dyn FileStore,
    documents: &[FileRef],
    existing_store: Option<&str>,
    store_name: &str,
) -> Result<IngestOutcome> {
    let mut file_ids = Vec::new();
    let mut uploaded_names = Vec::new();

    for doc in documents {
        match upload_one(chat, store, doc).await {
            Ok(file_id) => {
                info!(name = %doc.name, file_id, "document uploaded");
                file_ids.push(file_id);
                uploaded_names.push(doc.name.clone());
            }
            Err(e) => {
                warn!(name = %doc.name, error = %e, "document upload failed, skipping");
            }
        }
    }

    if file_ids.is_empty() {
        return Err(MediaError::Store("no documents could be uploaded".into()));
    }

    let vector_store_id = match existing_store {
        Some(id) => {
            store.add_files(id, &file_ids).await?;
            info!(vector_store_id = id, files = file_ids.len(), "appended to existing index");
            id.to_string()
        }
        None => {
            let id = store.create_vector_store(store_name).await?;
            store.add_files(&id, &file_ids).await?;
            info!(vector_store_id = %id, files = file_ids.len(), "created thread index");
            id
        }
    };

    Ok(IngestOutcome {
        vector_store_id,
        uploaded_names,
    })
}

async fn upload_one(
    chat: &dyn ChatClient,
    store: &dyn FileStore,
    doc: &FileRef,
) -> Result<String> {
    let bytes = chat.download(&doc.url_private).await?;

    let mut tmp = NamedTempFile::with_suffix(file_suffix(&doc.name))?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;

    store.upload_file(tmp.path(), &doc.name).await
}

fn file_suffix(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!(".{ext}"),
        _ => ".txt".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use vela_slack::error::Result as ChatResult;
    use vela_slack::types::{ThreadMessage, UserProfile};

    fn doc(name: &str, mime: &str) -> FileRef {
        FileRef {
            id: "F1".into(),
            name: name.into(),
            mimetype: mime.into(),
            size: 2 * 1024 * 1024,
            url_private: "https://files.slack.com/f/F1".into(),
        }
    }

    #[test]
    fn supported_by_mime_or_extension() {
        assert!(is_supported_document("application/pdf", "x"));
        assert!(is_supported_document("application/octet-stream", "notes.TXT"));
        assert!(is_supported_document("", "report.docx.pdf"));
        assert!(!is_supported_document("image/png", "pic.png"));
    }

    #[test]
    fn extraction_filters_unsupported() {
        let files = vec![doc("a.pdf", "application/pdf"), doc("b.png", "image/png")];
        let docs = extract_document_files(&files);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "a.pdf");
    }

    #[test]
    fn summary_formats() {
        let one = IngestOutcome {
            vector_store_id: "vs_1".into(),
            uploaded_names: vec!["a.pdf".into()],
        };
        assert_eq!(one.summary(), "Processado: a.pdf");
        let two = IngestOutcome {
            vector_store_id: "vs_1".into(),
            uploaded_names: vec!["a.pdf".into(), "b.csv".into()],
        };
        assert_eq!(two.summary(), "Processados: a.pdf, b.csv");
    }

    #[test]
    fn suffix_extraction() {
        assert_eq!(file_suffix("report.pdf"), ".pdf");
        assert_eq!(file_suffix("noext"), ".txt");
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
            Ok(b"content".to_vec())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        created: Mutex<Vec<String>>,
        attached: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl FileStore for RecordingStore {
        async fn upload_file(&self, path: &std::path::Path, _: &str) -> Result<String> {
            assert!(path.exists());
            Ok(format!("file-{}", self.created.lock().unwrap().len()))
        }
        async fn create_vector_store(&self, name: &str) -> Result<String> {
            self.created.lock().unwrap().push(name.to_string());
            Ok("vs_new".into())
        }
        async fn add_files(&self, vector_store_id: &str, file_ids: &[String]) -> Result<()> {
            self.attached
                .lock()
                .unwrap()
                .push((vector_store_id.to_string(), file_ids.to_vec()));
            Ok(())
        }
        async fn list_files(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn fresh_index_created_when_none_exists() {
        let store = RecordingStore::default();
        let outcome = ingest_documents(
            &StubChat,
            &store,
            &[doc("a.pdf", "application/pdf")],
            None,
            "Documentos - C1",
        )
        .await
        .unwrap();
        assert_eq!(outcome.vector_store_id, "vs_new");
        assert_eq!(store.created.lock().unwrap().as_slice(), ["Documentos - C1"]);
        assert_eq!(store.attached.lock().unwrap()[0].0, "vs_new");
    }

    #[tokio::test]
    async fn existing_index_is_appended() {
        let store = RecordingStore::default();
        let outcome = ingest_documents(
            &StubChat,
            &store,
            &[doc("a.pdf", "application/pdf")],
            Some("vs_old"),
            "ignored",
        )
        .await
        .unwrap();
        assert_eq!(outcome.vector_store_id, "vs_old");
        assert!(store.created.lock().unwrap().is_empty());
        assert_eq!(store.attached.lock().unwrap()[0].0, "vs_old");
    }

    #[tokio::test]
    async fn all_uploads_failing_is_an_error() {
        struct FailingStore;
        #[async_trait]
        impl FileStore for FailingStore {
            async fn upload_file(&self, _: &std::path::Path, _: &str) -> Result<String> {
                Err(MediaError::Store("upload rejected".into()))
            }
            async fn create_vector_store(&self, _: &str) -> Result<String> {
                unreachable!()
            }
            async fn add_files(&self, _: &str, _: &[String]) -> Result<()> {
                unreachable!()
            }
            async fn list_files(&self, _: &str) -> Result<Vec<String>> {
                Ok(Vec::new())
            }
        }
        let result = ingest_documents(
            &StubChat,
            &FailingStore,
            &[doc("a.pdf", "application/pdf")],
            None,
            "n",
        )
        .await;
        assert!(result.is_err());
    }
}
