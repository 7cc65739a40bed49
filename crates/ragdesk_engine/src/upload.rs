use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use bytes::Bytes;
use ragdesk_logging::{desk_info, desk_warn};

use crate::api::BackendApi;
use crate::wire::IngestReceipt;

/// A document to hand to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub filename: String,
    pub contents: Bytes,
    pub content_type: Option<String>,
    pub source: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub allowed_principals: Vec<String>,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            contents: contents.into(),
            content_type: None,
            source: None,
            metadata: BTreeMap::new(),
            allowed_principals: Vec::new(),
        }
    }

    /// Reads `path` into memory and guesses a content type from its extension.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let contents = fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mut request = Self::new(filename, contents);
        request.content_type = guess_content_type(path).map(ToOwned::to_owned);
        Ok(request)
    }

    pub fn with_principals(mut self, principals: Vec<String>) -> Self {
        self.allowed_principals = principals;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Name shown to the user for the job this upload creates.
    pub fn label(&self) -> &str {
        &self.filename
    }
}

/// Result of an upload, consumed directly by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(IngestReceipt),
    Failed { message: String },
}

/// Uploads a document for ingestion. Never fails with an error value: every
/// failure is folded into [`UploadOutcome::Failed`].
pub async fn upload(api: &dyn BackendApi, request: &UploadRequest) -> UploadOutcome {
    if request.contents.is_empty() {
        return UploadOutcome::Failed {
            message: format!("{} is empty", request.filename),
        };
    }
    match api.upload_document(request).await {
        Ok(receipt) => {
            desk_info!(
                "Upload accepted file={} task_id={} document_id={}",
                request.filename,
                receipt.task_id,
                receipt.document_id
            );
            UploadOutcome::Uploaded(receipt)
        }
        Err(err) => {
            desk_warn!("Upload failed file={}: {}", request.filename, err);
            UploadOutcome::Failed {
                message: err.to_string(),
            }
        }
    }
}

fn guess_content_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match extension.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    };
    Some(content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(guess_content_type(Path::new("a/b.PDF")), Some("application/pdf"));
        assert_eq!(guess_content_type(Path::new("notes.md")), Some("text/markdown"));
        assert_eq!(guess_content_type(Path::new("archive.tar.gz")), None);
        assert_eq!(guess_content_type(Path::new("README")), None);
    }
}
