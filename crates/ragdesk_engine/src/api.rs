use ragdesk_logging::desk_debug;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use url::Url;

use crate::settings::ClientSettings;
use crate::upload::UploadRequest;
use crate::wire::{
    ChatAnswer, ChatQuery, Conversation, ConversationTitle, ErrorBody, FeedbackReceipt,
    FeedbackRequest, IngestReceipt, StatusReport, StoredMessage, SyncRun, UserProfile,
};
use crate::{ApiError, EngineError, FailureKind};

/// Remote endpoints the coordination layer consumes.
#[async_trait::async_trait]
pub trait BackendApi: Send + Sync {
    async fn chat(&self, query: &ChatQuery) -> Result<ChatAnswer, ApiError>;

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    async fn create_conversation(&self) -> Result<Conversation, ApiError>;

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<Conversation, ApiError>;

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, ApiError>;

    async fn upload_document(&self, request: &UploadRequest) -> Result<IngestReceipt, ApiError>;

    async fn document_status(&self, task_id: &str) -> Result<StatusReport, ApiError>;

    async fn submit_feedback(&self, feedback: &FeedbackRequest)
        -> Result<FeedbackReceipt, ApiError>;

    /// Queues a sync of the integration's source. The run carries the task id
    /// to poll.
    async fn start_integration_sync(&self, integration_id: &str) -> Result<SyncRun, ApiError>;

    /// Sync runs of the integration, newest first.
    async fn integration_sync_runs(&self, integration_id: &str) -> Result<Vec<SyncRun>, ApiError>;

    async fn current_user(&self) -> Result<UserProfile, ApiError>;
}

/// [`BackendApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
    base_url: Url,
    access_token: Option<String>,
}

impl ReqwestBackend {
    pub fn new(settings: &ClientSettings) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| EngineError::Client(err.to_string()))?;
        Ok(Self::with_client(
            client,
            settings.base_url.clone(),
            settings.access_token.clone(),
        ))
    }

    /// Reuses an existing client, e.g. to share its connection pool.
    pub fn with_client(
        client: reqwest::Client,
        base_url: Url,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url,
            access_token,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let request = self
            .authorized(request)
            .build()
            .map_err(map_reqwest_error)?;
        desk_debug!("{} {}", request.method(), request.url());
        let response = self
            .client
            .execute(request)
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))
    }
}

#[async_trait::async_trait]
impl BackendApi for ReqwestBackend {
    async fn chat(&self, query: &ChatQuery) -> Result<ChatAnswer, ApiError> {
        let url = self.endpoint("chat")?;
        self.send(self.client.post(url).json(query)).await
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoint("conversations")?;
        self.send(self.client.get(url)).await
    }

    async fn create_conversation(&self) -> Result<Conversation, ApiError> {
        let url = self.endpoint("conversations")?;
        let body = ConversationTitle { title: None };
        self.send(self.client.post(url).json(&body)).await
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<Conversation, ApiError> {
        let url = self.endpoint(&format!("conversations/{conversation_id}"))?;
        let body = ConversationTitle { title: Some(title) };
        self.send(self.client.put(url).json(&body)).await
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let url = self.endpoint(&format!("conversations/{conversation_id}/messages"))?;
        self.send(self.client.get(url)).await
    }

    async fn upload_document(&self, request: &UploadRequest) -> Result<IngestReceipt, ApiError> {
        let url = self.endpoint("documents/upload")?;
        let metadata = serde_json::to_string(&request.metadata)
            .map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))?;
        let principals = serde_json::to_string(&request.allowed_principals)
            .map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))?;

        let mut file = Part::bytes(request.contents.to_vec()).file_name(request.filename.clone());
        if let Some(content_type) = &request.content_type {
            file = file
                .mime_str(content_type)
                .map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))?;
        }
        let mut form = Form::new()
            .part("file", file)
            .text("metadata", metadata)
            .text("allowed_principals", principals);
        if let Some(source) = &request.source {
            form = form.text("source", source.clone());
        }

        self.send(self.client.post(url).multipart(form)).await
    }

    async fn document_status(&self, task_id: &str) -> Result<StatusReport, ApiError> {
        let url = self.endpoint(&format!("documents/status/{task_id}"))?;
        self.send(self.client.get(url)).await
    }

    async fn submit_feedback(
        &self,
        feedback: &FeedbackRequest,
    ) -> Result<FeedbackReceipt, ApiError> {
        let url = self.endpoint("feedback")?;
        self.send(self.client.post(url).json(feedback)).await
    }

    async fn start_integration_sync(&self, integration_id: &str) -> Result<SyncRun, ApiError> {
        let url = self.endpoint(&format!("integrations/{integration_id}/sync"))?;
        self.send(self.client.post(url)).await
    }

    async fn integration_sync_runs(&self, integration_id: &str) -> Result<Vec<SyncRun>, ApiError> {
        let url = self.endpoint(&format!("integrations/{integration_id}/sync"))?;
        self.send(self.client.get(url)).await
    }

    async fn current_user(&self) -> Result<UserProfile, ApiError> {
        let url = self.endpoint("auth/me")?;
        self.send(self.client.get(url)).await
    }
}

/// Returns the response unchanged on success; otherwise an error carrying
/// the backend's `detail` text, or the raw body when there is none.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body,
    };
    Err(ApiError::new(FailureKind::HttpStatus(status.as_u16()), message))
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_builder() {
        return ApiError::new(FailureKind::InvalidUrl, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}
