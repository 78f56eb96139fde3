//! Ollama API client
//!
//! HTTP entry point for every endpoint: generation, chat, embeddings, and
//! model management. Non-streaming calls return the parsed response
//! directly; streaming calls hand back a [`ResponseStream`] fed by a
//! background session task.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{OllamaError, Result};
use crate::host;
use crate::streaming::{session, ResponseStream};
use crate::types::{
    ChatRequest, ChatResponse, CopyModelRequest, CreateModelRequest, DeleteModelRequest,
    EmbeddingsRequest, EmbeddingsResponse, GenerateRequest, GenerateResponse, ListModelsResponse,
    ProgressResponse, PullModelRequest, PushModelRequest, ShowModelRequest, ShowModelResponse,
    StatusResponse, VersionResponse,
};

/// Default request timeout, covering the whole exchange including the body.
/// Long-running streams (large pulls, slow models) should raise it via
/// [`ClientBuilder::timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Asynchronous Ollama API client
///
/// Cheap to clone: the underlying connection pool is shared between clones
/// and across concurrent calls, while every streaming call owns its own
/// response body and decoder state.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    headers: HeaderMap,
}

impl OllamaClient {
    /// Create a client for the host in `OLLAMA_HOST`, falling back to the
    /// local loopback default.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a client for an explicit host.
    pub fn with_host(host: &str) -> Result<Self> {
        Self::builder().host(host).build()
    }

    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The resolved base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate a completion, waiting for the full response.
    pub async fn generate(&self, mut request: GenerateRequest) -> Result<GenerateResponse> {
        validate_model(&request.model)?;
        request.stream = false;
        self.execute(self.request(Method::POST, "/api/generate").json(&request))
            .await
    }

    /// Stream a completion fragment by fragment.
    pub fn generate_stream(&self, mut request: GenerateRequest) -> ResponseStream<GenerateResponse> {
        if let Err(err) = validate_model(&request.model) {
            return session::reject(err);
        }
        request.stream = true;
        session::spawn(self.request(Method::POST, "/api/generate").json(&request))
    }

    /// Run a chat exchange, waiting for the full response.
    pub async fn chat(&self, mut request: ChatRequest) -> Result<ChatResponse> {
        validate_model(&request.model)?;
        request.stream = false;
        self.execute(self.request(Method::POST, "/api/chat").json(&request))
            .await
    }

    /// Stream a chat response message by message.
    pub fn chat_stream(&self, mut request: ChatRequest) -> ResponseStream<ChatResponse> {
        if let Err(err) = validate_model(&request.model) {
            return session::reject(err);
        }
        request.stream = true;
        session::spawn(self.request(Method::POST, "/api/chat").json(&request))
    }

    /// Generate an embedding vector for a prompt.
    pub async fn embeddings(&self, request: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        validate_model(&request.model)?;
        self.execute(self.request(Method::POST, "/api/embeddings").json(&request))
            .await
    }

    /// Create a model from a Modelfile, waiting for the final status.
    pub async fn create_model(&self, mut request: CreateModelRequest) -> Result<ProgressResponse> {
        validate_name(&request.name)?;
        request.stream = false;
        self.execute(self.request(Method::POST, "/api/create").json(&request))
            .await
    }

    /// Create a model, streaming progress records.
    pub fn create_model_stream(
        &self,
        mut request: CreateModelRequest,
    ) -> ResponseStream<ProgressResponse> {
        if let Err(err) = validate_name(&request.name) {
            return session::reject(err);
        }
        request.stream = true;
        session::spawn(self.request(Method::POST, "/api/create").json(&request))
    }

    /// Pull a model from a registry, waiting for the final status.
    pub async fn pull_model(&self, mut request: PullModelRequest) -> Result<ProgressResponse> {
        validate_name(&request.name)?;
        request.stream = false;
        self.execute(self.request(Method::POST, "/api/pull").json(&request))
            .await
    }

    /// Pull a model, streaming download progress.
    pub fn pull_model_stream(
        &self,
        mut request: PullModelRequest,
    ) -> ResponseStream<ProgressResponse> {
        if let Err(err) = validate_name(&request.name) {
            return session::reject(err);
        }
        request.stream = true;
        session::spawn(self.request(Method::POST, "/api/pull").json(&request))
    }

    /// Push a model to a registry, waiting for the final status.
    pub async fn push_model(&self, mut request: PushModelRequest) -> Result<ProgressResponse> {
        validate_name(&request.name)?;
        request.stream = false;
        self.execute(self.request(Method::POST, "/api/push").json(&request))
            .await
    }

    /// Push a model, streaming upload progress.
    pub fn push_model_stream(
        &self,
        mut request: PushModelRequest,
    ) -> ResponseStream<ProgressResponse> {
        if let Err(err) = validate_name(&request.name) {
            return session::reject(err);
        }
        request.stream = true;
        session::spawn(self.request(Method::POST, "/api/push").json(&request))
    }

    /// List installed models.
    pub async fn list_models(&self) -> Result<ListModelsResponse> {
        self.execute(self.request(Method::GET, "/api/tags")).await
    }

    /// Show details for one model.
    pub async fn show_model(&self, request: ShowModelRequest) -> Result<ShowModelResponse> {
        validate_name(&request.name)?;
        self.execute(self.request(Method::POST, "/api/show").json(&request))
            .await
    }

    /// Copy a model under a new name.
    pub async fn copy_model(&self, request: CopyModelRequest) -> Result<StatusResponse> {
        if request.source.trim().is_empty() || request.destination.trim().is_empty() {
            return Err(OllamaError::InvalidRequest(
                "source and destination are required".to_string(),
            ));
        }
        self.execute(self.request(Method::POST, "/api/copy").json(&request))
            .await
    }

    /// Delete a model.
    pub async fn delete_model(&self, request: DeleteModelRequest) -> Result<StatusResponse> {
        validate_name(&request.name)?;
        self.execute(self.request(Method::DELETE, "/api/delete").json(&request))
            .await
    }

    /// Report the server version.
    pub async fn version(&self) -> Result<VersionResponse> {
        self.execute(self.request(Method::GET, "/api/version")).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .headers(self.headers.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }
}

/// Configuration for an [`OllamaClient`]
#[derive(Debug, Default)]
pub struct ClientBuilder {
    host: Option<String>,
    timeout: Option<Duration>,
    headers: HeaderMap,
    http: Option<Client>,
}

impl ClientBuilder {
    /// Set the server host; accepts anything [`host::resolve_host`] does.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Override the request timeout. Ignored when a custom HTTP client is
    /// supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a static header sent with every request.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| OllamaError::InvalidRequest(format!("invalid header name: {}", err)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| OllamaError::InvalidRequest(format!("invalid header value: {}", err)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Use a caller-provided `reqwest` client, sharing its connection pool.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn build(self) -> Result<OllamaClient> {
        let base_url = match self.host {
            Some(host) => host::resolve_host(&host),
            None => host::host_from_env(),
        };

        let mut headers = default_headers();
        headers.extend(self.headers);

        let http = match self.http {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()?,
        };

        debug!(%base_url, "ollama client configured");
        Ok(OllamaClient {
            http,
            base_url,
            headers,
        })
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let agent = format!(
        "ollama-client/{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    );
    if let Ok(value) = HeaderValue::from_str(&agent) {
        headers.insert(USER_AGENT, value);
    }
    headers
}

fn validate_model(model: &str) -> Result<()> {
    if model.trim().is_empty() {
        return Err(OllamaError::InvalidRequest("model is required".to_string()));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(OllamaError::InvalidRequest(
            "model name is required".to_string(),
        ));
    }
    Ok(())
}

/// Turn a non-success response into an [`OllamaError::Api`].
///
/// The server usually reports failures as `{"error": "<message>"}`; the raw
/// body text is the fallback when it does not.
pub(crate) async fn api_error(response: reqwest::Response) -> OllamaError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    OllamaError::Api {
        status,
        message: extract_error_message(body),
    }
}

fn extract_error_message(body: String) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }

    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) if !parsed.error.is_empty() => parsed.error,
        _ => body,
    }
}
