//! Request execution engine
//!
//! [`RequestManager`] owns the pooled HTTP client and runs every request the
//! client issues. Each operation exists twice: as an `async fn` returning the
//! outcome, and as a `perform_*` method that spawns the work on the runtime
//! and delivers progress and completion through the [`CallbackContext`].
//! Dropping the manager signals shutdown; spawned work still in flight stops
//! and reports nothing further.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use usergrid_core::{
    AppAuth, AssetUploadRequest, ClientConfig, ErrorKind, HttpMethod, NextPageLoader,
    PreparedRequest, ResponseError, TokenResponse, TypeRegistry, UserAuth, UsergridAsset,
    UsergridRequest, UsergridResponse, UsergridUser,
};

use crate::callback::CallbackContext;
use crate::transfer::{Completion, ProgressCallback, TransferId, TransferRegistry};
use crate::Result;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
/// Upper bound on buffer space reserved up front from a `Content-Length`
const MAX_PREALLOCATION: u64 = 1 << 20;
const DEFAULT_DOWNLOAD_CONTENT_TYPE: &str = "application/octet-stream";

pub type DownloadResult = std::result::Result<UsergridAsset, ResponseError>;

/// Result of a `password` grant
#[derive(Debug, Clone)]
pub struct UserAuthOutcome {
    /// The credential, updated in place when the grant succeeded
    pub auth: UserAuth,
    pub user: Option<UsergridUser>,
    pub response: UsergridResponse,
}

/// Result of a `client_credentials` grant
#[derive(Debug, Clone)]
pub struct AppAuthOutcome {
    pub auth: AppAuth,
    pub response: UsergridResponse,
}

struct ManagerInner {
    http: reqwest::Client,
    registry: Arc<RwLock<TypeRegistry>>,
    callbacks: CallbackContext,
    downloads: TransferRegistry<DownloadResult>,
    uploads: TransferRegistry<UsergridResponse>,
    token_margin_secs: i64,
}

pub struct RequestManager {
    inner: Arc<ManagerInner>,
    runtime: Handle,
    shutdown: watch::Sender<bool>,
}

impl RequestManager {
    pub fn new(
        config: &ClientConfig,
        registry: Arc<RwLock<TypeRegistry>>,
        callbacks: CallbackContext,
        runtime: Handle,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let (shutdown, _) = watch::channel(false);

        info!("Request manager ready for {}", config.app_url());

        Ok(Self {
            inner: Arc::new(ManagerInner {
                http,
                registry,
                callbacks,
                downloads: TransferRegistry::new(),
                uploads: TransferRegistry::new(),
                token_margin_secs: config.token_expiry_margin_secs,
            }),
            runtime,
            shutdown,
        })
    }

    pub fn callbacks(&self) -> &CallbackContext {
        &self.inner.callbacks
    }

    /// Transfers that have not completed yet
    pub fn active_transfers(&self) -> usize {
        self.inner.downloads.active() + self.inner.uploads.active()
    }

    // ----- async operations -----

    pub async fn send(&self, request: UsergridRequest) -> UsergridResponse {
        self.inner.send(request).await
    }

    /// Send a query request; the response can load the following pages
    pub async fn send_paged(&self, request: UsergridRequest) -> UsergridResponse {
        paged(self.inner.clone(), request).await
    }

    pub async fn authenticate_user(&self, request: UsergridRequest, auth: UserAuth) -> UserAuthOutcome {
        self.inner.authenticate_user(request, auth).await
    }

    pub async fn authenticate_app(&self, request: UsergridRequest, auth: AppAuth) -> AppAuthOutcome {
        self.inner.authenticate_app(request, auth).await
    }

    pub async fn download_asset(
        &self,
        request: UsergridRequest,
        progress: Option<ProgressCallback>,
    ) -> DownloadResult {
        let id = self.inner.downloads.register(progress, None);
        let _guard = self.inner.downloads.finish_on_drop(id);
        self.inner.download(id, request).await
    }

    pub async fn upload_asset(
        &self,
        request: AssetUploadRequest,
        progress: Option<ProgressCallback>,
    ) -> UsergridResponse {
        let id = self.inner.uploads.register(progress, None);
        let _guard = self.inner.uploads.finish_on_drop(id);
        self.inner.upload(id, request).await
    }

    // ----- callback operations -----

    pub fn perform_request<F>(&self, request: UsergridRequest, completion: F)
    where
        F: FnOnce(UsergridResponse) + Send + 'static,
    {
        let inner = self.inner.clone();
        self.spawn_with_completion(async move { inner.send(request).await }, completion);
    }

    /// Runs a `password` grant. The credential is moved in and handed back,
    /// updated, in the completion.
    pub fn perform_user_auth_request<F>(&self, request: UsergridRequest, auth: UserAuth, completion: F)
    where
        F: FnOnce(UserAuthOutcome) + Send + 'static,
    {
        let inner = self.inner.clone();
        self.spawn_with_completion(
            async move { inner.authenticate_user(request, auth).await },
            completion,
        );
    }

    pub fn perform_app_auth_request<F>(&self, request: UsergridRequest, auth: AppAuth, completion: F)
    where
        F: FnOnce(AppAuthOutcome) + Send + 'static,
    {
        let inner = self.inner.clone();
        self.spawn_with_completion(
            async move { inner.authenticate_app(request, auth).await },
            completion,
        );
    }

    pub fn perform_asset_download<F>(
        &self,
        request: UsergridRequest,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> TransferId
    where
        F: FnOnce(DownloadResult) + Send + 'static,
    {
        let completion: Completion<DownloadResult> = Box::new(completion);
        let id = self.inner.downloads.register(progress, Some(completion));
        let inner = self.inner.clone();
        let mut shutdown = self.shutdown.subscribe();

        self.runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => {
                    inner.downloads.finish(id);
                    debug!("Download {} cancelled by shutdown", id);
                }
                result = inner.download(id, request) => {
                    if let Some(completion) = inner.downloads.finish(id) {
                        inner.callbacks.dispatch(move || completion(result));
                    }
                }
            }
        });
        id
    }

    pub fn perform_asset_upload<F>(
        &self,
        request: AssetUploadRequest,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> TransferId
    where
        F: FnOnce(UsergridResponse) + Send + 'static,
    {
        let completion: Completion<UsergridResponse> = Box::new(completion);
        let id = self.inner.uploads.register(progress, Some(completion));
        let inner = self.inner.clone();
        let mut shutdown = self.shutdown.subscribe();

        self.runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => {
                    inner.uploads.finish(id);
                    debug!("Upload {} cancelled by shutdown", id);
                }
                response = inner.upload(id, request) => {
                    if let Some(completion) = inner.uploads.finish(id) {
                        inner.callbacks.dispatch(move || completion(response));
                    }
                }
            }
        });
        id
    }

    fn spawn_with_completion<T, Fut, F>(&self, work: Fut, completion: F)
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let callbacks = self.inner.callbacks.clone();
        let mut shutdown = self.shutdown.subscribe();

        self.runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("Request cancelled by shutdown");
                }
                outcome = work => {
                    callbacks.dispatch(move || completion(outcome));
                }
            }
        });
    }
}

impl Drop for RequestManager {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        debug!("Request manager shut down");
    }
}

impl std::fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestManager")
            .field("active_transfers", &self.active_transfers())
            .finish_non_exhaustive()
    }
}

fn paged(inner: Arc<ManagerInner>, request: UsergridRequest) -> BoxFuture<'static, UsergridResponse> {
    Box::pin(async move {
        let response = inner.send(request.clone()).await;
        let Some(query) = request.query_ref().cloned() else {
            return response;
        };
        if !response.has_next_page() {
            return response;
        }

        let loader: NextPageLoader = Arc::new(move |cursor: String| {
            let next = if query.is_raw() {
                request.clone().set_query_param("cursor", cursor)
            } else {
                request.clone().query(query.clone().cursor(Some(cursor)))
            };
            paged(inner.clone(), next)
        });
        response.with_next_page(loader)
    })
}

impl ManagerInner {
    async fn execute(&self, prepared: PreparedRequest) -> reqwest::Result<reqwest::Response> {
        let mut builder = self.builder(&prepared);
        if let Some(body) = prepared.body {
            builder = builder.body(body);
        }
        builder.send().await
    }

    fn builder(&self, prepared: &PreparedRequest) -> reqwest::RequestBuilder {
        debug!("{} {}", prepared.method, prepared.url);
        let method = match prepared.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.http.request(method, &prepared.url);
        for (name, value) in &prepared.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    fn parse(&self, status: u16, body: &[u8]) -> UsergridResponse {
        match self.registry.read() {
            Ok(registry) => UsergridResponse::from_http(status, body, &registry),
            Err(_) => UsergridResponse::from_http(status, body, &TypeRegistry::new()),
        }
    }

    async fn read_response(&self, response: reqwest::Response) -> UsergridResponse {
        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => self.parse(status, &body),
            Err(e) => {
                let mut failed = UsergridResponse::from_error(ResponseError::transport(e.to_string()));
                failed.status = Some(status);
                failed
            }
        }
    }

    async fn send(&self, request: UsergridRequest) -> UsergridResponse {
        match self.execute(request.build()).await {
            Ok(response) => self.read_response(response).await,
            Err(e) => {
                warn!("Request failed: {}", e);
                UsergridResponse::from_error(ResponseError::transport(e.to_string()))
            }
        }
    }

    /// Send a grant and pull the token out of a successful response
    async fn grant(&self, request: UsergridRequest) -> (UsergridResponse, Option<TokenResponse>) {
        let mut response = self.send(request).await;
        if !response.ok() {
            return (response, None);
        }
        let token = response
            .json
            .clone()
            .and_then(|json| serde_json::from_value::<TokenResponse>(json).ok());
        if token.is_none() {
            response.error = Some(ResponseError::malformed(
                "token response has no access_token",
            ));
        }
        (response, token)
    }

    async fn authenticate_user(&self, request: UsergridRequest, mut auth: UserAuth) -> UserAuthOutcome {
        let (mut response, token) = self.grant(request).await;
        let Some(token) = token else {
            return UserAuthOutcome {
                auth,
                user: None,
                response,
            };
        };

        auth.credential
            .apply_token_response(token.access_token, token.expires_in, self.token_margin_secs);

        let user = token.user.and_then(|json| {
            let hydrated = match self.registry.read() {
                Ok(registry) => registry.hydrate(json),
                Err(_) => usergrid_core::UsergridEntity::from_json(json),
            };
            hydrated.ok().map(UsergridUser::from_entity)
        });

        match user {
            Some(mut user) => {
                info!("Authenticated user {}", auth.username);
                user.set_auth(Some(auth.clone()));
                response.entities = vec![user.entity().clone()];
                UserAuthOutcome {
                    auth,
                    user: Some(user),
                    response,
                }
            }
            None => {
                let error = response
                    .json
                    .as_ref()
                    .and_then(ResponseError::from_json)
                    .unwrap_or_else(|| {
                        ResponseError::new(ErrorKind::MalformedResponse, "auth_failed", "Auth Failed.")
                    });
                response.error = Some(error);
                UserAuthOutcome {
                    auth,
                    user: None,
                    response,
                }
            }
        }
    }

    async fn authenticate_app(&self, request: UsergridRequest, mut auth: AppAuth) -> AppAuthOutcome {
        let (response, token) = self.grant(request).await;
        if let Some(token) = token {
            auth.credential
                .apply_token_response(token.access_token, token.expires_in, self.token_margin_secs);
            info!("Authenticated app client {}", auth.client_id);
        }
        AppAuthOutcome { auth, response }
    }

    async fn download(&self, id: TransferId, request: UsergridRequest) -> DownloadResult {
        let response = self
            .execute(request.build())
            .await
            .map_err(|e| ResponseError::transport(e.to_string()))?;

        if !response.status().is_success() {
            let parsed = self.read_response(response).await;
            return Err(parsed
                .error
                .unwrap_or_else(|| ResponseError::malformed("download failed")));
        }

        let expected = response.content_length();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_DOWNLOAD_CONTENT_TYPE)
            .to_string();

        let mut data = Vec::with_capacity(expected.map_or(0, |n| n.min(MAX_PREALLOCATION) as usize));
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| ResponseError::transport(e.to_string()))?;
            data.extend_from_slice(&chunk);
            self.report(&self.downloads, id, chunk.len() as u64, expected);
        }

        if data.is_empty() {
            return Err(ResponseError::new(
                ErrorKind::Transport,
                "Download Failed.",
                "Downloading asset failed. No data was received.",
            ));
        }

        info!("Download {} received {} bytes", id, data.len());
        Ok(UsergridAsset::new(None, data, content_type))
    }

    async fn upload(self: &Arc<Self>, id: TransferId, request: AssetUploadRequest) -> UsergridResponse {
        let mut prepared = request.build();
        let body = Bytes::from(prepared.body.take().unwrap_or_default());
        let total = body.len() as u64;

        let chunks: Vec<Bytes> = (0..body.len())
            .step_by(UPLOAD_CHUNK_SIZE)
            .map(|start| body.slice(start..(start + UPLOAD_CHUNK_SIZE).min(body.len())))
            .collect();

        let inner = self.clone();
        let body_stream = stream::iter(chunks).map(move |chunk| {
            inner.report(&inner.uploads, id, chunk.len() as u64, Some(total));
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let result = self
            .builder(&prepared)
            .body(reqwest::Body::wrap_stream(body_stream))
            .send()
            .await;

        match result {
            Ok(response) => {
                info!("Upload {} sent {} bytes", id, total);
                self.read_response(response).await
            }
            Err(e) => {
                warn!("Upload {} failed: {}", id, e);
                UsergridResponse::from_error(ResponseError::transport(e.to_string()))
            }
        }
    }

    fn report<T>(&self, transfers: &TransferRegistry<T>, id: TransferId, bytes: u64, expected: Option<u64>) {
        if let Some(update) = transfers.record(id, bytes, expected) {
            self.callbacks
                .dispatch(move || (update.callback)(update.so_far, update.total));
        }
    }
}
