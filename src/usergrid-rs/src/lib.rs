//! Usergrid Client Library
//!
//! HTTP client for Apache Usergrid BaaS applications.

mod callback;
mod client;
mod manager;
mod session;
pub mod shared;
mod transfer;

pub use callback::{CallbackContext, CallbackPump, Job, DEFAULT_CALLBACK_THREAD};
pub use client::{UsergridClient, UsergridClientBuilder};
pub use manager::{AppAuthOutcome, DownloadResult, RequestManager, UserAuthOutcome};
pub use session::SessionStore;
pub use transfer::{ProgressCallback, TransferId, TransferRegistry};
pub use usergrid_core::*;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Callback thread could not be started: {0}")]
    CallbackThread(#[from] std::io::Error),

    #[error("No tokio runtime available; pass a runtime handle to the builder")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, ClientError>;
