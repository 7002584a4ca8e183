//! Usergrid Core Library
//!
//! Transport-free building blocks of the Usergrid client:
//! - Entity model (entities, users, devices, assets) and the type registry
//! - Query builder for the backend query language
//! - Credentials and token lifecycle
//! - Request assembly and response parsing
//! - Client configuration and credential storage

pub mod asset;
pub mod auth;
pub mod config;
pub mod device;
pub mod entity;
pub mod models;
pub mod query;
pub mod registry;
pub mod request;
pub mod response;
pub mod storage;
pub mod user;

// Re-export commonly used types
pub use asset::UsergridAsset;
pub use auth::{AppAuth, AuthState, Credential, UserAuth, UsergridAuth};
pub use config::{AppCredentials, ClientConfig};
pub use device::UsergridDevice;
pub use entity::{EntityError, EntityKind, FileMetaData, Location, UsergridEntity};
pub use models::*;
pub use query::{QueryValue, UsergridQuery};
pub use registry::TypeRegistry;
pub use request::{AssetUploadRequest, PreparedRequest, RequestBody, UsergridRequest};
pub use response::{ErrorKind, NextPageLoader, ResponseError, UsergridResponse};
pub use storage::{CredentialStore, MemoryCredentialStore, StorageError};
pub use user::UsergridUser;
