//! Deployment backend seam
//!
//! The cloud model-hosting backend is an external collaborator; the core only
//! depends on this trait. Backends are assumed idempotent on
//! `(model_name, endpoint_name)` or return a distinguishable already-exists
//! error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DeploymentArtifact, ErrorKind};

/// Endpoint lifecycle status reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Creating,
    InService,
    Updating,
    Failed,
    Deleting,
    NotFound,
}

/// Successful backend call result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BackendResponse {
    pub fn with_resource_id(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
            detail: None,
        }
    }
}

/// Endpoint description returned by `describe_endpoint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub endpoint_name: String,
    pub status: EndpointStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Backend call failure, tagged with the error taxonomy.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Repeated create for an existing resource; the executor treats this as
    /// success.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),
    #[error("{kind} backend error: {message}")]
    Call { kind: ErrorKind, message: String },
}

impl BackendError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Call {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Call {
            kind: ErrorKind::Semantic,
            message: message.into(),
        }
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::Call {
            kind: ErrorKind::Unrecoverable,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::AlreadyExists(_) => ErrorKind::Semantic,
            BackendError::Call { kind, .. } => *kind,
        }
    }
}

/// Cloud model-hosting backend operations.
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    async fn create_model(
        &self,
        artifact: &DeploymentArtifact,
    ) -> Result<BackendResponse, BackendError>;

    async fn create_endpoint_config(
        &self,
        artifact: &DeploymentArtifact,
    ) -> Result<BackendResponse, BackendError>;

    async fn create_endpoint(
        &self,
        artifact: &DeploymentArtifact,
    ) -> Result<BackendResponse, BackendError>;

    async fn describe_endpoint(
        &self,
        endpoint_name: &str,
    ) -> Result<EndpointDescription, BackendError>;

    async fn delete_endpoint(
        &self,
        endpoint_name: &str,
    ) -> Result<BackendResponse, BackendError>;

    async fn configure_monitor(
        &self,
        artifact: &DeploymentArtifact,
    ) -> Result<BackendResponse, BackendError>;
}
