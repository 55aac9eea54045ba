//! Synthesizer seam
//!
//! The language model is an opaque capability: prompt in, artifact out.
//! Parse failures are synthesis failures.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::DeploymentArtifact;

/// Synthesis errors.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("llm error: {0}")]
    Llm(String),
    #[error("artifact parse error: {0}")]
    Parse(String),
    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),
}

/// Prompt-to-artifact synthesis.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize a deployment artifact from a prompt.
    async fn synthesize(&self, prompt: &str) -> Result<DeploymentArtifact, SynthError>;
}
