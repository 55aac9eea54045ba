//! # Steward Agents
//!
//! Agent implementations behind the steward-core seams:
//! - `AgentKernel`: shared memory recall, reasoning-chain building and
//!   correlation id propagation (composition-only, no agent state)
//! - `ReactPlanner`: think → act → observe → reflect planning loop
//! - `StepExecutor`: dispatches one step to the deployment backend
//! - `OutcomeMonitor`: classifies step outcomes into retry/replan/fail
//! - `LlmSynthesizer`: prompt → artifact adapter over an LLM client

mod executor;
mod kernel;
mod llm;
mod monitor;
mod planner;

pub use executor::{ExecutorConfig, StepExecutor};
pub use kernel::AgentKernel;
pub use llm::{HttpLlmClient, LlmClient, LlmError, LlmRequest, LlmSynthesizer, SynthesizerConfig};
pub use monitor::OutcomeMonitor;
pub use planner::ReactPlanner;
