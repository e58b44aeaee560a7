//! Agent and evaluator implementations.

pub mod chat_completions;
pub mod cli_agent;
pub mod scripted;

pub use chat_completions::{ChatAgent, ChatCompletionsClient, ChatCompletionsConfig, ChatError};
pub use cli_agent::{CliAgent, CliAgentFactory};
pub use scripted::{ScriptedAgent, ScriptedAgentFactory, ScriptedEvaluator, ScriptedReply};
