use std::sync::Arc;

use ag_domain::config::Config;
use ag_mcp_client::McpManager;
use ag_providers::{LlmProvider, OpenAiCompatProvider};

use crate::runtime::AgentRun;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Tool registry shared by every run. Connections are opened lazily.
    pub mcp: Arc<McpManager>,
    pub upstream: Arc<dyn LlmProvider>,
}

impl AppState {
    /// Build state from config without touching the network.
    pub fn from_config(config: Arc<Config>) -> ag_domain::Result<Self> {
        let upstream = OpenAiCompatProvider::from_config(&config.upstream)?;
        let mcp = McpManager::from_config(&config.mcp);
        Ok(Self::new(config, Arc::new(mcp), Arc::new(upstream)))
    }

    pub fn new(config: Arc<Config>, mcp: Arc<McpManager>, upstream: Arc<dyn LlmProvider>) -> Self {
        Self {
            config,
            mcp,
            upstream,
        }
    }

    /// Run parameters for one request, from the loaded config.
    pub fn agent_run(&self, messages: Vec<ag_domain::tool::Message>) -> AgentRun {
        AgentRun {
            messages,
            agent: self.config.agent.clone(),
            model: self.config.upstream.model.clone(),
            upstream_timeout: self.config.upstream.timeout(),
        }
    }
}
