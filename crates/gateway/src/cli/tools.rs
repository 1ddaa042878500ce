use ag_domain::config::Config;
use ag_domain::CallScope;
use ag_mcp_client::McpManager;

use crate::runtime::filter_tools;

/// Connect to every enabled server and print the tools a run would expose,
/// one per line as `server<TAB>name<TAB>description`.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let manager = McpManager::from_config(&config.mcp);
    if manager.is_empty() {
        println!("no enabled MCP servers");
        return Ok(());
    }

    let scope = CallScope::detached(config.agent.request_timeout());
    let listed = manager.list_tools(&scope).await;
    manager.shutdown().await;

    let tools = filter_tools(config.agent.tool_policy.as_ref(), listed?);
    for tool in &tools {
        println!(
            "{}\t{}\t{}",
            tool.server,
            tool.name,
            tool.description.as_deref().unwrap_or("")
        );
    }
    eprintln!(
        "{} tool(s) from {} server(s)",
        tools.len(),
        manager.len()
    );
    Ok(())
}
