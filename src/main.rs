use clap::Parser;
use tracing::{error, info};

mod agent;
mod config;
mod format;
mod llm;
mod mcp;
mod prompt;
mod schema;
mod session;
mod sql;
mod util;

use crate::agent::Agent;
use crate::config::{AppConfig, CliArgs};
use crate::llm::LlmManager;
use crate::mcp::ToolServerClient;
use crate::schema::SchemaDescriptor;
use crate::util::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.verbose);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Build the schema descriptor once; it stays fixed for the session
    let schema = match SchemaDescriptor::load(config.schema_file.as_deref()) {
        Ok(schema) => schema,
        Err(e) => {
            error!("Failed to build schema descriptor: {}", e);
            return Err(e.into());
        }
    };
    info!("Schema descriptor ready with {} tables", schema.tables.len());

    // Initialize LLM backend
    info!("Initializing LLM backend: {}", config.llm.backend);
    let llm = LlmManager::new(&config.llm)?;

    // Start the tool server and run the initialize handshake; an unreachable
    // server at launch is a startup failure, not a per-turn error
    let executor = match ToolServerClient::connect(&config.tool_server).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to tool server: {}", e);
            return Err(e.into());
        }
    };

    let mut agent = Agent::new(
        Box::new(llm),
        Box::new(executor),
        schema.render(),
        config.agent.clone(),
    );

    let result = session::run(&mut agent).await;

    match result {
        Ok(_) => info!("Session ended"),
        Err(e) => {
            error!("Session error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
