pub mod agent;
pub mod capture;
pub mod cli;
pub mod config;
pub mod dissector;
pub mod error;
pub mod extract;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;
pub mod worker;

use agent::{ AgentSettings, CallflowAgent };
use cli::Args;
use config::prompt;
use dissector::{ default_decode_hints, TsharkDissector };
use extract::FieldExtractor;
use llm::{ LlmConfig, LlmType };
use llm::chat::new_client as new_chat_client;
use log::info;
use server::api::AppState;
use server::Server;
use session::Session;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

fn build_agent(args: &Args) -> Result<CallflowAgent, Box<dyn Error + Send + Sync>> {
    let llm_type: LlmType = args.chat_llm_type.parse()?;
    let chat_config = LlmConfig {
        llm_type,
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
        max_completion_tokens: args.max_completion_tokens,
        reasoning_effort: args.reasoning_effort(),
        timeout: args.llm_timeout(),
    };
    let chat_client = new_chat_client(&chat_config)?;
    info!(
        "Chat client configured: Type={}, Model={}, Endpoint={}",
        args.chat_llm_type,
        chat_client.get_model(),
        chat_client.get_base_url().as_deref().unwrap_or("adapter default")
    );

    let dissector = Arc::new(TsharkDissector::new(args.tshark_path.clone()));
    let extractor = FieldExtractor::new(
        dissector,
        default_decode_hints(),
        args.tool_default_limit,
        args.tool_max_limit
    );
    let prompt_config = prompt::load_prompts(args.prompts_path.as_deref())?;

    Ok(
        CallflowAgent::new(chat_client, extractor, prompt_config, AgentSettings {
            summary_packet_limit: args.summary_packet_limit,
            summary_timeout: args.summary_timeout(),
            tool_timeout: args.tool_timeout(),
        })
    )
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let capture_dir = args.capture_dir.as_ref().map(PathBuf::from).unwrap_or_else(std::env::temp_dir);
    tokio::fs::create_dir_all(&capture_dir).await?;

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("CORS Origin: {}", args.cors_origin);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model);
    info!("Reasoning Effort: {}", args.reasoning_effort().as_deref().unwrap_or("(none)"));
    info!("Completion Timeout: {}s", args.llm_timeout_secs);
    info!("Capture Directory: {}", capture_dir.display());
    info!("Tshark Binary: {}", args.tshark_path);
    info!(
        "Timeouts (upload/summary/tool): {}s/{}s/{}s",
        args.upload_timeout_secs,
        args.summary_timeout_secs,
        args.tool_timeout_secs
    );
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("(built-in)"));
    info!("-------------------------");

    let agent = Arc::new(build_agent(&args)?);
    let app_state = AppState {
        session: Arc::new(Session::new(capture_dir)),
        agent,
        upload_packet_ceiling: args.upload_packet_ceiling,
        upload_timeout: args.upload_timeout(),
    };

    let server = Server::new(args.server_addr.clone(), app_state, args.clone());
    server.run().await?;

    Ok(())
}
