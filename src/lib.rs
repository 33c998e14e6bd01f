pub mod cli;
pub mod client;
pub mod error;
pub mod llm;
pub mod models;
pub mod proxy;
pub mod server;
pub mod store;

#[cfg(test)]
mod test_support;

use cli::{ Args, Command, ServeArgs };
use llm::chat::new_client;
use llm::LlmConfig;
use log::info;
use proxy::PassthroughProxy;
use server::api::AppState;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Console(console_args) => client::console::run(console_args).await,
    }
}

/// Validates configuration, wires the store, chat client and optional
/// proxy together. Fails before binding anything if a setting is unusable.
pub fn build_state(args: &ServeArgs) -> Result<AppState, cli::ConfigError> {
    args.validate()?;

    let store = store::initialize_state_store(args)?;
    let chat = new_client(&LlmConfig::from_args(args))?;
    let proxy = if args.enable_proxy {
        Some(PassthroughProxy::new(&args.chat_base_url)?)
    } else {
        None
    };

    Ok(AppState { store, chat, proxy })
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("State Backend: {}", args.state_backend);
    info!("State Path: {}", args.state_path);
    info!("SQLite Path: {}", args.sqlite_path);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Chat Temperature: {}", args.chat_temperature);
    info!("Chat Max Tokens: {}", args.chat_max_tokens);
    info!("Pass-through Proxy: {}", args.enable_proxy);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let state = build_state(&args)?;
    info!("Chat requests go to {} using {}", state.chat.get_base_url(), state.chat.get_model());

    let server = Server::new(args.server_addr.clone(), state, args);
    server.run().await?;

    Ok(())
}
