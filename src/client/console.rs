use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };
use log::info;

use super::chat::ChatSession;
use super::state::StateSession;
use super::{ ApiClient, ClientError };
use crate::cli::ConsoleArgs;

const HELP: &str = "\
Commands:
  /show           print the simulation state
  /incr           increment the counter
  /notes <text>   replace the notes
  /save           write pending changes now
  /history        print this session's conversation
  /quit           save and exit
Anything else is sent to the assistant.";

#[derive(Debug, PartialEq, Eq)]
enum ConsoleInput<'a> {
    Show,
    Increment,
    Notes(&'a str),
    Save,
    History,
    Help,
    Quit,
    Chat(&'a str),
    Empty,
}

fn parse_line(line: &str) -> ConsoleInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Empty;
    }
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "/show" => ConsoleInput::Show,
        "/incr" => ConsoleInput::Increment,
        "/notes" => ConsoleInput::Notes(rest),
        "/save" => ConsoleInput::Save,
        "/history" => ConsoleInput::History,
        "/help" => ConsoleInput::Help,
        "/quit" | "/exit" => ConsoleInput::Quit,
        _ => ConsoleInput::Chat(line),
    }
}

/// Terminal stand-in for the browser UI: state edits and chat turns against
/// a running server.
pub async fn run(args: ConsoleArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let api = Arc::new(ApiClient::new(&args.server_url)?);
    info!("Connecting to {}", args.server_url);

    let mut state = StateSession::load(api.clone(), Duration::from_millis(args.save_debounce_ms)).await;
    let chat = Arc::new(ChatSession::new(api));

    println!("{}", serde_json::to_string_pretty(state.state())?);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ConsoleInput::Empty => {}
            ConsoleInput::Show => println!("{}", serde_json::to_string_pretty(state.state())?),
            ConsoleInput::Increment => println!("counter = {}", state.increment_counter()),
            ConsoleInput::Notes(text) => {
                state.set_notes(text);
                println!("notes updated");
            }
            ConsoleInput::Save => {
                if !state.flush().await {
                    println!("save failed; see log");
                }
            }
            ConsoleInput::History => {
                for message in chat.history() {
                    println!("{:?}> {}", message.role, message.content);
                }
            }
            ConsoleInput::Help => println!("{}", HELP),
            ConsoleInput::Quit => break,
            ConsoleInput::Chat(text) => {
                let chat = Arc::clone(&chat);
                let text = text.to_string();
                tokio::spawn(async move {
                    match chat.submit(&text).await {
                        Ok(reply) => println!("assistant> {}", reply.content),
                        Err(ClientError::Busy) => {
                            println!("(still waiting on the previous reply; message not sent)")
                        }
                        Err(e) => println!("chat error: {}", e),
                    }
                });
            }
        }
    }

    state.close().await;
    Ok(())
}
