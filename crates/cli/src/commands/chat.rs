//! `moltyclaw chat` — interactive console.
//!
//! Answers stream to stdout as they are generated; action labels go to
//! stderr. `!cmd <command>` runs a shell command directly without asking
//! the model.

use crate::runtime;
use moltyclaw_agent::{Agent, AskOptions, Reply, ReplyKind};
use moltyclaw_core::action::Command;
use std::io::Write;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

/// What one console line asks for.
#[derive(Debug, PartialEq)]
pub enum ConsoleInput {
    Empty,
    Exit,
    /// Bypass the model and dispatch this command
    Direct(Command),
    Message(String),
}

pub fn parse_line(line: &str) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Empty;
    }
    if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
        return ConsoleInput::Exit;
    }
    if let Some(rest) = line.strip_prefix("!cmd") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return ConsoleInput::Direct(Command::builtin("CMD", rest.trim()));
        }
    }
    ConsoleInput::Message(line.to_string())
}

pub async fn run() -> anyhow::Result<()> {
    let config = runtime::load_config()?;
    let agent = runtime::build_agent(&config)?;

    println!();
    println!("  {} — interactive mode", agent.name());
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Actions:   {}", agent.registry().names().join(", "));
    println!();
    println!("  Type your message and press Enter. '!cmd <command>' runs a shell command.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    watch_events(&agent);

    let mut lines = BufReader::new(io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ConsoleInput::Empty => {}
            ConsoleInput::Exit => break,
            ConsoleInput::Direct(command) => {
                let output = agent.run_action(&command).await;
                println!("{output}");
                println!();
            }
            ConsoleInput::Message(text) => {
                print!("  {} > ", agent.name());
                std::io::stdout().flush()?;
                let reply = ask_streaming(&agent, text).await;
                println!();
                report(&reply);
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Print event notices (compactions) on stderr while the console runs.
fn watch_events(agent: &Agent) {
    let mut events = agent.event_bus().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(notice) = event.notice() {
                        eprintln!("\n  ({notice})");
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

/// Ask with live output; returns once the reply and all streamed text are printed.
async fn ask_streaming(agent: &Agent, text: String) -> Reply {
    let (text_tx, mut text_rx) = mpsc::unbounded_channel::<String>();
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<String>();

    let printer = tokio::spawn(async move {
        let mut out = std::io::stdout();
        while let Some(fragment) = text_rx.recv().await {
            let _ = write!(out, "{fragment}");
            let _ = out.flush();
        }
    });
    let labels = tokio::spawn(async move {
        while let Some(label) = action_rx.recv().await {
            eprintln!("\n  ⚙ {label}");
        }
    });

    let options = AskOptions::default()
        .with_stream_sink(text_tx)
        .with_action_sink(action_tx);
    let reply = agent.ask(text, options).await;

    // The senders close when the turn ends; a timed-out turn keeps them open
    if reply.kind != ReplyKind::Failed {
        let _ = printer.await;
        let _ = labels.await;
    }
    reply
}

fn report(reply: &Reply) {
    match reply.kind {
        ReplyKind::Failed => eprintln!("  [Error] {}", reply.text),
        ReplyKind::Acknowledged => eprintln!("  ({})", reply.text),
        ReplyKind::Answer => {}
    }
    for attachment in &reply.attachments {
        eprintln!("  [attachment {:?}] {}", attachment.kind, attachment.path);
    }
}
