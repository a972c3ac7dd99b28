//! `moltyclaw ask` — one message, one reply.

use crate::runtime;
use moltyclaw_agent::{AskOptions, ReplyKind};

pub async fn run(message: String, silent: bool) -> anyhow::Result<()> {
    let config = runtime::load_config()?;
    let agent = runtime::build_agent(&config)?;

    let options = if silent { AskOptions::silent() } else { AskOptions::default() };
    let reply = agent.ask(message, options).await;

    match reply.kind {
        ReplyKind::Failed => anyhow::bail!("{}", reply.text),
        ReplyKind::Acknowledged if silent => {}
        _ => println!("{}", reply.text),
    }
    for attachment in &reply.attachments {
        eprintln!("[attachment {:?}] {}", attachment.kind, attachment.path);
    }
    Ok(())
}
