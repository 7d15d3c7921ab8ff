//! One-shot question command.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use console::Style;

use super::Context;
use taliesin_chat::{ChatClient, ChatError, TurnEvent, TurnReport};

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to ask
    pub prompt: Vec<String>,
}

pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("Nothing to ask: provide a prompt, e.g. `taliesin ask how do I reset my password`");
    }

    let mut client = ctx.build_client()?;

    let report = match stream_turn(&mut client, &prompt).await {
        Ok(report) => report,
        // Expiry here means a stale archived session was resumed; the client
        // already invalidated it, so one retry runs against a fresh session.
        Err(e) if e.is_session_expired() => stream_turn(&mut client, &prompt).await?,
        Err(e) => return Err(e.into()),
    };

    if let Some(reply) = client.transcript().get(report.reply) {
        let dim = Style::new().dim();
        for citation in &reply.citations {
            println!(
                "  {}",
                dim.apply_to(format!("[{}] {}", citation.title, citation.uri))
            );
        }
    }

    Ok(())
}

async fn stream_turn(client: &mut ChatClient, prompt: &str) -> Result<TurnReport, ChatError> {
    let dim = Style::new().dim();
    let mut mid_line = false;
    let report = client
        .submit_with(prompt, |event| match event {
            TurnEvent::TextDelta(delta) => {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
                mid_line = true;
            }
            TurnEvent::ToolCall(record) => {
                if mid_line {
                    println!();
                    mid_line = false;
                }
                eprintln!("{}", dim.apply_to(format!("[Running: {}]", record.name())));
            }
            TurnEvent::CitationBatch(_) => {}
        })
        .await?;
    if mid_line {
        println!();
    }
    Ok(report)
}
