//! Interactive chat command.

use anyhow::Result;
use clap::Args;
use tracing::debug;

use super::{Context, repl::Repl};

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Knowledge corpus file for this session only
    #[arg(long, value_name = "PATH")]
    pub kb: Option<std::path::PathBuf>,
}

pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let mut client = ctx.build_client()?;

    if let Some(path) = &args.kb {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Could not read {}: {}", path.display(), e))?;
        client.set_knowledge(contents);
        debug!(path = %path.display(), "Session knowledge overridden");
    }

    let mut repl = Repl::new(client, ctx.verbose)?;
    repl.run().await
}
