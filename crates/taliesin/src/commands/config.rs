//! Configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use super::Context;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration
    Show,

    /// Print the user configuration file path
    Path,
}

pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let mut shown = ctx.config.clone();
            // Never echo a stored key back to the terminal.
            if let Some(llm) = shown.llm.as_mut()
                && llm.api_key.is_some()
            {
                llm.api_key = Some("<redacted>".to_string());
            }
            print!("{}", shown.to_toml()?);

            if ctx.config.has_plaintext_api_key() {
                let dim = Style::new().dim();
                eprintln!(
                    "{}",
                    dim.apply_to(format!(
                        "Note: api_key is stored in plain text; prefer the {} environment variable",
                        taliesin_config::API_KEY_ENV
                    ))
                );
            }
        }
        ConfigCommand::Path => match taliesin_config::xdg_config_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("Could not determine a configuration directory"),
        },
    }

    Ok(())
}
