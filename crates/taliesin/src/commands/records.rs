//! Browse the records the assistant has filed.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};

use super::Context;

#[derive(Args, Debug)]
pub struct RecordsArgs {
    #[command(subcommand)]
    pub command: RecordsCommand,

    /// Maximum number of records to show
    #[arg(long, global = true, default_value_t = 20)]
    pub limit: usize,

    /// Number of records to skip
    #[arg(long, global = true, default_value_t = 0)]
    pub offset: usize,

    /// Emit records as JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum RecordsCommand {
    /// List filed incident reports, newest first
    Incidents,

    /// List logged notification emails, newest first
    Emails,

    /// List recorded reply feedback, newest first
    Feedback,

    /// List archived chat sessions, newest first
    Sessions,

    /// Show record counts across all tables
    Summary,
}

pub async fn run(args: RecordsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let dim = Style::new().dim();

    match args.command {
        RecordsCommand::Incidents => {
            let incidents = store.list_incidents(args.limit, args.offset)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&incidents)?);
                return Ok(());
            }
            if incidents.is_empty() {
                println!("No incidents recorded");
                return Ok(());
            }

            println!();
            println!("{}", style("Incidents").bold());
            println!("{}", dim.apply_to("─".repeat(40)));
            for incident in incidents {
                let urgency = match incident.urgency {
                    taliesin_store::Urgency::High => style(incident.urgency.to_string()).red(),
                    taliesin_store::Urgency::Medium => {
                        style(incident.urgency.to_string()).yellow()
                    }
                    taliesin_store::Urgency::Low => style(incident.urgency.to_string()).dim(),
                };
                println!(
                    "  [{}] {}  {}",
                    urgency,
                    incident.summary,
                    dim.apply_to(format_stamp(&incident.created_at)),
                );
                println!(
                    "    {}",
                    dim.apply_to(format!(
                        "{} <{}> - {}",
                        incident.reporter_name, incident.reporter_email, incident.department
                    ))
                );
                if ctx.verbose {
                    println!("    {}", dim.apply_to(&incident.description));
                }
            }
            println!();
        }
        RecordsCommand::Emails => {
            let emails = store.list_emails(args.limit, args.offset)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&emails)?);
                return Ok(());
            }
            if emails.is_empty() {
                println!("No emails logged");
                return Ok(());
            }

            println!();
            println!("{}", style("Emails").bold());
            println!("{}", dim.apply_to("─".repeat(40)));
            for email in emails {
                println!(
                    "  {}  {}",
                    email.subject,
                    dim.apply_to(format_stamp(&email.created_at)),
                );
                println!("    {}", dim.apply_to(format!("to {}", email.to)));
                if ctx.verbose {
                    println!("    {}", dim.apply_to(&email.body));
                }
            }
            println!();
        }
        RecordsCommand::Feedback => {
            let entries = store.list_feedback(args.limit, args.offset)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                println!("No feedback recorded");
                return Ok(());
            }

            println!();
            println!("{}", style("Feedback").bold());
            println!("{}", dim.apply_to("─".repeat(40)));
            for entry in entries {
                let marker = match entry.kind {
                    taliesin_store::FeedbackKind::Positive => style("▲").green(),
                    taliesin_store::FeedbackKind::Negative => style("▼").red(),
                };
                println!(
                    "  {} {}  {}",
                    marker,
                    truncate(&entry.rated_text, 70),
                    dim.apply_to(format_stamp(&entry.created_at)),
                );
            }
            println!();
        }
        RecordsCommand::Sessions => {
            let archives = store.list_archives(args.limit, args.offset)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&archives)?);
                return Ok(());
            }
            if archives.is_empty() {
                println!("No archived sessions");
                return Ok(());
            }

            println!();
            println!("{}", style("Sessions").bold());
            println!("{}", dim.apply_to("─".repeat(40)));
            for archive in archives {
                println!(
                    "  {}  {} turns  {}",
                    archive.id,
                    archive.turn_count(),
                    dim.apply_to(format_stamp(&archive.created_at)),
                );
                if ctx.verbose {
                    for turn in &archive.turns {
                        println!(
                            "    {} {}",
                            dim.apply_to(format!("{}:", turn.role)),
                            truncate(&turn.content, 70)
                        );
                    }
                }
            }
            println!();
        }
        RecordsCommand::Summary => {
            let counts = store.counts()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
                return Ok(());
            }
            println!("Incidents: {}", counts.incidents);
            println!("Emails:    {}", counts.emails);
            println!("Feedback:  {}", counts.feedback);
            println!("Sessions:  {}", counts.archives);
            println!("Admins:    {}", counts.admins);
        }
    }

    Ok(())
}

fn format_stamp(stamp: &chrono::DateTime<chrono::Utc>) -> String {
    stamp.format("%Y-%m-%d %H:%M").to_string()
}

fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}…", cut)
    }
}
