//! Administrator account management.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};

use super::Context;
use taliesin_store::{AdminRole, AdminUpdate};

#[derive(Args, Debug)]
pub struct AdminsArgs {
    #[command(subcommand)]
    pub command: AdminsCommand,
}

#[derive(Subcommand, Debug)]
pub enum AdminsCommand {
    /// List administrator accounts
    List,

    /// Add an administrator account
    Add {
        /// Email address of the new administrator
        email: String,

        /// Optional password for the account
        #[arg(long)]
        password: Option<String>,
    },

    /// Update an administrator account
    Update {
        /// Email address of the account to update
        email: String,

        /// New email address
        #[arg(long)]
        new_email: Option<String>,

        /// New password
        #[arg(long)]
        password: Option<String>,

        /// New role: admin or "super admin"
        #[arg(long)]
        role: Option<String>,
    },

    /// Remove an administrator account
    Remove {
        /// Email address of the account to remove
        email: String,
    },
}

pub async fn run(args: AdminsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;

    match args.command {
        AdminsCommand::List => {
            let admins = store.list_admins()?;
            if admins.is_empty() {
                println!("No administrator accounts");
                return Ok(());
            }

            let dim = Style::new().dim();
            println!();
            println!("{}", style("Administrators").bold());
            println!("{}", dim.apply_to("─".repeat(40)));
            for admin in admins {
                println!(
                    "  {}  {}  {}",
                    admin.email,
                    dim.apply_to(admin.role.to_string()),
                    dim.apply_to(admin.created_at.format("%Y-%m-%d").to_string()),
                );
            }
            println!();
        }
        AdminsCommand::Add { email, password } => {
            let admin = store.add_admin(&email, password)?;
            let green = Style::new().green();
            println!("{} Added administrator {}", green.apply_to("✓"), admin.email);
        }
        AdminsCommand::Update {
            email,
            new_email,
            password,
            role,
        } => {
            let admin = store
                .find_admin(&email)?
                .ok_or_else(|| anyhow::anyhow!("No administrator named {}", email))?;
            let role = role
                .map(|r| {
                    AdminRole::parse(&r).ok_or_else(|| {
                        anyhow::anyhow!("Unknown role '{}' (expected admin or \"super admin\")", r)
                    })
                })
                .transpose()?;

            let updated = store.update_admin(
                admin.id,
                &AdminUpdate {
                    email: new_email,
                    password,
                    role,
                },
            )?;
            let green = Style::new().green();
            println!(
                "{} Updated administrator {} ({})",
                green.apply_to("✓"),
                updated.email,
                updated.role
            );
        }
        AdminsCommand::Remove { email } => {
            store.remove_admin(&email)?;
            let green = Style::new().green();
            println!("{} Removed administrator {}", green.apply_to("✓"), email);
        }
    }

    Ok(())
}
