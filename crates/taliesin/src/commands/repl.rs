//! REPL (Read-Eval-Print Loop) implementation for interactive chat.

use anyhow::Result;
use console::{Style, Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use std::io::Write;
use std::time::Duration;

use taliesin_chat::{ChatClient, ChatError, Language, TurnEvent, TurnReport};
use taliesin_store::FeedbackKind;

/// REPL state and configuration.
pub struct Repl {
    client: ChatClient,
    editor: Editor<(), DefaultHistory>,
    term: Term,
    verbose: bool,
}

impl Repl {
    /// Create a new REPL instance.
    pub fn new(client: ChatClient, verbose: bool) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;

        Ok(Self {
            client,
            editor,
            term: Term::stdout(),
            verbose,
        })
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    // Handle slash commands
                    if line.starts_with('/') {
                        match self.handle_slash_command(line).await {
                            Ok(ControlFlow::Continue) => continue,
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => {
                                self.print_error(&format!("Command error: {}", e));
                                continue;
                            }
                        }
                    }

                    self.send_message(line).await;
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C - cancel current input but don't exit
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D - exit
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.print_dim("Goodbye!");
        Ok(())
    }

    /// Send a message and stream the reply.
    ///
    /// A session-expired failure is retried exactly once against the fresh
    /// session the client already prepared; any other failure renders the
    /// fallback message.
    async fn send_message(&mut self, message: &str) {
        match self.stream_turn(message).await {
            Ok(report) => self.print_turn_footer(report),
            Err(e) if e.is_session_expired() => {
                println!();
                self.print_dim("(Session expired - reconnecting)");
                match self.stream_turn(message).await {
                    Ok(report) => self.print_turn_footer(report),
                    Err(e) => self.print_turn_failure(&e),
                }
            }
            Err(e) => self.print_turn_failure(&e),
        }
    }

    /// Drive one turn, printing events as they land in the transcript.
    async fn stream_turn(&mut self, message: &str) -> Result<TurnReport, ChatError> {
        let dim = Style::new().dim();
        let mut mid_line = false;
        let report = self
            .client
            .submit_with(message, |event| match event {
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
                    println!("{}", dim.apply_to(format!("[Running: {}]", record.name())));
                }
                TurnEvent::CitationBatch(_) => {}
            })
            .await?;
        if mid_line {
            println!();
        }
        Ok(report)
    }

    /// Print citations attached to the closed reply, if any.
    fn print_turn_footer(&self, report: TurnReport) {
        let dim = Style::new().dim();
        if let Some(reply) = self.client.transcript().get(report.reply) {
            for citation in &reply.citations {
                println!(
                    "  {}",
                    dim.apply_to(format!("[{}] {}", citation.title, citation.uri))
                );
            }
        }
        println!();
    }

    fn print_turn_failure(&self, error: &ChatError) {
        println!();
        self.print_error(taliesin_chat::FALLBACK_MESSAGE);
        if self.verbose {
            let dim = Style::new().dim();
            println!("  {}", dim.apply_to(format!("({})", error)));
        }
        println!();
    }

    /// Handle a slash command.
    async fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let parts: Vec<&str> = input[1..].split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");
        let args = &parts[1..];

        match cmd {
            "quit" | "q" | "exit" => {
                return Ok(ControlFlow::Exit);
            }
            "help" | "h" | "?" => {
                self.print_help();
            }
            "clear" | "cls" => {
                self.term.clear_screen()?;
            }
            "new" => {
                self.client.reset_conversation();
                self.print_dim("Started a fresh conversation");
                self.print_greeting();
            }
            "session" => {
                self.print_session();
            }
            "lang" if !args.is_empty() => {
                self.switch_language(args[0]);
            }
            "kb" if !args.is_empty() => {
                self.reload_knowledge(&args.join(" "));
            }
            "feedback" if !args.is_empty() => {
                self.toggle_feedback(args[0], args.get(1).copied());
            }
            "analyze" => {
                self.run_analysis().await;
            }
            "lang" => {
                self.print_dim("Usage: /lang <en|si|ta>");
            }
            "kb" => {
                self.print_dim("Usage: /kb <path>");
            }
            "feedback" => {
                self.print_dim("Usage: /feedback <up|down> [n]");
            }
            "" => {
                self.print_dim("Type /help for available commands");
            }
            _ => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn switch_language(&mut self, code: &str) {
        match Language::parse(code) {
            Some(language) => {
                self.client.set_language(language);
                self.print_greeting();
            }
            None => {
                self.print_error(&format!(
                    "Unknown language '{}' (expected en, si, or ta)",
                    code
                ));
            }
        }
    }

    fn reload_knowledge(&mut self, path: &str) {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                self.client.set_knowledge(contents);
                self.print_greeting();
            }
            Err(e) => {
                self.print_error(&format!("Could not read {}: {}", path, e));
            }
        }
    }

    /// Toggle feedback on the n-th most recent reply (default the last).
    fn toggle_feedback(&mut self, direction: &str, nth: Option<&str>) {
        let kind = match direction {
            "up" | "+" => FeedbackKind::Positive,
            "down" | "-" => FeedbackKind::Negative,
            other => {
                self.print_error(&format!("Expected up or down, got '{}'", other));
                return;
            }
        };
        let n = match nth.map(str::parse::<usize>).transpose() {
            Ok(n) => n.unwrap_or(1),
            Err(_) => {
                self.print_error("Expected a number, e.g. /feedback up 2");
                return;
            }
        };
        let Some(turn) = self.client.transcript().nth_model_turn_from_end(n) else {
            self.print_error("No such reply to rate");
            return;
        };

        match self.client.toggle_feedback(turn, kind) {
            Ok(Some(kind)) => {
                let green = Style::new().green();
                println!("{} Feedback recorded: {}", green.apply_to("✓"), kind);
            }
            Ok(None) => {
                self.print_dim("Feedback cleared");
            }
            Err(e) => {
                self.print_error(&format!("Could not record feedback: {}", e));
            }
        }
    }

    async fn run_analysis(&mut self) {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("Analyzing conversation...");
        spinner.enable_steady_tick(Duration::from_millis(100));

        let result = self.client.analyze().await;
        spinner.finish_and_clear();

        match result {
            Ok(report) => {
                println!();
                println!("{}", style("Session Report").bold());
                println!("{}", Style::new().dim().apply_to("─".repeat(40)));
                println!("{}", report);
                println!();
            }
            Err(e) => {
                self.print_error(&format!("Analysis failed: {}", e));
            }
        }
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Taliesin Support Chat").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to("Type your message and press Enter to chat.")
        );
        println!(
            "{}",
            dim.apply_to("Use /help for commands, Ctrl+D to exit.")
        );
        println!();
        self.print_greeting();
    }

    /// Print the latest assistant turn (greeting or reconfiguration notice).
    fn print_greeting(&self) {
        if let Some(turn) = self.client.transcript().last() {
            println!("{}", turn.content);
            println!();
        }
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the REPL", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!("  {}  - Start a fresh conversation", style("/new").cyan());
        println!("  {}  - Show session status", style("/session").cyan());
        println!(
            "  {}  - Switch reply language",
            style("/lang <en|si|ta>").cyan()
        );
        println!(
            "  {}  - Reload the knowledge corpus",
            style("/kb <path>").cyan()
        );
        println!(
            "  {}  - Rate the n-th latest reply",
            style("/feedback <up|down> [n]").cyan()
        );
        println!(
            "  {}  - Generate the admin session report",
            style("/analyze").cyan()
        );
        println!();
        println!("{}", dim.apply_to("Keyboard shortcuts:"));
        println!("  {} - Interrupt current input", dim.apply_to("Ctrl+C"));
        println!("  {} - Exit the REPL", dim.apply_to("Ctrl+D"));
        println!();
    }

    fn print_session(&self) {
        let dim = Style::new().dim();
        println!("Language: {}", self.client.language().display_name());
        println!("Transcript: {} turns", self.client.transcript().len());
        match self.client.session_id() {
            Some(id) => println!("Session: {}", id),
            None => self.print_dim("No active session (will create on next message)"),
        }
        if self.verbose {
            println!("{}", dim.apply_to(format!("Archive: {}", self.client.archive_id())));
        }
    }

    fn format_prompt(&self) -> String {
        format!("{} ", style("you>").cyan().bold())
    }

    fn print_dim(&self, msg: &str) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(msg));
    }

    fn print_error(&self, msg: &str) {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), msg);
    }
}

/// Control flow for the REPL.
pub enum ControlFlow {
    Continue,
    Exit,
}
