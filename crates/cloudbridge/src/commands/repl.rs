//! Repl command - repeated renders against one provisioned sandbox.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use cloudbridge_core::{BridgeError, Host, Readiness, RunOutcome, SkipReason};
use console::{Style, Term, style};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use super::Context;
use crate::display::FileDisplay;
use crate::session;

/// Arguments for the repl command.
#[derive(Args, Debug)]
pub struct ReplArgs {
    /// PNG file rewritten after every successful render
    #[arg(short, long, default_value = "wordcloud.png")]
    pub out: PathBuf,
}

/// Run the repl command.
pub async fn run(args: ReplArgs, ctx: &Context) -> Result<()> {
    let display = Arc::new(FileDisplay::new(&args.out));
    let host = session::launch(&ctx.config, display.clone())?;
    let mut repl = Repl::new(host, display, ctx.verbose)?;
    repl.run().await
}

/// Control flow for the REPL.
enum ControlFlow {
    Continue,
    Exit,
}

/// REPL state.
struct Repl {
    host: Host,
    display: Arc<FileDisplay>,
    editor: Editor<(), DefaultHistory>,
    term: Term,
    verbose: bool,
}

impl Repl {
    fn new(host: Host, display: Arc<FileDisplay>, verbose: bool) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;

        Ok(Self {
            host,
            display,
            editor,
            term: Term::stdout(),
            verbose,
        })
    }

    async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = format!("{} ", style("cloud>").cyan().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    if let Some(command) = line.trim().strip_prefix('/') {
                        match self.handle_slash_command(command).await {
                            Ok(ControlFlow::Continue) => continue,
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => {
                                self.print_error(&format!("Command error: {e}"));
                                continue;
                            }
                        }
                    }

                    // Lines are rendered verbatim; the bridge skips blanks
                    self.render(&line).await;
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {e}"));
                    break;
                }
            }
        }

        self.print_dim("Goodbye!");
        Ok(())
    }

    async fn render(&self, text: &str) {
        if self.host.readiness() == Readiness::Provisioning {
            self.print_dim("Waiting for the sandbox to finish provisioning...");
        }

        match self.host.run(text).await {
            Ok(RunOutcome::Rendered(image)) => {
                let green = Style::new().green();
                println!(
                    "{} {} updated",
                    green.apply_to("✓"),
                    self.display.path().display()
                );
                if self.verbose {
                    self.print_dim(&format!("{} base64 chars", image.payload().len()));
                }
            }
            Ok(RunOutcome::Skipped(SkipReason::Unchanged)) => {
                self.print_dim("(unchanged, not re-rendered)");
            }
            Ok(RunOutcome::Skipped(SkipReason::Blank)) => {}
            Ok(RunOutcome::Busy) => {
                self.print_dim("(a render is already in progress)");
            }
            Err(BridgeError::Unavailable(reason)) => {
                self.print_error(&format!("Word cloud unavailable: {reason}"));
            }
            Err(e) => self.print_error(&e.to_string()),
        }
    }

    async fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let (cmd, rest) = input.split_once(' ').unwrap_or((input, ""));
        let rest = rest.trim();

        match cmd {
            "quit" | "q" | "exit" => return Ok(ControlFlow::Exit),
            "help" | "h" | "?" => self.print_help(),
            "clear" | "cls" => self.term.clear_screen()?,
            "status" => self.print_status().await,
            "file" if !rest.is_empty() => {
                let text = std::fs::read_to_string(rest)
                    .with_context(|| format!("Failed to read {rest}"))?;
                self.render(&text).await;
            }
            _ => {
                self.print_error(&format!("Unknown command: /{input}"));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("cloudbridge").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to("Type text and press Enter to render it.")
        );
        println!(
            "{}",
            dim.apply_to(format!("Output: {}", self.display.path().display()))
        );
        println!(
            "{}",
            dim.apply_to("Use /help for commands, Ctrl+D to exit.")
        );
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the REPL", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!("  {}  - Show sandbox and session status", style("/status").cyan());
        println!("  {}  - Render the contents of a file", style("/file <path>").cyan());
        println!();
    }

    async fn print_status(&self) {
        match self.host.readiness() {
            Readiness::Provisioning => println!("Sandbox: {}", style("● provisioning").yellow()),
            Readiness::Ready => {
                println!("Sandbox: {}", style("● ready").green());
                if let Ok(bridge) = self.host.wait_ready().await {
                    let session = bridge.session();
                    println!("Renders: {}", session.renders());
                    if let Some(last) = session.last_input() {
                        self.print_dim(&format!("  last input: {} chars", last.chars().count()));
                    }
                }
            }
            Readiness::Unavailable(reason) => {
                println!("Sandbox: {}", style("● unavailable").red());
                self.print_dim(&format!("  {reason}"));
            }
        }
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
