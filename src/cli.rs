use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};

#[derive(Parser, Debug)]
#[command(
    name = "odin-runes",
    version,
    about = "Chat with LLM backends through a plain-text transcript journal"
)]
struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (RUST_LOG still wins)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a journal, or write the greeting into an empty one
    Init { journal: PathBuf },
    /// List the turns parsed from a journal
    Turns { journal: PathBuf },
    /// Send the journal's pending prompt and append the answer
    Chat(ChatArgs),
    /// Manage the grounding snippets sent along with each prompt
    Context {
        /// Context snapshot file (defaults to ~/.odin-runes/state/context.json)
        #[arg(long, global = true)]
        snapshot: Option<PathBuf>,

        #[command(subcommand)]
        action: ContextAction,
    },
    /// Show resolved settings and which credentials are present
    Status,
}

#[derive(Args, Debug)]
struct ChatArgs {
    journal: PathBuf,

    /// Context snapshot to ground the prompt with
    #[arg(long)]
    context: Option<PathBuf>,

    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long = "backend-uri")]
    backend_uri: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ContextAction {
    List,
    Add {
        /// Capture label, e.g. Clipboard, "Regionshot (OCR)", "File (Live)"
        #[arg(long)]
        method: Option<String>,

        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Live file path, or a file whose current text is captured
        #[arg(long)]
        file: Option<PathBuf>,
    },
    Remove { id: u64 },
    Clear,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "failed" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

/// Returns whether the command finished without issues.
pub fn run() -> Result<bool> {
    let cli = Cli::parse();
    crate::logging::init(cli.verbose);

    let report = match cli.command {
        Command::Init { journal } => commands::init::run(&journal)?,
        Command::Turns { journal } => commands::turns::run(&journal)?,
        Command::Chat(args) => commands::chat::run(&commands::chat::ChatOptions {
            journal: args.journal,
            context: args.context,
            provider: args.provider,
            temperature: args.temperature,
            model: args.model,
            backend_uri: args.backend_uri,
        })?,
        Command::Context { snapshot, action } => {
            let action = match action {
                ContextAction::List => commands::context::Action::List,
                ContextAction::Add { method, text, file } => {
                    commands::context::Action::Add { method, text, file }
                }
                ContextAction::Remove { id } => commands::context::Action::Remove(id),
                ContextAction::Clear => commands::context::Action::Clear,
            };
            commands::context::run(snapshot.as_deref(), action)?
        }
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    Ok(report.ok)
}
