pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "hearth",
    about = "Hearth operator CLI",
    long_about = "Operate the Hearth buyer qualification engine: simulate conversation turns, \
                  score messages, inspect configuration, and estimate affordability.",
    after_help = "Examples:\n  hearth simulate --message \"pre approved for $625k, ready this weekend\"\n  hearth score --text \"just browsing for now\"\n  hearth config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one conversation turn against in memory collaborators")]
    Simulate {
        #[arg(long, help = "Inbound buyer message")]
        message: String,
        #[arg(long, default_value = "sim-1", help = "Conversation id")]
        conversation_id: String,
        #[arg(long, help = "Buyer name")]
        name: Option<String>,
        #[arg(
            long = "history",
            help = "Prior turn as `buyer:<text>` or `agent:<text>`; repeatable"
        )]
        history: Vec<String>,
    },
    #[command(about = "Score a message with the intent scorer and print the profile")]
    Score {
        #[arg(long, help = "Conversation text to score")]
        text: String,
    },
    #[command(
        about = "Inspect effective configuration values with secrets redacted"
    )]
    Config,
    #[command(about = "Estimate the monthly payment for a purchase price")]
    Affordability {
        #[arg(long, help = "Purchase price in whole dollars")]
        price: i64,
    },
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Simulate { message, conversation_id, name, history } => {
            commands::simulate::run(&conversation_id, &message, name, &history).await
        }
        Command::Score { text } => commands::score::run(&text),
        Command::Config => commands::config::run(),
        Command::Affordability { price } => commands::affordability::run(price),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
