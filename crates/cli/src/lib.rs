pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use waypoint_core::config::{ConfigOverrides, LoadOptions};

use crate::commands::chat::ChatArgs;
use crate::commands::plan::PlanArgs;

#[derive(Debug, Parser)]
#[command(
    name = "waypoint",
    about = "Waypoint trip planning CLI",
    long_about = "Collect a trip request in conversation, inspect configuration, and build \
ticket-plus-hotel route options from an inventory file.",
    after_help = "Examples:\n  waypoint config\n  waypoint plan --inventory inventory.json \
--origin KZN --destination MOW --departure 2024-12-01 --return 2024-12-15 --budget 35000\n  \
waypoint chat --inventory inventory.json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this file instead of waypoint.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the configured log level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Build route options for a fixed request against an inventory file")]
    Plan(PlanArgs),
    #[command(about = "Collect a trip request from stdin, one utterance per line")]
    Chat(ChatArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        overrides: ConfigOverrides { log_level: cli.log_level, ..ConfigOverrides::default() },
    };

    let result = match cli.command {
        Command::Config => commands::config::run(options),
        Command::Plan(args) => commands::plan::run(options, args),
        Command::Chat(args) => commands::chat::run(options, args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
