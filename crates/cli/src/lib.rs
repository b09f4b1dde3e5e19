pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "callbridge",
    about = "Callbridge operator CLI",
    long_about = "Inspect configuration, check readiness, provision the session store, and exercise carrier webhook turns offline.",
    after_help = "Examples:\n  callbridge doctor --json\n  callbridge simulate --param ApiVersion=v2 --param CallSid=CA1 --param From=+15551230000\n  callbridge sign --url https://bridge.example.com/carrier --param CallSid=CA1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, engine readiness, and session store connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending session store migrations")]
    Migrate,
    #[command(about = "Run one carrier callback through the bridge with an in-memory store")]
    Simulate {
        #[arg(long, help = "JSON object of callback parameters")]
        payload: Option<PathBuf>,
        #[arg(long = "param", value_name = "KEY=VALUE", help = "Callback parameter (repeatable)")]
        params: Vec<String>,
        #[arg(long, help = "Flow script answering the turn instead of the configured engine")]
        script: Option<PathBuf>,
        #[arg(long, default_value = "localhost", help = "Host header the carrier used")]
        host: String,
    },
    #[command(about = "Compute the carrier signature for a callback URL and parameters")]
    Sign {
        #[arg(long, help = "Callback URL the carrier signs")]
        url: String,
        #[arg(long = "param", value_name = "KEY=VALUE", help = "Callback parameter (repeatable)")]
        params: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Migrate => commands::migrate::run(),
        Command::Simulate { payload, params, script, host } => {
            commands::simulate::run(commands::simulate::SimulateArgs {
                payload,
                params,
                script,
                host,
            })
        }
        Command::Sign { url, params } => commands::sign::run(&url, &params),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
