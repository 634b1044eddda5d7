pub mod daemon_path;
pub mod process;
pub mod summary;

use std::env;

use anyhow::Result;
use clap::{Parser, Subcommand};
use daemon_path::DaemonExecutables;
use process::{is_server_running, kill_previous_servers, restart_server};
use summary::{process_summary_command, SummaryCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{args::DaemonOptions, start_daemon},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Inputstat", version, long_about = None)]
#[command(about = "Application for tallying clicks, keys, scrolling and pointer travel", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[command(flatten)]
        options: DaemonOptions,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[command(flatten)]
        options: DaemonOptions,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Display collected activity")]
    Summary {
        #[command(flatten)]
        command: SummaryCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };

    let cli = env::current_exe()?;
    let executables = DaemonExecutables::new(&cli);

    match args.commands {
        Commands::Init { options } => {
            enable_logging(
                CLI_PREFIX,
                &create_application_default_path()?,
                logging_level,
                args.log,
            )?;
            restart_server(cli, &executables, options.to_args())
        }
        Commands::Stop {} => {
            enable_logging(
                CLI_PREFIX,
                &create_application_default_path()?,
                logging_level,
                args.log,
            )?;
            let stopped = kill_previous_servers(&executables)?;
            println!("Stopped {stopped} daemon(s)");
            Ok(())
        }
        Commands::Serve { options } => {
            let config = options.resolve()?;
            enable_logging(DAEMON_PREFIX, &config.dir, logging_level, args.log)?;
            start_daemon(config).await
        }
        Commands::Summary { command } => {
            process_summary_command(command, is_server_running(&executables)?).await
        }
    }
}
