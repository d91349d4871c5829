use clap::Parser;
use counter_warden::commands::status::print_status;
use counter_warden::commands::{Cli, Commands};
use counter_warden::utils::logger::init_logger;
use counter_warden::{runtime, worker, SharedStore, Settings, WardenError};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = init_logger(settings.log_level.as_deref()) {
        eprintln!("Failed to initialise logging: {err}");
    }

    match main_impl(&cli, settings) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "fatal");
            eprintln!("{}", err.user_message());
            ExitCode::from(1)
        }
    }
}

fn main_impl(cli: &Cli, settings: Settings) -> Result<ExitCode, WardenError> {
    match cli.command() {
        Commands::Run => {
            runtime::run(settings, cli.config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Worker { role } => {
            worker::run_worker(role, &settings)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { json } => {
            let stdout = std::io::stdout();
            print_status(&settings.segment_name, json, &mut stdout.lock())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Teardown => {
            if SharedStore::remove(&settings.segment_name)? {
                println!("Removed shared segment '{}'", settings.segment_name);
            } else {
                println!("No shared segment named '{}'", settings.segment_name);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
