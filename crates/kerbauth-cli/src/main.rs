mod config;
mod probe;

use anyhow::Context;
use clap::Parser;
use kerbauth_core::{Authenticator, Session, SystemCommandRunner};
use tracing::{error, info, instrument};

use config::{Args, Command, init_logging, settings_from_args, strategy_from_args};
use probe::UreqProbe;

#[instrument(name = "main", level = "info", skip_all)]
fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.log_file.as_ref()) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run_app(&args) {
        error!("kerbauth failed: {:?}", e);
        return Err(e);
    }

    Ok(())
}

fn run_app(args: &Args) -> anyhow::Result<()> {
    let strategy = strategy_from_args(args)?;
    let settings = settings_from_args(args);
    info!(auth_type = %strategy.auth_type(), "preparing credentials");

    let authenticator = strategy
        .into_authenticator(&SystemCommandRunner, &settings)
        .context("failed to prepare local credentials")?;

    match &args.command {
        Command::Login => {
            println!("{}", authenticator.auth_type());
        }
        Command::Probe { url } => {
            let session = Session::new(url)?;
            let handler = authenticator.auth_handler(&session)?;
            let status = UreqProbe::new()?.run(&session, handler)?;
            info!(status, "probe finished");
            println!("{status}");
        }
    }

    Ok(())
}
