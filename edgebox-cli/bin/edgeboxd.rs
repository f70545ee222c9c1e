use std::process::ExitCode;

use clap::Parser;
use edgebox_cli::{
    init_logging,
    term::{CHECKMARK, CROSSMARK},
    wait_for_signal, CliResult, DaemonBuilder, EdgeboxdArgs,
};
use edgebox_core::config::DaemonConfig;
use edgebox_utils::get_config_path;

//--------------------------------------------------------------------------------------------------
// Functions: Main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args = EdgeboxdArgs::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("edgeboxd failed: {}", e);
            eprintln!("{} {}", &*CROSSMARK, e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: EdgeboxdArgs) -> CliResult<()> {
    // An explicitly given file must exist
    let config_path = args.config.clone().unwrap_or_else(get_config_path);
    let mut config = DaemonConfig::load(&config_path, args.config.is_some())?;
    args.apply(&mut config);

    // Initialize tracing; the guard flushes the log file on exit
    let _guard = init_logging(&config.log)?;
    tracing::info!("loaded configuration from {}", config_path.display());

    let mut daemon = DaemonBuilder::new(config).with_default_services()?.build();
    daemon.start().await?;

    println!(
        "{} edgeboxd listening on {}",
        &*CHECKMARK,
        console::style(daemon.socket_path().display()).yellow()
    );

    let signal = wait_for_signal().await?;
    tracing::info!("received {}, shutting down", signal);
    daemon.stop().await;

    Ok(())
}
