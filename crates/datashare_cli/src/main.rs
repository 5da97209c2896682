//! CLI probe for the persistence runtime.
//!
//! # Responsibility
//! - Start the runtime from a JSON config file and report pool health and
//!   ledger height.
//! - Exit non-zero when startup fails, so deploy scripts can gate on it.

use datashare_core::{AppConfig, PersistenceRuntime};
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("usage: datashare_cli <config.json>");
        return ExitCode::from(2);
    };

    match probe(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_probe module=cli status=error error={err}");
            eprintln!("datashare_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn probe(config_path: &str) -> Result<(), datashare_core::DataError> {
    let config = AppConfig::load(config_path)?;
    let mut runtime = PersistenceRuntime::start(&config)?;

    println!("datashare_core version={}", datashare_core::core_version());
    for (route, status) in runtime.pool_status() {
        println!(
            "pool route={} name={} size={} idle={} in_use={} healthy={}",
            route, status.name, status.size, status.idle, status.in_use, status.healthy
        );
    }
    let height = runtime.ledger().height()?;
    println!(
        "ledger endpoint={} height={}",
        runtime.ledger().endpoint(),
        height
    );

    runtime.shutdown();
    Ok(())
}
