//! Reference worker: serves every procedure by counting it.
//!
//! Launched by a driver with `--mli-socket-loc <address>` appended to its
//! arguments. On shutdown it prints its serve summary as JSON on stdout.

use std::process;

use anyhow::Context;
use mli::{ProcedureId, SessionConfig, logging::init_tracing, run_worker};

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: mli-echo-worker {} <address>", mli::SETUP_FLAG);
        eprintln!();
        eprintln!("Normally started by a driver, which appends the flag itself.");
        process::exit(2);
    }

    if let Err(e) = run(args).await {
        match e.downcast_ref::<mli::Error>() {
            Some(err) => tracing::error!(error = %e, code = err.code().code(), "Worker failed"),
            None => tracing::error!(error = %e, "Worker failed"),
        }
        process::exit(1);
    }
}

async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let config = SessionConfig::from_env();

    let mut count: i64 = 0;
    let mut table = |id: ProcedureId| {
        count += 1;
        tracing::debug!(%id, count, "Echoing request");
        count
    };

    let summary = run_worker(args, &mut table, config).await?;
    let json = serde_json::to_string(&summary).context("serializing serve summary")?;
    println!("{json}");
    Ok(())
}
