#[macro_use]
extern crate tracing;

#[macro_use]
extern crate derive_more;

use std::process::ExitCode;

use clap::Parser;
use eyre::{Context, Result};
use tracing_subscriber::filter::LevelFilter;

mod cidrs;
mod cli;
mod cluster;
mod debug;
mod exposer;
mod ip;
mod memoizer;
mod reconciler;
mod service;
mod signal;

use self::cli::Args;
use self::exposer::Exposer;
use self::signal::Signals;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(if args.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        })
        .init();

    match try_main(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn try_main(args: Args) -> Result<()> {
    info!(
        "annotation key: {}, bind CIDRs: {:?}, disallowed host port ranges: {:?}",
        args.annotation_key, args.bind_cidrs, args.disallowed_host_port_ranges
    );

    let exposer = Exposer::new(
        &args.annotation_key,
        &args.bind_cidrs,
        &args.disallowed_host_port_ranges,
    )
    .await?;

    let signals = Signals::new().context("failed to register signal handlers")?;
    let shutdown = signals.into_shutdown();

    let expose = {
        let mut shutdown = shutdown.clone();

        async move {
            tokio::select! {
                r = exposer.run() => r,

                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("exiting...");

                    Ok(())
                }
            }
        }
    };

    let debug_server = {
        let mut shutdown = shutdown.clone();

        async move {
            match args.debug_bind_addr {
                Some(addr) => debug::run(addr, shutdown).await,

                None => {
                    let _ = shutdown.wait_for(|stop| *stop).await;

                    Ok(())
                }
            }
        }
    };

    tokio::try_join!(expose, debug_server)?;

    Ok(())
}
