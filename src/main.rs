//! BTC-USD level2 recorder
//!
//! Wires the feed driver and writer together and handles process
//! lifecycle: logging, configuration, signals, clean shutdown.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use l2_recorder::feed::CoinbaseFeed;
use l2_recorder::infrastructure::logging;
use l2_recorder::{Config, RecorderError, Result};

fn main() -> ExitCode {
    let _guards = logging::init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = Config::load()?;
    info!(
        pair = %config.recorder.pair,
        data_dir = %config.data_dir().display(),
        "starting recorder"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| RecorderError::Config(format!("signal handler: {e}")))?;
    }

    let mut feed = CoinbaseFeed::new(&config)?;
    feed.start();
    info!("recording; press Ctrl+C to stop");

    // connection close also ends the run
    while !shutdown.load(Ordering::SeqCst) && feed.is_running() {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("stopping feed");
    feed.stop();
    feed.join();
    info!("recorder stopped");
    Ok(())
}
