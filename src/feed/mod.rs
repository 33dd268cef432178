//! Coinbase level2 feed driver
//!
//! Runs the WebSocket event loop on a dedicated thread pinned to one CPU,
//! parses each complete text frame and enqueues rows for the writer. The
//! transport delivers reassembled frames; the parser never sees fragments.

pub mod socket;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::Notify;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{error, info, warn};

use crate::infrastructure::config::Config;
use crate::parsing::CoinbaseParser;
use crate::writer::{L2Writer, WriterHandle, WriterOpt};
use crate::{RecorderError, Result};

/// API credentials, read from the environment.
/// Present for authenticated channels; unused on the level2 update path.
#[derive(Debug, Clone)]
pub struct CoinbaseCredentials {
    pub key_name: String,
    pub private_key: String,
}

impl CoinbaseCredentials {
    /// Both COINBASE_KEY_NAME and COINBASE_PRIVATE_KEY must be set
    pub fn from_env() -> Option<Self> {
        let key_name = std::env::var("COINBASE_KEY_NAME").ok()?;
        let private_key = std::env::var("COINBASE_PRIVATE_KEY").ok()?;
        Some(Self {
            key_name,
            private_key,
        })
    }
}

struct FeedShared {
    running: AtomicBool,
    shutdown: Notify,
    product: String,
    ws_url: String,
    pin_core: Option<usize>,
    writer: WriterHandle,
}

/// Owns the feed thread and the downstream writer.
///
/// Exactly one feed per process: construction acquires process-scoped
/// resources (mlockall).
pub struct CoinbaseFeed {
    shared: Arc<FeedShared>,
    creds: Option<CoinbaseCredentials>,
    writer: L2Writer,
    thread: Option<JoinHandle<()>>,
}

impl CoinbaseFeed {
    pub fn new(config: &Config) -> Result<Self> {
        lock_memory();

        let creds = CoinbaseCredentials::from_env();
        if creds.is_some() {
            info!("coinbase credentials loaded from environment");
        }

        let opt = WriterOpt::new(config.data_dir(), config.recorder.pair.clone())
            .fsync_every_rows(config.recorder.fsync_every_rows);
        let writer = L2Writer::new(opt);

        let shared = Arc::new(FeedShared {
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            product: config.recorder.pair.clone(),
            ws_url: config.feed.ws_url.clone(),
            pin_core: config.feed.pin_core,
            writer: writer.handle(),
        });

        Ok(Self {
            shared,
            creds,
            writer,
            thread: None,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.creds.is_some()
    }

    /// Start the writer and the feed thread; idempotent.
    pub fn start(&mut self) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.writer.start();

        let shared = self.shared.clone();
        match thread::Builder::new()
            .name("coinbase-feed".to_string())
            .spawn(move || run(shared))
        {
            Ok(handle) => self.thread = Some(handle),
            Err(e) => {
                error!(error = %e, "failed to spawn feed thread");
                self.shared.running.store(false, Ordering::Release);
            }
        }
    }

    /// Request shutdown: clears the running flag and wakes the event loop
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.shutdown.notify_one();
    }

    /// False once the event loop has exited (connection closed or stop)
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Join the feed thread, then drain and join the writer
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.writer.stop();
        self.writer.join();
        info!(dropped = self.writer.dropped(), "writer drained");
    }
}

/// Lock current and future pages to avoid faults on the hot path
fn lock_memory() {
    // SAFETY: mlockall has no memory-safety preconditions
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if rc != 0 {
        warn!(
            error = %std::io::Error::last_os_error(),
            "mlockall failed; page faults possible on the hot path"
        );
    }
}

/// Feed thread body: pin, build a current-thread runtime, run the event
/// loop, then clear the running flag so the owner can shut down.
fn run(shared: Arc<FeedShared>) {
    if let Some(core) = shared.pin_core {
        if core_affinity::set_for_current(core_affinity::CoreId { id: core }) {
            info!(core, "feed thread pinned");
        } else {
            warn!(core, "unable to pin feed thread");
        }
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build feed runtime");
            shared.running.store(false, Ordering::Release);
            return;
        }
    };

    if let Err(e) = rt.block_on(run_connection(&shared)) {
        error!(error = %e, "feed connection ended with error");
    }

    shared.running.store(false, Ordering::Release);
    info!("feed event loop exited");
}

async fn run_connection(shared: &FeedShared) -> Result<()> {
    info!(url = %shared.ws_url, "connecting");
    let (ws, _) = connect_async(shared.ws_url.as_str())
        .await
        .map_err(|e| RecorderError::WebSocket(e.to_string()))?;
    info!("connected");

    socket::tune(ws.get_ref());

    let (mut write, mut read) = ws.split();

    let sub = format!(
        r#"{{"type":"subscribe","product_ids":["{}"],"channel":"level2"}}"#,
        shared.product
    );
    write
        .send(Message::text(sub))
        .await
        .map_err(|e| RecorderError::WebSocket(e.to_string()))?;
    info!(product = %shared.product, "level2 subscription sent");

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    CoinbaseParser::parse_frame(text.as_bytes(), |row| {
                        shared.writer.enqueue(row);
                    });
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    info!("connection closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket error");
                    break;
                }
                None => {
                    info!("websocket stream ended");
                    break;
                }
            },
            _ = shared.shutdown.notified() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    Ok(())
}
