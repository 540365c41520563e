//! OBD-II Gateway
//!
//! Serves ELM327-speaking scanner apps over TCP. One single-threaded loop
//! accepts a client, feeds its bytes to the session, ticks the vehicle
//! model and CAN bridge, and writes replies back.

mod config;
mod gateway;
mod poller;
mod transport;

pub use crate::config::{GatewayConfig, LogConfig, PollConfig, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use crate::gateway::{Gateway, GatewayStatistics};
pub use crate::poller::PidPoller;
pub use crate::transport::{Outbound, TcpTransport};

use std::future::Future;
use std::io;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use can_bridge::{Clock, MonotonicClock, VirtualCan};
use obd_session::SessionEvent;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Client read buffer size
const READ_BUFFER: usize = 512;

/// Initialize the global tracing subscriber
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let level = Level::from_str(&config.level)
        .map_err(|_| anyhow::anyhow!("invalid log level '{}'", config.level))?;

    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);
    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("Failed to set tracing subscriber")
}

/// Bind the configured address and serve until Ctrl-C
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", listener.local_addr()?);

    serve(listener, config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler failed: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    })
    .await
}

/// Run the gateway loop on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, config: GatewayConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let (transport, mut outbound) = TcpTransport::new();
    let advertising = transport.advertising_flag();
    let mut gateway = Gateway::new(&config, VirtualCan::new(), transport, clock)?;

    let mut tick = tokio::time::interval(Duration::from_millis(config.tick_ms.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let diagnostics_enabled = config.diagnostics_interval_s > 0;
    let mut diagnostics = tokio::time::interval(Duration::from_secs(config.diagnostics_interval_s.max(1)));
    diagnostics.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut reader: Option<OwnedReadHalf> = None;
    let mut writer: Option<OwnedWriteHalf> = None;
    let mut buf = [0u8; READ_BUFFER];
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept(), if reader.is_none() && advertising.load(Ordering::SeqCst) => {
                match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("TCP_NODELAY failed for {}: {}", peer, e);
                        }
                        let (r, w) = stream.into_split();
                        reader = Some(r);
                        writer = Some(w);
                        gateway.handle_event(SessionEvent::Connected { peer: peer.to_string() });
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                }
            }
            read = read_client(&mut reader, &mut buf) => {
                match read {
                    Ok(0) | Err(_) => {
                        reader = None;
                        writer = None;
                        gateway.handle_event(SessionEvent::Disconnected);
                    }
                    Ok(n) => gateway.handle_event(SessionEvent::DataReceived(buf[..n].to_vec())),
                }
            }
            Some(item) = outbound.recv() => {
                match item {
                    Outbound::Data(bytes) => {
                        if let Some(w) = writer.as_mut() {
                            if let Err(e) = w.write_all(&bytes).await {
                                warn!("Client write failed: {}", e);
                                reader = None;
                                writer = None;
                                gateway.handle_event(SessionEvent::Disconnected);
                            }
                        }
                    }
                    Outbound::Disconnect => {
                        reader = None;
                        writer = None;
                    }
                }
            }
            _ = tick.tick() => gateway.tick(),
            _ = diagnostics.tick(), if diagnostics_enabled => gateway.print_diagnostics(),
            _ = &mut shutdown => break,
        }
    }

    gateway.shutdown();
    Ok(())
}

/// Read from the client, or wait forever when there is none
async fn read_client(reader: &mut Option<OwnedReadHalf>, buf: &mut [u8]) -> io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}
