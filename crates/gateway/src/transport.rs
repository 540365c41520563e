//! TCP link for the session
//!
//! The session writes synchronously; bytes go into a channel drained by
//! the async loop, which owns the socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use obd_session::{format_mac, SessionError, Transport, TransportKind};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Work for the socket side of the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Data(Vec<u8>),
    Disconnect,
}

/// Channel-backed [`Transport`]
///
/// "Advertising" means the listener accepts a new client.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    advertising: Arc<AtomicBool>,
    device_name: String,
}

impl TcpTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            outbound: tx,
            advertising: Arc::new(AtomicBool::new(false)),
            device_name: String::new(),
        };
        (transport, rx)
    }

    /// Shared flag the accept branch checks
    pub fn advertising_flag(&self) -> Arc<AtomicBool> {
        self.advertising.clone()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn send(&self, item: Outbound) -> Result<(), SessionError> {
        self.outbound
            .send(item)
            .map_err(|_| SessionError::Transport("socket task gone".to_string()))
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.send(Outbound::Data(bytes.to_vec()))
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        self.send(Outbound::Disconnect)
    }

    fn start_advertising(&mut self) -> Result<(), SessionError> {
        if !self.advertising.swap(true, Ordering::SeqCst) {
            info!("Accepting clients as '{}'", self.device_name);
        }
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), SessionError> {
        self.advertising.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_device_name(&mut self, name: &str) -> Result<(), SessionError> {
        self.device_name = name.to_string();
        Ok(())
    }

    fn set_address(&mut self, address: [u8; 6]) -> Result<(), SessionError> {
        // TCP has no hardware address to rewrite
        debug!("Ignoring address override {} on TCP link", format_mac(&address));
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_reach_channel_in_order() {
        let (mut transport, mut rx) = TcpTransport::new();
        transport.write(b"OK\r>").unwrap();
        transport.disconnect().unwrap();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Data(b"OK\r>".to_vec()));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Disconnect);
    }

    #[test]
    fn test_advertising_flag_shared() {
        let (mut transport, _rx) = TcpTransport::new();
        let flag = transport.advertising_flag();
        transport.start_advertising().unwrap();
        assert!(flag.load(Ordering::SeqCst));
        transport.stop_advertising().unwrap();
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_write_after_receiver_dropped_fails() {
        let (mut transport, rx) = TcpTransport::new();
        drop(rx);
        assert!(transport.write(b"x").is_err());
    }
}
