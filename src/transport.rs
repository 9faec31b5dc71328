//! Byte transport between the host and a DL24.
//!
//! The control logic only needs [`Transport::write`]. Inbound data is pushed:
//! whoever owns the link calls back with every chunk it receives, usually
//! straight into [`TelemetryState::ingest`].

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};
use serialport::SerialPort;

use crate::codec::hex;
use crate::constants::*;
use crate::error::Result;
use crate::telemetry::TelemetryState;

/// Outbound half of a device link
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send one complete frame. No retries happen above this call.
    async fn write(&mut self, frame: &[u8]) -> Result<()>;
}

/// DL24 reached through a serial line (USB adapter or BLE-UART bridge)
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Open `port_name` and feed every received chunk into `telemetry`
    pub fn open(port_name: &str, baud_rate: u32, mut telemetry: TelemetryState) -> Result<Self> {
        Self::open_with(port_name, baud_rate, move |chunk| {
            telemetry.ingest(chunk);
        })
    }

    /// Open `port_name` and call `on_chunk` from a reader thread for every received chunk
    pub fn open_with<F>(port_name: &str, baud_rate: u32, mut on_chunk: F) -> Result<Self>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(TIMEOUT_MS))
            .open()?;
        let mut rx_port = port.try_clone()?;
        let running = Arc::new(AtomicBool::new(true));

        let reader = thread::spawn({
            let running = Arc::clone(&running);
            move || {
                let mut buf = [0u8; READ_CHUNK_LEN];
                while running.load(Ordering::Relaxed) {
                    match rx_port.read(&mut buf) {
                        Ok(0) => {}
                        Ok(n) => on_chunk(&buf[..n]),
                        Err(e) if e.kind() == ErrorKind::TimedOut => {}
                        Err(e) => {
                            error!("Serial read failed: {}", e);
                            break;
                        }
                    }
                }
            }
        });

        info!("Opened {} at {} baud", port_name, baud_rate);
        Ok(SerialTransport {
            port,
            running,
            reader: Some(reader),
        })
    }

    /// List available serial ports
    pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        Ok(serialport::available_ports()?)
    }
}

impl Transport for SerialTransport {
    async fn write(&mut self, frame: &[u8]) -> Result<()> {
        debug!("TX frame: {}", hex(frame));
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}
