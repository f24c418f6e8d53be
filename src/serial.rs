use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::codec::Codec;
use crate::error::{Error, Result, TransportError};
use crate::hdlc::{Framer, HdlcCodec};
use crate::inbox::Inbox;
use crate::statistics::{Statistics, StatisticsSnapshot};
use crate::transport::{SerialConfig, SerialTransport, Transport};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Shared<T, C> {
    name: String,
    transport: Mutex<T>,
    codec: C,
    inbox: Inbox,
    statistics: Statistics,
    stop: AtomicBool,
    running: AtomicBool,
    poll_interval: Duration,
}

// Closes the transport and marks the loop dead however `run` exits, unwinding included.
struct RunGuard<'a, T: Transport, C: Codec>(&'a Shared<T, C>);

impl<T: Transport, C: Codec> Drop for RunGuard<'_, T, C> {
    fn drop(&mut self) {
        let shared = self.0;
        if thread::panicking() {
            error!("Receive loop on {} panicked.", shared.name);
        }
        shared.stop.store(true, Ordering::SeqCst);
        shared.lock_transport().close();
        shared.running.store(false, Ordering::SeqCst);
        info!("Receive loop on {} stopped.", shared.name);
    }
}

impl<T: Transport, C: Codec> Shared<T, C> {
    fn lock_transport(&self) -> MutexGuard<'_, T> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        info!("Receive loop started on {}.", self.name);
        let _guard = RunGuard(self);

        {
            let mut transport = self.lock_transport();
            if let Err(e) = transport.flush_input() {
                warn!("Could not flush input of {}: {e}", self.name);
            }
            if let Err(e) = transport.flush_output() {
                warn!("Could not flush output of {}: {e}", self.name);
            }
        }

        let mut framer = Framer::new(C::FRAME_DELIMITER);
        while !self.stop.load(Ordering::SeqCst) {
            let rx_bytes = match self.read_available() {
                Ok(rx_bytes) => rx_bytes,
                Err(e) => {
                    error!("Error while receiving from {}: {e}", self.name);
                    self.stop.store(true, Ordering::SeqCst);
                    break;
                }
            };

            if rx_bytes.is_empty() {
                thread::sleep(self.poll_interval);
                continue;
            }

            debug!("Read {} bytes from {}.", rx_bytes.len(), self.name);
            for byte in rx_bytes {
                if let Some(raw) = framer.find_frame(byte) {
                    self.deliver(&raw);
                }
            }
        }
    }

    fn read_available(&self) -> std::result::Result<Vec<u8>, TransportError> {
        let mut transport = self.lock_transport();
        let n = transport.bytes_available()?;
        if n == 0 {
            return Ok(Vec::new());
        }
        transport.read(n)
    }

    fn deliver(&self, raw: &[u8]) {
        match self.codec.decode(raw) {
            Ok(frame) => {
                self.statistics.record_rx(true);
                debug!("Decoded a frame of {} bytes.", frame.len());
                self.inbox.publish(frame);
            }
            Err(e) => {
                self.statistics.record_rx(false);
                warn!("Dropping a received frame of {} bytes: {e}", raw.len());
            }
        }
    }
}

/// Frames payloads onto a byte stream and picks decoded frames off it.
///
/// A background thread keeps the receive side in sync with the stream. Decoded frames
/// land in a single slot inbox: a frame not collected with [`HdlcSerial::take`] before
/// the next one arrives is lost.
pub struct HdlcSerial<T, C>
where
    T: Transport + 'static,
    C: Codec + Send + Sync + 'static,
{
    shared: Arc<Shared<T, C>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HdlcSerial<SerialTransport, HdlcCodec> {
    /// Open a serial port with the HDLC codec. The port timeout doubles as poll interval.
    pub fn open(config: &SerialConfig) -> std::result::Result<Self, TransportError> {
        let transport = SerialTransport::open(config)?;
        Ok(Self::with_poll_interval(
            transport,
            HdlcCodec::new(),
            config.timeout,
        ))
    }
}

impl<T, C> HdlcSerial<T, C>
where
    T: Transport + 'static,
    C: Codec + Send + Sync + 'static,
{
    pub fn new(transport: T, codec: C) -> Self {
        Self::with_poll_interval(transport, codec, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(transport: T, codec: C, poll_interval: Duration) -> Self {
        HdlcSerial {
            shared: Arc::new(Shared {
                name: transport.name().to_string(),
                transport: Mutex::new(transport),
                codec,
                inbox: Inbox::new(),
                statistics: Statistics::new(),
                stop: AtomicBool::new(false),
                running: AtomicBool::new(false),
                poll_interval,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Spawn the receive thread.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.stop.load(Ordering::SeqCst) {
            return Err(Error::Stopped);
        }
        if worker.is_some() {
            return Err(Error::AlreadyStarted);
        }

        info!("Starting the receive loop on {}.", self.shared.name);
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("hdlc-rx {}", self.shared.name))
            .spawn(move || shared.run())
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                Error::Spawn(e)
            })?;
        *worker = Some(handle);
        Ok(())
    }

    /// Ask the receive thread to finish. Returns without waiting; see [`HdlcSerial::join`].
    pub fn stop(&self) {
        info!("Stopping the {} serial port.", self.shared.name);
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for the receive thread to exit.
    pub fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // A panic has already been logged by the loop itself.
            let _ = handle.join();
        }
    }

    /// False once the receive loop has exited, whether stopped or failed.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Encode `payload` and write it out on the calling thread.
    pub fn transmit(&self, payload: &[u8]) -> Result<()> {
        info!("Got a message to transmit with {} bytes.", payload.len());
        let statistics = &self.shared.statistics;

        let raw = match self.shared.codec.encode(payload) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Error encoding the message: {e}");
                statistics.record_tx(false);
                return Err(Error::Encode(e));
            }
        };

        debug!("Transmitting a frame with {} bytes.", raw.len());
        if let Err(e) = self.shared.lock_transport().write(&raw) {
            error!("Error transmitting on {}: {e}", self.shared.name);
            statistics.record_tx(false);
            return Err(Error::Write(e));
        }

        statistics.record_tx(true);
        Ok(())
    }

    /// Wait up to `timeout` for a decoded frame. `None` on timeout.
    ///
    /// Call repeatedly to keep receiving.
    pub fn take(&self, timeout: Duration) -> Option<Vec<u8>> {
        let frame = self.shared.inbox.take(timeout)?;
        info!("Received a message with {} bytes.", frame.len());
        Some(frame)
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.shared.statistics.snapshot()
    }

    pub fn clear_statistics(&self) {
        self.shared.statistics.clear();
    }
}

impl<T, C> Drop for HdlcSerial<T, C>
where
    T: Transport + 'static,
    C: Codec + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.join();
    }
}
