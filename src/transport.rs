use log::{debug, info, warn};
use std::io::{Read, Write};
use std::time::Duration;
use tokio_serial::{ClearBuffer, FlowControl, SerialPort};

use crate::error::TransportError;

/// A duplex byte stream the receive loop can poll.
pub trait Transport: Send {
    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    /// Read exactly `n` bytes.
    fn read(&mut self, n: usize) -> Result<Vec<u8>, TransportError>;

    /// Write all of `bytes`, blocking until done.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Discard anything received but not yet read.
    fn flush_input(&mut self) -> Result<(), TransportError>;

    /// Discard anything written but not yet sent.
    fn flush_output(&mut self) -> Result<(), TransportError>;

    /// Release the underlying device. Later calls fail with `TransportError::Closed`.
    fn close(&mut self);

    /// Human readable name for logs.
    fn name(&self) -> &str;
}

/// Where and how to open a serial port.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub name: String,
    pub baud_rate: u32,
    /// Read timeout of the port. Also used as the poll interval of the receive loop.
    pub timeout: Duration,
}

impl SerialConfig {
    pub fn new(name: impl Into<String>, baud_rate: u32) -> Self {
        SerialConfig {
            name: name.into(),
            baud_rate,
            timeout: Duration::from_millis(100),
        }
    }
}

/// A blocking serial port.
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        info!(
            "Opening serial port {} at {} baud.",
            config.name, config.baud_rate
        );
        let port = tokio_serial::new(config.name.as_str(), config.baud_rate)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|source| TransportError::Open {
                name: config.name.clone(),
                source,
            })?;
        info!("Serial port {} open.", config.name);
        Ok(SerialTransport {
            name: config.name.clone(),
            port: Some(port),
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(self.port()?.bytes_to_read()? as usize)
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; n];
        self.port()?.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        Ok(self.port()?.clear(ClearBuffer::Input)?)
    }

    fn flush_output(&mut self) -> Result<(), TransportError> {
        Ok(self.port()?.clear(ClearBuffer::Output)?)
    }

    fn close(&mut self) {
        match self.port.take() {
            Some(_) => debug!("Closed serial port {}.", self.name),
            None => warn!("Serial port {} already closed.", self.name),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct State {
        rx: VecDeque<u8>,
        written: Vec<Vec<u8>>,
        fail_reads: bool,
        fail_writes: bool,
        closed: bool,
    }

    /// In-memory transport. Clones share the same state, so a test can keep a handle
    /// while the engine owns another.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        state: Arc<Mutex<State>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_rx(&self, bytes: &[u8]) {
            self.state.lock().unwrap().rx.extend(bytes.iter().copied());
        }

        pub fn written(&self) -> Vec<Vec<u8>> {
            self.state.lock().unwrap().written.clone()
        }

        pub fn fail_reads(&self) {
            self.state.lock().unwrap().fail_reads = true;
        }

        pub fn fail_writes(&self) {
            self.state.lock().unwrap().fail_writes = true;
        }

        pub fn is_closed(&self) -> bool {
            self.state.lock().unwrap().closed
        }
    }

    impl Transport for MockTransport {
        fn bytes_available(&mut self) -> Result<usize, TransportError> {
            let state = self.state.lock().unwrap();
            if state.closed {
                return Err(TransportError::Closed);
            }
            if state.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged").into());
            }
            Ok(state.rx.len())
        }

        fn read(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
            let mut state = self.state.lock().unwrap();
            let n = n.min(state.rx.len());
            Ok(state.rx.drain(..n).collect())
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(TransportError::Closed);
            }
            if state.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged").into());
            }
            state.written.push(bytes.to_vec());
            Ok(())
        }

        fn flush_input(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn flush_output(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&mut self) {
            self.state.lock().unwrap().closed = true;
        }

        fn name(&self) -> &str {
            "mock"
        }
    }
}
