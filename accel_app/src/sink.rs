//! Outbound side: labeled numeric fields with a timestamp, encoded as
//! InfluxDB line protocol and pushed over a TCP connection.
//!
//! Encoding is kept separate from transport so the format is testable
//! without a socket, and so another transport can be dropped in behind
//! the same trait. Nothing here buffers: a write that fails is lost,
//! which is the right trade for a monitoring feed.

use std::fmt;
use std::io::{self, Write as _};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

#[derive(Debug)]
pub enum SinkError {
    /// Worth retrying on a later tick; the connection has been dropped
    /// and will be re-established on the next write.
    Retryable(io::Error),
    /// The sink can no longer be used at all.
    Fatal(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Retryable(e) => write!(f, "sink write failed (retryable): {}", e),
            SinkError::Fatal(msg) => write!(f, "sink failed fatally: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

pub trait Sink {
    fn write(
        &mut self,
        measurement: &str,
        fields: &[(&str, f64)],
        timestamp: SystemTime,
    ) -> Result<(), SinkError>;
}

impl<T: Sink + ?Sized> Sink for Box<T> {
    fn write(
        &mut self,
        measurement: &str,
        fields: &[(&str, f64)],
        timestamp: SystemTime,
    ) -> Result<(), SinkError> {
        (**self).write(measurement, fields, timestamp)
    }
}

/// Escapes measurement names: commas and spaces carry structure.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escapes field keys: commas, spaces and equals carry structure.
fn escape_key(s: &str) -> String {
    escape_measurement(s).replace('=', "\\=")
}

/// Renders one line-protocol record with a nanosecond timestamp.
pub fn line_protocol(measurement: &str, fields: &[(&str, f64)], timestamp: SystemTime) -> String {
    let ns = timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let mut line = escape_measurement(measurement);
    line.push(' ');
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_string());
    }
    line.push(' ');
    line.push_str(&ns.to_string());
    line
}

/// Line protocol over a plain TCP connection (an InfluxDB/Telegraf
/// socket listener). Connects lazily, reconnects after any failure.
pub struct InfluxTcpSink {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl InfluxTcpSink {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout,
            stream: None,
        }
    }

    fn open(&self) -> Result<TcpStream, SinkError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(SinkError::Retryable)?
            .next()
            .ok_or_else(|| {
                SinkError::Fatal(format!("{}:{} resolves to no address", self.host, self.port))
            })?;
        let stream =
            TcpStream::connect_timeout(&addr, self.timeout).map_err(SinkError::Retryable)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(SinkError::Retryable)?;
        info!("connected to sink at {}", addr);
        Ok(stream)
    }
}

impl Sink for InfluxTcpSink {
    fn write(
        &mut self,
        measurement: &str,
        fields: &[(&str, f64)],
        timestamp: SystemTime,
    ) -> Result<(), SinkError> {
        let line = line_protocol(measurement, fields, timestamp);
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.open()?,
        };
        match stream
            .write_all(line.as_bytes())
            .and_then(|_| stream.write_all(b"\n"))
        {
            Ok(()) => {
                debug!("sent: {}", line);
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                // Leave the stream dropped; the next write reconnects.
                warn!("dropping sink connection after write error: {}", e);
                Err(SinkError::Retryable(e))
            }
        }
    }
}

/// Logs samples instead of sending them anywhere. Used for dry runs.
pub struct LogSink;

impl Sink for LogSink {
    fn write(
        &mut self,
        measurement: &str,
        fields: &[(&str, f64)],
        timestamp: SystemTime,
    ) -> Result<(), SinkError> {
        info!("{}", line_protocol(measurement, fields, timestamp));
        Ok(())
    }
}
