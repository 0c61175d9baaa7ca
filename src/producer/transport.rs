//! Transport primitives for talking to the collector.
//!
//! A connection lives for exactly one flush cycle. [`Connector`] and
//! [`CollectorConnection`] are the seam the flush cycle is generic over;
//! [`TcpConnector`] is the production implementation.

use std::{
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use thiserror::Error;

use crate::log_record::LogRecord;

use super::codec::{self, CodecError, ResultCode};

/// Failure that leaves the connection unusable.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The collector address could not be resolved.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// No resolved address accepted the connection.
    #[error("unable to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// Writing or reading a frame failed part way.
    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),
    /// The collector sent something that is not a valid `Log` reply.
    #[error("malformed collector response: {0}")]
    Protocol(#[from] CodecError),
}

/// Rejection of a single call that leaves the connection usable.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("collector asked to try later")]
    TryLater,
}

/// Outcome of a failed `Log` call.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Item(#[from] ItemError),
}

/// Opens connections to the collector.
pub trait Connector: Send + 'static {
    type Connection: CollectorConnection;

    /// Open a fresh connection for one flush cycle.
    fn connect(&self) -> Result<Self::Connection, ConnectionError>;
}

/// A connection able to deliver `Log` calls.
pub trait CollectorConnection {
    /// Deliver `records` in a single `Log` call.
    fn log(&mut self, records: &[LogRecord]) -> Result<(), SendError>;

    /// Close the connection, discarding any error.
    ///
    /// Every record has already been settled when this runs, so a failed
    /// close cannot change the outcome of the cycle.
    fn close_best_effort(self);
}

/// Connects to a Scribe collector over TCP.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    host: String,
    port: u16,
    timeout: Duration,
    max_frame_size: usize,
}

impl TcpConnector {
    /// `timeout` bounds the connect and every subsequent read and write.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration, max_frame_size: usize) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            max_frame_size,
        }
    }

    fn socket_addrs(&self) -> Result<Vec<SocketAddr>, ConnectionError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|iter| iter.collect())
            .map_err(|source| ConnectionError::Resolve {
                host: self.host.clone(),
                port: self.port,
                source,
            })
    }

    fn connect_error(&self, source: io::Error) -> ConnectionError {
        ConnectionError::Connect {
            host: self.host.clone(),
            port: self.port,
            source,
        }
    }
}

impl Connector for TcpConnector {
    type Connection = TcpConnection;

    fn connect(&self) -> Result<TcpConnection, ConnectionError> {
        let mut last_err = None;
        for addr in self.socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .and_then(|()| stream.set_write_timeout(Some(self.timeout)))
                        .and_then(|()| stream.set_nodelay(true))
                        .map_err(|err| self.connect_error(err))?;
                    return Ok(TcpConnection {
                        stream,
                        max_frame_size: self.max_frame_size,
                        next_seq: 0,
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(self.connect_error(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved")
        })))
    }
}

/// An open TCP connection to the collector.
pub struct TcpConnection {
    stream: TcpStream,
    max_frame_size: usize,
    next_seq: i32,
}

impl TcpConnection {
    /// Write one frame and read the collector's framed reply.
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<Vec<u8>, ConnectionError> {
        self.stream.write_all(frame)?;
        self.stream.flush()?;
        Ok(codec::read_frame(&mut self.stream, self.max_frame_size)?)
    }

    fn next_seq(&mut self) -> i32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }
}

impl CollectorConnection for TcpConnection {
    fn log(&mut self, records: &[LogRecord]) -> Result<(), SendError> {
        let seq = self.next_seq();
        let frame = codec::encode_log_request(records, seq).map_err(ConnectionError::from)?;
        let reply = self.send_frame(&frame)?;
        match codec::decode_log_response(&reply, seq).map_err(ConnectionError::from)? {
            ResultCode::Ok => Ok(()),
            ResultCode::TryLater => Err(ItemError::TryLater.into()),
        }
    }

    fn close_best_effort(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
