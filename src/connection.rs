//! Connection module
//!
//! One established TCP stream in non-blocking mode with line buffering. Shared by
//! the server (for its held client) and the client.

use log::{debug, error, trace};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::line::LineBuffer;

/// Read chunk size
const READ_CHUNK: usize = 512;

pub(crate) struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    lines: LineBuffer,
    write_timeout: Duration,
    /// Peer closed or the socket failed; only buffered data is left
    closed: bool,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, max_line_length: usize, write_timeout: Duration) -> Result<Self> {
        let peer = stream
            .peer_addr()
            .map_err(|e| Error::TcpError(format!("Failed to get peer address: {}", e)))?;

        // Never block the poll loop on reads
        stream
            .set_nonblocking(true)
            .map_err(|e| Error::TcpError(format!("Failed to set non-blocking mode for {}: {}", peer, e)))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to disable Nagle for {}: {}", peer, e);
        }

        Ok(Self {
            stream,
            peer,
            lines: LineBuffer::new(max_line_length),
            write_timeout,
            closed: false,
        })
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the peer may still send; buffered lines can remain after this turns false
    pub(crate) fn is_open(&self) -> bool {
        if self.closed {
            return false;
        }
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) if is_transient(&e) => true,
            Err(_) => false,
        }
    }

    /// Peer gone and nothing left to hand out through `poll_line`
    pub(crate) fn is_finished(&self) -> bool {
        self.lines.is_empty() && !self.is_open()
    }

    /// Drains whatever the socket has without blocking
    fn fill(&mut self) {
        if self.closed {
            return;
        }
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    debug!("Peer {} closed the connection", self.peer);
                    self.closed = true;
                    return;
                }
                Ok(n) => {
                    if log::log_enabled!(log::Level::Trace) {
                        trace!("{} bytes from {}", n, self.peer);
                    }
                    self.lines.extend(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_transient(&e) => return,
                Err(e) => {
                    error!("Error reading from {}: {}", self.peer, e);
                    self.closed = true;
                    return;
                }
            }
        }
    }

    /// Next received line, if one is complete.
    ///
    /// Once the peer has closed, a trailing unterminated line is returned as well.
    pub(crate) fn poll_line(&mut self) -> Option<String> {
        self.fill();
        if let Some(line) = self.lines.next_line() {
            return Some(line);
        }
        if self.closed {
            return self.lines.take_remainder();
        }
        if log::log_enabled!(log::Level::Trace) && !self.lines.is_empty() {
            trace!("{} bytes of partial line from {}", self.lines.len(), self.peer);
        }
        None
    }

    /// Writes all of `data`, waiting out a full send buffer for at most the write timeout
    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let started = Instant::now();
        let mut written = 0;
        while written < data.len() {
            match self.stream.write(&data[written..]) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "connection closed")),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if started.elapsed() >= self.write_timeout {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "send buffer full"));
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(e),
            }
        }
        if let Err(e) = self.stream.flush() {
            if !is_transient(&e) {
                return Err(e);
            }
        }
        if log::log_enabled!(log::Level::Trace) {
            trace!("{} bytes to {}", written, self.peer);
        }
        Ok(written)
    }

    pub(crate) fn close(&mut self) {
        self.lines.clear();
        self.closed = true;
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => debug!("Shutdown of {} failed: {}", self.peer, e),
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
