use std::io::{self, ErrorKind, Read, Write};
use std::time::Instant;

use mio::Token;
use mio::net::TcpStream;

use crate::http::response::HttpResponse;
use crate::prelude::READ_BUF_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reading,
    Parsed,
    Writing,
    CgiPending,
    Closing,
}

#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub token: Token,
    pub state: ConnectionState,
    pub in_buffer: Vec<u8>,
    pub out_buffer: Vec<u8>,
    pub out_offset: usize,
    pub last_activity: Instant,
    pub listen_port: u16,
    pub server_index: usize,
    pub close_after_write: bool,
    pub peer_closed: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, token: Token, listen_port: u16, server_index: usize) -> Self {
        Self {
            stream,
            token,
            state: ConnectionState::Connected,
            in_buffer: Vec::new(),
            out_buffer: Vec::new(),
            out_offset: 0,
            last_activity: Instant::now(),
            listen_port,
            server_index,
            close_after_write: false,
            peer_closed: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Drains the socket into the input buffer until `WouldBlock` or EOF.
    /// A transport error is returned to the caller, which closes the client.
    pub fn read_into_buffer(&mut self) -> io::Result<()> {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.peer_closed = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.touch();
                    self.in_buffer.extend_from_slice(&buf[..n]);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Flushes `out_buffer[out_offset..]` until `WouldBlock` or drained.
    pub fn write_from_buffer(&mut self) -> io::Result<()> {
        while self.out_offset < self.out_buffer.len() {
            match self.stream.write(&self.out_buffer[self.out_offset..]) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    self.touch();
                    self.out_offset += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn drained(&self) -> bool {
        self.out_offset >= self.out_buffer.len()
    }

    /// Installs a serialized response and flips the connection to WRITING.
    /// Every response in this design closes the connection once drained.
    pub fn install_response(&mut self, res: &HttpResponse) {
        self.out_buffer = res.serialize();
        self.out_offset = 0;
        self.state = ConnectionState::Writing;
        self.close_after_write = true;
        self.touch();
    }
}
