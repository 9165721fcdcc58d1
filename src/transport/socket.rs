
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::Result;
use crate::transport::Transport;

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// SCPI over a raw TCP socket (the "5025" style connection most bench
/// instruments expose). Text responses are read up to the termination byte;
/// binary payloads are pulled with exact-length reads.
pub struct SocketTransport {
	stream: BufReader<TcpStream>,
	read_termination: u8,
}

impl SocketTransport {
	pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_read_timeout(Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)))?;
		stream.set_write_timeout(Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)))?;

		Ok(Self { stream: BufReader::new(stream), read_termination: b'\n' })
	}

	/// Raise the timeout before large waveform transfers; the default is too
	/// tight for worst-case wave data.
	pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
		self.stream.get_ref().set_read_timeout(Some(timeout))?;
		self.stream.get_ref().set_write_timeout(Some(timeout))?;
		Ok(())
	}

	pub fn set_read_termination(&mut self, term: u8) {
		self.read_termination = term;
	}
}

impl Transport for SocketTransport {
	fn write_raw(&mut self, data: &[u8]) -> Result<usize> {
		self.stream.get_mut().write_all(data)?;
		Ok(data.len())
	}

	fn read(&mut self) -> Result<Vec<u8>> {
		let mut buf: Vec<u8> = vec![];
		self.stream.read_until(self.read_termination, &mut buf)?;
		Ok(buf)
	}

	fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
		let mut buf: Vec<u8> = vec![0; n];
		Read::read_exact(&mut self.stream, &mut buf)?;
		Ok(buf)
	}

	fn close(&mut self) -> Result<()> {
		self.stream.get_ref().shutdown(Shutdown::Both)?;
		Ok(())
	}
}
