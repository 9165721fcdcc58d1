
use std::collections::VecDeque;
use std::io::{Error, ErrorKind};

use awg_scpi::error::Result;
use awg_scpi::Transport;

/// Scripted stand-in for an instrument connection: records every raw write
/// and serves canned response bytes, so driver behavior can be checked down
/// to the exact wire traffic.
pub struct MockTransport {
	pub writes: Vec<Vec<u8>>,
	rx: VecDeque<u8>,
}

impl MockTransport {
	pub fn new() -> Self {
		Self { writes: vec![], rx: VecDeque::new() }
	}

	/// Queue a text response line, newline terminated.
	pub fn push_line(&mut self, line: &str) {
		self.rx.extend(line.as_bytes());
		self.rx.push_back(b'\n');
	}

	/// Queue raw response bytes exactly as given.
	pub fn push_bytes(&mut self, bytes: &[u8]) {
		self.rx.extend(bytes);
	}

	/// Everything written so far, one string per raw write call.
	pub fn written(&self) -> Vec<String> {
		self.writes.iter().map(|w| String::from_utf8_lossy(w).to_string()).collect()
	}
}

impl Transport for MockTransport {
	fn write_raw(&mut self, data: &[u8]) -> Result<usize> {
		self.writes.push(data.to_vec());
		Ok(data.len())
	}

	fn read(&mut self) -> Result<Vec<u8>> {
		if self.rx.is_empty() {
			return Err(Error::new(ErrorKind::TimedOut, "no scripted response").into());
		}

		let mut out: Vec<u8> = vec![];
		while let Some(b) = self.rx.pop_front() {
			out.push(b);
			if b == b'\n' {
				break;
			}
		}
		Ok(out)
	}

	fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
		if self.rx.len() < n {
			return Err(Error::new(ErrorKind::TimedOut, "scripted response too short").into());
		}
		Ok(self.rx.drain(..n).collect())
	}
}
