
use crate::error::{AwgError, Result};

pub mod socket;

/// Blocking byte-level contract every instrument connection must satisfy.
///
/// Deliberately narrow: message termination, command prefixes and the Siglent
/// chunked-write workaround all live in the driver core, so a transport only
/// moves bytes. All operations block until completion or error; transport
/// failures surface as `AwgError::Transport` and are never swallowed.
pub trait Transport {
	/// Send one raw chunk of bytes. Returns the number of bytes written.
	fn write_raw(&mut self, data: &[u8]) -> Result<usize>;

	/// Read one terminated response message, terminator included.
	fn read(&mut self) -> Result<Vec<u8>>;

	/// Read exactly `n` bytes, regardless of terminators in the data.
	fn read_exact(&mut self, n: usize) -> Result<Vec<u8>>;

	/// Device-clear, where the underlying link supports one.
	fn clear(&mut self) -> Result<()> {
		Ok(())
	}

	fn close(&mut self) -> Result<()> {
		Ok(())
	}
}

/// Frame a payload as an IEEE-488.2 definite-length block: `#<ndigits><length><bytes>`.
pub fn encode_block(data: &[u8]) -> Vec<u8> {
	let len_str = format!("{}", data.len());
	let mut out: Vec<u8> = Vec::with_capacity(2 + len_str.len() + data.len());
	out.push(b'#');
	out.extend_from_slice(format!("{}", len_str.len()).as_bytes());
	out.extend_from_slice(len_str.as_bytes());
	out.extend_from_slice(data);
	out
}

/// Parse a definite-length block header from the front of `data` and return the payload.
pub fn decode_block(data: &[u8]) -> Result<&[u8]> {
	if data.len() < 2 || data[0] != b'#' {
		return Err(AwgError::Protocol("binary block does not start with '#'".to_string()));
	}

	let ndigits = (data[1] as char)
		.to_digit(10)
		.ok_or_else(|| AwgError::Protocol("binary block length-of-length is not a digit".to_string()))? as usize;
	if ndigits == 0 {
		return Err(AwgError::Protocol("indefinite-length binary blocks are not supported".to_string()));
	}
	if data.len() < 2 + ndigits {
		return Err(AwgError::Protocol("binary block header truncated".to_string()));
	}

	let len: usize = std::str::from_utf8(&data[2..2 + ndigits])?
		.parse()
		.map_err(|_| AwgError::Protocol("binary block length is not numeric".to_string()))?;

	let body = &data[2 + ndigits..];
	if body.len() < len {
		return Err(AwgError::Protocol(format!(
			"binary block declared {} bytes but only {} received",
			len,
			body.len()
		)));
	}

	Ok(&body[..len])
}
