
use std::collections::BTreeMap;

use std::time::Duration;

use lazy_static::lazy_static;
use log::error;
use regex::Regex;

use crate::cmd::CmdTable;
use crate::error::{AwgError, Result};
use crate::family::{ErrorSentinel, Family};
use crate::transport::{encode_block, Transport};

lazy_static! {
	static ref IDN_RE: Regex = Regex::new("([^,]+),([^,]+),([^,]+),([^,\\s]+)").unwrap();
}

/// Official SCPI numeric value for Not A Number / over-range readings.
pub const SCPI_NAN: f64 = 9.91e37;
pub const OVER_RANGE: f64 = SCPI_NAN;

// An instrument error queue holds at most this many entries
const ERROR_QUEUE_DEPTH: usize = 10;

/// Per-call error-queue checking: explicitly on, explicitly off, or whatever
/// the driver default currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
	Default,
	Yes,
	No,
}

/// An analog channel (1-based) or one of the digital pod banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanSel {
	Analog(u32),
	Pod(u8),
}

/// Firmware version parsed from the fourth `*IDN?` field. `major.minor`
/// parses to a float so versions compare numerically; anything that does not
/// parse is kept as the raw dot-split pieces and compares as modern.
#[derive(Debug, Clone, PartialEq)]
pub enum FirmwareVersion {
	Numeric(f64),
	Raw(Vec<String>),
}

impl FirmwareVersion {
	pub fn parse(raw: &str) -> Self {
		let parts: Vec<&str> = raw.trim().split('.').collect();

		if parts.len() >= 2 {
			if let Ok(v) = format!("{}.{}", parts[0], parts[1]).parse::<f64>() {
				return FirmwareVersion::Numeric(v);
			}
		}

		FirmwareVersion::Raw(parts.iter().map(|p| p.trim().to_string()).collect())
	}

	pub fn is_legacy(&self, threshold: f64) -> bool {
		match self {
			FirmwareVersion::Numeric(v) => *v <= threshold,
			FirmwareVersion::Raw(_) => false,
		}
	}
}

#[derive(Debug, Clone)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial: String,
	pub version: FirmwareVersion,
}

/// True for "ON", "1" or "YES" responses (whitespace ignored), false otherwise.
pub fn on_or_off(s: &str) -> bool {
	matches!(s.trim(), "ON" | "YES" | "1")
}

pub fn bool_str(b: bool) -> &'static str {
	if b {
		"ON"
	} else {
		"OFF"
	}
}

/// Split a `<header> <p1>,<v1>,...` group response and return the raw
/// comma-separated parameter list, verifying the echoed header.
pub fn parse_group_params(header: &str, resp: &str) -> Result<Vec<String>> {
	let mut words = resp.splitn(2, ' ');
	let head = words.next().unwrap_or("").trim();
	let rest = words
		.next()
		.ok_or_else(|| AwgError::Protocol(format!("unexpected response for {}? command: '{}'", header, resp)))?;

	if head != header {
		return Err(AwgError::Protocol(format!(
			"response header '{}' does not match {}? command: '{}'",
			head, header, resp
		)));
	}

	Ok(rest.trim().split(',').map(|s| s.to_string()).collect())
}

/// Fold a KEY,VALUE,KEY,VALUE parameter list into a map. Values keep their
/// case since arbitrary-waveform names are case significant.
pub fn params_to_map(header: &str, params: &[String]) -> Result<BTreeMap<String, String>> {
	if params.len() % 2 != 0 {
		return Err(AwgError::Protocol(format!(
			"expected an even number of comma separated words from {}? response",
			header
		)));
	}

	Ok(params.chunks(2).map(|kv| (kv[0].clone(), kv[1].clone())).collect())
}

/// Byte ranges to write a `len`-byte message in, honoring a device that only
/// accepts `limit` bytes per write: full chunks are `limit + 1` bytes so the
/// device treats each as a continuation, and the remainder closes the message.
pub fn chunk_spans(len: usize, limit: usize) -> Vec<(usize, usize)> {
	let step = limit + 1;
	let mut spans: Vec<(usize, usize)> = vec![];
	let mut start = 0;

	while len - start > limit {
		spans.push((start, start + step));
		start += step;
	}
	if start < len || spans.is_empty() {
		spans.push((start, len));
	}

	spans
}

/// Generic SCPI plumbing shared by every instrument family: command
/// formatting, pacing, identity, error-queue handling, binary blocks.
///
/// Holds the one transport handle for the connection; no concurrent access.
pub struct ScpiCore<T: Transport> {
	transport: T,
	table: CmdTable,
	family: Family,
	wait: Duration,
	max_chan: u32,
	curr_chan: ChanSel,
	prefix: String,
	read_strip: String,
	write_termination: String,
	check_errors_default: bool,
	sentinel: ErrorSentinel,
	identity: Option<Identity>,
}

impl<T: Transport> ScpiCore<T> {
	pub fn new(transport: T, family: Family, wait: Duration) -> Self {
		Self {
			transport,
			table: CmdTable::new(family.command_overrides()),
			family,
			wait,
			max_chan: family.max_chan(),
			curr_chan: ChanSel::Analog(1),
			prefix: String::new(),
			read_strip: "\n".to_string(),
			write_termination: "\n".to_string(),
			check_errors_default: false,
			// assume the legacy error format until the firmware version is known
			sentinel: family.error_sentinel(&FirmwareVersion::Numeric(0.0)),
			identity: None,
		}
	}

	/// Clear the link, read the identity (which fixes the error sentinel and,
	/// for families that want it, turns default error checking on), then send
	/// `*CLS` to empty the status and error queues.
	pub fn open(&mut self) -> Result<()> {
		self.transport.clear()?;

		let identity = self.fetch_identity()?;
		self.sentinel = self.family.error_sentinel(&identity.version);
		if self.family.default_check_errors() {
			self.check_errors_default = true;
		}

		self.clear()?;
		Ok(())
	}

	pub fn close(&mut self) -> Result<()> {
		self.transport.close()
	}

	pub fn into_transport(self) -> T {
		self.transport
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	/// Direct transport access, e.g. to raise a socket timeout before a
	/// large waveform transfer.
	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn family(&self) -> Family {
		self.family
	}

	pub fn max_chan(&self) -> u32 {
		self.max_chan
	}

	pub fn identity(&self) -> Option<&Identity> {
		self.identity.as_ref()
	}

	pub fn wait(&self) -> Duration {
		self.wait
	}

	pub fn set_wait(&mut self, wait: Duration) {
		self.wait = wait;
	}

	pub fn resolve_wait(&self, wait: Option<Duration>) -> Duration {
		wait.unwrap_or(self.wait)
	}

	pub fn set_check_errors_default(&mut self, check: bool) {
		self.check_errors_default = check;
	}

	/// Prefix prepended to every non-`*` command (some instruments want ':').
	pub fn set_cmd_prefix(&mut self, prefix: &str) {
		self.prefix = prefix.to_string();
	}

	/// Characters stripped from the end of every text response.
	pub fn set_read_strip(&mut self, strip: &str) {
		self.read_strip = strip.to_string();
	}

	pub fn set_write_termination(&mut self, term: &str) {
		self.write_termination = term.to_string();
	}

	pub fn channel(&self) -> ChanSel {
		self.curr_chan
	}

	pub fn set_channel(&mut self, chan: ChanSel) -> Result<()> {
		match chan {
			ChanSel::Analog(n) if n >= 1 && n <= self.max_chan => {}
			ChanSel::Pod(n) if n == 1 || n == 2 => {}
			_ => {
				return Err(AwgError::Validation(format!(
					"channel {:?} is not valid for a {}-channel instrument",
					chan, self.max_chan
				)))
			}
		}
		self.curr_chan = chan;
		Ok(())
	}

	/// Make an explicitly passed channel the current one; `None` keeps the
	/// current channel, mirroring the optional channel argument every
	/// driver operation takes.
	pub fn select_channel(&mut self, chan: Option<u32>) -> Result<()> {
		match chan {
			Some(n) => self.set_channel(ChanSel::Analog(n)),
			None => Ok(()),
		}
	}

	pub fn chan_name(&self) -> String {
		self.family.channel_str(self.curr_chan)
	}

	pub fn chan_name_of(&self, chan: ChanSel) -> String {
		self.family.channel_str(chan)
	}

	/// Instantiate the command template for `key` with the current channel.
	pub fn fill(&self, key: &str, val: &str) -> Result<String> {
		self.table.fill(key, &self.chan_name(), val)
	}

	fn resolve_check(&self, check: Check) -> bool {
		match check {
			Check::Default => self.check_errors_default,
			Check::Yes => true,
			Check::No => false,
		}
	}

	fn full_message(&self, cmd: &str) -> Vec<u8> {
		let mut msg: Vec<u8> = vec![];
		if !cmd.starts_with('*') {
			msg.extend_from_slice(self.prefix.as_bytes());
		}
		msg.extend_from_slice(cmd.as_bytes());
		msg.extend_from_slice(self.write_termination.as_bytes());
		msg
	}

	/// All outbound bytes funnel through here so the family chunk policy
	/// applies to commands, queries and binary payloads alike.
	fn write_message(&mut self, msg: &[u8]) -> Result<usize> {
		match self.family.write_chunk_limit() {
			Some(limit) if msg.len() > limit => {
				let mut count = 0;
				for (start, end) in chunk_spans(msg.len(), limit) {
					count += self.transport.write_raw(&msg[start..end])?;
				}
				Ok(count)
			}
			_ => self.transport.write_raw(msg),
		}
	}

	fn read_response(&mut self) -> Result<String> {
		let raw = self.transport.read()?;
		let s = std::str::from_utf8(&raw)?;
		Ok(s.trim_end_matches(|c| self.read_strip.contains(c)).to_string())
	}

	pub fn inst_write(&mut self, cmd: &str, check: Check) -> Result<()> {
		let check = self.resolve_check(check);
		let msg = self.full_message(cmd);
		let res = self.write_message(&msg);

		// on transport failure the queue is drained for the log before the
		// error propagates, same as on success
		if check {
			self.check_inst_errors(cmd);
		}

		res.map(|_| ())
	}

	pub fn inst_query(&mut self, query: &str, check: Check) -> Result<String> {
		let check = self.resolve_check(check);
		let msg = self.full_message(query);
		let res = match self.write_message(&msg) {
			Ok(_) => self.read_response(),
			Err(e) => Err(e),
		};

		if check {
			self.check_inst_errors(query);
		}

		res
	}

	pub fn query_f64(&mut self, query: &str, check: Check) -> Result<f64> {
		let resp = self.inst_query(query, check)?;
		resp.trim()
			.parse()
			.map_err(|_| AwgError::Protocol(format!("cannot parse '{}' as a number for '{}'", resp, query)))
	}

	pub fn query_bool(&mut self, query: &str, check: Check) -> Result<bool> {
		let resp = self.inst_query(query, check)?;
		Ok(on_or_off(&resp))
	}

	/// Drain the instrument error queue, logging every entry paired with the
	/// command that provoked it. Device-reported errors are advisory: they
	/// are logged, never raised. Returns true if anything was logged.
	pub fn check_inst_errors(&mut self, command: &str) -> bool {
		let query = self.family.error_query();
		let sentinel = self.sentinel;
		let mut errors = false;

		for reads in 0..ERROR_QUEUE_DEPTH {
			let msg = self.full_message(query);
			let resp = match self.write_message(&msg).and_then(|_| self.read_response()) {
				Ok(s) => s,
				Err(e) => {
					error!("unexpected transport error while draining error queue: {}", e);
					errors = true;
					break;
				}
			};

			let error_string = resp.trim();
			if error_string.is_empty() {
				error!("{} returned nothing, command: '{}'", query, command);
				errors = true;
				break;
			}

			let window = error_string.len().min(sentinel.window);
			if error_string[..window].contains(sentinel.token) {
				// "No error"
				break;
			}

			if self.family.suppress_error(error_string, command) {
				break;
			}

			error!("ERROR({:02}): {}, command: '{}'", reads, error_string, command);
			errors = true;
		}

		errors
	}

	pub fn fetch_identity(&mut self) -> Result<Identity> {
		let resp = self.inst_query("*IDN?", Check::No)?;
		let caps = IDN_RE
			.captures(&resp)
			.ok_or_else(|| AwgError::Protocol(format!("unparseable *IDN? response: '{}'", resp)))?;

		let identity = Identity {
			manufacturer: caps[1].to_string(),
			model: caps[2].to_string(),
			serial: caps[3].to_string(),
			version: FirmwareVersion::parse(&caps[4]),
		};

		self.identity = Some(identity.clone());
		Ok(identity)
	}

	pub fn idn(&mut self) -> Result<String> {
		self.inst_query("*IDN?", Check::Default)
	}

	pub fn reset(&mut self) -> Result<()> {
		self.inst_write("*RST", Check::Default)
	}

	pub fn clear(&mut self) -> Result<()> {
		self.inst_write("*CLS", Check::Default)
	}

	/// Block until all preceding commands complete, via `*OPC`/`*OPC?`.
	pub fn opc_wait(&mut self) -> Result<()> {
		self.inst_write("*OPC", Check::No)?;
		loop {
			let ret = self.inst_query("*OPC?", Check::No)?;
			if ret.trim().starts_with('1') {
				return Ok(());
			}
		}
	}

	pub fn set_local(&mut self) -> Result<()> {
		if !self.family.has_local_remote() {
			return Ok(());
		}
		let cmd = self.fill("setLocal", "")?;
		self.inst_write(&cmd, Check::Default)
	}

	pub fn set_remote(&mut self) -> Result<()> {
		if !self.family.has_local_remote() {
			return Ok(());
		}
		let cmd = self.fill("setRemote", "")?;
		self.inst_write(&cmd, Check::Default)
	}

	pub fn set_remote_lock(&mut self) -> Result<()> {
		if !self.family.has_local_remote() {
			return Ok(());
		}
		let cmd = self.fill("setRemoteLock", "")?;
		self.inst_write(&cmd, Check::Default)
	}

	pub fn set_beeper(&mut self, on: bool) -> Result<()> {
		let key = if on { "beeperOn" } else { "beeperOff" };
		let cmd = self.fill(key, "")?;
		self.inst_write(&cmd, Check::Default)
	}

	/// Query returning an IEEE-488.2 definite-length binary block.
	pub fn query_binary_block(&mut self, query: &str, check: Check) -> Result<Vec<u8>> {
		let check = self.resolve_check(check);
		let msg = self.full_message(query);
		let res = self.read_block_after_write(&msg);

		if check {
			self.check_inst_errors(query);
		}

		res
	}

	fn read_block_after_write(&mut self, msg: &[u8]) -> Result<Vec<u8>> {
		self.write_message(msg)?;

		let head = self.transport.read_exact(2)?;
		if head[0] != b'#' {
			return Err(AwgError::Protocol("binary block response does not start with '#'".to_string()));
		}
		let ndigits = (head[1] as char)
			.to_digit(10)
			.ok_or_else(|| AwgError::Protocol("binary block length-of-length is not a digit".to_string()))?
			as usize;
		if ndigits == 0 {
			return Err(AwgError::Protocol("indefinite-length binary blocks are not supported".to_string()));
		}

		let len_bytes = self.transport.read_exact(ndigits)?;
		let len: usize = std::str::from_utf8(&len_bytes)?
			.parse()
			.map_err(|_| AwgError::Protocol("binary block length is not numeric".to_string()))?;

		let payload = self.transport.read_exact(len)?;

		// drain the trailing terminator; harmless if the device sent none
		let _ = self.transport.read();

		Ok(payload)
	}

	/// Write a command followed by a definite-length binary block.
	pub fn write_binary_block(&mut self, cmd: &str, data: &[u8], check: Check) -> Result<usize> {
		let check = self.resolve_check(check);

		let mut msg: Vec<u8> = vec![];
		if !cmd.starts_with('*') {
			msg.extend_from_slice(self.prefix.as_bytes());
		}
		msg.extend_from_slice(cmd.as_bytes());
		msg.extend_from_slice(&encode_block(data));
		msg.extend_from_slice(self.write_termination.as_bytes());

		let res = self.write_message(&msg);

		if check {
			self.check_inst_errors(cmd);
		}

		res
	}

	/// Write a command with a raw (unframed) binary payload appended, for
	/// dialects like `WVDT` that embed wave data directly after a field name.
	pub fn write_payload(&mut self, cmd: &str, payload: &[u8], check: Check) -> Result<usize> {
		let check = self.resolve_check(check);

		let mut msg: Vec<u8> = vec![];
		if !cmd.starts_with('*') {
			msg.extend_from_slice(self.prefix.as_bytes());
		}
		msg.extend_from_slice(cmd.as_bytes());
		msg.extend_from_slice(payload);
		msg.extend_from_slice(self.write_termination.as_bytes());

		let res = self.write_message(&msg);

		if check {
			self.check_inst_errors(cmd);
		}

		res
	}

	/// Write a query and return the complete raw response, binary included.
	pub fn query_raw(&mut self, query: &str, check: Check) -> Result<Vec<u8>> {
		let check = self.resolve_check(check);
		let msg = self.full_message(query);
		let res = match self.write_message(&msg) {
			Ok(_) => self.transport.read(),
			Err(e) => Err(e),
		};

		if check {
			self.check_inst_errors(query);
		}

		res
	}
}
