
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::thread;
use std::time::Duration;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{AwgError, Result};
use crate::family::Family;
use crate::scpi::{on_or_off, bool_str, params_to_map, parse_group_params, ChanSel, Check, Identity, ScpiCore};
use crate::setup::{diffstate_value, ordered_groups, plan_group_params, ChannelSetup, Group, SetupDocument};
use crate::transport::Transport;

/// Strip the unit suffix the instrument appends to a measurement value.
/// This is a right-trim over the suffix character set, not unit-aware
/// parsing; a value with suffix characters elsewhere would be over-trimmed.
fn unit_f64(value: &str, unit: &str, what: &str) -> Result<f64> {
	let upper = value.trim().to_uppercase();
	let stripped = upper.trim_end_matches(|c| unit.contains(c));

	stripped
		.parse()
		.map_err(|_| AwgError::Protocol(format!("cannot parse {} value '{}' as a number", what, value)))
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}

/// Driver for an Arbitrary Waveform Generator speaking SCPI.
///
/// Layers waveform semantics (wave type, per-parameter setters, frequency
/// counter, setup save/load, arbitrary wave data) on the generic SCPI core.
/// Every setter takes an optional channel (which becomes the current channel
/// for later calls) and an optional post-write wait overriding the driver
/// default.
pub struct Awg<T: Transport> {
	core: ScpiCore<T>,
}

impl<T: Transport> Awg<T> {
	pub fn new(transport: T, family: Family, wait: Duration) -> Self {
		Self { core: ScpiCore::new(transport, family, wait) }
	}

	/// Identify the instrument through the generic command set and return a
	/// driver specialized for whatever family the identity names. The
	/// specialized driver re-opens on the same connection, so family command
	/// overrides and error-checking defaults are in force from the start.
	pub fn open_best(transport: T, wait: Duration) -> Result<Self> {
		let mut awg = Awg::new(transport, Family::Generic, wait);
		awg.open()?;

		let manufacturer = match awg.identity() {
			Some(identity) => identity.manufacturer.clone(),
			None => String::new(),
		};

		let family = Family::from_identity(&manufacturer);
		if family == awg.family() {
			return Ok(awg);
		}

		let mut best = Awg::new(awg.core.into_transport(), family, wait);
		best.open()?;
		Ok(best)
	}

	pub fn open(&mut self) -> Result<()> {
		self.core.open()
	}

	pub fn close(&mut self) -> Result<()> {
		self.core.close()
	}

	pub fn family(&self) -> Family {
		self.core.family()
	}

	pub fn series(&self) -> &'static str {
		self.core.family().series()
	}

	pub fn max_chan(&self) -> u32 {
		self.core.max_chan()
	}

	pub fn identity(&self) -> Option<&Identity> {
		self.core.identity()
	}

	pub fn channel(&self) -> ChanSel {
		self.core.channel()
	}

	pub fn set_channel(&mut self, chan: ChanSel) -> Result<()> {
		self.core.set_channel(chan)
	}

	pub fn set_wait(&mut self, wait: Duration) {
		self.core.set_wait(wait)
	}

	pub fn set_check_errors_default(&mut self, check: bool) {
		self.core.set_check_errors_default(check)
	}

	pub fn transport(&self) -> &T {
		self.core.transport()
	}

	/// Direct transport access, e.g. to raise a socket timeout before a
	/// large waveform transfer.
	pub fn transport_mut(&mut self) -> &mut T {
		self.core.transport_mut()
	}

	// Raw escape hatches, for commands the typed surface does not cover

	pub fn write_command(&mut self, cmd: &str, check: Check) -> Result<()> {
		self.core.inst_write(cmd, check)
	}

	pub fn query_command(&mut self, query: &str, check: Check) -> Result<String> {
		self.core.inst_query(query, check)
	}

	pub fn query_binary_block(&mut self, query: &str, check: Check) -> Result<Vec<u8>> {
		self.core.query_binary_block(query, check)
	}

	pub fn write_binary_block(&mut self, cmd: &str, data: &[u8], check: Check) -> Result<usize> {
		self.core.write_binary_block(cmd, data, check)
	}

	pub fn check_inst_errors(&mut self, command: &str) -> bool {
		self.core.check_inst_errors(command)
	}

	// Common SCPI operations, delegated

	pub fn idn(&mut self) -> Result<String> {
		self.core.idn()
	}

	pub fn reset(&mut self) -> Result<()> {
		self.core.reset()
	}

	pub fn clear(&mut self) -> Result<()> {
		self.core.clear()
	}

	pub fn opc_wait(&mut self) -> Result<()> {
		self.core.opc_wait()
	}

	pub fn set_local(&mut self) -> Result<()> {
		self.core.set_local()
	}

	pub fn set_remote(&mut self) -> Result<()> {
		self.core.set_remote()
	}

	pub fn set_remote_lock(&mut self) -> Result<()> {
		self.core.set_remote_lock()
	}

	pub fn set_beeper(&mut self, on: bool) -> Result<()> {
		self.core.set_beeper(on)
	}

	// Generic parameter plumbing

	fn set_generic(
		&mut self,
		key: &'static str,
		val: &str,
		chan: Option<u32>,
		wait: Option<Duration>,
		check: Check,
	) -> Result<()> {
		self.core.select_channel(chan)?;
		let cmd = self.core.fill(key, val)?;
		self.core.inst_write(&cmd, check)?;
		thread::sleep(self.core.resolve_wait(wait));
		Ok(())
	}

	fn set_generic_f64(
		&mut self,
		key: &'static str,
		value: f64,
		chan: Option<u32>,
		wait: Option<Duration>,
	) -> Result<()> {
		self.set_generic(key, &format!("{}", value), chan, wait, Check::Default)
	}

	/// Query a channel-scoped command group (`BSWV?`, `ARWV?`, `SRATE?`, ...)
	/// and fold the echoed KEY,VALUE response into a map.
	fn query_group(&mut self, group: &str, chan: Option<u32>) -> Result<Group> {
		self.core.select_channel(chan)?;
		let header = format!("{}:{}", self.core.chan_name(), group);
		let resp = self.core.inst_query(&format!("{}?", header), Check::Default)?;
		let params = parse_group_params(&header, &resp)?;
		params_to_map(group, &params)
	}

	// Basic-wave parameter setters

	pub fn set_wave_type(&mut self, wavetype: &str, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		let wavetype = wavetype.to_uppercase();
		if !self.family().valid_wave_types().contains(&wavetype.as_str()) {
			return Err(AwgError::Validation(format!("requested wave type '{}' is not valid", wavetype)));
		}

		self.set_generic("setWaveType", &wavetype, chan, wait, Check::Default)
	}

	pub fn set_frequency(&mut self, frequency: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setFrequency", frequency, chan, wait)
	}

	pub fn set_period(&mut self, period: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setPeriod", period, chan, wait)
	}

	pub fn set_amplitude(&mut self, amplitude: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setAmplitude", amplitude, chan, wait)
	}

	pub fn set_amplitude_vrms(&mut self, amplitude: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setAmplitudeVrms", amplitude, chan, wait)
	}

	pub fn set_amplitude_dbm(&mut self, amplitude: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setAmplitudedBm", amplitude, chan, wait)
	}

	/// Set the voltage offset. On families where inversion swaps the physical
	/// sense of the output, an inverted channel gets the negated value so the
	/// caller-visible offset stays what was asked for.
	pub fn set_offset(&mut self, offset: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		if self.family().compensates_inversion() && self.is_output_inverted(chan)? {
			self.set_generic_f64("setOffset", -offset, chan, wait)
		} else {
			self.set_generic_f64("setOffset", offset, chan, wait)
		}
	}

	pub fn set_ramp_symmetry(&mut self, symmetry: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setRampSymmetry", symmetry, chan, wait)
	}

	pub fn set_duty_cycle(&mut self, duty: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setDutyCycle", duty, chan, wait)
	}

	/// Phase wraps into [0, 360): `set_phase(370.0)` writes 10, `-10.0` writes 350.
	pub fn set_phase(&mut self, phase: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setPhase", phase.rem_euclid(360.0), chan, wait)
	}

	pub fn set_noise_std_dev(&mut self, std_dev: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setNoiseStdDev", std_dev, chan, wait)
	}

	pub fn set_noise_mean(&mut self, mean: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setNoiseMean", mean, chan, wait)
	}

	pub fn set_pulse_width(&mut self, width: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setPulseWidth", width, chan, wait)
	}

	pub fn set_pulse_rise(&mut self, rise: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setPulseRise", rise, chan, wait)
	}

	pub fn set_pulse_fall(&mut self, fall: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setPulseFall", fall, chan, wait)
	}

	pub fn set_pulse_delay(&mut self, delay: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setPulseDelay", delay, chan, wait)
	}

	/// Set the high voltage level. On an inverted output the instrument's
	/// "high" is physically the low level, so the value is written (negated)
	/// through the low-level command instead.
	pub fn set_high_level(&mut self, high: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		if self.family().compensates_inversion() && self.is_output_inverted(chan)? {
			self.set_generic_f64("setLowLevel", -high, chan, wait)
		} else {
			self.set_generic_f64("setHighLevel", high, chan, wait)
		}
	}

	pub fn set_low_level(&mut self, low: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		if self.family().compensates_inversion() && self.is_output_inverted(chan)? {
			self.set_generic_f64("setHighLevel", -low, chan, wait)
		} else {
			self.set_generic_f64("setLowLevel", low, chan, wait)
		}
	}

	/// Set the noise bandwidth and turn the band-limit state on.
	pub fn set_noise_bandwidth(&mut self, bandwidth: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setNoiseBandwidth", bandwidth, chan, wait)?;
		self.set_generic("setNoiseBandState", "ON", chan, wait, Check::Default)
	}

	pub fn set_noise_bandwidth_off(&mut self, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setNoiseBandState", "OFF", chan, wait, Check::Default)
	}

	// PRBS parameters

	pub fn set_prbs_bit_length(&mut self, bitlength: u32, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		if bitlength < 3 || bitlength > 32 {
			return Err(AwgError::Validation(format!(
				"PRBS bit length must be an integer 3-32 inclusive, attempted to set {}",
				bitlength
			)));
		}

		self.set_generic("setPRBSBitLength", &format!("{}", bitlength), chan, wait, Check::Default)
	}

	pub fn set_prbs_edge(&mut self, edge: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setPRBSEdge", edge, chan, wait)
	}

	pub fn set_prbs_diff_state(&mut self, diff: bool, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setPRBSDiffState", bool_str(diff), chan, wait, Check::Default)
	}

	pub fn set_prbs_bit_rate(&mut self, bitrate: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setPRBSBitRate", bitrate, chan, wait)
	}

	pub fn set_prbs_logic_level(&mut self, level: &str, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		let level = level.to_uppercase();
		if !self.family().valid_logic_levels().contains(&level.as_str()) {
			return Err(AwgError::Validation(format!("requested logic level '{}' is not valid", level)));
		}

		self.set_generic("setPRBSLogicLevel", &level, chan, wait, Check::Default)
	}

	// Output state

	/// 50 ohm load when `fifty_ohm` is true, high impedance otherwise.
	pub fn set_output_load(&mut self, fifty_ohm: bool, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		let load = if fifty_ohm { "50" } else { "HZ" };
		self.set_generic("setOutputLoad", load, chan, wait, Check::Default)
	}

	/// Invert the output polarity. On compensating families the current
	/// offset is re-queried and re-asserted afterwards, so the offset the
	/// caller sees is unchanged by the flip.
	pub fn set_output_inverted(&mut self, invert: bool, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		let plrt = if invert { "INVT" } else { "NOR" };
		self.set_generic("setOutputPolarity", plrt, chan, wait, Check::Default)?;

		if self.family().compensates_inversion() {
			let offset = self.query_offset(chan)?;
			self.set_offset(offset, chan, wait)?;
		}

		Ok(())
	}

	/// Same effect as `set_output_inverted`, via the INVT command.
	pub fn set_signal_inverted(&mut self, invert: bool, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setSignalPolarity", bool_str(invert), chan, wait, Check::Default)?;

		if self.family().compensates_inversion() {
			let offset = self.query_offset(chan)?;
			self.set_offset(offset, chan, wait)?;
		}

		Ok(())
	}

	pub fn output_on(&mut self, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("outputOn", "", chan, wait, Check::Default)
	}

	pub fn output_off(&mut self, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("outputOff", "", chan, wait, Check::Default)
	}

	pub fn output_on_all(&mut self, wait: Option<Duration>) -> Result<()> {
		self.output_all("outputOn", wait)
	}

	pub fn output_off_all(&mut self, wait: Option<Duration>) -> Result<()> {
		self.output_all("outputOff", wait)
	}

	fn output_all(&mut self, key: &'static str, wait: Option<Duration>) -> Result<()> {
		let saved = self.core.channel();

		for chan in 1..=self.core.max_chan() {
			self.core.set_channel(ChanSel::Analog(chan))?;
			let cmd = self.core.fill(key, "")?;
			self.core.inst_write(&cmd, Check::Default)?;
		}

		self.core.set_channel(saved)?;
		thread::sleep(self.core.resolve_wait(wait));
		Ok(())
	}

	/// Parse the family's `OUTP?` response into the on/off flag plus the
	/// LOAD/PLRT parameter pairs. Families whose output query answers a bare
	/// boolean do not support this.
	pub fn query_output(&mut self, chan: Option<u32>) -> Result<(bool, Group)> {
		if !self.family().reads_output_as_params() {
			return Err(AwgError::Unsupported("parameterized OUTP? query"));
		}

		self.core.select_channel(chan)?;
		let header = format!("{}:OUTP", self.core.chan_name());
		let resp = self.core.inst_query(&format!("{}?", header), Check::Default)?;
		let params = parse_group_params(&header, &resp)?;

		// OUTP? answers ON|OFF first and parameter pairs after
		let is_on = params.first().map(|p| p.to_uppercase() == "ON").unwrap_or(false);
		let map = params_to_map("OUTP", &params[1..])?;

		Ok((is_on, map))
	}

	pub fn is_output_on(&mut self, chan: Option<u32>) -> Result<bool> {
		if self.family().reads_output_as_params() {
			return Ok(self.query_output(chan)?.0);
		}

		self.core.select_channel(chan)?;
		let cmd = self.core.fill("isOutput", "")?;
		self.core.query_bool(&cmd, Check::Default)
	}

	fn output_param(&mut self, chan: Option<u32>, key: &str) -> Result<String> {
		let (_is_on, params) = self.query_output(chan)?;
		params
			.get(key)
			.cloned()
			.ok_or_else(|| AwgError::Protocol(format!("OUTP? response carries no {} field", key)))
	}

	pub fn is_output_hi_z(&mut self, chan: Option<u32>) -> Result<bool> {
		Ok(self.output_param(chan, "LOAD")?.to_uppercase() == "HZ")
	}

	pub fn is_output_50(&mut self, chan: Option<u32>) -> Result<bool> {
		Ok(self.output_param(chan, "LOAD")? == "50")
	}

	pub fn is_output_inverted(&mut self, chan: Option<u32>) -> Result<bool> {
		Ok(self.output_param(chan, "PLRT")?.to_uppercase() == "INVT")
	}

	// Wave parameter queries

	pub fn query_wave_parameters(&mut self, chan: Option<u32>) -> Result<Group> {
		self.query_group("BSWV", chan)
	}

	pub fn query_offset(&mut self, chan: Option<u32>) -> Result<f64> {
		let params = self.query_wave_parameters(chan)?;
		let ofst = params
			.get("OFST")
			.ok_or_else(|| AwgError::Protocol("BSWV? response carries no OFST field".to_string()))?;

		ofst.replace('V', "")
			.parse()
			.map_err(|_| AwgError::Protocol(format!("cannot parse OFST value '{}' as a number", ofst)))
	}

	pub fn query_arb_wave_type(&mut self, chan: Option<u32>) -> Result<Group> {
		self.query_group("ARWV", chan)
	}

	pub fn query_arb_wave_mode(&mut self, chan: Option<u32>) -> Result<Group> {
		self.query_group("SRATE", chan)
	}

	/// Select a stored arbitrary waveform as the channel's output by name.
	pub fn set_arb_wave_by_name(&mut self, name: &str, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setArbWaveByName", name, chan, wait, Check::Default)
	}

	// Voltage protection

	pub fn set_voltage_protection(&mut self, ovp: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setVoltageProtection", ovp, chan, wait)
	}

	pub fn query_voltage_protection(&mut self, chan: Option<u32>) -> Result<f64> {
		if self.family().voltage_protection_via_wave_query() {
			let params = self.query_wave_parameters(chan)?;
			let amp = params.get("MAX_OUTPUT_AMP").ok_or_else(|| {
				AwgError::Protocol("BSWV? response carries no MAX_OUTPUT_AMP field".to_string())
			})?;

			return amp
				.replace('V', "")
				.parse()
				.map_err(|_| AwgError::Protocol(format!("cannot parse MAX_OUTPUT_AMP value '{}'", amp)));
		}

		self.core.select_channel(chan)?;
		let cmd = self.core.fill("queryVoltageProtection", "")?;
		self.core.query_f64(&cmd, Check::Default)
	}

	// Frequency counter

	fn query_freq_cntr(&mut self, chan: Option<u32>) -> Result<Group> {
		// the counter has no channel of its own; the argument only updates
		// the current-channel default like everywhere else
		self.core.select_channel(chan)?;

		let resp = self.core.inst_query("FCNT?", Check::Default)?;
		let params = parse_group_params("FCNT", &resp)?;
		params_to_map("FCNT", &params)
	}

	fn fcnt_value(&mut self, chan: Option<u32>, key: &str, unit: &str) -> Result<f64> {
		let fcnt = self.query_freq_cntr(chan)?;
		let value = fcnt
			.get(key)
			.ok_or_else(|| AwgError::Protocol(format!("FCNT? response carries no {} field", key)))?;
		unit_f64(value, unit, key)
	}

	pub fn set_freq_cntr_on(&mut self, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setFreqCntrOn", "", chan, wait, Check::Default)
	}

	pub fn set_freq_cntr_off(&mut self, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setFreqCntrOff", "", chan, wait, Check::Default)
	}

	pub fn set_freq_cntr_reference(&mut self, ref_freq: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setFreqCntrReference", ref_freq, chan, wait)
	}

	pub fn set_freq_cntr_trig_level(&mut self, level: f64, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic_f64("setFreqCntrTrigLevel", level, chan, wait)
	}

	pub fn set_freq_cntr_couple_ac(&mut self, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setFreqCntrCoupleAC", "", chan, wait, Check::Default)
	}

	pub fn set_freq_cntr_couple_dc(&mut self, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setFreqCntrCoupleDC", "", chan, wait, Check::Default)
	}

	pub fn set_freq_cntr_hfr_on(&mut self, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setFreqCntrHfrOn", "", chan, wait, Check::Default)
	}

	pub fn set_freq_cntr_hfr_off(&mut self, chan: Option<u32>, wait: Option<Duration>) -> Result<()> {
		self.set_generic("setFreqCntrHfrOff", "", chan, wait, Check::Default)
	}

	pub fn is_freq_cntr_on(&mut self, chan: Option<u32>) -> Result<bool> {
		let fcnt = self.query_freq_cntr(chan)?;
		let state = fcnt
			.get("STATE")
			.ok_or_else(|| AwgError::Protocol("FCNT? response carries no STATE field".to_string()))?;
		Ok(on_or_off(state))
	}

	pub fn measure_freq_cntr_frequency(&mut self, chan: Option<u32>) -> Result<f64> {
		self.fcnt_value(chan, "FRQ", "HZ")
	}

	pub fn measure_freq_cntr_pos_width(&mut self, chan: Option<u32>) -> Result<f64> {
		self.fcnt_value(chan, "PW", "S")
	}

	pub fn measure_freq_cntr_neg_width(&mut self, chan: Option<u32>) -> Result<f64> {
		self.fcnt_value(chan, "NW", "S")
	}

	pub fn measure_freq_cntr_duty_cycle(&mut self, chan: Option<u32>) -> Result<f64> {
		self.fcnt_value(chan, "DUTY", "")
	}

	pub fn measure_freq_cntr_frequency_deviation(&mut self, chan: Option<u32>) -> Result<f64> {
		self.fcnt_value(chan, "FRQDEV", "PM")
	}

	/// All counter measurements from a single query.
	pub fn measure_freq_cntr_all(&mut self, chan: Option<u32>) -> Result<BTreeMap<String, f64>> {
		let fcnt = self.query_freq_cntr(chan)?;

		let wanted: &[(&str, &str)] = &[("FRQ", "HZ"), ("PW", "S"), ("NW", "S"), ("DUTY", ""), ("FRQDEV", "PM")];

		let mut vals: BTreeMap<String, f64> = BTreeMap::new();
		for &(key, unit) in wanted {
			let value = fcnt
				.get(key)
				.ok_or_else(|| AwgError::Protocol(format!("FCNT? response carries no {} field", key)))?;
			vals.insert(key.to_string(), unit_f64(value, unit, key)?);
		}

		Ok(vals)
	}

	pub fn query_freq_cntr_reference(&mut self, chan: Option<u32>) -> Result<f64> {
		self.fcnt_value(chan, "REFQ", "HZ")
	}

	pub fn query_freq_cntr_trig_level(&mut self, chan: Option<u32>) -> Result<f64> {
		self.fcnt_value(chan, "TRG", "V")
	}

	pub fn is_freq_cntr_couple_dc(&mut self, chan: Option<u32>) -> Result<bool> {
		let fcnt = self.query_freq_cntr(chan)?;
		let mode = fcnt
			.get("MODE")
			.ok_or_else(|| AwgError::Protocol("FCNT? response carries no MODE field".to_string()))?;
		Ok(mode.to_uppercase() == "DC")
	}

	pub fn is_freq_cntr_hfr_on(&mut self, chan: Option<u32>) -> Result<bool> {
		let fcnt = self.query_freq_cntr(chan)?;
		let hfr = fcnt
			.get("HFR")
			.ok_or_else(|| AwgError::Protocol("FCNT? response carries no HFR field".to_string()))?;
		Ok(on_or_off(hfr))
	}

	// Setup save/load

	/// Query every channel's state into a setup document. The output group
	/// keeps only LOAD/PLRT (outputs come back off on replay); channels with
	/// an arbitrary wave selected also capture the wave-selection and
	/// sample-rate-mode groups so the selection round-trips.
	pub fn capture_setup(&mut self) -> Result<SetupDocument> {
		let saved = self.core.channel();
		let mut doc: SetupDocument = vec![];

		for chan in 1..=self.core.max_chan() {
			let mut groups = ChannelSetup::new();

			let (_is_on, outp) = self.query_output(Some(chan))?;
			let bswv = self.query_wave_parameters(Some(chan))?;
			let is_arb = bswv.get("WVTP").map(|w| w.to_uppercase() == "ARB").unwrap_or(false);

			groups.insert("OUTP".to_string(), outp);
			groups.insert("BSWV".to_string(), bswv);

			if is_arb {
				groups.insert("ARWV".to_string(), self.query_arb_wave_type(Some(chan))?);
				groups.insert("SRATE".to_string(), self.query_arb_wave_mode(Some(chan))?);
			}

			doc.push(groups);
		}

		self.core.set_channel(saved)?;
		Ok(doc)
	}

	/// Fetch the current setup and save it as JSON. Returns the byte count written.
	pub fn setup_save(&mut self, path: &Path) -> Result<usize> {
		let doc = self.capture_setup()?;
		let json = serde_json::to_string(&doc)?;
		fs::write(path, &json)?;
		Ok(json.len())
	}

	/// Replay a setup document against the instrument: reset, all outputs
	/// off, then per channel the output group first and the basic-wave
	/// parameters in dependency order (see `setup::plan_group_params`). When
	/// a channel enables differential pairing, the following channel's group
	/// is skipped: pairing configures both channels from one write sequence.
	pub fn apply_setup(&mut self, doc: &SetupDocument, wait: Option<Duration>) -> Result<()> {
		if doc.len() > self.core.max_chan() as usize {
			return Err(AwgError::Validation(format!(
				"setup has {} channels but this instrument has {}",
				doc.len(),
				self.core.max_chan()
			)));
		}

		self.reset()?;

		let wait = self.core.resolve_wait(wait);
		let saved = self.core.channel();

		// parameters must not land on live outputs
		self.output_off_all(None)?;

		let mut diffstate = false;
		for (idx, chan_setup) in doc.iter().enumerate() {
			let chan = idx as u32 + 1;

			if diffstate && chan % 2 == 0 {
				continue;
			}

			if let Some(v) = diffstate_value(chan_setup) {
				diffstate = v;
			}

			let chan_name = self.core.chan_name_of(ChanSel::Analog(chan));

			for group_name in ordered_groups(chan_setup) {
				let group = &chan_setup[&group_name];

				for param in plan_group_params(&group_name, group)? {
					let cmd = format!("{}:{} {},{}", chan_name, group_name, param, group[&param]);
					self.core.inst_write(&cmd, Check::Default)?;
					thread::sleep(wait);
				}
			}
		}

		self.core.set_channel(saved)?;
		Ok(())
	}

	/// Restore a setup previously written by `setup_save`. Returns the byte
	/// count read from the file.
	pub fn setup_load(&mut self, path: &Path, wait: Option<Duration>) -> Result<usize> {
		let data = fs::read_to_string(path)?;
		let doc: SetupDocument = serde_json::from_str(&data)?;

		self.apply_setup(&doc, wait)?;
		Ok(data.len())
	}

	// Arbitrary wave data

	/// Store a named waveform on the device: 16-bit little-endian samples
	/// appended raw after the WAVEDATA field of a `WVDT` command. The write
	/// goes through the family chunk path, which is what makes payloads past
	/// the Siglent write limit arrive intact. Returns the bytes written.
	pub fn store_arb_waveform(
		&mut self,
		name: &str,
		samples: &[i16],
		chan: Option<u32>,
		wait: Option<Duration>,
	) -> Result<usize> {
		self.core.select_channel(chan)?;

		let mut data: Vec<u8> = Vec::with_capacity(samples.len() * 2);
		for s in samples {
			data.write_i16::<LittleEndian>(*s)?;
		}

		let cmd = format!("{}:WVDT WVNM,{},LENGTH,{},WAVEDATA,", self.core.chan_name(), name, data.len());
		let count = self.core.write_payload(&cmd, &data, Check::Default)?;

		thread::sleep(self.core.resolve_wait(wait));
		Ok(count)
	}

	/// Read a named waveform back from the device. The `WVDT?` response is
	/// text fields with the binary payload appended, so the payload is
	/// located by the LENGTH and WAVEDATA field markers and the declared
	/// byte count is checked against what actually arrived.
	///
	/// NOTE: depends on the transport returning the complete response as one
	/// message; a terminator byte inside the wave data will truncate it on a
	/// plain socket transport.
	pub fn read_arb_waveform(&mut self, name: &str, chan: Option<u32>) -> Result<Vec<i16>> {
		self.core.select_channel(chan)?;

		let raw = self.core.query_raw(&format!("WVDT? USER,{}", name), Check::Default)?;

		let len_pos = find_subsequence(&raw, b"LENGTH,")
			.ok_or_else(|| AwgError::Protocol("WVDT? response carries no LENGTH field".to_string()))?;
		let digits: String = raw[len_pos + b"LENGTH,".len()..]
			.iter()
			.take_while(|b| b.is_ascii_digit())
			.map(|b| *b as char)
			.collect();
		let declared: usize = digits
			.parse()
			.map_err(|_| AwgError::Protocol("WVDT? LENGTH field is not numeric".to_string()))?;

		let data_pos = find_subsequence(&raw, b"WAVEDATA,")
			.ok_or_else(|| AwgError::Protocol("WVDT? response carries no WAVEDATA field".to_string()))?;
		let mut payload = &raw[data_pos + b"WAVEDATA,".len()..];

		// the response terminator is not part of the wave data
		if payload.len() == declared + 1 && payload.last() == Some(&b'\n') {
			payload = &payload[..declared];
		}

		if payload.len() != declared {
			return Err(AwgError::Protocol(format!(
				"WVDT? declared {} bytes of wave data but {} received",
				declared,
				payload.len()
			)));
		}
		if declared % 2 != 0 {
			return Err(AwgError::Protocol(format!(
				"WVDT? wave data length {} is not a whole number of 16-bit samples",
				declared
			)));
		}

		let mut rdr = Cursor::new(payload);
		let mut samples: Vec<i16> = Vec::with_capacity(declared / 2);
		for _ in 0..declared / 2 {
			samples.push(rdr.read_i16::<LittleEndian>()?);
		}

		Ok(samples)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unit_strip_is_a_char_set_right_trim() {
		assert_eq!(unit_f64("40000000HZ", "HZ", "FRQ").unwrap(), 40000000.0);
		assert_eq!(unit_f64("12.5PM", "PM", "FRQDEV").unwrap(), 12.5);
		assert_eq!(unit_f64("1.25E-08S", "S", "PW").unwrap(), 1.25e-8);
		assert_eq!(unit_f64("50", "", "DUTY").unwrap(), 50.0);
		// lower case values are upper cased before the trim
		assert_eq!(unit_f64("1000hz", "HZ", "FRQ").unwrap(), 1000.0);
		assert!(unit_f64("garbage", "HZ", "FRQ").is_err());
	}

	#[test]
	fn subsequence_scan() {
		assert_eq!(find_subsequence(b"WVDT WVNM,x,WAVEDATA,abc", b"WAVEDATA,"), Some(12));
		assert_eq!(find_subsequence(b"short", b"WAVEDATA,"), None);
	}
}
