
use crate::scpi::{ChanSel, FirmwareVersion};

/// Siglent syntax where it deviates from the shared tables: channel-scoped
/// output and buzzer commands, and voltage protection expressed as a
/// basic-wave parameter instead of the SOURce subsystem.
const SIGLENT_CMDS: &[(&str, &str)] = &[
	("beeperOn", "BUZZ ON"),
	("beeperOff", "BUZZ OFF"),
	("isOutput", "{chan}:OUTP?"),
	("outputOn", "{chan}:OUTP ON"),
	("outputOff", "{chan}:OUTP OFF"),
	("setVoltageProtection", "{chan}:BSWV MAX_OUTPUT_AMP,{val}"),
];

/// The "no error" marker looked for in error-queue responses: `token` must
/// appear within the first `window` characters.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSentinel {
	pub token: &'static str,
	pub window: usize,
}

/// One instrument family the driver knows how to specialize for.
///
/// Deliberately a closed enum rather than an open trait: every family
/// deviation (channel naming, error quirks, chunking) is a small policy
/// method here, visible and testable on its own, and the driver core stays
/// family-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
	Generic,
	Siglent,
}

impl Family {
	/// Pick the family from a parsed `*IDN?` manufacturer field.
	pub fn from_identity(manufacturer: &str) -> Self {
		if manufacturer.trim().to_uppercase().starts_with("SIGLENT") {
			Family::Siglent
		} else {
			Family::Generic
		}
	}

	pub fn series(&self) -> &'static str {
		match self {
			Family::Generic => "GENERIC",
			Family::Siglent => "SIGLENT",
		}
	}

	pub fn max_chan(&self) -> u32 {
		match self {
			Family::Generic => 1,
			Family::Siglent => 2,
		}
	}

	pub fn command_overrides(&self) -> &'static [(&'static str, &'static str)] {
		match self {
			Family::Generic => &[],
			Family::Siglent => SIGLENT_CMDS,
		}
	}

	pub fn channel_str(&self, chan: ChanSel) -> String {
		match (self, chan) {
			(Family::Generic, ChanSel::Analog(n)) => format!("CHAN{}", n),
			(Family::Siglent, ChanSel::Analog(n)) => format!("C{}", n),
			(_, ChanSel::Pod(n)) => format!("POD{}", n),
		}
	}

	pub fn valid_wave_types(&self) -> &'static [&'static str] {
		match self {
			Family::Generic => &["SINE"],
			Family::Siglent => &["SINE", "SQUARE", "RAMP", "PULSE", "NOISE", "ARB", "DC", "PRBS"],
		}
	}

	pub fn valid_logic_levels(&self) -> &'static [&'static str] {
		match self {
			Family::Generic => &["TTL", "CMOS"],
			Family::Siglent => &["TTL_CMOS", "LVTTL_LVCMOS", "ECL", "LVPECL", "LVDS"],
		}
	}

	/// The SDG series (observed on an SDG6022X, undocumented) misinterprets
	/// any write following a message longer than this as a continuation of
	/// that message. Writes longer than the limit are split into chunks of
	/// `limit + 1` bytes, which the device reassembles. Empirical, with no
	/// known upper bound on the message sizes for which it holds.
	pub fn write_chunk_limit(&self) -> Option<usize> {
		match self {
			Family::Generic => None,
			Family::Siglent => Some(1024),
		}
	}

	/// Siglent AWGs have no local/remote front-panel mode to switch.
	pub fn has_local_remote(&self) -> bool {
		match self {
			Family::Generic => true,
			Family::Siglent => false,
		}
	}

	/// Whether `OUTP?` answers with an ON|OFF flag followed by LOAD/PLRT
	/// parameter pairs (Siglent) instead of a bare boolean.
	pub fn reads_output_as_params(&self) -> bool {
		matches!(self, Family::Siglent)
	}

	/// Whether high/low/offset voltages swap physical meaning when the output
	/// is inverted, requiring the driver to compensate before writing.
	pub fn compensates_inversion(&self) -> bool {
		matches!(self, Family::Siglent)
	}

	/// Whether the protection level reads back as the `MAX_OUTPUT_AMP` field
	/// of the basic-wave query instead of answering a dedicated query command.
	pub fn voltage_protection_via_wave_query(&self) -> bool {
		matches!(self, Family::Siglent)
	}

	/// Whether error-queue checking defaults to on once the firmware version
	/// (and with it the right no-error sentinel) is known.
	pub fn default_check_errors(&self) -> bool {
		matches!(self, Family::Siglent)
	}

	/// Highest firmware version still using the legacy error-response format.
	pub fn legacy_version_threshold(&self) -> f64 {
		0.0
	}

	pub fn error_query(&self) -> &'static str {
		"SYSTem:ERRor?"
	}

	pub fn error_sentinel(&self, version: &FirmwareVersion) -> ErrorSentinel {
		match self {
			Family::Siglent if !version.is_legacy(self.legacy_version_threshold()) => {
				ErrorSentinel { token: "0,", window: 2 }
			}
			_ => ErrorSentinel { token: "+0,", window: 3 },
		}
	}

	/// Several Siglent command groups always push error -108 onto the queue
	/// whether or not the command succeeded. Returns true when the error
	/// should be discarded for that reason.
	pub fn suppress_error(&self, error_string: &str, command: &str) -> bool {
		match self {
			Family::Generic => false,
			Family::Siglent => {
				if !error_string.starts_with("-108,") {
					return false;
				}

				let first_word = command.split(' ').next().unwrap_or("");
				let parts: Vec<String> =
					first_word.trim().to_lowercase().split(':').map(|s| s.to_string()).collect();

				match parts.len() {
					1 => matches!(
						parts[0].as_str(),
						"fcnt" | "freqcounter" | "vkey" | "virtualkey" | "wvdt?"
					),
					2 => matches!(
						parts[1].as_str(),
						"bswv" | "basic_wave"
							| "outp" | "output"
							| "arwv" | "arbwave"
							| "srate" | "samplerate"
							| "wvdt"
					),
					// responses with embedded spaces can split further; trust the second token
					_ => parts[1] == "wvdt",
				}
			}
		}
	}
}
