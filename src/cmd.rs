
use std::collections::HashMap;

use strfmt::strfmt;

use crate::error::{AwgError, Result};

/// Commands every SCPI instrument is expected to understand, regardless of
/// what kind of instrument it is. Families override entries whose syntax
/// differs (e.g. Siglent's beeper is `BUZZ`, not `SYSTem:BEEPer`).
pub const SCPI_CMDS: &[(&str, &str)] = &[
	("setLocal", "SYSTem:LOCal"),
	("setRemote", "SYSTem:REMote"),
	("setRemoteLock", "SYSTem:RWLock ON"),
	("beeperOn", "SYSTem:BEEPer:STATe ON"),
	("beeperOff", "SYSTem:BEEPer:STATe OFF"),
	("isOutput", "OUTPut:STATe?"),
	("outputOn", "OUTPut:STATe ON"),
	("outputOff", "OUTPut:STATe OFF"),
];

/// Waveform-generator operations. Templates take the channel name as `{chan}`
/// and the value as `{val}`; entries without a placeholder are fixed strings.
/// The wire syntax follows the Siglent SDG series, which is the reference
/// dialect this table grew from.
pub const AWG_CMDS: &[(&str, &str)] = &[
	("setWaveType", "{chan}:BSWV WVTP,{val}"),
	("setFrequency", "{chan}:BSWV FRQ,{val}"),
	("setPeriod", "{chan}:BSWV PERI,{val}"),
	("setAmplitude", "{chan}:BSWV AMP,{val}"),
	("setAmplitudeVrms", "{chan}:BSWV AMPVRMS,{val}"),
	("setAmplitudedBm", "{chan}:BSWV AMPDBM,{val}"),
	("setOffset", "{chan}:BSWV OFST,{val}"),
	("setRampSymmetry", "{chan}:BSWV SYM,{val}"),
	("setDutyCycle", "{chan}:BSWV DUTY,{val}"),
	("setPhase", "{chan}:BSWV PHSE,{val}"),
	("setNoiseStdDev", "{chan}:BSWV STDEV,{val}"),
	("setNoiseMean", "{chan}:BSWV MEAN,{val}"),
	("setPulseWidth", "{chan}:BSWV WIDTH,{val}"),
	("setPulseRise", "{chan}:BSWV RISE,{val}"),
	("setPulseFall", "{chan}:BSWV FALL,{val}"),
	("setPulseDelay", "{chan}:BSWV DLY,{val}"),
	("setHighLevel", "{chan}:BSWV HLEV,{val}"),
	("setLowLevel", "{chan}:BSWV LLEV,{val}"),
	("setNoiseBandwidth", "{chan}:BSWV BANDWIDTH,{val}"),
	("setNoiseBandState", "{chan}:BSWV BANDSTATE,{val}"),
	("setPRBSBitLength", "{chan}:BSWV LENGTH,{val}"),
	("setPRBSEdge", "{chan}:BSWV EDGE,{val}"),
	("setPRBSDiffState", "{chan}:BSWV DIFFSTATE,{val}"),
	("setPRBSBitRate", "{chan}:BSWV BITRATE,{val}"),
	("setPRBSLogicLevel", "{chan}:BSWV LOGICLEVEL,{val}"),

	("setOutputLoad", "{chan}:OUTP LOAD,{val}"),
	("setOutputPolarity", "{chan}:OUTP PLRT,{val}"),
	("setSignalPolarity", "{chan}:INVT {val}"),

	("setArbWaveByName", "{chan}:ARWV NAME,{val}"),

	// Standard-SCPI forms; Siglent remaps these onto BSWV MAX_OUTPUT_AMP
	("setVoltageProtection", "SOURce:VOLTage:PROTection:LEVel {val}"),
	("queryVoltageProtection", "SOURce:VOLTage:PROTection:LEVel?"),

	// Frequency counter setup and measurements
	("setFreqCntrOn", "FCNT STATE,ON"),
	("setFreqCntrOff", "FCNT STATE,OFF"),
	("setFreqCntrReference", "FCNT REFQ,{val}"),
	("setFreqCntrTrigLevel", "FCNT TRG,{val}"),
	("setFreqCntrCoupleAC", "FCNT MODE,AC"),
	("setFreqCntrCoupleDC", "FCNT MODE,DC"),
	("setFreqCntrHfrOn", "FCNT HFR,ON"),
	("setFreqCntrHfrOff", "FCNT HFR,OFF"),
	("measureFreqCntr", "FCNT?"),
];

/// The merged operation-name → wire-template mapping for one driver instance.
///
/// Built exactly once at driver construction: base SCPI table, then the AWG
/// table, then the family overrides, later entries replacing earlier ones for
/// identical keys. Never mutated afterwards. A key missing at lookup time is
/// a configuration error, not a device error.
pub struct CmdTable {
	map: HashMap<&'static str, &'static str>,
}

impl CmdTable {
	pub fn new(overrides: &[(&'static str, &'static str)]) -> Self {
		let mut map: HashMap<&'static str, &'static str> = HashMap::new();
		for &(key, template) in SCPI_CMDS.iter().chain(AWG_CMDS.iter()).chain(overrides.iter()) {
			map.insert(key, template);
		}

		Self { map }
	}

	pub fn resolve(&self, key: &str) -> Result<&'static str> {
		match self.map.get(key) {
			Some(template) => Ok(*template),
			None => Err(AwgError::MissingCommand(key.to_string())),
		}
	}

	/// Instantiate the template for `key` with the given channel name and value.
	/// Both substitutions are always offered; templates use what they need.
	pub fn fill(&self, key: &str, chan: &str, val: &str) -> Result<String> {
		let template = self.resolve(key)?;

		let mut vars: HashMap<String, String> = HashMap::new();
		vars.insert("chan".to_string(), chan.to_string());
		vars.insert("val".to_string(), val.to_string());

		strfmt(template, &vars).map_err(|e| AwgError::Template(format!("{}: {}", key, e)))
	}
}
