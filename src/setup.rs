
use std::collections::BTreeMap;

use crate::error::{AwgError, Result};
use crate::scpi::on_or_off;

/// One command group as queried from the device: flat parameter-name → value.
pub type Group = BTreeMap<String, String>;

/// One channel's saved state: command-group name (`OUTP`, `BSWV`, `ARWV`,
/// `SRATE`) → parameter group.
pub type ChannelSetup = BTreeMap<String, Group>;

/// A full saved setup: one entry per channel, in channel order. Serialized as
/// JSON with sorted keys (`BTreeMap` gives that for free).
pub type SetupDocument = Vec<ChannelSetup>;

fn position_of(params: &[String], name: &str) -> Option<usize> {
	params.iter().position(|p| p.to_uppercase() == name)
}

fn move_to_front(params: &mut Vec<String>, name: &str) {
	if let Some(pos) = position_of(params, name) {
		let p = params.remove(pos);
		params.insert(0, p);
	}
}

fn remove_param(params: &mut Vec<String>, name: &str) {
	if let Some(pos) = position_of(params, name) {
		params.remove(pos);
	}
}

/// Group replay order for one channel. The output group must be written
/// first: load impedance and polarity change how the instrument interprets
/// every voltage parameter that follows.
pub fn ordered_groups(chan_setup: &ChannelSetup) -> Vec<String> {
	let mut groups: Vec<String> = chan_setup.keys().cloned().collect();
	if position_of(&groups, "OUTP").is_some() {
		move_to_front(&mut groups, "OUTP");
	} else {
		move_to_front(&mut groups, "OUTPUT");
	}
	groups
}

/// Parameter replay order within one group.
///
/// For the basic-wave group the order is load-bearing and the redundant
/// amplitude representations are dropped:
/// - `WVTP` first, or the device rejects every type-specific parameter;
/// - `FRQ` next, then `PERI` (timing before dependent parameters like `DLY`);
///   when both are present `PERI` is dropped outright, because replaying both
///   hits a firmware rounding mismatch and skews the frequency;
/// - `DIFFSTATE` before any voltage parameter, so paired channels pick them
///   both up;
/// - `AMPDBM`/`AMPVRMS` are dropped when `AMP` is present, and `HLEV`/`LLEV`
///   when `AMP` and `OFST` are, to avoid compounding rounding error across
///   equivalent representations.
///
/// Every other group replays its parameters in natural (sorted) order.
pub fn plan_group_params(group_name: &str, group: &Group) -> Result<Vec<String>> {
	let mut params: Vec<String> = group.keys().cloned().collect();

	let upper = group_name.to_uppercase();
	if upper != "BSWV" && upper != "BASIC_WAVE" {
		return Ok(params);
	}

	move_to_front(&mut params, "DIFFSTATE");
	move_to_front(&mut params, "PERI");
	move_to_front(&mut params, "FRQ");

	if position_of(&params, "WVTP").is_none() {
		return Err(AwgError::Protocol(
			"no WVTP parameter saved for the basic-wave group".to_string(),
		));
	}
	move_to_front(&mut params, "WVTP");

	if position_of(&params, "FRQ").is_some() {
		remove_param(&mut params, "PERI");
	}

	if position_of(&params, "AMP").is_some() {
		remove_param(&mut params, "AMPDBM");
		remove_param(&mut params, "AMPVRMS");

		if position_of(&params, "OFST").is_some() {
			remove_param(&mut params, "HLEV");
			remove_param(&mut params, "LLEV");
		}
	}

	Ok(params)
}

/// Differential-pairing state saved in this channel's basic-wave group, if
/// any. When enabled, the paired (following) channel is configured by this
/// one and its own saved group must be skipped on replay; when the key is
/// absent the previously seen state stands.
pub fn diffstate_value(chan_setup: &ChannelSetup) -> Option<bool> {
	for (name, group) in chan_setup {
		let upper = name.to_uppercase();
		if upper != "BSWV" && upper != "BASIC_WAVE" {
			continue;
		}
		for (param, value) in group {
			if param.to_uppercase() == "DIFFSTATE" {
				return Some(on_or_off(value));
			}
		}
	}
	None
}
