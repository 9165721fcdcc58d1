
use std::env;
use std::path::Path;
use std::thread;
use std::time::Duration;

use awg_scpi::scpi::Check;
use awg_scpi::{Awg, Result, SocketTransport};

pub fn main() -> Result<()> {
	env_logger::init();

	// TODO: search for instruments instead of needing the address provided
	let addr = env::var("AWG_ADDR").unwrap_or_else(|_| "192.168.2.3:5025".to_string());

	let transport = SocketTransport::connect(&addr)?;
	let mut awg = Awg::open_best(transport, Duration::from_secs_f32(0.1))?;

	println!("Using SCPI device: {} of series: {}", awg.idn()?, awg.series());

	if awg.is_output_hi_z(Some(1))? {
		println!("Output high impedance");
	} else {
		println!("Output 50 ohm load");
	}

	awg.set_beeper(true)?;

	// return to default parameters, then set up a basic sine output
	awg.reset()?;

	awg.set_wave_type("SINE", Some(1), None)?;
	awg.set_frequency(34.4590897823e3, None, None)?;
	awg.set_voltage_protection(3.3, None, None)?;
	awg.set_offset(1.6, None, None)?;
	awg.set_amplitude_dbm(0.8, None, None)?;
	awg.set_phase(0.45, None, None)?;

	println!("Voltage protection is set to maximum: {}", awg.query_voltage_protection(None)?);

	awg.output_on(None, None)?;
	thread::sleep(Duration::from_secs(2));
	awg.output_off(None, None)?;

	// pulse output exercised through the high/low level path, then saved and restored
	awg.reset()?;
	awg.set_voltage_protection(3.2, None, None)?;

	awg.set_wave_type("PULSE", Some(1), None)?;
	awg.set_frequency(1e3, None, None)?;
	awg.set_output_inverted(false, None, None)?;
	awg.set_output_load(false, None, None)?;
	awg.set_high_level(3.1, None, None)?;
	awg.set_low_level(0.2, None, None)?;
	awg.set_pulse_width(50e-9, None, None)?;
	awg.set_pulse_rise(2e-9, None, None)?;
	awg.set_pulse_fall(2e-9, None, None)?;
	awg.set_output_inverted(true, None, None)?;

	awg.output_on(None, None)?;

	let saved = awg.setup_save(Path::new("testSetup.json"))?;
	println!("Saved setup: {} bytes", saved);

	thread::sleep(Duration::from_secs(5));

	// change the output, then restore the saved setup over it
	awg.set_wave_type("PRBS", None, None)?;
	awg.set_high_level(2.2, None, None)?;
	awg.set_low_level(0.0, None, None)?;
	awg.set_prbs_bit_length(3, None, None)?;

	thread::sleep(Duration::from_secs(2));

	awg.setup_load(Path::new("testSetup.json"), Some(Duration::from_secs_f32(0.0)))?;

	thread::sleep(Duration::from_secs(5));

	awg.output_off(None, None)?;

	// stream a few frequency counter readings before letting go
	awg.set_freq_cntr_on(None, None)?;
	awg.set_freq_cntr_reference(40e6, None, None)?;
	awg.set_freq_cntr_trig_level(1.0, None, None)?;
	awg.set_freq_cntr_couple_dc(None, None)?;
	awg.set_freq_cntr_hfr_off(None, None)?;

	for _ in 0..10 {
		println!(
			"Freq: {}Hz  PW: {}S  NW: {}S  Duty: {}%  Freq. Dev. {}ppm",
			awg.measure_freq_cntr_frequency(None)?,
			awg.measure_freq_cntr_pos_width(None)?,
			awg.measure_freq_cntr_neg_width(None)?,
			awg.measure_freq_cntr_duty_cycle(None)?,
			awg.measure_freq_cntr_frequency_deviation(None)?
		);
	}

	awg.set_freq_cntr_off(None, None)?;
	awg.write_command("*RST", Check::Default)?;

	awg.set_local()?;
	awg.close()?;

	Ok(())
}
