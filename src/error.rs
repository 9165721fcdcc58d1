
use thiserror::Error;

/// Everything that can go wrong while driving an AWG.
///
/// Validation and protocol-mismatch failures abort the current call before or
/// after exactly one write respectively; transport failures propagate
/// unchanged from the transport layer. Device-reported errors read from the
/// instrument's error queue are logged, never raised, and so have no variant
/// here.
#[derive(Debug, Error)]
pub enum AwgError {
	// Caller supplied an out-of-range or unrecognized parameter. Raised before any write.
	#[error("validation: {0}")]
	Validation(String),

	// A response did not match the expected shape. Indicates a firmware/version mismatch.
	#[error("protocol mismatch: {0}")]
	Protocol(String),

	// Operation key absent from the merged command table. A configuration error, not a runtime one.
	#[error("unknown command key: {0}")]
	MissingCommand(String),

	// Command template could not be instantiated with the given channel/value.
	#[error("command template: {0}")]
	Template(String),

	// Operation exists only on another instrument family.
	#[error("not supported by this instrument family: {0}")]
	Unsupported(&'static str),

	#[error("transport: {0}")]
	Transport(#[from] std::io::Error),

	#[error("response was not valid UTF-8")]
	Utf8(#[from] std::str::Utf8Error),

	#[error("setup file: {0}")]
	Setup(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AwgError>;
