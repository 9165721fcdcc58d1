
// Error taxonomy shared by every layer: validation, protocol mismatch, transport
pub mod error;

// The transport contract (blocking VISA-style byte primitives) plus a raw-socket implementation
pub mod transport;

// Mapping from abstract operation names to wire-format command templates
pub mod cmd;

// Instrument-family policies: channel naming, command overrides, quirks
pub mod family;

// Generic SCPI plumbing: command formatting, pacing, error-queue handling, identity
pub mod scpi;

// Saved-setup document model and the replay ordering rules
pub mod setup;

// The AWG driver itself: waveform parameters, frequency counter, setup save/load, arbitrary waveforms
pub mod awg;

pub use crate::awg::Awg;
pub use crate::error::{AwgError, Result};
pub use crate::family::Family;
pub use crate::transport::socket::SocketTransport;
pub use crate::transport::Transport;
