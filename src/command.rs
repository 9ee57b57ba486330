// Pickle Prefetching Accelerator Rust Bindings
// SPDX-License-Identifier: MIT

//! Device command types and the command-header wire encoding.
//!
//! Every command sent to the device is a 16-byte little-endian header
//! (command type, payload length) followed by the payload. See
//! [`crate::device`] for the two-phase write itself.

/// Size of the command header in bytes (two u64 fields).
pub const COMMAND_HEADER_SIZE: usize = 16;

/// Commands understood by the Pickle device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum DeviceCommand {
    /// Register a physical address range the device must observe for
    /// writes. Payload: 16 bytes, range start and range end.
    AddWatchRange = 1,

    /// Transmit a serialized job descriptor buffer
    /// (see [`crate::job::Job::serialize`]).
    SendJobDescriptor = 2,
}

impl DeviceCommand {
    /// Returns the command as its u64 wire value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self as u64
    }

    /// Returns a human-readable name for the command.
    pub const fn name(self) -> &'static str {
        match self {
            Self::AddWatchRange => "ADD_WATCH_RANGE",
            Self::SendJobDescriptor => "SEND_JOB_DESCRIPTOR",
        }
    }

    /// Encode the 16-byte header for this command and a payload of
    /// `payload_len` bytes.
    pub fn encode_header(self, payload_len: u64) -> [u8; COMMAND_HEADER_SIZE] {
        let mut header = [0u8; COMMAND_HEADER_SIZE];
        header[..8].copy_from_slice(&self.as_u64().to_le_bytes());
        header[8..].copy_from_slice(&payload_len.to_le_bytes());
        header
    }
}

impl std::fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u64())
    }
}
