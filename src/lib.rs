//! A compact, synchronous implementation of a [Modbus](http://modbus.org/) RTU
//! slave for half-duplex serial links.
//!
//! # Features
//!
//! * Single-threaded, allocation-free poll cycle driven by the caller
//! * Panic-free parsing with CRC-16 validation and bounded resynchronization
//! * Register table owned by the caller, borrowed only for the duration of a poll
//! * Driver-enable control for RS-485 transceivers without automatic direction switching
//! * Broadcast writes, exception responses, and byte-level decode logging
//!
//! # Supported Functions
//!
//! * Read Holding Registers (`0x03`)
//! * Write Multiple Registers (`0x10`)
//!
//! All other function codes addressed to the slave are answered with an
//! `ILLEGAL FUNCTION` exception.
//!
//! # Example
//!
//! A slave polled from the application's main loop
//!
//! ```no_run
//! use minirtu::{PollError, PollOutcome, RtuSlave, Transport, UnitId};
//!
//! struct Line;
//!
//! impl Transport for Line {
//!     fn bytes_available(&mut self) -> std::io::Result<bool> {
//!         unimplemented!("query the receive buffer")
//!     }
//!     fn read_byte(&mut self) -> std::io::Result<u8> {
//!         unimplemented!("pop one received byte")
//!     }
//!     fn write_all(&mut self, _data: &[u8]) -> std::io::Result<()> {
//!         unimplemented!("transmit a response")
//!     }
//!     fn discard_input(&mut self) -> std::io::Result<()> {
//!         unimplemented!("drop all pending bytes")
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registers = [0u16; 16];
//!     let mut slave = RtuSlave::new(UnitId::new(0x11), Line)?;
//!
//!     loop {
//!         match slave.poll(&mut registers) {
//!             Ok(PollOutcome::Processed(_)) | Ok(PollOutcome::Idle) => {}
//!             Err(PollError::Io(err)) => return Err(err.into()),
//!             Err(_) => {} // bad frame, already handled; keep polling
//!         }
//!     }
//! }
//! ```

/// Public protocol constants
pub mod constants;

mod decode;
mod error;
mod exception;
mod frame;
mod function;
mod phys;
mod slave;
mod types;

#[cfg(test)]
mod mock;

#[cfg(feature = "serial")]
pub mod serial;

pub use crate::decode::{DecodeLevel, FrameDecodeLevel, PhysDecodeLevel};
pub use crate::error::{FrameParseError, InternalError, InvalidAddress, PollError, PollOutcome};
pub use crate::exception::ExceptionCode;
pub use crate::phys::{DriverEnable, NoDriverEnable, Transport};
pub use crate::slave::RtuSlave;
pub use crate::types::UnitId;
