use scursor::{ReadCursor, WriteCursor};

use crate::decode::DecodeLevel;
use crate::error::{InvalidAddress, PollError, PollOutcome};
use crate::exception::ExceptionCode;
use crate::frame::{self, constants, Frame, RtuDisplay};
use crate::function::FunctionCode;
use crate::phys::{DriverEnable, NoDriverEnable, PhysLayer, Transport};
use crate::types::{AddressRange, UnitId};

/// A Modbus RTU slave endpoint driven by an external polling loop
///
/// Each call to [`RtuSlave::poll`] performs at most one receive-then-reply
/// cycle against the caller's register table. The slave owns the transport
/// and the driver-enable control but never the register table, which is
/// borrowed exclusively for the duration of one poll.
pub struct RtuSlave<T, D = NoDriverEnable>
where
    T: Transport,
    D: DriverEnable,
{
    address: UnitId,
    phys: PhysLayer<T, D>,
    decode: DecodeLevel,
}

impl<T> RtuSlave<T, NoDriverEnable>
where
    T: Transport,
{
    /// Create a slave without driver-enable control, for full-duplex links
    /// or transceivers with automatic direction switching
    ///
    /// Rejects addresses above 247, the RTU reserved range.
    pub fn new(address: UnitId, transport: T) -> Result<Self, InvalidAddress> {
        Self::with_driver_enable(address, transport, NoDriverEnable)
    }
}

impl<T, D> RtuSlave<T, D>
where
    T: Transport,
    D: DriverEnable,
{
    /// Create a slave that asserts a driver-enable control around every transmission
    ///
    /// Rejects addresses above 247, the RTU reserved range.
    pub fn with_driver_enable(
        address: UnitId,
        transport: T,
        driver_enable: D,
    ) -> Result<Self, InvalidAddress> {
        if address.is_rtu_reserved() {
            return Err(InvalidAddress {
                value: address.value,
            });
        }
        Ok(Self {
            address,
            phys: PhysLayer::new(transport, driver_enable),
            decode: DecodeLevel::nothing(),
        })
    }

    /// Address this slave answers to, in addition to broadcast
    pub fn address(&self) -> UnitId {
        self.address
    }

    /// Change the amount of frame and physical layer decoding logged at the INFO level
    pub fn set_decode_level(&mut self, decode: DecodeLevel) {
        self.decode = decode;
    }

    /// Perform at most one receive-then-reply cycle
    ///
    /// The register table is borrowed for the duration of this call only;
    /// nothing is retained across polls. Every error leaves the slave ready
    /// for the next poll.
    pub fn poll(&mut self, registers: &mut [u16]) -> Result<PollOutcome, PollError> {
        if !self.phys.bytes_available()? {
            return Ok(PollOutcome::Idle);
        }

        let (request, function) = frame::receive(&mut self.phys, self.address, self.decode)?;
        let length = request.len();
        self.reply(&request, function, registers)?;
        Ok(PollOutcome::Processed(length))
    }

    /// Apply a validated request against the register table and answer it
    fn reply(
        &mut self,
        request: &Frame,
        function: FunctionCode,
        registers: &mut [u16],
    ) -> Result<(), PollError> {
        let destination = request.unit_id();
        let broadcast = destination.is_broadcast();

        let mut payload = ReadCursor::new(request.payload());
        let range = AddressRange::parse(&mut payload)?;

        // the bounds check runs before any function-specific handling
        if let Some(code) = validate(function, range, request.payload(), registers.len()) {
            if broadcast {
                tracing::warn!("broadcast {function} request dropped silently: {code}");
                return Ok(());
            }
            frame::send_exception(
                &mut self.phys,
                destination,
                function.as_error(),
                code,
                self.decode,
            )?;
            return Err(PollError::ExceptionSent(code));
        }

        // the range was validated against the table length above
        let span = range.start as usize..range.start as usize + range.count as usize;

        let mut buffer: [u8; constants::MAX_FRAME_LENGTH] = [0; constants::MAX_FRAME_LENGTH];
        let mut cursor = WriteCursor::new(&mut buffer);
        let start = cursor.position();

        match function {
            FunctionCode::ReadHoldingRegisters => {
                cursor.write_u8(destination.value)?;
                cursor.write_u8(function.get_value())?;
                cursor.write_u8((range.count * 2) as u8)?;
                for value in registers[span].iter() {
                    cursor.write_u16_be(*value)?;
                }
            }
            FunctionCode::WriteMultipleRegisters => {
                payload.read_u8()?; // skip the byte-count field
                for slot in registers[span].iter_mut() {
                    *slot = payload.read_u16_be()?;
                }
                // echo the address and count fields of the request
                cursor.write_u8(destination.value)?;
                cursor.write_u8(function.get_value())?;
                cursor.write_u16_be(range.start)?;
                cursor.write_u16_be(range.count)?;
            }
        }

        let length = frame::seal_frame(&mut cursor, start)?;

        if broadcast {
            // the write side effect stands, but broadcast never gets a reply
            return Ok(());
        }

        if self.decode.frame.enabled() {
            tracing::info!(
                "RTU TX - {}",
                RtuDisplay::new(self.decode.frame, &buffer[..length])
            );
        }
        self.phys.write(&buffer[..length], self.decode.physical)?;
        Ok(())
    }
}

/// Function-specific request validation, run after the unconditional bounds check
fn validate(
    function: FunctionCode,
    range: AddressRange,
    payload: &[u8],
    table_len: usize,
) -> Option<ExceptionCode> {
    if range.to_range_within(table_len).is_err() {
        return Some(ExceptionCode::IllegalDataAddress);
    }

    if range.count == 0 || range.count > function.max_register_count() {
        return Some(ExceptionCode::IllegalDataValue);
    }

    if function == FunctionCode::WriteMultipleRegisters {
        // the byte-count field must agree with the register count
        match payload.get(4) {
            Some(&byte_count) if byte_count as usize == 2 * range.count as usize => {}
            _ => return Some(ExceptionCode::IllegalDataValue),
        }
    }

    None
}
