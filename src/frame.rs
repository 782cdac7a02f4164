use scursor::WriteCursor;

use crate::decode::{DecodeLevel, FrameDecodeLevel};
use crate::error::{FrameParseError, InternalError, PollError};
use crate::exception::ExceptionCode;
use crate::function::FunctionCode;
use crate::phys::{DriverEnable, PhysLayer, Transport};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const ADDRESS_LENGTH: usize = 1;
    pub(crate) const FUNCTION_CODE_LENGTH: usize = 1;
    pub(crate) const CRC_LENGTH: usize = 2;
    /// Hard ceiling on the RTU frame size, including address and CRC
    pub(crate) const MAX_FRAME_LENGTH: usize = 256;
    /// Fixed read request tail: 2-byte start address + 2-byte count
    pub(crate) const READ_REQUEST_TAIL: usize = 4;
    /// Write request meta: 4 address/count bytes + 1 byte-count byte
    pub(crate) const WRITE_REQUEST_META: usize = 5;
    /// Offset of the byte-count field within a write request frame
    pub(crate) const WRITE_BYTE_COUNT_OFFSET: usize = 6;
}

/// precomputes the CRC table as a constant!
const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);

/// CRC-16/MODBUS over the given span
pub(crate) fn crc16(bytes: &[u8]) -> u16 {
    CRC.checksum(bytes)
}

/// Recompute the CRC over all but the last two bytes and compare it to the
/// trailing 16 bits, which travel low byte first
pub(crate) fn verify_crc(adu: &[u8]) -> Result<(), FrameParseError> {
    let body_length = match adu.len().checked_sub(constants::CRC_LENGTH) {
        Some(x) => x,
        None => return Err(FrameParseError::CrcValidationFailure(0, crc16(adu))),
    };
    let received = u16::from_le_bytes([adu[body_length], adu[body_length + 1]]);
    let expected = crc16(&adu[..body_length]);
    if received != expected {
        return Err(FrameParseError::CrcValidationFailure(received, expected));
    }
    Ok(())
}

/// One received ADU in a bounded, capacity-checked buffer
#[derive(Debug)]
pub(crate) struct Frame {
    length: usize,
    adu: [u8; constants::MAX_FRAME_LENGTH],
}

impl Frame {
    pub(crate) fn new() -> Self {
        Self {
            length: 0,
            adu: [0; constants::MAX_FRAME_LENGTH],
        }
    }

    /// Append a byte, rejecting writes past capacity
    pub(crate) fn push(&mut self, byte: u8) -> Result<(), FrameParseError> {
        match self.adu.get_mut(self.length) {
            Some(slot) => {
                *slot = byte;
                self.length += 1;
                Ok(())
            }
            None => Err(FrameParseError::FrameLengthTooBig(
                self.length + 1,
                constants::MAX_FRAME_LENGTH,
            )),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.length
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.adu[..self.length]
    }

    /// Destination address, valid once the header phase has completed
    pub(crate) fn unit_id(&self) -> UnitId {
        UnitId::new(self.adu[0])
    }

    /// Raw function code, valid once the header phase has completed
    pub(crate) fn raw_function(&self) -> u8 {
        self.adu[1]
    }

    /// Bytes between the function code and the CRC trailer
    pub(crate) fn payload(&self) -> &[u8] {
        let start = constants::ADDRESS_LENGTH + constants::FUNCTION_CODE_LENGTH;
        let end = self.length.saturating_sub(constants::CRC_LENGTH);
        self.adu.get(start..end).unwrap_or_default()
    }
}

/// Phases of the byte-count-driven receiver
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ReceiveState {
    /// Reading the address and function code
    AwaitingFunction,
    /// Reading the function-specific meta bytes
    AwaitingMeta(FunctionCode),
    /// Reading the remaining payload and CRC
    AwaitingData,
}

/// What the receiver must do next
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    /// Read this many more bytes, then transition to the given state
    Read(ReceiveState, usize),
    /// The frame is complete
    Done,
}

/// Why a frame was rejected mid-reception
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Reject {
    /// The function code is not one this slave implements
    UnknownFunctionCode(u8),
    /// The projected total frame length exceeds the ceiling
    ProjectedOverrun(usize),
    /// Fewer bytes than the phase requires, a bug in the driving loop
    Truncated,
}

/// Pure transition function of the receiver
///
/// Given the current phase and the bytes accumulated so far, decides how many
/// bytes to read next, independent of any transport.
pub(crate) fn next_step(state: ReceiveState, bytes: &[u8]) -> Result<Step, Reject> {
    match state {
        ReceiveState::AwaitingFunction => {
            let raw_function = match bytes.get(constants::ADDRESS_LENGTH) {
                Some(x) => *x,
                None => return Err(Reject::Truncated),
            };
            match FunctionCode::get(raw_function) {
                Some(function @ FunctionCode::ReadHoldingRegisters) => Ok(Step::Read(
                    ReceiveState::AwaitingMeta(function),
                    constants::READ_REQUEST_TAIL,
                )),
                Some(function @ FunctionCode::WriteMultipleRegisters) => Ok(Step::Read(
                    ReceiveState::AwaitingMeta(function),
                    constants::WRITE_REQUEST_META,
                )),
                None => Err(Reject::UnknownFunctionCode(raw_function)),
            }
        }
        ReceiveState::AwaitingMeta(function) => {
            let mut remaining = constants::CRC_LENGTH;
            if function == FunctionCode::WriteMultipleRegisters {
                match bytes.get(constants::WRITE_BYTE_COUNT_OFFSET) {
                    Some(byte_count) => remaining += *byte_count as usize,
                    None => return Err(Reject::Truncated),
                }
            }
            let projected = bytes.len() + remaining;
            if projected > constants::MAX_FRAME_LENGTH {
                return Err(Reject::ProjectedOverrun(projected));
            }
            Ok(Step::Read(ReceiveState::AwaitingData, remaining))
        }
        ReceiveState::AwaitingData => Ok(Step::Done),
    }
}

/// Pull one complete validated frame off the line
///
/// Runs the three-phase state machine byte by byte, filtering frames that are
/// addressed elsewhere and transmitting an exception response from inside the
/// receiver when a unicast request is unsupported or oversize.
pub(crate) fn receive<T, D>(
    phys: &mut PhysLayer<T, D>,
    slave: UnitId,
    decode: DecodeLevel,
) -> Result<(Frame, FunctionCode), PollError>
where
    T: Transport,
    D: DriverEnable,
{
    let mut frame = Frame::new();
    let mut state = ReceiveState::AwaitingFunction;
    let mut to_read = constants::ADDRESS_LENGTH + constants::FUNCTION_CODE_LENGTH;
    let mut function = None;

    loop {
        for _ in 0..to_read {
            match phys.read_byte()? {
                Some(byte) => frame.push(byte)?,
                None => return Err(PollError::RxTimeout),
            }
        }

        if state == ReceiveState::AwaitingFunction {
            let destination = frame.unit_id();
            if destination.is_rtu_reserved() {
                tracing::warn!("received frame with reserved unit id {destination}");
            }
            if destination != slave && !destination.is_broadcast() {
                phys.flush(decode.physical)?;
                return Err(PollError::NotForUs);
            }
        }

        match next_step(state, frame.as_bytes()) {
            Ok(Step::Read(next, count)) => {
                if let ReceiveState::AwaitingMeta(code) = next {
                    function = Some(code);
                }
                state = next;
                to_read = count;
            }
            Ok(Step::Done) => break,
            Err(reject) => return Err(reject_frame(phys, slave, &frame, reject, decode)?),
        }
    }

    verify_crc(frame.as_bytes()).map_err(|err| {
        tracing::warn!("dropping frame: {err}");
        err
    })?;

    if decode.frame.enabled() {
        tracing::info!(
            "RTU RX - {}",
            RtuDisplay::new(decode.frame, frame.as_bytes())
        );
    }

    match function {
        Some(function) => Ok((frame, function)),
        None => Err(InternalError::InsufficientBytesForRead.into()),
    }
}

/// Resynchronize the line and, for unicast requests, answer with an exception
///
/// Returns the error the poll cycle ends with. Broadcast and foreign frames
/// never get a reply, per Modbus convention.
fn reject_frame<T, D>(
    phys: &mut PhysLayer<T, D>,
    slave: UnitId,
    frame: &Frame,
    reject: Reject,
    decode: DecodeLevel,
) -> Result<PollError, PollError>
where
    T: Transport,
    D: DriverEnable,
{
    phys.flush(decode.physical)?;

    let (code, parse_error) = match reject {
        Reject::UnknownFunctionCode(raw) => (
            ExceptionCode::IllegalFunction,
            FrameParseError::UnknownFunctionCode(raw),
        ),
        Reject::ProjectedOverrun(length) => (
            ExceptionCode::IllegalDataValue,
            FrameParseError::FrameLengthTooBig(length, constants::MAX_FRAME_LENGTH),
        ),
        Reject::Truncated => return Ok(InternalError::InsufficientBytesForRead.into()),
    };

    let destination = frame.unit_id();
    if destination == slave && !destination.is_broadcast() {
        send_exception(phys, slave, frame.raw_function() | 0x80, code, decode)?;
        return Ok(PollError::ExceptionSent(code));
    }

    tracing::warn!("dropping frame: {parse_error}");
    Ok(PollError::BadFrame(parse_error))
}

/// Compute the CRC over everything written since `start` and append it low byte first
///
/// Returns the total frame length.
pub(crate) fn seal_frame(cursor: &mut WriteCursor, start: usize) -> Result<usize, PollError> {
    let end = cursor.position();
    let crc = match cursor.get(start..end) {
        Some(bytes) => crc16(bytes),
        None => return Err(InternalError::BadSeekOperation.into()),
    };
    cursor.write_u16_le(crc)?;
    Ok(cursor.position() - start)
}

/// Build and transmit an exception response: `[slave][error function][code][crc]`
///
/// `error_function` is the request's function code with the high bit already set.
pub(crate) fn send_exception<T, D>(
    phys: &mut PhysLayer<T, D>,
    slave: UnitId,
    error_function: u8,
    code: ExceptionCode,
    decode: DecodeLevel,
) -> Result<(), PollError>
where
    T: Transport,
    D: DriverEnable,
{
    let mut buffer: [u8; 8] = [0; 8];
    let mut cursor = WriteCursor::new(&mut buffer);
    let start = cursor.position();
    cursor.write_u8(slave.value)?;
    cursor.write_u8(error_function)?;
    cursor.write_u8(code.into())?;
    let length = seal_frame(&mut cursor, start)?;

    if decode.frame.enabled() {
        tracing::warn!("RTU TX - Modbus exception {code:?} ({:#04X})", u8::from(code));
    }

    phys.write(&buffer[..length], decode.physical)?;
    Ok(())
}

pub(crate) struct RtuDisplay<'a> {
    level: FrameDecodeLevel,
    adu: &'a [u8],
}

impl<'a> RtuDisplay<'a> {
    pub(crate) fn new(level: FrameDecodeLevel, adu: &'a [u8]) -> Self {
        RtuDisplay { level, adu }
    }
}

impl std::fmt::Display for RtuDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "dest: {:#04X} func: {:#04X} (frame len = {})",
            self.adu.first().copied().unwrap_or(0),
            self.adu.get(1).copied().unwrap_or(0),
            self.adu.len(),
        )?;
        if self.level.payload_enabled() {
            crate::phys::format_bytes(f, self.adu)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::mock;
    use crate::phys::NoDriverEnable;

    const UNIT_ID: u8 = 0x11;

    const READ_HOLDING_REGISTERS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x03,    // function code
        0x00, 0x02, // starting address
        0x00, 0x03, // qty of registers
        0xA6, 0x9B, // crc
    ];

    const WRITE_MULTIPLE_REGISTERS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x10,    // function code
        0x00, 0x02, // starting address
        0x00, 0x02, // qty of registers
        0x04, // byte count
        0xCA, 0xFE, 0xBA, 0xBE, // register values
        0x8B, 0x8E, // crc
    ];

    fn append_crc(frame: &mut Vec<u8>) {
        let crc = crc16(frame);
        frame.push((crc & 0x00FF) as u8);
        frame.push(((crc & 0xFF00) >> 8) as u8);
    }

    #[test]
    fn computes_the_reference_crc() {
        // value cross-checked against crccalc.com (CRC-16/MODBUS)
        assert_eq!(crc16(&[0x11, 0x03, 0x00, 0x02, 0x00, 0x03]), 0x9BA6);
    }

    #[test]
    fn accepts_a_frame_with_a_valid_trailer() {
        assert_eq!(verify_crc(READ_HOLDING_REGISTERS_REQUEST), Ok(()));
        assert_eq!(verify_crc(WRITE_MULTIPLE_REGISTERS_REQUEST), Ok(()));
    }

    #[test]
    fn rejects_every_single_bit_flip() {
        for byte in 0..READ_HOLDING_REGISTERS_REQUEST.len() {
            for bit in 0..8 {
                let mut frame = READ_HOLDING_REGISTERS_REQUEST.to_vec();
                frame[byte] ^= 1 << bit;
                assert!(
                    verify_crc(&frame).is_err(),
                    "bit {bit} of byte {byte} went undetected"
                );
            }
        }
    }

    #[test]
    fn frame_buffer_rejects_writes_past_capacity() {
        let mut frame = Frame::new();
        for i in 0..constants::MAX_FRAME_LENGTH {
            frame.push(i as u8).unwrap();
        }
        assert_eq!(
            frame.push(0xFF),
            Err(FrameParseError::FrameLengthTooBig(
                constants::MAX_FRAME_LENGTH + 1,
                constants::MAX_FRAME_LENGTH
            ))
        );
        assert_eq!(frame.len(), constants::MAX_FRAME_LENGTH);
    }

    #[test]
    fn read_request_header_advances_to_a_four_byte_meta_phase() {
        assert_eq!(
            next_step(ReceiveState::AwaitingFunction, &[UNIT_ID, 0x03]),
            Ok(Step::Read(
                ReceiveState::AwaitingMeta(FunctionCode::ReadHoldingRegisters),
                4
            ))
        );
    }

    #[test]
    fn write_request_header_advances_to_a_five_byte_meta_phase() {
        assert_eq!(
            next_step(ReceiveState::AwaitingFunction, &[UNIT_ID, 0x10]),
            Ok(Step::Read(
                ReceiveState::AwaitingMeta(FunctionCode::WriteMultipleRegisters),
                5
            ))
        );
    }

    #[test]
    fn unsupported_function_code_is_rejected_at_the_header_phase() {
        assert_eq!(
            next_step(ReceiveState::AwaitingFunction, &[UNIT_ID, 0x2B]),
            Err(Reject::UnknownFunctionCode(0x2B))
        );
    }

    #[test]
    fn read_meta_phase_leaves_only_the_crc_to_read() {
        let bytes = &[UNIT_ID, 0x03, 0x00, 0x02, 0x00, 0x03];
        assert_eq!(
            next_step(ReceiveState::AwaitingMeta(FunctionCode::ReadHoldingRegisters), bytes),
            Ok(Step::Read(ReceiveState::AwaitingData, 2))
        );
    }

    #[test]
    fn write_meta_phase_adds_the_byte_count_field() {
        let bytes = &[UNIT_ID, 0x10, 0x00, 0x02, 0x00, 0x02, 0x04];
        assert_eq!(
            next_step(
                ReceiveState::AwaitingMeta(FunctionCode::WriteMultipleRegisters),
                bytes
            ),
            Ok(Step::Read(ReceiveState::AwaitingData, 6))
        );
    }

    #[test]
    fn projected_oversize_frame_is_rejected_before_reading_it() {
        // 7 bytes so far + 2 CRC + 0xFF payload bytes = 264 > 256
        let bytes = &[UNIT_ID, 0x10, 0x00, 0x02, 0x00, 0x7C, 0xFF];
        assert_eq!(
            next_step(
                ReceiveState::AwaitingMeta(FunctionCode::WriteMultipleRegisters),
                bytes
            ),
            Err(Reject::ProjectedOverrun(264))
        );
    }

    #[test]
    fn data_phase_completes_the_frame() {
        assert_eq!(
            next_step(ReceiveState::AwaitingData, READ_HOLDING_REGISTERS_REQUEST),
            Ok(Step::Done)
        );
    }

    #[test]
    fn receives_a_complete_read_request() {
        let (transport, handle) = mock();
        let mut phys = PhysLayer::new(transport, NoDriverEnable);
        handle.queue(READ_HOLDING_REGISTERS_REQUEST);

        let (frame, function) =
            receive(&mut phys, UnitId::new(UNIT_ID), DecodeLevel::nothing()).unwrap();

        assert_eq!(function, FunctionCode::ReadHoldingRegisters);
        assert_eq!(frame.as_bytes(), READ_HOLDING_REGISTERS_REQUEST);
        assert_eq!(frame.payload(), &[0x00, 0x02, 0x00, 0x03]);
    }

    #[test]
    fn receives_a_variable_length_write_request() {
        let (transport, handle) = mock();
        let mut phys = PhysLayer::new(transport, NoDriverEnable);
        handle.queue(WRITE_MULTIPLE_REGISTERS_REQUEST);

        let (frame, function) =
            receive(&mut phys, UnitId::new(UNIT_ID), DecodeLevel::nothing()).unwrap();

        assert_eq!(function, FunctionCode::WriteMultipleRegisters);
        assert_eq!(frame.as_bytes(), WRITE_MULTIPLE_REGISTERS_REQUEST);
    }

    #[test]
    fn filters_a_frame_addressed_to_another_slave() {
        let (transport, handle) = mock();
        let mut phys = PhysLayer::new(transport, NoDriverEnable);
        handle.queue(READ_HOLDING_REGISTERS_REQUEST);

        let err = receive(&mut phys, UnitId::new(0x22), DecodeLevel::nothing()).unwrap_err();

        assert!(matches!(err, PollError::NotForUs));
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn times_out_when_the_master_stops_mid_frame() {
        let (transport, handle) = mock();
        let mut phys = PhysLayer::new(transport, NoDriverEnable);
        handle.queue(&READ_HOLDING_REGISTERS_REQUEST[..4]);

        let err = receive(&mut phys, UnitId::new(UNIT_ID), DecodeLevel::nothing()).unwrap_err();

        assert!(matches!(err, PollError::RxTimeout));
    }

    #[test]
    fn drops_a_frame_with_a_bad_crc_without_replying() {
        let (transport, handle) = mock();
        let mut phys = PhysLayer::new(transport, NoDriverEnable);
        let mut request = READ_HOLDING_REGISTERS_REQUEST.to_vec();
        request[6] ^= 0xFF;
        handle.queue(&request);

        let err = receive(&mut phys, UnitId::new(UNIT_ID), DecodeLevel::nothing()).unwrap_err();

        assert!(matches!(
            err,
            PollError::BadFrame(FrameParseError::CrcValidationFailure(_, _))
        ));
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn answers_an_unsupported_unicast_function_with_an_exception() {
        let (transport, handle) = mock();
        let mut phys = PhysLayer::new(transport, NoDriverEnable);
        handle.queue(&[UNIT_ID, 0x07, 0x4C, 0x22]);

        let err = receive(&mut phys, UnitId::new(UNIT_ID), DecodeLevel::nothing()).unwrap_err();

        assert!(matches!(
            err,
            PollError::ExceptionSent(ExceptionCode::IllegalFunction)
        ));
        assert_eq!(handle.sent(), vec![UNIT_ID, 0x87, 0x01, 0x83, 0xF5]);
    }

    #[test]
    fn never_answers_an_unsupported_broadcast_function() {
        let (transport, handle) = mock();
        let mut phys = PhysLayer::new(transport, NoDriverEnable);
        handle.queue(&[0x00, 0x07]);

        let err = receive(&mut phys, UnitId::new(UNIT_ID), DecodeLevel::nothing()).unwrap_err();

        assert!(matches!(
            err,
            PollError::BadFrame(FrameParseError::UnknownFunctionCode(0x07))
        ));
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn answers_an_oversize_unicast_write_with_illegal_data_value() {
        let (transport, handle) = mock();
        let mut phys = PhysLayer::new(transport, NoDriverEnable);
        // byte count of 0xFF projects a 264 byte frame
        handle.queue(&[UNIT_ID, 0x10, 0x00, 0x02, 0x00, 0x7C, 0xFF]);

        let err = receive(&mut phys, UnitId::new(UNIT_ID), DecodeLevel::nothing()).unwrap_err();

        assert!(matches!(
            err,
            PollError::ExceptionSent(ExceptionCode::IllegalDataValue)
        ));
        assert_eq!(handle.sent(), vec![UNIT_ID, 0x90, 0x03, 0x0D, 0xC4]);
    }

    #[test]
    fn accepts_the_largest_allowed_write_frame() {
        // 0x7B registers: 7 meta bytes + 246 values + 2 CRC = 255 bytes
        let mut request = vec![UNIT_ID, 0x10, 0x00, 0x00, 0x00, 0x7B, 0xF6];
        request.extend(std::iter::repeat(0x00).take(0xF6));
        append_crc(&mut request);

        let (transport, handle) = mock();
        let mut phys = PhysLayer::new(transport, NoDriverEnable);
        handle.queue(&request);

        let (frame, _) =
            receive(&mut phys, UnitId::new(UNIT_ID), DecodeLevel::nothing()).unwrap();
        assert_eq!(frame.len(), request.len());
    }
}
