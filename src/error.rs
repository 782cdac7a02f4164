use std::fmt::{Error, Formatter};

use crate::exception::ExceptionCode;

/// Result of one successful poll cycle
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A request addressed to this slave was received and dispatched.
    ///
    /// Carries the length of the request frame including its CRC trailer.
    Processed(usize),
    /// No bytes were pending on the line
    Idle,
}

/// Errors that terminate one poll cycle
///
/// None of these are fatal: every variant leaves the slave ready for the
/// next poll.
#[derive(Debug)]
pub enum PollError {
    /// A malformed frame was dropped without a reply
    BadFrame(FrameParseError),
    /// A protocol exception response was transmitted to the master
    ExceptionSent(ExceptionCode),
    /// The frame was addressed to another slave
    NotForUs,
    /// The master stopped sending mid-frame
    RxTimeout,
    /// The transport failed
    Io(std::io::Error),
    /// A bug in this library
    Internal(InternalError),
}

/// Errors that occur while reading a frame off the serial line
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    /// Received a function code this slave does not implement
    UnknownFunctionCode(u8),
    /// Received frame with a length that exceeds the max allowed size
    FrameLengthTooBig(usize, usize), // actual size and the maximum size
    /// CRC validation failed
    CrcValidationFailure(u16, u16), // received and expected value
}

/// Slave address outside the valid range of 0 to 247
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InvalidAddress {
    /// the rejected raw address
    pub value: u8,
}

/// Errors that can only occur due to a bug in this library
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InternalError {
    /// Attempted to write beyond the response buffer
    InsufficientWriteSpace,
    /// Attempted to read beyond the received frame
    InsufficientBytesForRead,
    /// A buffer seek operation exceeded the bounds of the underlying buffer
    BadSeekOperation,
}

impl std::error::Error for PollError {}
impl std::error::Error for FrameParseError {}
impl std::error::Error for InvalidAddress {}
impl std::error::Error for InternalError {}

impl std::fmt::Display for PollError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            PollError::BadFrame(err) => write!(f, "dropped a malformed frame: {err}"),
            PollError::ExceptionSent(code) => {
                write!(f, "replied with a protocol exception: {code}")
            }
            PollError::NotForUs => f.write_str("frame was addressed to another slave"),
            PollError::RxTimeout => f.write_str("master stopped sending mid-frame"),
            PollError::Io(err) => write!(f, "transport error: {err}"),
            PollError::Internal(err) => write!(f, "internal error: {err}"),
        }
    }
}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            FrameParseError::UnknownFunctionCode(value) => {
                write!(f, "received unsupported function code: {value:#04X}")
            }
            FrameParseError::FrameLengthTooBig(size, max) => write!(
                f,
                "received frame with length ({size}) that exceeds max allowed size ({max})"
            ),
            FrameParseError::CrcValidationFailure(received, expected) => write!(
                f,
                "CRC validation failure: received {received:#06X}, expected {expected:#06X}"
            ),
        }
    }
}

impl std::fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        write!(
            f,
            "slave address {} is outside the valid range of 0 to 247",
            self.value
        )
    }
}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            InternalError::InsufficientWriteSpace => {
                f.write_str("attempted to write beyond the response buffer")
            }
            InternalError::InsufficientBytesForRead => {
                f.write_str("attempted to read beyond the received frame")
            }
            InternalError::BadSeekOperation => {
                f.write_str("buffer seek operation exceeded the bounds of the underlying buffer")
            }
        }
    }
}

impl From<FrameParseError> for PollError {
    fn from(err: FrameParseError) -> Self {
        PollError::BadFrame(err)
    }
}

impl From<InternalError> for PollError {
    fn from(err: InternalError) -> Self {
        PollError::Internal(err)
    }
}

impl From<std::io::Error> for PollError {
    fn from(err: std::io::Error) -> Self {
        PollError::Io(err)
    }
}

impl From<scursor::ReadError> for PollError {
    fn from(_: scursor::ReadError) -> Self {
        PollError::Internal(InternalError::InsufficientBytesForRead)
    }
}

impl From<scursor::WriteError> for PollError {
    fn from(_: scursor::WriteError) -> Self {
        PollError::Internal(InternalError::InsufficientWriteSpace)
    }
}
