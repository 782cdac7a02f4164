use scursor::ReadCursor;

use crate::error::PollError;
use crate::exception::ExceptionCode;

/// Modbus unit identifier, just a type-safe wrapper around `u8`
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq)]
pub struct UnitId {
    /// underlying raw value
    pub value: u8,
}

impl UnitId {
    /// Create a new UnitId
    pub fn new(value: u8) -> Self {
        Self { value }
    }

    /// Broadcast address, processed by every slave but never answered
    pub fn broadcast() -> Self {
        Self { value: 0x00 }
    }

    /// Returns true if this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.value == 0x00
    }

    /// Returns true if the address is reserved in RTU mode
    ///
    /// Slaves may not be assigned a reserved address.
    pub fn is_rtu_reserved(&self) -> bool {
        self.value >= 248
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04X}", self.value)
    }
}

/// Start and count tuple carried by both supported requests
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AddressRange {
    /// Starting address of the range
    pub(crate) start: u16,
    /// Count of registers in the range
    pub(crate) count: u16,
}

impl AddressRange {
    /// Read the two big-endian fields that follow the function code
    pub(crate) fn parse(cursor: &mut ReadCursor) -> Result<Self, PollError> {
        Ok(Self {
            start: cursor.read_u16_be()?,
            count: cursor.read_u16_be()?,
        })
    }

    /// Convert to a table index range, failing if any part lies outside the table
    pub(crate) fn to_range_within(
        self,
        table_len: usize,
    ) -> Result<std::ops::Range<usize>, ExceptionCode> {
        let start = self.start as usize;
        let end = start + self.count as usize;
        if end > table_len {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok(start..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_is_zero() {
        assert!(UnitId::broadcast().is_broadcast());
        assert!(!UnitId::new(0x11).is_broadcast());
    }

    #[test]
    fn addresses_above_247_are_reserved() {
        assert!(!UnitId::new(247).is_rtu_reserved());
        assert!(UnitId::new(248).is_rtu_reserved());
        assert!(UnitId::new(255).is_rtu_reserved());
    }

    #[test]
    fn range_within_table_converts() {
        let range = AddressRange { start: 2, count: 3 };
        assert_eq!(range.to_range_within(10), Ok(2..5));
        assert_eq!(range.to_range_within(5), Ok(2..5));
    }

    #[test]
    fn range_past_end_of_table_is_illegal_data_address() {
        let range = AddressRange { start: 8, count: 5 };
        assert_eq!(
            range.to_range_within(10),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn range_arithmetic_does_not_overflow() {
        let range = AddressRange {
            start: u16::MAX,
            count: u16::MAX,
        };
        assert_eq!(
            range.to_range_within(10),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }
}
