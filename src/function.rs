use std::fmt::{Display, Formatter};

mod constants {
    pub(crate) const READ_HOLDING_REGISTERS: u8 = 3;
    pub(crate) const WRITE_MULTIPLE_REGISTERS: u8 = 16;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FunctionCode {
    ReadHoldingRegisters = constants::READ_HOLDING_REGISTERS,
    WriteMultipleRegisters = constants::WRITE_MULTIPLE_REGISTERS,
}

impl Display for FunctionCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            FunctionCode::ReadHoldingRegisters => {
                write!(f, "READ HOLDING REGISTERS ({:#04X})", self.get_value())
            }
            FunctionCode::WriteMultipleRegisters => {
                write!(f, "WRITE MULTIPLE REGISTERS ({:#04X})", self.get_value())
            }
        }
    }
}

impl FunctionCode {
    pub(crate) const fn get_value(self) -> u8 {
        self as u8
    }

    pub(crate) const fn as_error(self) -> u8 {
        self.get_value() | 0x80
    }

    pub(crate) fn get(value: u8) -> Option<Self> {
        match value {
            constants::READ_HOLDING_REGISTERS => Some(FunctionCode::ReadHoldingRegisters),
            constants::WRITE_MULTIPLE_REGISTERS => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// Largest register count the function allows in a single request
    pub(crate) fn max_register_count(self) -> u16 {
        match self {
            FunctionCode::ReadHoldingRegisters => crate::constants::limits::MAX_READ_REGISTERS_COUNT,
            FunctionCode::WriteMultipleRegisters => {
                crate::constants::limits::MAX_WRITE_REGISTERS_COUNT
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_raw_values_to_supported_codes() {
        assert_eq!(FunctionCode::get(0x03), Some(FunctionCode::ReadHoldingRegisters));
        assert_eq!(FunctionCode::get(0x10), Some(FunctionCode::WriteMultipleRegisters));
        assert_eq!(FunctionCode::get(0x04), None);
        assert_eq!(FunctionCode::get(0x83), None);
    }

    #[test]
    fn error_code_sets_high_bit() {
        assert_eq!(FunctionCode::ReadHoldingRegisters.as_error(), 0x83);
        assert_eq!(FunctionCode::WriteMultipleRegisters.as_error(), 0x90);
    }
}
