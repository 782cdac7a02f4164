/// Raw values of the protocol exception codes this slave can raise
pub mod exceptions {
    /// Function code received in the query is not supported
    pub const ILLEGAL_FUNCTION: u8 = 0x01;
    /// Data address received in the query is outside the register table
    pub const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    /// A value contained in the request is not allowable
    pub const ILLEGAL_DATA_VALUE: u8 = 0x03;
}

/// Limits defined by the Modbus specification
pub mod limits {
    /// Maximum count allowed in a read holding registers request
    pub const MAX_READ_REGISTERS_COUNT: u16 = 0x007D;
    /// Maximum count allowed in a write multiple registers request
    pub const MAX_WRITE_REGISTERS_COUNT: u16 = 0x007B;
}
