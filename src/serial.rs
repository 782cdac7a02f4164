//! Transport and driver-enable implementations backed by a physical serial port

use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use crate::phys::{DriverEnable, Transport};

/// Serial port settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate in symbols-per-second
    pub baud_rate: u32,
    /// Number of bits per character
    pub data_bits: DataBits,
    /// Types of signalling for controlling data flow
    pub flow_control: FlowControl,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// Parity checking mode
    pub parity: Parity,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

/// Number of bits per character
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataBits {
    /// 5 bits per character
    Five,
    /// 6 bits per character
    Six,
    /// 7 bits per character
    Seven,
    /// 8 bits per character
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(value: DataBits) -> Self {
        match value {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Types of signalling for controlling data flow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowControl {
    /// No flow control
    None,
    /// Flow control using XON/XOFF bytes
    Software,
    /// Flow control using RTS/CTS signals
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(value: FlowControl) -> Self {
        match value {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Number of stop bits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit
    One,
    /// Two stop bits
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Parity checking mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit
    None,
    /// Parity bit sets odd number of 1 bits
    Odd,
    /// Parity bit sets even number of 1 bits
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// A [`Transport`] over an open serial port
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port with the given settings
    ///
    /// The port timeout only bounds individual byte reads; frame-level
    /// timing is handled by the slave's poll cycle.
    pub fn open(path: &str, settings: SerialSettings) -> Result<Self, serialport::Error> {
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(settings.data_bits.into())
            .flow_control(settings.flow_control.into())
            .stop_bits(settings.stop_bits.into())
            .parity(settings.parity.into())
            .timeout(Duration::from_millis(50))
            .open()?;
        Ok(Self { port })
    }

    /// A driver-enable control that keys the port's RTS line
    ///
    /// Usable with half-duplex RS-485 adapters that route RTS to the
    /// transceiver's direction pin.
    pub fn rts_driver_enable(&self) -> Result<RtsDriverEnable, serialport::Error> {
        Ok(RtsDriverEnable {
            port: self.port.try_clone()?,
        })
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> std::io::Result<bool> {
        let pending = self.port.bytes_to_read().map_err(std::io::Error::from)?;
        Ok(pending > 0)
    }

    fn read_byte(&mut self) -> std::io::Result<u8> {
        let mut byte = [0; 1];
        std::io::Read::read_exact(&mut self.port, &mut byte)?;
        Ok(byte[0])
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        std::io::Write::write_all(&mut self.port, data)?;
        std::io::Write::flush(&mut self.port)
    }

    fn discard_input(&mut self) -> std::io::Result<()> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }
}

/// Keys the RTS line of a serial port as a driver-enable control
pub struct RtsDriverEnable {
    port: Box<dyn SerialPort>,
}

impl DriverEnable for RtsDriverEnable {
    fn set_active(&mut self, active: bool) -> std::io::Result<()> {
        self.port
            .write_request_to_send(active)
            .map_err(std::io::Error::from)
    }
}
