use std::fmt::Write;

use crate::decode::PhysDecodeLevel;

pub(crate) mod timing {
    use std::time::Duration;

    /// How many times the receiver polls for a pending byte before giving up.
    ///
    /// Deliberately count-based rather than wall-clock based so that clock
    /// rollover never enters the picture.
    pub(crate) const MAX_IDLE_POLLS: u8 = 10;
    /// Sleep between two idle polls, ~10 ms per byte in total
    pub(crate) const IDLE_POLL_DELAY: Duration = Duration::from_millis(1);
    /// How many drain rounds a flush performs before giving up on a saturated line
    pub(crate) const MAX_FLUSH_ROUNDS: u8 = 10;
    /// Sleep between two drain rounds, ~30 ms per flush in total
    pub(crate) const FLUSH_ROUND_DELAY: Duration = Duration::from_millis(3);
}

/// Byte-stream transport the slave is polled against
///
/// Implementations are expected to buffer received bytes so that
/// `bytes_available` reflects data the slave has not consumed yet.
pub trait Transport {
    /// Returns true if at least one received byte is pending
    fn bytes_available(&mut self) -> std::io::Result<bool>;

    /// Read a single pending byte
    ///
    /// Only called after `bytes_available` returned true.
    fn read_byte(&mut self) -> std::io::Result<u8>;

    /// Write the entire buffer to the line
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Throw away all pending received bytes
    fn discard_input(&mut self) -> std::io::Result<()>;
}

/// Output-enable control for half-duplex transceivers
///
/// The slave asserts the line immediately before transmitting a response and
/// deasserts it immediately after, so that the bus is never driven while
/// listening.
pub trait DriverEnable {
    /// Assert or deassert the driver-enable line
    fn set_active(&mut self, active: bool) -> std::io::Result<()>;
}

/// No-op driver-enable for full-duplex links or transceivers with automatic direction control
#[derive(Debug, Copy, Clone, Default)]
pub struct NoDriverEnable;

impl DriverEnable for NoDriverEnable {
    fn set_active(&mut self, _active: bool) -> std::io::Result<()> {
        Ok(())
    }
}

/// Physical layer of the slave: a transport plus its driver-enable control
pub(crate) struct PhysLayer<T, D>
where
    T: Transport,
    D: DriverEnable,
{
    transport: T,
    driver_enable: D,
}

impl<T, D> PhysLayer<T, D>
where
    T: Transport,
    D: DriverEnable,
{
    pub(crate) fn new(transport: T, driver_enable: D) -> Self {
        Self {
            transport,
            driver_enable,
        }
    }

    pub(crate) fn bytes_available(&mut self) -> std::io::Result<bool> {
        self.transport.bytes_available()
    }

    /// Read one byte, waiting a bounded number of idle polls for it to arrive
    ///
    /// Returns `Ok(None)` if the byte never arrived.
    pub(crate) fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut polls = 0;
        while !self.transport.bytes_available()? {
            polls += 1;
            if polls == timing::MAX_IDLE_POLLS {
                return Ok(None);
            }
            std::thread::sleep(timing::IDLE_POLL_DELAY);
        }
        self.transport.read_byte().map(Some)
    }

    /// Transmit a complete response as one indivisible operation
    ///
    /// The driver-enable line is deasserted even if the write fails.
    pub(crate) fn write(&mut self, data: &[u8], level: PhysDecodeLevel) -> std::io::Result<()> {
        if level.enabled() {
            tracing::info!("PHYS TX - {}", PhysDisplay::new(level, data));
        }

        self.driver_enable.set_active(true)?;
        let result = self.transport.write_all(data);
        let released = self.driver_enable.set_active(false);
        result?;
        released
    }

    /// Drain the line for a short bounded window to resynchronize the byte stream
    pub(crate) fn flush(&mut self, level: PhysDecodeLevel) -> std::io::Result<()> {
        if level.enabled() {
            tracing::info!("PHYS - flushing pending input");
        }

        let mut rounds = 0;
        while self.transport.bytes_available()? {
            self.transport.discard_input()?;
            rounds += 1;
            if rounds == timing::MAX_FLUSH_ROUNDS {
                break;
            }
            // wait a moment for trailing garbage without getting stuck on a saturated line
            std::thread::sleep(timing::FLUSH_ROUND_DELAY);
        }
        Ok(())
    }
}

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        PhysDisplay { level, data }
    }
}

impl std::fmt::Display for PhysDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

const BYTES_PER_DECODE_LINE: usize = 18;

pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for chunk in bytes.chunks(BYTES_PER_DECODE_LINE) {
        writeln!(f)?;
        let mut first = true;
        for byte in chunk {
            if !first {
                f.write_char(' ')?;
            }
            first = false;
            write!(f, "{byte:02X?}")?;
        }
    }
    Ok(())
}
