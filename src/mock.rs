//! In-memory transport for exercising the slave without a serial line

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::phys::{DriverEnable, Transport};

struct Inner {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    enable_events: Vec<bool>,
    read_failure: Option<std::io::ErrorKind>,
}

/// Create a connected transport/handle pair
///
/// The handle scripts the master side: it queues request bytes and inspects
/// everything the slave transmitted.
pub(crate) fn mock() -> (MockTransport, MockHandle) {
    let inner = Rc::new(RefCell::new(Inner {
        rx: VecDeque::new(),
        tx: Vec::new(),
        enable_events: Vec::new(),
        read_failure: None,
    }));
    (
        MockTransport {
            inner: inner.clone(),
        },
        MockHandle { inner },
    )
}

pub(crate) struct MockTransport {
    inner: Rc<RefCell<Inner>>,
}

pub(crate) struct MockHandle {
    inner: Rc<RefCell<Inner>>,
}

impl MockHandle {
    /// Append bytes to the receive queue, as if the master had sent them
    pub(crate) fn queue(&self, data: &[u8]) {
        self.inner.borrow_mut().rx.extend(data.iter().copied());
    }

    /// Everything the slave has transmitted so far
    pub(crate) fn sent(&self) -> Vec<u8> {
        self.inner.borrow().tx.clone()
    }

    /// Forget past transmissions so the next response can be inspected alone
    pub(crate) fn clear_sent(&self) {
        self.inner.borrow_mut().tx.clear();
    }

    /// Make every subsequent read fail with the given error kind
    pub(crate) fn fail_reads(&self, kind: std::io::ErrorKind) {
        self.inner.borrow_mut().read_failure = Some(kind);
    }

    /// A driver-enable control that records its transitions on this handle
    pub(crate) fn driver_enable(&self) -> MockDriverEnable {
        MockDriverEnable {
            inner: self.inner.clone(),
        }
    }

    /// Every driver-enable transition, in order
    pub(crate) fn driver_enable_events(&self) -> Vec<bool> {
        self.inner.borrow().enable_events.clone()
    }
}

impl Transport for MockTransport {
    fn bytes_available(&mut self) -> std::io::Result<bool> {
        Ok(!self.inner.borrow().rx.is_empty())
    }

    fn read_byte(&mut self) -> std::io::Result<u8> {
        let mut inner = self.inner.borrow_mut();
        if let Some(kind) = inner.read_failure {
            return Err(kind.into());
        }
        inner
            .rx
            .pop_front()
            .ok_or_else(|| std::io::ErrorKind::UnexpectedEof.into())
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.inner.borrow_mut().tx.extend_from_slice(data);
        Ok(())
    }

    fn discard_input(&mut self) -> std::io::Result<()> {
        self.inner.borrow_mut().rx.clear();
        Ok(())
    }
}

pub(crate) struct MockDriverEnable {
    inner: Rc<RefCell<Inner>>,
}

impl DriverEnable for MockDriverEnable {
    fn set_active(&mut self, active: bool) -> std::io::Result<()> {
        self.inner.borrow_mut().enable_events.push(active);
        Ok(())
    }
}
