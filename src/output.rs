//! In‑memory `print` sink, for embedding the interpreter and for tests.

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::rc::Rc;

/// A `Write` that appends to a shared buffer. Clones share the buffer, so one
/// clone can be handed to the interpreter and another read afterwards.
#[derive(Debug, Clone, Default)]
pub struct CaptureOutput {
    into: Rc<RefCell<Vec<u8>>>,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.into.borrow()).into_owned()
    }
}

impl io::Write for CaptureOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.into.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Display for CaptureOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.contents())
    }
}
