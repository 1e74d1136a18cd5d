//! Console plumbing for the SPM core.
//!
//! The embedder attaches whatever byte sink the platform provides (a UART,
//! a semihosting channel) to the `stdout()` singleton; the print macros and
//! the logger write through it. Nothing is emitted until a device is
//! attached.

extern crate alloc;

use alloc::boxed::Box;
use lazy_static::lazy_static;
use spin::mutex::Mutex;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    InitializationFailed,
}

pub trait Device {
    fn initialize(&mut self) -> Result<()>;
    fn initialized(&self) -> bool;
}

pub trait Write {
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
}

pub trait ConsoleWriter: Device + Write + Send {}

pub struct Stdout {
    device: Mutex<Option<Box<dyn ConsoleWriter>>>,
}

impl Stdout {
    const fn new() -> Self {
        Self {
            device: Mutex::new(None),
        }
    }

    pub fn attach(&self, mut device: Box<dyn ConsoleWriter>) -> Result<()> {
        device.initialize()?;
        if !device.initialized() {
            return Err(Error::InitializationFailed);
        }
        *self.device.lock() = Some(device);
        Ok(())
    }

    pub fn write_all(&self, buf: &[u8]) -> Result<()> {
        if let Some(device) = self.device.lock().as_mut() {
            device.write_all(buf)?;
        }
        Ok(())
    }
}

lazy_static! {
    static ref STDOUT: Stdout = Stdout::new();
}

pub fn stdout() -> &'static Stdout {
    &STDOUT
}

#[cfg(test)]
pub mod test {
    use super::*;
    use alloc::string::String;
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    pub struct MockConsole {
        buffer: Arc<Mutex<Vec<u8>>>,
        ready: bool,
    }

    impl MockConsole {
        pub fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buffer = Arc::new(Mutex::new(Vec::new()));
            (
                MockConsole {
                    buffer: buffer.clone(),
                    ready: false,
                },
                buffer,
            )
        }
    }

    impl Device for MockConsole {
        fn initialize(&mut self) -> Result<()> {
            self.ready = true;
            Ok(())
        }

        fn initialized(&self) -> bool {
            self.ready
        }
    }

    impl Write for MockConsole {
        fn write_all(&mut self, buf: &[u8]) -> Result<()> {
            self.buffer.lock().extend_from_slice(buf);
            Ok(())
        }
    }

    impl ConsoleWriter for MockConsole {}

    pub fn captured(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buffer.lock().clone()).unwrap()
    }

    // All assertions against the shared stdout live in this one test so
    // concurrently running tests never swap the device mid-check.
    #[test]
    fn console_write_paths() {
        let (mock, buffer) = MockConsole::new();
        stdout().attach(Box::new(mock)).ok().unwrap();

        crate::println!();
        crate::println!("hello");
        crate::println!("number {}", 1234);
        crate::eprintln!("number {}", 4321);

        let out = captured(&buffer);
        assert!(out.starts_with('\n'));
        assert!(out.contains("hello\n"));
        assert!(out.contains("number 1234\n"));
        assert!(out.contains("\x1b[0;31mnumber 4321\n\x1b[0m"));
    }

    #[test]
    fn write_without_device_is_discarded() {
        // No attach in this path: the singleton may or may not hold a
        // device depending on test order, but write_all must not fail.
        assert_eq!(stdout().write_all(b"dropped"), Ok(()));
    }
}
