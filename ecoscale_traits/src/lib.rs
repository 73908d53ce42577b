//! Hardware seams shared by the device and host sides.
//!
//! Everything in here speaks in primitive types (raw counts, bytes, text lines) so
//! that `ecoscale_hardware` can implement the traits without depending on the core.
pub mod clock;
pub mod link;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use link::{LineIo, LinkHalves, PortInfo, PortOpener};

/// Boxed error used at every trait boundary in this crate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Load-cell transducer returning signed raw ADC counts.
pub trait Scale {
    fn read(&mut self, timeout: std::time::Duration) -> Result<i32, BoxError>;
}

impl<S: Scale + ?Sized> Scale for Box<S> {
    fn read(&mut self, timeout: std::time::Duration) -> Result<i32, BoxError> {
        (**self).read(timeout)
    }
}
