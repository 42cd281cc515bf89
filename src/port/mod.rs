//! Hardware seam for serial communication.
//!
//! The connection registry only ever talks to a [`SerialPortAdapter`] created
//! by a [`PortOpener`]. `SystemPortOpener` backs both with the `serialport`
//! crate; `MockPortOpener` simulates pluggable devices for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockDevice, MockPortOpener, MockSerialPort};
pub use sync_port::{SyncSerialPort, SystemPortOpener};
pub use traits::{PortAdapter, PortOpener, SerialPortAdapter};
