pub mod bus;
pub mod mux;

pub use bus::LinuxBus;
pub use mux::{Tca9548a, MUX_ADDRESS};
