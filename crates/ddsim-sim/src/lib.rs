//! # ddsim-sim
//!
//! HelloWorld publish/subscribe demo run over the simulated transport.
//!
//! - [`hello`] — the sample type and its RTPS-framed wire encoding
//! - [`simulator`] — publisher + subscriber run with a capture monitor and
//!   an injection check, summarised in a [`RunReport`]

pub mod hello;
pub mod simulator;

pub use hello::HelloWorld;
pub use simulator::{HelloWorldSimulator, RunReport, SimulatorConfig};
