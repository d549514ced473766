//! Camera controls.
//!
//! Every sensor setting (exposure, gains, blanking, flips, test patterns)
//! is a [`ControlRegister`]: a bounded integer with a default and a
//! percent mapping onto its range. Drivers keep one register per
//! [`Control`] in a [`ControlSet`].

mod register;
mod set;

pub use register::{ControlInfo, ControlRegister};
pub use set::{Control, ControlSet};
