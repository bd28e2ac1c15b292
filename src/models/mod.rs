pub mod billing;
pub mod common;

pub use billing::*;
pub use common::*;
