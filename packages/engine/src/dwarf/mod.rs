#![allow(non_upper_case_globals)]

mod unit;
pub use unit::*;
mod die;
pub use die::*;
mod util;
pub use util::*;
