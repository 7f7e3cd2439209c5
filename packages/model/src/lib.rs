mod goff;
pub use goff::*;
mod namespace;
pub use namespace::*;
mod ty;
pub use ty::*;
mod object;
pub use object::*;
mod template;
pub use template::*;
mod merge;
pub use merge::*;
