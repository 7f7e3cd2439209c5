pub mod dwarf;

mod scopes;
pub use scopes::*;
mod paths;
pub use paths::*;
mod printer;
pub use printer::*;
mod normalize;
pub use normalize::*;
mod visitor;
pub use visitor::*;
mod assemble;
pub use assemble::*;

use cu::pre::*;

/// Reconstruct per-file declaration maps from the DWARF in `ctx`.
///
/// Only declarations whose `decl_file` lies under `base_dir` are emitted;
/// compile units compiled outside `base_dir` are skipped wholesale.
pub fn reconstruct(
    ctx: &dwarf::DwarfContext,
    base_dir: &str,
) -> cu::Result<Vec<SourceFile>> {
    let visitor = Visitor::new(ctx, base_dir)?;
    visitor.run()
}
