use std::path::PathBuf;

use cu::pre::*;

use engine::dwarf::DwarfContext;

mod render;

/// Reconstruct C++ declaration files from the DWARF debug info in an ELF
#[derive(clap::Parser, AsRef)]
struct CmdMain {
    /// ELF file with DWARF debug info
    pub elf: PathBuf,

    /// Base directory used during compilation
    #[clap(short, long)]
    pub base_dir: String,

    /// Output directory for generated files (defaults to `out` next to
    /// the input file)
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    #[clap(flatten)]
    #[as_ref]
    pub common: cu::cli::Flags,
}

fn main() -> cu::Result<()> {
    let args = <CmdMain as clap::Parser>::parse();
    run(args)
}

fn run(args: CmdMain) -> cu::Result<()> {
    let output = match args.output {
        Some(output) => output,
        None => args.elf.parent().unwrap_or(std::path::Path::new(".")).join("out"),
    };

    cu::info!("creating DWARF context for {}", args.elf.display());
    let bytes = cu::fs::read(&args.elf)?;
    let ctx = DwarfContext::load(&bytes)?;

    let files = engine::reconstruct(&ctx, &args.base_dir)?;
    let normalizer = engine::Normalizer::new()?;

    let bar = cu::progress("generating files")
        .keep(false)
        .total(files.len())
        .spawn();
    for file in &files {
        let text = render::render_file(file);
        let text = normalizer.apply(&text);
        let out_path = output.join(&file.path);
        if let Some(parent) = out_path.parent() {
            cu::fs::make_dir(parent)?;
        }
        cu::fs::write(&out_path, text)?;
        cu::progress!(bar += 1, "{}", file.path);
    }
    bar.done();

    cu::info!("done! files generated in {}", output.display());
    Ok(())
}
