use anyhow::Context;
use clap::Parser;
use peak_alloc::PeakAlloc;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};
use tritrypdb::options::{ConvertOptions, GeneColumns, GoColumns, OutputNaming};
use tritrypdb::tables::convert_gene_file;

#[global_allocator]
static PEAK_ALLOC: PeakAlloc = PeakAlloc;

/// Convert a TriTrypDB gene information file into gene, gene length and GO term tables.
///
/// Output files are named <species>_<version>_<table>.csv, with species and version
/// taken from the input file name (TriTrypDB-<version>_<species>Gene.txt).
#[derive(Parser, Debug)]
#[command(name = "tritrypdb", version, about, long_about = None)]
struct Args {
    /// TriTrypDB gene information file, plain text or gzipped
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Directory the tables are written to; created if missing
    #[arg(value_name = "OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Add the cds_length and pseudogene columns to the gene table
    #[arg(long)]
    extended: bool,

    /// Add the transcript length of each gene to the GO term table
    #[arg(long = "go-with-length")]
    go_with_length: bool,

    /// Keep the gene table in input order instead of sorting by chromosome and start
    #[arg(long = "no-sort")]
    no_sort: bool,

    /// Species token for the output file names, overriding the one in the input name
    #[arg(long, value_name = "NAME")]
    species: Option<String>,

    /// Release token for the output file names, overriding the one in the input name
    #[arg(long = "release", value_name = "VERSION")]
    release: Option<String>,

    /// Log progress for every gene
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else if self.quiet {
            LevelFilter::WARN
        } else {
            LevelFilter::INFO
        }
    }

    fn convert_options(&self) -> ConvertOptions {
        ConvertOptions::new(
            GeneColumns::from(self.extended),
            GoColumns::from(self.go_with_length),
            !self.no_sort,
        )
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let start = Instant::now();

    let naming = OutputNaming::resolve(
        &args.input,
        args.species.as_deref(),
        args.release.as_deref(),
    )
    .with_context(|| "Could not name the output files; pass --species and --release explicitly.")?;
    info!(
        "Species {}, release {}; writing to {:?}",
        naming.species, naming.version, args.output_dir
    );

    let summary = convert_gene_file(
        &args.input,
        &args.output_dir,
        &naming,
        &args.convert_options(),
    )?;

    info!(
        "Finished! {} genes and {} GO terms written to {:?} in {:?}",
        summary.n_genes,
        summary.n_go_terms,
        args.output_dir,
        start.elapsed()
    );
    debug!(
        "Peak memory usage was {:.3} GB",
        PEAK_ALLOC.peak_usage_as_gb()
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(args.log_level().into())
                .from_env_lossy(),
        )
        .init();

    if let Err(e) = run(&args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
