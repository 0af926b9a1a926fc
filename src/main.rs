use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tree_completion::completion::{Pairing, run_batch};
use tree_completion::config::CompletionConfig;
use tree_completion::io::{read_newick_trees, write_report};
use tree_completion::transfer::RescalePolicy;

/// Complete pairs of phylogenetic trees to a shared leaf set with k-NCL and
/// report the branch score distance between the completed trees.
#[derive(Parser, Debug)]
#[command(name = "kncl", version, about = "k nearest common leaf tree completion and BSD")]
struct Args {
    /// Input file: one Newick tree per line, or a NEXUS file (optionally .gz)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output path for the report (`-` for stdout, `.gz` to compress)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Number of nearest common leaves used per insertion (default: all common leaves)
    #[arg(short = 'k', long = "k")]
    k: Option<usize>,

    /// Which branches of a transferred subtree are rescaled
    #[arg(long = "rescale", value_enum, default_value_t = RescaleArg::Uniform)]
    rescale: RescaleArg,

    /// Also report BSD(-) and the trees pruned to their common leaves
    #[arg(long = "bsd-minus", default_value_t = false)]
    bsd_minus: bool,

    /// Compare every pair of trees instead of the first against the rest
    #[arg(long = "all-pairs", default_value_t = false)]
    all_pairs: bool,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,

    /// Debug logging
    #[arg(short = 'v', long = "verbose", default_value_t = false, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RescaleArg {
    Uniform,
    RootOnly,
}

impl From<RescaleArg> for RescalePolicy {
    fn from(arg: RescaleArg) -> Self {
        match arg {
            RescaleArg::Uniform => RescalePolicy::Uniform,
            RescaleArg::RootOnly => RescalePolicy::RootOnly,
        }
    }
}

fn init_logging(args: &Args) {
    let filter = if args.quiet {
        EnvFilter::new("warn")
    } else if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    let config = CompletionConfig {
        k: args.k,
        rescale: args.rescale.into(),
        bsd_minus: args.bsd_minus,
    };
    let pairing = if args.all_pairs { Pairing::AllPairs } else { Pairing::FirstVsRest };

    let t0 = Instant::now();
    let trees = match read_newick_trees(&args.input) {
        Ok(trees) => trees,
        Err(e) => {
            error!("Failed to read {:?}: {e}", args.input);
            std::process::exit(2);
        }
    };
    if trees.len() < 2 {
        error!("Need at least 2 trees in {:?}, found {}.", args.input, trees.len());
        std::process::exit(2);
    }
    let parsed = trees.iter().filter(|t| t.is_ok()).count();
    info!("Reading {} trees ({} parsed) {:.3}s", trees.len(), parsed, t0.elapsed().as_secs_f64());

    let t1 = Instant::now();
    let outcomes = run_batch(&trees, &config, pairing);
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        "Completing {} pairs ({} failed) {:.3}s",
        outcomes.len(),
        failed,
        t1.elapsed().as_secs_f64()
    );

    let t2 = Instant::now();
    if let Err(e) = write_report(&args.output, &outcomes) {
        error!("Failed to write output {:?}: {e}", args.output);
        std::process::exit(4);
    }
    let target = if args.output.as_os_str() == "-" { "stdout" } else { "output" };
    info!("Writing to {target} {:.3}s", t2.elapsed().as_secs_f64());
}
