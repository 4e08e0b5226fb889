use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use molecular_crystal_sites::{
    extract_structure, parser, to_cif, write_cif, ExtractionConfig, MoleculeFinder, WriteMode,
};

mod logging;

#[derive(Parser)]
#[command(author, version, about = "Molecular crystal site extraction and CIF export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all log output.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extracts the molecular site of one or more CIF files and writes it as CIF.
    Extract {
        /// CIF file or glob pattern (quote it, e.g. "structures/*.cif").
        #[arg(short, long)]
        structure: String,

        /// Reference molecule in XYZ format.
        #[arg(short, long)]
        reference: PathBuf,

        /// Bond tolerance on covalent-radius sums.
        #[arg(long, default_value_t = 0.2)]
        tol: f64,

        /// Neighbor search radius in Å.
        #[arg(long, default_value_t = 3.0)]
        neighbor_cutoff: f64,

        /// Special-position merge radius in Å.
        #[arg(long, default_value_t = 2.0)]
        merge_tolerance: f64,

        /// Keep the fragment in crystal atom order.
        #[arg(long)]
        keep_order: bool,

        /// Build the site from the reference molecule and its orientation.
        #[arg(long)]
        use_reference: bool,

        /// Data block name (defaults to the file stem).
        #[arg(long)]
        header: Option<String>,

        /// Write a P1 block with the first N symmetry copies instead.
        #[arg(long)]
        sym_num: Option<usize>,

        /// Output CIF (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Append to the output file instead of truncating it.
        #[arg(long)]
        append: bool,
    },
    /// Lists every molecule found in a CIF file.
    Molecules {
        #[arg(short, long)]
        structure: PathBuf,

        #[arg(long, default_value_t = 0.2)]
        tol: f64,
    },
}

/// Expands a glob pattern; a pattern without matches is used as a literal path.
fn expand_inputs(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let entries =
        glob::glob(pattern).with_context(|| format!("Invalid glob pattern '{}'", pattern))?;
    for entry in entries {
        paths.push(entry.context("Unreadable glob match")?);
    }
    if paths.is_empty() {
        let literal = PathBuf::from(pattern);
        if !literal.exists() {
            bail!("No structure files match '{}'", pattern);
        }
        paths.push(literal);
    }
    paths.sort();
    Ok(paths)
}

fn default_header(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;
    let start_time = Instant::now();

    match cli.command {
        Commands::Extract {
            structure,
            reference,
            tol,
            neighbor_cutoff,
            merge_tolerance,
            keep_order,
            use_reference,
            header,
            sym_num,
            output,
            append,
        } => {
            let config = ExtractionConfig {
                bond_tolerance: tol,
                neighbor_cutoff,
                merge_tolerance,
                keep_order,
                use_reference,
            };
            let inputs = expand_inputs(&structure)?;
            info!(files = inputs.len(), "extracting molecular sites");

            let mut failures = 0;
            for (i, input) in inputs.iter().enumerate() {
                let extracted = extract_structure(input.as_path(), reference.as_path(), &config);
                let (symmetrized, report) = match extracted {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(?input, "skipped: {}", e);
                        failures += 1;
                        continue;
                    }
                };
                info!(?input, "\n{}", report);

                let name = header.clone().unwrap_or_else(|| default_header(input));
                match &output {
                    Some(path) => {
                        // Later files of a batch always append to the first one.
                        let mode = if append || i > 0 {
                            WriteMode::Append
                        } else {
                            WriteMode::Create
                        };
                        to_cif(&symmetrized, path, &name, mode, sym_num)?;
                    }
                    None => print!("{}", write_cif(&symmetrized, &name, sym_num)?),
                }
            }

            if failures == inputs.len() {
                bail!("No structure could be processed.");
            }
            info!(failures, "done in {:.2?}", start_time.elapsed());
        }
        Commands::Molecules { structure, tol } => {
            let crystal = parser::from_cif(&structure)?;
            info!(atoms = crystal.len(), ops = crystal.symmetry_ops.len(), "structure loaded");

            let molecules = MoleculeFinder::new(tol).find_molecules(&crystal)?;
            println!("{} molecules in {:?}", molecules.len(), structure);
            for (i, molecule) in molecules.iter().enumerate() {
                let mut composition = molecule.species();
                composition.sort_unstable();
                composition.dedup();
                let formula: Vec<String> = composition
                    .iter()
                    .map(|el| {
                        let n = molecule.atoms.iter().filter(|a| a.element == *el).count();
                        if n == 1 {
                            el.to_string()
                        } else {
                            format!("{}{}", el, n)
                        }
                    })
                    .collect();
                println!("{:>4}  {:<16} {} atoms", i + 1, formula.join(""), molecule.len());
            }
        }
    }

    Ok(())
}
