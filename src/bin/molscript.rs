/// MolScript CLI
///
/// Runs or syntax-checks compiled scripts against the in-memory host.
/// Useful for debugging scripts and compiler output without a viewer.

use molscript_core::cli;

fn main() {
    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
