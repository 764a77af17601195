// ============================================================================
// CollageFE binary entry point — headless document processing
// ============================================================================

use std::process::ExitCode;

use clap::Parser;

use collagefe::{cli, log_info, logger};

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();
    log_info!("CollageFE starting (CLI mode)");

    let args = cli::CliArgs::parse();
    cli::run(args)
}
