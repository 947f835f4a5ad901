/// HexLogic CLI
///
/// Drives the 8051 simulator service from a terminal: run or step a
/// program with breakpoints, or debug it interactively.
use hexlogic_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
