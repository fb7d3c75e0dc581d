/// Cadence CLI
///
/// Evaluates guest scripts from files or the command line and prints the
/// result as JSON.

use cadence_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
