use queue_transport_cli::{run_cli, CliError};
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);
        eprintln!("Error: {}", e);

        // Exit with appropriate code based on error type
        let exit_code = match e {
            CliError::Configuration(_) => 1,
            CliError::Transport(_) => 2,
            CliError::InvalidArgument { .. } => 3,
            CliError::Io(_) => 4,
        };

        std::process::exit(exit_code);
    }
}
