use berth_cli::{logging, AppContext, Cli};
use clap::Parser;
use colored::*;
use std::process;

#[tokio::main]
async fn main() {
    berth_config::load_dotenv();
    logging::init_tracing();
    let cli = Cli::parse();

    let context = match AppContext::from_env().await {
        Ok(context) => context,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };
    if !context.runtime_available {
        eprintln!(
            "{}",
            "Warning: Docker is not reachable; listings will be empty and changes will fail"
                .yellow()
        );
    }

    if let Err(e) = cli.run(&context).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
