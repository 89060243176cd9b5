mod cli;
mod config;
mod core;
mod interfaces;
mod logging;

use console::style;

#[tokio::main]
async fn main() {
    if let Err(err) = cli::run_main().await {
        eprintln!("{} {err:#}", style("error:").red().bold());
        std::process::exit(1);
    }
}
