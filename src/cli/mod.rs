mod serve;
mod validate;

use anyhow::Result;
use console::style;

pub(crate) async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    match command {
        "serve" => serve::run(&args).await,
        "validate" => validate::run(&args),
        "version" | "--version" => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!(
                "{} Unknown command '{}'.\n",
                style("error:").red().bold(),
                other
            );
            print_help();
            std::process::exit(2);
        }
    }
}

fn print_help() {
    println!(
        "\n {} - cached query API over Control-M definition exports\n",
        style("ctmview").green().bold()
    );
    println!(" {}", style("Commands").bold());
    println!(
        "   {}     Start the API server           [--host H] [--port P] [--source FILE] [-v]",
        style("serve").cyan()
    );
    println!(
        "   {}  Parse a definitions file and print a summary",
        style("validate").cyan()
    );
    println!("   {}     Print the version", style("version").cyan());
    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("ctmview").green()
    );
    println!(
        " Environment: CTMVIEW_HOST, CTMVIEW_PORT, CTMVIEW_SOURCE, CTMVIEW_ENVIRONMENT\n"
    );
}
