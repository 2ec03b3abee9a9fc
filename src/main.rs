mod app;

use std::io::IsTerminal;

use clap::Parser;
use crossterm::style::Stylize;
use tracing_subscriber::EnvFilter;

use app::cli::Cli;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // The fmt subscriber also forwards `log` records emitted by the library.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = app::run(cli) {
        eprintln!("{} {err:#}", "\nError:".red());
        std::process::exit(1);
    }
}
