use arar::cli::{Cli, Commands};
use clap::Parser;
use miette::Result;
use tracing_subscriber::EnvFilter;

/// Log to stderr; RUST_LOG narrows or widens the default `arar=debug`
fn init_tracing(verbose: bool) {
    if verbose {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arar=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

fn main() -> Result<()> {
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match cli.command {
        Commands::Reduce(args) => arar::cli::commands::reduce::run(args, &cli.global),
        Commands::Steps(args) => arar::cli::commands::steps::run(args, &cli.global),
        Commands::Config(args) => arar::cli::commands::config::run(args, &cli.global),
    }
}
