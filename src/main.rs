use clap::Parser;
use miette::Result;
use tracing_subscriber::EnvFilter;

use abcalc::cli::{dispatch, Cli};

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
    init_tracing(cli.global.verbose)?;
    dispatch(cli)
}

/// `ABCALC_LOG` wins over `-v`; diagnostics go to stderr
fn init_tracing(verbose: u8) -> Result<()> {
    let default = match verbose {
        0 => "abcalc=warn",
        1 => "abcalc=debug",
        _ => "abcalc=trace",
    };
    let filter = EnvFilter::try_from_env("ABCALC_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| miette::miette!("failed to install the log subscriber: {}", e))
}
