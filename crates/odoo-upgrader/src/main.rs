use clap::Parser;
use odoo_upgrader::{
    run_cli,
    telemetry::{get_subscriber, init_subscriber},
};
use odoo_upgrader_cli::Cli;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let (subscriber, guard) = get_subscriber(&cli.log_filter(), cli.log_file.as_deref())?;
    init_subscriber(subscriber)?;

    let result = run_cli(&cli);

    // process::exit skips destructors; flush the log file first.
    drop(guard);

    if let Err(e) = result {
        e.exit_with_tips();
    }

    Ok(())
}
