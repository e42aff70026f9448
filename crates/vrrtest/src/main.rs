mod cli;
mod run;
mod settings;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(command)) => run::show_config(&cli.run, command),
        None => run::run(cli.run),
    }
}
