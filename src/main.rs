mod cli;

use clap::Parser;
use obc_sim::{clock, Session, SessionArtifacts};
use tracing::info;

use cli::args::Cli;
use cli::logging;

// The main entry point for the OBC simulator console.
fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    if args.list_ports {
        return cli::list_ports();
    }

    let config = args.resolve_config()?;
    let artifacts =
        SessionArtifacts::create(&config.data_directory, &config.instrument, clock::now())?;

    // The TUI owns the terminal, so its diagnostics go to the session folder.
    if args.headless {
        logging::init_stderr(args.log_level);
    } else {
        logging::init_file(args.log_level, &artifacts.dir().join("obc_sim.log"))?;
    }
    info!(dir = %artifacts.dir().display(), "starting session");

    let session = Session::open(config, artifacts)?;
    if args.headless {
        cli::console::run(session)
    } else {
        cli::tui::run(session)
    }
}
