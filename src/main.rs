use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "reseat",
    version,
    about = "Remembers and restores window position, size and show state per watched process"
)]
struct Cli {
    /// Path of the state file (defaults to the per-user config directory).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Add a process name to the watch list (repeatable).
    #[arg(long, value_name = "PROCESS")]
    watch: Vec<String>,

    /// Remove a process name from the watch list (repeatable).
    #[arg(long, value_name = "PROCESS")]
    unwatch: Vec<String>,

    /// Override the process-table poll interval.
    #[arg(long, value_name = "MS")]
    watcher_poll_ms: Option<u64>,

    /// Override the window-sampling interval.
    #[arg(long, value_name = "MS")]
    recorder_poll_ms: Option<u64>,

    /// Print the configured rules and exit.
    #[arg(long)]
    list: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let options = reseat::Options {
        config: cli.config,
        watch: cli.watch,
        unwatch: cli.unwatch,
        watcher_poll_ms: cli.watcher_poll_ms,
        recorder_poll_ms: cli.recorder_poll_ms,
        list: cli.list,
    };

    match reseat::run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("reseat: {e:#}");
            ExitCode::FAILURE
        }
    }
}
