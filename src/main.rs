use anyhow::{Context, Result};
use clap::Parser;
use file_events::{
    BackendKind, ChangeKind, FailureKind, Listener, Settings, WatchError, WatchServer, logging,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "file-events")]
#[command(version = file_events::version())]
#[command(about = "Print classified filesystem events for the given paths")]
struct Cli {
    /// Absolute paths to watch (relative ones are resolved against the cwd)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Settings file (defaults to .file-events/settings.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the polling backend with this interval in milliseconds
    #[arg(long)]
    poll: Option<u64>,

    /// Watch whole subtrees
    #[arg(short, long)]
    recursive: bool,

    /// Stop after this many seconds instead of waiting for stdin to close
    #[arg(long)]
    duration: Option<u64>,
}

/// Prints one line per event to stdout.
struct PrintListener;

impl Listener for PrintListener {
    fn on_change(&self, kind: ChangeKind, path: &Path) {
        println!("{kind:<12} {}", path.display());
    }

    fn on_unknown_event(&self, path: &Path) {
        println!("{:<12} {}", "unknown", path.display());
    }

    fn on_overflow(&self, path: Option<&Path>) {
        match path {
            Some(path) => println!("{:<12} {}", "overflow", path.display()),
            None => println!("{:<12} <all>", "overflow"),
        }
    }

    fn on_failure(&self, kind: FailureKind, message: &str) {
        eprintln!("watch failed ({kind}): {message}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("failed to load settings")?;

    logging::init_with_config(&settings.logging);

    if let Some(interval) = cli.poll {
        settings.watch.backend = BackendKind::Poll;
        settings.watch.poll_interval_ms = interval;
    }
    if cli.recursive {
        settings.watch.recursive = true;
    }

    let cwd = std::env::current_dir().context("cannot read current directory")?;
    let paths: Vec<PathBuf> = cli
        .paths
        .into_iter()
        .map(|p| if p.is_absolute() { p } else { cwd.join(p) })
        .collect();

    let server = WatchServer::builder(Arc::new(PrintListener))
        .with_config(&settings.watch)
        .start()?;

    match server.register_paths(paths) {
        Ok(()) => {}
        Err(WatchError::Registration { failures }) => {
            for failure in &failures {
                eprintln!("cannot watch {failure}");
            }
        }
        Err(e) => return Err(e.into()),
    }

    if server.watched_paths().is_empty() {
        anyhow::bail!("nothing to watch");
    }

    match cli.duration {
        Some(secs) => {
            // Returns early if the server fails on its own
            server.await_termination(Duration::from_secs(secs));
        }
        None => {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if line.is_err() {
                    break;
                }
            }
        }
    }

    let timeout = Duration::from_millis(settings.watch.shutdown_timeout_ms);
    server
        .close(timeout)
        .context("watch server did not stop cleanly")?;
    Ok(())
}
