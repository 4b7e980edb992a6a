use anyhow::{Context, Result};
use clap::Parser;
use linewatch::config::{self, Config, ConfigError};
use linewatch::reader::Backend;
use linewatch::signal::setup_shutdown_handlers;
use linewatch::{logging, CloseReason, LineStore, Notification, SessionId, SessionRegistry};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

const EVENT_POLL_DURATION_MS: u64 = 100;

#[derive(Parser, Debug)]
#[command(name = "linewatch")]
#[command(about = "Follow log files and directories, printing new lines as they arrive", long_about = None)]
struct Args {
    /// Files or directories to follow (defaults to `paths` from the config)
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Also pick up files in subdirectories of watched directories
    #[arg(short, long)]
    recursive: bool,

    /// Use this config file instead of discovering one
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the plain buffered line store instead of the indexed one
    #[arg(long)]
    fallback: bool,

    /// Number of trailing lines to print when a file is opened
    #[arg(short = 'n', long = "lines", default_value_t = 10)]
    lines: usize,

    /// Also rescan every N seconds, for filesystems without change notification
    #[arg(long, value_name = "SECS")]
    poll: Option<u64>,

    /// Verbose diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprint!("{}", e.format_cargo_style());
            std::process::exit(1);
        }
    };
    if args.fallback {
        config.backend = Backend::Fallback;
    }
    if args.recursive {
        config.recursive = true;
    }

    logging::init(if args.verbose { "debug" } else { config.log_level.as_str() });

    let paths = if args.paths.is_empty() {
        config.paths.clone()
    } else {
        args.paths.clone()
    };
    if paths.is_empty() {
        eprintln!("Usage: linewatch <PATH>...");
        eprintln!("       (or list `paths` in linewatch.yaml)");
        std::process::exit(1);
    }

    let shutdown = setup_shutdown_handlers().context("Failed to install signal handlers")?;
    let (mut registry, notifications) =
        SessionRegistry::new(config.registry_options()).context("Failed to start file watcher")?;

    let mut printer = Printer::new(args.lines);
    for path in &paths {
        if path.is_dir() {
            registry
                .open_directory(path, config.recursive)
                .with_context(|| format!("Failed to watch directory {}", path.display()))?;
        } else {
            registry
                .open_file(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
        }
        printer.drain(&registry, &notifications)?;
    }

    let poll_every = args.poll.map(Duration::from_secs);
    let mut last_poll = Instant::now();

    while !shutdown.is_set() {
        if registry.process_next(Duration::from_millis(EVENT_POLL_DURATION_MS)) {
            registry.process_pending();
        }
        if let Some(every) = poll_every {
            if last_poll.elapsed() >= every {
                registry.poll_changes();
                last_poll = Instant::now();
            }
        }
        printer.drain(&registry, &notifications)?;
    }

    tracing::debug!("shutting down");
    registry.shutdown();
    Ok(())
}

fn load_config(args: &Args) -> Result<Config, ConfigError> {
    if let Some(path) = &args.config {
        return config::load_single_file(path);
    }
    let (discovery, searched) = config::discovery::discover_verbose();
    let loaded = config::load(&discovery)?;
    if args.verbose {
        for dir in &searched {
            eprintln!("searched for config in {}", dir.display());
        }
    }
    Ok(loaded)
}

/// Writes notifications and new lines to stdout, `tail -f` style.
///
/// A last line without a terminator is held back until it is completed.
struct Printer {
    initial_lines: usize,
    progress: HashMap<SessionId, Progress>,
    paths: HashMap<SessionId, PathBuf>,
    last_header: Option<SessionId>,
}

/// How far a session has been printed
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    lines: usize,
    /// File size at the last print, to notice rewrites that keep the line count
    size: u64,
}

impl Printer {
    fn new(initial_lines: usize) -> Self {
        Self {
            initial_lines,
            progress: HashMap::new(),
            paths: HashMap::new(),
            last_header: None,
        }
    }

    fn drain(&mut self, registry: &SessionRegistry, rx: &Receiver<Notification>) -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for notification in rx.try_iter() {
            match self.handle(registry, notification, &mut out) {
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => std::process::exit(0),
                other => other.context("Failed to write output")?,
            }
        }
        out.flush().ok();
        Ok(())
    }

    fn handle(
        &mut self,
        registry: &SessionRegistry,
        notification: Notification,
        out: &mut impl Write,
    ) -> io::Result<()> {
        match notification {
            Notification::SessionOpened { id, path } => {
                self.paths.insert(id, path);
                let complete = registry
                    .store(id)
                    .map(|store| complete_lines(store.as_ref()))
                    .unwrap_or(0);
                self.progress.insert(
                    id,
                    Progress {
                        lines: complete.saturating_sub(self.initial_lines),
                        size: 0,
                    },
                );
                self.print_new(registry, id, out)?;
            }
            Notification::ContentChanged {
                id,
                new_line_count,
                old_line_count,
            } => {
                let size = registry.store(id).map(|s| s.file_size()).unwrap_or(0);
                let seen = self.progress.get(&id).copied().unwrap_or_default();
                if new_line_count < old_line_count || size < seen.size {
                    eprintln!("linewatch: {}: file truncated", self.name(id));
                    self.progress.insert(id, Progress::default());
                }
                self.print_new(registry, id, out)?;
            }
            Notification::SessionClosed { id, reason } => {
                if reason == CloseReason::FileDeleted {
                    eprintln!("linewatch: {}: file deleted", self.name(id));
                }
                self.progress.remove(&id);
                self.paths.remove(&id);
            }
            Notification::TransientError { id, description } => {
                eprintln!("linewatch: {}: {}", self.name(id), description);
            }
        }
        Ok(())
    }

    /// Print the completed lines of `id` not printed yet.
    fn print_new(
        &mut self,
        registry: &SessionRegistry,
        id: SessionId,
        out: &mut impl Write,
    ) -> io::Result<()> {
        let Some(store) = registry.store(id) else {
            return Ok(());
        };
        let complete = complete_lines(store.as_ref());
        let mut progress = self.progress.get(&id).copied().unwrap_or_default();
        progress.size = store.file_size();

        if complete > progress.lines {
            let lines = match registry.read_lines(id, progress.lines, complete - progress.lines) {
                Ok(lines) => lines,
                Err(e) => {
                    eprintln!("linewatch: {}: {}", self.name(id), e);
                    return Ok(());
                }
            };

            if self.paths.len() > 1 && self.last_header != Some(id) {
                writeln!(out, "\n==> {} <==", self.name(id))?;
                self.last_header = Some(id);
            }
            for line in &lines {
                writeln!(out, "{}", line)?;
            }
            progress.lines += lines.len();
        }
        self.progress.insert(id, progress);
        Ok(())
    }

    fn name(&self, id: SessionId) -> String {
        self.paths
            .get(&id)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| id.to_string())
    }
}

/// Line count of `store` excluding a last line that has no terminator yet.
fn complete_lines(store: &dyn LineStore) -> usize {
    let total = store.line_count();
    let size = store.file_size();
    if total == 0 || size == 0 {
        return total;
    }
    match last_byte(store.path(), size - 1) {
        Ok(b'\n') => total,
        Ok(_) => total - 1,
        // Gone or unreadable; the read that follows reports it
        Err(_) => total,
    }
}

fn last_byte(path: &Path, offset: u64) -> io::Result<u8> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    Ok(byte[0])
}
