//! Engine command channel
//!
//! Every control frontend reduces to one small command enum pushed over an
//! mpsc channel: process signals, sentinel files dropped into the data
//! directory, and single-key stdin lines when a terminal is attached. The
//! runner consumes them uniformly and does not know which frontend sent what.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Print the portfolio status summary.
    Status,
    /// Print the per-symbol lot grid.
    DumpGrid,
    /// Print the command legend.
    Legend,
    /// Graceful shutdown.
    Shutdown,
}

/// Sentinel file names watched in the data directory.
const SENTINELS: &[(&str, EngineCommand)] = &[
    ("cmd.status", EngineCommand::Status),
    ("cmd.grid", EngineCommand::DumpGrid),
    ("cmd.shutdown", EngineCommand::Shutdown),
];

const SENTINEL_POLL: Duration = Duration::from_secs(2);

/// Spawn all command frontends. Each one holds a clone of the sender; the
/// runner owns the receiver.
pub fn spawn_command_sources(data_dir: PathBuf, tx: mpsc::Sender<EngineCommand>) {
    tokio::spawn(watch_signals(tx.clone()));
    tokio::spawn(watch_sentinels(data_dir, tx.clone()));
    tokio::spawn(watch_stdin(tx));
}

/// Ctrl-C / SIGTERM -> Shutdown; SIGUSR1 -> Status; SIGUSR2 -> DumpGrid.
async fn watch_signals(tx: mpsc::Sender<EngineCommand>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("cannot install SIGTERM handler: {e}");
                return;
            }
        };
        let mut sigusr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                warn!("cannot install SIGUSR1 handler: {e}");
                return;
            }
        };
        let mut sigusr2 = match signal(SignalKind::user_defined2()) {
            Ok(s) => s,
            Err(e) => {
                warn!("cannot install SIGUSR2 handler: {e}");
                return;
            }
        };

        loop {
            let command = tokio::select! {
                _ = tokio::signal::ctrl_c() => EngineCommand::Shutdown,
                _ = sigterm.recv() => EngineCommand::Shutdown,
                _ = sigusr1.recv() => EngineCommand::Status,
                _ = sigusr2.recv() => EngineCommand::DumpGrid,
            };
            let stop = command == EngineCommand::Shutdown;
            if tx.send(command).await.is_err() || stop {
                return;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(EngineCommand::Shutdown).await;
        }
    }
}

/// Poll the data directory for sentinel files; consume each one found.
async fn watch_sentinels(data_dir: PathBuf, tx: mpsc::Sender<EngineCommand>) {
    let mut interval = tokio::time::interval(SENTINEL_POLL);
    loop {
        interval.tick().await;
        for command in check_sentinels(&data_dir).await {
            info!("sentinel file command: {:?}", command);
            if tx.send(command).await.is_err() {
                return;
            }
        }
    }
}

/// Collect and remove any sentinel files present.
async fn check_sentinels(data_dir: &Path) -> Vec<EngineCommand> {
    let mut found = Vec::new();
    for (name, command) in SENTINELS {
        let path = data_dir.join(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("cannot remove sentinel {}: {e}", path.display());
                continue;
            }
            found.push(*command);
        }
    }
    found
}

/// Single-key stdin lines: s = status, g = grid, l = legend, q = quit.
async fn watch_stdin(tx: mpsc::Sender<EngineCommand>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(command) = parse_key_line(&line) else {
            debug!("unrecognized command line: {line:?}");
            continue;
        };
        let stop = command == EngineCommand::Shutdown;
        if tx.send(command).await.is_err() || stop {
            return;
        }
    }
}

fn parse_key_line(line: &str) -> Option<EngineCommand> {
    match line.trim().to_lowercase().as_str() {
        "s" | "status" => Some(EngineCommand::Status),
        "g" | "grid" => Some(EngineCommand::DumpGrid),
        "l" | "legend" | "help" => Some(EngineCommand::Legend),
        "q" | "quit" | "exit" => Some(EngineCommand::Shutdown),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_lines_map_to_commands() {
        assert_eq!(parse_key_line("s"), Some(EngineCommand::Status));
        assert_eq!(parse_key_line(" G "), Some(EngineCommand::DumpGrid));
        assert_eq!(parse_key_line("legend"), Some(EngineCommand::Legend));
        assert_eq!(parse_key_line("quit"), Some(EngineCommand::Shutdown));
        assert_eq!(parse_key_line("x"), None);
        assert_eq!(parse_key_line(""), None);
    }

    #[tokio::test]
    async fn sentinel_files_are_consumed_once() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("cmd.status"), b"")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("cmd.shutdown"), b"")
            .await
            .unwrap();

        let mut commands = check_sentinels(dir.path()).await;
        commands.sort_by_key(|c| format!("{c:?}"));
        assert_eq!(
            commands,
            vec![EngineCommand::Shutdown, EngineCommand::Status]
        );

        // Files were removed, so a second poll finds nothing.
        assert!(check_sentinels(dir.path()).await.is_empty());
        assert!(!dir.path().join("cmd.status").exists());
    }

    #[tokio::test]
    async fn empty_data_dir_yields_no_commands() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_sentinels(dir.path()).await.is_empty());
    }
}
