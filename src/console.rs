//! Runtime Console (§4.7): a background stdin reader for `R`/`Q`/`H`.
//!
//! Grounded on the teacher's `CallGuard`/`stop_all` in-flight-drain pattern
//! (`backend/mod.rs`), applied here to the server's request counter instead
//! of a backend's call counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::info;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DRAIN_CEILING: Duration = Duration::from_secs(10);

pub enum ConsoleCommand {
    Restart,
    Quit,
    Help,
    Unknown(String),
}

impl ConsoleCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_uppercase().as_str() {
            "" => None,
            "R" => Some(Self::Restart),
            "Q" => Some(Self::Quit),
            "H" => Some(Self::Help),
            other => Some(Self::Unknown(other.to_string())),
        }
    }
}

fn print_help() {
    info!("commands: R (restart) · Q (graceful shutdown) · H (this help)");
}

/// Reads stdin lines until EOF or `Q`, notifying `shutdown` once a shutdown
/// is requested. Restart (`R`) is reported back via the return value so the
/// caller can re-exec with the same arguments and environment.
pub async fn run(shutdown: Arc<Notify>) -> bool {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_help();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match ConsoleCommand::parse(&line) {
                Some(ConsoleCommand::Quit) => {
                    info!("console: graceful shutdown requested");
                    shutdown.notify_waiters();
                    return false;
                }
                Some(ConsoleCommand::Restart) => {
                    info!("console: restart requested");
                    shutdown.notify_waiters();
                    return true;
                }
                Some(ConsoleCommand::Help) => print_help(),
                Some(ConsoleCommand::Unknown(other)) => {
                    info!(command = %other, "console: unrecognized command, ignoring");
                }
                None => {}
            },
            Ok(None) => {
                // stdin closed: treat as a quiet shutdown request.
                shutdown.notify_waiters();
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "console: stdin read failed, ignoring");
            }
        }
    }
}

/// Polls `in_flight` every 100ms up to a 10s ceiling before returning, so the
/// server can finish accepting-but-not-yet-answered requests before exit (§4.7).
pub async fn drain(in_flight: &Arc<AtomicUsize>) {
    let start = std::time::Instant::now();
    loop {
        let remaining = in_flight.load(Ordering::SeqCst);
        if remaining == 0 {
            return;
        }
        if start.elapsed() > DRAIN_CEILING {
            tracing::warn!(remaining, "drain ceiling reached, forcing shutdown");
            return;
        }
        info!(remaining, "draining in-flight requests");
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_character_commands_case_insensitively() {
        assert!(matches!(ConsoleCommand::parse("q"), Some(ConsoleCommand::Quit)));
        assert!(matches!(ConsoleCommand::parse("R"), Some(ConsoleCommand::Restart)));
        assert!(matches!(ConsoleCommand::parse("h"), Some(ConsoleCommand::Help)));
    }

    #[test]
    fn unknown_input_is_reported_not_panicked() {
        assert!(matches!(ConsoleCommand::parse("xyz"), Some(ConsoleCommand::Unknown(_))));
    }

    #[test]
    fn blank_line_parses_to_none() {
        assert!(ConsoleCommand::parse("").is_none());
    }

    #[tokio::test]
    async fn drain_returns_immediately_when_already_empty() {
        let counter = Arc::new(AtomicUsize::new(0));
        let start = std::time::Instant::now();
        drain(&counter).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
