//! Bounded wait for the control socket created by the host-side peer.

use std::path::Path;
use std::time::{Duration, Instant};

use pakbox_common::config::SocketWait;
use pakbox_common::error::{PakboxError, Result};

/// Polls until `path` exists, sleeping with exponential backoff.
///
/// Returns how long the wait took.
///
/// # Errors
///
/// Returns [`PakboxError::SocketTimeout`] if the path has not appeared
/// once `wait.timeout` has elapsed.
pub fn wait_for_socket(path: &Path, wait: SocketWait) -> Result<Duration> {
    let started = Instant::now();
    let mut backoff = wait.initial_backoff;

    loop {
        if path.exists() {
            let waited = started.elapsed();
            tracing::debug!(path = %path.display(), ?waited, "control socket available");
            return Ok(waited);
        }

        let waited = started.elapsed();
        if waited >= wait.timeout {
            tracing::warn!(path = %path.display(), ?waited, "control socket never appeared");
            return Err(PakboxError::SocketTimeout {
                path: path.to_path_buf(),
                waited,
            });
        }

        let remaining = wait.timeout.saturating_sub(waited);
        std::thread::sleep(backoff.min(remaining));
        backoff = (backoff * 2).min(wait.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_wait() -> SocketWait {
        SocketWait {
            timeout: Duration::from_millis(120),
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        }
    }

    #[test]
    fn existing_socket_returns_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sock = dir.path().join("cpak.sock");
        std::fs::write(&sock, b"").expect("write");
        let waited = wait_for_socket(&sock, short_wait()).expect("wait");
        assert!(waited < Duration::from_millis(120));
    }

    #[test]
    fn missing_socket_times_out_with_distinct_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sock = dir.path().join("never.sock");
        let err = wait_for_socket(&sock, short_wait()).unwrap_err();
        match err {
            PakboxError::SocketTimeout { path, waited } => {
                assert_eq!(path, sock);
                assert!(waited >= Duration::from_millis(120));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn socket_appearing_later_is_picked_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sock = dir.path().join("late.sock");
        let writer_path = sock.clone();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            std::fs::write(writer_path, b"").expect("write");
        });

        let wait = SocketWait {
            timeout: Duration::from_secs(5),
            ..short_wait()
        };
        let waited = wait_for_socket(&sock, wait).expect("wait");
        writer.join().expect("join");
        assert!(waited >= Duration::from_millis(30));
    }
}
