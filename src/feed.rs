//! Local-socket ingest of detector snapshots.
//!
//! The hand detector runs in its own process and connects to [`LANDMARK_IPC_NAME`] (or the
//! name given to [`LandmarkFeed::bind`]). It writes one JSON value per line: `null` when no
//! hand is visible, otherwise an array of 21 `{"x", "y", "z"}` objects. Each accepted line
//! overwrites the shared [`SnapshotCell`].
//!
//! [`LANDMARK_IPC_NAME`]: crate::LANDMARK_IPC_NAME

use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use interprocess::local_socket::{LocalSocketListener, LocalSocketStream};
use tracing::{debug, info, warn};

use crate::landmarks::{LandmarkSnapshot, SnapshotCell};

/// Parses one line of the detector protocol.
pub fn parse_feed_line(line: &str) -> Result<Option<LandmarkSnapshot>, serde_json::Error> {
    serde_json::from_str(line)
}

/// Publishes every valid line from `reader` into `cell`. Returns the number of snapshots
/// published. Stops at end of stream or on a read error.
///
/// A hand with NaN or infinite coordinates is published as "no hand".
pub fn pump_snapshots<R: BufRead>(reader: R, cell: &SnapshotCell) -> usize {
    pump_until(reader, cell, || false)
}

fn pump_until<R: BufRead>(reader: R, cell: &SnapshotCell, stop: impl Fn() -> bool) -> usize {
    let mut published = 0;
    for line in reader.lines() {
        if stop() {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "detector stream read failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_feed_line(line) {
            Ok(Some(snapshot)) if !snapshot.is_finite() => {
                warn!("detector sent non-finite coordinates, treating as no hand");
                cell.publish(None);
                published += 1;
            }
            Ok(snapshot) => {
                cell.publish(snapshot);
                published += 1;
            }
            Err(err) => warn!(error = %err, "ignoring malformed detector line"),
        }
    }
    published
}

/// Background listener feeding a [`SnapshotCell`] from an external detector process.
///
/// One detector connection is served at a time. When it disconnects the cell is reset to
/// "no hand" so a stale pose is never sampled.
pub struct LandmarkFeed {
    name: String,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for LandmarkFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LandmarkFeed")
            .field("name", &self.name)
            .field("worker_running", &self.worker.is_some())
            .finish()
    }
}

impl LandmarkFeed {
    /// Binds the local socket and starts the accept loop on a dedicated thread.
    pub fn bind(name: &str, cell: SnapshotCell) -> io::Result<Self> {
        // A previous run may have left the socket path behind.
        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(name);
        }

        let listener = LocalSocketListener::bind(name)?;
        info!(name, "landmark feed listening");

        let stop = Arc::new(AtomicBool::new(false));
        let worker = std::thread::Builder::new()
            .name("landmark-feed".to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || serve(listener, cell, stop)
            })?;

        Ok(Self {
            name: name.to_string(),
            stop,
            worker: Some(worker),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops listening and waits for the worker thread to exit.
    ///
    /// A connected detector that keeps sending lines is dropped at its next line; one that
    /// stays silent holds the worker until it disconnects.
    pub fn shutdown(mut self) {
        let worker = self.worker.take();
        drop(self);
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("landmark feed thread panicked");
            }
        }
    }
}

fn serve(listener: LocalSocketListener, cell: SnapshotCell, stop: Arc<AtomicBool>) {
    let stopping = || stop.load(Ordering::SeqCst);
    for conn in listener.incoming() {
        if stopping() {
            break;
        }
        match conn {
            Ok(stream) => {
                info!("detector connected");
                let published = pump_until(BufReader::new(stream), &cell, stopping);
                cell.publish(None);
                info!(published, "detector disconnected");
            }
            Err(err) => debug!(error = %err, "failed to accept detector connection"),
        }
    }
    debug!("landmark feed stopped");
}

impl Drop for LandmarkFeed {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // accept() only returns on a connection; make one so the worker sees the flag.
        if let Err(err) = LocalSocketStream::connect(self.name.as_str()) {
            debug!(error = %err, "could not wake landmark feed worker");
        }

        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkSource;
    use std::io::Cursor;

    fn hand_line(offset: f64) -> String {
        let points: Vec<_> = (0..21)
            .map(|i| serde_json::json!({ "x": offset + i as f64 * 0.01, "y": 0.5, "z": 0.0 }))
            .collect();
        serde_json::Value::Array(points).to_string()
    }

    #[test]
    fn null_line_means_no_hand() {
        assert_eq!(parse_feed_line("null").unwrap(), None);
    }

    #[test]
    fn short_hand_is_rejected() {
        let line = r#"[{"x": 0.1, "y": 0.2, "z": 0.3}]"#;
        assert!(parse_feed_line(line).is_err());
    }

    #[test]
    fn pump_keeps_the_latest_valid_snapshot() {
        let cell = SnapshotCell::new();
        let input = format!("{}\n\nnot json\n{}\n", hand_line(0.1), hand_line(0.2));

        let published = pump_snapshots(Cursor::new(input), &cell);

        assert_eq!(published, 2);
        let latest = cell.current_snapshot().unwrap();
        assert!((latest.wrist().x() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn pump_publishes_hand_loss() {
        let cell = SnapshotCell::new();
        let input = format!("{}\nnull\n", hand_line(0.1));

        pump_snapshots(Cursor::new(input), &cell);
        assert!(cell.current_snapshot().is_none());
    }

    #[test]
    fn out_of_range_coordinates_do_not_become_a_hand() {
        let cell = SnapshotCell::new();
        let line = hand_line(0.1).replacen("0.1", "1e400", 1);
        assert!(line.contains("1e400"));

        pump_snapshots(Cursor::new(format!("{line}\n")), &cell);
        assert!(cell.current_snapshot().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn shutdown_joins_the_worker_and_frees_the_name() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("landmarks.sock");
        let name = name.to_str().unwrap();

        let feed = LandmarkFeed::bind(name, SnapshotCell::new()).unwrap();
        feed.shutdown();
        assert!(!std::path::Path::new(name).exists());

        let again = LandmarkFeed::bind(name, SnapshotCell::new()).unwrap();
        again.shutdown();
    }

    #[cfg(unix)]
    #[test]
    fn detector_connection_updates_the_cell() {
        use interprocess::local_socket::LocalSocketStream;
        use std::io::Write;
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("landmarks.sock");
        let name = name.to_str().unwrap();
        let cell = SnapshotCell::new();
        let feed = LandmarkFeed::bind(name, cell.clone()).unwrap();

        let mut detector = LocalSocketStream::connect(name).unwrap();
        writeln!(detector, "{}", hand_line(0.3)).unwrap();
        detector.flush().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while cell.current_snapshot().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(cell.current_snapshot().is_some());

        drop(detector);
        let deadline = Instant::now() + Duration::from_secs(5);
        while cell.current_snapshot().is_some() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(cell.current_snapshot().is_none());

        drop(feed);
        assert!(!std::path::Path::new(name).exists());
    }
}
