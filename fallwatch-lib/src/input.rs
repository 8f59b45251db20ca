//! Line-oriented operator input.
//!
//! Lines are read on a dedicated OS thread and forwarded over a channel. A
//! read blocked on a terminal cannot be cancelled, so it must not sit on the
//! runtime's blocking pool, which the runtime waits for on shutdown.

use std::io::{self, BufRead};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lines from stdin. The channel closes at end of input.
pub fn stdin_lines(capacity: usize) -> mpsc::Receiver<io::Result<String>> {
    spawn_line_reader(io::BufReader::new(io::stdin()), capacity)
}

/// Forward every line of `reader` until it ends, fails or the receiver is
/// dropped.
pub fn spawn_line_reader<R>(reader: R, capacity: usize) -> mpsc::Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let spawned = std::thread::Builder::new()
        .name("line-reader".to_owned())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
            debug!("Line reader finished");
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start line reader thread");
    }
    rx
}
