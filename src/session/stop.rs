//! Early-stop signal for a serving session.
//!
//! The stdin listener runs on a detached OS thread. A blocking read on stdin
//! cannot be interrupted, so when the session ends by timeout the thread is
//! abandoned, not cancelled: it stays blocked until the process exits.

use std::io::{self, BufRead, Write};
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Fires at most once when the user asks to stop.
pub struct StopSignal {
    source: Source,
}

enum Source {
    Stdin { keyword: String },
    Channel(oneshot::Receiver<()>),
}

/// Manual trigger paired with [`StopSignal::channel`].
pub struct StopTrigger {
    sender: oneshot::Sender<()>,
}

impl StopTrigger {
    pub fn fire(self) {
        let _ = self.sender.send(());
    }
}

impl StopSignal {
    /// Read one line from stdin once armed; stop if it equals `keyword` (case-insensitive).
    pub fn stdin(keyword: impl Into<String>) -> Self {
        Self {
            source: Source::Stdin {
                keyword: keyword.into(),
            },
        }
    }

    /// A signal fired by the returned trigger.
    pub fn channel() -> (StopTrigger, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            StopTrigger { sender },
            Self {
                source: Source::Channel(receiver),
            },
        )
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = Self::channel();
        signal
    }

    /// Start listening. The receiver yields `Ok(())` only on a stop request;
    /// an error means no stop request will ever come.
    pub(crate) fn arm(self) -> oneshot::Receiver<()> {
        match self.source {
            Source::Channel(receiver) => receiver,
            Source::Stdin { keyword } => spawn_stdin_listener(keyword),
        }
    }
}

fn spawn_stdin_listener(keyword: String) -> oneshot::Receiver<()> {
    let (sender, receiver) = oneshot::channel();

    let spawned = thread::Builder::new()
        .name("stop-listener".to_string())
        .spawn(move || {
            print!("Enter '{}' to stop> ", keyword);
            let _ = io::stdout().flush();

            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(_) if is_stop(&line, &keyword) => {
                    let _ = sender.send(());
                }
                Ok(_) => debug!("Ignoring input {:?}", line.trim()),
                Err(e) => debug!("Stop listener could not read stdin: {}", e),
            }
        });

    if let Err(e) = spawned {
        warn!("Could not start stop listener, session will run until timeout: {}", e);
    }

    receiver
}

/// Whether an input line is the stop keyword.
pub fn is_stop(line: &str, keyword: &str) -> bool {
    line.trim().to_lowercase() == keyword.trim().to_lowercase()
}
