//! Asynchronous operator command channel.
//!
//! Producers (a stdin reader thread, tests, another component) push raw tokens
//! through a [`CommandSender`]. The planning loop owns the [`CommandInbox`] and
//! drains it only at its checkpoints, so a command never interrupts a service
//! call in flight.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::core::control::Command;

/// Cloneable producer side of the command channel.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<String>,
}

impl CommandSender {
    /// Queue a raw token. Returns false once the inbox has been dropped.
    pub fn send(&self, token: impl Into<String>) -> bool {
        self.tx.send(token.into()).is_ok()
    }
}

/// Consumer side of the command channel.
#[derive(Debug)]
pub struct CommandInbox {
    rx: Receiver<String>,
}

/// Create a connected sender/inbox pair.
pub fn command_channel() -> (CommandSender, CommandInbox) {
    let (tx, rx) = mpsc::channel();
    (CommandSender { tx }, CommandInbox { rx })
}

impl CommandInbox {
    /// Take every command queued so far without blocking.
    ///
    /// Unknown tokens are dropped. A disconnected channel simply yields no
    /// further commands.
    pub fn drain(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(token) => match token.parse::<Command>() {
                    Ok(command) => commands.push(command),
                    Err(err) => debug!(%err, "ignoring command"),
                },
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        commands
    }
}

/// Forward each line of `reader` to `sender` on a background thread.
///
/// The thread ends at end of input, on a read error, or once the inbox is gone.
pub fn spawn_line_reader<R>(reader: R, sender: CommandSender) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    let token = line.trim();
                    if token.is_empty() {
                        continue;
                    }
                    if !sender.send(token) {
                        break;
                    }
                }
                Err(err) => {
                    warn!(err = %err, "command input closed");
                    break;
                }
            }
        }
    })
}
