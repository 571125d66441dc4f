//! Operator commands and the control flags they drive.
//!
//! Commands arrive asynchronously; the planning loop only reads the flags at its
//! checkpoints. Every flag is an independent atomic, so a command racing with a
//! checkpoint can at worst be observed one checkpoint late.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Operator command tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    StopAndPrint,
    Reinit,
    AbortLoop,
    PrintData,
}

/// Token did not name a known command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl std::fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown command '{}'", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim() {
            "START" => Ok(Command::Start),
            "PAUSE" => Ok(Command::Pause),
            "STOP_AND_PRINT" => Ok(Command::StopAndPrint),
            "REINIT" => Ok(Command::Reinit),
            "ABORT_LOOP" => Ok(Command::AbortLoop),
            "PRINT_DATA" => Ok(Command::PrintData),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// Side effect the caller must perform after applying a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEffect {
    None,
    /// Write the planning table to disk now.
    FlushData,
}

/// Process-wide control flags shared between the command handler and the loop.
#[derive(Debug, Default)]
pub struct ControlFlags {
    started: AtomicBool,
    paused: AtomicBool,
    stop_requested: AtomicBool,
    reinit_requested: AtomicBool,
    abort_requested: AtomicBool,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a command to the flags.
    ///
    /// | command        | started | paused | stop |
    /// |----------------|---------|--------|------|
    /// | START          | true    | false  | false|
    /// | PAUSE          | false   | true   | false|
    /// | STOP_AND_PRINT | false   | false  | true |
    ///
    /// REINIT and ABORT_LOOP set their own flag only; PRINT_DATA changes no flag.
    pub fn apply(&self, command: Command) -> CommandEffect {
        match command {
            Command::Start => self.set_run_state(true, false, false),
            Command::Pause => self.set_run_state(false, true, false),
            Command::StopAndPrint => self.set_run_state(false, false, true),
            Command::Reinit => self.reinit_requested.store(true, Ordering::SeqCst),
            Command::AbortLoop => self.abort_requested.store(true, Ordering::SeqCst),
            Command::PrintData => return CommandEffect::FlushData,
        }
        CommandEffect::None
    }

    fn set_run_state(&self, started: bool, paused: bool, stop: bool) {
        self.started.store(started, Ordering::SeqCst);
        self.paused.store(paused, Ordering::SeqCst);
        self.stop_requested.store(stop, Ordering::SeqCst);
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::SeqCst)
    }

    pub fn reinit_requested(&self) -> bool {
        self.reinit_requested.load(Ordering::SeqCst)
    }

    /// Consume a pending abort request.
    pub fn take_abort(&self) -> bool {
        self.abort_requested.swap(false, Ordering::SeqCst)
    }

    /// Consume a pending reinit request.
    pub fn take_reinit(&self) -> bool {
        self.reinit_requested.swap(false, Ordering::SeqCst)
    }
}
