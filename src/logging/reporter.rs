//! Message sinks for the human-readable narrative of vault operations.

/// Receives diagnostic messages meant for the operator.
pub trait Reporter {
    fn report(&self, message: &str);
}

/// Discards every message. The default when the caller does not care.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _message: &str) {}
}

/// Prints `<alias>: <message>` lines to stdout.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    alias: String,
}

impl ConsoleReporter {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new("ev")
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, message: &str) {
        println!("{}: {}", self.alias, message);
    }
}
