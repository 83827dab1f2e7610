use console::{style, Term};

use dbmigrate_runtime::MigrationLogger;

/// Prints engine progress to the terminal.
///
/// Info lines go to stdout, errors to stderr. Write failures are dropped.
pub struct ConsoleLogger {
    out: Term,
    err: Term,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self {
            out: Term::stdout(),
            err: Term::stderr(),
        }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationLogger for ConsoleLogger {
    fn info(&self, message: &str) {
        let _ = self
            .out
            .write_line(&format!("  {} {}", style("→").dim(), message));
    }

    fn error(&self, message: &str) {
        let _ = self
            .err
            .write_line(&format!("  {} {}", style("✗").red(), style(message).red()));
    }
}
