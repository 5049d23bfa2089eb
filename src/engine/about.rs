use super::Engine;
use crate::oracle::Oracle;

impl<O: Oracle> Engine<O> {
    pub fn print_about(&self) {
        eprintln!("{:<10} {} v{}", "Tool", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        eprintln!("{:<10} depth {} width {}", "Analysis", self.config.depth, self.config.width());
    }
}
