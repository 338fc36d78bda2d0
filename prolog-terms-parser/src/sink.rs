//! Collaborator interfaces of the front end.
//!
//! The parser populates a clause database and reports diagnostics, but
//! owns neither: both are traits implemented by the embedding engine.
//! Recording implementations are provided for tests and demos.

use crate::term::{Arena, Term};
use anyhow::Result;
use smartstring::alias::String;

/// Clause-database sink populated by `root_parse`.
pub trait ClauseSink {
    fn add_clause(&mut self, arena: &Arena, head: Term, body: Term) -> Result<()>;

    /// Like `add_clause`, for clauses the system itself injects.
    fn add_predefined(&mut self, arena: &Arena, head: Term, body: Term) -> Result<()>;

    fn add_query(&mut self, arena: &Arena, goal: Term) -> Result<()>;

    fn set_module_name(&mut self, name: &str);

    fn set_dynamic(&mut self, name: &str, arity: usize);

    fn set_discontiguous(&mut self, name: &str, arity: usize);
}

/// Error/warning sink. Errors passed here have already been formatted
/// with source name, line, and column; warnings never abort the parse.
pub trait ReportSink {
    fn error(&mut self, message: &str);
    fn warning(&mut self, message: &str);
}

/// Collects everything, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub clauses: Vec<(Term, Term)>,
    pub predefined: Vec<(Term, Term)>,
    pub queries: Vec<Term>,
    pub module_name: Option<String>,
    pub dynamics: Vec<(String, usize)>,
    pub discontiguous: Vec<(String, usize)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClauseSink for RecordingSink {
    fn add_clause(&mut self, _arena: &Arena, head: Term, body: Term) -> Result<()> {
        self.clauses.push((head, body));
        Ok(())
    }

    fn add_predefined(&mut self, _arena: &Arena, head: Term, body: Term) -> Result<()> {
        self.predefined.push((head, body));
        Ok(())
    }

    fn add_query(&mut self, _arena: &Arena, goal: Term) -> Result<()> {
        self.queries.push(goal);
        Ok(())
    }

    fn set_module_name(&mut self, name: &str) {
        self.module_name = Some(name.into());
    }

    fn set_dynamic(&mut self, name: &str, arity: usize) {
        self.dynamics.push((name.into(), arity));
    }

    fn set_discontiguous(&mut self, name: &str, arity: usize) {
        self.discontiguous.push((name.into(), arity));
    }
}

/// Collects diagnostics, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingReport {
    pub errors: Vec<std::string::String>,
    pub warnings: Vec<std::string::String>,
}

impl RecordingReport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for RecordingReport {
    fn error(&mut self, message: &str) {
        log::debug!("reported error: {}", message);
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: &str) {
        log::debug!("reported warning: {}", message);
        self.warnings.push(message.into());
    }
}
