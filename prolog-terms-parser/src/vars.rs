//! Per-term variable scope.
//!
//! Named variables are interned per clause: the first occurrence creates a
//! fresh variable term, later occurrences return the same term and bump
//! the occurrence count. Names still at one occurrence when the clause
//! completes are singleton candidates (unless they start with `_`).

use crate::term::{Arena, Term};
use indexmap::IndexMap;
use smartstring::alias::String;

#[derive(Debug, Clone)]
struct VarEntry {
    term: Term,
    occurrences: usize,
    line_no: usize,
}

/// Variable scope collaborator for one term/clause at a time.
#[derive(Debug, Default)]
pub struct VarScope {
    tab: IndexMap<String, VarEntry>,
}

impl VarScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, creating the variable on first sight. `line_no` is
    /// recorded on creation for singleton diagnostics.
    pub fn get_variable(&mut self, arena: &mut Arena, name: &str, line_no: usize) -> Term {
        if let Some(e) = self.tab.get_mut(name) {
            e.occurrences += 1;
            return e.term;
        }
        let term = arena.var(name);
        self.tab.insert(
            name.into(),
            VarEntry {
                term,
                occurrences: 1,
                line_no,
            },
        );
        term
    }

    /// Overwrite (or create) the binding for `name` without touching the
    /// occurrence count.
    pub fn set_variable(&mut self, name: &str, term: Term) {
        match self.tab.get_mut(name) {
            Some(e) => e.term = term,
            None => {
                self.tab.insert(
                    name.into(),
                    VarEntry {
                        term,
                        occurrences: 1,
                        line_no: 0,
                    },
                );
            }
        }
    }

    pub fn erase_variables(&mut self) {
        self.tab.clear();
    }

    pub fn len(&self) -> usize {
        self.tab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tab.is_empty()
    }

    /// Names seen exactly once, with the line they appeared on. Names
    /// starting with `_` opt out.
    pub fn singletons(&self) -> Vec<(&str, usize)> {
        self.tab
            .iter()
            .filter(|(name, e)| e.occurrences == 1 && !name.starts_with('_'))
            .map(|(name, e)| (name.as_str(), e.line_no))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_creates_later_share() {
        let mut arena = Arena::new();
        let mut vars = VarScope::new();
        let a = vars.get_variable(&mut arena, "X", 1);
        let b = vars.get_variable(&mut arena, "X", 2);
        assert_eq!(a, b);
        let c = vars.get_variable(&mut arena, "Y", 3);
        assert_ne!(a, c);
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn singleton_listing_skips_underscore_names() {
        let mut arena = Arena::new();
        let mut vars = VarScope::new();
        vars.get_variable(&mut arena, "X", 1);
        vars.get_variable(&mut arena, "X", 1);
        vars.get_variable(&mut arena, "Once", 2);
        vars.get_variable(&mut arena, "_Ignored", 3);
        let singles = vars.singletons();
        assert_eq!(singles, [("Once", 2)]);
    }

    #[test]
    fn erase_resets_the_scope() {
        let mut arena = Arena::new();
        let mut vars = VarScope::new();
        let a = vars.get_variable(&mut arena, "X", 1);
        vars.erase_variables();
        assert!(vars.is_empty());
        let b = vars.get_variable(&mut arena, "X", 4);
        assert_ne!(a, b, "a fresh clause gets a fresh variable");
    }

    #[test]
    fn set_variable_overrides_binding() {
        let mut arena = Arena::new();
        let mut vars = VarScope::new();
        vars.get_variable(&mut arena, "X", 1);
        let t = arena.int(42);
        vars.set_variable("X", t);
        let again = vars.get_variable(&mut arena, "X", 1);
        assert_eq!(again, t);
    }
}
