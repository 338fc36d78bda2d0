//! Conditional-compilation state machine.
//!
//! Directives of the `#define/#undefine/#if/#ifnot/#else/#elseif/#endif`
//! family are recognized by the scanner and fed here one at a time. The
//! handler keeps one stack entry per open `#if`-family block; the
//! outermost scope is implicitly active. While any scope is inactive the
//! scanner discards non-directive tokens without emitting them.

use indexmap::IndexSet;
use smartstring::alias::String;
use thiserror::Error;

/// Per-block activation state.
///
/// `Pristine` means no branch of the chain has been active yet (a later
/// `#elseif`/`#else` may still activate one); `Done` means a branch was
/// taken, or the enclosing scope is inactive, so nothing in the rest of
/// the chain may activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Pristine,
    Active,
    Done,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    state: BlockState,
    else_seen: bool,
}

/// The directive kinds the scanner dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondDirective {
    Define,
    Undefine,
    If,
    IfNot,
    ElseIf,
    Else,
    EndIf,
}

impl CondDirective {
    /// Whether the directive is followed by a symbol-name argument.
    pub fn takes_symbol(self) -> bool {
        matches!(
            self,
            CondDirective::Define
                | CondDirective::Undefine
                | CondDirective::If
                | CondDirective::IfNot
                | CondDirective::ElseIf
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum CondError {
    #[error("#endif without matching #if")]
    EndifWithoutIf,
    #[error("#{0} without matching #if")]
    DanglingBranch(&'static str),
    #[error("duplicate #else in conditional block")]
    DuplicateElse,
    #[error("#elseif after #else in conditional block")]
    ElseifAfterElse,
    #[error("end of input inside conditional block")]
    UnterminatedBlock,
}

/// Nested conditional-compilation handler.
#[derive(Debug, Clone, Default)]
pub struct CondHandler {
    stack: Vec<Block>,
    symbols: IndexSet<String>,
}

impl CondHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is the innermost scope (and therefore the whole chain) active?
    pub fn is_active(&self) -> bool {
        self.stack.last().is_none_or(|b| b.state == BlockState::Active)
    }

    /// Number of open `#if`-family scopes.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_defined(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Snapshot of the defined-symbol set, for scoping around nested
    /// parses.
    pub fn checkpoint(&self) -> IndexSet<String> {
        self.symbols.clone()
    }

    pub fn restore(&mut self, symbols: IndexSet<String>) {
        self.symbols = symbols;
    }

    /// Apply one directive. `symbol` must be present exactly when
    /// [`CondDirective::takes_symbol`] says so.
    pub fn directive(&mut self, d: CondDirective, symbol: Option<&str>) -> Result<(), CondError> {
        match d {
            CondDirective::Define => {
                if self.is_active() {
                    self.symbols.insert(symbol.unwrap_or("").into());
                }
            }
            CondDirective::Undefine => {
                if self.is_active() {
                    self.symbols.shift_remove(symbol.unwrap_or(""));
                }
            }
            CondDirective::If | CondDirective::IfNot => {
                let defined = self.is_defined(symbol.unwrap_or(""));
                let hit = if d == CondDirective::If { defined } else { !defined };
                // Inside an inactive scope the inner block inherits the
                // inactive status; its condition is never evaluated.
                let state = if !self.is_active() {
                    BlockState::Done
                } else if hit {
                    BlockState::Active
                } else {
                    BlockState::Pristine
                };
                self.stack.push(Block {
                    state,
                    else_seen: false,
                });
            }
            CondDirective::ElseIf => {
                let defined = self.is_defined(symbol.unwrap_or(""));
                let parent_active = self.parent_active();
                let Some(top) = self.stack.last_mut() else {
                    return Err(CondError::DanglingBranch("elseif"));
                };
                if top.else_seen {
                    return Err(CondError::ElseifAfterElse);
                }
                top.state = match top.state {
                    BlockState::Active => BlockState::Done,
                    BlockState::Pristine if parent_active && defined => BlockState::Active,
                    s => s,
                };
            }
            CondDirective::Else => {
                let parent_active = self.parent_active();
                let Some(top) = self.stack.last_mut() else {
                    return Err(CondError::DanglingBranch("else"));
                };
                if top.else_seen {
                    return Err(CondError::DuplicateElse);
                }
                top.else_seen = true;
                top.state = match top.state {
                    BlockState::Active => BlockState::Done,
                    BlockState::Pristine if parent_active => BlockState::Active,
                    s => s,
                };
            }
            CondDirective::EndIf => {
                if self.stack.pop().is_none() {
                    return Err(CondError::EndifWithoutIf);
                }
            }
        }
        Ok(())
    }

    fn parent_active(&self) -> bool {
        match self.stack.len() {
            0 | 1 => true,
            n => self.stack[n - 2].state == BlockState::Active,
        }
    }

    /// Check for scopes left open at end of input.
    pub fn finish(&self) -> Result<(), CondError> {
        if self.stack.is_empty() {
            Ok(())
        } else {
            Err(CondError::UnterminatedBlock)
        }
    }
}
