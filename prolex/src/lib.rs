//! Copyright (c) 2005–2025 IKH Software, Inc.
//!
//! Released under the terms of the GNU Lesser General Public License, version 3.0
//! or (at your option) any later version (LGPL-3.0-or-later).
//!
//! Incremental scanning runtime.
//!
//! `prolex` is the generic half of the front end: a lexical dictionary
//! that can be mutated while scanning is in progress, rewindable
//! character-stream buffers, and a scanner that turns the two into a
//! stream of symbols. It knows nothing about any particular grammar —
//! terminals carry an opaque payload type that a specialization (such as
//! the companion Prolog term parser) fills with operator definitions.
//!
//! Key components:
//! - `trie`: mutable prefix tree with longest-match streaming lookup
//! - `buffer`: in-memory and block-cached file sources, listing writer
//! - `cursor`: value-type stream position snapshots
//! - `cond`: nested conditional-compilation state machine
//! - `scanner`: the symbol producer, with mark/rewind and unread

pub mod buffer;
pub mod cond;
pub mod cursor;
pub mod error;
pub mod scanner;
pub mod trie;

pub use buffer::{Encoding, FileSource, ListingWriter, StringSource, TextSource};
pub use cond::{CondDirective, CondError, CondHandler};
pub use cursor::StreamPointer;
pub use error::{Position, ScanError, Span};
pub use scanner::{
    PositionMarker, ScanOptions, ScanStats, Scanner, Symbol, TokenValue, TERM_DEFINE, TERM_DOT,
    TERM_ELSE, TERM_ELSEIF, TERM_ENDIF, TERM_EOF, TERM_FIRST_FREE, TERM_IDENT, TERM_IF,
    TERM_IFNOT, TERM_NONE, TERM_NUMBER, TERM_QATOM, TERM_STRING, TERM_UNDEFINE, TERM_VAR,
};
pub use trie::{DupPolicy, LexTrie, SymbolClass, Terminal, TrieCursor, TrieError};
