//! The scanner: one [`Symbol`] at a time from a [`TextSource`], driven by
//! the lexical trie.
//!
//! Exactly one live `Symbol` exists per scanner; every scan step
//! overwrites it. Algorithms that must remember an old token take a
//! [`PositionMarker`] first and restore it with [`Scanner::rewind`], which
//! resets the stream pointer, the full symbol, and the sequence counters
//! (the one sanctioned break of counter monotonicity, so a re-scan after
//! rewind reproduces identical diagnostics).
//!
//! Conditional-compilation directives are recognized here (Meta-class
//! terminals) and dispatched to the [`CondHandler`]; while a region is
//! inactive, non-directive tokens are discarded without being emitted.

use crate::buffer::TextSource;
use crate::cond::{CondDirective, CondHandler};
use crate::cursor::StreamPointer;
use crate::error::ScanError;
use crate::trie::{LexTrie, SymbolClass};
use anyhow::Result;
use smartstring::alias::String;

/// Well-known terminal ids produced by the scanner itself. Grammar-level
/// terminals are allocated from [`TERM_FIRST_FREE`] upward.
pub const TERM_NONE: usize = 0;
pub const TERM_EOF: usize = 1;
pub const TERM_IDENT: usize = 2;
pub const TERM_VAR: usize = 3;
pub const TERM_NUMBER: usize = 4;
pub const TERM_STRING: usize = 5;
pub const TERM_QATOM: usize = 6;
pub const TERM_DOT: usize = 7;
pub const TERM_DEFINE: usize = 8;
pub const TERM_UNDEFINE: usize = 9;
pub const TERM_IF: usize = 10;
pub const TERM_IFNOT: usize = 11;
pub const TERM_ELSEIF: usize = 12;
pub const TERM_ELSE: usize = 13;
pub const TERM_ENDIF: usize = 14;
pub const TERM_FIRST_FREE: usize = 16;

/// Decoded literal value carried by a symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TokenValue {
    #[default]
    None,
    Int(i64),
    Real(f64),
    Imag(f64),
    Str(String),
}

/// The single mutable "current token" cursor.
#[derive(Debug, Clone)]
pub struct Symbol<P> {
    /// Terminal id (well-known or grammar-allocated).
    pub terminal: usize,
    pub class: SymbolClass,
    /// Offset of the first character.
    pub start: usize,
    /// Offset of the last character.
    pub end: usize,
    /// One past the last character.
    pub end_plus: usize,
    /// `end_plus` of the previous symbol.
    pub prev_end: usize,
    pub line_no: usize,
    pub column: usize,
    /// Absolute sequence number, monotonic except across a rewind.
    pub seq_no: usize,
    /// Sequence number within the symbol's line.
    pub line_seq_no: usize,
    pub first_on_line: bool,
    /// The character right after the symbol is layout (or end of input).
    pub followed_by_layout: bool,
    /// Cleared by [`Scanner::unread`] to re-deliver this symbol once.
    pub processed: bool,
    pub value: TokenValue,
    /// Payload slot shared with the terminal that produced the symbol.
    pub payload: Option<P>,
    /// Decoded lexeme (identifier/atom name, string content, or image).
    pub text: String,
    /// Produced by quoted-atom syntax.
    pub quoted: bool,
    /// Quoted-atom content would also scan as a bare atom.
    pub unquotable: bool,
}

impl<P> Symbol<P> {
    fn pristine() -> Self {
        Self {
            terminal: TERM_NONE,
            class: SymbolClass::None,
            start: 0,
            end: 0,
            end_plus: 0,
            prev_end: 0,
            line_no: 1,
            column: 1,
            seq_no: 0,
            line_seq_no: 0,
            first_on_line: true,
            followed_by_layout: false,
            processed: true,
            value: TokenValue::None,
            payload: None,
            text: String::new(),
            quoted: false,
            unquotable: false,
        }
    }
}

/// Immutable-once-captured snapshot of scanner state.
#[derive(Debug, Clone)]
pub struct PositionMarker<P> {
    ptr: StreamPointer,
    sym: Symbol<P>,
    seq_no: usize,
    line_seq_no: usize,
    seq_line: usize,
}

/// Lexical options adjusted by grammar directives.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Resolve backslash escapes in strings and quoted atoms; when off,
    /// only doubled-quote escaping applies.
    pub backslash_escapes: bool,
    /// Permit raw newlines inside strings and quoted atoms.
    pub multiline_strings: bool,
    /// Accept `0x…` numeric literals (JSON-adjacent sources).
    pub hex_numbers: bool,
    /// Scan `-` glued to a digit as a negative numeric literal instead of
    /// an operator character (JSON-adjacent sources).
    pub signed_numbers: bool,
    /// The special-character atom set scanned under the run-length race.
    pub special_atom_chars: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            backslash_escapes: true,
            multiline_strings: false,
            hex_numbers: false,
            signed_numbers: false,
            special_atom_chars: "+-*/\\^<=>~:.?@#$&".into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub chars: usize,
    pub symbols: usize,
    pub rewinds: usize,
}

/// Trie-driven scanner over a [`TextSource`].
pub struct Scanner<S, P>
where
    S: TextSource,
{
    src: S,
    ptr: StreamPointer,
    pub sym: Symbol<P>,
    pub cond: CondHandler,
    pub opts: ScanOptions,
    stats: ScanStats,
    seq_no: usize,
    line_seq_no: usize,
    seq_line: usize,
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl<S, P> Scanner<S, P>
where
    S: TextSource,
    P: Clone,
{
    pub fn new(src: S, opts: ScanOptions) -> Self {
        Self {
            src,
            ptr: StreamPointer::new(),
            sym: Symbol::pristine(),
            cond: CondHandler::new(),
            opts,
            stats: ScanStats::default(),
            seq_no: 0,
            line_seq_no: 0,
            seq_line: 0,
        }
    }

    pub fn source_name(&self) -> &str {
        self.src.source_name()
    }

    pub fn pointer(&self) -> StreamPointer {
        self.ptr
    }

    pub fn stats(&self) -> ScanStats {
        self.stats.clone()
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.src
    }

    /// Snapshot stream pointer, symbol, and sequence counters.
    pub fn mark(&self) -> PositionMarker<P> {
        PositionMarker {
            ptr: self.ptr,
            sym: self.sym.clone(),
            seq_no: self.seq_no,
            line_seq_no: self.line_seq_no,
            seq_line: self.seq_line,
        }
    }

    /// Restore a snapshot exactly, sequence counters included.
    pub fn rewind(&mut self, marker: &PositionMarker<P>) {
        self.ptr = marker.ptr;
        self.sym = marker.sym.clone();
        self.seq_no = marker.seq_no;
        self.line_seq_no = marker.line_seq_no;
        self.seq_line = marker.seq_line;
        self.stats.rewinds += 1;
    }

    /// Re-deliver the current symbol on the next [`Scanner::next_symbol`].
    pub fn unread(&mut self) {
        self.sym.processed = false;
    }

    /// The character immediately after the current symbol, without
    /// consuming anything.
    pub fn peek_next_char(&mut self) -> Result<Option<char>> {
        let at = self.sym.end_plus;
        self.src.char_at(at)
    }

    #[inline]
    fn peek(&mut self) -> Result<Option<char>> {
        self.src.char_at(self.ptr.offset)
    }

    #[inline]
    fn peek_at(&mut self, offset: usize) -> Result<Option<char>> {
        self.src.char_at(offset)
    }

    #[inline]
    fn bump(&mut self, c: char) {
        self.ptr.advance(c);
        self.stats.chars += 1;
    }

    fn found_text(&self) -> String {
        if self.sym.terminal == TERM_EOF {
            "end of input".into()
        } else {
            self.sym.text.clone()
        }
    }

    /// A syntax error at the current symbol, with the expected-image set.
    pub fn syntax_error(&self, expected: Vec<String>) -> anyhow::Error {
        ScanError::Syntax {
            source_name: self.src.source_name().into(),
            line: self.sym.line_no,
            column: self.sym.column,
            found: self.found_text(),
            expected,
        }
        .into()
    }

    fn unterminated(&self, what: &'static str) -> anyhow::Error {
        ScanError::UnterminatedLiteral {
            source_name: self.src.source_name().into(),
            line: self.sym.line_no,
            column: self.sym.column,
            what,
        }
        .into()
    }

    fn nesting_error(&self, message: std::string::String) -> anyhow::Error {
        ScanError::DirectiveNesting {
            source_name: self.src.source_name().into(),
            line: self.sym.line_no,
            column: self.sym.column,
            message: message.into(),
        }
        .into()
    }

    /// Produce the next deliverable symbol, transparently consuming
    /// comments, directives, and inactive regions.
    pub fn next_symbol(&mut self, trie: &LexTrie<P>) -> Result<()> {
        if !self.sym.processed {
            self.sym.processed = true;
            return Ok(());
        }
        loop {
            self.scan_raw(trie)?;
            self.stats.symbols += 1;
            log::trace!(
                "SYMBOL: {:?} {:?} at {}:{} seq {}",
                self.sym.class,
                self.sym.text,
                self.sym.line_no,
                self.sym.column,
                self.sym.seq_no,
            );
            match self.sym.class {
                SymbolClass::Comment => continue,
                SymbolClass::Meta => {
                    self.handle_directive()?;
                    continue;
                }
                SymbolClass::None if self.sym.terminal == TERM_EOF => {
                    if let Err(e) = self.cond.finish() {
                        return Err(self.nesting_error(e.to_string()));
                    }
                    return Ok(());
                }
                _ if !self.cond.is_active() => continue,
                _ => return Ok(()),
            }
        }
    }

    fn scan_raw(&mut self, trie: &LexTrie<P>) -> Result<()> {
        while let Some(c) = self.peek()? {
            if !c.is_whitespace() {
                break;
            }
            self.bump(c);
        }

        let start = self.ptr.offset;
        let line_no = self.ptr.line_no;
        let column = self.ptr.column();
        let prev_end = self.sym.end_plus;

        self.seq_no += 1;
        if line_no != self.seq_line {
            self.seq_line = line_no;
            self.line_seq_no = 0;
        }
        self.line_seq_no += 1;

        self.sym = Symbol {
            terminal: TERM_NONE,
            class: SymbolClass::None,
            start,
            end: start,
            end_plus: start,
            prev_end,
            line_no,
            column,
            seq_no: self.seq_no,
            line_seq_no: self.line_seq_no,
            first_on_line: self.line_seq_no == 1,
            followed_by_layout: false,
            processed: true,
            value: TokenValue::None,
            payload: None,
            text: String::new(),
            quoted: false,
            unquotable: false,
        };

        match self.peek()? {
            None => {
                self.sym.terminal = TERM_EOF;
                self.sym.text = "end of input".into();
            }
            Some(c) if c.is_ascii_digit() => self.scan_number()?,
            Some('-')
                if self.opts.signed_numbers
                    && self
                        .peek_at(start + 1)?
                        .is_some_and(|c| c.is_ascii_digit()) =>
            {
                self.bump('-');
                self.scan_number()?;
                self.sym.value = match std::mem::take(&mut self.sym.value) {
                    TokenValue::Int(v) => TokenValue::Int(-v),
                    TokenValue::Real(v) => TokenValue::Real(-v),
                    TokenValue::Imag(v) => TokenValue::Imag(-v),
                    v => v,
                };
            }
            Some('"') => self.scan_string()?,
            Some('\'') => self.scan_quoted_atom(trie)?,
            Some('@') if self.peek_at(start + 1)? == Some('"') => self.scan_verbatim()?,
            Some(c) => self.scan_trie_race(trie, c)?,
        }

        self.sym.end_plus = self.ptr.offset;
        self.sym.end = self.ptr.offset.saturating_sub(1);
        self.sym.followed_by_layout = match self.peek()? {
            None => true,
            Some(c) => c.is_whitespace(),
        };
        self.ptr.first_on_line = false;
        Ok(())
    }

    /// The longest-match race between the trie, an identifier run, and a
    /// special-character run. Ties break toward the terminal.
    fn scan_trie_race(&mut self, trie: &LexTrie<P>, first: char) -> Result<()> {
        let start = self.ptr.offset;

        let mut cursor = trie.cursor();
        let mut n = 0;
        loop {
            match self.src.char_at(start + n)? {
                Some(c) if cursor.step(c) => n += 1,
                _ => break,
            }
        }
        let best = cursor
            .best()
            .map(|(t, len)| (t.id, t.class, t.payload.clone(), t.name.clone(), len));
        let trie_len = best.as_ref().map(|b| b.4).unwrap_or(0);

        let mut id_len = 0;
        if is_ident_start(first) {
            while let Some(c) = self.src.char_at(start + id_len)? {
                if !is_ident_continue(c) {
                    break;
                }
                id_len += 1;
            }
        }

        let mut sp_len = 0;
        if self.opts.special_atom_chars.contains(first) {
            while let Some(c) = self.src.char_at(start + sp_len)? {
                if !self.opts.special_atom_chars.contains(c) {
                    break;
                }
                sp_len += 1;
            }
        }

        let run_len = id_len.max(sp_len);
        if trie_len == 0 && run_len == 0 {
            self.bump(first);
            let mut found = String::new();
            found.push(first);
            self.sym.text = found;
            return Err(self.syntax_error(vec!["token".into()]));
        }

        if trie_len >= run_len {
            let (id, class, payload, name, len) = best.unwrap();
            self.consume(len)?;
            self.sym.terminal = id;
            self.sym.class = class;
            self.sym.payload = payload;
            self.sym.text = self.src.substring(start, start + len)?;
            if class == SymbolClass::Comment {
                self.skip_comment(&name)?;
            }
            return Ok(());
        }

        if id_len >= sp_len {
            self.consume(id_len)?;
            self.sym.text = self.src.substring(start, start + id_len)?;
            self.sym.class = SymbolClass::Id;
            self.sym.terminal = if first.is_uppercase() || first == '_' {
                TERM_VAR
            } else {
                TERM_IDENT
            };
        } else {
            self.consume(sp_len)?;
            self.sym.text = self.src.substring(start, start + sp_len)?;
            // A lone "." is the clause terminator only before layout or
            // end of input; never when glued to another atom character.
            let dot = self.sym.text == "."
                && match self.peek()? {
                    None => true,
                    Some(c) => c.is_whitespace(),
                };
            if dot {
                self.sym.terminal = TERM_DOT;
                self.sym.class = SymbolClass::Group;
            } else {
                self.sym.terminal = TERM_IDENT;
                self.sym.class = SymbolClass::Id;
            }
        }
        Ok(())
    }

    fn consume(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            match self.peek()? {
                Some(c) => self.bump(c),
                None => break,
            }
        }
        Ok(())
    }

    fn scan_number(&mut self) -> Result<()> {
        let start = self.ptr.offset;
        self.sym.class = SymbolClass::Number;
        self.sym.terminal = TERM_NUMBER;

        if self.opts.hex_numbers
            && self.peek()? == Some('0')
            && matches!(self.peek_at(start + 1)?, Some('x') | Some('X'))
            && self.peek_at(start + 2)?.is_some_and(|c| c.is_ascii_hexdigit())
        {
            self.consume(2)?;
            while let Some(c) = self.peek()? {
                if !c.is_ascii_hexdigit() {
                    break;
                }
                self.bump(c);
            }
            let digits = self.src.substring(start + 2, self.ptr.offset)?;
            self.sym.text = self.src.substring(start, self.ptr.offset)?;
            let v = i64::from_str_radix(&digits, 16)
                .map_err(|_| self.syntax_error(vec!["hexadecimal integer".into()]))?;
            self.sym.value = TokenValue::Int(v);
            return Ok(());
        }

        while let Some(c) = self.peek()? {
            if !c.is_ascii_digit() {
                break;
            }
            self.bump(c);
        }
        let mut is_real = false;
        if self.peek()? == Some('.')
            && self
                .peek_at(self.ptr.offset + 1)?
                .is_some_and(|c| c.is_ascii_digit())
        {
            is_real = true;
            self.bump('.');
            while let Some(c) = self.peek()? {
                if !c.is_ascii_digit() {
                    break;
                }
                self.bump(c);
            }
        }
        if matches!(self.peek()?, Some('e') | Some('E')) {
            let after = self.peek_at(self.ptr.offset + 1)?;
            let exp_ok = match after {
                Some(c) if c.is_ascii_digit() => true,
                Some('+') | Some('-') => self
                    .peek_at(self.ptr.offset + 2)?
                    .is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if exp_ok {
                is_real = true;
                self.consume(1)?;
                if matches!(self.peek()?, Some('+') | Some('-')) {
                    self.consume(1)?;
                }
                while let Some(c) = self.peek()? {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    self.bump(c);
                }
            }
        }
        let mut imaginary = false;
        if self.peek()? == Some('i')
            && !self
                .peek_at(self.ptr.offset + 1)?
                .is_some_and(is_ident_continue)
        {
            imaginary = true;
            self.bump('i');
        }

        self.sym.text = self.src.substring(start, self.ptr.offset)?;
        let digits = if imaginary {
            &self.sym.text[..self.sym.text.len() - 1]
        } else {
            &self.sym.text[..]
        };
        self.sym.value = if imaginary {
            let v: f64 = digits
                .parse()
                .map_err(|_| self.syntax_error(vec!["number".into()]))?;
            TokenValue::Imag(v)
        } else if is_real {
            let v: f64 = digits
                .parse()
                .map_err(|_| self.syntax_error(vec!["number".into()]))?;
            TokenValue::Real(v)
        } else {
            let v: i64 = digits
                .parse()
                .map_err(|_| self.syntax_error(vec!["integer".into()]))?;
            TokenValue::Int(v)
        };
        Ok(())
    }

    fn scan_string(&mut self) -> Result<()> {
        self.bump('"');
        let mut out = String::new();
        loop {
            match self.peek()? {
                None => return Err(self.unterminated("string")),
                Some('"') => {
                    self.bump('"');
                    if !self.opts.backslash_escapes && self.peek()? == Some('"') {
                        self.bump('"');
                        out.push('"');
                    } else {
                        break;
                    }
                }
                Some('\n') => {
                    if !self.opts.multiline_strings {
                        return Err(self.unterminated("string"));
                    }
                    self.bump('\n');
                    out.push('\n');
                }
                Some('\\') if self.opts.backslash_escapes => {
                    self.bump('\\');
                    self.scan_escape(&mut out, "string")?;
                }
                Some(c) => {
                    self.bump(c);
                    out.push(c);
                }
            }
        }
        self.sym.class = SymbolClass::Text;
        self.sym.terminal = TERM_STRING;
        self.sym.text = out.clone();
        self.sym.value = TokenValue::Str(out);
        Ok(())
    }

    fn scan_escape(&mut self, out: &mut String, what: &'static str) -> Result<()> {
        let Some(c) = self.peek()? else {
            return Err(self.unterminated(what));
        };
        self.bump(c);
        match c {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0C'),
            'v' => out.push('\x0B'),
            '0' => out.push('\0'),
            'x' => {
                let mut code = 0u32;
                let mut any = false;
                while let Some(h) = self.peek()? {
                    let Some(d) = h.to_digit(16) else { break };
                    self.bump(h);
                    code = code.wrapping_mul(16).wrapping_add(d);
                    any = true;
                }
                // ISO-style terminating backslash is consumed when present.
                if self.peek()? == Some('\\') {
                    self.bump('\\');
                }
                if !any {
                    return Err(self.syntax_error(vec!["hexadecimal character code".into()]));
                }
                out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
            }
            '\n' => {} // line continuation
            other => out.push(other),
        }
        Ok(())
    }

    fn scan_quoted_atom(&mut self, trie: &LexTrie<P>) -> Result<()> {
        self.bump('\'');
        let mut out = String::new();
        loop {
            match self.peek()? {
                None => return Err(self.unterminated("quoted atom")),
                Some('\'') => {
                    self.bump('\'');
                    // Doubled quotes always escape inside quoted atoms.
                    if self.peek()? == Some('\'') {
                        self.bump('\'');
                        out.push('\'');
                    } else {
                        break;
                    }
                }
                Some('\n') => {
                    if !self.opts.multiline_strings {
                        return Err(self.unterminated("quoted atom"));
                    }
                    self.bump('\n');
                    out.push('\n');
                }
                Some('\\') if self.opts.backslash_escapes => {
                    self.bump('\\');
                    self.scan_escape(&mut out, "quoted atom")?;
                }
                Some(c) => {
                    self.bump(c);
                    out.push(c);
                }
            }
        }

        let mut chars = out.chars();
        let unquotable = match chars.next() {
            Some(c) if c.is_lowercase() => chars.all(is_ident_continue),
            Some(c) if self.opts.special_atom_chars.contains(c) => {
                out.chars().all(|c| self.opts.special_atom_chars.contains(c))
            }
            _ => false,
        };
        self.sym.payload = trie.find(&out).and_then(|t| t.payload.clone());
        self.sym.class = SymbolClass::Id;
        self.sym.terminal = TERM_QATOM;
        self.sym.quoted = true;
        self.sym.unquotable = unquotable;
        self.sym.text = out;
        Ok(())
    }

    fn scan_verbatim(&mut self) -> Result<()> {
        self.bump('@');
        self.bump('"');
        let mut out = String::new();
        loop {
            match self.peek()? {
                None => return Err(self.unterminated("verbatim string")),
                Some('"') => {
                    self.bump('"');
                    if self.peek()? == Some('"') {
                        self.bump('"');
                        out.push('"');
                    } else {
                        break;
                    }
                }
                Some(c) => {
                    self.bump(c);
                    out.push(c);
                }
            }
        }
        self.sym.class = SymbolClass::Text;
        self.sym.terminal = TERM_STRING;
        self.sym.text = out.clone();
        self.sym.value = TokenValue::Str(out);
        Ok(())
    }

    fn skip_comment(&mut self, close: &str) -> Result<()> {
        if close.is_empty() {
            while let Some(c) = self.peek()? {
                self.bump(c);
                if c == '\n' {
                    break;
                }
            }
            return Ok(());
        }
        let close_chars: Vec<char> = close.chars().collect();
        loop {
            let mut m = 0;
            while m < close_chars.len()
                && self.src.char_at(self.ptr.offset + m)? == Some(close_chars[m])
            {
                m += 1;
            }
            if m == close_chars.len() {
                self.consume(m)?;
                return Ok(());
            }
            match self.peek()? {
                Some(c) => self.bump(c),
                None => return Err(self.unterminated("comment")),
            }
        }
    }

    fn handle_directive(&mut self) -> Result<()> {
        let d = match self.sym.terminal {
            TERM_DEFINE => CondDirective::Define,
            TERM_UNDEFINE => CondDirective::Undefine,
            TERM_IF => CondDirective::If,
            TERM_IFNOT => CondDirective::IfNot,
            TERM_ELSEIF => CondDirective::ElseIf,
            TERM_ELSE => CondDirective::Else,
            TERM_ENDIF => CondDirective::EndIf,
            _ => return Err(self.syntax_error(vec!["conditional directive".into()])),
        };
        let name = if d.takes_symbol() {
            while let Some(c) = self.peek()? {
                if !c.is_whitespace() {
                    break;
                }
                self.bump(c);
            }
            let start = self.ptr.offset;
            while let Some(c) = self.peek()? {
                if !is_ident_continue(c) {
                    break;
                }
                self.bump(c);
            }
            if self.ptr.offset == start {
                return Err(self.syntax_error(vec!["symbol name".into()]));
            }
            Some(self.src.substring(start, self.ptr.offset)?)
        } else {
            None
        };
        log::debug!("directive {:?} {:?}", d, name);
        self.cond
            .directive(d, name.as_deref())
            .map_err(|e| self.nesting_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StringSource;
    use crate::trie::DupPolicy;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// A small Prolog-flavored trie: punctuation, a few operators, meta
    /// directives, and both comment forms.
    fn test_trie() -> LexTrie<u32> {
        let mut t = LexTrie::new(true);
        let mut id = TERM_FIRST_FREE;
        for image in ["(", ")", "[", "]", "{", "}", ",", "|"] {
            t.add(image, id, SymbolClass::Group, None, DupPolicy::Error)
                .unwrap();
            id += 1;
        }
        for (image, prec) in [(":-", 1200), ("+", 500), ("*", 400), ("=", 700)] {
            t.add(image, id, SymbolClass::Operator, Some(prec), DupPolicy::Error)
                .unwrap();
            id += 1;
        }
        for (image, tid) in [
            ("#define", TERM_DEFINE),
            ("#undefine", TERM_UNDEFINE),
            ("#if", TERM_IF),
            ("#ifnot", TERM_IFNOT),
            ("#elseif", TERM_ELSEIF),
            ("#else", TERM_ELSE),
            ("#endif", TERM_ENDIF),
        ] {
            t.add(image, tid, SymbolClass::Meta, None, DupPolicy::Error)
                .unwrap();
        }
        id = add_comment(&mut t, "/*", "*/", id);
        add_comment(&mut t, "%", "", id);
        t
    }

    fn add_comment(t: &mut LexTrie<u32>, open: &str, close: &str, id: usize) -> usize {
        t.add(open, id, SymbolClass::Comment, None, DupPolicy::Error)
            .unwrap();
        if let Some(term) = t.find_mut(open) {
            term.name = close.into();
        }
        id + 1
    }

    fn scanner(text: &str) -> Scanner<StringSource, u32> {
        Scanner::new(StringSource::new("test", text), ScanOptions::default())
    }

    fn collect(text: &str) -> Vec<(usize, String)> {
        let trie = test_trie();
        let mut sc = scanner(text);
        let mut out = Vec::new();
        loop {
            sc.next_symbol(&trie).unwrap();
            if sc.sym.terminal == TERM_EOF {
                break;
            }
            out.push((sc.sym.terminal, sc.sym.text.clone()));
        }
        out
    }

    #[test]
    fn identifiers_variables_and_operators() {
        init_logger();
        let toks = collect("foo Bar _x :- X+1");
        let kinds: Vec<usize> = toks.iter().map(|t| t.0).collect();
        assert_eq!(kinds[0], TERM_IDENT);
        assert_eq!(kinds[1], TERM_VAR);
        assert_eq!(kinds[2], TERM_VAR);
        assert_eq!(toks[3].1, ":-");
        assert_eq!(kinds[4], TERM_VAR);
        assert_eq!(toks[5].1, "+");
        assert_eq!(kinds[6], TERM_NUMBER);
    }

    #[test]
    fn dot_before_layout_is_clause_end() {
        let toks = collect("a.\n");
        assert_eq!(toks[0].0, TERM_IDENT);
        assert_eq!(toks[1].0, TERM_DOT);
    }

    #[test]
    fn dot_glued_to_atom_is_not_clause_end() {
        let toks = collect("a.b");
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[0].1, "a");
        assert_eq!((toks[1].0, toks[1].1.as_str()), (TERM_IDENT, "."));
        assert_eq!(toks[2].1, "b");
    }

    #[test]
    fn dot_at_end_of_input_is_clause_end() {
        let toks = collect("a.");
        assert_eq!(toks[1].0, TERM_DOT);
    }

    #[test]
    fn special_run_beats_shorter_terminal() {
        // "<=>" is unregistered: the three-character run wins over any
        // shorter trie match and comes out a plain atom.
        let toks = collect("a<=>b");
        assert_eq!(toks.len(), 3);
        assert_eq!((toks[1].0, toks[1].1.as_str()), (TERM_IDENT, "<=>"));
    }

    #[test]
    fn numbers() {
        let toks = collect("42 3.25 1e-9 2.5i");
        let trie = test_trie();
        let mut sc = scanner("42 3.25 1e-9 2.5i 0x1f");
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Int(42));
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Real(3.25));
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Real(1e-9));
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Imag(2.5));
        // Without hex_numbers, "0x1f" is 0 then atom x1f.
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Int(0));
        assert_eq!(toks.len(), 4);
    }

    #[test]
    fn hex_numbers_in_json_mode() {
        let trie = test_trie();
        let mut sc = scanner("0x1F");
        sc.opts.hex_numbers = true;
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Int(31));
    }

    #[test]
    fn strings_and_escapes() {
        let trie = test_trie();
        let mut sc = scanner(r#""a\tb" "q""#);
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Str("a\tb".into()));
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Str("q".into()));
    }

    #[test]
    fn doubled_quote_mode() {
        let trie = test_trie();
        let mut sc = scanner(r#""say ""hi""""#);
        sc.opts.backslash_escapes = false;
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Str("say \"hi\"".into()));
    }

    #[test]
    fn verbatim_string_keeps_backslashes() {
        let trie = test_trie();
        let mut sc = scanner(r#"@"c:\tmp\x""#);
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Str("c:\\tmp\\x".into()));
    }

    #[test]
    fn verbatim_string_doubles_quotes() {
        let trie = test_trie();
        let mut sc = scanner("@\"a\"\"b\" rest");
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.value, TokenValue::Str("a\"b".into()));
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.text, "rest");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let trie = test_trie();
        let mut sc = scanner("\"abc\nrest");
        let err = sc.next_symbol(&trie).unwrap_err();
        let scan = err.downcast_ref::<ScanError>().unwrap();
        assert!(matches!(scan, ScanError::UnterminatedLiteral { what: "string", .. }));
    }

    #[test]
    fn quoted_atom_tracks_unquotable_and_operator() {
        let trie = test_trie();
        let mut sc = scanner("'abc' '+' 'A b'");
        sc.next_symbol(&trie).unwrap();
        assert!(sc.sym.quoted && sc.sym.unquotable);
        assert!(sc.sym.payload.is_none());
        sc.next_symbol(&trie).unwrap();
        assert!(sc.sym.unquotable);
        assert_eq!(sc.sym.payload, Some(500));
        sc.next_symbol(&trie).unwrap();
        assert!(!sc.sym.unquotable);
    }

    #[test]
    fn comments_are_skipped_in_place() {
        let toks = collect("a /* block\ncomment */ b % line\nc");
        let names: Vec<&str> = toks.iter().map(|t| t.1.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn unterminated_block_comment() {
        let trie = test_trie();
        let mut sc = scanner("a /* never closed");
        sc.next_symbol(&trie).unwrap();
        let err = sc.next_symbol(&trie).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>().unwrap(),
            ScanError::UnterminatedLiteral { what: "comment", .. }
        ));
    }

    #[test]
    fn layout_follow_flag_distinguishes_call_shapes() {
        let trie = test_trie();
        let mut sc = scanner("f( g (");
        sc.next_symbol(&trie).unwrap();
        assert!(!sc.sym.followed_by_layout);
        sc.next_symbol(&trie).unwrap(); // (
        sc.next_symbol(&trie).unwrap(); // g
        assert!(sc.sym.followed_by_layout);
    }

    #[test]
    fn mark_rewind_is_idempotent() {
        let trie = test_trie();
        let mut sc = scanner("alpha + beta * gamma.\nnext");
        sc.next_symbol(&trie).unwrap();
        sc.next_symbol(&trie).unwrap();
        let marker = sc.mark();
        let before = (
            sc.sym.terminal,
            sc.sym.text.clone(),
            sc.sym.seq_no,
            sc.sym.line_no,
            sc.sym.column,
        );
        // Scan ahead arbitrarily far, then rewind.
        for _ in 0..4 {
            sc.next_symbol(&trie).unwrap();
        }
        sc.rewind(&marker);
        let after = (
            sc.sym.terminal,
            sc.sym.text.clone(),
            sc.sym.seq_no,
            sc.sym.line_no,
            sc.sym.column,
        );
        assert_eq!(before, after);
        // Rescanning reproduces the same next token with the same
        // sequence number.
        sc.next_symbol(&trie).unwrap();
        let t1 = (sc.sym.text.clone(), sc.sym.seq_no);
        sc.rewind(&marker);
        sc.next_symbol(&trie).unwrap();
        let t2 = (sc.sym.text.clone(), sc.sym.seq_no);
        assert_eq!(t1, t2);
        assert!(sc.stats().rewinds >= 2);
    }

    #[test]
    fn unread_redelivers_once() {
        let trie = test_trie();
        let mut sc = scanner("a b");
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.text, "a");
        sc.unread();
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.text, "a");
        sc.next_symbol(&trie).unwrap();
        assert_eq!(sc.sym.text, "b");
    }

    #[test]
    fn conditional_compilation_selects_branches() {
        init_logger();
        let toks = collect("#define A\n#if A\nx\n#else\ny\n#endif\nz");
        let names: Vec<&str> = toks.iter().map(|t| t.1.as_str()).collect();
        assert_eq!(names, ["x", "z"]);

        let toks = collect("#if A\nx\n#else\ny\n#endif\nz");
        let names: Vec<&str> = toks.iter().map(|t| t.1.as_str()).collect();
        assert_eq!(names, ["y", "z"]);
    }

    #[test]
    fn dangling_endif_is_fatal() {
        let trie = test_trie();
        let mut sc = scanner("#endif\nx");
        let err = sc.next_symbol(&trie).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>().unwrap(),
            ScanError::DirectiveNesting { .. }
        ));
    }

    #[test]
    fn unclosed_if_at_eof_is_fatal() {
        let trie = test_trie();
        let mut sc = scanner("#if A\nx");
        let err = sc.next_symbol(&trie).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>().unwrap(),
            ScanError::DirectiveNesting { .. }
        ));
    }

    #[test]
    fn sequence_numbers_count_per_line() {
        let trie = test_trie();
        let mut sc = scanner("a b\nc");
        sc.next_symbol(&trie).unwrap();
        assert!(sc.sym.first_on_line);
        assert_eq!(sc.sym.line_seq_no, 1);
        sc.next_symbol(&trie).unwrap();
        assert!(!sc.sym.first_on_line);
        assert_eq!(sc.sym.line_seq_no, 2);
        sc.next_symbol(&trie).unwrap();
        assert_eq!((sc.sym.line_no, sc.sym.line_seq_no), (2, 1));
    }
}
