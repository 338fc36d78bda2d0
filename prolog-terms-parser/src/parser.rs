//! Top-level grammar driver.
//!
//! `TermParser` owns one grammar, one scanner, and one variable scope,
//! and orchestrates clause and directive parsing on top of the term
//! builder. A whole program unit goes through [`TermParser::root_parse`],
//! which executes directives against the grammar, hands clauses and
//! queries to the [`ClauseSink`], reports singleton-variable warnings, and
//! resynchronizes at the next end-of-clause after a clause-level error so
//! batch files do not lose subsequent clauses.

use crate::builder::TermBuilder;
use crate::grammar::Grammar;
use crate::oper::{OpTriplet, OpType, MAX_OPER_PREC};
use crate::sink::{ClauseSink, ReportSink};
use crate::term::{Arena, Term, View};
use crate::vars::VarScope;
use anyhow::{Result, bail};
use prolex::{
    FileSource, ScanError, ScanOptions, Scanner, StringSource, TextSource, TERM_DOT, TERM_EOF,
};
use smartstring::alias::String;
use std::path::Path;

pub struct TermParser<S>
where
    S: TextSource,
{
    pub(crate) scanner: Scanner<S, OpTriplet>,
    pub(crate) grammar: Grammar,
    vars: VarScope,
}

/// What a parsed top-level term means to the driver.
enum Shape {
    Directive(Term),
    Query(Term),
    Clause(Term, Term),
    Dcg(Term, Term),
    Fact(Term),
}

impl TermParser<StringSource> {
    pub fn from_str(name: &str, text: &str) -> Self {
        Self::new(StringSource::new(name, text), None)
    }
}

impl TermParser<FileSource> {
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(FileSource::open(path)?, None))
    }
}

impl<S> TermParser<S>
where
    S: TextSource,
{
    /// A parser over `src`. Without an explicit grammar a fresh one with
    /// the standard operator table is created; grammars are never shared
    /// between parser instances.
    pub fn new(src: S, grammar: Option<Grammar>) -> Self {
        Self {
            scanner: Scanner::new(src, ScanOptions::default()),
            grammar: grammar.unwrap_or_default(),
            vars: VarScope::new(),
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn scanner(&self) -> &Scanner<S, OpTriplet> {
        &self.scanner
    }

    /// Directive hook: `op/3` equivalent.
    pub fn add_operator(&mut self, prec: usize, op_type: OpType, name: &str) -> Result<()> {
        self.grammar.add_operator(prec, op_type, name, true)
    }

    /// Directive hook: clear one associativity slot of a user operator.
    pub fn remove_operator(&mut self, op_type: OpType, name: &str) -> Result<()> {
        self.grammar.remove_operator(op_type, name)
    }

    /// Directive hook: register a wrap or alt-list bracket pair.
    pub fn add_bracket_pair(&mut self, open: &str, close: &str, as_list: bool) -> Result<()> {
        self.grammar.add_bracket_pair(open, close, as_list)
    }

    /// Directive hook: switch the lexical profile between Prolog and
    /// JSON-adjacent sources.
    pub fn set_json_mode(&mut self, on: bool) {
        self.grammar.json_mode = on;
        if on {
            self.scanner.opts.hex_numbers = true;
            self.scanner.opts.signed_numbers = true;
            self.scanner.opts.backslash_escapes = true;
            self.scanner.opts.multiline_strings = false;
            self.scanner.opts.special_atom_chars = ":".into();
        } else {
            self.scanner.opts = ScanOptions::default();
        }
    }

    /// Parse one term terminated by `.`; `None` at end of input.
    pub fn parse_term(&mut self, arena: &mut Arena) -> Result<Option<Term>> {
        self.vars.erase_variables();
        self.scanner.next_symbol(&self.grammar.trie)?;
        if self.scanner.sym.terminal == TERM_EOF {
            return Ok(None);
        }
        self.scanner.unread();
        let mut b = TermBuilder::for_clause(
            &self.grammar,
            arena,
            &mut self.scanner,
            &mut self.vars,
        );
        let t = b.parse_term(MAX_OPER_PREC, &[TERM_DOT])?;
        b.expect(TERM_DOT)?;
        Ok(Some(t))
    }

    /// Parse a whole program/query unit, populating the collaborators.
    /// Returns the number of clauses (and directives) processed.
    pub fn root_parse(
        &mut self,
        arena: &mut Arena,
        sink: &mut dyn ClauseSink,
        report: &mut dyn ReportSink,
    ) -> Result<usize> {
        let mut count = 0;
        loop {
            match self.parse_clause(arena, sink, report) {
                Ok(true) => count += 1,
                Ok(false) => break,
                Err(e) => {
                    if is_io_failure(&e) {
                        return Err(e);
                    }
                    report.error(&format!("{:#}", e));
                    if !self.resync()? {
                        break;
                    }
                }
            }
        }
        Ok(count)
    }

    fn parse_clause(
        &mut self,
        arena: &mut Arena,
        sink: &mut dyn ClauseSink,
        report: &mut dyn ReportSink,
    ) -> Result<bool> {
        let Some(term) = self.parse_term(arena)? else {
            return Ok(false);
        };
        log::trace!("clause: {}", arena.display(term));
        self.dispatch(arena, term, sink, report)?;
        for (name, line) in self.vars.singletons() {
            report.warning(&format!(
                "{}:{}: singleton variable {}",
                self.scanner.source_name(),
                line,
                name
            ));
        }
        Ok(true)
    }

    fn dispatch(
        &mut self,
        arena: &mut Arena,
        term: Term,
        sink: &mut dyn ClauseSink,
        report: &mut dyn ReportSink,
    ) -> Result<()> {
        let shape = match arena.view(term) {
            View::Func(":-", args) if args.len() == 1 => Shape::Directive(args[0]),
            View::Func("?-", args) if args.len() == 1 => Shape::Query(args[0]),
            View::Func(":-", args) if args.len() == 2 => Shape::Clause(args[0], args[1]),
            View::Func("-->", args) if args.len() == 2 => Shape::Dcg(args[0], args[1]),
            _ => Shape::Fact(term),
        };
        match shape {
            Shape::Directive(d) => self.directive(arena, d, sink, report),
            Shape::Query(q) => sink.add_query(arena, q),
            Shape::Clause(h, b) => sink.add_clause(arena, h, b),
            Shape::Dcg(h, b) => {
                // The difference-list translation belongs to the engine;
                // the body is passed through under a marker.
                let marked = arena.func("$dcg", vec![b]);
                sink.add_clause(arena, h, marked)
            }
            Shape::Fact(f) => {
                let truth = arena.atom("true");
                sink.add_clause(arena, f, truth)
            }
        }
    }

    fn directive(
        &mut self,
        arena: &mut Arena,
        d: Term,
        sink: &mut dyn ClauseSink,
        report: &mut dyn ReportSink,
    ) -> Result<()> {
        let (name, args): (String, Vec<Term>) = match arena.view(d) {
            View::Func(n, a) => (n.into(), a.to_vec()),
            View::Atom(n) => (n.into(), Vec::new()),
            v => bail!("malformed directive {:?}", v),
        };
        match (name.as_str(), args.len()) {
            ("op", 3) => {
                let prec = args[0].unpack_int(arena)?;
                let op_type: OpType = args[1]
                    .atom_name(arena)?
                    .parse()
                    .map_err(anyhow::Error::from)?;
                for name_t in one_or_list(arena, args[2])? {
                    let op_name = name_t.atom_name(arena)?.to_owned();
                    if prec == 0 {
                        self.grammar.remove_operator(op_type, &op_name)?;
                    } else {
                        self.grammar
                            .add_operator(prec.try_into()?, op_type, &op_name, true)?;
                    }
                }
                Ok(())
            }
            ("wrap", 2) | ("wrap", 3) => {
                let open = args[0].atom_name(arena)?.to_owned();
                let close = args[1].atom_name(arena)?.to_owned();
                let as_list = args.len() == 3 && args[2].atom_name(arena)? == "list";
                self.grammar.add_bracket_pair(&open, &close, as_list)
            }
            ("module", 1) => {
                sink.set_module_name(args[0].atom_name(arena)?);
                Ok(())
            }
            ("dynamic", 1) => {
                for (f, a) in pred_indicators(arena, args[0])? {
                    sink.set_dynamic(&f, a);
                }
                Ok(())
            }
            ("discontiguous", 1) => {
                for (f, a) in pred_indicators(arena, args[0])? {
                    sink.set_discontiguous(&f, a);
                }
                Ok(())
            }
            ("consult", 1) | ("ensure_loaded", 1) => {
                let file = match arena.view(args[0]) {
                    View::Atom(s) => std::string::String::from(s),
                    View::Str(s) => std::string::String::from(s),
                    v => bail!("consult expects a file name, got {:?}", v),
                };
                let lines = self.consult(arena, Path::new(&file), sink, report)?;
                log::debug!("consulted {:?}: {} lines", file, lines);
                Ok(())
            }
            ("json_mode", 1) | ("json", 1) => {
                let on = args[0].atom_name(arena)? == "true";
                self.set_json_mode(on);
                Ok(())
            }
            _ => {
                report.warning(&format!(
                    "{}:{}: unknown directive {}/{} ignored",
                    self.scanner.source_name(),
                    self.scanner.sym.line_no,
                    name,
                    args.len()
                ));
                Ok(())
            }
        }
    }

    /// Nested parse of another file. The grammar moves into the nested
    /// parser and back, so operator and bracket declarations persist;
    /// conditional-compilation symbols are copied in and the outer set is
    /// reinstated afterwards by construction. Returns the consulted line
    /// count.
    pub fn consult(
        &mut self,
        arena: &mut Arena,
        path: &Path,
        sink: &mut dyn ClauseSink,
        report: &mut dyn ReportSink,
    ) -> Result<usize> {
        let src = FileSource::open(path)?;
        let mut nested: TermParser<FileSource> = TermParser {
            scanner: Scanner::new(src, self.scanner.opts.clone()),
            grammar: std::mem::take(&mut self.grammar),
            vars: VarScope::new(),
        };
        nested.scanner.cond.restore(self.scanner.cond.checkpoint());
        let result = nested.root_parse(arena, sink, report);
        self.grammar = nested.grammar;
        let lines = nested.scanner.pointer().line_no;
        result?;
        Ok(lines)
    }

    /// Skip to the next end-of-clause Dot; `false` when input (or an
    /// unrecoverable directive state) ends first.
    fn resync(&mut self) -> Result<bool> {
        // The offending symbol may itself be the terminator (possibly
        // pending re-delivery after an unread); consume it either way.
        let current = self.scanner.sym.terminal;
        self.scanner.sym.processed = true;
        match current {
            TERM_DOT => return Ok(true),
            TERM_EOF => return Ok(false),
            _ => {}
        }
        loop {
            match self.scanner.next_symbol(&self.grammar.trie) {
                Ok(()) => match self.scanner.sym.terminal {
                    TERM_DOT => return Ok(true),
                    TERM_EOF => return Ok(false),
                    _ => {}
                },
                Err(e) => {
                    if is_io_failure(&e) {
                        return Err(e);
                    }
                    if matches!(
                        e.downcast_ref::<ScanError>(),
                        Some(ScanError::DirectiveNesting { .. })
                    ) {
                        return Ok(false);
                    }
                    // Literal and character errors consumed input; keep
                    // hunting for the terminator.
                }
            }
        }
    }
}

impl Default for TermParser<StringSource> {
    fn default() -> Self {
        Self::from_str("input", "")
    }
}

fn is_io_failure(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<ScanError>(), Some(ScanError::Io { .. }))
}

/// A term that is either one item or a cons list of items.
fn one_or_list(arena: &Arena, t: Term) -> Result<Vec<Term>> {
    match arena.view(t) {
        View::Func(".", args) if args.len() == 2 => t.list_elems(arena),
        _ => Ok(vec![t]),
    }
}

/// Predicate indicators `Name/Arity`, possibly grouped with `,` or given
/// as a list.
fn pred_indicators(arena: &Arena, t: Term) -> Result<Vec<(String, usize)>> {
    fn walk(arena: &Arena, t: Term, out: &mut Vec<(String, usize)>) -> Result<()> {
        match arena.view(t) {
            View::Func(",", args) if args.len() == 2 => {
                walk(arena, args[0], out)?;
                walk(arena, args[1], out)
            }
            View::Func(".", args) if args.len() == 2 => {
                for e in t.list_elems(arena)? {
                    walk(arena, e, out)?;
                }
                Ok(())
            }
            View::Func("/", args) if args.len() == 2 => {
                let name: String = args[0].atom_name(arena)?.into();
                let arity = usize::try_from(args[1].unpack_int(arena)?)?;
                out.push((name, arity));
                Ok(())
            }
            v => bail!("expected Name/Arity, got {:?}", v),
        }
    }
    let mut out = Vec::new();
    walk(arena, t, &mut out)?;
    Ok(out)
}
