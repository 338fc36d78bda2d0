//! The term builder: token sequence → single term.
//!
//! One term is consumed in two phases. The collection phase reads symbols
//! until the externally supplied follower set, reducing every functor
//! application, list, bracketed construct, pattern, and try/catch to a
//! single operand as it goes, so what remains is a flat run of operands
//! and operator occurrences. The fold phase then applies precedence
//! climbing over that run, with the exact argument-precedence rules the
//! operator types encode (`xfx` strictly lower on both sides, `xfy` equal
//! allowed on the right, `yfx` equal allowed on the left).

use crate::grammar::Grammar;
use crate::oper::{GrammarError, OpTriplet};
use crate::term::{Arena, Term, View};
use crate::vars::VarScope;
use anyhow::Result;
use prolex::{
    ScanError, Scanner, TextSource, TokenValue, TERM_EOF, TERM_IDENT, TERM_NUMBER, TERM_QATOM,
    TERM_STRING, TERM_VAR,
};
use smartstring::alias::String;

/// One entry of the flat operand/operator run.
#[derive(Debug)]
enum Item {
    Operand(Term),
    Oper { name: String, triplet: OpTriplet },
}

/// Borrowed working context for building the terms of one parse.
pub struct TermBuilder<'x, S>
where
    S: TextSource,
{
    pub grammar: &'x Grammar,
    pub arena: &'x mut Arena,
    pub scanner: &'x mut Scanner<S, OpTriplet>,
    pub vars: &'x mut VarScope,
    /// Set while building the body of a `-->` clause; curly sub-terms
    /// become embedded goals instead of record syntax.
    dcg_body: bool,
    /// Top-level clause parse: a `-->` operator flips `dcg_body`.
    clause_context: bool,
}

impl<'x, S> TermBuilder<'x, S>
where
    S: TextSource,
{
    pub fn new(
        grammar: &'x Grammar,
        arena: &'x mut Arena,
        scanner: &'x mut Scanner<S, OpTriplet>,
        vars: &'x mut VarScope,
    ) -> Self {
        Self {
            grammar,
            arena,
            scanner,
            vars,
            dcg_body: false,
            clause_context: false,
        }
    }

    /// Builder for a whole clause; `-->` at this level arms DCG curly
    /// handling for the rest of the clause.
    pub fn for_clause(
        grammar: &'x Grammar,
        arena: &'x mut Arena,
        scanner: &'x mut Scanner<S, OpTriplet>,
        vars: &'x mut VarScope,
    ) -> Self {
        let mut b = Self::new(grammar, arena, scanner, vars);
        b.clause_context = true;
        b
    }

    fn next(&mut self) -> Result<()> {
        self.scanner.next_symbol(&self.grammar.trie)
    }

    pub(crate) fn expect(&mut self, id: usize) -> Result<()> {
        self.next()?;
        if self.scanner.sym.terminal != id {
            let expected = self.grammar.expected_images(&[id]);
            return Err(self.scanner.syntax_error(expected));
        }
        Ok(())
    }

    fn clash_error(&self, found: String) -> anyhow::Error {
        ScanError::Syntax {
            source_name: self.scanner.source_name().into(),
            line: self.scanner.sym.line_no,
            column: self.scanner.sym.column,
            found,
            expected: vec!["operator".into()],
        }
        .into()
    }

    /// Parse one term up to (not consuming) a terminal in `followers`.
    pub fn parse_term(&mut self, max_prec: usize, followers: &[usize]) -> Result<Term> {
        let items = self.collect_items(followers)?;
        if items.is_empty() {
            return Err(self.scanner.syntax_error(vec!["term".into()]));
        }
        self.resolve(&items, max_prec)
    }

    fn collect_items(&mut self, followers: &[usize]) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        loop {
            self.next()?;
            let terminal = self.scanner.sym.terminal;
            if followers.contains(&terminal) {
                self.scanner.unread();
                return Ok(items);
            }
            if terminal == TERM_EOF {
                let expected = self.grammar.expected_images(followers);
                return Err(self.scanner.syntax_error(expected));
            }
            if let Some(triplet) = self.scanner.sym.payload.clone() {
                // An operator glued to `(` is a functor call; with layout
                // between, the operator stands on its own and any
                // parenthesized term is a separate operand.
                if !self.scanner.sym.followed_by_layout
                    && self.scanner.peek_next_char()? == Some('(')
                {
                    let name = self.scanner.sym.text.clone();
                    let t = self.parse_functor_call(&name)?;
                    items.push(Item::Operand(t));
                } else {
                    let name = self.scanner.sym.text.clone();
                    if self.clause_context && name == "-->" {
                        self.dcg_body = true;
                    }
                    items.push(Item::Oper { name, triplet });
                }
                continue;
            }
            let t = self.parse_primary(followers)?;
            items.push(Item::Operand(t));
        }
    }

    /// Reduce the token under the cursor (plus whatever it opens) to one
    /// operand. `followers` is only used for error text.
    fn parse_primary(&mut self, followers: &[usize]) -> Result<Term> {
        let core = *self.grammar.core();
        let terminal = self.scanner.sym.terminal;
        let text = self.scanner.sym.text.clone();
        let value = self.scanner.sym.value.clone();
        let line_no = self.scanner.sym.line_no;
        let glued_paren =
            !self.scanner.sym.followed_by_layout && self.scanner.peek_next_char()? == Some('(');

        match terminal {
            TERM_NUMBER => Ok(match value {
                TokenValue::Int(v) => self.arena.int(v),
                TokenValue::Real(v) => self.arena.real(v),
                TokenValue::Imag(v) => self.arena.imag(v),
                _ => unreachable!("number symbol without numeric value"),
            }),
            TERM_STRING => Ok(self.arena.str(&text)),
            TERM_VAR => Ok(if text == "_" {
                self.arena.anon_var()
            } else {
                self.vars.get_variable(self.arena, &text, line_no)
            }),
            t if t == core.try_kw => self.parse_try(glued_paren),
            TERM_IDENT | TERM_QATOM => {
                if glued_paren {
                    self.parse_functor_call(&text)
                } else {
                    Ok(self.arena.atom(&text))
                }
            }
            t if t == core.catch_kw => {
                if glued_paren {
                    self.parse_functor_call(&text)
                } else {
                    Ok(self.arena.atom(&text))
                }
            }
            t if t == core.lparen => {
                let inner = self.parse_term(crate::oper::MAX_OPER_PREC, &[core.rparen])?;
                self.expect(core.rparen)?;
                Ok(inner)
            }
            t if t == core.lbrack => self.parse_list(core.rbrack),
            t if t == core.lbrace => self.parse_curly(),
            t if t == core.pat_open => self.parse_list_pattern(),
            t if t == core.bang => Ok(self.arena.atom("!")),
            t if t == core.question => Ok(self.arena.atom("?")),
            _ => {
                if self.grammar.wrap_brackets.is_open(&text) {
                    self.parse_wrap(&text)
                } else if self.grammar.alt_brackets.is_open(&text) {
                    self.parse_alt_list(&text)
                } else {
                    let mut expected = vec![String::from("term")];
                    expected.extend(self.grammar.expected_images(followers));
                    Err(self.scanner.syntax_error(expected))
                }
            }
        }
    }

    /// `name(Arg, …)` — the `(` is guaranteed glued; comma separates
    /// arguments at priority 999.
    fn parse_functor_call(&mut self, name: &str) -> Result<Term> {
        let core = *self.grammar.core();
        self.expect(core.lparen)?;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_term(999, &[core.comma, core.rparen])?);
            self.next()?;
            if self.scanner.sym.terminal == core.rparen {
                break;
            }
        }
        Ok(self.arena.func(name, args))
    }

    /// `[...]`, with an optional `| Tail`; elements fold right onto the
    /// tail.
    fn parse_list(&mut self, close: usize) -> Result<Term> {
        let core = *self.grammar.core();
        self.next()?;
        if self.scanner.sym.terminal == close {
            return Ok(self.arena.nil());
        }
        self.scanner.unread();
        let mut elems = Vec::new();
        let mut tail = None;
        loop {
            elems.push(self.parse_term(999, &[core.comma, core.pipe, close])?);
            self.next()?;
            let t = self.scanner.sym.terminal;
            if t == core.comma {
                continue;
            }
            if t == core.pipe {
                tail = Some(self.parse_term(999, &[close])?);
                self.expect(close)?;
            }
            break;
        }
        Ok(match tail {
            Some(t) => self.arena.listc(&elems, t),
            None => self.arena.list(&elems),
        })
    }

    /// `{}` / `{Term}`; inside a DCG body the curly term is an embedded
    /// goal, otherwise record syntax.
    fn parse_curly(&mut self) -> Result<Term> {
        let core = *self.grammar.core();
        self.next()?;
        if self.scanner.sym.terminal == core.rbrace {
            return Ok(self.arena.atom("{}"));
        }
        self.scanner.unread();
        let inner = self.parse_term(crate::oper::MAX_OPER_PREC, &[core.rbrace])?;
        self.expect(core.rbrace)?;
        Ok(if self.dcg_body {
            self.arena.func("$dcg_goal", vec![inner])
        } else {
            self.arena.func("{}", vec![inner])
        })
    }

    /// Wrap-bracket construct: the elements become one cons list handed
    /// to a compound named after the opening image.
    fn parse_wrap(&mut self, open: &str) -> Result<Term> {
        let core = *self.grammar.core();
        // The closing image is looked up now, so a redefinition mid-file
        // affects only later constructs.
        let close_image: String = self
            .grammar
            .wrap_brackets
            .close_for(open)
            .expect("checked by caller")
            .into();
        let close = self
            .grammar
            .terminal_id(&close_image)
            .ok_or_else(|| self.scanner.syntax_error(vec![close_image.clone()]))?;
        self.next()?;
        let elems = if self.scanner.sym.terminal == close {
            Vec::new()
        } else {
            self.scanner.unread();
            let mut elems = Vec::new();
            loop {
                elems.push(self.parse_term(999, &[core.comma, close])?);
                self.next()?;
                if self.scanner.sym.terminal == close {
                    break;
                }
            }
            elems
        };
        let list = self.arena.list(&elems);
        Ok(self.arena.func(open, vec![list]))
    }

    /// Alternative-list brackets are plain list sugar with a
    /// runtime-defined close image.
    fn parse_alt_list(&mut self, open: &str) -> Result<Term> {
        let close_image: String = self
            .grammar
            .alt_brackets
            .close_for(open)
            .expect("checked by caller")
            .into();
        let close = self
            .grammar
            .terminal_id(&close_image)
            .ok_or_else(|| self.scanner.syntax_error(vec![close_image.clone()]))?;
        self.parse_list(close)
    }

    /// `[! element, … !]` — each element is a quantified term or an
    /// alternatives group.
    fn parse_list_pattern(&mut self) -> Result<Term> {
        let core = *self.grammar.core();
        let star = self.grammar.terminal_id("*");
        let plus = self.grammar.terminal_id("+");
        let mut followers = vec![
            core.comma,
            core.pipe,
            core.bang,
            core.pat_close,
            core.question,
            core.lbrace,
        ];
        followers.extend(star);
        followers.extend(plus);

        let mut elems = Vec::new();
        loop {
            let first = self.parse_term(999, &followers)?;
            self.next()?;
            let at = self.scanner.sym.terminal;
            // `sep` is the already-consumed separator, when the element
            // form ends on one.
            let (elem, sep) = if Some(at) == star {
                (self.quantified(first, 0, None), None)
            } else if Some(at) == plus {
                (self.quantified(first, 1, None), None)
            } else if at == core.question {
                (self.quantified(first, 0, Some(1)), None)
            } else if at == core.lbrace {
                (self.parse_range_quantifier(first)?, None)
            } else if at == core.pipe {
                let (t, sep) = self.parse_alternatives(first, &followers)?;
                (t, Some(sep))
            } else {
                (self.quantified(first, 1, Some(1)), Some(at))
            };
            elems.push(elem);
            let sep = match sep {
                Some(s) => s,
                None => {
                    self.next()?;
                    self.scanner.sym.terminal
                }
            };
            if sep == core.comma {
                continue;
            }
            if sep == core.pat_close {
                break;
            }
            let expected = self.grammar.expected_images(&[core.comma, core.pat_close]);
            return Err(self.scanner.syntax_error(expected));
        }
        let list = self.arena.list(&elems);
        Ok(self.arena.func("pattern", vec![list]))
    }

    fn quantified(&mut self, t: Term, min: i64, max: Option<i64>) -> Term {
        let min_t = self.arena.int(min);
        let max_t = match max {
            Some(n) => self.arena.int(n),
            None => self.arena.atom("inf"),
        };
        self.arena.func("quant", vec![t, min_t, max_t])
    }

    /// `{m}` or `{m,n}` after a pattern element.
    fn parse_range_quantifier(&mut self, t: Term) -> Result<Term> {
        let core = *self.grammar.core();
        self.next()?;
        if self.scanner.sym.terminal != TERM_NUMBER {
            return Err(self.scanner.syntax_error(vec!["integer".into()]));
        }
        let TokenValue::Int(m) = self.scanner.sym.value else {
            return Err(self.scanner.syntax_error(vec!["integer".into()]));
        };
        self.next()?;
        let n = if self.scanner.sym.terminal == core.comma {
            self.next()?;
            let TokenValue::Int(n) = self.scanner.sym.value else {
                return Err(self.scanner.syntax_error(vec!["integer".into()]));
            };
            self.expect(core.rbrace)?;
            n
        } else if self.scanner.sym.terminal == core.rbrace {
            m
        } else {
            let expected = self.grammar.expected_images(&[core.comma, core.rbrace]);
            return Err(self.scanner.syntax_error(expected));
        };
        Ok(self.quantified(t, m, Some(n)))
    }

    /// `alt1 | alt2 | … ! name` — returns the group term and the
    /// separator terminal that ended it.
    fn parse_alternatives(&mut self, first: Term, followers: &[usize]) -> Result<(Term, usize)> {
        let core = *self.grammar.core();
        let mut alts = vec![first];
        let mut name: Option<String> = None;
        let sep;
        loop {
            alts.push(self.parse_term(999, followers)?);
            self.next()?;
            let t = self.scanner.sym.terminal;
            if t == core.pipe {
                continue;
            }
            if t == core.bang {
                self.next()?;
                if !matches!(self.scanner.sym.terminal, TERM_IDENT | TERM_QATOM) {
                    return Err(self.scanner.syntax_error(vec!["group name".into()]));
                }
                name = Some(self.scanner.sym.text.clone());
                self.next()?;
                sep = self.scanner.sym.terminal;
                break;
            }
            sep = t;
            break;
        }
        let list = self.arena.list(&alts);
        let name_t = match name {
            Some(n) => self.arena.atom(&n),
            None => self.arena.anon_var(),
        };
        Ok((self.arena.func("alts", vec![list, name_t]), sep))
    }

    /// `try (Goal) catch(Class, Var)(Handler) …`, with marker-based
    /// backtracking to the plain-atom reading when the statement shape
    /// does not materialize.
    fn parse_try(&mut self, glued_paren: bool) -> Result<Term> {
        let marker = self.scanner.mark();
        match self.try_statement()? {
            Some(t) => Ok(t),
            None => {
                self.scanner.rewind(&marker);
                if glued_paren {
                    self.parse_functor_call("try")
                } else {
                    Ok(self.arena.atom("try"))
                }
            }
        }
    }

    fn try_statement(&mut self) -> Result<Option<Term>> {
        let core = *self.grammar.core();
        self.next()?;
        if self.scanner.sym.terminal != core.lparen {
            self.scanner.unread();
            return Ok(None);
        }
        let goal = match self.parse_term(crate::oper::MAX_OPER_PREC, &[core.rparen]) {
            Ok(g) => g,
            // Not a goal in parentheses; let the caller re-read it as a
            // plain functor call.
            Err(_) => return Ok(None),
        };
        self.expect(core.rparen)?;

        let mut clauses: Vec<(Option<String>, Term, Term)> = Vec::new();
        loop {
            self.next()?;
            if self.scanner.sym.terminal != core.catch_kw {
                self.scanner.unread();
                break;
            }
            self.expect(core.lparen)?;
            let first = self.parse_term(999, &[core.comma, core.rparen])?;
            self.next()?;
            let (class, var) = if self.scanner.sym.terminal == core.comma {
                let var = self.parse_term(999, &[core.rparen])?;
                self.expect(core.rparen)?;
                let name: String = first
                    .atom_name(self.arena)
                    .map_err(|_| self.scanner.syntax_error(vec!["exception class atom".into()]))?
                    .into();
                (Some(name), var)
            } else {
                (None, first)
            };
            self.expect(core.lparen)?;
            let handler = self.parse_term(crate::oper::MAX_OPER_PREC, &[core.rparen])?;
            self.expect(core.rparen)?;
            clauses.push((class, var, handler));
        }
        if clauses.is_empty() {
            return Ok(None);
        }

        // At most one classless clause, and only in last position;
        // class names must be unique within the statement.
        let mut seen: Vec<&str> = Vec::new();
        for (i, (class, _, _)) in clauses.iter().enumerate() {
            match class {
                Some(name) => {
                    if seen.contains(&name.as_str()) {
                        return Err(GrammarError::DuplicateCatchClass(name.clone()).into());
                    }
                    seen.push(name);
                }
                None => {
                    if i + 1 != clauses.len() {
                        return Err(GrammarError::MisplacedDefaultCatch.into());
                    }
                }
            }
        }

        let mut acc: Option<Term> = None;
        for (class, var, handler) in clauses.into_iter().rev() {
            let class_t = match class {
                Some(name) => self.arena.atom(&name),
                None => self.arena.anon_var(),
            };
            let c = self.arena.func("$catch", vec![class_t, var, handler]);
            acc = Some(match acc {
                Some(rest) => self.arena.func(",", vec![c, rest]),
                None => c,
            });
        }
        let try_t = self.arena.func("$try", vec![goal]);
        let chain = acc.expect("at least one catch clause");
        Ok(Some(self.arena.func(",", vec![try_t, chain])))
    }

    /// Fold the flat run with precedence climbing.
    fn resolve(&mut self, items: &[Item], max_prec: usize) -> Result<Term> {
        let mut pos = 0;
        let (term, _) = self.parse_expr(items, &mut pos, max_prec)?;
        if pos != items.len() {
            let found: String = match &items[pos] {
                Item::Oper { name, .. } => name.clone(),
                Item::Operand(t) => format!("{}", self.arena.display(*t)).into(),
            };
            return Err(self.clash_error(found));
        }
        Ok(term)
    }

    fn parse_expr(
        &mut self,
        items: &[Item],
        pos: &mut usize,
        max_prec: usize,
    ) -> Result<(Term, usize)> {
        let (mut left, mut left_prec) = self.parse_operand(items, pos, max_prec)?;
        loop {
            let Some(Item::Oper { name, triplet }) = items.get(*pos) else {
                break;
            };
            if let Some(def) = triplet.infix()
                && def.prec <= max_prec
                && left_prec <= def.left_max()
                && items.get(*pos + 1).is_some()
            {
                let (name, right_max, prec) = (name.clone(), def.right_max(), def.prec);
                *pos += 1;
                let (right, _) = self.parse_expr(items, pos, right_max)?;
                left = self.arena.func(&name, vec![left, right]);
                left_prec = prec;
                continue;
            }
            if let Some(def) = triplet.postfix()
                && def.prec <= max_prec
                && left_prec <= def.left_max()
            {
                let (name, prec) = (name.clone(), def.prec);
                *pos += 1;
                left = self.arena.func(&name, vec![left]);
                left_prec = prec;
                continue;
            }
            break;
        }
        Ok((left, left_prec))
    }

    fn parse_operand(
        &mut self,
        items: &[Item],
        pos: &mut usize,
        max_prec: usize,
    ) -> Result<(Term, usize)> {
        let Some(item) = items.get(*pos) else {
            return Err(self.clash_error("end of term".into()));
        };
        match item {
            Item::Operand(t) => {
                *pos += 1;
                Ok((*t, 0))
            }
            Item::Oper { name, triplet } => {
                if let Some(def) = triplet.prefix()
                    && def.prec <= max_prec
                    && items.get(*pos + 1).is_some()
                {
                    // Prefix minus directly negates a numeric literal.
                    if name == "-"
                        && let Some(Item::Operand(t)) = items.get(*pos + 1)
                    {
                        let negated = match self.arena.view(*t) {
                            View::Int(v) => Some(self.arena.int(-v)),
                            View::Real(v) => Some(self.arena.real(-v)),
                            View::Imag(v) => Some(self.arena.imag(-v)),
                            _ => None,
                        };
                        if let Some(n) = negated {
                            *pos += 2;
                            return Ok((n, 0));
                        }
                    }
                    let (applied, right_max, prec) = (name.clone(), def.right_max(), def.prec);
                    let save = *pos;
                    *pos += 1;
                    match self.parse_expr(items, pos, right_max) {
                        Ok((arg, arg_prec)) if arg_prec <= right_max => {
                            return Ok((self.arena.func(&applied, vec![arg]), prec));
                        }
                        // The argument does not fit under this prefix
                        // operator; fall back to the atom reading.
                        _ => *pos = save,
                    }
                }
                let atom_prec = triplet.max_prec();
                let name = name.clone();
                *pos += 1;
                Ok((self.arena.atom(&name), atom_prec))
            }
        }
    }
}
