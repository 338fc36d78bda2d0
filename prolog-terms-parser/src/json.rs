//! JSON value grammar over the same scanner.
//!
//! JSON sources share the front end's machinery under a different lexical
//! profile (hex and signed numbers, `:` as the only special atom). An
//! object becomes `json(Members)` with one `=`(Key, Value) member per
//! pair, an array becomes a cons list, and `true`/`false`/`null` stay
//! atoms.

use crate::parser::TermParser;
use crate::term::{Arena, Term};
use anyhow::Result;
use prolex::{TextSource, TERM_EOF, TERM_IDENT, TERM_NUMBER, TERM_STRING, TokenValue};

impl<S> TermParser<S>
where
    S: TextSource,
{
    /// Parse one JSON value; `None` at end of input. Switches the scanner
    /// into the JSON lexical profile if it is not there already.
    pub fn parse_json(&mut self, arena: &mut Arena) -> Result<Option<Term>> {
        if !self.grammar.json_mode {
            self.set_json_mode(true);
        }
        self.scanner.next_symbol(&self.grammar.trie)?;
        if self.scanner.sym.terminal == TERM_EOF {
            return Ok(None);
        }
        let t = self.json_value(arena)?;
        Ok(Some(t))
    }

    /// The current symbol starts a value.
    fn json_value(&mut self, arena: &mut Arena) -> Result<Term> {
        let core = *self.grammar.core();
        let terminal = self.scanner.sym.terminal;
        let text = self.scanner.sym.text.clone();
        let value = self.scanner.sym.value.clone();
        match terminal {
            TERM_STRING => Ok(arena.str(&text)),
            TERM_NUMBER => Ok(match value {
                TokenValue::Int(v) => arena.int(v),
                TokenValue::Real(v) => arena.real(v),
                TokenValue::Imag(v) => arena.imag(v),
                _ => unreachable!("number symbol without numeric value"),
            }),
            TERM_IDENT if text == "true" || text == "false" || text == "null" => {
                Ok(arena.atom(&text))
            }
            t if t == core.lbrace => self.json_object(arena),
            t if t == core.lbrack => self.json_array(arena),
            _ => Err(self.scanner.syntax_error(vec!["JSON value".into()])),
        }
    }

    fn json_object(&mut self, arena: &mut Arena) -> Result<Term> {
        let core = *self.grammar.core();
        self.scanner.next_symbol(&self.grammar.trie)?;
        if self.scanner.sym.terminal == core.rbrace {
            let nil = arena.nil();
            return Ok(arena.func("json", vec![nil]));
        }
        self.scanner.unread();
        let mut members = Vec::new();
        loop {
            self.scanner.next_symbol(&self.grammar.trie)?;
            if self.scanner.sym.terminal != TERM_STRING {
                return Err(self.scanner.syntax_error(vec!["string key".into()]));
            }
            let key = self.scanner.sym.text.clone();
            self.scanner.next_symbol(&self.grammar.trie)?;
            if !(self.scanner.sym.terminal == TERM_IDENT && self.scanner.sym.text == ":") {
                return Err(self.scanner.syntax_error(vec![":".into()]));
            }
            self.scanner.next_symbol(&self.grammar.trie)?;
            let val = self.json_value(arena)?;
            let key_t = arena.str(&key);
            members.push(arena.func("=", vec![key_t, val]));

            self.scanner.next_symbol(&self.grammar.trie)?;
            let t = self.scanner.sym.terminal;
            if t == core.comma {
                continue;
            }
            if t == core.rbrace {
                break;
            }
            let expected = self.grammar.expected_images(&[core.comma, core.rbrace]);
            return Err(self.scanner.syntax_error(expected));
        }
        let list = arena.list(&members);
        Ok(arena.func("json", vec![list]))
    }

    fn json_array(&mut self, arena: &mut Arena) -> Result<Term> {
        let core = *self.grammar.core();
        self.scanner.next_symbol(&self.grammar.trie)?;
        if self.scanner.sym.terminal == core.rbrack {
            return Ok(arena.nil());
        }
        self.scanner.unread();
        let mut elems = Vec::new();
        loop {
            self.scanner.next_symbol(&self.grammar.trie)?;
            elems.push(self.json_value(arena)?);
            self.scanner.next_symbol(&self.grammar.trie)?;
            let t = self.scanner.sym.terminal;
            if t == core.comma {
                continue;
            }
            if t == core.rbrack {
                break;
            }
            let expected = self.grammar.expected_images(&[core.comma, core.rbrack]);
            return Err(self.scanner.syntax_error(expected));
        }
        Ok(arena.list(&elems))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::View;

    fn parse(text: &str) -> (Arena, Term) {
        let mut parser = TermParser::from_str("json", text);
        let mut arena = Arena::new();
        let t = parser.parse_json(&mut arena).unwrap().unwrap();
        (arena, t)
    }

    #[test]
    fn scalars() {
        let (arena, t) = parse("42");
        assert!(matches!(arena.view(t), View::Int(42)));
        let (arena, t) = parse("-3.5");
        assert!(matches!(arena.view(t), View::Real(v) if v == -3.5));
        let (arena, t) = parse("0x1F");
        assert!(matches!(arena.view(t), View::Int(31)));
        let (arena, t) = parse("\"hi\\n\"");
        assert!(matches!(arena.view(t), View::Str("hi\n")));
        let (arena, t) = parse("true");
        assert_eq!(t.atom_name(&arena).unwrap(), "true");
        let (arena, t) = parse("null");
        assert_eq!(t.atom_name(&arena).unwrap(), "null");
    }

    #[test]
    fn arrays_become_lists() {
        let (arena, t) = parse("[1, 2, 3]");
        let elems = t.list_elems(&arena).unwrap();
        assert_eq!(elems.len(), 3);
        let (arena, t) = parse("[]");
        assert_eq!(t.atom_name(&arena).unwrap(), "[]");
    }

    #[test]
    fn objects_become_json_terms() {
        let (arena, t) = parse(r#"{"name": "ada", "tags": [1, -2], "extra": {"deep": null}}"#);
        let args = t.unpack_func(&arena, "json", 1).unwrap();
        let members = args[0].list_elems(&arena).unwrap();
        assert_eq!(members.len(), 3);
        let kv = members[0].unpack_func(&arena, "=", 2).unwrap();
        assert!(matches!(arena.view(kv[0]), View::Str("name")));
        assert!(matches!(arena.view(kv[1]), View::Str("ada")));
        let tags = members[1].unpack_func(&arena, "=", 2).unwrap();
        assert_eq!(tags[1].list_elems(&arena).unwrap().len(), 2);
        let (arena2, t2) = parse("{}");
        let args = t2.unpack_func(&arena2, "json", 1).unwrap();
        assert_eq!(args[0].atom_name(&arena2).unwrap(), "[]");
    }

    #[test]
    fn key_must_be_a_string() {
        let mut parser = TermParser::from_str("json", "{name: 1}");
        let mut arena = Arena::new();
        assert!(parser.parse_json(&mut arena).is_err());
    }

    #[test]
    fn end_of_input_yields_none() {
        let mut parser = TermParser::from_str("json", "   ");
        let mut arena = Arena::new();
        assert!(parser.parse_json(&mut arena).unwrap().is_none());
    }
}
