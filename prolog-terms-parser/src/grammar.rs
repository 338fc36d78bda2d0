//! The mutable grammar value.
//!
//! A `Grammar` owns the lexical trie (terminals carry [`OpTriplet`]
//! payloads), the operator table reachable through it, and the two
//! bracket-pair registries. It is created once per parser instance and
//! mutated for the lifetime of a parse in direct response to directives;
//! table identity is never shared between parser instances.

use crate::oper::{GrammarError, OpDef, OpTriplet, OpType, MAX_OPER_PREC};
use anyhow::Result;
use indexmap::IndexMap;
use prolex::{
    DupPolicy, LexTrie, SymbolClass, TERM_DEFINE, TERM_DOT, TERM_ELSE, TERM_ELSEIF, TERM_ENDIF,
    TERM_EOF, TERM_FIRST_FREE, TERM_IDENT, TERM_IF, TERM_IFNOT, TERM_NUMBER, TERM_QATOM,
    TERM_STRING, TERM_UNDEFINE, TERM_VAR,
};
use smartstring::alias::String;

/// Terminal ids of the fixed punctuation the builder dispatches on.
#[derive(Debug, Clone, Copy)]
pub struct CoreIds {
    pub lparen: usize,
    pub rparen: usize,
    pub lbrack: usize,
    pub rbrack: usize,
    pub lbrace: usize,
    pub rbrace: usize,
    pub comma: usize,
    pub pipe: usize,
    pub bang: usize,
    pub question: usize,
    pub pat_open: usize,
    pub pat_close: usize,
    pub try_kw: usize,
    pub catch_kw: usize,
}

/// Bidirectional open↔close image mapping for one bracket family.
#[derive(Debug, Clone, Default)]
pub struct BracketRegistry {
    open_to_close: IndexMap<String, String>,
}

impl BracketRegistry {
    /// Register or redefine a pairing.
    pub fn insert(&mut self, open: &str, close: &str) {
        self.open_to_close.insert(open.into(), close.into());
    }

    /// The closing image for `open`, looked up at any time during parsing
    /// of the bracketed construct.
    pub fn close_for(&self, open: &str) -> Option<&str> {
        self.open_to_close.get(open).map(|s| s.as_str())
    }

    pub fn is_open(&self, image: &str) -> bool {
        self.open_to_close.contains_key(image)
    }

    pub fn is_close(&self, image: &str) -> bool {
        self.open_to_close.values().any(|c| c == image)
    }

    pub fn len(&self) -> usize {
        self.open_to_close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open_to_close.is_empty()
    }
}

/// The standard operator table, installed reserved at construction.
const DEFAULT_OPS: &[(usize, &str, &[&str])] = &[
    (1200, "xfx", &[":-", "-->"]),
    (1200, "fx", &[":-", "?-"]),
    (1100, "xfy", &[";"]),
    (1050, "xfy", &["->"]),
    (1000, "xfy", &[","]),
    (900, "fy", &["\\+"]),
    (
        700,
        "xfx",
        &[
            "=", "\\=", "==", "\\==", "@<", "@>", "@=<", "@>=", "is", "=..", "=:=", "=\\=", "<",
            ">", "=<", ">=",
        ],
    ),
    (500, "yfx", &["+", "-", "/\\", "\\/", "xor"]),
    (400, "yfx", &["*", "/", "//", "mod", "rem", "<<", ">>"]),
    (200, "xfx", &["**"]),
    (200, "xfy", &["^"]),
    (200, "fy", &["-", "\\"]),
];

pub struct Grammar {
    pub trie: LexTrie<OpTriplet>,
    next_id: usize,
    core: CoreIds,
    /// Images that must survive operator removal, with the class they
    /// revert to once their triplet empties.
    protected: IndexMap<String, SymbolClass>,
    pub wrap_brackets: BracketRegistry,
    pub alt_brackets: BracketRegistry,
    pub json_mode: bool,
}

impl Grammar {
    pub fn new() -> Self {
        let mut g = Grammar {
            trie: LexTrie::new(true),
            next_id: TERM_FIRST_FREE,
            core: CoreIds {
                lparen: 0,
                rparen: 0,
                lbrack: 0,
                rbrack: 0,
                lbrace: 0,
                rbrace: 0,
                comma: 0,
                pipe: 0,
                bang: 0,
                question: 0,
                pat_open: 0,
                pat_close: 0,
                try_kw: 0,
                catch_kw: 0,
            },
            protected: IndexMap::new(),
            wrap_brackets: BracketRegistry::default(),
            alt_brackets: BracketRegistry::default(),
            json_mode: false,
        };

        g.core = CoreIds {
            lparen: g.core_terminal("(", SymbolClass::Group),
            rparen: g.core_terminal(")", SymbolClass::Group),
            lbrack: g.core_terminal("[", SymbolClass::Group),
            rbrack: g.core_terminal("]", SymbolClass::Group),
            lbrace: g.core_terminal("{", SymbolClass::Group),
            rbrace: g.core_terminal("}", SymbolClass::Group),
            comma: g.core_terminal(",", SymbolClass::Group),
            pipe: g.core_terminal("|", SymbolClass::Group),
            bang: g.core_terminal("!", SymbolClass::Group),
            question: g.core_terminal("?", SymbolClass::Group),
            pat_open: g.core_terminal("[!", SymbolClass::Group),
            pat_close: g.core_terminal("!]", SymbolClass::Group),
            try_kw: g.core_terminal("try", SymbolClass::Id),
            catch_kw: g.core_terminal("catch", SymbolClass::Id),
        };

        for (image, id) in [
            ("#define", TERM_DEFINE),
            ("#undefine", TERM_UNDEFINE),
            ("#if", TERM_IF),
            ("#ifnot", TERM_IFNOT),
            ("#elseif", TERM_ELSEIF),
            ("#else", TERM_ELSE),
            ("#endif", TERM_ENDIF),
        ] {
            g.trie
                .add(image, id, SymbolClass::Meta, None, DupPolicy::Error)
                .expect("fresh trie");
        }

        g.comment_terminal("/*", "*/");
        g.comment_terminal("%", "");

        for (prec, op_type, names) in DEFAULT_OPS {
            let t: OpType = op_type.parse().expect("default table");
            for &name in *names {
                g.add_operator(*prec, t, name, false).expect("default table");
            }
        }
        g
    }

    fn core_terminal(&mut self, image: &str, class: SymbolClass) -> usize {
        let id = self.alloc_id();
        self.trie
            .add(image, id, class, None, DupPolicy::Error)
            .expect("fresh trie");
        self.protected.insert(image.into(), class);
        id
    }

    fn comment_terminal(&mut self, open: &str, close: &str) {
        let id = self.alloc_id();
        self.trie
            .add(open, id, SymbolClass::Comment, None, DupPolicy::Error)
            .expect("fresh trie");
        if let Some(t) = self.trie.find_mut(open) {
            t.name = close.into();
        }
        self.protected.insert(open.into(), SymbolClass::Comment);
    }

    fn alloc_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn core(&self) -> &CoreIds {
        &self.core
    }

    pub fn terminal_id(&self, image: &str) -> Option<usize> {
        self.trie.find(image).map(|t| t.id)
    }

    /// The operator triplet attached to `name`, if any.
    pub fn op_triplet(&self, name: &str) -> Option<&OpTriplet> {
        self.trie.find(name).and_then(|t| t.payload.as_ref())
    }

    /// Attach or overwrite one associativity slot for `name`.
    ///
    /// A name already in the trie keeps its terminal id; a fresh name is
    /// registered as a new `Operator` terminal.
    pub fn add_operator(
        &mut self,
        prec: usize,
        op_type: OpType,
        name: &str,
        user_defined: bool,
    ) -> Result<()> {
        if prec > MAX_OPER_PREC {
            return Err(GrammarError::PrecedenceOutOfRange {
                prec,
                name: name.into(),
            }
            .into());
        }
        let def = OpDef {
            prec,
            op_type,
            user_defined,
        };
        log::debug!("op {} {} {:?} user={}", prec, op_type, name, user_defined);
        if let Some(term) = self.trie.find_mut(name) {
            let triplet = term.payload.get_or_insert_with(OpTriplet::new);
            triplet.set(def);
            term.class = SymbolClass::Operator;
            return Ok(());
        }
        let id = self.alloc_id();
        let mut triplet = OpTriplet::new();
        triplet.set(def);
        self.trie
            .add(name, id, SymbolClass::Operator, Some(triplet), DupPolicy::Overwrite)
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    /// Clear one associativity slot; the name leaves the grammar only
    /// when no slot remains defined. Reserved definitions stay put.
    pub fn remove_operator(&mut self, op_type: OpType, name: &str) -> Result<()> {
        let fixity = op_type.fixity();
        let Some(term) = self.trie.find_mut(name) else {
            return Err(GrammarError::NoSuchOperator {
                op_type,
                name: name.into(),
            }
            .into());
        };
        let Some(triplet) = term.payload.as_mut() else {
            return Err(GrammarError::NoSuchOperator {
                op_type,
                name: name.into(),
            }
            .into());
        };
        let Some(def) = triplet.get(fixity) else {
            return Err(GrammarError::NoSuchOperator {
                op_type,
                name: name.into(),
            }
            .into());
        };
        if !def.user_defined {
            return Err(GrammarError::RemoveReserved { name: name.into() }.into());
        }
        triplet.clear(fixity);
        log::debug!("removed op {} {:?}", op_type, name);
        if triplet.is_empty() {
            match self.protected.get(name) {
                Some(class) => {
                    term.class = *class;
                    term.payload = None;
                }
                None => {
                    self.trie.remove(name);
                }
            }
        }
        Ok(())
    }

    /// Register a bracket pair in the wrap family (`as_list = false`) or
    /// the alternative-list family (`as_list = true`). Surrounding quotes
    /// on the images are stripped.
    pub fn add_bracket_pair(&mut self, open: &str, close: &str, as_list: bool) -> Result<()> {
        let open = strip_quotes(open);
        let close = strip_quotes(close);
        if open == close {
            return Err(GrammarError::BracketImagesEqual(open.into()).into());
        }
        for image in [open, close] {
            // Redefinition in place: an image that already names a
            // terminal keeps its id but becomes a plain bracket.
            match self.trie.find_mut(image) {
                Some(term) => {
                    term.class = SymbolClass::Group;
                    term.payload = None;
                }
                None => {
                    let id = self.alloc_id();
                    self.trie
                        .add(image, id, SymbolClass::Group, None, DupPolicy::Overwrite)
                        .map_err(anyhow::Error::from)?;
                }
            }
            self.protected.insert(image.into(), SymbolClass::Group);
        }
        let registry = if as_list {
            &mut self.alt_brackets
        } else {
            &mut self.wrap_brackets
        };
        registry.insert(open, close);
        log::debug!(
            "bracket pair {:?} .. {:?} ({})",
            open,
            close,
            if as_list { "alt-list" } else { "wrap" }
        );
        Ok(())
    }

    /// Human-readable images for an expected-terminal set, for syntax
    /// error text.
    pub fn expected_images(&self, ids: &[usize]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for &id in ids {
            let described: String = match id {
                TERM_EOF => "end of input".into(),
                TERM_DOT => ".".into(),
                TERM_IDENT | TERM_QATOM => "atom".into(),
                TERM_VAR => "variable".into(),
                TERM_NUMBER => "number".into(),
                TERM_STRING => "string".into(),
                _ => {
                    let images = self.trie.images_for(id);
                    if images.is_empty() {
                        "term".into()
                    } else {
                        images.join(" or ").into()
                    }
                }
            };
            if !out.contains(&described) {
                out.push(described);
            }
        }
        out
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_quotes(image: &str) -> &str {
    let s = image.trim();
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_installed() {
        let g = Grammar::new();
        let t = g.op_triplet(":-").unwrap();
        assert_eq!(t.infix().unwrap().prec, 1200);
        assert_eq!(t.prefix().unwrap().prec, 1200);
        assert!(t.postfix().is_none());
        assert_eq!(g.op_triplet(",").unwrap().infix().unwrap().prec, 1000);
        assert_eq!(g.op_triplet("*").unwrap().infix().unwrap().op_type, OpType::YFX);
        assert!(g.op_triplet("-").unwrap().prefix().is_some());
    }

    #[test]
    fn user_operator_lifecycle() {
        let mut g = Grammar::new();
        assert!(g.op_triplet("<=>").is_none());
        g.add_operator(700, OpType::XFX, "<=>", true).unwrap();
        assert_eq!(g.op_triplet("<=>").unwrap().infix().unwrap().prec, 700);
        let id = g.terminal_id("<=>").unwrap();
        // Re-declaration overwrites only the matching slot and keeps the id.
        g.add_operator(600, OpType::XFY, "<=>", true).unwrap();
        assert_eq!(g.terminal_id("<=>").unwrap(), id);
        assert_eq!(g.op_triplet("<=>").unwrap().infix().unwrap().prec, 600);
        g.remove_operator(OpType::XFY, "<=>").unwrap();
        assert!(g.op_triplet("<=>").is_none());
        assert!(g.terminal_id("<=>").is_none());
    }

    #[test]
    fn reserved_operators_cannot_be_removed() {
        let mut g = Grammar::new();
        let err = g.remove_operator(OpType::YFX, "+").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GrammarError>().unwrap(),
            GrammarError::RemoveReserved { .. }
        ));
        // Still defined afterwards.
        assert!(g.op_triplet("+").is_some());
    }

    #[test]
    fn removing_missing_slot_fails() {
        let mut g = Grammar::new();
        g.add_operator(300, OpType::XFX, "~~>", true).unwrap();
        let err = g.remove_operator(OpType::XF, "~~>").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GrammarError>().unwrap(),
            GrammarError::NoSuchOperator { .. }
        ));
        let err = g.remove_operator(OpType::XFX, "@missing@").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GrammarError>().unwrap(),
            GrammarError::NoSuchOperator { .. }
        ));
    }

    #[test]
    fn core_terminal_keeps_identity_through_operator_life() {
        let mut g = Grammar::new();
        let comma = g.core().comma;
        assert_eq!(g.terminal_id(",").unwrap(), comma);
        // The default table already attached the infix slot; the terminal
        // was reclassified but kept its id.
        assert_eq!(g.trie.find(",").unwrap().class, SymbolClass::Operator);
    }

    #[test]
    fn precedence_range_is_checked() {
        let mut g = Grammar::new();
        let err = g.add_operator(1300, OpType::XFX, "bad", true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GrammarError>().unwrap(),
            GrammarError::PrecedenceOutOfRange { .. }
        ));
    }

    #[test]
    fn bracket_pairs_register_terminals() {
        let mut g = Grammar::new();
        let shift_id = g.terminal_id("<<").unwrap();
        g.add_bracket_pair("'<<'", "'>>'", false).unwrap();
        assert_eq!(g.wrap_brackets.close_for("<<"), Some(">>"));
        // "<<" already existed as an operator; the bracket redefinition
        // keeps its id but strips the operator payload.
        assert_eq!(g.terminal_id("<<").unwrap(), shift_id);
        assert!(g.op_triplet("<<").is_none());
        g.add_bracket_pair("(|", "|)", true).unwrap();
        assert_eq!(g.alt_brackets.close_for("(|"), Some("|)"));
        assert!(g.terminal_id("(|").is_some());
        assert!(g.terminal_id("|)").is_some());
        // Redefinition replaces the pairing in place.
        g.add_bracket_pair("(|", "!)", true).unwrap();
        assert_eq!(g.alt_brackets.close_for("(|"), Some("!)"));
        let err = g.add_bracket_pair("@@", "@@", false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GrammarError>().unwrap(),
            GrammarError::BracketImagesEqual(_)
        ));
    }

    #[test]
    fn expected_images_describe_ids() {
        let g = Grammar::new();
        let ids = [g.core().rparen, g.core().comma, prolex::TERM_DOT];
        let images = g.expected_images(&ids);
        assert_eq!(images, [")", ",", "."]);
    }
}
