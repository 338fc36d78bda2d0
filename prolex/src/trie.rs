//! Mutable lexical trie.
//!
//! The trie maps terminal images to [`Terminal`] descriptors and is the
//! single authority on what the scanner recognizes as a fixed token. It is
//! mutated while parsing is in progress (operator and bracket directives
//! add and remove terminals), so lookup structures are kept incremental:
//! child lists are sorted vectors searched by binary search, and a reverse
//! id→images index answers "what does terminal X look like" for error
//! messages.

use smartstring::alias::String;
use std::collections::BTreeMap;
use thiserror::Error;

/// Closed set of lexical categories a symbol can belong to.
///
/// `Operator` is the reclassification target used when an operator payload
/// is attached to an existing terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SymbolClass {
    /// No classification (end of input, pristine symbol).
    None = 0,
    /// Identifier or reserved word.
    Id = 1,
    /// String literal.
    Text = 2,
    /// Numeric literal.
    Number = 3,
    /// Conditional-compilation directive.
    Meta = 4,
    /// Grouping punctuation (brackets, separators).
    Group = 5,
    /// Comment opener.
    Comment = 6,
    /// Terminal carrying an operator payload.
    Operator = 7,
}

impl SymbolClass {
    pub const STRS: &[&str] = &[
        "none", "id", "text", "number", "meta", "group", "comment", "operator",
    ];
}

impl From<SymbolClass> for usize {
    fn from(c: SymbolClass) -> Self {
        c as usize
    }
}

impl std::fmt::Display for SymbolClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(Self::STRS[usize::from(*self)])
    }
}

/// Policy applied when an image is inserted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupPolicy {
    /// Keep the existing terminal, drop the new one.
    Ignore,
    /// Replace the existing terminal with the new one.
    Overwrite,
    /// Fail with [`TrieError::Duplicate`].
    Error,
}

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("duplicate terminal image {0:?}")]
    Duplicate(String),
}

/// Descriptor of one lexical terminal.
///
/// For `Comment`-class terminals, `name` holds the closing image of the
/// comment ("*/" for a block comment); an empty `name` marks a line
/// comment that runs to end of line.
#[derive(Debug, Clone)]
pub struct Terminal<P> {
    /// Integer id; many images may share one id.
    pub id: usize,
    /// Display name (or comment-closing image, see above).
    pub name: String,
    pub class: SymbolClass,
    /// Canonical image as inserted.
    pub image: String,
    /// Opaque payload, e.g. an operator-precedence triplet.
    pub payload: Option<P>,
}

#[derive(Debug, Clone)]
struct TrieNode<P> {
    key: char,
    terminal: Option<Terminal<P>>,
    /// Sorted by `key` for binary search.
    children: Vec<TrieNode<P>>,
}

impl<P> TrieNode<P> {
    fn new(key: char) -> Self {
        Self {
            key,
            terminal: None,
            children: Vec::new(),
        }
    }

    fn child(&self, key: char) -> Option<&TrieNode<P>> {
        self.children
            .binary_search_by(|n| n.key.cmp(&key))
            .ok()
            .map(|i| &self.children[i])
    }

    fn child_mut(&mut self, key: char) -> Option<&mut TrieNode<P>> {
        match self.children.binary_search_by(|n| n.key.cmp(&key)) {
            Ok(i) => Some(&mut self.children[i]),
            Err(_) => None,
        }
    }

    fn child_or_insert(&mut self, key: char) -> &mut TrieNode<P> {
        match self.children.binary_search_by(|n| n.key.cmp(&key)) {
            Ok(i) => &mut self.children[i],
            Err(i) => {
                self.children.insert(i, TrieNode::new(key));
                &mut self.children[i]
            }
        }
    }
}

/// Prefix tree of terminals with longest-match streaming lookup.
///
/// Case sensitivity is fixed at construction and affects every comparison;
/// an insensitive trie folds keys to ASCII lowercase on both insert and
/// lookup.
#[derive(Debug, Clone)]
pub struct LexTrie<P> {
    root: TrieNode<P>,
    case_sensitive: bool,
    by_id: BTreeMap<usize, Vec<String>>,
}

impl<P> LexTrie<P> {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            root: TrieNode::new('\0'),
            case_sensitive,
            by_id: BTreeMap::new(),
        }
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    #[inline]
    fn fold(&self, c: char) -> char {
        if self.case_sensitive {
            c
        } else {
            c.to_ascii_lowercase()
        }
    }

    /// Insert a terminal for `image`, creating intermediate nodes as
    /// needed. Re-insertion of an existing image is governed by `policy`.
    pub fn add(
        &mut self,
        image: &str,
        id: usize,
        class: SymbolClass,
        payload: Option<P>,
        policy: DupPolicy,
    ) -> Result<(), TrieError> {
        debug_assert!(!image.is_empty(), "empty terminal image");
        let case_sensitive = self.case_sensitive;
        let mut node = &mut self.root;
        for c in image.chars() {
            let key = if case_sensitive {
                c
            } else {
                c.to_ascii_lowercase()
            };
            node = node.child_or_insert(key);
        }
        if let Some(old) = &node.terminal {
            match policy {
                DupPolicy::Ignore => return Ok(()),
                DupPolicy::Error => return Err(TrieError::Duplicate(image.into())),
                DupPolicy::Overwrite => {
                    let old_id = old.id;
                    Self::unindex(&mut self.by_id, old_id, image);
                }
            }
        }
        node.terminal = Some(Terminal {
            id,
            name: image.into(),
            class,
            image: image.into(),
            payload,
        });
        self.by_id.entry(id).or_default().push(image.into());
        Ok(())
    }

    fn unindex(by_id: &mut BTreeMap<usize, Vec<String>>, id: usize, image: &str) {
        if let Some(images) = by_id.get_mut(&id) {
            images.retain(|s| s != image);
            if images.is_empty() {
                by_id.remove(&id);
            }
        }
    }

    fn node_for(&self, image: &str) -> Option<&TrieNode<P>> {
        let mut node = &self.root;
        for c in image.chars() {
            node = node.child(self.fold(c))?;
        }
        Some(node)
    }

    /// Exact lookup of `image`.
    pub fn find(&self, image: &str) -> Option<&Terminal<P>> {
        self.node_for(image)?.terminal.as_ref()
    }

    /// Exact lookup with mutable access, used to attach or alter a payload
    /// (and reclassify the terminal) in place.
    pub fn find_mut(&mut self, image: &str) -> Option<&mut Terminal<P>> {
        let case_sensitive = self.case_sensitive;
        let mut node = &mut self.root;
        for c in image.chars() {
            let key = if case_sensitive {
                c
            } else {
                c.to_ascii_lowercase()
            };
            node = node.child_mut(key)?;
        }
        node.terminal.as_mut()
    }

    /// Delete the terminal marker for `image` and prune any now-childless,
    /// non-terminal node chain back toward the root.
    pub fn remove(&mut self, image: &str) -> Option<Terminal<P>> {
        let chars: Vec<char> = image.chars().map(|c| self.fold(c)).collect();
        let (removed, _) = Self::remove_rec(&mut self.root, &chars);
        if let Some(t) = &removed {
            Self::unindex(&mut self.by_id, t.id, image);
        }
        removed
    }

    /// Returns (removed terminal, whether the visited child became garbage).
    fn remove_rec(node: &mut TrieNode<P>, rest: &[char]) -> (Option<Terminal<P>>, bool) {
        match rest.split_first() {
            None => {
                let removed = node.terminal.take();
                let garbage = node.children.is_empty();
                (removed, garbage)
            }
            Some((&key, tail)) => {
                let Ok(i) = node.children.binary_search_by(|n| n.key.cmp(&key)) else {
                    return (None, false);
                };
                let (removed, prune) = Self::remove_rec(&mut node.children[i], tail);
                if prune {
                    node.children.remove(i);
                }
                let garbage = node.terminal.is_none() && node.children.is_empty();
                (removed, garbage)
            }
        }
    }

    /// All images currently mapped to terminal id `id` (sorted index, used
    /// for "expected one of: …" error text).
    pub fn images_for(&self, id: usize) -> &[String] {
        self.by_id.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Start a streaming longest-match walk from the root.
    pub fn cursor(&self) -> TrieCursor<'_, P> {
        TrieCursor {
            trie: self,
            node: Some(&self.root),
            len: 0,
            best: None,
        }
    }
}

/// Stateful streaming variant of trie lookup.
///
/// The scanner feeds one character at a time; the cursor descends the
/// current subtree and remembers the longest terminal seen so far, so a
/// single pass over the input races terminal recognition against
/// identifier runs.
pub struct TrieCursor<'a, P> {
    trie: &'a LexTrie<P>,
    node: Option<&'a TrieNode<P>>,
    len: usize,
    best: Option<(&'a Terminal<P>, usize)>,
}

impl<'a, P> TrieCursor<'a, P> {
    /// Descend one character. Returns `false` once no continuation exists;
    /// further calls keep returning `false` without changing the best
    /// match.
    pub fn step(&mut self, c: char) -> bool {
        let Some(node) = self.node else {
            return false;
        };
        match node.child(self.trie.fold(c)) {
            Some(child) => {
                self.len += 1;
                if let Some(t) = &child.terminal {
                    self.best = Some((t, self.len));
                }
                self.node = Some(child);
                true
            }
            None => {
                self.node = None;
                false
            }
        }
    }

    /// Longest terminal matched so far, with its length in characters.
    pub fn best(&self) -> Option<(&'a Terminal<P>, usize)> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie(images: &[(&str, usize)]) -> LexTrie<()> {
        let mut t = LexTrie::new(true);
        for (image, id) in images {
            t.add(image, *id, SymbolClass::Group, None, DupPolicy::Error)
                .unwrap();
        }
        t
    }

    fn longest(t: &LexTrie<()>, input: &str) -> Option<(usize, usize)> {
        let mut cur = t.cursor();
        for c in input.chars() {
            if !cur.step(c) {
                break;
            }
        }
        cur.best().map(|(term, len)| (term.id, len))
    }

    #[test]
    fn exact_lookup_finds_inserted_terminals() {
        let t = trie(&[(":-", 1), (":", 2), ("?-", 3)]);
        assert_eq!(t.find(":-").unwrap().id, 1);
        assert_eq!(t.find(":").unwrap().id, 2);
        assert!(t.find("?").is_none());
    }

    #[test]
    fn streaming_match_prefers_longest() {
        let t = trie(&[(":", 1), (":-", 2), (":--", 3)]);
        assert_eq!(longest(&t, ":-x"), Some((2, 2)));
        assert_eq!(longest(&t, ":--"), Some((3, 3)));
        assert_eq!(longest(&t, ":x"), Some((1, 1)));
    }

    #[test]
    fn prefix_fallback_when_continuation_dies() {
        // A strict prefix followed by a non-matching character returns the
        // longest terminal that is a prefix.
        let t = trie(&[("abc", 1), ("a", 2)]);
        assert_eq!(longest(&t, "abx"), Some((2, 1)));
        assert_eq!(longest(&t, "abc"), Some((1, 3)));
        assert_eq!(longest(&t, "x"), None);
    }

    #[test]
    fn remove_prunes_garbage_chains() {
        let mut t = trie(&[("abc", 1), ("ab", 2)]);
        assert!(t.remove("abc").is_some());
        assert!(t.find("abc").is_none());
        assert_eq!(t.find("ab").unwrap().id, 2);
        // Removing "ab" leaves nothing reachable under 'a'.
        assert!(t.remove("ab").is_some());
        assert!(t.find("a").is_none());
        assert!(t.root.children.is_empty());
        assert!(t.remove("ab").is_none());
    }

    #[test]
    fn duplicate_policies() {
        let mut t = LexTrie::<()>::new(true);
        t.add("x", 1, SymbolClass::Group, None, DupPolicy::Error)
            .unwrap();
        t.add("x", 2, SymbolClass::Group, None, DupPolicy::Ignore)
            .unwrap();
        assert_eq!(t.find("x").unwrap().id, 1);
        t.add("x", 3, SymbolClass::Group, None, DupPolicy::Overwrite)
            .unwrap();
        assert_eq!(t.find("x").unwrap().id, 3);
        assert!(
            t.add("x", 4, SymbolClass::Group, None, DupPolicy::Error)
                .is_err()
        );
        assert!(t.images_for(1).is_empty());
        assert_eq!(t.images_for(3), ["x"]);
    }

    #[test]
    fn case_insensitive_folds_lookups() {
        let mut t = LexTrie::<()>::new(false);
        t.add("Define", 7, SymbolClass::Meta, None, DupPolicy::Error)
            .unwrap();
        assert_eq!(t.find("define").unwrap().id, 7);
        assert_eq!(t.find("DEFINE").unwrap().id, 7);
        assert_eq!(longest_ci(&t, "DeFiNe "), Some((7, 6)));
    }

    fn longest_ci(t: &LexTrie<()>, input: &str) -> Option<(usize, usize)> {
        let mut cur = t.cursor();
        for c in input.chars() {
            if !cur.step(c) {
                break;
            }
        }
        cur.best().map(|(term, len)| (term.id, len))
    }

    #[test]
    fn reverse_index_tracks_all_images_of_an_id() {
        let mut t = LexTrie::<()>::new(true);
        t.add("[", 9, SymbolClass::Group, None, DupPolicy::Error)
            .unwrap();
        t.add("(|", 9, SymbolClass::Group, None, DupPolicy::Error)
            .unwrap();
        let mut images: Vec<_> = t.images_for(9).iter().map(|s| s.as_str()).collect();
        images.sort();
        assert_eq!(images, ["(|", "["]);
        t.remove("(|");
        assert_eq!(t.images_for(9), ["["]);
    }

    #[test]
    fn payload_can_be_attached_in_place() {
        let mut t = LexTrie::<u32>::new(true);
        t.add("+", 5, SymbolClass::Group, None, DupPolicy::Error)
            .unwrap();
        let term = t.find_mut("+").unwrap();
        term.payload = Some(500);
        term.class = SymbolClass::Operator;
        assert_eq!(t.find("+").unwrap().payload, Some(500));
        assert_eq!(t.find("+").unwrap().class, SymbolClass::Operator);
    }
}
