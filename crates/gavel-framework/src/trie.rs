//! Prefix trie over whitespace-separated command tokens.
//!
//! Free-text commands are looked up by their display name, which may span
//! several words (`list modules`). The trie stores one node per token:
//!
//! ```text
//! root ─ "list" ─┬─ "modules" ▣
//!                └─ "commands" ▣
//!      ─ "ping" ▣
//! ```
//!
//! Lookup always prefers the longest match. At each node it first descends
//! into the child matching the next token and only falls back to the leaf at
//! the current node when the deeper walk finds nothing. The text after the
//! last matched token, taken from the original string, is the argument
//! remainder.

use std::collections::HashMap;

/// A successful lookup.
#[derive(Debug, PartialEq, Eq)]
pub struct TrieMatch<'t, 's, T> {
    pub value: &'t T,
    /// Unconsumed input, leading whitespace trimmed.
    pub remainder: &'s str,
}

#[derive(Debug, Clone)]
struct Node<T> {
    leaf: Option<T>,
    children: HashMap<String, Node<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            leaf: None,
            children: HashMap::new(),
        }
    }
}

/// Token trie keyed by command display names.
#[derive(Debug, Clone)]
pub struct CommandTrie<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for CommandTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CommandTrie<T> {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }

    /// Inserts `value` under `name` unless that name is already taken.
    ///
    /// Returns `false` for an empty name or an occupied slot; the existing
    /// entry is kept.
    pub fn insert(&mut self, name: &str, value: T) -> bool {
        let mut tokens = name.split_whitespace().peekable();
        if tokens.peek().is_none() {
            return false;
        }

        let mut node = &mut self.root;
        for token in tokens {
            node = node.children.entry(token.to_string()).or_default();
        }
        if node.leaf.is_some() {
            return false;
        }
        node.leaf = Some(value);
        self.len += 1;
        true
    }

    /// Finds the longest command that prefixes `text`.
    pub fn find<'t, 's>(&'t self, text: &'s str) -> Option<TrieMatch<'t, 's, T>> {
        let spans = token_spans(text);
        let (value, end) = walk(&self.root, text, &spans, 0)?;
        Some(TrieMatch {
            value,
            remainder: text[end..].trim_start(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every stored value, in no particular order.
    pub fn values(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.len);
        collect(&self.root, &mut out);
        out
    }
}

fn walk<'t, T>(
    node: &'t Node<T>,
    text: &str,
    spans: &[(usize, usize)],
    depth: usize,
) -> Option<(&'t T, usize)> {
    if let Some(&(start, end)) = spans.get(depth)
        && let Some(child) = node.children.get(&text[start..end])
        && let Some(hit) = walk(child, text, spans, depth + 1)
    {
        return Some(hit);
    }

    // The root never holds a command.
    let consumed = depth.checked_sub(1)?;
    node.leaf.as_ref().map(|value| (value, spans[consumed].1))
}

fn collect<'t, T>(node: &'t Node<T>, out: &mut Vec<&'t T>) {
    if let Some(value) = &node.leaf {
        out.push(value);
    }
    for child in node.children.values() {
        collect(child, out);
    }
}

/// Byte spans of each whitespace-separated token.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}
