use std::fmt::Debug;

use cranelift_bitset::CompoundBitSet;
use cranelift_entity::{entity_impl, EntityRef};

use crate::span::Span;

/// The type of a token, interned by the [`Grammar`](crate::grammar::Grammar).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TokenKind(u32);
entity_impl! { TokenKind }

/// Index of a token within one tokenization pass.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TokenId(u32);
entity_impl! { TokenId }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Produces tokens in increasing offset order.
pub trait Tokenizer: Send + Sync {
    fn scan<'a>(&'a self, source: &'a str) -> Box<dyn Iterator<Item = Token> + 'a>;
}

#[derive(Clone)]
pub struct TokenSet(CompoundBitSet);

impl TokenSet {
    pub fn new() -> TokenSet {
        TokenSet(CompoundBitSet::new())
    }
    pub fn contains(&self, kind: TokenKind) -> bool {
        self.0.contains(kind.index())
    }
    /// Returns whether the kind was newly added.
    pub fn insert(&mut self, kind: TokenKind) -> bool {
        if self.contains(kind) {
            return false;
        }
        self.0.insert(kind.index());
        true
    }
    /// Returns whether anything was added.
    pub fn union_with(&mut self, other: &TokenSet) -> bool {
        let mut changed = false;
        for kind in other.iter() {
            changed |= self.insert(kind);
        }
        changed
    }
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
    pub fn iter(&self) -> impl Iterator<Item = TokenKind> + '_ {
        self.0.iter().map(TokenKind::new)
    }
}

impl Default for TokenSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TokenSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for TokenSet {}

impl Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<TokenKind> for TokenSet {
    fn from_iter<T: IntoIterator<Item = TokenKind>>(iter: T) -> Self {
        let mut set = TokenSet::new();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}
