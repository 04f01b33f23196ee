use std::sync::Arc;

use cranelift_entity::{EntityRef, PrimaryMap};
use serde::Deserialize;

use crate::{
    error::EditError,
    linemap::{LineMap, Position},
    span::Span,
    token::{Token, TokenId, TokenKind, Tokenizer},
};

/// Replaces the text between `start` and `end` with `text`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Change {
    pub text: String,
    pub start: Position,
    pub end: Position,
}

impl Change {
    pub fn insert(at: Position, text: impl Into<String>) -> Change {
        Change {
            text: text.into(),
            start: at,
            end: at,
        }
    }
}

struct Snapshot {
    source: String,
    tokens: PrimaryMap<TokenId, Token>,
}

impl Snapshot {
    fn tokenize(tokenizer: &dyn Tokenizer, source: String) -> Snapshot {
        let mut tokens = PrimaryMap::new();
        for token in tokenizer.scan(&source) {
            tokens.push(token);
        }
        Snapshot { source, tokens }
    }
}

#[derive(Clone)]
struct History {
    base: Arc<Snapshot>,
    changes: Vec<Change>,
    /// Covers every edit in the coordinates of the current source, widened to the tokens it touches.
    changed: Option<Span>,
}

/// The tokens of one source snapshot, together with the edits that produced it from the previous one.
#[derive(Clone)]
pub struct TokenFactory {
    tokenizer: Arc<dyn Tokenizer>,
    current: Arc<Snapshot>,
    history: Option<History>,
}

impl TokenFactory {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, source: impl Into<String>) -> TokenFactory {
        let current = Snapshot::tokenize(&*tokenizer, source.into());
        TokenFactory {
            tokenizer,
            current: Arc::new(current),
            history: None,
        }
    }

    /// Applies `changes` on top of the edits already recorded against the base snapshot and
    /// tokenizes the result.
    pub fn update(&self, changes: &[Change]) -> Result<TokenFactory, EditError> {
        if changes.is_empty() {
            return Ok(self.clone());
        }

        let (base, mut all) = match &self.history {
            Some(history) => (history.base.clone(), history.changes.clone()),
            None => (self.current.clone(), Vec::new()),
        };
        all.extend_from_slice(changes);

        let (source, changed) = apply_changes(&base.source, &all)?;
        let current = Snapshot::tokenize(&*self.tokenizer, source);
        let changed = changed.map(|span| widen(span, &current.tokens));

        log::trace!(
            "tokenized {} tokens after {} changes, changed region {:?}",
            current.tokens.len(),
            all.len(),
            changed
        );

        Ok(TokenFactory {
            tokenizer: self.tokenizer.clone(),
            current: Arc::new(current),
            history: Some(History {
                base,
                changes: all,
                changed,
            }),
        })
    }
    /// The same tokens with the edit history dropped, the current source becomes the base.
    pub fn reset(&self) -> TokenFactory {
        TokenFactory {
            tokenizer: self.tokenizer.clone(),
            current: self.current.clone(),
            history: None,
        }
    }
    /// Marks `span` of the current source as changed by replacing it with itself.
    pub fn with_additional_change(&self, span: Span) -> Result<TokenFactory, EditError> {
        let source = self.source();
        let map = LineMap::new(source);
        let change = Change {
            text: span.as_str(source).to_owned(),
            start: map.offset_to_position(source, span.start()),
            end: map.offset_to_position(source, span.end()),
        };
        self.update(&[change])
    }

    pub fn source(&self) -> &str {
        &self.current.source
    }
    /// The source the recorded changes apply to.
    pub fn base_source(&self) -> &str {
        match &self.history {
            Some(history) => &history.base.source,
            None => &self.current.source,
        }
    }
    pub fn changes(&self) -> &[Change] {
        match &self.history {
            Some(history) => &history.changes,
            None => &[],
        }
    }
    pub fn has_changes(&self) -> bool {
        self.changed_range().is_some()
    }
    pub fn changed_range(&self) -> Option<Span> {
        self.history.as_ref()?.changed
    }

    pub fn len(&self) -> usize {
        self.current.tokens.len()
    }
    pub fn is_empty(&self) -> bool {
        self.current.tokens.is_empty()
    }
    #[track_caller]
    pub fn token(&self, id: TokenId) -> &Token {
        &self.current.tokens[id]
    }
    pub fn tokens(&self) -> impl Iterator<Item = (TokenId, &Token)> + '_ {
        self.current.tokens.iter()
    }
    #[track_caller]
    pub fn token_text(&self, id: TokenId) -> &str {
        self.token(id).span.as_str(self.source())
    }
    /// Text of a token returned by [`TokenFactory::deleted_tokens`].
    pub fn base_token_text(&self, token: &Token) -> &str {
        token.span.as_str(self.base_source())
    }
    pub fn cursor(&self) -> TokenCursor<'_> {
        TokenCursor {
            tokens: &self.current.tokens,
            index: 0,
        }
    }

    pub fn token_changed(&self, id: TokenId) -> bool {
        match self.changed_range() {
            Some(changed) => self.token(id).span.touches(changed),
            None => false,
        }
    }
    /// Tokens of the current snapshot which come from the changed region.
    pub fn inserted_tokens(&self) -> Vec<TokenId> {
        self.tokens()
            .filter(|&(id, _)| self.token_changed(id))
            .map(|(id, _)| id)
            .collect()
    }
    /// Tokens of the base snapshot in the changed region which have no counterpart among the
    /// inserted ones. Their spans point into [`TokenFactory::base_source`].
    pub fn deleted_tokens(&self) -> Vec<(TokenId, Token)> {
        let (Some(history), Some(changed)) = (&self.history, self.changed_range()) else {
            return Vec::new();
        };

        let current = &self.current.tokens;
        let prefix = current
            .values()
            .take_while(|token| token.span.end() <= changed.start())
            .count();
        let suffix = current
            .values()
            .rev()
            .take_while(|token| token.span.start() >= changed.end())
            .count();

        let mut inserted: Vec<(TokenKind, &str)> = self
            .inserted_tokens()
            .into_iter()
            .map(|id| (self.token(id).kind, self.token_text(id)))
            .collect();

        let base = &history.base;
        let middle = base.tokens.len().saturating_sub(suffix).saturating_sub(prefix);
        base.tokens
            .iter()
            .skip(prefix)
            .take(middle)
            .filter(|(_, token)| {
                let key = (token.kind, token.span.as_str(&base.source));
                match inserted.iter().position(|other| *other == key) {
                    Some(i) => {
                        inserted.swap_remove(i);
                        false
                    }
                    None => true,
                }
            })
            .map(|(id, token)| (id, *token))
            .collect()
    }
    pub fn token_span(&self, id: TokenId) -> Span {
        self.token(id).span
    }
}

/// Applies the changes in order to a growing buffer, tracking the region they touched.
fn apply_changes(base: &str, changes: &[Change]) -> Result<(String, Option<Span>), EditError> {
    let mut source = base.to_owned();
    let mut changed: Option<Span> = None;

    for change in changes {
        let map = LineMap::new(&source);
        let start = map.position_to_offset(&source, change.start)?;
        let end = map.position_to_offset(&source, change.end)?;
        if start > end {
            return Err(EditError::InvertedRange {
                start: change.start,
                end: change.end,
            });
        }

        source.replace_range(start as usize..end as usize, &change.text);

        let inserted_end = start + change.text.len() as u32;
        let shift = |pos: u32, inside: u32| {
            if pos <= start {
                pos
            } else if pos >= end {
                pos - (end - start) + change.text.len() as u32
            } else {
                inside
            }
        };
        let edit = Span::new(start, inserted_end);
        changed = Some(match changed {
            Some(prev) => {
                Span::new(shift(prev.start(), start), shift(prev.end(), inserted_end)).cover(edit)
            }
            None => edit,
        });
    }

    Ok((source, changed))
}

/// Extends the span over every token it touches.
fn widen(span: Span, tokens: &PrimaryMap<TokenId, Token>) -> Span {
    tokens
        .values()
        .filter(|token| token.span.touches(span))
        .fold(span, |span, token| span.cover(token.span))
}

/// Walks the tokens of a [`TokenFactory`] front to back.
#[derive(Clone)]
pub struct TokenCursor<'a> {
    tokens: &'a PrimaryMap<TokenId, Token>,
    index: usize,
}

impl<'a> TokenCursor<'a> {
    pub fn current(&self) -> Option<(TokenId, &'a Token)> {
        let id = TokenId::new(self.index);
        self.tokens.get(id).map(|token| (id, token))
    }
    pub fn current_id(&self) -> Option<TokenId> {
        self.current().map(|(id, _)| id)
    }
    /// Moves to the next token, returning the one which was current.
    pub fn advance(&mut self) -> Option<TokenId> {
        let id = self.current_id()?;
        self.index += 1;
        Some(id)
    }
    pub fn position(&self) -> usize {
        self.index
    }
}
