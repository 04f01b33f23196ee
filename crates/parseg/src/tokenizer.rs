use regex::Regex;

use crate::{
    span::Span,
    token::{Token, TokenKind, Tokenizer},
};

/// Tokenizer driven by an ordered list of regular expressions, the first pattern matching at
/// the current position wins.
#[derive(Clone, Default)]
pub struct RegexTokenizer {
    skip: Option<Regex>,
    rules: Vec<(TokenKind, Regex)>,
    fallback: Option<TokenKind>,
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\A(?:{pattern})"))
}

impl RegexTokenizer {
    pub fn new() -> RegexTokenizer {
        Self::default()
    }
    /// Text matched by `pattern` (whitespace, comments) is dropped between tokens.
    pub fn skip(mut self, pattern: &str) -> Result<RegexTokenizer, regex::Error> {
        self.skip = Some(anchored(pattern)?);
        Ok(self)
    }
    pub fn rule(mut self, kind: TokenKind, pattern: &str) -> Result<RegexTokenizer, regex::Error> {
        self.rules.push((kind, anchored(pattern)?));
        Ok(self)
    }
    /// Text that no rule matches becomes a token of this kind, spanning up to the next whitespace.
    pub fn fallback(mut self, kind: Option<TokenKind>) -> RegexTokenizer {
        self.fallback = kind;
        self
    }
    pub fn scanner<'a>(&'a self, source: &'a str) -> Scanner<'a> {
        Scanner {
            tokenizer: self,
            source,
            position: 0,
        }
    }
}

impl Tokenizer for RegexTokenizer {
    fn scan<'a>(&'a self, source: &'a str) -> Box<dyn Iterator<Item = Token> + 'a> {
        Box::new(self.scanner(source))
    }
}

pub struct Scanner<'a> {
    tokenizer: &'a RegexTokenizer,
    source: &'a str,
    position: usize,
}

impl Scanner<'_> {
    pub fn position(&self) -> usize {
        self.position
    }
    fn skip(&mut self) {
        let Some(skip) = &self.tokenizer.skip else {
            return;
        };
        while let Some(m) = skip.find(&self.source[self.position..]) {
            if m.end() == 0 {
                break;
            }
            self.position += m.end();
        }
    }
    fn token(&mut self, kind: TokenKind, len: usize) -> Token {
        let start = self.position;
        self.position += len;
        Token {
            kind,
            span: Span::new(start as u32, self.position as u32),
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;
    fn next(&mut self) -> Option<Token> {
        self.skip();

        let rest = &self.source[self.position..];
        let first = rest.chars().next()?;

        for (kind, regex) in &self.tokenizer.rules {
            if let Some(m) = regex.find(rest) {
                if m.end() > 0 {
                    return Some(self.token(*kind, m.end()));
                }
            }
        }

        match self.tokenizer.fallback {
            Some(kind) => {
                let len = first.len_utf8();
                let len = rest[len..]
                    .find(char::is_whitespace)
                    .map_or(rest.len(), |end| end + len);
                Some(self.token(kind, len))
            }
            None => {
                log::warn!(
                    "No token pattern matches {:?} at offset {}, stopping",
                    first,
                    self.position
                );
                self.position = self.source.len();
                None
            }
        }
    }
}
