use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    error::GrammarError,
    grammar::{ExprId, Grammar, NonTerminalId, Repeat, SeparatorPolicy},
    tokenizer::RegexTokenizer,
};

/// A grammar with its tokenizer as read from JSON.
///
/// ```json
/// {
///     "tokens": [{ "name": "INTEGER", "pattern": "\\d+" }],
///     "skip": "\\s+",
///     "rules": { "start": { "repeat": { "content": { "token": "INTEGER" } } } },
///     "start": "start"
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarDescription {
    pub tokens: Vec<TokenRule>,
    #[serde(default)]
    pub skip: Option<String>,
    /// Name of the token kind given to text no pattern matches.
    #[serde(default)]
    pub fallback: Option<String>,
    pub rules: BTreeMap<String, ExprDescription>,
    /// Non-terminals which delimit blocks.
    #[serde(default)]
    pub cut: Vec<String>,
    pub start: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenRule {
    pub name: String,
    pub pattern: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExprDescription {
    Token(String),
    NonTerminal(String),
    Empty,
    Optional(Box<ExprDescription>),
    Alternation(Vec<ExprDescription>),
    Sequence(Vec<ExprDescription>),
    Repeat(RepeatDescription),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatDescription {
    pub content: Box<ExprDescription>,
    #[serde(default)]
    pub separator: Option<Box<ExprDescription>>,
    #[serde(default)]
    pub leading: SeparatorPolicy,
    #[serde(default)]
    pub trailing: SeparatorPolicy,
}

pub struct BuiltGrammar {
    pub grammar: Grammar,
    pub tokenizer: RegexTokenizer,
    pub start: NonTerminalId,
}

impl GrammarDescription {
    pub fn build(&self) -> Result<BuiltGrammar, GrammarError> {
        let mut grammar = Grammar::new();

        let mut tokenizer = RegexTokenizer::new();
        for TokenRule { name, pattern } in &self.tokens {
            let kind = grammar.token(name);
            tokenizer = tokenizer
                .rule(kind, pattern)
                .map_err(|error| GrammarError::InvalidPattern {
                    name: name.clone(),
                    error,
                })?;
        }
        if let Some(skip) = &self.skip {
            tokenizer = tokenizer
                .skip(skip)
                .map_err(|error| GrammarError::InvalidPattern {
                    name: "skip".to_owned(),
                    error,
                })?;
        }
        if let Some(fallback) = &self.fallback {
            tokenizer = tokenizer.fallback(Some(grammar.token(fallback)));
        }

        for name in self.rules.keys() {
            grammar.non_terminal(name);
        }
        for (name, rule) in &self.rules {
            let expr = self.lower(&mut grammar, rule)?;
            let id = self.rule_non_terminal(&grammar, name)?;
            grammar.set_rule(id, expr);
        }
        for name in &self.cut {
            let id = self.rule_non_terminal(&grammar, name)?;
            grammar.set_cut(id, true);
        }
        let start = self.rule_non_terminal(&grammar, &self.start)?;

        Ok(BuiltGrammar {
            grammar,
            tokenizer,
            start,
        })
    }

    fn rule_non_terminal(
        &self,
        grammar: &Grammar,
        name: &str,
    ) -> Result<NonTerminalId, GrammarError> {
        grammar
            .find_non_terminal(name)
            .filter(|_| self.rules.contains_key(name))
            .ok_or_else(|| GrammarError::UndefinedNonTerminal(name.to_owned()))
    }

    fn lower(&self, grammar: &mut Grammar, expr: &ExprDescription) -> Result<ExprId, GrammarError> {
        let id = match expr {
            ExprDescription::Token(name) => {
                let kind = grammar
                    .find_token(name)
                    .ok_or_else(|| GrammarError::UnknownToken(name.clone()))?;
                grammar.t(kind)
            }
            ExprDescription::NonTerminal(name) => {
                let id = self.rule_non_terminal(grammar, name)?;
                grammar.nt(id)
            }
            ExprDescription::Empty => grammar.empty(),
            ExprDescription::Optional(inner) => {
                let inner = self.lower(grammar, inner)?;
                grammar.opt(inner)
            }
            ExprDescription::Alternation(branches) => {
                let branches = branches
                    .iter()
                    .map(|branch| self.lower(grammar, branch))
                    .collect::<Result<Vec<_>, _>>()?;
                grammar.alt(branches)
            }
            ExprDescription::Sequence(items) => {
                let items = items
                    .iter()
                    .map(|item| self.lower(grammar, item))
                    .collect::<Result<Vec<_>, _>>()?;
                grammar.seq_all(items)
            }
            ExprDescription::Repeat(repeat) => {
                let content = self.lower(grammar, &repeat.content)?;
                let separator = match &repeat.separator {
                    Some(separator) => self.lower(grammar, separator)?,
                    None => grammar.empty(),
                };
                grammar.repeat_with(Repeat {
                    content,
                    separator,
                    leading: repeat.leading,
                    trailing: repeat.trailing,
                })
            }
        };
        Ok(id)
    }
}
