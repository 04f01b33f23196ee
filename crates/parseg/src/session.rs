use std::{rc::Rc, sync::Arc};

use serde::Deserialize;

use crate::{
    error::EditError,
    factory::{Change, TokenFactory},
    grammar::{Grammar, NonTerminalId},
    parser::ParserOptions,
    result::ParseResult,
    span::Span,
    token::Tokenizer,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub parser: ParserOptions,
    /// Reparse an erroneous edit with the invalidated region widened to whole blocks.
    pub change_based_error_recovery: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            parser: ParserOptions::default(),
            change_based_error_recovery: true,
        }
    }
}

/// Parses a document as it is being edited.
pub struct ParsingSession {
    grammar: Grammar,
    tokenizer: Arc<dyn Tokenizer>,
    start: NonTerminalId,
    config: SessionConfig,
    last_result: Option<Rc<ParseResult>>,
    last_successful_result: Option<Rc<ParseResult>>,
}

impl ParsingSession {
    pub fn new(
        grammar: Grammar,
        tokenizer: Arc<dyn Tokenizer>,
        start: NonTerminalId,
        config: SessionConfig,
    ) -> ParsingSession {
        ParsingSession {
            grammar,
            tokenizer,
            start,
            config,
            last_result: None,
            last_successful_result: None,
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
    pub fn last_result(&self) -> Option<&ParseResult> {
        self.last_result.as_deref()
    }
    pub fn last_successful_result(&self) -> Option<&ParseResult> {
        self.last_successful_result.as_deref()
    }
    pub fn source(&self) -> &str {
        self.last_result
            .as_ref()
            .map_or("", |result| result.factory().source())
    }

    /// Applies the changes to the document and reparses it.
    pub fn update(&mut self, changes: &[Change]) -> Result<&ParseResult, EditError> {
        let factory = match &self.last_result {
            Some(last) => last.factory().update(changes)?,
            None => TokenFactory::new(self.tokenizer.clone(), "").update(changes)?,
        };

        let first = ParseResult::parse(
            &self.grammar,
            factory.reset(),
            self.start,
            self.config.parser,
        );
        if !first.has_error() {
            log::debug!("parsed without errors");
            return Ok(self.store(first));
        }
        log::debug!("first pass found {} errors", first.error_trees().len());

        let last_ok = self
            .last_successful_result
            .clone()
            .filter(|_| self.config.change_based_error_recovery);
        let Some(last_ok) = last_ok else {
            log::debug!("change based recovery skipped");
            return Ok(self.store(ParseResult { factory, ..first }));
        };

        let factory = self.widen_deletions(factory, &last_ok)?;
        let options = ParserOptions {
            error_tolerant: true,
            skip_unknown_tokens: true,
        };
        let second = ParseResult::parse(&self.grammar, factory, self.start, options);
        log::debug!(
            "change based recovery finished with {} errors",
            second.error_trees().len()
        );
        Ok(self.store(second))
    }

    /// For an edit which only deleted tokens, marks every block of the last successful tree
    /// holding a deleted token as changed.
    fn widen_deletions(
        &self,
        factory: TokenFactory,
        last_ok: &ParseResult,
    ) -> Result<TokenFactory, EditError> {
        let deleted = factory.deleted_tokens();
        if deleted.is_empty()
            || !factory.inserted_tokens().is_empty()
            || factory.base_source() != last_ok.factory().source()
        {
            return Ok(factory);
        }

        let mut blocks: Vec<Span> = Vec::new();
        for (id, _) in deleted {
            let Some(block) = last_ok.block_range_for_deleted_token(&self.grammar, id) else {
                continue;
            };
            if !blocks.contains(&block) {
                log::debug!("widening deletion of {id:?} to block {block}");
                blocks.push(block);
            }
        }
        if blocks.is_empty() {
            return Ok(factory);
        }

        let mut widened = last_ok.factory().clone();
        for block in blocks {
            widened = widened.with_additional_change(block)?;
        }
        widened.update(factory.changes())
    }

    fn store(&mut self, result: ParseResult) -> &ParseResult {
        let result = if result.has_error() {
            Rc::new(result)
        } else {
            let result = Rc::new(result.into_reset());
            self.last_successful_result = Some(result.clone());
            result
        };
        &**self.last_result.insert(result)
    }
}
