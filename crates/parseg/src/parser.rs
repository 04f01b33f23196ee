use serde::Deserialize;

use crate::{
    factory::{TokenCursor, TokenFactory},
    grammar::{ExprId, ExprKind, Grammar, NonTerminalId, Repeat, SeparatorPolicy},
    token::{TokenId, TokenKind, TokenSet},
    tree::{Tree, TreeKind},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserOptions {
    /// Embed missing nodes and continue, otherwise the parse stops at the first error.
    pub error_tolerant: bool,
    /// Drop tokens which nothing in the current context could consume.
    pub skip_unknown_tokens: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            error_tolerant: true,
            skip_unknown_tokens: true,
        }
    }
}

/// Unwinds a strict parse, carrying the missing node which stopped it.
struct Abort(Tree);

type Parsed<T = Tree> = Result<T, Abort>;

struct Frame {
    non_terminal: NonTerminalId,
    cut: bool,
    entry: Option<TokenId>,
    /// The first token of the non-terminal lies in the changed region.
    entered_changed: bool,
}

/// A recursive descent LL(1) parser over the tokens of one factory.
///
/// When the factory carries edits, leaving the changed region inside a cut non-terminal which
/// was entered in it makes the rest of that non-terminal see the end of input.
pub struct Parser<'a> {
    grammar: &'a Grammar,
    factory: &'a TokenFactory,
    cursor: TokenCursor<'a>,
    options: ParserOptions,
    frames: Vec<Frame>,
    in_change: bool,
    change_start: Option<TokenId>,
    /// Frame depth at which the virtual end of input was started.
    end_of_change: Option<usize>,
    skipped: Vec<TokenId>,
}

impl<'a> Parser<'a> {
    pub fn new(grammar: &'a Grammar, factory: &'a TokenFactory, options: ParserOptions) -> Self {
        Self {
            grammar,
            factory,
            cursor: factory.cursor(),
            options,
            frames: Vec::new(),
            in_change: false,
            change_start: None,
            end_of_change: None,
            skipped: Vec::new(),
        }
    }

    /// Parses the whole input as `start`, returning the tree and the skipped tokens.
    ///
    /// In strict mode the first error aborts the parse and the tree is the lone missing node.
    pub fn parse(mut self, start: NonTerminalId) -> (Tree, Vec<TokenId>) {
        self.observe_position();

        let rule = self.grammar.get_non_terminal(start).rule;
        let follow = TokenSet::new();
        let tree = match self.enter(start, |p| p.parse_rule(rule, &follow)) {
            Ok(child) => Tree::new(rule, TreeKind::NonTerminal(start, Some(Box::new(child)))),
            Err(Abort(missing)) => {
                log::trace!("parse aborted at {:?}", missing.kind);
                return (missing, self.skipped);
            }
        };

        if self.options.skip_unknown_tokens {
            while let Some(id) = self.cursor.advance() {
                log::trace!("skipping trailing {}", self.describe(id));
                self.skipped.push(id);
            }
        }

        (tree, self.skipped)
    }

    fn describe(&self, id: TokenId) -> String {
        let kind = self.factory.token(id).kind;
        format!(
            "{} {:?}",
            self.grammar.token_name(kind),
            self.factory.token_text(id)
        )
    }

    fn current_kind(&self) -> Option<TokenKind> {
        if self.end_of_change.is_some() {
            return None;
        }
        self.cursor.current().map(|(_, token)| token.kind)
    }
    fn at(&self, tokens: &TokenSet) -> bool {
        self.current_kind().is_some_and(|kind| tokens.contains(kind))
    }
    fn advance(&mut self) -> Option<TokenId> {
        let id = self.cursor.advance();
        self.observe_position();
        id
    }

    /// Tracks transitions into and out of the changed region of the factory.
    fn observe_position(&mut self) {
        if !self.factory.has_changes() {
            return;
        }
        let Some(id) = self.cursor.current_id() else {
            return;
        };
        let changed = self.factory.token_changed(id);
        match (self.in_change, changed) {
            (false, true) => {
                log::trace!("entering changed input at {}", self.describe(id));
                self.in_change = true;
                self.change_start = Some(id);
            }
            (true, false) => {
                log::trace!("leaving changed input at {}", self.describe(id));
                self.in_change = false;
                self.leave_change();
            }
            _ => {}
        }
    }
    fn leave_change(&mut self) {
        let boundary = self
            .frames
            .iter()
            .position(|frame| frame.cut && frame.entered_changed)
            .or_else(|| {
                let start = self.change_start?;
                self.frames
                    .iter()
                    .rposition(|frame| frame.entry == Some(start))
            });

        if let Some(depth) = boundary {
            let depth = self.end_of_change.map_or(depth, |current| current.min(depth));
            log::trace!(
                "virtual end of input until {} returns",
                self.grammar
                    .get_non_terminal(self.frames[depth].non_terminal)
                    .name
            );
            self.end_of_change = Some(depth);
        }
    }

    fn enter(&mut self, nt: NonTerminalId, fun: impl FnOnce(&mut Self) -> Parsed) -> Parsed {
        let grammar = self.grammar;
        let non_terminal = grammar.get_non_terminal(nt);
        let entry = self.cursor.current_id();
        let depth = self.frames.len();
        log::trace!(
            "{:indent$}> {} at {:?}",
            "",
            non_terminal.name,
            entry,
            indent = depth * 2
        );

        self.frames.push(Frame {
            non_terminal: nt,
            cut: non_terminal.cut,
            entry,
            entered_changed: entry.is_some_and(|id| self.factory.token_changed(id)),
        });
        let result = fun(self);
        self.frames.pop();

        if self.end_of_change.is_some_and(|end| depth <= end) {
            log::trace!("virtual end of input lifted");
            self.end_of_change = None;
        }
        log::trace!(
            "{:indent$}< {}{}",
            "",
            non_terminal.name,
            if result.is_err() { " (aborted)" } else { "" },
            indent = depth * 2
        );
        result
    }

    fn missing(&self, expr: ExprId) -> Parsed<TreeKind> {
        let found = self.cursor.current_id();
        log::trace!(
            "missing {} at {:?}",
            self.grammar.display_expr(expr),
            found
        );
        if self.options.error_tolerant {
            Ok(TreeKind::Missing(found))
        } else {
            Err(Abort(Tree::new(expr, TreeKind::Missing(found))))
        }
    }

    /// Advances past tokens which are in none of the sets.
    fn skip_unless(&mut self, sets: &[&TokenSet]) {
        while let Some(kind) = self.current_kind() {
            if sets.iter().any(|set| set.contains(kind)) {
                return;
            }
            let Some(id) = self.advance() else {
                return;
            };
            log::trace!("skipping {}", self.describe(id));
            self.skipped.push(id);
        }
    }

    /// Parses the chain starting at `id`, `follow` holds what may come after the chain.
    fn parse_rule(&mut self, id: ExprId, follow: &TokenSet) -> Parsed {
        let grammar = self.grammar;
        let expr = grammar.expr(id);

        if self.options.skip_unknown_tokens {
            self.skip_unless(&[
                follow,
                grammar.consumable_tokens(id),
                &grammar.first_tokens(id).tokens,
            ]);
        }

        let mut inner_follow = follow.clone();
        if let Some(next) = expr.next {
            inner_follow.union_with(grammar.consumable_tokens(next));
        }

        let kind = match &expr.kind {
            ExprKind::Token(kind) => match self.cursor.current_id() {
                Some(token) if self.current_kind() == Some(*kind) => {
                    self.advance();
                    TreeKind::Token(token)
                }
                _ => self.missing(id)?,
            },
            ExprKind::NonTerminal(nt) => {
                let rule = grammar.get_non_terminal(*nt).rule;
                let first = grammar.first_tokens(rule);
                if self.at(&first.tokens) {
                    let child = self.enter(*nt, |p| p.parse_rule(rule, &inner_follow))?;
                    TreeKind::NonTerminal(*nt, Some(Box::new(child)))
                } else if first.nullable {
                    TreeKind::NonTerminal(*nt, None)
                } else {
                    self.missing(id)?
                }
            }
            ExprKind::Empty => TreeKind::Empty,
            ExprKind::Optional(inner) => {
                if self.at(&grammar.first_tokens(*inner).tokens) {
                    let child = self.parse_rule(*inner, &inner_follow)?;
                    TreeKind::Optional(Some(Box::new(child)))
                } else {
                    TreeKind::Optional(None)
                }
            }
            ExprKind::Alternation(branches) => {
                let matching = self.current_kind().and_then(|kind| {
                    branches
                        .iter()
                        .find(|&&branch| grammar.first_tokens(branch).contains(kind))
                });
                let chosen = matching.or_else(|| {
                    branches
                        .iter()
                        .find(|&&branch| grammar.first_tokens(branch).nullable)
                });
                match chosen {
                    Some(&branch) => {
                        let child = self.parse_rule(branch, &inner_follow)?;
                        TreeKind::Alternation(Box::new(child))
                    }
                    None => self.missing(id)?,
                }
            }
            ExprKind::Repeat(repeat) => self.parse_repeat(repeat, &inner_follow)?,
        };

        let next = match expr.next {
            Some(next) => Some(Box::new(self.parse_rule(next, follow)?)),
            None => None,
        };

        Ok(Tree {
            expr: id,
            kind,
            next,
        })
    }

    fn parse_repeat(&mut self, repeat: &Repeat, follow: &TokenSet) -> Parsed<TreeKind> {
        let grammar = self.grammar;
        let content = grammar.first_tokens(repeat.content);
        let separator = grammar.first_tokens(repeat.separator);

        let mut after_content = follow.clone();
        after_content.union_with(&separator.tokens);
        if separator.nullable {
            after_content.union_with(&content.tokens);
        }
        let mut after_separator = follow.clone();
        after_separator.union_with(&content.tokens);

        let mut items = Vec::new();

        let leading = match repeat.leading {
            SeparatorPolicy::Required => true,
            SeparatorPolicy::Optional => self.at(&separator.tokens),
            SeparatorPolicy::Prohibited => false,
        };
        if leading {
            items.push(self.parse_rule(repeat.separator, &after_separator)?);
        }
        if self.current_kind().is_none() {
            return Ok(TreeKind::Repeat(items));
        }

        loop {
            let before = self.cursor.position();

            items.push(self.parse_rule(repeat.content, &after_content)?);
            if self.options.skip_unknown_tokens {
                self.skip_unless(&[&after_content, &content.tokens]);
            }

            if separator.nullable && self.at(&content.tokens) {
                items.push(Tree::new(repeat.separator, TreeKind::Empty));
            } else if self.at(&separator.tokens) {
                items.push(self.parse_rule(repeat.separator, &after_separator)?);
                if !self.at(&content.tokens) && repeat.trailing != SeparatorPolicy::Prohibited {
                    break;
                }
            } else {
                if repeat.trailing == SeparatorPolicy::Required {
                    items.push(self.parse_rule(repeat.separator, &after_separator)?);
                }
                break;
            }

            if self.cursor.position() == before {
                log::trace!("repeat made no progress");
                break;
            }
        }

        Ok(TreeKind::Repeat(items))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cranelift_entity::EntityRef;

    use crate::{
        factory::TokenFactory,
        grammar::{Grammar, NonTerminalId, Repeat, SeparatorPolicy},
        result::ParseResult,
        test_support::{arithmetic, Arith},
        token::TokenId,
        tokenizer::RegexTokenizer,
        tree::{Tree, TreeKind},
    };

    use super::ParserOptions;

    fn parse_arith(source: &str, start: fn(&Arith) -> NonTerminalId) -> (Arith, ParseResult) {
        let arith = arithmetic();
        let factory = TokenFactory::new(arith.tokenizer.clone(), source);
        let result =
            ParseResult::parse(&arith.grammar, factory, start(&arith), ParserOptions::default());
        (arith, result)
    }

    #[test]
    fn two_expressions() {
        let (a, result) = parse_arith("123 (456)", |a| a.exprs);
        assert!(!result.has_error());
        assert!(result.skipped_tokens().is_empty());
        assert_eq!(
            result.display(&a.grammar).to_string(),
            "\
exprs
  expr
    term1
      term
        INTEGER \"123\"
  expr
    term1
      term
        LPAREN \"(\"
        expr
          term1
            term
              INTEGER \"456\"
        RPAREN \")\"
"
        );
    }

    #[test]
    fn operators_alternate_with_operands() {
        let (a, result) = parse_arith("1 + 2 * 3 - 4", |a| a.expr);
        assert!(!result.has_error());

        let TreeKind::NonTerminal(_, Some(repeat)) = &result.tree().kind else {
            panic!("expected a non-terminal");
        };
        let operands = repeat.repeat_contents(&a.grammar);
        let operators = repeat.repeat_separators(&a.grammar);
        assert_eq!(operands.len(), 3);
        assert_eq!(operators.len(), 2);
        assert_eq!(repeat.children().len(), 5);

        let factory = result.factory();
        let text = |tree: &Tree| {
            tree.tokens()
                .map(|id| factory.token_text(id))
                .collect::<Vec<_>>()
                .join(" ")
        };
        assert_eq!(text(operands[1]), "2 * 3");
        assert_eq!(text(operators[1]), "-");
    }

    #[test]
    fn missing_token_inside_parens() {
        let (a, result) = parse_arith("(123 +)", |a| a.term);
        assert_eq!(result.error_trees().len(), 1);
        assert_eq!(
            result.display(&a.grammar).to_string(),
            "\
term
  LPAREN \"(\"
  expr
    term1
      term
        INTEGER \"123\"
    PLUS \"+\"
    !missing RPAREN \")\"
  RPAREN \")\"
"
        );
    }

    #[test]
    fn strict_mode_aborts() {
        let arith = arithmetic();
        let factory = TokenFactory::new(arith.tokenizer.clone(), "(");
        let options = ParserOptions {
            error_tolerant: false,
            ..Default::default()
        };
        let result = ParseResult::parse(&arith.grammar, factory, arith.exprs, options);
        assert_eq!(result.tree().kind, TreeKind::Missing(None));
        assert!(result.tree().next.is_none());
        assert_eq!(result.error_trees().len(), 1);
    }

    #[test]
    fn strict_mode_accepts_valid_input() {
        let arith = arithmetic();
        let factory = TokenFactory::new(arith.tokenizer.clone(), "1 * (2 + 3)");
        let options = ParserOptions {
            error_tolerant: false,
            skip_unknown_tokens: false,
        };
        let result = ParseResult::parse(&arith.grammar, factory, arith.exprs, options);
        assert!(!result.has_error());
        assert!(matches!(result.tree().kind, TreeKind::NonTerminal(..)));
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let (_, result) = parse_arith("1 + $ 2", |a| a.exprs);
        assert!(!result.has_error());
        assert_eq!(result.skipped_tokens(), [TokenId::new(2)]);

        let (_, result) = parse_arith(")", |a| a.exprs);
        assert!(!result.has_error());
        assert_eq!(result.skipped_tokens(), [TokenId::new(0)]);
    }

    #[test]
    fn recovery_continues_after_missing() {
        let (a, result) = parse_arith("(1 3)", |a| a.exprs);
        let errors = result.error_trees();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, TreeKind::Missing(Some(TokenId::new(2))));
        assert_eq!(result.skipped_tokens(), [TokenId::new(3)]);
        assert_eq!(
            result.display(&a.grammar).to_string(),
            "\
exprs
  expr
    term1
      term
        LPAREN \"(\"
        expr
          term1
            term
              INTEGER \"1\"
        !missing INTEGER \"3\"
  expr
    term1
      term
        INTEGER \"3\"
"
        );
    }

    #[test]
    fn errors_stay_local() {
        let (a, broken) = parse_arith("(1) (2 +) (3)", |a| a.exprs);
        let (_, valid) = parse_arith("(1) (2) (3)", |a| a.exprs);
        assert_eq!(broken.error_trees().len(), 1);
        assert!(!valid.has_error());

        let exprs = |result: &ParseResult| {
            let TreeKind::NonTerminal(_, Some(repeat)) = &result.tree().kind else {
                panic!("expected a non-terminal");
            };
            repeat
                .repeat_contents(&a.grammar)
                .into_iter()
                .map(|expr| expr.display(&a.grammar, result.factory()).to_string())
                .collect::<Vec<_>>()
        };
        let broken = exprs(&broken);
        let valid = exprs(&valid);
        assert_eq!(broken.len(), 3);
        assert_eq!(broken[0], valid[0]);
        assert_eq!(broken[2], valid[2]);
        assert_ne!(broken[1], valid[1]);
    }

    #[test]
    fn empty_repeats_terminate() {
        let mut g = Grammar::new();
        let x = g.token("X");
        let start = g.non_terminal("start");
        let x_ref = g.t(x);
        let content = g.opt(x_ref);
        let empty = g.empty();
        let separator = g.opt(empty);
        let rule = g.repeat_with(Repeat {
            content,
            separator,
            leading: SeparatorPolicy::Optional,
            trailing: SeparatorPolicy::Optional,
        });
        g.set_rule(start, rule);

        let tokenizer = RegexTokenizer::new()
            .skip(r"\s+")
            .unwrap()
            .rule(x, "x")
            .unwrap()
            .fallback(Some(g.token("OTHER")));
        let factory = TokenFactory::new(Arc::new(tokenizer), "x x ? x");
        let result = ParseResult::parse(&g, factory, start, ParserOptions::default());
        assert!(!result.has_error());
        assert_eq!(result.skipped_tokens(), [TokenId::new(2)]);
    }

    /// `ITEM` separated by `COMMA` with the given separator policies.
    fn separated(
        leading: SeparatorPolicy,
        trailing: SeparatorPolicy,
    ) -> impl Fn(&str) -> ParseResult {
        let mut g = Grammar::new();
        let start = g.non_terminal("start");
        let item = g.token_ref("ITEM");
        let comma = g.token_ref("COMMA");
        let rule = g.repeat_with(Repeat {
            content: item,
            separator: comma,
            leading,
            trailing,
        });
        g.set_rule(start, rule);

        let tokenizer = RegexTokenizer::new()
            .skip(r"\s+")
            .unwrap()
            .rule(g.find_token("ITEM").unwrap(), "i")
            .unwrap()
            .rule(g.find_token("COMMA").unwrap(), ",")
            .unwrap();
        let tokenizer = Arc::new(tokenizer);

        move |source: &str| {
            let factory = TokenFactory::new(tokenizer.clone(), source);
            ParseResult::parse(&g, factory, start, ParserOptions::default())
        }
    }

    #[test]
    fn trailing_separator_policies() {
        use SeparatorPolicy::Prohibited;

        let optional = separated(Prohibited, SeparatorPolicy::Optional);
        assert!(!optional("i, i,").has_error());
        assert!(!optional("i, i").has_error());
        // the repeat ends at the trailing separator, the rest is left over
        let result = optional("i, , i");
        assert!(!result.has_error());
        assert_eq!(result.skipped_tokens(), [TokenId::new(2), TokenId::new(3)]);

        let prohibited = separated(Prohibited, Prohibited);
        assert!(!prohibited("i, i").has_error());
        assert_eq!(prohibited("i, i,").error_trees().len(), 1);
        assert_eq!(prohibited("i, , i").error_trees().len(), 1);

        let required = separated(Prohibited, SeparatorPolicy::Required);
        assert!(!required("i, i,").has_error());
        let result = required("i, i");
        let errors = result.error_trees();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, TreeKind::Missing(None));
    }

    #[test]
    fn leading_separator_policies() {
        use SeparatorPolicy::Prohibited;

        let items = |result: &ParseResult| {
            let TreeKind::NonTerminal(_, Some(repeat)) = &result.tree().kind else {
                panic!("expected a non-terminal");
            };
            repeat.children().len()
        };

        let optional = separated(SeparatorPolicy::Optional, Prohibited);
        let result = optional(", i, i");
        assert!(!result.has_error());
        assert!(result.skipped_tokens().is_empty());
        assert_eq!(items(&result), 4);
        let result = optional("i, i");
        assert!(!result.has_error());
        assert_eq!(items(&result), 3);

        let required = separated(SeparatorPolicy::Required, Prohibited);
        assert!(!required(", i").has_error());
        let result = required("i, i");
        let errors = result.error_trees();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, TreeKind::Missing(Some(TokenId::new(0))));
        assert_eq!(items(&result), 4);

        let prohibited = separated(Prohibited, Prohibited);
        let result = prohibited(", i");
        let errors = result.error_trees();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, TreeKind::Missing(Some(TokenId::new(0))));
        assert!(result.skipped_tokens().is_empty());
    }

    #[test]
    fn tokens_and_skips_cover_the_input() {
        let inputs: [(&str, fn(&Arith) -> NonTerminalId); 4] = [
            ("1 + $ 2", |a| a.exprs),
            ("(1 3)", |a| a.exprs),
            ("(1) (2 +) (3) ) 4 $", |a| a.exprs),
            ("2 * (3 + x) 4", |a| a.term1),
        ];
        for (source, start) in inputs {
            let (_, result) = parse_arith(source, start);
            let factory = result.factory();

            let mut ids = result
                .each_tree()
                .filter_map(|tree| match tree.kind {
                    TreeKind::Token(id) => Some(id),
                    _ => None,
                })
                .chain(result.skipped_tokens().iter().copied())
                .collect::<Vec<_>>();
            ids.sort();
            let all = factory.tokens().map(|(id, _)| id).collect::<Vec<_>>();
            assert_eq!(ids, all, "{source}");

            let text = ids.iter().map(|&id| factory.token_text(id)).collect::<String>();
            assert_eq!(text, source.split_whitespace().collect::<String>(), "{source}");
        }
    }
}
