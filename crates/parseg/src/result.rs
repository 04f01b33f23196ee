use crate::{
    factory::TokenFactory,
    grammar::{Grammar, NonTerminalId},
    parser::{Parser, ParserOptions},
    span::Span,
    token::{TokenId, TokenKind},
    tree::{Tree, TreeDisplay, TreeKind},
};

/// The tree of one parse together with the tokens it refers to.
pub struct ParseResult {
    pub(crate) tree: Tree,
    pub(crate) factory: TokenFactory,
    pub(crate) skipped: Vec<TokenId>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
    Error,
    Hint,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub expected: Vec<TokenKind>,
    /// `None` at the end of input.
    pub found: Option<TokenKind>,
    pub message: String,
}

/// A cut non-terminal in the document outline.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Symbol {
    pub non_terminal: NonTerminalId,
    pub span: Span,
    pub children: Vec<Symbol>,
}

impl ParseResult {
    pub fn parse(
        grammar: &Grammar,
        factory: TokenFactory,
        start: NonTerminalId,
        options: ParserOptions,
    ) -> ParseResult {
        let (tree, skipped) = Parser::new(grammar, &factory, options).parse(start);
        ParseResult {
            tree,
            factory,
            skipped,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }
    pub fn factory(&self) -> &TokenFactory {
        &self.factory
    }
    pub fn skipped_tokens(&self) -> &[TokenId] {
        &self.skipped
    }
    pub fn has_error(&self) -> bool {
        self.tree.has_error()
    }
    pub fn error_trees(&self) -> Vec<&Tree> {
        self.tree.error_trees()
    }
    /// Every node of the tree in preorder.
    pub fn each_tree(&self) -> impl Iterator<Item = &Tree> {
        self.tree.chain().flat_map(Tree::walk)
    }

    /// Nodes whose tokens cover `span`, innermost first.
    pub fn tree_list(&self, span: Span) -> Vec<&Tree> {
        let mut list = Vec::new();
        for tree in self.tree.chain() {
            if self.collect_covering(tree, span, &mut list) {
                break;
            }
        }
        list.reverse();
        list
    }
    fn collect_covering<'a>(&self, tree: &'a Tree, span: Span, list: &mut Vec<&'a Tree>) -> bool {
        let covers = tree
            .token_span(&self.factory)
            .is_some_and(|tree_span| tree_span.covers(span));
        if !covers {
            return false;
        }
        list.push(tree);
        for child in tree.children().iter().flat_map(Tree::chain) {
            if self.collect_covering(child, span, list) {
                break;
            }
        }
        true
    }

    /// Span of the innermost cut non-terminal containing the token.
    pub fn block_range_for_deleted_token(&self, grammar: &Grammar, id: TokenId) -> Option<Span> {
        let span = self.factory.token_span(id);
        self.tree_list(span)
            .into_iter()
            .find(|tree| match tree.kind {
                TreeKind::NonTerminal(nt, _) => grammar.get_non_terminal(nt).cut,
                _ => false,
            })
            .and_then(|tree| tree.token_span(&self.factory))
    }

    /// An error for every missing node and a hint for every skipped token.
    pub fn diagnostics(&self, grammar: &Grammar) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for tree in self.error_trees() {
            let TreeKind::Missing(found) = tree.kind else {
                continue;
            };
            let expected = grammar
                .first_tokens(tree.expr)
                .tokens
                .iter()
                .collect::<Vec<_>>();

            let mut message = String::from("expected ");
            if expected.len() > 1 {
                message.push_str("one of ");
            }
            for (i, kind) in expected.iter().enumerate() {
                if i > 0 {
                    message.push_str(", ");
                }
                message.push_str(grammar.token_name(*kind));
            }

            let (span, found) = match found {
                Some(id) => {
                    let token = self.factory.token(id);
                    message.push_str(&format!(", found {}", grammar.token_name(token.kind)));
                    (token.span, Some(token.kind))
                }
                None => {
                    message.push_str(", found end of input");
                    (Span::at(self.factory.source().len() as u32), None)
                }
            };

            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                span,
                expected,
                found,
                message,
            });
        }

        for &id in &self.skipped {
            let token = self.factory.token(id);
            diagnostics.push(Diagnostic {
                severity: Severity::Hint,
                span: token.span,
                expected: Vec::new(),
                found: Some(token.kind),
                message: format!("skipped unexpected {}", grammar.token_name(token.kind)),
            });
        }

        diagnostics
    }

    /// The cut non-terminals of the tree, nested.
    pub fn outline(&self, grammar: &Grammar) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        for tree in self.tree.chain() {
            self.outline_node(grammar, tree, &mut symbols);
        }
        symbols
    }
    fn outline_node(&self, grammar: &Grammar, tree: &Tree, symbols: &mut Vec<Symbol>) {
        let mut children = Vec::new();
        for child in tree.children().iter().flat_map(Tree::chain) {
            self.outline_node(grammar, child, &mut children);
        }

        let block = match tree.kind {
            TreeKind::NonTerminal(nt, _) if grammar.get_non_terminal(nt).cut => Some(nt),
            _ => None,
        };
        match (block, tree.token_span(&self.factory)) {
            (Some(non_terminal), Some(span)) => symbols.push(Symbol {
                non_terminal,
                span,
                children,
            }),
            _ => symbols.extend(children),
        }
    }

    pub fn display<'a>(&'a self, grammar: &'a Grammar) -> TreeDisplay<'a> {
        self.tree.display(grammar, &self.factory)
    }

    /// The same result with the edit history of its tokens dropped.
    pub(crate) fn into_reset(self) -> ParseResult {
        ParseResult {
            factory: self.factory.reset(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use cranelift_entity::EntityRef;

    use crate::{
        factory::TokenFactory,
        parser::ParserOptions,
        span::Span,
        test_support::{arithmetic, rbs},
        token::TokenId,
        tree::TreeKind,
    };

    use super::{ParseResult, Severity};

    #[test]
    fn missing_token_diagnostics() {
        let a = arithmetic();
        let factory = TokenFactory::new(a.tokenizer.clone(), "(123 +)");
        let result = ParseResult::parse(&a.grammar, factory, a.term, ParserOptions::default());

        let diagnostics = result.diagnostics(&a.grammar);
        assert_eq!(diagnostics.len(), 1);
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.severity, Severity::Error);
        assert_eq!(diagnostic.span, Span::new(6, 7));
        assert_eq!(diagnostic.found, a.grammar.find_token("RPAREN"));
        assert_eq!(
            diagnostic.message,
            "expected one of INTEGER, LPAREN, found RPAREN"
        );
    }

    #[test]
    fn end_of_input_diagnostics() {
        let a = arithmetic();
        let factory = TokenFactory::new(a.tokenizer.clone(), "(");
        let result = ParseResult::parse(&a.grammar, factory, a.exprs, ParserOptions::default());

        let messages = result
            .diagnostics(&a.grammar)
            .into_iter()
            .map(|d| {
                assert_eq!(d.span, Span::at(1));
                assert_eq!(d.found, None);
                d.message
            })
            .collect::<Vec<_>>();
        assert_eq!(
            messages,
            [
                "expected one of INTEGER, LPAREN, found end of input",
                "expected RPAREN, found end of input"
            ]
        );
    }

    #[test]
    fn skipped_token_hints() {
        let a = arithmetic();
        let factory = TokenFactory::new(a.tokenizer.clone(), "1 + $ 2");
        let result = ParseResult::parse(&a.grammar, factory, a.exprs, ParserOptions::default());

        let diagnostics = result.diagnostics(&a.grammar);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Hint);
        assert_eq!(diagnostics[0].span, Span::new(4, 5));
        assert_eq!(diagnostics[0].message, "skipped unexpected UNKNOWN");
    }

    const NESTED: &str = concat!(
        "module Foo\n",
        "  class Bar < Baz\n",
        "    def run : (A, B) -> C\n",
        "  end\n",
        "  alias a b\n",
        "end\n"
    );

    #[test]
    fn tree_list_is_innermost_first() {
        let r = rbs();
        let factory = TokenFactory::new(r.tokenizer.clone(), NESTED);
        let result = ParseResult::parse(&r.grammar, factory, r.start, ParserOptions::default());
        assert!(!result.has_error(), "{}", result.display(&r.grammar));

        // `run`
        let run = result.factory().token_span(TokenId::new(7));
        assert_eq!(run.as_str(NESTED), "run");
        let list = result.tree_list(run);
        assert_eq!(list[0].kind, TreeKind::Token(TokenId::new(7)));
        assert!(std::ptr::eq(*list.last().unwrap(), result.tree()));

        let names = list
            .iter()
            .filter_map(|tree| match tree.kind {
                TreeKind::NonTerminal(nt, _) => Some(r.grammar.get_non_terminal(nt).name.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "method_name",
                "method_decl",
                "member",
                "module_members",
                "class_decl",
                "member",
                "module_members",
                "module_decl_rhs",
                "module_decl",
                "decl",
                "start"
            ]
        );

        let block = result.block_range_for_deleted_token(&r.grammar, TokenId::new(7));
        let class = NESTED.find("class").unwrap() as u32;
        let class_end = NESTED.find("  end").unwrap() as u32 + 5;
        assert_eq!(block, Some(Span::new(class, class_end)));
    }

    #[test]
    fn outline_nests_blocks() {
        let r = rbs();
        let factory = TokenFactory::new(r.tokenizer.clone(), NESTED);
        let result = ParseResult::parse(&r.grammar, factory, r.start, ParserOptions::default());

        let outline = result.outline(&r.grammar);
        assert_eq!(outline.len(), 1);
        let module = &outline[0];
        assert_eq!(r.grammar.get_non_terminal(module.non_terminal).name, "module_decl");
        assert_eq!(module.span, Span::new(0, NESTED.len() as u32 - 1));
        assert_eq!(module.children.len(), 1);
        assert_eq!(
            r.grammar.get_non_terminal(module.children[0].non_terminal).name,
            "class_decl"
        );
        assert!(module.children[0].children.is_empty());

        assert_eq!(result.each_tree().filter(|tree| tree.is_missing()).count(), 0);
        assert!(result.each_tree().count() > 30);
    }
}
