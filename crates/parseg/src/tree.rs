use std::fmt::{self, Display};

use crate::{
    factory::TokenFactory,
    grammar::{ExprId, ExprKind, Grammar, NonTerminalId},
    span::Span,
    token::TokenId,
};

/// A node of the concrete syntax tree, produced by the expression `expr`.
///
/// Nodes form chains through `next` mirroring the expression chains of the grammar, the
/// value of a node holds the heads of its child chains.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tree {
    pub expr: ExprId,
    pub kind: TreeKind,
    pub next: Option<Box<Tree>>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TreeKind {
    Token(TokenId),
    /// `None` if the non-terminal matched nothing.
    NonTerminal(NonTerminalId, Option<Box<Tree>>),
    Empty,
    Optional(Option<Box<Tree>>),
    Alternation(Box<Tree>),
    /// Content and separator nodes in alternation.
    Repeat(Vec<Tree>),
    /// The expression could not be matched, holds the token found instead or `None` at the end of input.
    Missing(Option<TokenId>),
}

impl Tree {
    pub fn new(expr: ExprId, kind: TreeKind) -> Tree {
        Tree {
            expr,
            kind,
            next: None,
        }
    }
    pub fn is_missing(&self) -> bool {
        matches!(self.kind, TreeKind::Missing(_))
    }
    /// Heads of the chains held in this node's value.
    pub fn children(&self) -> &[Tree] {
        match &self.kind {
            TreeKind::NonTerminal(_, Some(child))
            | TreeKind::Optional(Some(child))
            | TreeKind::Alternation(child) => std::slice::from_ref(&**child),
            TreeKind::Repeat(items) => items,
            _ => &[],
        }
    }
    /// This node followed by every node chained after it.
    pub fn chain(&self) -> impl Iterator<Item = &Tree> {
        std::iter::successors(Some(self), |tree| tree.next.as_deref())
    }
    /// Preorder traversal of this node and everything in its value, chains of descendants
    /// are followed but the chain of this node is not.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(self, false)],
        }
    }
    /// Tokens consumed within this node, including the tokens found in place of missing ones.
    pub fn tokens(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.walk().filter_map(|tree| match tree.kind {
            TreeKind::Token(id) | TreeKind::Missing(Some(id)) => Some(id),
            _ => None,
        })
    }
    pub fn first_token(&self) -> Option<TokenId> {
        self.tokens().next()
    }
    pub fn last_token(&self) -> Option<TokenId> {
        self.tokens().last()
    }
    pub fn token_span(&self, factory: &TokenFactory) -> Option<Span> {
        let first = self.first_token()?;
        let last = self.last_token()?;
        Some(factory.token_span(first).cover(factory.token_span(last)))
    }
    /// Every missing node in this node and the nodes chained after it, in document order.
    pub fn error_trees(&self) -> Vec<&Tree> {
        self.chain()
            .flat_map(Tree::walk)
            .filter(|tree| tree.is_missing())
            .collect()
    }
    pub fn has_error(&self) -> bool {
        self.chain().flat_map(Tree::walk).any(Tree::is_missing)
    }
    /// The content items of a repeat node.
    pub fn repeat_contents<'a>(&'a self, grammar: &Grammar) -> Vec<&'a Tree> {
        self.repeat_items(grammar, true)
    }
    /// The separator items of a repeat node, placeholders for nullable separators included.
    pub fn repeat_separators<'a>(&'a self, grammar: &Grammar) -> Vec<&'a Tree> {
        self.repeat_items(grammar, false)
    }
    fn repeat_items<'a>(&'a self, grammar: &Grammar, content: bool) -> Vec<&'a Tree> {
        let (TreeKind::Repeat(items), ExprKind::Repeat(repeat)) =
            (&self.kind, &grammar.expr(self.expr).kind)
        else {
            return Vec::new();
        };
        let wanted = if content {
            repeat.content
        } else {
            repeat.separator
        };
        items.iter().filter(|item| item.expr == wanted).collect()
    }
    pub fn display<'a>(
        &'a self,
        grammar: &'a Grammar,
        factory: &'a TokenFactory,
    ) -> TreeDisplay<'a> {
        TreeDisplay {
            tree: self,
            grammar,
            factory,
        }
    }
}

pub struct Walk<'a> {
    stack: Vec<(&'a Tree, bool)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Tree;
    fn next(&mut self) -> Option<&'a Tree> {
        let (tree, follow_chain) = self.stack.pop()?;
        if follow_chain {
            if let Some(next) = &tree.next {
                self.stack.push((next, true));
            }
        }
        for child in tree.children().iter().rev() {
            self.stack.push((child, true));
        }
        Some(tree)
    }
}

/// Indented rendering of a tree, wrapper nodes are transparent.
pub struct TreeDisplay<'a> {
    tree: &'a Tree,
    grammar: &'a Grammar,
    factory: &'a TokenFactory,
}

impl TreeDisplay<'_> {
    fn write_chain(&self, f: &mut fmt::Formatter<'_>, tree: &Tree, depth: usize) -> fmt::Result {
        for node in tree.chain() {
            self.write_node(f, node, depth)?;
        }
        Ok(())
    }
    fn write_token(&self, f: &mut fmt::Formatter<'_>, id: TokenId) -> fmt::Result {
        let token = self.factory.token(id);
        write!(
            f,
            "{} {:?}",
            self.grammar.token_name(token.kind),
            self.factory.token_text(id)
        )
    }
    fn write_node(&self, f: &mut fmt::Formatter<'_>, tree: &Tree, depth: usize) -> fmt::Result {
        let indent = depth * 2;
        match &tree.kind {
            TreeKind::Token(id) => {
                write!(f, "{:indent$}", "")?;
                self.write_token(f, *id)?;
                writeln!(f)
            }
            TreeKind::NonTerminal(nt, child) => {
                let name = &self.grammar.get_non_terminal(*nt).name;
                writeln!(f, "{:indent$}{name}", "")?;
                match child {
                    Some(child) => self.write_chain(f, child, depth + 1),
                    None => Ok(()),
                }
            }
            TreeKind::Missing(found) => {
                write!(f, "{:indent$}!missing ", "")?;
                match found {
                    Some(id) => self.write_token(f, *id)?,
                    None => f.write_str("<eof>")?,
                }
                writeln!(f)
            }
            TreeKind::Empty => Ok(()),
            TreeKind::Optional(_) | TreeKind::Alternation(_) | TreeKind::Repeat(_) => {
                for child in tree.children() {
                    self.write_chain(f, child, depth)?;
                }
                Ok(())
            }
        }
    }
}

impl Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_chain(f, self.tree, 0)
    }
}
