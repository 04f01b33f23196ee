use std::{
    collections::HashMap,
    fmt::{self, Display},
    sync::OnceLock,
};

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use serde::Deserialize;

use crate::token::{TokenKind, TokenSet};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NonTerminalId(u32);
entity_impl! { NonTerminalId }

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ExprId(u32);
entity_impl! { ExprId }

/// Whether a repeat accepts a separator before its first or after its last element.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeparatorPolicy {
    Required,
    Optional,
    #[default]
    Prohibited,
}

/// `content (separator content)*`
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Repeat {
    pub content: ExprId,
    pub separator: ExprId,
    pub leading: SeparatorPolicy,
    pub trailing: SeparatorPolicy,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ExprKind {
    Token(TokenKind),
    NonTerminal(NonTerminalId),
    Empty,
    Optional(ExprId),
    Alternation(Box<[ExprId]>),
    Repeat(Repeat),
}

/// One element of a rule, `next` links to the element that follows it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub next: Option<ExprId>,
}

#[derive(Clone, Debug)]
pub struct NonTerminal {
    pub name: String,
    pub rule: ExprId,
    /// Marks the non-terminal as a block which contains errors and edits.
    pub cut: bool,
}

/// The tokens which can start an expression, `nullable` stands for the empty match.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct FirstSet {
    pub tokens: TokenSet,
    pub nullable: bool,
}

impl FirstSet {
    fn token(kind: TokenKind) -> FirstSet {
        FirstSet {
            tokens: TokenSet::from_iter([kind]),
            nullable: false,
        }
    }
    fn nullable() -> FirstSet {
        FirstSet {
            tokens: TokenSet::new(),
            nullable: true,
        }
    }
    pub fn contains(&self, kind: TokenKind) -> bool {
        self.tokens.contains(kind)
    }
    fn union_with(&mut self, other: &FirstSet) -> bool {
        let mut changed = self.tokens.union_with(&other.tokens);
        if other.nullable && !self.nullable {
            self.nullable = true;
            changed = true;
        }
        changed
    }
    /// FIRST of `self` followed by `next`.
    fn then(&self, next: &FirstSet) -> FirstSet {
        if !self.nullable {
            return self.clone();
        }
        let mut tokens = self.tokens.clone();
        tokens.union_with(&next.tokens);
        FirstSet {
            tokens,
            nullable: next.nullable,
        }
    }
}

struct GrammarSets {
    first: SecondaryMap<ExprId, FirstSet>,
    consumable: SecondaryMap<ExprId, TokenSet>,
}

/// Token kinds, non-terminals and the expressions of their rules.
///
/// Expressions are never mutated after being created, building a sequence copies the left
/// chain and shares the right one.
pub struct Grammar {
    tokens: PrimaryMap<TokenKind, String>,
    token_names: HashMap<String, TokenKind>,
    non_terminals: PrimaryMap<NonTerminalId, NonTerminal>,
    non_terminal_names: HashMap<String, NonTerminalId>,
    exprs: PrimaryMap<ExprId, Expr>,
    empty: ExprId,
    sets: OnceLock<GrammarSets>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar {
    pub fn new() -> Grammar {
        let mut exprs = PrimaryMap::new();
        let empty = exprs.push(Expr {
            kind: ExprKind::Empty,
            next: None,
        });
        Grammar {
            tokens: PrimaryMap::new(),
            token_names: HashMap::new(),
            non_terminals: PrimaryMap::new(),
            non_terminal_names: HashMap::new(),
            exprs,
            empty,
            sets: OnceLock::new(),
        }
    }

    /// Returns the token kind called `name`, creating it on first use.
    pub fn token(&mut self, name: &str) -> TokenKind {
        if let Some(&kind) = self.token_names.get(name) {
            return kind;
        }
        let kind = self.tokens.push(name.to_owned());
        self.token_names.insert(name.to_owned(), kind);
        kind
    }
    pub fn find_token(&self, name: &str) -> Option<TokenKind> {
        self.token_names.get(name).copied()
    }
    pub fn token_name(&self, kind: TokenKind) -> &str {
        &self.tokens[kind]
    }
    pub fn token_kinds(&self) -> impl Iterator<Item = (TokenKind, &str)> + '_ {
        self.tokens.iter().map(|(kind, name)| (kind, name.as_str()))
    }

    /// Returns the non-terminal called `name`, creating it with an empty rule on first use.
    pub fn non_terminal(&mut self, name: &str) -> NonTerminalId {
        if let Some(&id) = self.non_terminal_names.get(name) {
            return id;
        }
        let id = self.non_terminals.push(NonTerminal {
            name: name.to_owned(),
            rule: self.empty,
            cut: false,
        });
        self.non_terminal_names.insert(name.to_owned(), id);
        id
    }
    pub fn find_non_terminal(&self, name: &str) -> Option<NonTerminalId> {
        self.non_terminal_names.get(name).copied()
    }
    pub fn get_non_terminal(&self, id: NonTerminalId) -> &NonTerminal {
        &self.non_terminals[id]
    }
    pub fn non_terminals(&self) -> impl Iterator<Item = (NonTerminalId, &NonTerminal)> + '_ {
        self.non_terminals.iter()
    }
    pub fn set_rule(&mut self, id: NonTerminalId, rule: ExprId) {
        self.sets.take();
        self.non_terminals[id].rule = rule;
    }
    pub fn set_cut(&mut self, id: NonTerminalId, cut: bool) {
        self.non_terminals[id].cut = cut;
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }
    fn push_expr(&mut self, kind: ExprKind, next: Option<ExprId>) -> ExprId {
        self.sets.take();
        self.exprs.push(Expr { kind, next })
    }
    pub fn t(&mut self, kind: TokenKind) -> ExprId {
        self.push_expr(ExprKind::Token(kind), None)
    }
    pub fn nt(&mut self, id: NonTerminalId) -> ExprId {
        self.push_expr(ExprKind::NonTerminal(id), None)
    }
    /// Shorthand for `t(token(name))`.
    pub fn token_ref(&mut self, name: &str) -> ExprId {
        let kind = self.token(name);
        self.t(kind)
    }
    /// Shorthand for `nt(non_terminal(name))`.
    pub fn non_terminal_ref(&mut self, name: &str) -> ExprId {
        let id = self.non_terminal(name);
        self.nt(id)
    }
    pub fn empty(&self) -> ExprId {
        self.empty
    }
    pub fn opt(&mut self, inner: ExprId) -> ExprId {
        self.push_expr(ExprKind::Optional(inner), None)
    }
    pub fn alt(&mut self, branches: impl IntoIterator<Item = ExprId>) -> ExprId {
        let branches = branches.into_iter().collect();
        self.push_expr(ExprKind::Alternation(branches), None)
    }
    /// A repeat which prohibits leading and trailing separators, `None` means no separator.
    pub fn repeat(&mut self, content: ExprId, separator: Option<ExprId>) -> ExprId {
        self.repeat_with(Repeat {
            content,
            separator: separator.unwrap_or(self.empty),
            leading: SeparatorPolicy::Prohibited,
            trailing: SeparatorPolicy::Prohibited,
        })
    }
    pub fn repeat_with(&mut self, repeat: Repeat) -> ExprId {
        self.push_expr(ExprKind::Repeat(repeat), None)
    }
    /// `left` followed by `right`, neither of the chains is modified.
    pub fn seq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        let Expr { kind, next } = self.exprs[left].clone();
        if kind == ExprKind::Empty && next.is_none() {
            return right;
        }
        let next = match next {
            Some(next) => self.seq(next, right),
            None => right,
        };
        self.push_expr(kind, Some(next))
    }
    pub fn seq_all(&mut self, items: impl IntoIterator<Item = ExprId>) -> ExprId {
        let mut items = items.into_iter().collect::<Vec<_>>();
        let Some(mut chain) = items.pop() else {
            return self.empty;
        };
        while let Some(item) = items.pop() {
            chain = self.seq(item, chain);
        }
        chain
    }

    pub fn first_tokens(&self, expr: ExprId) -> &FirstSet {
        &self.sets().first[expr]
    }
    /// Every token which could be consumed somewhere within the expression chain.
    pub fn consumable_tokens(&self, expr: ExprId) -> &TokenSet {
        &self.sets().consumable[expr]
    }
    fn sets(&self) -> &GrammarSets {
        self.sets.get_or_init(|| self.compute_sets())
    }
    /// Grows every set until a fixpoint, so that recursion through non-terminals terminates.
    fn compute_sets(&self) -> GrammarSets {
        let mut sets = GrammarSets {
            first: SecondaryMap::new(),
            consumable: SecondaryMap::new(),
        };
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for (id, expr) in self.exprs.iter() {
                let first = self.step_first(expr, &sets.first);
                let consumable = self.step_consumable(expr, &sets);
                changed |= sets.first[id].union_with(&first);
                changed |= sets.consumable[id].union_with(&consumable);
            }
            if !changed {
                log::trace!("token sets converged after {rounds} rounds");
                return sets;
            }
        }
    }
    fn step_first(&self, expr: &Expr, first: &SecondaryMap<ExprId, FirstSet>) -> FirstSet {
        let own = match &expr.kind {
            ExprKind::Token(kind) => FirstSet::token(*kind),
            ExprKind::NonTerminal(id) => first[self.non_terminals[*id].rule].clone(),
            ExprKind::Empty => FirstSet::nullable(),
            ExprKind::Optional(inner) => {
                let mut set = first[*inner].clone();
                set.nullable = true;
                set
            }
            ExprKind::Alternation(branches) => {
                let mut set = FirstSet::default();
                for branch in branches.iter() {
                    set.union_with(&first[*branch]);
                }
                set
            }
            ExprKind::Repeat(repeat) => {
                let separator = &first[repeat.separator];
                let body = first[repeat.content].then(separator);
                match repeat.leading {
                    SeparatorPolicy::Prohibited => body,
                    SeparatorPolicy::Required => separator.then(&body),
                    SeparatorPolicy::Optional => {
                        let mut set = separator.then(&body);
                        set.union_with(&body);
                        set
                    }
                }
            }
        };
        match expr.next {
            Some(next) => own.then(&first[next]),
            None => own,
        }
    }
    fn step_consumable(&self, expr: &Expr, sets: &GrammarSets) -> TokenSet {
        let mut set = match &expr.kind {
            ExprKind::Token(kind) => TokenSet::from_iter([*kind]),
            ExprKind::NonTerminal(id) => sets.consumable[self.non_terminals[*id].rule].clone(),
            ExprKind::Empty => TokenSet::new(),
            ExprKind::Optional(inner) => sets.first[*inner].tokens.clone(),
            ExprKind::Alternation(branches) => {
                let mut set = TokenSet::new();
                for branch in branches.iter() {
                    set.union_with(&sets.first[*branch].tokens);
                }
                set
            }
            ExprKind::Repeat(repeat) => {
                let mut set = sets.first[repeat.content].tokens.clone();
                set.union_with(&sets.first[repeat.separator].tokens);
                set
            }
        };
        if let Some(next) = expr.next {
            set.union_with(&sets.consumable[next]);
        }
        set
    }

    pub fn display_expr(&self, expr: ExprId) -> ExprDisplay<'_> {
        ExprDisplay(self, expr)
    }
    pub fn display_rules(&self) -> RulesDisplay<'_> {
        RulesDisplay(self)
    }
}

#[derive(Clone, Copy)]
pub struct ExprDisplay<'a>(&'a Grammar, ExprId);
impl Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let grammar = self.0;
        let mut current = Some(self.1);
        let mut first = true;
        while let Some(id) = current {
            let expr = grammar.expr(id);
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match &expr.kind {
                ExprKind::Token(kind) => f.write_str(grammar.token_name(*kind))?,
                ExprKind::NonTerminal(id) => f.write_str(&grammar.get_non_terminal(*id).name)?,
                ExprKind::Empty => f.write_str("ε")?,
                ExprKind::Optional(inner) => write!(f, "[{}]", grammar.display_expr(*inner))?,
                ExprKind::Alternation(branches) => {
                    f.write_str("(")?;
                    for (i, branch) in branches.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" | ")?;
                        }
                        write!(f, "{}", grammar.display_expr(*branch))?;
                    }
                    f.write_str(")")?;
                }
                ExprKind::Repeat(repeat) => {
                    write!(f, "{{{}", grammar.display_expr(repeat.content))?;
                    if repeat.separator != grammar.empty {
                        write!(f, " / {}", grammar.display_expr(repeat.separator))?;
                    }
                    f.write_str("}")?;
                }
            }
            current = expr.next;
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub struct RulesDisplay<'a>(&'a Grammar);
impl Display for RulesDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, non_terminal) in self.0.non_terminals() {
            let cut = if non_terminal.cut { " !" } else { "" };
            writeln!(
                f,
                "{}{cut} := {}",
                non_terminal.name,
                self.0.display_expr(non_terminal.rule)
            )?;
        }
        Ok(())
    }
}
