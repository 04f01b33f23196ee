//! Grammars shared by the unit tests.

use std::sync::Arc;

use crate::{
    grammar::{Grammar, NonTerminalId},
    token::Tokenizer,
    tokenizer::RegexTokenizer,
};

pub struct Arith {
    pub grammar: Grammar,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub term: NonTerminalId,
    pub term1: NonTerminalId,
    pub expr: NonTerminalId,
    pub exprs: NonTerminalId,
}

fn tokenizer(grammar: &mut Grammar, skip: &str, rules: &[(&str, &str)]) -> Arc<dyn Tokenizer> {
    let mut tokenizer = RegexTokenizer::new().skip(skip).unwrap();
    for (name, pattern) in rules {
        tokenizer = tokenizer.rule(grammar.token(name), pattern).unwrap();
    }
    let unknown = grammar.token("UNKNOWN");
    Arc::new(tokenizer.fallback(Some(unknown)))
}

/// ```text
/// term := INTEGER | LPAREN expr RPAREN
/// term1 := {term / MUL}
/// expr := {term1 / (PLUS | MINUS)}
/// exprs := {expr}
/// ```
pub fn arithmetic() -> Arith {
    let mut g = Grammar::new();
    let tokenizer = tokenizer(
        &mut g,
        r"\s+|#[^\n]*",
        &[
            ("INTEGER", r"\d+"),
            ("PLUS", r"\+"),
            ("MINUS", "-"),
            ("MUL", r"\*"),
            ("LPAREN", r"\("),
            ("RPAREN", r"\)"),
            ("IDENT", r"[a-z]\w*"),
        ],
    );

    let term = g.non_terminal("term");
    let term1 = g.non_terminal("term1");
    let expr = g.non_terminal("expr");
    let exprs = g.non_terminal("exprs");

    let integer = g.token_ref("INTEGER");
    let lparen = g.token_ref("LPAREN");
    let expr_ref = g.nt(expr);
    let rparen = g.token_ref("RPAREN");
    let parens = g.seq_all([lparen, expr_ref, rparen]);
    let rule = g.alt([integer, parens]);
    g.set_rule(term, rule);

    let term_ref = g.nt(term);
    let mul = g.token_ref("MUL");
    let rule = g.repeat(term_ref, Some(mul));
    g.set_rule(term1, rule);

    let term1_ref = g.nt(term1);
    let plus = g.token_ref("PLUS");
    let minus = g.token_ref("MINUS");
    let operator = g.alt([plus, minus]);
    let rule = g.repeat(term1_ref, Some(operator));
    g.set_rule(expr, rule);

    let expr_ref = g.nt(expr);
    let rule = g.repeat(expr_ref, None);
    g.set_rule(exprs, rule);

    Arith {
        grammar: g,
        tokenizer,
        term,
        term1,
        expr,
        exprs,
    }
}

pub struct Rbs {
    pub grammar: Grammar,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub start: NonTerminalId,
}

/// A small part of the RBS signature language, `module_decl` and `class_decl` are cut.
pub fn rbs() -> Rbs {
    let mut g = Grammar::new();
    let tokenizer = tokenizer(
        &mut g,
        r"\s+|#[^\n]*",
        &[
            ("kMODULE", r"module\b"),
            ("kCLASS", r"class\b"),
            ("kALIAS", r"alias\b"),
            ("kDEF", r"def\b"),
            ("kEND", r"end\b"),
            ("kCOLON2", "::"),
            ("kCOLON", ":"),
            ("kLT", "<"),
            ("kCOMMA", ","),
            ("kLPAREN", r"\("),
            ("kRPAREN", r"\)"),
            ("kARROW", "->"),
            ("tUIDENT", r"[A-Z]\w*"),
            ("tLIDENT", r"[a-z_]\w*"),
        ],
    );

    let start = g.non_terminal("start");
    let decl = g.non_terminal("decl");
    let module_decl = g.non_terminal("module_decl");
    let module_decl_rhs = g.non_terminal("module_decl_rhs");
    let module_members = g.non_terminal("module_members");
    let member = g.non_terminal("member");
    let class_decl = g.non_terminal("class_decl");
    let alias_decl = g.non_terminal("alias_decl");
    let method_decl = g.non_terminal("method_decl");
    let method_type = g.non_terminal("method_type");
    let method_name = g.non_terminal("method_name");
    let module_name = g.non_terminal("module_name");
    g.set_cut(module_decl, true);
    g.set_cut(class_decl, true);

    // start := [{decl}]
    let decl_ref = g.nt(decl);
    let decls = g.repeat(decl_ref, None);
    let rule = g.opt(decls);
    g.set_rule(start, rule);

    // decl := module_decl | class_decl
    let module_ref = g.nt(module_decl);
    let class_ref = g.nt(class_decl);
    let rule = g.alt([module_ref, class_ref]);
    g.set_rule(decl, rule);

    // module_decl := kMODULE module_name module_decl_rhs
    let keyword = g.token_ref("kMODULE");
    let name = g.nt(module_name);
    let rhs = g.nt(module_decl_rhs);
    let rule = g.seq_all([keyword, name, rhs]);
    g.set_rule(module_decl, rule);

    // module_decl_rhs := module_members kEND
    let members = g.nt(module_members);
    let end = g.token_ref("kEND");
    let rule = g.seq(members, end);
    g.set_rule(module_decl_rhs, rule);

    // module_members := [{member}]
    let member_ref = g.nt(member);
    let repeat = g.repeat(member_ref, None);
    let rule = g.opt(repeat);
    g.set_rule(module_members, rule);

    // member := module_decl | class_decl | alias_decl | method_decl
    let module_ref = g.nt(module_decl);
    let class_ref = g.nt(class_decl);
    let alias_ref = g.nt(alias_decl);
    let method_ref = g.nt(method_decl);
    let rule = g.alt([module_ref, class_ref, alias_ref, method_ref]);
    g.set_rule(member, rule);

    // class_decl := kCLASS module_name [kLT module_name] module_members kEND
    let keyword = g.token_ref("kCLASS");
    let name = g.nt(module_name);
    let lt = g.token_ref("kLT");
    let super_name = g.nt(module_name);
    let super_class = g.seq(lt, super_name);
    let super_class = g.opt(super_class);
    let members = g.nt(module_members);
    let end = g.token_ref("kEND");
    let rule = g.seq_all([keyword, name, super_class, members, end]);
    g.set_rule(class_decl, rule);

    // alias_decl := kALIAS method_name method_name
    let keyword = g.token_ref("kALIAS");
    let new_name = g.nt(method_name);
    let old_name = g.nt(method_name);
    let rule = g.seq_all([keyword, new_name, old_name]);
    g.set_rule(alias_decl, rule);

    // method_decl := kDEF method_name kCOLON method_type
    let keyword = g.token_ref("kDEF");
    let name = g.nt(method_name);
    let colon = g.token_ref("kCOLON");
    let ty = g.nt(method_type);
    let rule = g.seq_all([keyword, name, colon, ty]);
    g.set_rule(method_decl, rule);

    // method_type := kLPAREN [{module_name / kCOMMA}] kRPAREN kARROW module_name
    let lparen = g.token_ref("kLPAREN");
    let param = g.nt(module_name);
    let comma = g.token_ref("kCOMMA");
    let params = g.repeat(param, Some(comma));
    let params = g.opt(params);
    let rparen = g.token_ref("kRPAREN");
    let arrow = g.token_ref("kARROW");
    let ret = g.nt(module_name);
    let rule = g.seq_all([lparen, params, rparen, arrow, ret]);
    g.set_rule(method_type, rule);

    // method_name := tLIDENT | tUIDENT
    let lower = g.token_ref("tLIDENT");
    let upper = g.token_ref("tUIDENT");
    let rule = g.alt([lower, upper]);
    g.set_rule(method_name, rule);

    // module_name := [kCOLON2] tUIDENT
    let colon2 = g.token_ref("kCOLON2");
    let colon2 = g.opt(colon2);
    let ident = g.token_ref("tUIDENT");
    let rule = g.seq(colon2, ident);
    g.set_rule(module_name, rule);

    Rbs {
        grammar: g,
        tokenizer,
        start,
    }
}
