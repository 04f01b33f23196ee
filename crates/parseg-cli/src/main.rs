use std::{
    env::args,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::{bail, Context};
use parseg::{
    description::GrammarDescription,
    factory::Change,
    linemap::{LineMap, Position},
    result::{Severity, Symbol},
    session::{ParsingSession, SessionConfig},
    Grammar,
};
use serde::de::DeserializeOwned;

fn main() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "WARN".to_owned());
    let level = log::LevelFilter::from_str(&level).unwrap_or(log::LevelFilter::Warn);

    simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    )
    .unwrap();

    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

struct Options {
    grammar: PathBuf,
    source: PathBuf,
    edits: Option<PathBuf>,
    config: Option<PathBuf>,
    do_rules: bool,
    do_outline: bool,
}

fn parse_args() -> anyhow::Result<Options> {
    let mut files = Vec::new();
    let mut edits = None;
    let mut config = None;
    let mut do_rules = false;
    let mut do_outline = false;

    let mut iter = args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--edits" => edits = Some(iter.next().context("Expected a file after --edits")?),
            "--config" => config = Some(iter.next().context("Expected a file after --config")?),
            "--rules" => do_rules = true,
            "--outline" => do_outline = true,
            _ if arg.starts_with("--") => bail!("Unknown flag {arg}"),
            _ => files.push(arg),
        }
    }

    let [grammar, source]: [String; 2] = files.try_into().map_err(|_| {
        anyhow::anyhow!(
            "Usage: parseg <grammar.json> <source> [--edits <edits.json>] \
             [--config <config.json>] [--rules] [--outline]"
        )
    })?;

    Ok(Options {
        grammar: grammar.into(),
        source: source.into(),
        edits: edits.map(PathBuf::from),
        config: config.map(PathBuf::from),
        do_rules,
        do_outline,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read `{}`", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse `{}`", path.display()))
}

fn run() -> anyhow::Result<()> {
    let options = parse_args()?;

    let description: GrammarDescription = read_json(&options.grammar)?;
    let built = description
        .build()
        .with_context(|| format!("Invalid grammar `{}`", options.grammar.display()))?;
    let config: SessionConfig = match &options.config {
        Some(path) => read_json(path)?,
        None => SessionConfig::default(),
    };
    let edits: Vec<Vec<Change>> = match &options.edits {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let source = std::fs::read_to_string(&options.source)
        .with_context(|| format!("Failed to read `{}`", options.source.display()))?;

    if options.do_rules {
        println!("{}", built.grammar.display_rules());
    }

    let mut session = ParsingSession::new(
        built.grammar,
        Arc::new(built.tokenizer),
        built.start,
        config,
    );

    let file = options.source.display().to_string();
    session.update(&[Change::insert(Position::default(), source)])?;
    report(&file, &session, options.do_outline);

    for (i, batch) in edits.iter().enumerate() {
        println!("\n--- edit {} ---", i + 1);
        session
            .update(batch)
            .with_context(|| format!("Failed to apply edit {}", i + 1))?;
        report(&file, &session, options.do_outline);
    }

    Ok(())
}

/// Prints the tree of the last parse to stdout and its diagnostics to stderr.
fn report(file: &str, session: &ParsingSession, do_outline: bool) {
    let grammar = session.grammar();
    let Some(result) = session.last_result() else {
        return;
    };
    let source = result.factory().source();
    let linemap = LineMap::new(source);

    print!("{}", result.display(grammar));

    for diagnostic in result.diagnostics(grammar) {
        let Position { line, column } = linemap.offset_to_position(source, diagnostic.span.start());
        let severity = match diagnostic.severity {
            Severity::Error => "error",
            Severity::Hint => "hint",
        };
        eprintln!("{file}:{line}:{} {severity}: {}", column + 1, diagnostic.message);
    }

    if do_outline {
        println!("\noutline:");
        for symbol in result.outline(grammar) {
            print_symbol(grammar, source, &symbol, 1);
        }
    }
}

fn print_symbol(grammar: &Grammar, source: &str, symbol: &Symbol, depth: usize) {
    let name = &grammar.get_non_terminal(symbol.non_terminal).name;
    let first_line = symbol.span.as_str(source).lines().next().unwrap_or("");
    println!("{:indent$}{name} {} {first_line:?}", "", symbol.span, indent = depth * 2);
    for child in &symbol.children {
        print_symbol(grammar, source, child, depth + 1);
    }
}
