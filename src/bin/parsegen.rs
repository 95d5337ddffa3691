//! Command-line interface for parsegen.
//!
//! Compiles a YAML grammar, parses a source file with it, and prints
//! the requested view of the result.
//!
//! Usage:
//!   parsegen --grammar <path> --source <path>                 - Parse and print a summary
//!   parsegen --grammar <path> --source <path> --format ast    - Print the AST
//!   parsegen --grammar <path> --source <path> --dump-prefixes prefixes.yml

use std::fs;
use std::time::Instant;

use clap::{Arg, ArgAction, Command};

use parsegen::pipeline::Pipeline;

fn main() {
    let matches = Command::new("parsegen")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A grammar-driven parser generator")
        .arg(
            Arg::new("grammar")
                .long("grammar")
                .help("Path to the YAML grammar file")
                .required(true),
        )
        .arg(
            Arg::new("source")
                .long("source")
                .help("Path to the source file to parse")
                .required(true),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .help("Output format: summary, tokens, l2, ast, ast-json")
                .default_value("summary"),
        )
        .arg(
            Arg::new("dump-prefixes")
                .long("dump-prefixes")
                .help("Write the per-rule first-symbol sets to this file as YAML"),
        )
        .arg(
            Arg::new("repeat")
                .long("repeat")
                .help("Parse the source this many times and report timing")
                .default_value("1"),
        )
        .arg(
            Arg::new("debug-tokenizer")
                .long("debug-tokenizer")
                .help("Trace the tokenizing stage on stderr")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug-parser")
                .long("debug-parser")
                .help("Trace the token-parsing stage on stderr")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let grammar_path = matches.get_one::<String>("grammar").unwrap();
    let source_path = matches.get_one::<String>("source").unwrap();
    let format = matches.get_one::<String>("format").unwrap();
    let repeat: usize = matches
        .get_one::<String>("repeat")
        .unwrap()
        .parse()
        .unwrap_or_else(|_| {
            eprintln!("Error: --repeat expects a number");
            std::process::exit(1);
        });

    let grammar_text = read_file(grammar_path);
    let source_text = read_file(source_path);

    let pipeline = Pipeline::from_yaml(&grammar_text)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        })
        .with_debug(
            matches.get_flag("debug-tokenizer"),
            matches.get_flag("debug-parser"),
        );

    if let Some(path) = matches.get_one::<String>("dump-prefixes") {
        dump_prefixes(&pipeline, path);
    }

    run_and_print(&pipeline, &source_text, format, repeat.max(1));
}

fn read_file(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", path, e);
        std::process::exit(1);
    })
}

fn dump_prefixes(pipeline: &Pipeline, path: &str) {
    let report = pipeline.prefix_report();
    let yaml = serde_yaml::to_string(&report).unwrap_or_else(|e| {
        eprintln!("Error serializing prefixes: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = fs::write(path, yaml) {
        eprintln!("Error writing {}: {}", path, e);
        std::process::exit(1);
    }
}

fn run_and_print(pipeline: &Pipeline, source: &str, format: &str, repeat: usize) {
    let started = Instant::now();
    let mut last = None;
    for _ in 0..repeat {
        match pipeline.run(source) {
            Ok(run) => last = Some(run),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
    let elapsed = started.elapsed();
    let run = match last {
        Some(run) => run,
        None => return,
    };

    match format {
        "summary" => {
            let stats = run.stats();
            println!(
                "{} calls, {} errors tokenizing; {} calls, {} errors parsing",
                stats.tokenizer_calls,
                stats.tokenizer_errors,
                stats.parser_calls,
                stats.parser_errors
            );
            println!("{} tokens over {} lines", stats.tokens, stats.lines);
            if run.has_leftover() {
                println!("warning: unconsumed tokens remain");
            }
            let per_run = elapsed.as_secs_f64() / repeat as f64;
            println!(
                "{} runs in {:.2} ms ({:.0} lines/s)",
                repeat,
                elapsed.as_secs_f64() * 1e3,
                stats.lines as f64 / per_run
            );
        }
        "tokens" => print!("{}", run.tokenized.format_tree()),
        "l2" => match run.format_l2_tree() {
            Some(tree) => print!("{}", tree),
            None => println!("(no second-level tokens)"),
        },
        "ast" => {
            for node in &run.ast {
                print!("{}", parsegen::ast::format_ast(node));
            }
        }
        "ast-json" => match serde_json::to_string_pretty(&run.ast) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing AST: {}", e);
                std::process::exit(1);
            }
        },
        other => {
            eprintln!("Error: unknown format '{}'", other);
            eprintln!("\nAvailable formats:");
            for format in ["summary", "tokens", "l2", "ast", "ast-json"] {
                eprintln!("  {}", format);
            }
            std::process::exit(1);
        }
    }
}
