//! x64_c - a small C compiler targeting x86-64
//!
//! Compiles a C subset to GNU (AT&T) assembly for the System V ABI,
//! in the spirit of Small-C: one pass per stage, no IR, no optimizer.
//! The output assembles and links against a C runtime with the usual
//! toolchain, e.g. `x64_c prog.c > prog.s && gcc prog.s -o prog`.

use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use anyhow::Context;
use colored::Colorize;

use x64_c::codegen::CodeGen;
use x64_c::lexer::Lexer;
use x64_c::parser::Parser;

fn print_usage() {
    eprintln!("Usage: x64_c [OPTIONS] <input.c>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o <file>     Output file (default: stdout)");
    eprintln!("  --tokens      Show tokens only");
    eprintln!("  --ast         Show AST only");
    eprintln!("  -h, --help    Show this help");
    eprintln!();
    eprintln!("If no input file is given, reads from stdin.");
}

fn fail(message: &str) -> ! {
    eprintln!("{} {}", "error:".red().bold(), message);
    process::exit(1);
}

fn read_source(input_file: &Option<String>) -> anyhow::Result<String> {
    match input_file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
        }
        None => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("failed to read stdin")?;
            Ok(source)
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut input_file: Option<String> = None;
    let mut output_file: Option<String> = None;
    let mut show_tokens = false;
    let mut show_ast = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                i += 1;
                if i >= args.len() {
                    fail("-o requires an argument");
                }
                output_file = Some(args[i].clone());
            }
            "--tokens" => show_tokens = true,
            "--ast" => show_ast = true,
            "-h" | "--help" => {
                print_usage();
                return;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown option: {arg}");
                print_usage();
                process::exit(1);
            }
            _ => {
                input_file = Some(args[i].clone());
            }
        }
        i += 1;
    }

    let source = match read_source(&input_file) {
        Ok(s) => s,
        Err(e) => fail(&format!("{e:#}")),
    };

    // Tokenize
    let mut lexer = Lexer::new(&source);
    let tokens = match lexer.tokenize() {
        Ok(t) => t,
        Err(e) => fail(&e.to_string()),
    };

    if show_tokens {
        for tok in &tokens {
            println!("{tok:?}");
        }
        return;
    }

    // Parse
    let mut parser = Parser::new(tokens);
    let ast = match parser.parse() {
        Ok(a) => a,
        Err(e) => fail(&e.to_string()),
    };

    if show_ast {
        println!("{ast:#?}");
        return;
    }

    // Generate assembly
    let mut codegen = CodeGen::new();
    let asm = match codegen.generate(&ast) {
        Ok(a) => a,
        Err(e) => fail(&e.to_string()),
    };

    match output_file {
        Some(path) => {
            if let Err(e) = fs::write(&path, &asm).with_context(|| format!("failed to write {path}"))
            {
                fail(&format!("{e:#}"));
            }
        }
        None => print!("{asm}"),
    }
}
