use std::fs::File;
use std::io::{self, IsTerminal};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use tinylisp::stream::{Output, Stream};
use tinylisp::{Config, Machine, NullEditor};

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();
    let mut path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--heap" => {
                let Some(bytes) = args.get(i + 1).and_then(|s| s.parse::<usize>().ok()) else {
                    eprintln!("--heap requires a size in bytes");
                    std::process::exit(1);
                };
                config.heap_capacity = bytes;
                i += 2;
            }
            "--help" | "-h" => {
                println!("Usage: tinylisp [OPTIONS] [FILE]");
                println!();
                println!("Evaluates FILE, or standard input. A terminal gets an interactive prompt.");
                println!();
                println!("Options:");
                println!("  --heap <bytes>   Semispace size (default {})", config.heap_capacity);
                println!("  --help, -h       Show this help message");
                println!();
                println!("Environment variables:");
                println!("  TINYLISP_TRACE=1    Log collections and macro expansions to stderr");
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("tinylisp: unrecognized option, `{}'", other);
                eprintln!("Try 'tinylisp --help' for usage information.");
                std::process::exit(1);
            }
            other => {
                if path.is_some() {
                    eprintln!("tinylisp: only one source file may be given");
                    std::process::exit(1);
                }
                path = Some(other.to_string());
                i += 1;
            }
        }
    }

    let mut machine = match Machine::new(config, Box::new(NullEditor)) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("tinylisp: cannot start, {}", e);
            std::process::exit(1);
        }
    };
    machine.set_output(Output::stdout());

    match path {
        Some(path) => {
            let stream = File::open(&path).and_then(Stream::from_file);
            match stream {
                Ok(mut stream) => run_batch(&mut machine, &mut stream),
                Err(e) => {
                    eprintln!("tinylisp: open() failed, {}", e);
                    std::process::exit(1);
                }
            }
        }
        None if io::stdin().is_terminal() => run_interactive(&mut machine),
        None => {
            let mut stream = Stream::from_reader(io::stdin());
            run_batch(&mut machine, &mut stream);
        }
    }
}

fn init_tracing() {
    let verbose = std::env::var("TINYLISP_TRACE")
        .map(|v| v == "1")
        .unwrap_or(false);
    let level = if verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

/// Print each value; the first error is printed and ends the process.
fn run_batch(machine: &mut Machine, stream: &mut Stream) {
    if let Err(e) = machine.run_stream(stream, true) {
        machine.report_error(&e);
        std::process::exit(1);
    }
}

/// Interactive REPL: accumulate lines until parens are balanced, then evaluate.
fn run_interactive(machine: &mut Machine) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("tinylisp: cannot open terminal, {}", e);
            std::process::exit(1);
        }
    };

    let mut buf = String::new();
    let mut depth: i32 = 0;

    loop {
        let prompt = if depth == 0 { "tiny> " } else { "      " };
        match rl.readline(prompt) {
            Ok(line) => {
                depth += paren_depth(&line);
                buf.push_str(&line);
                buf.push('\n');

                if depth <= 0 {
                    depth = 0;
                    let input = std::mem::take(&mut buf);
                    if input.trim().is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input.trim());
                    let mut stream = Stream::from_text(&input);
                    if let Err(e) = machine.run_stream(&mut stream, true) {
                        machine.report_error(&e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                buf.clear();
                depth = 0;
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("tinylisp: read error, {}", e);
                break;
            }
        }
    }
}

/// Net paren count of one line, ignoring string literals and comments.
fn paren_depth(line: &str) -> i32 {
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;
    for ch in line.chars() {
        if in_string {
            match ch {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            ';' => break,
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    depth
}
