use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;

use clap::Parser;
use csvsql::{execute_query, CsvOptions};
use tracing_subscriber::EnvFilter;

/// Run SQL SELECT queries over CSV files.
#[derive(Parser, Debug)]
#[command(name = "csvsql", version, about, long_about = None)]
struct Args {
    /// Query to run, e.g. 'SELECT * FROM "people.csv" LIMIT 5'. Starts an
    /// interactive shell when omitted.
    query: Option<String>,

    /// Field delimiter for both input and output (a single ASCII character, or \t)
    #[arg(short, long, default_value = ",", value_parser = parse_delimiter)]
    delimiter: u8,

    /// Do not write a header row
    #[arg(long)]
    no_headers: bool,
}

/// REPL configuration state.
struct ReplState {
    options: CsvOptions,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let options = CsvOptions {
        delimiter: args.delimiter,
        headers: !args.no_headers,
    };

    match args.query {
        Some(query) => match run_query(&query, &options) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
        None => {
            repl(ReplState { options });
            ExitCode::SUCCESS
        }
    }
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    if s == "\\t" {
        return Ok(b'\t');
    }
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(format!(
            "delimiter must be a single ASCII character, got {s:?}"
        )),
    }
}

fn run_query(query: &str, options: &CsvOptions) -> csvsql::Result<()> {
    let stdout = io::stdout();
    let mut out = execute_query(query, options, stdout.lock())?;
    out.flush()?;
    Ok(())
}

fn repl(mut state: ReplState) {
    let stdin = io::stdin();
    let is_tty = stdin.is_terminal();
    let mut reader = stdin.lock();
    let mut input_buf = String::new();

    if is_tty {
        eprintln!("Enter a query ending in \";\", or \".help\" for help.");
    }

    loop {
        if is_tty {
            let prompt = if input_buf.is_empty() {
                "csvsql> "
            } else {
                "   ...> "
            };
            let mut out = io::stdout().lock();
            let _ = out.write_all(prompt.as_bytes());
            let _ = out.flush();
        }

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                if is_tty {
                    println!();
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        }

        if input_buf.is_empty() {
            let trimmed = line.trim();
            if trimmed.starts_with('.') {
                if !handle_dot_command(trimmed, &mut state) {
                    break;
                }
                continue;
            }
        }

        input_buf.push_str(&line);
        if !has_complete_statement(&input_buf) {
            continue;
        }

        let text = std::mem::take(&mut input_buf);
        for statement in split_statements(&text) {
            if let Err(e) = run_query(&statement, &state.options) {
                eprintln!("Error: {e}");
            }
        }
    }
}

/// Handle a dot-command. Returns false when the shell should exit.
fn handle_dot_command(input: &str, state: &mut ReplState) -> bool {
    let mut parts = input.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match cmd.as_str() {
        ".quit" | ".exit" => return false,
        ".headers" => match arg.to_lowercase().as_str() {
            "on" => state.options.headers = true,
            "off" => state.options.headers = false,
            _ => eprintln!("Usage: .headers on|off"),
        },
        ".help" => {
            println!(".exit                  Exit this program");
            println!(".headers on|off        Turn display of headers on or off");
            println!(".help                  Show this help");
            println!(".quit                  Exit this program");
        }
        _ => {
            eprintln!(
                "Error: unknown command or invalid arguments: \"{cmd}\". Enter \".help\" for help"
            );
        }
    }
    true
}

/// Tracks whether the scanner is inside a quoted literal, following the
/// tokenizer's rules: `'`, `"` and `` ` `` delimit literals and a backslash
/// escapes the next character.
#[derive(Debug, Default)]
struct QuoteScanner {
    delimiter: Option<char>,
    escaped: bool,
}

impl QuoteScanner {
    /// Feed one character; returns true if it is a `;` outside any literal.
    fn is_terminator(&mut self, ch: char) -> bool {
        match self.delimiter {
            Some(_) if self.escaped => self.escaped = false,
            Some(_) if ch == '\\' => self.escaped = true,
            Some(d) if ch == d => self.delimiter = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => self.delimiter = Some(ch),
                ';' => return true,
                _ => {}
            },
        }
        false
    }
}

/// Whether the buffer holds a `;` outside of any quoted literal.
fn has_complete_statement(input: &str) -> bool {
    let mut scanner = QuoteScanner::default();
    input.chars().any(|ch| scanner.is_terminator(ch))
}

/// Split input into statements on `;` outside of quoted literals. Text after
/// the last `;` is kept as a final statement.
fn split_statements(input: &str) -> Vec<String> {
    let mut scanner = QuoteScanner::default();
    let mut statements = Vec::new();
    let mut current = String::new();

    for ch in input.chars() {
        current.push(ch);
        if scanner.is_terminator(ch) {
            let trimmed = current.trim();
            if trimmed != ";" {
                statements.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    statements
}
