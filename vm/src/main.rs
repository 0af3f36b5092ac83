use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    process,
};

use clap::Parser as ClapParser;
use rustyline::{
    completion::{Completer, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::DefaultHistory,
    validate::Validator,
    Config, Context, Editor, Helper,
};

use heap::HeapSettings;
use vm::{Error, Interpreter, Settings};

const PROMPT: &str = "lax> ";
const CONTINUATION_PROMPT: &str = "...> ";

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scheme files to load in order
    #[arg(required = false, help = "The .scm files to load")]
    files: Vec<PathBuf>,

    /// Start the REPL after loading files (default if nothing else to do)
    #[arg(long, help = "Force REPL mode after loading files")]
    repl: bool,

    /// Evaluate an expression and print its value
    #[arg(short, long, value_name = "EXPR")]
    eval: Vec<String>,

    #[arg(long, default_value_t = HeapSettings::default().segment_size, help = "Cells per heap segment")]
    segment_size: usize,

    #[arg(long, default_value_t = HeapSettings::default().max_segments, help = "Maximum number of heap segments")]
    max_segments: usize,

    #[arg(long, help = "Report every garbage collection")]
    gc_verbose: bool,

    #[arg(long, default_value_t = 1000, help = "Number of REPL history entries kept")]
    history_size: usize,

    #[arg(long, help = "REPL history file (default: ~/.lax_history)")]
    history_file: Option<PathBuf>,

    #[arg(long, help = "Do not read or write REPL history")]
    no_history: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let heap = HeapSettings {
        segment_size: cli.segment_size,
        max_segments: cli.max_segments,
        min_free_after_gc: cli.segment_size / 4,
        ..HeapSettings::default()
    };
    let settings = Settings {
        heap,
        gc_verbose: cli.gc_verbose,
        ..Settings::default()
    };
    let mut interp = match Interpreter::with_settings(settings) {
        Ok(interp) => interp,
        Err(err) => {
            eprintln!("Error starting interpreter: {err}");
            process::exit(1);
        }
    };

    for path in &cli.files {
        if let Err(err) = interp.load_file(path) {
            finish(&mut interp, &err);
            eprintln!("Error loading {}: {err}", path.display());
            process::exit(1);
        }
    }

    for source in &cli.eval {
        match interp.eval_str(source) {
            Ok(value) => print_value(&mut interp, value),
            Err(err) => {
                finish(&mut interp, &err);
                eprintln!("Error: {err}");
                process::exit(1);
            }
        }
    }

    if cli.repl || (cli.files.is_empty() && cli.eval.is_empty()) {
        let history = (!cli.no_history).then(|| cli.history_file.clone().unwrap_or_else(default_history_file));
        if let Err(err) = run_repl(&mut interp, cli.history_size, history.as_deref()) {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    }
}

/// Exits with the requested code when `err` came from `(exit n)`.
fn finish(interp: &mut Interpreter, err: &Error) {
    if let Error::Exit(code) = err {
        let _ = interp.flush_output();
        process::exit(*code);
    }
}

fn default_history_file() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".lax_history")
}

fn print_value(interp: &mut Interpreter, value: vm::CellRef) {
    if value != interp.unspecified() {
        let text = interp.write_to_string(value);
        if let Err(err) = interp.write_output(&format!("{text}\n")) {
            eprintln!("Error: {err}");
        }
    }
    if let Err(err) = interp.flush_output() {
        eprintln!("Error: {err}");
    }
}

/// Completion over interned symbol names, with the first match as a hint.
struct LaxHelper {
    symbols: Vec<String>,
}

impl LaxHelper {
    fn word_start(line: &str, pos: usize) -> usize {
        line[..pos]
            .rfind(|c: char| c.is_whitespace() || "()'`,\"".contains(c))
            .map_or(0, |i| i + 1)
    }

    fn candidates<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> {
        self.symbols
            .iter()
            .filter(move |name| !prefix.is_empty() && name.starts_with(prefix))
    }
}

impl Completer for LaxHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = Self::word_start(line, pos);
        let matches = self
            .candidates(&line[start..pos])
            .map(|name| Pair {
                display: name.clone(),
                replacement: name.clone(),
            })
            .collect();
        Ok((start, matches))
    }
}

impl Hinter for LaxHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        let start = Self::word_start(line, pos);
        let prefix = &line[start..pos];
        self.candidates(prefix)
            .find(|name| name.len() > prefix.len())
            .map(|name| name[prefix.len()..].to_owned())
    }
}

impl Highlighter for LaxHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[2m{hint}\x1b[0m"))
    }
}

impl Validator for LaxHelper {}

impl Helper for LaxHelper {}

fn run_repl(interp: &mut Interpreter, history_size: usize, history: Option<&Path>) -> rustyline::Result<()> {
    let config = Config::builder()
        .max_history_size(history_size)?
        .history_ignore_dups(true)?
        .auto_add_history(false)
        .build();
    let mut rl: Editor<LaxHelper, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(LaxHelper {
        symbols: interp.symbol_names(),
    }));
    if let Some(path) = history {
        if let Err(err) = rl.load_history(path) {
            log::debug!("no history loaded from {}: {err}", path.display());
        }
    }

    println!("Lax Scheme REPL");
    println!("Type (exit) or Ctrl-D to quit.");

    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() { PROMPT } else { CONTINUATION_PROMPT };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                pending.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err),
        };
        pending.push_str(&line);
        pending.push('\n');
        if pending.trim().is_empty() {
            pending.clear();
            continue;
        }

        let forms = match interp.read_str(&pending) {
            Ok(forms) => forms,
            Err(err) if err.is_incomplete_input() => continue,
            Err(err) => {
                eprintln!("Error: {err}");
                rl.add_history_entry(pending.trim_end())?;
                pending.clear();
                continue;
            }
        };
        rl.add_history_entry(pending.trim_end())?;
        pending.clear();

        interp.pin(forms);
        let result = eval_forms(interp, forms);
        interp.unpin(forms);
        if let Err(err) = result {
            if let Error::Exit(code) = err {
                save_history(&mut rl, history);
                let _ = interp.flush_output();
                process::exit(code);
            }
            eprintln!("Error: {err}");
        }

        if let Some(helper) = rl.helper_mut() {
            helper.symbols = interp.symbol_names();
        }
    }

    save_history(&mut rl, history);
    Ok(())
}

fn eval_forms(interp: &mut Interpreter, forms: vm::CellRef) -> vm::Result<()> {
    for form in interp.list_to_vec(forms)? {
        let value = interp.evaluate(form)?;
        print_value(interp, value);
    }
    Ok(())
}

fn save_history(rl: &mut Editor<LaxHelper, DefaultHistory>, history: Option<&Path>) {
    if let Some(path) = history {
        if let Err(err) = rl.save_history(path) {
            log::warn!("could not save history to {}: {err}", path.display());
        }
    }
}
