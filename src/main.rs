use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use datatable::command::Session;
use datatable::config::Settings;
use datatable::interface::SessionInterface;
use datatable::server::{self, EvalResponse};

/// Tagged, traced and sortable in-memory tables driven by scripts
#[derive(Parser, Debug)]
#[command(name = "datatable", version, about)]
struct Args {
    /// Script files to evaluate in order; reads commands from stdin when none are given
    scripts: Vec<PathBuf>,

    /// Configuration file (defaults to datatable.toml/json/yaml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serve POST /v1/eval over HTTP instead of evaluating scripts
    #[arg(long)]
    serve: bool,

    /// Address to listen on, overriding the configured one
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Print each script result as a JSON object
    #[arg(long)]
    json: bool,
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn report(session: &mut Session) {
    session.update();
    for error in session.take_background_errors() {
        warn!(%error, "callback failed");
    }
}

fn run_scripts(settings: &Settings, scripts: &[PathBuf], json: bool) -> ExitCode {
    let mut session = Session::with_settings(settings);
    for (n, path) in scripts.iter().enumerate() {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                error!(path = %path.display(), error = %e, "can't read script");
                return ExitCode::FAILURE;
            }
        };
        let started = Instant::now();
        let outcome = session.eval(&text);
        report(&mut session);
        if json {
            let body = EvalResponse {
                id: n as u64 + 1,
                status: (if outcome.is_ok() { "ok" } else { "error" }).to_string(),
                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                result: outcome.as_ref().ok().cloned(),
                error: outcome.as_ref().err().map(ToString::to_string),
            };
            match serde_json::to_string(&body) {
                Ok(line) => println!("{line}"),
                Err(e) => error!(error = %e, "can't encode result"),
            }
        }
        match outcome {
            Ok(result) if !json && !result.is_empty() => println!("{result}"),
            Ok(_) => (),
            Err(e) => {
                error!(path = %path.display(), error = %e, "script failed");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Reads commands line by line; lines ending inside braces or quotes are
/// joined with the next one.
fn repl(settings: &Settings) -> ExitCode {
    let mut session = Session::with_settings(settings);
    let stdin = io::stdin();
    let mut pending = String::new();
    print!("% ");
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "can't read stdin");
                return ExitCode::FAILURE;
            }
        };
        pending.push_str(&line);
        pending.push('\n');
        match session.eval(&pending) {
            Err(datatable::TableError::Parse { .. }) if incomplete(&pending) => {
                print!("> ");
                let _ = io::stdout().flush();
                continue;
            }
            Ok(result) if !result.is_empty() => println!("{result}"),
            Ok(_) => (),
            Err(e) => eprintln!("error: {e}"),
        }
        pending.clear();
        report(&mut session);
        print!("% ");
        let _ = io::stdout().flush();
    }
    ExitCode::SUCCESS
}

fn incomplete(text: &str) -> bool {
    let (mut depth, mut quoted, mut escaped) = (0i64, false, false);
    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' if depth == 0 => quoted = !quoted,
            '{' if !quoted => depth += 1,
            '}' if !quoted => depth -= 1,
            _ => (),
        }
    }
    depth > 0 || quoted
}

fn serve(settings: &Settings, listen: Option<String>) -> ExitCode {
    let addr = listen.unwrap_or_else(|| settings.listen.clone());
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "can't start runtime");
            return ExitCode::FAILURE;
        }
    };
    let interface = Arc::new(SessionInterface::start(settings.clone()));
    match runtime.block_on(server::serve(&addr, interface)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%addr, error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings);
    info!(version = env!("CARGO_PKG_VERSION"), "datatable starting");
    if args.serve {
        serve(&settings, args.listen)
    } else if args.scripts.is_empty() {
        repl(&settings)
    } else {
        run_scripts(&settings, &args.scripts, args.json)
    }
}
