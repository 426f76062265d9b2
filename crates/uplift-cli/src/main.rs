use std::{env, fs, process::ExitCode};

use tracing_subscriber::EnvFilter;
use uplift::{Confidence, Term, decompile};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut report = false;
    let mut path: Option<&str> = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "--report" => report = true,
            "--help" | "-h" => {
                eprintln!("usage: uplift <term.json> [--report]");
                return ExitCode::SUCCESS;
            }
            other => path = Some(other),
        }
    }
    let Some(path) = path else {
        eprintln!("usage: uplift <term.json> [--report]");
        return ExitCode::FAILURE;
    };

    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("error: failed to read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let term = match Term::from_json(&json) {
        Ok(term) => term,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = decompile(&term);
    print!("{}", result.source);

    if report {
        eprintln!();
        eprintln!("confidence:  {:?}", result.verification.confidence);
        eprintln!("constants:   {:.2}", result.verification.constant_score);
        eprintln!("references:  {:.2}", result.verification.reference_score);
        eprintln!("placeholders: {:.2}", result.verification.placeholder_score);
        eprintln!("abstraction: {:.2}", result.verification.abstraction_score);
        for issue in &result.verification.issues {
            eprintln!("issue: {issue}");
        }
    }

    match result.verification.confidence {
        Confidence::High | Confidence::Medium => ExitCode::SUCCESS,
        Confidence::Low => ExitCode::FAILURE,
    }
}
