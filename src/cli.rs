use crate::config::loader::EngineConfig;
use crate::config::types::{CoderunError, ExecutionOutcome};
use crate::exec::{ExecutionEngine, ExecutionRequest, SessionEvent};
use crate::kernel::signal::ShutdownSignal;
use crate::utils::json_schema::{ExecuteResponse, LanguageInfo};
use crate::utils::output::Stream;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

const EXIT_FAILED: i32 = 1;
const EXIT_REJECTED: i32 = 2;
const EVENT_POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(author, version, about = "Compile and run source code in many languages", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to ./coderun.json when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Source code as a string
    #[arg(long)]
    code: Option<String>,
    /// Read source code from a file
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

impl SourceArgs {
    fn read(&self) -> Result<String> {
        match (&self.code, &self.file) {
            (Some(code), _) => Ok(code.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read source file {}", path.display())),
            (None, None) => anyhow::bail!("either --code or --file is required"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program to completion with all stdin supplied up front
    Execute {
        /// Language name or alias (python, js, c++, cs, ...)
        #[arg(long)]
        language: String,
        #[command(flatten)]
        source: SourceArgs,
        /// Input passed to the program's stdin
        #[arg(long, conflicts_with = "stdin_file")]
        stdin: Option<String>,
        /// Read stdin input from a file
        #[arg(long, value_name = "PATH")]
        stdin_file: Option<PathBuf>,
        /// Run phase time limit in seconds
        #[arg(long, value_name = "SECS")]
        run_timeout: Option<u64>,
        /// Compile phase time limit in seconds
        #[arg(long, value_name = "SECS")]
        compile_timeout: Option<u64>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a program and forward this terminal's input to it line by line
    Interactive {
        #[arg(long)]
        language: String,
        #[command(flatten)]
        source: SourceArgs,
        /// Run phase time limit in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// List supported languages and their aliases
    Languages {
        #[arg(long)]
        json: bool,
    },
    /// Check which language toolchains are installed
    CheckDeps {
        /// Show where each executable was found
        #[arg(long)]
        verbose: bool,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    if !cfg!(unix) {
        eprintln!("Error: coderun requires a Unix-like system for process-group control");
        std::process::exit(EXIT_FAILED);
    }

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_default()?,
    };

    match cli.command {
        Commands::Execute {
            language,
            source,
            stdin,
            stdin_file,
            run_timeout,
            compile_timeout,
            json,
        } => {
            let code = source.read()?;
            let stdin = match (stdin, stdin_file) {
                (Some(stdin), _) => stdin,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read stdin file {}", path.display()))?,
                (None, None) => String::new(),
            };

            let mut request = ExecutionRequest::new(language, code).with_stdin(stdin);
            if let Some(secs) = run_timeout {
                request = request.with_run_timeout(Duration::from_secs(secs));
            }
            if let Some(secs) = compile_timeout {
                request = request.with_compile_timeout(Duration::from_secs(secs));
            }

            let engine = ExecutionEngine::new(config)?;
            let outcome = match engine.execute(request) {
                Ok(outcome) => outcome,
                Err(e) => reject(e),
            };

            if json {
                println!("{}", ExecuteResponse::from_outcome(&outcome).to_json()?);
            } else {
                print_outcome(&outcome)?;
            }
            std::process::exit(if outcome.is_success() { 0 } else { EXIT_FAILED });
        }
        Commands::Interactive {
            language,
            source,
            timeout,
        } => {
            let code = source.read()?;
            let mut request = ExecutionRequest::new(language, code);
            if let Some(secs) = timeout {
                request = request.with_run_timeout(Duration::from_secs(secs));
            }
            let engine = ExecutionEngine::new(config)?;
            let outcome = run_interactive(&engine, request)?;
            std::process::exit(if outcome.is_success() { 0 } else { EXIT_FAILED });
        }
        Commands::Languages { json } => list_languages(&config, json),
        Commands::CheckDeps { verbose } => check_language_dependencies(&config, verbose),
    }
}

/// Rejected requests never ran; report and exit
fn reject(error: CoderunError) -> ! {
    match &error {
        CoderunError::UnsupportedLanguage(_) | CoderunError::SourceTooLarge { .. } => {
            eprintln!("❌ {}", error);
            eprintln!("Run `coderun languages` to see supported languages.");
        }
        _ => eprintln!("❌ Engine error: {}", error),
    }
    std::process::exit(EXIT_REJECTED);
}

fn print_outcome(outcome: &ExecutionOutcome) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&outcome.stdout)?;
    stdout.flush()?;

    let mut stderr = std::io::stderr().lock();
    stderr.write_all(&outcome.stderr)?;
    if let Some(message) = outcome.kind.message() {
        // Diagnostics already printed verbatim above
        if message != outcome.stderr_text() {
            writeln!(stderr, "❌ {}", message.trim_end())?;
        }
    }
    if outcome.stdout_truncated || outcome.stderr_truncated {
        writeln!(stderr, "⚠️  Output exceeded the configured limit and was truncated")?;
    }
    Ok(())
}

fn run_interactive(engine: &ExecutionEngine, request: ExecutionRequest) -> Result<ExecutionOutcome> {
    let shutdown = ShutdownSignal::install().map_err(anyhow::Error::msg)?;

    let mut session = match engine.start_session(request) {
        Ok(session) => session,
        Err(e) => reject(e),
    };
    log::info!("Interactive session {} ({})", session.id(), session.language());

    if let Some(input) = session.take_input() {
        std::thread::Builder::new()
            .name("coderun-terminal".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if input.send(line).is_err() {
                        break;
                    }
                }
                // input dropped: program sees EOF
            })
            .context("failed to start terminal reader")?;
    }

    let mut cancelled = false;
    loop {
        match session.next_event_timeout(EVENT_POLL) {
            Some(SessionEvent::Output(chunk)) => match chunk.stream {
                Stream::Stdout => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(&chunk.data)?;
                    out.flush()?;
                }
                Stream::Stderr => {
                    let mut err = std::io::stderr().lock();
                    err.write_all(&chunk.data)?;
                    err.flush()?;
                }
            },
            Some(SessionEvent::Finished(outcome)) => {
                eprintln!();
                match outcome.kind.message() {
                    None => eprintln!("✅ Finished in {:?}", outcome.duration),
                    Some(message) => {
                        eprintln!("❌ {}: {}", outcome.kind.label(), message.trim_end())
                    }
                }
                return Ok(outcome);
            }
            None if session.is_finished() && session.events().is_empty() => {
                return Ok(session.wait());
            }
            None => {
                if shutdown.requested() && !cancelled {
                    eprintln!(
                        "\n⏹  Signal {} received, cancelling session {}",
                        shutdown.signal(),
                        session.id()
                    );
                    session.cancel();
                    cancelled = true;
                }
            }
        }
    }
}

fn list_languages(config: &EngineConfig, json: bool) -> Result<()> {
    let engine_registry = crate::judge::LanguageRegistry::builtin().with_overrides(config)?;
    let languages: Vec<LanguageInfo> = engine_registry
        .languages()
        .iter()
        .map(LanguageInfo::from)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&languages)?);
        return Ok(());
    }

    println!("{:<12} {:<22} {:<18} {}", "LANGUAGE", "NAME", "ALIASES", "MODE");
    for language in &languages {
        println!(
            "{:<12} {:<22} {:<18} {}",
            language.name,
            language.display_name,
            language.aliases.join(", "),
            if language.compiled { "compiled" } else { "interpreted" }
        );
    }
    Ok(())
}

fn check_language_dependencies(config: &EngineConfig, verbose: bool) -> Result<()> {
    let registry = crate::judge::LanguageRegistry::builtin().with_overrides(config)?;
    let report = registry.toolchain_report();

    println!("🔍 Checking language dependencies...");
    println!();

    let mut missing_languages = Vec::new();
    for profile in registry.languages() {
        let tools: Vec<_> = report
            .iter()
            .filter(|status| status.language == profile.name)
            .collect();
        let lang_ok = tools.iter().all(|status| status.is_available());

        if lang_ok {
            println!("✅ {} - OK", profile.display_name);
        } else {
            println!("❌ {} - MISSING", profile.display_name);
            missing_languages.push(profile);
        }

        if verbose {
            for status in &tools {
                match &status.path {
                    Some(path) => println!("  {} -> {}", status.tool, path.display()),
                    None => println!("  {} -> NOT FOUND", status.tool),
                }
            }
            println!();
        }
    }

    println!();
    if missing_languages.is_empty() {
        println!("🎉 All language dependencies are installed!");
        if verbose {
            println!();
            println!("💡 Usage examples:");
            println!("  coderun execute --language=python --code='print(\"Hello World\")'");
            println!("  coderun interactive --language=cpp --file=main.cpp");
        }
        return Ok(());
    }

    let names: Vec<_> = missing_languages
        .iter()
        .map(|profile| profile.display_name)
        .collect();
    println!("❌ Missing language dependencies: {}", names.join(", "));
    println!();
    println!("🔧 To install missing languages:");
    for profile in &missing_languages {
        println!("  • {}: {}", profile.display_name, profile.missing_hint);
    }
    std::process::exit(EXIT_FAILED);
}
