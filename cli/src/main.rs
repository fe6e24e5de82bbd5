use std::{
    collections::BTreeMap,
    env,
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser};
use console::style;
use mdspell_core::{atd, Diagnostic, RawMatch, Settings, Severity, Speller};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// mdspell CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "mdspell",
    about = "Check markdown and text files for spelling and grammar mistakes."
)]
struct Args {
    /// Path to the settings file (JSON). Defaults are used when it is missing.
    #[arg(long, default_value = ".vscode/spell.json")]
    config: PathBuf,

    /// Emit JSON output for automation.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Exit non-zero when any problem is reported.
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Only print the summary line.
    #[arg(long, action = ArgAction::SetTrue)]
    quiet: bool,

    /// Check in this language instead of the configured one.
    #[arg(long, value_name = "CODE")]
    language: Option<String>,

    /// Read checker matches from a JSON file instead of calling the service.
    /// Only valid with a single input file.
    #[arg(long, value_name = "FILE")]
    matches: Option<PathBuf>,

    /// Extra words to ignore (comma-separated).
    #[arg(long = "ignore", value_delimiter = ',', value_name = "WORD[,WORD]")]
    ignore: Vec<String>,

    /// Files or directories to check.
    #[arg(value_name = "PATH", default_value = ".", num_args = 0..)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(
    name = "mdspell normalize",
    about = "Print a file exactly as it is sent to the checker."
)]
struct NormalizeArgs {
    /// Path to the settings file (JSON).
    #[arg(long, default_value = ".vscode/spell.json")]
    config: PathBuf,

    /// File to normalize.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(Debug, Serialize)]
struct FileResult {
    path: String,
    kind: String,
    checked: bool,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
struct OutputReport {
    language: String,
    files: Vec<FileResult>,
    total_diagnostics: usize,
    severity_counts: BTreeMap<Severity, usize>,
    failed_files: usize,
}

/// Where raw matches come from for this run.
enum MatchSource {
    Service(ServiceChecker),
    File(Vec<RawMatch>),
}

/// Blocking client for the After the Deadline service.
struct ServiceChecker {
    http: reqwest::blocking::Client,
    key: String,
}

impl ServiceChecker {
    fn new() -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            key: atd::request_key(&atd::host_name()),
        }
    }

    fn check(&self, language: &str, text: &str) -> anyhow::Result<Vec<RawMatch>> {
        let request = atd::CheckRequest::new(language, text, &self.key);
        let body = self
            .http
            .post(&request.url)
            .form(&request.form)
            .send()
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("request to {} failed", request.url))?
            .text()
            .context("failed to read checker response")?;
        Ok(atd::parse_response(&body)?)
    }
}

impl MatchSource {
    fn matches_for(&self, language: &str, normalized: &str) -> anyhow::Result<Vec<RawMatch>> {
        match self {
            MatchSource::Service(checker) => checker.check(language, normalized),
            MatchSource::File(matches) => Ok(matches.clone()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MDSPELL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let argv: Vec<OsString> = env::args_os().collect();
    if argv.len() > 1 && argv[1].as_os_str() == OsStr::new("normalize") {
        let mut forwarded = Vec::with_capacity(argv.len() - 1);
        forwarded.push(argv[0].clone());
        forwarded.extend_from_slice(&argv[2..]);
        return run_normalize(NormalizeArgs::parse_from(forwarded));
    }

    let args = Args::parse();
    run_check(args)
}

fn run_check(args: Args) -> anyhow::Result<()> {
    let mut settings = Settings::load_or_default(&args.config);
    if let Some(language) = &args.language {
        settings.set_language(language)?;
    }
    for word in &args.ignore {
        settings.add_ignore_word(word);
    }
    let speller = Speller::new(settings);
    if !args.json {
        for err in speller.config_errors() {
            eprintln!("{} {}", style("warning:").yellow(), err);
        }
    }

    let mut files = collect_files(&args.paths)?;
    files.retain(|(_, kind)| speller.is_applicable(kind));
    files.sort();

    let source = match &args.matches {
        Some(path) => {
            if files.len() != 1 {
                bail!("--matches needs exactly one input file, got {}", files.len());
            }
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let matches: Vec<RawMatch> = serde_json::from_str(&text)
                .with_context(|| format!("Invalid matches in {}", path.display()))?;
            MatchSource::File(matches)
        }
        None => MatchSource::Service(ServiceChecker::new()),
    };

    let language = speller.settings().language.clone();
    let mut file_results = Vec::new();
    let mut severity_counts: BTreeMap<Severity, usize> = BTreeMap::new();
    let mut total = 0usize;
    let mut failed = 0usize;

    for (path, kind) in files {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let normalized = speller.normalize(&content);

        let (checked, diagnostics) = match source.matches_for(&language, &normalized) {
            Ok(matches) => (true, speller.diagnose(&normalized, &matches)),
            Err(err) => {
                failed += 1;
                tracing::warn!(path = %path.display(), "check failed: {err:#}");
                if !args.json {
                    eprintln!(
                        "{} {}: {err:#}",
                        style("check failed:").red(),
                        path.display()
                    );
                }
                (false, Vec::new())
            }
        };

        if checked && !args.quiet && !args.json {
            print_human_report(&path, &diagnostics);
        }

        total += diagnostics.len();
        for diag in &diagnostics {
            *severity_counts.entry(diag.severity).or_default() += 1;
        }
        file_results.push(FileResult {
            path: path.to_string_lossy().to_string(),
            kind: kind.to_string(),
            checked,
            diagnostics,
        });
    }

    let checked_files = file_results.len() - failed;
    let output = OutputReport {
        language,
        files: file_results,
        total_diagnostics: total,
        severity_counts,
        failed_files: failed,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "\n{} files checked in {}, {} problems{}",
            checked_files,
            mdspell_core::language_name(&output.language),
            total,
            if failed > 0 {
                format!(", {failed} failed")
            } else {
                String::new()
            }
        );
    }

    if args.strict && total > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn run_normalize(args: NormalizeArgs) -> anyhow::Result<()> {
    let speller = Speller::new(Settings::load_or_default(&args.config));
    for err in speller.config_errors() {
        eprintln!("{} {}", style("warning:").yellow(), err);
    }
    let content = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    print!("{}", speller.normalize(&content));
    Ok(())
}

fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<(PathBuf, &'static str)>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(kind) = document_kind(entry.path()) {
                    files.push((entry.path().to_path_buf(), kind));
                }
            }
        } else if path.is_file() {
            if let Some(kind) = document_kind(path) {
                files.push((path.clone(), kind));
            }
        }
    }
    Ok(files)
}

/// Editor language id for a file, by extension.
fn document_kind(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => match ext.to_lowercase().as_str() {
            "md" | "markdown" | "mdx" => Some("markdown"),
            "txt" | "text" => Some("plaintext"),
            _ => None,
        },
        None => None,
    }
}

fn print_human_report(path: &Path, diagnostics: &[Diagnostic]) {
    println!("{}", style(path.to_string_lossy()).bold());
    if diagnostics.is_empty() {
        println!("  {}", style("clean").green());
        return;
    }
    for diag in diagnostics {
        let problem = &diag.problem;
        let label = match diag.severity {
            Severity::Error => style("error").red(),
            Severity::Warning => style("warning").yellow(),
            Severity::Information => style("info").cyan(),
            Severity::Hint => style("hint").dim(),
            Severity::Disable => continue,
        };
        println!(
            "  {}:{} {} {}",
            problem.start_line + 1,
            problem.start_column + 1,
            label,
            problem.message
        );
    }
}
