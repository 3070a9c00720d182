//! 命令行入口：对 HTML 文件执行一次词典替换

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};

use relabel::core::{print_error_message, relabel_document, RelabelOptions};
use relabel::env::{self, EnvVar};
use relabel::substitution::{Dictionary, Settings, SubstitutionResult};

#[derive(Parser, Debug)]
#[command(name = "relabel")]
#[command(version)]
#[command(about = "Replace short interface labels in HTML documents using a dictionary")]
#[command(after_help = env_help())]
struct Cli {
    /// Input HTML file, or - for stdin
    target: String,

    /// JSON dictionary file (repeatable, merged in order)
    #[arg(short = 'm', long = "mapping", value_name = "JSON")]
    mappings: Vec<PathBuf>,

    /// Start from the built-in dictionary
    #[arg(long)]
    builtin: bool,

    /// TOML settings file (overrides RELABEL_CONFIG)
    #[arg(short, long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Long text threshold in characters
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    threshold: Option<u32>,

    /// Input character encoding
    #[arg(short, long)]
    encoding: Option<String>,

    /// Output file (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn env_help() -> String {
    let mut help = String::from("Environment:\n");
    for (name, description) in env::describe_all() {
        help.push_str(&format!("  {:<30} {}\n", name, description));
    }
    help
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        tracing::Level::ERROR
    } else {
        match cli.verbose {
            0 => env::LogLevel::get_or_default("warn".to_string())
                .parse()
                .unwrap_or(tracing::Level::WARN),
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    };

    let colored = atty::is(atty::Stream::Stderr) && !env::NoColor::get_or_default(false);

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_ansi(colored)
        .with_target(false)
        .init();
}

fn build_options(cli: &Cli) -> SubstitutionResult<RelabelOptions> {
    let mut settings = match &cli.config {
        Some(path) => {
            let mut settings = Settings::from_file(path)?;
            settings.apply_env_overrides()?;
            settings
        }
        None => Settings::load()?,
    };

    if let Some(threshold) = cli.threshold {
        settings.long_text_threshold = threshold as usize;
    }
    settings.validate()?;

    let mut dictionary = if cli.builtin {
        Dictionary::builtin()
    } else {
        Dictionary::new()
    };
    dictionary.merge(std::mem::take(&mut settings.mapping));
    for path in cli.mappings.iter() {
        dictionary.merge(Dictionary::from_json_file(path)?);
    }
    if dictionary.is_empty() {
        tracing::warn!("词典为空，文档将保持不变");
    }
    settings.mapping = dictionary;

    Ok(RelabelOptions {
        encoding: cli.encoding.clone(),
        settings,
    })
}

fn run(cli: &Cli) -> SubstitutionResult<()> {
    let options = build_options(cli)?;
    let (output, stats) = relabel_document(&cli.target, &options)?;

    match &cli.output {
        Some(path) => fs::write(path, &output)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&output)?;
            stdout.flush()?;
        }
    }

    tracing::info!(
        "完成：写入 {} 处替换，完整遍历 {} 次",
        stats.substitutions,
        stats.full_walks
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(error) = run(&cli) {
        print_error_message(&format!("Error: {}", error));
        process::exit(1);
    }
}
