//! mdbundle: convert Markdown files into textbundle packages.
//!
//! Thin wrapper around the conversion engine: parses arguments, collects
//! timestamps for each file, and reports results. Documents are processed
//! strictly sequentially; the first failure halts the run.

use anyhow::{Context, Result};
use clap::Parser;
use mdbundle::cli::Cli;
use mdbundle::{convert, dates, ConvertRequest, Error, FetchObserver, NullObserver, StderrReporter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("Error: {:#}", err);
        std::process::exit(error_to_exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let observer: Arc<dyn FetchObserver> = if cli.verbose {
        Arc::new(StderrReporter)
    } else {
        Arc::new(NullObserver)
    };

    for file in &cli.files {
        process(cli, file, Arc::clone(&observer))
            .with_context(|| format!("Failed to convert {}", file.display()))?;
    }

    Ok(())
}

fn process(cli: &Cli, file: &Path, observer: Arc<dyn FetchObserver>) -> Result<()> {
    let contents =
        fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let source_path = fs::canonicalize(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;

    let (created, modified) = if cli.git_dates {
        dates::git_times(&source_path)?
    } else {
        dates::file_times(&source_path)?
    };

    let destination = match &cli.dest {
        Some(dest) => dest.clone(),
        None => source_dir(&source_path),
    };

    if cli.verbose {
        eprintln!("Converting {}", file.display());
    }

    let bundle_path = convert(ConvertRequest {
        contents,
        source_path,
        created,
        modified,
        destination,
        process_attachments: cli.process_attachments,
        trailer: cli.append.as_ref().map(|text| text.replace("\\n", "\n")),
        concurrent: cli.concurrent,
        observer,
    })?;

    println!("{}", bundle_path.display());
    Ok(())
}

fn source_dir(source_path: &Path) -> PathBuf {
    match source_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Map a conversion failure to the documented exit codes.
fn error_to_exit_code(error: &anyhow::Error) -> i32 {
    if let Some(err) = error.downcast_ref::<Error>() {
        return match err {
            Error::NotFound { .. } => 3,
            Error::Parse { .. } => 4,
            Error::Network { .. } | Error::FileSystem { .. } => 10,
        };
    }

    if let Some(io_err) = error.downcast_ref::<std::io::Error>() {
        return match io_err.kind() {
            std::io::ErrorKind::NotFound => 3,
            _ => 10,
        };
    }

    1
}
