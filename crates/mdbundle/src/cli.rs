//! Command-line interface definitions using clap.

use clap::Parser;
use std::path::PathBuf;

/// Convert Markdown files into textbundle packages
///
/// Each input file becomes a `<name>.textbundle/` directory containing the
/// rewritten document and every referenced image as a local asset. Files are
/// processed one at a time; the first failure stops the run.
///
/// Exit Codes:
///   0  - All documents converted
///   1  - Generic error occurred
///   3  - Input file or local reference not found
///   4  - Document could not be parsed
///  10  - Network or filesystem operation failed
#[derive(Parser)]
#[command(name = "mdbundle")]
#[command(about = "Convert Markdown files into textbundles", long_about = None)]
pub struct Cli {
    /// Markdown files to convert
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Replace links to local files with #todo tags to ease processing
    #[arg(short = 'p', long)]
    pub process_attachments: bool,

    /// Use dates from the file's git commit history instead of filesystem
    /// metadata (must be in a git repo and have the git CLI)
    #[arg(short = 'g', long)]
    pub git_dates: bool,

    /// Text to append to the end of the document. Use %f for the original
    /// filename; a literal \n becomes a newline
    #[arg(short = 'a', long)]
    pub append: Option<String>,

    /// Max concurrent image downloads
    #[arg(short = 'c', long, default_value_t = 5)]
    pub concurrent: usize,

    /// Destination bundle path or directory (defaults to the source file's
    /// directory)
    #[arg(short = 'd', long)]
    pub dest: Option<PathBuf>,

    /// Report download progress
    #[arg(short = 'v', long)]
    pub verbose: bool,
}
