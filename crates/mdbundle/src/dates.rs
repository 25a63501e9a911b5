//! Timestamp collaborators: filesystem metadata and git history dates.
//!
//! The conversion engine consumes two externally-supplied instants and
//! applies them to the published bundle; this module is where the CLI gets
//! them from. Bear-style importers use the bundle's creation/modification
//! times to order notes, so `--git-dates` can recover meaningful dates for
//! files whose filesystem metadata was clobbered by a checkout.

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::SystemTime;

/// Creation and modification instants from filesystem metadata.
///
/// Platforms/filesystems without a birth time fall back to the modification
/// time for creation.
pub fn file_times(path: &Path) -> Result<(SystemTime, SystemTime)> {
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    let modified = metadata
        .modified()
        .with_context(|| format!("No modification time for {}", path.display()))?;
    let created = metadata.created().unwrap_or(modified);
    Ok((created, modified))
}

/// Creation and modification instants from the file's git history.
///
/// Creation is the author date of the first commit touching the file
/// (following renames), modification the author date of the last. Requires
/// the `git` CLI and a committed file.
pub fn git_times(path: &Path) -> Result<(SystemTime, SystemTime)> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Path has no file name: {}", path.display()))?;

    let output = Command::new("git")
        .args(["log", "--follow", "--format=%aI", "--"])
        .arg(file_name)
        .current_dir(dir)
        .output()
        .context("Failed to execute git (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git log failed for {}: {}", path.display(), stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut dates = stdout.lines().filter(|line| !line.trim().is_empty());
    // git log prints newest first
    let newest = dates
        .next()
        .with_context(|| format!("No git history for {}", path.display()))?;
    let oldest = dates.last().unwrap_or(newest);

    Ok((parse_author_date(oldest)?, parse_author_date(newest)?))
}

fn parse_author_date(raw: &str) -> Result<SystemTime> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .with_context(|| format!("Invalid git author date: {}", raw))?;
    Ok(SystemTime::from(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    #[test]
    fn test_file_times_of_fresh_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("note.md");
        fs::write(&path, "hello").unwrap();

        let (created, modified) = file_times(&path).unwrap();
        assert!(created <= SystemTime::now());
        assert!(modified <= SystemTime::now());
    }

    #[test]
    fn test_file_times_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(file_times(&temp.path().join("absent.md")).is_err());
    }

    #[test]
    fn test_parse_author_date() {
        let parsed = parse_author_date("2020-01-02T03:04:05+00:00").unwrap();
        assert_eq!(
            parsed.duration_since(UNIX_EPOCH).unwrap(),
            Duration::from_secs(1_577_934_245)
        );
    }

    #[test]
    fn test_parse_author_date_rejects_garbage() {
        assert!(parse_author_date("not a date").is_err());
    }

    #[test]
    fn test_git_times_from_commit_history() {
        let temp = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(temp.path())
                .env("GIT_AUTHOR_DATE", "2021-06-01T12:00:00+00:00")
                .env("GIT_COMMITTER_DATE", "2021-06-01T12:00:00+00:00")
                .status()
                .expect("git command failed to start");
            assert!(status.success(), "git {:?} failed", args);
        };
        run(&["init", "--quiet"]);
        run(&["config", "user.name", "Test User"]);
        run(&["config", "user.email", "test@example.com"]);

        let path = temp.path().join("note.md");
        fs::write(&path, "v1").unwrap();
        run(&["add", "note.md"]);
        run(&["commit", "--quiet", "-m", "add note"]);

        let (created, modified) = git_times(&path).unwrap();
        let expected = parse_author_date("2021-06-01T12:00:00+00:00").unwrap();
        assert_eq!(created, expected);
        assert_eq!(modified, expected);
    }

    #[test]
    fn test_git_times_untracked_file_is_error() {
        let temp = TempDir::new().unwrap();
        let status = Command::new("git")
            .args(["init", "--quiet"])
            .current_dir(temp.path())
            .status()
            .expect("git command failed to start");
        assert!(status.success());

        let path = temp.path().join("untracked.md");
        fs::write(&path, "x").unwrap();
        assert!(git_times(&path).is_err());
    }
}
