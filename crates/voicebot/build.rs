//! Stamps `GIT_SHA` (with a `-dirty` suffix for modified trees) and `BUILD_DATE`
//! (UTC calendar date, reproducible via `SOURCE_DATE_EPOCH`) into the binary.

use std::env;
use std::process::Command;

use time::OffsetDateTime;
use time::format_description;

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");

    let revision = match git(&["rev-parse", "--short=10", "HEAD"]) {
        Some(sha) if git(&["status", "--porcelain", "--untracked-files=no"]).is_some() => {
            format!("{sha}-dirty")
        }
        Some(sha) => sha,
        None => "unknown".to_string(),
    };
    println!("cargo:rustc-env=GIT_SHA={revision}");
    println!("cargo:rustc-env=BUILD_DATE={}", build_date());
}

/// Trimmed stdout of a successful git command, `None` if empty or git is unavailable.
fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn build_date() -> String {
    let now = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|secs| secs.parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    format_description::parse("[year]-[month]-[day]")
        .ok()
        .and_then(|format| now.format(&format).ok())
        .unwrap_or_else(|| "unknown-date".to_string())
}
