//! Build script for monoplay.
//!
//! Sets Git-related environment variables if available, for inclusion in the version string:
//! * `MONOPLAY_COMMIT_HASH` - Abbreviated commit hash
//! * `MONOPLAY_COMMIT_DATE` - Commit date
//!
//! The Git information can be accessed at runtime using:
//! * `env!("MONOPLAY_COMMIT_HASH")` for the commit hash
//! * `env!("MONOPLAY_COMMIT_DATE")` for the commit date

use git2::Repository;
use time::OffsetDateTime;

fn main() {
    let Ok(repo) = Repository::open(".") else {
        return;
    };
    let Some(commit) = repo.head().ok().and_then(|head| head.peel_to_commit().ok()) else {
        return;
    };

    if let Some(hash) = commit
        .as_object()
        .short_id()
        .ok()
        .and_then(|buf| buf.as_str().map(std::string::ToString::to_string))
    {
        println!("cargo:rustc-env=MONOPLAY_COMMIT_HASH={hash}");
    }

    if let Ok(timestamp) = OffsetDateTime::from_unix_timestamp(commit.time().seconds()) {
        let format = time::format_description::parse("[year]-[month]-[day]")
            .expect("invalid date format string");
        if let Ok(date) = timestamp.format(&format) {
            println!("cargo:rustc-env=MONOPLAY_COMMIT_DATE={date}");
        }
    }
}
