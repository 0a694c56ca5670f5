//! Filesystem-safe path construction for the tee output.
//!
//! Tag strings (artist, album, title) come from stream metadata and may contain
//! characters that are awkward or unsafe as path components. This module applies
//! one sanitization rule, consistently, to every tag before it becomes part of a
//! path, and builds the final save path from the sanitized parts without ever
//! re-writing a buffer into itself.

use std::path::{Path, PathBuf};

/// Replaces characters that don't belong in a path component.
///
/// * `/` becomes a space, since it would otherwise be read as a directory
///   separator.
/// * `"` is escaped with a leading backslash, so the tag can still be quoted
///   safely if it's later echoed into a shell command or playlist entry.
/// * `$` becomes `S`, the stricter of two rules that could apply here, chosen
///   so a single pass is always enough regardless of which path a tag travels.
/// * Every other character, including control characters, is preserved as-is.
#[must_use]
pub fn sanitize_component(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    for c in tag.chars() {
        match c {
            '/' => out.push(' '),
            '"' => {
                out.push('\\');
                out.push('"');
            }
            '$' => out.push('S'),
            c => out.push(c),
        }
    }
    out
}

/// Builds the directory a song's tee output and artwork should be written to:
/// `<base>/<artist>/<album>/`, with `artist` and `album` sanitized.
///
/// Builds each segment independently and joins them with `PathBuf::join`, rather than
/// growing one string by repeatedly formatting it into itself.
#[must_use]
pub fn save_dir(base: &Path, artist: &str, album: &str) -> PathBuf {
    base.join(sanitize_component(artist))
        .join(sanitize_component(album))
}

/// Builds the final save path for a song: `<save_dir>/<title>.<ext>`.
#[must_use]
pub fn save_path(dir: &Path, title: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}.{ext}", sanitize_component(title)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_slash_with_space() {
        assert_eq!(sanitize_component("AC/DC"), "AC DC");
    }

    #[test]
    fn escapes_quotes() {
        assert_eq!(sanitize_component("The \"Best\" Of"), "The \\\"Best\\\" Of");
    }

    #[test]
    fn replaces_dollar_with_s() {
        assert_eq!(sanitize_component("Money$"), "MoneyS");
    }

    #[test]
    fn preserves_control_characters() {
        assert_eq!(sanitize_component("Track\nTitle"), "Track\nTitle");
    }

    #[test]
    fn leaves_ordinary_text_untouched() {
        assert_eq!(sanitize_component("Abbey Road"), "Abbey Road");
    }

    #[test]
    fn save_dir_joins_sanitized_segments() {
        let dir = save_dir(Path::new("/music"), "AC/DC", "Back in Black");
        assert_eq!(dir, Path::new("/music/AC DC/Back in Black"));
    }

    #[test]
    fn save_path_appends_extension() {
        let dir = PathBuf::from("/music/AC DC/Back in Black");
        let path = save_path(&dir, "Hells Bells", "aac");
        assert_eq!(path, Path::new("/music/AC DC/Back in Black/Hells Bells.aac"));
    }
}
