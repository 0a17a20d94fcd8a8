//! Sync-root relative path rules
//!
//! Every path the engine stores is posix-style and rooted at `/`, the root of
//! the synchronized tree. These helpers keep that representation canonical
//! and hold the name filters shared by the local scanner, the delta applier
//! and selective sync.

use std::sync::OnceLock;

use regex::Regex;

/// Path of the sync root
pub const ROOT: &str = "/";

/// Names that are never synchronized (OS metadata, editor swap and lock files)
const EXCLUDE_PATTERN: &str =
    r"(?i)^(\.DS_Store|Thumbs\.db|desktop\.ini|\.(.*)\.(swpx|swp|swx)|\.dat(.*)|~lock\.(.*)#|\._(.*))$";

/// Characters the remote service rejects in names
const INVALID_CHARS: &[char] = &['\\', '<', '>', ':', '"', '/', '*', '?', '|'];

fn exclude_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EXCLUDE_PATTERN).expect("exclude pattern is a valid regex"))
}

/// Canonicalizes a rooted posix path: collapses separators, drops `.`
/// segments and resolves `..` without ever climbing above the root.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Joins a parent path and a child name
pub fn join_path(parent: &str, name: &str) -> String {
    normalize(&format!("{parent}/{name}"))
}

/// Parent directory of a path; the parent of the root is the root
pub fn parent_of(path: &str) -> String {
    normalize(&format!("{path}/.."))
}

/// Last component of a path; empty for the root
pub fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// True when a node whose `parent` field is `parent` lives somewhere below `dir`
pub fn is_in_subtree(parent: &str, dir: &str) -> bool {
    if dir == ROOT {
        return true;
    }
    parent == dir
        || parent
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Rewrites the `old` prefix of `parent` to `new`
///
/// Returns `None` when `parent` is not inside `old`.
pub fn rebase(parent: &str, old: &str, new: &str) -> Option<String> {
    if parent == old {
        return Some(new.to_string());
    }
    let rest = parent.strip_prefix(old)?;
    if !rest.starts_with('/') {
        return None;
    }
    Some(normalize(&format!("{new}{rest}")))
}

/// True for names matching the exclude pattern set
pub fn is_excluded(name: &str) -> bool {
    exclude_regex().is_match(name)
}

/// True for names containing control characters or characters the remote rejects
pub fn has_invalid_chars(name: &str) -> bool {
    name.chars()
        .any(|c| c <= '\u{1F}' || c == '\u{7F}' || INVALID_CHARS.contains(&c))
}

/// Splits a name into stem and extension at the last dot
///
/// A lone leading dot (`.bashrc`) is part of the stem, not an extension.
pub fn file_name_parts(name: &str) -> (&str, &str) {
    let parts = name.split('.').count();
    if parts == 1 || (parts == 2 && name.starts_with('.')) {
        return (name, "");
    }
    match name.rfind('.') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => (name, ""),
    }
}

/// Appends `.ext` to a stem when the extension is non-empty
pub fn with_extension(stem: &str, ext: &str) -> String {
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{ext}")
    }
}

/// Converts a name read from the local filesystem to the form stored in the node store
///
/// macOS hands out decomposed (NFD) names; everything else is kept as-is.
pub fn normalize_name(name: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        use unicode_normalization::UnicodeNormalization;
        name.nfc().collect()
    }
    #[cfg(not(target_os = "macos"))]
    {
        name.to_string()
    }
}
