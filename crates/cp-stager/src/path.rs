//! Relative path normalization for staged inputs.

/// Normalize a caller-supplied relative path.
///
/// Backslashes are treated as separators, leading slashes are stripped, and
/// any segment equal to `.` or `..` (or an otherwise-empty segment) disqualifies
/// the whole path — callers treat `None` as "no usable relative path" and
/// fall back to a name or basename, or drop the entry entirely.
#[must_use]
pub fn normalize_relative_path(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let clean = raw.replace('\\', "/");
    let clean = clean.trim().trim_start_matches('/');
    if clean.is_empty() {
        return None;
    }
    let parts: Vec<&str> = clean.split('/').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() || parts.iter().any(|p| *p == "." || *p == "..") {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_slash_and_backslashes() {
        assert_eq!(
            normalize_relative_path(Some("\\a\\b")),
            Some("a/b".to_string())
        );
        assert_eq!(
            normalize_relative_path(Some("/a/b")),
            Some("a/b".to_string())
        );
    }

    #[test]
    fn rejects_dot_and_dotdot_segments() {
        assert_eq!(normalize_relative_path(Some("a/../b")), None);
        assert_eq!(normalize_relative_path(Some("./a")), None);
        assert_eq!(normalize_relative_path(Some("..")), None);
    }

    #[test]
    fn rejects_empty_and_none() {
        assert_eq!(normalize_relative_path(Some("")), None);
        assert_eq!(normalize_relative_path(Some("   ")), None);
        assert_eq!(normalize_relative_path(None), None);
    }

    #[test]
    fn collapses_repeated_slashes() {
        assert_eq!(
            normalize_relative_path(Some("a//b///c")),
            Some("a/b/c".to_string())
        );
    }
}
