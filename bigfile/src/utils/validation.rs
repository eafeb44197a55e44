use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static UPLOADER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").unwrap());

static EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{1,16}$").unwrap());

/// Uploader ids end up in directory names, so only a conservative charset is allowed.
pub fn is_valid_uploader_id(uid: &str) -> bool {
    UPLOADER_ID.is_match(uid) && !uid.contains("..")
}

/// Returns the extension of `name` including the leading dot, or an empty
/// string when there is none. Dotfiles such as `.bashrc` have no extension.
/// Extensions outside `[A-Za-z0-9]{1,16}` are dropped.
pub fn extension_of(name: &str) -> String {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if EXTENSION.is_match(ext) => format!(".{ext}"),
        _ => String::new(),
    }
}

/// Parses the `Range` header forms accepted for downloads (`bytes=N-`).
pub fn parse_range_start(range: &str) -> Option<u64> {
    let value = range.trim().strip_prefix("bytes=")?;
    let (start, end) = value.split_once('-')?;
    if !end.trim().is_empty() {
        return None;
    }
    start.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uploader_ids() {
        assert!(is_valid_uploader_id("user_42"));
        assert!(is_valid_uploader_id("a.b-c"));
        assert!(!is_valid_uploader_id(""));
        assert!(!is_valid_uploader_id("../etc"));
        assert!(!is_valid_uploader_id("a/b"));
        assert!(!is_valid_uploader_id("a..b"));
        assert!(!is_valid_uploader_id(&"x".repeat(129)));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("movie.mp4"), ".mp4");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of("dir/../evil.sh"), ".sh");
        assert_eq!(extension_of("C:\\tmp\\x.ZIP"), ".ZIP");
        assert_eq!(extension_of("weird.ex t"), "");
    }

    #[test]
    fn test_parse_range_start() {
        assert_eq!(parse_range_start("bytes=100-"), Some(100));
        assert_eq!(parse_range_start("bytes=0-"), Some(0));
        assert_eq!(parse_range_start("bytes=0-10"), None);
        assert_eq!(parse_range_start("items=1-"), None);
    }
}
