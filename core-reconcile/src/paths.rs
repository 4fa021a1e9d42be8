//! Path string helpers
//!
//! Catalog locations are plain strings recorded on whichever machine imported
//! them, so they may use either separator regardless of the host platform.
//! These helpers treat `\` and `/` alike and compare components
//! case-insensitively.

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Non-empty path components.
pub(crate) fn components(path: &str) -> Vec<&str> {
    path.split(is_separator).filter(|c| !c.is_empty()).collect()
}

fn same_component(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Components of `location` below `root`, if `location` lies strictly inside it.
pub(crate) fn relative_to<'a>(location: &'a str, root: &str) -> Option<Vec<&'a str>> {
    let root = components(root);
    let location = components(location);

    if root.is_empty() || location.len() <= root.len() {
        return None;
    }

    let inside = root
        .iter()
        .zip(location.iter())
        .all(|(r, l)| same_component(r, l));

    inside.then(|| location[root.len()..].to_vec())
}

/// Number of components in `root`, used to rank competing prefixes.
pub(crate) fn depth(root: &str) -> usize {
    components(root).len()
}

/// Last component of a path.
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(is_separator).next().unwrap_or(path)
}

/// File name without its extension.
pub(crate) fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    }
}

/// Lowercase extension without the dot.
pub(crate) fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(name[dot + 1..].to_lowercase()),
    }
}

/// Everything before the last separator, without a trailing separator.
pub(crate) fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches(is_separator);
    let cut = trimmed.rfind(is_separator)?;
    let parent = &trimmed[..cut];
    if parent.is_empty() {
        // Parent of "/file" is the filesystem root.
        Some(&trimmed[..1])
    } else {
        Some(parent)
    }
}

/// Separator a root string appears to use.
pub(crate) fn separator_of(path: &str) -> char {
    if path.contains('\\') && !path.contains('/') {
        '\\'
    } else {
        '/'
    }
}

/// Provider-relative path form: leading `/`, forward slashes, no empty
/// components.
pub(crate) fn to_cloud_path(components: &[&str]) -> String {
    format!("/{}", components.join("/"))
}

/// Compare two provider-relative paths the way sync providers do.
pub(crate) fn cloud_paths_equal(a: &str, b: &str) -> bool {
    let a = components(a);
    let b = components(b);
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| same_component(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_to_is_separator_aware() {
        assert_eq!(
            relative_to("/Users/ana/Dropbox/Music/a.mp3", "/Users/ana/Dropbox"),
            Some(vec!["Music", "a.mp3"])
        );
        assert_eq!(relative_to("/Users/ana/Dropbox2/a.mp3", "/Users/ana/Dropbox"), None);
        assert_eq!(relative_to("/Users/ana/Dropbox", "/Users/ana/Dropbox"), None);
    }

    #[test]
    fn test_relative_to_ignores_case_and_separator_style() {
        assert_eq!(
            relative_to("C:\\Users\\Ana\\OneDrive\\Song.mp3", "c:/users/ana/onedrive/"),
            Some(vec!["Song.mp3"])
        );
    }

    #[test]
    fn test_file_name_helpers() {
        assert_eq!(file_name("/music/Artist/01 Song.mp3"), "01 Song.mp3");
        assert_eq!(file_stem("/music/Artist/01 Song.mp3"), "01 Song");
        assert_eq!(file_stem("/music/.hidden"), ".hidden");
        assert_eq!(extension("/music/Song.FLAC"), Some("flac".to_string()));
        assert_eq!(extension("/music/README"), None);
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/Users/ana/Music/Library.xml"), Some("/Users/ana/Music"));
        assert_eq!(parent("D:\\Music\\Library.xml"), Some("D:\\Music"));
        assert_eq!(parent("/Library.xml"), Some("/"));
        assert_eq!(parent("Library.xml"), None);
    }

    #[test]
    fn test_cloud_path_comparison() {
        assert!(cloud_paths_equal("/Music/A.mp3", "music/a.mp3"));
        assert!(cloud_paths_equal("\\Music\\A.mp3", "/Music/A.mp3"));
        assert!(!cloud_paths_equal("/Music/A.mp3", "/Music/B.mp3"));
        assert_eq!(to_cloud_path(&["Music", "a.mp3"]), "/Music/a.mp3");
    }
}
