//! Path helpers shared by both storage engines

/// Non-empty segments of a slash-delimited path
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Canonical form of a path: leading slash, no trailing or doubled slashes
pub fn normalize_path(path: &str) -> String {
    format!("/{}", path_segments(path).join("/"))
}

/// Split a path into its parent group and leaf name
pub fn split_parent(path: &str) -> (String, String) {
    let mut segments = path_segments(path);
    let name = segments.pop().unwrap_or_default().to_string();
    (format!("/{}", segments.join("/")), name)
}

/// Every group along `group`, outermost first (`/a/b` gives `/a`, `/a/b`)
pub fn group_prefixes(group: &str) -> Vec<String> {
    let segments = path_segments(group);
    (1..=segments.len())
        .map(|n| format!("/{}", segments[..n].join("/")))
        .collect()
}

/// Chunk edge used when no chunk shape is requested
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Clamp a requested chunk shape to a dataset shape.
///
/// Every chunk edge is at most the extent of its axis and at least 1. Axes
/// without a requested edge are covered by a single chunk.
pub fn negotiate_chunks(shape: &[usize], requested: &[usize]) -> Vec<usize> {
    shape
        .iter()
        .enumerate()
        .map(|(i, &extent)| {
            requested
                .get(i)
                .map_or(extent, |&chunk| chunk.min(extent))
                .max(1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/volumes/raw"), "/volumes/raw");
        assert_eq!(normalize_path("volumes//raw/"), "/volumes/raw");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(
            split_parent("/volumes/labels/clefts"),
            ("/volumes/labels".to_string(), "clefts".to_string())
        );
        assert_eq!(split_parent("/annotations"), ("/".to_string(), "annotations".to_string()));
    }

    #[test]
    fn test_group_prefixes() {
        assert_eq!(
            group_prefixes("/annotations/comments"),
            vec!["/annotations".to_string(), "/annotations/comments".to_string()]
        );
        assert!(group_prefixes("/").is_empty());
    }

    #[test]
    fn test_negotiate_chunks() {
        assert_eq!(negotiate_chunks(&[125, 100, 1250], &[16, 128, 128]), vec![16, 100, 128]);
        assert_eq!(negotiate_chunks(&[3], &[64, 64, 64]), vec![3]);
        assert_eq!(negotiate_chunks(&[10, 20], &[4]), vec![4, 20]);
        assert_eq!(negotiate_chunks(&[0, 5], &[64, 64]), vec![1, 5]);
    }
}
