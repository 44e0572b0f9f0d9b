//! Breadcrumb path inside an open folder.

use protocol::{join_path, ROOT_SEGMENT};

/// Ordered path segments from the folder root to the current directory.
///
/// The first segment is always the root marker `.`, so a breadcrumb is never
/// empty and the root is always a valid navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    segments: Vec<String>,
}

impl Default for Breadcrumb {
    fn default() -> Self {
        Self::root()
    }
}

impl Breadcrumb {
    pub fn root() -> Self {
        Self {
            segments: vec![ROOT_SEGMENT.to_string()],
        }
    }

    /// Breadcrumb with `segment` appended.
    pub fn descend(&self, segment: &str) -> Self {
        let mut next = self.clone();
        next.segments.push(segment.to_string());
        next
    }

    /// Breadcrumb cut after the first occurrence of `target`.
    ///
    /// Returns `None` when `target` is not part of the path.
    pub fn truncate_to(&self, target: &str) -> Option<Self> {
        let index = self.segments.iter().position(|s| s == target)?;
        Some(Self {
            segments: self.segments[..=index].to_vec(),
        })
    }

    /// Service path of the current directory, e.g. `./docs/2024`.
    pub fn join(&self) -> String {
        join_path(&self.segments)
    }

    /// Service path of `name` inside the current directory.
    pub fn join_with(&self, name: &str) -> String {
        self.descend(name).join()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Innermost segment.
    pub fn current(&self) -> &str {
        self.segments
            .last()
            .map(String::as_str)
            .unwrap_or(ROOT_SEGMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root() {
        let crumb = Breadcrumb::root();
        assert_eq!(crumb.segments(), ["."]);
        assert_eq!(crumb.join(), ".");
        assert!(crumb.is_root());
    }

    #[test]
    fn test_descend_and_join() {
        let crumb = Breadcrumb::root().descend("docs").descend("2024");
        assert_eq!(crumb.join(), "./docs/2024");
        assert_eq!(crumb.join_with("a.txt"), "./docs/2024/a.txt");
        assert_eq!(crumb.current(), "2024");
    }

    #[test]
    fn test_truncate_to_existing_segment() {
        let crumb = Breadcrumb::root().descend("a").descend("b").descend("c");
        let cut = crumb.truncate_to("a").unwrap();
        assert_eq!(cut.segments(), [".", "a"]);
    }

    #[test]
    fn test_truncate_to_root() {
        let crumb = Breadcrumb::root().descend("a");
        assert_eq!(crumb.truncate_to(".").unwrap(), Breadcrumb::root());
    }

    #[test]
    fn test_truncate_to_missing_segment() {
        let crumb = Breadcrumb::root().descend("a");
        assert!(crumb.truncate_to("zzz").is_none());
    }

    #[test]
    fn test_truncate_uses_first_occurrence() {
        let crumb = Breadcrumb::root().descend("x").descend("x");
        assert_eq!(crumb.truncate_to("x").unwrap().segments(), [".", "x"]);
    }
}
