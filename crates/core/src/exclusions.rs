//! Exclusion list loader.
//!
//! The exclusion file is plain UTF-8 text, one repository name per line.
//! Blank lines and lines starting with `#` are ignored; names are trimmed.
//! A missing file is not an error -- it just means nothing is excluded.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};

/// Set of repository names exempted from mirroring.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    names: BTreeSet<String>,
}

impl ExclusionSet {
    /// Load the exclusion set from a file. A missing file yields an empty
    /// set with a warning; this is never fatal.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "exclusion file not readable, proceeding without exclusions");
                return Self::default();
            }
        };

        let set = Self::parse(&contents);
        info!(path = %path.display(), count = set.len(), "loaded exclusion list");
        set
    }

    /// Parse exclusion file contents.
    pub fn parse(contents: &str) -> Self {
        let names = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<String> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let contents = "\
# repos we do not mirror
repo-b

  repo-d
# trailing comment
";
        let set = ExclusionSet::parse(contents);
        assert_eq!(set.len(), 2);
        assert!(set.contains("repo-b"));
        assert!(set.contains("repo-d"));
        assert!(!set.contains("repo-a"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"repo-b\n#ignored\n").unwrap();

        let set = ExclusionSet::load(&path);
        assert_eq!(set.len(), 1);
        assert!(set.contains("repo-b"));
    }

    #[test]
    fn test_missing_file_is_empty_set() {
        let set = ExclusionSet::load("/nonexistent/blacklist.txt");
        assert!(set.is_empty());
    }

    #[test]
    fn test_empty_file() {
        let set = ExclusionSet::parse("");
        assert!(set.is_empty());
    }
}
