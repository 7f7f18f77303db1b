//! Source file discovery.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

/// Outcome of [`SourceLocator::locate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Located {
    /// Canonical paths of every matching file, deduplicated across roots.
    pub files: BTreeSet<PathBuf>,
    /// Roots that do not exist or are not directories, in encounter order.
    pub rejected: Vec<PathBuf>,
}

/// Walks root directories for files with given suffixes.
#[derive(Debug, Clone)]
pub struct SourceLocator {
    extensions: Vec<String>,
    exclude: Vec<glob::Pattern>,
    respect_gitignore: bool,
}

impl SourceLocator {
    /// Creates a locator for file names ending in any of `extensions`.
    #[must_use]
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
            respect_gitignore: false,
        }
    }

    /// Drops files whose path matches any of these globs.
    #[must_use]
    pub fn exclude(mut self, patterns: Vec<glob::Pattern>) -> Self {
        self.exclude = patterns;
        self
    }

    /// Honors `.gitignore`, `.ignore` and git exclude files while walking.
    #[must_use]
    pub fn respect_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }

    /// Discovers source files under `roots`.
    #[must_use]
    pub fn locate(&self, roots: &[PathBuf]) -> Located {
        let mut located = Located::default();
        for root in roots {
            if !root.is_dir() {
                warn!("Rejecting root {}: not an existing directory", root.display());
                located.rejected.push(root.clone());
                continue;
            }
            self.walk(root, &mut located.files);
        }
        located
    }

    fn walk(&self, root: &Path, files: &mut BTreeSet<PathBuf>) {
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .ignore(self.respect_gitignore)
            .parents(self.respect_gitignore)
            .require_git(false)
            .follow_links(false)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {e}", root.display());
                    continue;
                }
            };
            let path = entry.path();
            if !self.has_extension(path) {
                continue;
            }
            match entry.file_type() {
                Some(t) if t.is_file() => {}
                // Linked files count once through their canonical path; linked
                // directories are not descended into.
                Some(t) if t.is_symlink() && path.is_file() => {}
                Some(t) if t.is_symlink() => {
                    debug!("Skipping symlink {}: target is not a file", path.display());
                    continue;
                }
                _ => continue,
            }
            let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            if self.should_exclude(&canonical) || self.should_exclude(path) {
                debug!("Excluding: {}", path.display());
                continue;
            }
            files.insert(canonical);
        }
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.extensions.iter().any(|ext| name.ends_with(ext.as_str())))
    }

    /// Checks if a path should be excluded.
    fn should_exclude(&self, path: &Path) -> bool {
        self.exclude.iter().any(|pattern| pattern.matches_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn locator() -> SourceLocator {
        SourceLocator::new([".py"])
    }

    #[test]
    fn finds_files_recursively_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg/sub")).unwrap();
        fs::write(dir.path().join("a.py"), "").unwrap();
        fs::write(dir.path().join("pkg/sub/b.py"), "").unwrap();
        fs::write(dir.path().join("pkg/readme.md"), "").unwrap();

        let located = locator().locate(&[dir.path().to_path_buf()]);
        assert_eq!(located.files.len(), 2);
        assert!(located.rejected.is_empty());
    }

    #[test]
    fn overlapping_roots_yield_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/a.py"), "").unwrap();

        let roots = vec![dir.path().to_path_buf(), dir.path().join("pkg")];
        let located = locator().locate(&roots);
        assert_eq!(located.files.len(), 1);
    }

    #[test]
    fn missing_and_file_roots_are_rejected_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "").unwrap();
        let missing = dir.path().join("missing");

        let roots = vec![missing.clone(), file.clone(), missing.clone()];
        let located = locator().locate(&roots);
        assert!(located.files.is_empty());
        assert_eq!(located.rejected, vec![missing.clone(), file, missing]);
    }

    #[test]
    fn exclude_globs_drop_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".venv/lib")).unwrap();
        fs::write(dir.path().join(".venv/lib/dep.py"), "").unwrap();
        fs::write(dir.path().join("main.py"), "").unwrap();

        let located = locator()
            .exclude(vec![glob::Pattern::new("**/.venv/**").unwrap()])
            .locate(&[dir.path().to_path_buf()]);
        assert_eq!(located.files.len(), 1);
        assert!(located
            .files
            .iter()
            .all(|p| p.file_name().is_some_and(|n| n == "main.py")));
    }

    #[cfg(unix)]
    #[test]
    fn linked_files_are_found_once() {
        use std::os::unix::fs::symlink;

        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("shared.py"), "").unwrap();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "").unwrap();
        symlink(outside.path().join("shared.py"), dir.path().join("shared.py")).unwrap();
        symlink(dir.path().join("a.py"), dir.path().join("alias.py")).unwrap();
        symlink(dir.path().join("gone.py"), dir.path().join("dangling.py")).unwrap();

        let located = locator().locate(&[dir.path().to_path_buf()]);
        let names: Vec<_> = located
            .files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(located.files.len(), 2);
        assert!(names.contains(&"a.py"));
        assert!(names.contains(&"shared.py"));
    }

    #[test]
    fn gitignore_is_honored_only_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "generated/\n").unwrap();
        fs::create_dir_all(dir.path().join("generated")).unwrap();
        fs::write(dir.path().join("generated/out.py"), "").unwrap();
        fs::write(dir.path().join("main.py"), "").unwrap();

        let roots = [dir.path().to_path_buf()];
        assert_eq!(locator().locate(&roots).files.len(), 2);
        assert_eq!(
            locator().respect_gitignore(true).locate(&roots).files.len(),
            1
        );
    }
}
