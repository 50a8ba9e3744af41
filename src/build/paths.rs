//! Inventory of the source tree, split the way the watcher classifies paths.

use std::path::Path;

use walkdir::WalkDir;

use super::BuildError;
use crate::config::Settings;
use crate::watcher::{ChangeKind, FilterRule, WatchSignal, classify_name, relative_path};

/// Source-relative paths known to the build, each list sorted and unique.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub page_paths: Vec<String>,
    pub layout_paths: Vec<String>,
    pub static_paths: Vec<String>,
}

impl SitePaths {
    /// Scan the configured source directory.
    pub fn scan(settings: &Settings) -> Result<Self, BuildError> {
        let filter = settings.watch_filter()?;
        Self::scan_dir(&settings.src_dir, &filter)
    }

    /// Walk `src_dir`, keeping files that survive `filter`.
    ///
    /// Excluded directories are pruned without being descended into.
    pub fn scan_dir(src_dir: &Path, filter: &FilterRule) -> Result<Self, BuildError> {
        if !src_dir.is_dir() {
            return Err(BuildError::ScanFailed {
                path: src_dir.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let mut paths = SitePaths::default();
        let walker = WalkDir::new(src_dir).into_iter().filter_entry(|entry| {
            entry.depth() == 0 || !filter.excludes(&relative_path(src_dir, entry.path()))
        });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[build] skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = relative_path(src_dir, entry.path());
            if filter.allows(&rel) {
                paths.push(classify_name(Path::new(&rel)), rel);
            }
        }

        for list in [
            &mut paths.page_paths,
            &mut paths.layout_paths,
            &mut paths.static_paths,
        ] {
            list.sort();
            list.dedup();
        }

        crate::debug_event!(
            "build",
            "scanned",
            "{} pages, {} layouts, {} static",
            paths.page_paths.len(),
            paths.layout_paths.len(),
            paths.static_paths.len()
        );

        Ok(paths)
    }

    fn push(&mut self, kind: ChangeKind, path: String) {
        match kind {
            ChangeKind::Layout => self.layout_paths.push(path),
            ChangeKind::Page => self.page_paths.push(path),
            _ => self.static_paths.push(path),
        }
    }

    /// Record the path carried by an incremental signal.
    ///
    /// Returns whether the inventory changed.
    pub fn merge(&mut self, signal: &WatchSignal) -> bool {
        let (list, path) = match signal {
            WatchSignal::Rebuild => return false,
            WatchSignal::LayoutChanged(p) => (&mut self.layout_paths, p),
            WatchSignal::PageChanged(p) => (&mut self.page_paths, p),
            WatchSignal::StaticChanged(p) => (&mut self.static_paths, p),
        };

        match list.binary_search(path) {
            Ok(_) => false,
            Err(pos) => {
                list.insert(pos, path.clone());
                true
            }
        }
    }

    /// Whether the plugin chain has anything to render or copy.
    pub fn has_content(&self) -> bool {
        !self.page_paths.is_empty() || !self.static_paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.page_paths.len() + self.layout_paths.len() + self.static_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for dir in ["blog", "dist", "node_modules/pkg", ".git"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        for file in [
            "folio.toml",
            "index.md",
            "about.tsx",
            "_layout.tsx",
            "blog/post1.md",
            "blog/_layout.tsx",
            "style.css",
            "dist/index.html",
            "node_modules/pkg/index.js",
            ".git/HEAD",
        ] {
            fs::write(root.join(file), "").unwrap();
        }
        temp_dir
    }

    #[test]
    fn test_scan_splits_and_filters() {
        let site = site();
        let mut settings = Settings::default();
        settings.src_dir = site.path().to_path_buf();
        settings.out_dir = site.path().join("dist");

        let paths = SitePaths::scan(&settings).unwrap();
        assert_eq!(paths.page_paths, vec!["about.tsx", "blog/post1.md", "index.md"]);
        assert_eq!(paths.layout_paths, vec!["_layout.tsx", "blog/_layout.tsx"]);
        assert_eq!(paths.static_paths, vec!["style.css"]);
        assert!(paths.has_content());
    }

    #[test]
    fn test_scan_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let err = SitePaths::scan_dir(&temp_dir.path().join("nope"), &FilterRule::allow_all())
            .unwrap_err();
        assert!(matches!(err, BuildError::ScanFailed { .. }));
    }

    #[test]
    fn test_merge_keeps_lists_sorted_and_unique() {
        let mut paths = SitePaths::default();
        assert!(paths.merge(&WatchSignal::PageChanged("b.md".into())));
        assert!(paths.merge(&WatchSignal::PageChanged("a.md".into())));
        assert!(!paths.merge(&WatchSignal::PageChanged("a.md".into())));
        assert!(!paths.merge(&WatchSignal::Rebuild));
        assert!(paths.merge(&WatchSignal::LayoutChanged("_l.tsx".into())));

        assert_eq!(paths.page_paths, vec!["a.md", "b.md"]);
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_layouts_alone_are_not_content() {
        let mut paths = SitePaths::default();
        paths.merge(&WatchSignal::LayoutChanged("_layout.tsx".into()));
        assert!(!paths.has_content());

        paths.merge(&WatchSignal::StaticChanged("logo.png".into()));
        assert!(paths.has_content());
    }
}
