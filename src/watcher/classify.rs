//! Classification of changed paths into rebuild categories.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Extension of markdown pages.
pub const MARKDOWN_EXTENSION: &str = "md";

/// Extension of template files (pages and layouts).
pub const TEMPLATE_EXTENSION: &str = "tsx";

static PAGE: OnceLock<Regex> = OnceLock::new();
static LAYOUT: OnceLock<Regex> = OnceLock::new();

/// A content page: a file not starting with `_`, markdown or template.
fn page_pattern() -> &'static Regex {
    PAGE.get_or_init(|| {
        Regex::new(&format!(
            r"[/\\][^_][^/\\]*\.({MARKDOWN_EXTENSION}|{TEMPLATE_EXTENSION})$"
        ))
        .expect("page pattern is valid")
    })
}

/// A layout: a template file starting with `_`.
fn layout_pattern() -> &'static Regex {
    LAYOUT.get_or_init(|| {
        Regex::new(&format!(r"[/\\]_[^/\\]+\.{TEMPLATE_EXTENSION}$"))
            .expect("layout pattern is valid")
    })
}

/// What a changed path means for the build.
///
/// Variants are listed in precedence order: when several could apply, the
/// first one wins. A removed layout must force a full rebuild rather than a
/// layout reload, so `Removed` comes before everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    Removed,
    ConfigFile,
    Directory,
    Layout,
    Page,
    Static,
}

impl ChangeKind {
    /// Whether this change invalidates the whole build.
    pub fn requires_rebuild(self) -> bool {
        matches!(
            self,
            ChangeKind::Removed | ChangeKind::ConfigFile | ChangeKind::Directory
        )
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Removed => "removed",
            ChangeKind::ConfigFile => "config",
            ChangeKind::Directory => "directory",
            ChangeKind::Layout => "layout",
            ChangeKind::Page => "page",
            ChangeKind::Static => "static",
        };
        f.write_str(name)
    }
}

/// Classify an absolute path against the filesystem as it is right now.
///
/// The existence check is authoritative: whatever event reported the path, a
/// path that is gone by now is `Removed`.
pub fn classify(path: &Path, config_file: &Path) -> ChangeKind {
    let Ok(metadata) = std::fs::metadata(path) else {
        return ChangeKind::Removed;
    };

    if path == config_file {
        return ChangeKind::ConfigFile;
    }

    if metadata.is_dir() {
        return ChangeKind::Directory;
    }

    classify_name(path)
}

/// Classify by name only: layout, page or static.
pub fn classify_name(path: &Path) -> ChangeKind {
    let text = path.to_string_lossy();
    // the patterns anchor on a separator before the file name
    let text = if text.starts_with(['/', '\\']) {
        text.into_owned()
    } else {
        format!("/{text}")
    };

    if is_layout(&text) {
        ChangeKind::Layout
    } else if is_page(&text) {
        ChangeKind::Page
    } else {
        ChangeKind::Static
    }
}

pub fn is_layout(path: &str) -> bool {
    layout_pattern().is_match(path)
}

pub fn is_page(path: &str) -> bool {
    page_pattern().is_match(path)
}
