//! Include/exclude filtering of changed paths.
//!
//! Paths are compared in source-relative, forward-slash form. Every glob is
//! tested twice: against the path itself and as a directory prefix
//! (`glob/**`), so `node_modules` also drops `node_modules/foo.js`.
//!
//! Paths that climb out of the source root (`../theme/_layout.tsx`) are exempt
//! from the directory-prefix exclude test, unless the directory right above
//! them is hidden (`../theme/.git/...`). Without this, a default exclude such
//! as `**/.*` would match the `..` component and silently drop every file of
//! an out-of-tree theme.

use std::path::{Component, Path};
use std::sync::OnceLock;

use glob::{MatchOptions, Pattern};
use regex::Regex;

use super::WatchError;

static UPDIR: OnceLock<Regex> = OnceLock::new();
static HIDDEN_UPDIR: OnceLock<Regex> = OnceLock::new();

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A glob compiled both as written and as a directory prefix.
#[derive(Debug, Clone)]
struct GlobPair {
    source: String,
    direct: Pattern,
    tree: Pattern,
}

impl GlobPair {
    fn new(glob: &str) -> Result<Self, WatchError> {
        let compile = |pattern: &str| {
            Pattern::new(pattern).map_err(|e| WatchError::InvalidPattern {
                pattern: glob.to_string(),
                reason: e.msg.to_string(),
            })
        };

        let trimmed = glob.trim_end_matches('/');
        Ok(Self {
            source: glob.to_string(),
            direct: compile(trimmed)?,
            tree: compile(&format!("{trimmed}/**"))?,
        })
    }

    fn matches_direct(&self, path: &str) -> bool {
        self.direct.matches_with(path, MATCH_OPTIONS)
    }

    fn matches_tree(&self, path: &str) -> bool {
        self.tree.matches_with(path, MATCH_OPTIONS)
    }
}

/// Include/exclude rule applied to every changed path.
#[derive(Debug, Clone, Default)]
pub struct FilterRule {
    include: Vec<GlobPair>,
    exclude: Vec<GlobPair>,
}

impl FilterRule {
    /// Compile a rule. An absent or empty include list lets everything in.
    pub fn new(include: Option<&[String]>, exclude: Option<&[String]>) -> Result<Self, WatchError> {
        let compile_all = |globs: Option<&[String]>| -> Result<Vec<GlobPair>, WatchError> {
            globs
                .unwrap_or_default()
                .iter()
                .map(|g| GlobPair::new(g))
                .collect()
        };

        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Rule that lets every path through.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn include_globs(&self) -> impl Iterator<Item = &str> {
        self.include.iter().map(|g| g.source.as_str())
    }

    pub fn exclude_globs(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(|g| g.source.as_str())
    }

    /// Whether a source-relative path survives the rule.
    pub fn allows(&self, path: &str) -> bool {
        if !self.include.is_empty()
            && !self
                .include
                .iter()
                .any(|g| g.matches_direct(path) || g.matches_tree(path))
        {
            return false;
        }

        !self.excludes(path)
    }

    /// Whether the exclude list alone drops the path.
    pub fn excludes(&self, path: &str) -> bool {
        let tree_exempt = is_updir(path) && !is_hidden_updir(path);

        self.exclude
            .iter()
            .any(|g| g.matches_direct(path) || (!tree_exempt && g.matches_tree(path)))
    }
}

/// Keep the paths that survive `rule`, preserving their order.
pub fn filter_paths<I, S>(paths: I, rule: &FilterRule) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    paths
        .into_iter()
        .map(Into::into)
        .filter(|p| rule.allows(p))
        .collect()
}

/// Whether the path ascends out of the source root into a sibling directory.
pub fn is_updir(path: &str) -> bool {
    UPDIR
        .get_or_init(|| Regex::new(r"^(\.\./)[^/]*/").expect("updir pattern is valid"))
        .is_match(path)
}

/// Whether the path ascends out of the source root into a hidden directory.
pub fn is_hidden_updir(path: &str) -> bool {
    HIDDEN_UPDIR
        .get_or_init(|| Regex::new(r"^(\.\./)[^/]*/\.").expect("hidden updir pattern is valid"))
        .is_match(path)
}

/// Express `path` relative to `base` in forward-slash form.
///
/// Both paths are expected in the same (absolute, resolved) form. Paths
/// outside `base` come back with leading `../` segments.
pub fn relative_path(base: &Path, path: &Path) -> String {
    let base_parts: Vec<Component<'_>> = base
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let path_parts: Vec<Component<'_>> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    let common = base_parts
        .iter()
        .zip(path_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();
    segments.extend(base_parts[common..].iter().map(|_| "..".to_string()));
    segments.extend(
        path_parts[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );

    segments.join("/")
}
