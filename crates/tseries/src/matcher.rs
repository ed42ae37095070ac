//! fnmatch-style glob matching on path and variable strings.
//!
//! Patterns use [`glob::Pattern`] with default options, so `*` also matches
//! path separators: `*/atm/*` matches any path with an `atm` directory.

use std::path::Path;

use glob::Pattern;

use crate::error::{Result, TseriesError};

/// A compiled list of glob patterns; a string matches if any pattern does.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(p.as_ref()).map_err(|e| TseriesError::pattern(p.as_ref(), e)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(text))
    }

    pub fn matches_path(&self, path: &Path) -> bool {
        self.matches(&path.to_string_lossy())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// A path glob paired with a variable glob; both must match.
///
/// `None` on either side matches everything.
#[derive(Debug, Clone, Default)]
pub struct TaskSelector {
    path: Option<Pattern>,
    variable: Option<Pattern>,
}

impl TaskSelector {
    pub fn new(path_glob: &str, var_glob: &str) -> Result<Self> {
        Ok(Self {
            path: Some(Pattern::new(path_glob).map_err(|e| TseriesError::pattern(path_glob, e))?),
            variable: Some(Pattern::new(var_glob).map_err(|e| TseriesError::pattern(var_glob, e))?),
        })
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, path: &Path, variable: &str) -> bool {
        let path_ok = self
            .path
            .as_ref()
            .map_or(true, |p| p.matches(&path.to_string_lossy()));
        path_ok && self.variable.as_ref().map_or(true, |p| p.matches(variable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_crosses_separators() {
        let set = PatternSet::new(&["*/atm/*"]).unwrap();
        assert!(set.matches("/data/run/atm/hist/foo.h0.2000-01.nc"));
        assert!(!set.matches("/data/run/ocn/hist/foo.h0.2000-01.nc"));
    }

    #[test]
    fn test_any_pattern_matches() {
        let set = PatternSet::new(&["*.h1.*", "*.h0.*"]).unwrap();
        assert!(set.matches("/run/foo.h0.2000.nc"));
        assert!(!set.matches("/run/foo.h2.2000.nc"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            PatternSet::new(&["[abc"]),
            Err(TseriesError::Pattern { .. })
        ));
    }

    #[test]
    fn test_selector_requires_both() {
        let sel = TaskSelector::new("*/atm/*", "*HD*").unwrap();
        assert!(sel.matches(Path::new("/out/atm/foo.UHD.nc"), "UHD"));
        assert!(!sel.matches(Path::new("/out/atm/foo.TEMP.nc"), "TEMP"));
        assert!(!sel.matches(Path::new("/out/lnd/foo.UHD.nc"), "UHD"));
    }
}
