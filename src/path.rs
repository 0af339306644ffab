//! Paths inside an archive.
//!
//! A [`Path`] is a list of non-empty components. It names a spot in the
//! archive's virtual hierarchy, never a location on the host filesystem,
//! so it's deliberately ignorant of drive letters, roots, and the like.

use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign};

/// Separator used by ZIP archives (APPNOTE 4.4.17: forward slashes only).
pub const SEPARATOR: char = '/';

/// An ordered sequence of path components, e.g. `include/foo.h`.
///
/// Parsing collapses repeated separators and ignores leading/trailing ones,
/// so `"a//b/"` and `"a/b"` are the same path.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    /// The empty path, which also names the archive root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the path with a single separator between components.
    pub fn as_string(&self) -> String {
        self.components.join("/")
    }

    pub fn components(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator {
        self.components.iter().map(String::as_str)
    }

    /// The last component, extension included. Empty for the empty path.
    pub fn name(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or("")
    }

    /// The name from its last `.` onward (`".h"` for `foo.h`),
    /// or an empty string if the name has no `.`.
    pub fn extension(&self) -> &str {
        let name = self.name();
        name.rfind('.').map(|dot| &name[dot..]).unwrap_or("")
    }

    /// The name without its extension.
    pub fn stem(&self) -> &str {
        let name = self.name();
        &name[..name.len() - self.extension().len()]
    }

    /// Everything but the last component.
    pub fn parent(&self) -> Path {
        let keep = self.components.len().saturating_sub(1);
        self.sub_directory(0, keep)
    }

    /// `count` components starting at `offset`.
    ///
    /// Both are clamped to the path's length,
    /// so `sub_directory(n, usize::MAX)` takes everything from `n` on.
    pub fn sub_directory(&self, offset: usize, count: usize) -> Path {
        let start = offset.min(self.components.len());
        let end = start.saturating_add(count).min(self.components.len());
        Path {
            components: self.components[start..end].to_vec(),
        }
    }

    pub fn has_parent(&self) -> bool {
        self.components.len() > 1
    }

    pub fn has_extension(&self) -> bool {
        !self.extension().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn clear(&mut self) {
        self.components.clear();
    }

    /// Number of components, file name included.
    pub fn directory_count(&self) -> usize {
        self.components.len()
    }

    /// Returns true if `self` is `other` or lives somewhere beneath it.
    pub fn starts_with(&self, other: &Path) -> bool {
        self.components.starts_with(&other.components)
    }

    fn push_str(&mut self, s: &str) {
        self.components.extend(
            s.split(SEPARATOR)
                .filter(|c| !c.is_empty())
                .map(str::to_owned),
        );
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        let mut path = Path::new();
        path.push_str(s);
        path
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::from(s.as_str())
    }
}

impl From<&String> for Path {
    fn from(s: &String) -> Self {
        Path::from(s.as_str())
    }
}

/// Builds a path from pre-split components.
///
/// Each component is still split on separators and empty ones are dropped,
/// so the "no empty or separator-bearing components" invariant holds.
impl From<Vec<String>> for Path {
    fn from(components: Vec<String>) -> Self {
        components.into_iter().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut path = Path::new();
        for component in iter {
            path.push_str(component.as_ref());
        }
        path
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i != 0 {
                f.write_str("/")?;
            }
            f.write_str(component)?;
        }
        Ok(())
    }
}

// Join with a separator: "a/b" / "c" == "a/b/c"

impl DivAssign<&Path> for Path {
    fn div_assign(&mut self, rhs: &Path) {
        self.components.extend(rhs.components.iter().cloned());
    }
}

impl DivAssign<&str> for Path {
    fn div_assign(&mut self, rhs: &str) {
        self.push_str(rhs);
    }
}

impl Div<&Path> for Path {
    type Output = Path;

    fn div(mut self, rhs: &Path) -> Path {
        self /= rhs;
        self
    }
}

impl Div<&str> for Path {
    type Output = Path;

    fn div(mut self, rhs: &str) -> Path {
        self /= rhs;
        self
    }
}

impl Div<&str> for &Path {
    type Output = Path;

    fn div(self, rhs: &str) -> Path {
        self.clone() / rhs
    }
}

impl Div<&Path> for &Path {
    type Output = Path;

    fn div(self, rhs: &Path) -> Path {
        self.clone() / rhs
    }
}

// Join without a separator: "a/b" + ".ext" == "a/b.ext"

impl AddAssign<&str> for Path {
    fn add_assign(&mut self, rhs: &str) {
        // Reparse so a separator inside `rhs` still starts a new component.
        let joined = self.as_string() + rhs;
        *self = Path::from(joined);
    }
}

impl AddAssign<&Path> for Path {
    fn add_assign(&mut self, rhs: &Path) {
        *self += rhs.as_string().as_str();
    }
}

impl Add<&str> for Path {
    type Output = Path;

    fn add(mut self, rhs: &str) -> Path {
        self += rhs;
        self
    }
}

impl Add<&Path> for Path {
    type Output = Path;

    fn add(mut self, rhs: &Path) -> Path {
        self += rhs;
        self
    }
}

impl Add<&str> for &Path {
    type Output = Path;

    fn add(self, rhs: &str) -> Path {
        self.clone() + rhs
    }
}
