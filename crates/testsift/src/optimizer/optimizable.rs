//! Units the optimizer may include, exclude or reorder.

use std::fmt;

/// A named unit of tests
///
/// The name is either a type name (`com.foo.BarTest`) or a `/`-delimited
/// source path (`src/test/java/com/foo/BarTest.java`). Paths are looked up
/// with their leading segments stripped one at a time.
pub trait Optimizable {
    /// Lookup name of the unit
    fn name(&self) -> String;
}

impl<T: Optimizable + ?Sized> Optimizable for &T {
    fn name(&self) -> String {
        (**self).name()
    }
}

/// A test class, named by its fully qualified type name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassOptimizable {
    class_name: String,
}

impl ClassOptimizable {
    /// Unit for `class_name`, e.g. `com.foo.BarTest`
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }
}

impl Optimizable for ClassOptimizable {
    fn name(&self) -> String {
        self.class_name.clone()
    }
}

/// A test source file; backslashes are normalised to `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathOptimizable {
    path: String,
}

impl PathOptimizable {
    /// Unit for a source path
    #[must_use]
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: path.as_ref().replace('\\', "/"),
        }
    }
}

impl Optimizable for PathOptimizable {
    fn name(&self) -> String {
        self.path.clone()
    }
}

/// A suite handle owned by the caller's test harness, carried through
/// optimization under a lookup name
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SuiteOptimizable<S> {
    name: String,
    suite: S,
}

impl<S> SuiteOptimizable<S> {
    /// Wrap `suite` under the lookup name `name`
    #[must_use]
    pub fn new(name: impl Into<String>, suite: S) -> Self {
        Self {
            name: name.into(),
            suite,
        }
    }

    /// The wrapped suite
    #[must_use]
    pub fn suite(&self) -> &S {
        &self.suite
    }

    /// Unwrap the suite
    #[must_use]
    pub fn into_suite(self) -> S {
        self.suite
    }
}

impl<S> fmt::Debug for SuiteOptimizable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteOptimizable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<S> Optimizable for SuiteOptimizable<S> {
    fn name(&self) -> String {
        self.name.clone()
    }
}
