//! Route keys.
//!
//! A [`Route`] is the identity of one prerendered page. Two spellings of the
//! same path (`/about`, `about/`, `//about`) normalize to the same key, so the
//! visited set in [`crate::prerender`] dedups them.
//!
//! ```text
//! "/"            → "/"            → {output}/index.html
//! "about/"       → "/about"       → {output}/about/index.html
//! "/docs//intro" → "/docs/intro"  → {output}/docs/intro/index.html
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route is empty")]
    Empty,
    #[error("route {0:?} contains a relative segment")]
    RelativeSegment(String),
}

/// A normalized page path. Always starts with `/`; never ends with `/`
/// unless it is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Route(String);

impl Route {
    pub fn root() -> Self {
        Route("/".to_string())
    }

    /// Normalize a raw path into a route.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RouteError::Empty);
        }

        let mut normalized = String::with_capacity(trimmed.len() + 1);
        for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(RouteError::RelativeSegment(raw.to_string()));
            }
            normalized.push('/');
            normalized.push_str(segment);
        }

        if normalized.is_empty() {
            return Ok(Self::root());
        }
        Ok(Route(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path segments of the route, root has none.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// The route as a relative filesystem path (`/a/b` → `a/b`, `/` → ``).
    pub fn to_relative_path(&self) -> PathBuf {
        self.segments().collect()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Route {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Route {
    type Error = RouteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Route::parse(&value)
    }
}

impl TryFrom<&str> for Route {
    type Error = RouteError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Route::parse(value)
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.0
    }
}
