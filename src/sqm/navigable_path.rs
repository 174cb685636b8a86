//! Navigable paths: the registry key identifying one traversal route.
//!
//! A path renders as `Employee(e).manager(m).name`. The root segment names
//! the entity (or CTE) the traversal starts from; an optional `(alias)`
//! suffix carries the explicit identification variable of a from-element.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NavigablePath {
    segments: Vec<PathSegment>,
}

impl NavigablePath {
    pub fn root(name: impl Into<String>, alias: Option<&str>) -> Self {
        NavigablePath {
            segments: vec![PathSegment {
                name: name.into(),
                alias: alias.map(str::to_string),
            }],
        }
    }

    pub fn append(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment {
            name: name.into(),
            alias: None,
        });
        NavigablePath { segments }
    }

    pub fn append_with_alias(&self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment {
            name: name.into(),
            alias: Some(alias.into()),
        });
        NavigablePath { segments }
    }

    pub fn parent(&self) -> Option<NavigablePath> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(NavigablePath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Name of the last segment, without alias
    pub fn local_name(&self) -> &str {
        self.segments.last().map(|s| s.name.as_str()).unwrap_or("")
    }

    /// Explicit alias of the last segment
    pub fn alias(&self) -> Option<&str> {
        self.segments.last().and_then(|s| s.alias.as_deref())
    }

    /// Entity or CTE name the path starts from
    pub fn root_name(&self) -> &str {
        self.segments.first().map(|s| s.name.as_str()).unwrap_or("")
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn full_path(&self) -> String {
        self.to_string()
    }

    pub fn is_parent_or_equal(&self, other: &NavigablePath) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }
}

impl fmt::Display for NavigablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment.name)?;
            if let Some(alias) = &segment.alias {
                write!(f, "({})", alias)?;
            }
        }
        Ok(())
    }
}

impl FromStr for NavigablePath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err("navigable path cannot be empty".to_string());
        }
        let mut segments = Vec::new();
        for raw in s.split('.') {
            let raw = raw.trim();
            let segment = match raw.find('(') {
                Some(open) => {
                    if !raw.ends_with(')') {
                        return Err(format!("unterminated alias in path segment `{}`", raw));
                    }
                    let alias = &raw[open + 1..raw.len() - 1];
                    PathSegment {
                        name: raw[..open].to_string(),
                        alias: (!alias.is_empty()).then(|| alias.to_string()),
                    }
                }
                None => PathSegment {
                    name: raw.to_string(),
                    alias: None,
                },
            };
            if segment.name.is_empty() {
                return Err(format!("empty segment in navigable path `{}`", s));
            }
            segments.push(segment);
        }
        Ok(NavigablePath { segments })
    }
}

impl TryFrom<String> for NavigablePath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NavigablePath> for String {
    fn from(path: NavigablePath) -> Self {
        path.to_string()
    }
}
