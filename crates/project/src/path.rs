use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Position of a node expressed as child indices from the invisible top level.
///
/// The first index selects the project root (`0`) or the notebook (`1`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelPath(Vec<usize>);

impl ModelPath {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// The invisible root above the project root and the notebook.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn leaf(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Parses `0/2/1` style paths.
    pub fn parse(s: &str) -> Result<Self, ModelPathError> {
        s.parse()
    }

    pub fn parent_path(&self) -> ModelPath {
        let mut indices = self.0.clone();
        indices.pop();
        Self(indices)
    }

    pub fn child(&self, index: usize) -> ModelPath {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }
}

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        let parts: Vec<String> = self.0.iter().map(usize::to_string).collect();
        f.write_str(&parts.join("/"))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid model path segment `{0}`")]
pub struct ModelPathError(pub String);

impl FromStr for ModelPath {
    type Err = ModelPathError;

    /// An empty string or `/` is the invisible root.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                segment
                    .parse::<usize>()
                    .map_err(|_| ModelPathError(segment.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ModelPath)
    }
}
