use std::collections::HashSet;
use std::fmt::Display;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The ordered, immutable list of positions up for election.
///
/// This is configuration rather than data: it is read once at ignition and
/// placed into managed state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct Positions {
    names: Vec<String>,
}

impl Positions {
    /// Look up a position by its exact name.
    pub fn get(&self, name: &str) -> Option<Position> {
        self.names
            .iter()
            .find(|position| position.as_str() == name)
            .map(|position| Position(position.clone()))
    }

    /// Iterate over the positions in election order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// The number of positions.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false: an empty registry is rejected on construction.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The positions not covered by `voted`, in election order.
    pub fn missing<'a>(&'a self, voted: &HashSet<String>) -> Vec<&'a str> {
        self.iter()
            .filter(|position| !voted.contains(*position))
            .collect()
    }
}

impl TryFrom<Vec<String>> for Positions {
    type Error = PositionsError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        if names.is_empty() {
            return Err(PositionsError::Empty);
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(PositionsError::Blank);
            }
            if !seen.insert(name.as_str()) {
                return Err(PositionsError::Duplicate(name.clone()));
            }
        }
        Ok(Self { names })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionsError {
    #[error("At least one position must be configured")]
    Empty,
    #[error("Position names cannot be blank")]
    Blank,
    #[error("Position configured twice: {0}")]
    Duplicate(String),
}

/// A position known to be in the registry.
///
/// Only obtainable through [`Positions::get`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Position(String);

impl Deref for Position {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Position> for String {
    fn from(position: Position) -> Self {
        position.0
    }
}
