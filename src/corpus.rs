// this_file: src/corpus.rs
//! Word sources for sample generation.

use crate::error::{Error, Result};
use log::info;
use rand::{Rng, RngCore};
use std::path::Path;

/// Supplies the ground-truth word for each sample.
pub trait Corpus: Send + Sync {
    fn get_sample(&self, rng: &mut dyn RngCore) -> Result<String>;
}

/// A flat list of words sampled uniformly.
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    pub fn new(words: Vec<String>) -> Result<Self> {
        if words.is_empty() {
            return Err(Error::Configuration("word list is empty".into()));
        }
        Ok(Self { words })
    }

    /// Load a newline-separated corpus file, ignoring blank lines.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Resource(format!("cannot read corpus {}: {}", path.display(), e))
        })?;
        let words: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        info!("Loaded {} words from {}", words.len(), path.display());
        Self::new(words)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Corpus for WordList {
    fn get_sample(&self, rng: &mut dyn RngCore) -> Result<String> {
        Ok(self.words[rng.random_range(0..self.words.len())].clone())
    }
}
