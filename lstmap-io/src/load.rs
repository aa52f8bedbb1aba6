//! How LST files are brought into memory for decoding.

use crate::{Error, Result};
use sysinfo::System;

/// Strategy used to read the binary section of a file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Map files that fit in the memory budget, stream the rest.
    #[default]
    Auto,
    /// Always memory-map the file and decode the tail as a slice.
    Mapped,
    /// Always read through a buffered reader.
    Streamed,
}

/// Load configuration shared by every file of a batch.
#[derive(Clone, Debug)]
pub struct LoadConfig {
    pub strategy: LoadStrategy,
    /// Fraction of available system memory to target (0.0 < fraction <= 1.0).
    pub memory_fraction: f64,
    /// Explicit memory budget override (bytes). If set, `memory_fraction` is ignored.
    pub memory_budget_bytes: Option<usize>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            strategy: LoadStrategy::Auto,
            memory_fraction: 0.5,
            memory_budget_bytes: None,
        }
    }
}

impl LoadConfig {
    #[must_use]
    pub fn with_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the fraction of available system memory to target.
    #[must_use]
    pub fn with_memory_fraction(mut self, fraction: f64) -> Self {
        self.memory_fraction = fraction;
        self
    }

    /// Set an explicit memory budget in bytes.
    #[must_use]
    pub fn with_memory_budget_bytes(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    /// Resolve the target memory budget in bytes.
    ///
    /// # Errors
    /// Returns an error if the memory fraction is invalid or system memory cannot be queried.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn resolve_budget_bytes(&self) -> Result<usize> {
        if let Some(bytes) = self.memory_budget_bytes {
            return Ok(bytes);
        }
        if !(0.0 < self.memory_fraction && self.memory_fraction <= 1.0) {
            return Err(Error::InvalidFormat(
                "memory_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }
        let mut system = System::new();
        system.refresh_memory();
        let available = system.available_memory();
        if available == 0 {
            return Err(Error::InvalidFormat(
                "available system memory reported as 0".to_string(),
            ));
        }
        let budget = (available as f64 * self.memory_fraction).floor() as u64;
        Ok(usize::try_from(budget).unwrap_or(usize::MAX))
    }

    /// Picks the concrete strategy for a file of `file_size` bytes.
    ///
    /// Never returns [`LoadStrategy::Auto`].
    ///
    /// # Errors
    /// Returns an error if the memory budget cannot be resolved.
    pub fn resolve(&self, file_size: u64) -> Result<LoadStrategy> {
        match self.strategy {
            LoadStrategy::Auto => {
                let budget = self.resolve_budget_bytes()?;
                let fits = usize::try_from(file_size).is_ok_and(|size| size <= budget);
                Ok(if fits {
                    LoadStrategy::Mapped
                } else {
                    LoadStrategy::Streamed
                })
            }
            explicit => Ok(explicit),
        }
    }
}
