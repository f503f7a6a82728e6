//! Configuration for the buffer registry

use serde::{Deserialize, Serialize};

use crate::{
    error::{RegistryError, Result},
    limits,
    sanity::LengthProbe,
};

/// Configuration for a [`BufferRegistry`](super::BufferRegistry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Padding tolerated between advertised and actual descriptor sizes
    pub page_size: usize,
    /// How descriptor lengths are probed during sanity checks
    pub length_probe: LengthProbe,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            page_size: limits::system_page_size(),
            length_probe: LengthProbe::default(),
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with system defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sanity tolerance
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the descriptor length probe
    pub fn with_length_probe(mut self, length_probe: LengthProbe) -> Self {
        self.length_probe = length_probe;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(RegistryError::invalid_parameter(
                "page_size",
                "Page size must be greater than 0",
            ));
        }

        if !self.page_size.is_power_of_two() {
            return Err(RegistryError::invalid_parameter(
                "page_size",
                format!("Page size {} is not a power of two", self.page_size),
            ));
        }

        Ok(())
    }
}
