//! Configuration for stream pipelines.

use serde::{Deserialize, Serialize};

/// Settings applied to a pipeline when its source is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Label attached to the pipeline's log events.
    #[serde(default = "default_name")]
    pub name: String,
    /// Minimum capacity of each stage's output channel.
    ///
    /// The effective capacity is never below the stage's parallelism.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Parallelism degree applied as the pipeline's first operation.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_name() -> String {
    "stream".to_string()
}

fn default_channel_capacity() -> usize {
    1
}

fn default_parallelism() -> usize {
    1
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            channel_capacity: default_channel_capacity(),
            parallelism: default_parallelism(),
        }
    }
}

impl StreamConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the minimum channel capacity. Zero is raised to one.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Sets the initial parallelism degree.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Returns the capacity of a stage channel served by `parallelism` workers.
    #[must_use]
    pub fn capacity_for(&self, parallelism: usize) -> usize {
        self.channel_capacity.max(parallelism).max(1)
    }
}
