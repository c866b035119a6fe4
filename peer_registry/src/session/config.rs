use std::time::Duration;

use crate::{diff::DiffStrategy, record::MetaData};

/// Roughly one display frame.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tick_interval: Duration,
    pub diff: DiffStrategy,
    /// Published by the runner when it joins on the session's behalf.
    pub meta_data: MetaData,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfigBuilder::new().build()
    }
}

pub struct SessionConfigBuilder {
    tick_interval: Duration,
    diff: DiffStrategy,
    meta_data: MetaData,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            diff: DiffStrategy::default(),
            meta_data: MetaData::default().with_start(false),
        }
    }
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> SessionConfig {
        SessionConfig {
            tick_interval: self.tick_interval,
            diff: self.diff,
            meta_data: self.meta_data,
        }
    }

    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn diff(mut self, diff: DiffStrategy) -> Self {
        self.diff = diff;
        self
    }

    pub fn meta_data(mut self, meta_data: MetaData) -> Self {
        self.meta_data = meta_data;
        self
    }
}
