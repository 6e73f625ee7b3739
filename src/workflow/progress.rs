// ABOUTME: Monotonic progress level of a provisioning run.
// ABOUTME: The level alone decides which rollback steps apply.

use super::rollback::DbCleanup;
use serde::Serialize;
use std::fmt;

/// How far provisioning got. Ordered; only ever raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct ProgressLevel(u8);

impl ProgressLevel {
    pub const NONE: Self = Self(0);
    pub const ROOT_CREATED: Self = Self(1);
    pub const NETWORK_JOINED: Self = Self(2);
    pub const STARTED: Self = Self(3);
    pub const HEALTHY: Self = Self(4);

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "validated",
            1 => "root created",
            2 => "network joined",
            3 => "started",
            _ => "healthy",
        }
    }
}

impl fmt::Display for ProgressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// State threaded through the stages of one run.
#[derive(Debug, Default)]
pub struct Progress {
    level: ProgressLevel,
    db_cleanup: Option<DbCleanup>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> ProgressLevel {
        self.level
    }

    /// Raise the level before a stage commits its first side effect.
    /// Lower values are ignored.
    pub fn raise(&mut self, level: ProgressLevel) {
        if level > self.level {
            tracing::info!("progress: {}", level);
            self.level = level;
        }
    }

    /// Remember database artifacts this run created.
    pub fn set_db_cleanup(&mut self, cleanup: DbCleanup) {
        self.db_cleanup = Some(cleanup);
    }

    pub fn take_db_cleanup(&mut self) -> Option<DbCleanup> {
        self.db_cleanup.take()
    }
}
