//! Id allocation settings

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Inclusive range of ids fixed by the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedRange {
    pub start: i32,
    pub end: i32,
}

impl ReservedRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, id: i32) -> bool {
        self.start <= id && id <= self.end
    }
}

/// Settings for layout id allocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdConfig {
    /// Ids that are never auto-assigned. Clients may still request them by
    /// using the id itself as the key.
    #[serde(default)]
    pub reserved: Vec<ReservedRange>,
}

impl IdConfig {
    /// Reservation predicate for the id allocator
    pub fn is_reserved(&self, id: i32) -> bool {
        self.reserved.iter().any(|range| range.contains(id))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for range in &self.reserved {
            if range.start > range.end {
                return Err(ConfigError::Invalid(format!(
                    "reserved id range {}..={} is empty",
                    range.start, range.end
                )));
            }
        }

        // A reservation covering every non-negative id leaves nothing to allocate
        if self.is_reserved(0) && self.is_reserved(i32::MAX) {
            let mut covered = 0i64;
            let mut ranges: Vec<_> = self.reserved.iter().filter(|r| r.end >= 0).collect();
            ranges.sort_by_key(|r| r.start);
            for range in ranges {
                if i64::from(range.start) > covered {
                    break;
                }
                covered = covered.max(i64::from(range.end) + 1);
            }
            if covered > i64::from(i32::MAX) {
                return Err(ConfigError::Invalid(
                    "reserved id ranges cover every allocatable id".to_string(),
                ));
            }
        }

        Ok(())
    }
}
