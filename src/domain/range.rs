//! Identifier allocation ranges.

use serde::{Deserialize, Serialize};

/// Lower bound used when no range is configured.
pub const DEFAULT_RANGE_MIN: u32 = 10_000;

/// Upper bound used when no range is configured.
pub const DEFAULT_RANGE_MAX: u32 = 15_000;

/// An inclusive range of numeric identifiers available for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRange {
    /// First identifier in the range (inclusive).
    #[serde(default = "default_min")]
    pub min: u32,
    /// Last identifier in the range (inclusive).
    #[serde(default = "default_max")]
    pub max: u32,
}

const fn default_min() -> u32 {
    DEFAULT_RANGE_MIN
}

const fn default_max() -> u32 {
    DEFAULT_RANGE_MAX
}

impl AllocationRange {
    /// Create a new allocation range.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Number of identifiers in this range.
    ///
    /// Returned as `u64` so that `[0, u32::MAX]` does not overflow.
    #[must_use]
    pub const fn size(&self) -> u64 {
        if self.max < self.min {
            return 0;
        }
        (self.max - self.min) as u64 + 1
    }

    /// Check whether `value` lies inside the range.
    #[must_use]
    pub const fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Iterate over every identifier in the range.
    pub fn iter(&self) -> std::ops::RangeInclusive<u32> {
        self.min..=self.max
    }

    /// Validate the range.
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds are inverted or the range starts at 0.
    pub fn validate(&self) -> Result<(), String> {
        if self.min == 0 {
            return Err("min cannot be 0 (reserved for root)".to_string());
        }
        if self.min > self.max {
            return Err(format!(
                "min ({}) cannot be greater than max ({})",
                self.min, self.max
            ));
        }
        Ok(())
    }
}

impl Default for AllocationRange {
    fn default() -> Self {
        Self::new(DEFAULT_RANGE_MIN, DEFAULT_RANGE_MAX)
    }
}

impl std::fmt::Display for AllocationRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
