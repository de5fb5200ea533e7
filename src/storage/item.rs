//! The stored unit: a value plus an optional absolute expiry.

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// The actual value stored
    pub value: String,
    /// Epoch second after which the item is expired (None = never expires)
    pub expires_at: Option<i64>,
}

impl Item {
    /// Creates a new item without expiry.
    pub fn new(value: String) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Checks if this item has expired as of `now` (epoch seconds).
    ///
    /// An item is still live during its deadline second; it expires once
    /// `now` is strictly past it.
    #[inline]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }

    /// Returns the remaining lifetime in whole seconds, or None if no expiry.
    ///
    /// Saturates instead of overflowing for deadlines near the ends of the
    /// `i64` range.
    pub fn remaining(&self, now: i64) -> Option<i64> {
        self.expires_at.map(|exp| exp.saturating_sub(now))
    }
}
