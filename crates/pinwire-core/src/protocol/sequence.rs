//! Message-id counter for outbound requests.
//!
//! # Why ids wrap to 1, not 0 (for beginners)
//!
//! The 16-bit id field pairs a request with the broker's response.  Id 0 is
//! reserved as "invalid": the broker rejects it, and so does our own decoder.
//! The counter therefore runs `1, 2, ..., 0xFFFF, 1, 2, ...` and never yields
//! 0.
//!
//! The counter is owned by the engine and only ever touched from its single
//! logical thread, so a plain integer is enough; no atomics are needed.

/// Generator of non-zero 16-bit message ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageIdCounter {
    next: u16,
}

impl MessageIdCounter {
    /// Creates a counter whose first id is 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the next id and advances, wrapping from `0xFFFF` to 1.
    pub fn next_id(&mut self) -> u16 {
        let id = self.next;
        self.next = match self.next.checked_add(1) {
            Some(n) => n,
            None => 1,
        };
        id
    }

    /// Returns the id the next call to [`next_id`](Self::next_id) will yield.
    pub fn peek(&self) -> u16 {
        self.next
    }

    /// Restarts the sequence at 1.
    pub fn reset(&mut self) {
        self.next = 1;
    }
}

impl Default for MessageIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_one() {
        // Arrange
        let mut counter = MessageIdCounter::new();

        // Act
        let first = counter.next_id();

        // Assert
        assert_eq!(first, 1);
    }

    #[test]
    fn test_counter_wraps_to_one_skipping_zero() {
        // Arrange – start one step before overflow
        let mut counter = MessageIdCounter { next: u16::MAX };

        // Act
        let before_wrap = counter.next_id();
        let after_wrap = counter.next_id();

        // Assert
        assert_eq!(before_wrap, u16::MAX);
        assert_eq!(after_wrap, 1, "counter must never yield 0");
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut counter = MessageIdCounter::new();
        counter.next_id();

        assert_eq!(counter.peek(), 2);
        assert_eq!(counter.next_id(), 2);
    }

    #[test]
    fn test_reset_restarts_at_one() {
        let mut counter = MessageIdCounter::new();
        (0..10).for_each(|_| {
            counter.next_id();
        });

        counter.reset();

        assert_eq!(counter.next_id(), 1);
    }
}
