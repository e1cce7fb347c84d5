//! Per-chart ID allocation.
//!
//! Numbers are handed out monotonically and never reused within a session,
//! even after the markable or set that held them is deleted.

/// Prefix of generated markable IDs.
pub const MARKABLE_ID_PREFIX: &str = "markable_";

/// Prefix of generated set group values.
pub const SET_ID_PREFIX: &str = "set_";

/// Counters for markable IDs and set group values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next_markable_num: u64,
    next_set_num: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next_markable_num: 1,
            next_set_num: 1,
        }
    }

    /// Return `markable_N` and advance the counter.
    pub fn next_markable_id(&mut self) -> String {
        let id = format!("{MARKABLE_ID_PREFIX}{}", self.next_markable_num);
        self.next_markable_num += 1;
        id
    }

    /// Return `set_N` and advance the counter.
    pub fn next_set_id(&mut self) -> String {
        let id = format!("{SET_ID_PREFIX}{}", self.next_set_num);
        self.next_set_num += 1;
        id
    }

    /// The number the next markable ID will use.
    pub fn peek_markable_num(&self) -> u64 {
        self.next_markable_num
    }

    pub fn peek_set_num(&self) -> u64 {
        self.next_set_num
    }

    /// Make sure the counter is past a number seen in loaded data.
    pub fn observe_markable_num(&mut self, seen: u64) {
        self.next_markable_num = self.next_markable_num.max(seen.saturating_add(1));
    }

    pub fn observe_set_num(&mut self, seen: u64) {
        self.next_set_num = self.next_set_num.max(seen.saturating_add(1));
    }
}

/// Numeric suffix of an ID such as `markable_12`.
pub fn numeric_suffix(id: &str, prefix: &str) -> Option<u64> {
    id.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next_markable_id(), "markable_1");
        assert_eq!(ids.next_markable_id(), "markable_2");
        assert_eq!(ids.next_set_id(), "set_1");
    }

    #[test]
    fn observing_only_moves_forward() {
        let mut ids = IdAllocator::new();
        ids.observe_markable_num(41);
        ids.observe_markable_num(7);
        assert_eq!(ids.next_markable_id(), "markable_42");
        ids.observe_set_num(3);
        assert_eq!(ids.next_set_id(), "set_4");
    }

    #[test]
    fn suffix_parsing() {
        assert_eq!(numeric_suffix("markable_17", MARKABLE_ID_PREFIX), Some(17));
        assert_eq!(numeric_suffix("markable_x", MARKABLE_ID_PREFIX), None);
        assert_eq!(numeric_suffix("set_3", MARKABLE_ID_PREFIX), None);
    }
}
