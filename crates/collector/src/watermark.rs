use std::collections::BTreeMap;

/// Highest record id seen per channel. Values never decrease.
#[derive(Debug, Clone, Default)]
pub struct Watermarks {
    seen: BTreeMap<String, u64>,
}

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current watermark for `channel` (0 if never seen).
    pub fn get(&self, channel: &str) -> u64 {
        self.seen.get(channel).copied().unwrap_or(0)
    }

    /// Raise the watermark to `record_id`. Returns false if that would move
    /// it backwards or leave it unchanged.
    pub fn advance(&mut self, channel: &str, record_id: u64) -> bool {
        let current = self.seen.entry(channel.to_string()).or_insert(0);
        if record_id > *current {
            *current = record_id;
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.seen.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_moves_forward() {
        let mut marks = Watermarks::new();
        assert_eq!(marks.get("Security"), 0);

        assert!(marks.advance("Security", 100));
        assert!(!marks.advance("Security", 99));
        assert!(!marks.advance("Security", 100));
        assert_eq!(marks.get("Security"), 100);

        assert!(marks.advance("Security", 101));
        assert_eq!(marks.get("Security"), 101);
        assert_eq!(marks.get("Application"), 0);
    }
}
