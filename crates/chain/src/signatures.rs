use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of recent blocks kept per validator.
pub const RECENT_BLOCKS_WINDOW: usize = 100;
/// Ceiling for the running signed/total counters.
pub const PERFORMANCE_WINDOW: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub block_height: u64,
    pub signed: bool,
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

/// Long-lived signing history of one validator on one network.
///
/// `recent_blocks` is a ring buffer ordered by height, oldest at the front.
/// Entries for a height already in the buffer are ignored, so replaying a
/// block leaves the record untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSignatureRecord {
    pub network: String,
    pub validator_address: String,
    pub recent_blocks: VecDeque<SignatureEntry>,
    pub total_signed_blocks: u64,
    pub total_blocks_in_window: u64,
    /// Percentage in `[0, 100]`, two decimals.
    pub signature_rate: f64,
    pub consecutive_signed: u64,
    pub consecutive_missed: u64,
    pub last_signed_block: Option<u64>,
    pub last_signed_block_time: Option<DateTime<Utc>>,
}

impl ValidatorSignatureRecord {
    pub fn new(network: &str, validator_address: &str) -> Self {
        Self {
            network: network.to_string(),
            validator_address: validator_address.to_string(),
            recent_blocks: VecDeque::with_capacity(RECENT_BLOCKS_WINDOW),
            total_signed_blocks: 0,
            total_blocks_in_window: 0,
            signature_rate: 0.0,
            consecutive_signed: 0,
            consecutive_missed: 0,
            last_signed_block: None,
            last_signed_block_time: None,
        }
    }

    /// Record one block outcome. Returns false if the entry was a replay
    /// (height already in the window) or older than a full window.
    pub fn record(&mut self, entry: SignatureEntry) -> bool {
        if self
            .recent_blocks
            .iter()
            .any(|e| e.block_height == entry.block_height)
        {
            return false;
        }
        if self.recent_blocks.len() >= RECENT_BLOCKS_WINDOW {
            if let Some(oldest) = self.recent_blocks.front() {
                if entry.block_height < oldest.block_height {
                    return false;
                }
            }
        }

        let is_newest = self
            .recent_blocks
            .back()
            .map_or(true, |last| entry.block_height > last.block_height);

        self.push_window(entry.clone());
        self.bump_totals(entry.signed);

        if entry.signed {
            if self
                .last_signed_block
                .map_or(true, |h| entry.block_height > h)
            {
                self.last_signed_block = Some(entry.block_height);
                self.last_signed_block_time = Some(entry.timestamp);
            }
        }

        // Streaks follow chain order; a backfilled older height does not
        // reset them.
        if is_newest {
            if entry.signed {
                self.consecutive_signed += 1;
                self.consecutive_missed = 0;
            } else {
                self.consecutive_missed += 1;
                self.consecutive_signed = 0;
            }
        }

        self.recompute_rate();
        true
    }

    /// Insert by height, evicting the oldest entry if full.
    fn push_window(&mut self, entry: SignatureEntry) {
        let pos = self
            .recent_blocks
            .iter()
            .rposition(|e| e.block_height < entry.block_height)
            .map_or(0, |p| p + 1);
        self.recent_blocks.insert(pos, entry);
        while self.recent_blocks.len() > RECENT_BLOCKS_WINDOW {
            self.recent_blocks.pop_front();
        }
    }

    /// Once the counters reach the performance window, one average block is
    /// dropped before the new one is counted.
    fn bump_totals(&mut self, signed: bool) {
        if self.total_blocks_in_window >= PERFORMANCE_WINDOW {
            let total = self.total_blocks_in_window;
            let evicted_signed = (self.total_signed_blocks + total / 2) / total;
            self.total_signed_blocks = self.total_signed_blocks.saturating_sub(evicted_signed);
            self.total_blocks_in_window -= 1;
        }
        self.total_blocks_in_window += 1;
        if signed {
            self.total_signed_blocks += 1;
        }
    }

    /// Rolling-window ratio until a full window has been observed, running
    /// totals afterwards.
    pub fn recompute_rate(&mut self) {
        let rate = if self.total_blocks_in_window < RECENT_BLOCKS_WINDOW as u64 {
            let len = self.recent_blocks.len();
            if len == 0 {
                0.0
            } else {
                let signed = self.recent_blocks.iter().filter(|e| e.signed).count();
                signed as f64 / len as f64 * 100.0
            }
        } else {
            self.total_signed_blocks as f64 / self.total_blocks_in_window as f64 * 100.0
        };
        self.signature_rate = (rate * 100.0).round() / 100.0;
    }

    /// Missed entries of the rolling window with height in `[from, to]`.
    pub fn missed_in_range(&self, from: u64, to: u64) -> Vec<SignatureEntry> {
        self.recent_blocks
            .iter()
            .filter(|e| !e.signed && e.block_height >= from && e.block_height <= to)
            .cloned()
            .collect()
    }

    pub fn latest_height(&self) -> Option<u64> {
        self.recent_blocks.back().map(|e| e.block_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(height: u64, signed: bool) -> SignatureEntry {
        SignatureEntry {
            block_height: height,
            signed,
            round: 0,
            timestamp: DateTime::from_timestamp(1_700_000_000 + height as i64, 0).unwrap(),
        }
    }

    #[test]
    fn test_new_record_is_empty() {
        let r = ValidatorSignatureRecord::new("bbn", "AA");
        assert!(r.recent_blocks.is_empty());
        assert_eq!(r.signature_rate, 0.0);
        assert_eq!(r.latest_height(), None);
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut r = ValidatorSignatureRecord::new("bbn", "AA");
        for h in 1..=250u64 {
            assert!(r.record(entry(h, h % 3 != 0)));
            assert!(r.recent_blocks.len() <= RECENT_BLOCKS_WINDOW);
            assert_eq!(r.latest_height(), Some(h));
        }
        assert_eq!(r.recent_blocks.len(), RECENT_BLOCKS_WINDOW);
        assert_eq!(r.recent_blocks.front().unwrap().block_height, 151);
        assert_eq!(r.total_blocks_in_window, 250);
    }

    #[test]
    fn test_replay_is_noop() {
        let mut r = ValidatorSignatureRecord::new("bbn", "AA");
        r.record(entry(10, true));
        r.record(entry(11, false));
        let snapshot = r.clone();
        assert!(!r.record(entry(11, false)));
        assert!(!r.record(entry(10, true)));
        assert_eq!(r, snapshot);
    }

    #[test]
    fn test_streaks_reset_on_opposite_outcome() {
        let mut r = ValidatorSignatureRecord::new("bbn", "AA");
        r.record(entry(1, true));
        r.record(entry(2, true));
        assert_eq!(r.consecutive_signed, 2);
        r.record(entry(3, false));
        assert_eq!(r.consecutive_signed, 0);
        assert_eq!(r.consecutive_missed, 1);
        r.record(entry(4, true));
        assert_eq!(r.consecutive_missed, 0);
        assert_eq!(r.consecutive_signed, 1);
        assert_eq!(r.last_signed_block, Some(4));
    }

    #[test]
    fn test_backfilled_entry_keeps_order_and_streak() {
        let mut r = ValidatorSignatureRecord::new("bbn", "AA");
        r.record(entry(100, true));
        r.record(entry(103, true));
        r.record(entry(101, false));
        let heights: Vec<u64> = r.recent_blocks.iter().map(|e| e.block_height).collect();
        assert_eq!(heights, vec![100, 101, 103]);
        assert_eq!(r.consecutive_signed, 2);
        assert_eq!(r.last_signed_block, Some(103));
    }

    #[test]
    fn test_entry_older_than_full_window_is_ignored() {
        let mut r = ValidatorSignatureRecord::new("bbn", "AA");
        for h in 1000..1100u64 {
            r.record(entry(h, true));
        }
        assert!(!r.record(entry(5, false)));
        assert_eq!(r.total_blocks_in_window, 100);
    }

    #[test]
    fn test_rate_uses_window_then_totals() {
        let mut r = ValidatorSignatureRecord::new("bbn", "AA");
        r.record(entry(1, true));
        r.record(entry(2, false));
        r.record(entry(3, true));
        assert_eq!(r.signature_rate, 66.67);

        let mut r = ValidatorSignatureRecord::new("bbn", "AA");
        for h in 1..=200u64 {
            r.record(entry(h, h <= 150));
        }
        // window (101..=200) is half signed, totals are 150/200
        assert_eq!(r.signature_rate, 75.0);
    }

    #[test]
    fn test_totals_capped_at_performance_window() {
        let mut r = ValidatorSignatureRecord::new("bbn", "AA");
        for h in 1..=(PERFORMANCE_WINDOW + 500) {
            r.record(entry(h, true));
        }
        assert_eq!(r.total_blocks_in_window, PERFORMANCE_WINDOW);
        assert_eq!(r.total_signed_blocks, PERFORMANCE_WINDOW);
        assert_eq!(r.signature_rate, 100.0);
    }

    #[test]
    fn test_missed_in_range() {
        let mut r = ValidatorSignatureRecord::new("bbn", "AA");
        for h in 1..=20u64 {
            r.record(entry(h, h % 5 != 0));
        }
        let missed: Vec<u64> = r
            .missed_in_range(1, 12)
            .iter()
            .map(|e| e.block_height)
            .collect();
        assert_eq!(missed, vec![5, 10]);
    }
}
