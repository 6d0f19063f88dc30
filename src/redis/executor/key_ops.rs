//! Key command implementations for CommandExecutor.
//!
//! Handles: DEL, EXISTS, PEXPIRE, PTTL
//!
//! # TigerStyle Invariants
//!
//! - DEL removes keys from data AND expirations
//! - PTTL returns -2 (not exists), -1 (no expiry), or >= 0 (remaining)
//! - PEXPIRE with a non-positive timeout deletes the key

use super::CommandExecutor;

impl CommandExecutor {
    pub fn del(&mut self, keys: &[String]) -> usize {
        #[cfg(debug_assertions)]
        let pre_data_len = self.data.len();

        let mut count = 0usize;
        for key in keys {
            let live = !self.is_expired(key);
            if self.remove_key(key).is_some() && live {
                count += 1;
            }
        }

        // TigerStyle: Postconditions
        debug_assert!(
            count <= keys.len(),
            "Postcondition violated: DEL count must be in [0, keys.len()]"
        );
        #[cfg(debug_assertions)]
        debug_assert!(
            self.data.len() <= pre_data_len.saturating_sub(count),
            "Postcondition violated: data.len() must decrease by at least the deleted count"
        );

        count
    }

    pub fn exists(&mut self, keys: &[String]) -> usize {
        keys.iter()
            .filter(|key| self.get_value(key).is_some())
            .count()
    }

    /// Set a relative deadline. Returns false when the key does not exist.
    pub fn pexpire(&mut self, key: &str, ms: i64) -> bool {
        if self.get_value(key).is_none() {
            return false;
        }

        if ms <= 0 {
            self.remove_key(key);
        } else {
            let deadline = self.current_time_ms.saturating_add(ms as u64);
            self.expirations.insert(key.to_string(), deadline);
        }
        true
    }

    pub fn pttl(&mut self, key: &str) -> i64 {
        if self.get_value(key).is_none() {
            return -2;
        }

        let result = match self.expirations.get(key) {
            Some(&deadline) => deadline.saturating_sub(self.current_time_ms) as i64,
            None => -1,
        };

        debug_assert!(
            result >= -1,
            "Postcondition violated: PTTL of a live key must be -1 or >= 0"
        );
        result
    }
}
