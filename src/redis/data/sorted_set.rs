//! Redis Sorted Set ordered by (score, member)

use ahash::AHashMap;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One endpoint of a score range (`5`, `(5`, `-inf`, `+inf`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
    NegInfinity,
    PosInfinity,
}

impl ScoreBound {
    fn admits_as_min(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(min) => score >= min,
            ScoreBound::Exclusive(min) => score > min,
            ScoreBound::NegInfinity => true,
            ScoreBound::PosInfinity => false,
        }
    }

    fn admits_as_max(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(max) => score <= max,
            ScoreBound::Exclusive(max) => score < max,
            ScoreBound::NegInfinity => false,
            ScoreBound::PosInfinity => true,
        }
    }
}

impl FromStr for ScoreBound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "-inf" => return Ok(ScoreBound::NegInfinity),
            "+inf" | "inf" => return Ok(ScoreBound::PosInfinity),
            _ => {}
        }

        let (exclusive, num_str) = match s.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let score = num_str
            .parse::<f64>()
            .map_err(|_| "ERR min or max is not a float".to_string())?;

        Ok(if exclusive {
            ScoreBound::Exclusive(score)
        } else {
            ScoreBound::Inclusive(score)
        })
    }
}

impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBound::Inclusive(score) => write!(f, "{}", score),
            ScoreBound::Exclusive(score) => write!(f, "({}", score),
            ScoreBound::NegInfinity => f.write_str("-inf"),
            ScoreBound::PosInfinity => f.write_str("+inf"),
        }
    }
}

/// Index entry ordered by score, then member bytes.
#[derive(Clone, Debug)]
struct ScoredMember {
    score: f64,
    member: String,
}

impl PartialEq for ScoredMember {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredMember {}

impl PartialOrd for ScoredMember {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredMember {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

/// Sorted set: member -> score map plus an ordered index.
#[derive(Clone, Debug, Default)]
pub struct RedisSortedSet {
    /// O(1) score lookup by member
    members: AHashMap<String, f64>,
    /// O(log n) ordered operations
    index: BTreeSet<ScoredMember>,
}

impl RedisSortedSet {
    pub fn new() -> Self {
        RedisSortedSet {
            members: AHashMap::new(),
            index: BTreeSet::new(),
        }
    }

    /// VOPR: Verify all invariants hold for this sorted set
    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        // Invariant 1: members and index must have same length
        debug_assert_eq!(
            self.members.len(),
            self.index.len(),
            "Invariant violated: members.len() ({}) != index.len() ({})",
            self.members.len(),
            self.index.len()
        );

        // Invariant 2: every indexed entry carries the member's current score
        for entry in &self.index {
            debug_assert_eq!(
                self.members.get(&entry.member).map(|s| s.to_bits()),
                Some(entry.score.to_bits()),
                "Invariant violated: member '{}' indexed with stale score {}",
                entry.member,
                entry.score
            );
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn verify_invariants(&self) {}

    /// Add member with score. Returns true if new member, false if updated.
    pub fn add(&mut self, member: &str, score: f64) -> bool {
        debug_assert!(!score.is_nan(), "Precondition: score must not be NaN");

        use std::collections::hash_map::Entry;
        let is_new = match self.members.entry(member.to_string()) {
            Entry::Occupied(mut entry) => {
                let old_score = *entry.get();
                if old_score.to_bits() != score.to_bits() {
                    entry.insert(score);
                    self.index.remove(&ScoredMember {
                        score: old_score,
                        member: member.to_string(),
                    });
                    self.index.insert(ScoredMember {
                        score,
                        member: member.to_string(),
                    });
                }
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(score);
                self.index.insert(ScoredMember {
                    score,
                    member: member.to_string(),
                });
                true
            }
        };

        self.verify_invariants();
        is_new
    }

    /// Remove member. Returns true if removed.
    pub fn remove(&mut self, member: &str) -> bool {
        let removed = match self.members.remove(member) {
            Some(score) => self.index.remove(&ScoredMember {
                score,
                member: member.to_string(),
            }),
            None => false,
        };

        self.verify_invariants();
        removed
    }

    pub fn score(&self, member: &str) -> Option<f64> {
        self.members.get(member).copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// ZRANGEBYSCORE - members with score in [min, max], ascending.
    pub fn range_by_score(&self, min: ScoreBound, max: ScoreBound) -> Vec<(String, f64)> {
        self.index
            .iter()
            .skip_while(|e| !min.admits_as_min(e.score))
            .take_while(|e| max.admits_as_max(e.score))
            .map(|e| (e.member.clone(), e.score))
            .collect()
    }

    /// ZCOUNT - number of members with score in [min, max].
    pub fn count_in_range(&self, min: ScoreBound, max: ScoreBound) -> usize {
        self.index
            .iter()
            .skip_while(|e| !min.admits_as_min(e.score))
            .take_while(|e| max.admits_as_max(e.score))
            .count()
    }

    /// ZREMRANGEBYSCORE - remove members with score in [min, max].
    pub fn remove_range_by_score(&mut self, min: ScoreBound, max: ScoreBound) -> usize {
        #[cfg(debug_assertions)]
        let pre_len = self.len();

        let doomed: Vec<String> = self
            .range_by_score(min, max)
            .into_iter()
            .map(|(member, _)| member)
            .collect();
        for member in &doomed {
            self.remove(member);
        }

        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.len(),
            pre_len - doomed.len(),
            "Postcondition: len must shrink by the removed count"
        );
        doomed.len()
    }

    /// Iterate over member-score pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.index.iter().map(|e| (e.member.as_str(), e.score))
    }

    /// Check ordering. Always true unless the index is corrupted.
    pub fn is_sorted(&self) -> bool {
        self.index
            .iter()
            .zip(self.index.iter().skip(1))
            .all(|(a, b)| a < b)
    }
}

impl PartialEq for RedisSortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(s: &str) -> ScoreBound {
        s.parse().unwrap()
    }

    fn create_test_set() -> RedisSortedSet {
        let mut zset = RedisSortedSet::new();
        zset.add("alice", 100.0);
        zset.add("bob", 200.0);
        zset.add("charlie", 150.0);
        zset.add("dave", 50.0);
        zset
    }

    #[test]
    fn test_sorted_set_ordering() {
        let zset = create_test_set();
        let all: Vec<&str> = zset.iter().map(|(m, _)| m).collect();
        assert_eq!(all, vec!["dave", "alice", "charlie", "bob"]);
        assert!(zset.is_sorted());
    }

    #[test]
    fn test_equal_scores_order_by_member() {
        let mut zset = RedisSortedSet::new();
        zset.add("zebra", 100.0);
        zset.add("apple", 100.0);
        zset.add("mango", 100.0);

        let all: Vec<&str> = zset.iter().map(|(m, _)| m).collect();
        assert_eq!(all, vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn test_add_existing_member_updates_score() {
        let mut zset = RedisSortedSet::new();
        assert!(zset.add("a", 1.0));
        assert!(!zset.add("a", 5.0));
        assert_eq!(zset.len(), 1);
        assert_eq!(zset.score("a"), Some(5.0));
        assert!(zset.is_sorted());
    }

    #[test]
    fn test_range_by_score_inclusive() {
        let zset = create_test_set();
        let range = zset.range_by_score(bound("100"), bound("150"));
        assert_eq!(
            range,
            vec![("alice".to_string(), 100.0), ("charlie".to_string(), 150.0)]
        );
    }

    #[test]
    fn test_range_by_score_exclusive_and_infinite() {
        let zset = create_test_set();
        let range = zset.range_by_score(bound("(100"), bound("+inf"));
        let members: Vec<String> = range.into_iter().map(|(m, _)| m).collect();
        assert_eq!(members, vec!["charlie", "bob"]);

        assert_eq!(zset.count_in_range(bound("-inf"), bound("(100")), 1);
        assert!(zset.range_by_score(bound("300"), bound("100")).is_empty());
    }

    #[test]
    fn test_remove_range_by_score() {
        let mut zset = create_test_set();
        assert_eq!(zset.remove_range_by_score(bound("0"), bound("100")), 2);
        assert_eq!(zset.len(), 2);
        assert_eq!(zset.score("dave"), None);
        assert_eq!(zset.remove_range_by_score(bound("0"), bound("100")), 0);
    }

    #[test]
    fn test_remove_member() {
        let mut zset = create_test_set();
        assert!(zset.remove("bob"));
        assert!(!zset.remove("bob"));
        assert_eq!(zset.len(), 3);
        assert!(zset.is_sorted());
    }

    #[test]
    fn test_score_bound_parse_and_display() {
        assert_eq!(bound("5"), ScoreBound::Inclusive(5.0));
        assert_eq!(bound("(5"), ScoreBound::Exclusive(5.0));
        assert_eq!(bound("-inf"), ScoreBound::NegInfinity);
        assert_eq!(bound("inf"), ScoreBound::PosInfinity);
        assert!("abc".parse::<ScoreBound>().is_err());

        assert_eq!(ScoreBound::Inclusive(100.0).to_string(), "100");
        assert_eq!(ScoreBound::Exclusive(2.5).to_string(), "(2.5");
        assert_eq!(ScoreBound::PosInfinity.to_string(), "+inf");
    }
}
