//! Redis Set data structure

use ahash::AHashSet;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RedisSet {
    members: AHashSet<String>,
}

impl RedisSet {
    pub fn new() -> Self {
        RedisSet {
            members: AHashSet::new(),
        }
    }

    /// Returns true if the member was not already present.
    pub fn add(&mut self, member: &str) -> bool {
        #[cfg(debug_assertions)]
        let pre_len = self.members.len();

        let inserted = self.members.insert(member.to_string());

        // TigerStyle: Postconditions
        debug_assert!(
            self.members.contains(member),
            "Postcondition violated: member must exist after add"
        );
        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.members.len(),
            if inserted { pre_len + 1 } else { pre_len },
            "Postcondition violated: len must be correct after add"
        );

        inserted
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.contains(member)
    }

    /// Members in arbitrary order.
    pub fn members(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_add_and_contains() {
        let mut set = RedisSet::new();

        assert!(set.add("apple"));
        assert_eq!(set.len(), 1);
        assert!(set.contains("apple"));

        // Add duplicate
        assert!(!set.add("apple"));
        assert_eq!(set.len(), 1);

        assert!(set.add("banana"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_set_members() {
        let mut set = RedisSet::new();
        set.add("x");
        set.add("y");
        set.add("z");

        let mut members = set.members();
        members.sort();
        assert_eq!(members, vec!["x", "y", "z"]);
    }
}
