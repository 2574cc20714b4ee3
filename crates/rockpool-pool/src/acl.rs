//! Access control: levels, signed change records, and the replayed state.
//!
//! Access changes are themselves heads (published under `access/<id>`), so
//! the ACL of a pool is always the deterministic replay of its access
//! heads in ascending id order. The state keeps the full ordered history:
//! verification needs the level an author held *as of* a given head id,
//! not just the latest snapshot, so that replica arrival order can never
//! change the outcome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PoolError, Result};

/// Membership level of an identity within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum AccessLevel {
    /// Terminal until re-added by an admin.
    Blocked,
    /// Not a member.
    None,
    /// May read heads.
    Reader,
    /// May read and publish heads.
    Active,
    /// May additionally change membership.
    Admin,
}

impl From<AccessLevel> for i8 {
    fn from(level: AccessLevel) -> i8 {
        match level {
            AccessLevel::Blocked => -1,
            AccessLevel::None => 0,
            AccessLevel::Reader => 1,
            AccessLevel::Active => 2,
            AccessLevel::Admin => 3,
        }
    }
}

impl TryFrom<i8> for AccessLevel {
    type Error = String;

    fn try_from(value: i8) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(AccessLevel::Blocked),
            0 => Ok(AccessLevel::None),
            1 => Ok(AccessLevel::Reader),
            2 => Ok(AccessLevel::Active),
            3 => Ok(AccessLevel::Admin),
            other => Err(format!("invalid access level {other}")),
        }
    }
}

/// The body of an access-change head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessChange {
    /// The identity whose level changes.
    pub target_id: String,
    /// The new level.
    pub new_level: AccessLevel,
}

/// The replayed access-control state of one pool.
#[derive(Debug, Default, Clone)]
pub struct AclState {
    /// Applied changes, keyed by the id of the head that carried them.
    changes: BTreeMap<u64, AccessChange>,
}

impl AclState {
    /// Create an empty state (no members, no admins).
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no change has been applied yet.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The current level of an identity.
    pub fn level(&self, id: &str) -> AccessLevel {
        self.level_before(id, u64::MAX)
    }

    /// The level an identity held considering only changes with head id
    /// strictly below `before_id`.
    pub fn level_before(&self, id: &str, before_id: u64) -> AccessLevel {
        self.changes
            .range(..before_id)
            .rev()
            .find(|(_, c)| c.target_id == id)
            .map(|(_, c)| c.new_level)
            .unwrap_or(AccessLevel::None)
    }

    /// Current number of admins.
    pub fn admins(&self) -> usize {
        let mut latest: BTreeMap<&str, AccessLevel> = BTreeMap::new();
        for change in self.changes.values() {
            latest.insert(&change.target_id, change.new_level);
        }
        latest.values().filter(|l| **l == AccessLevel::Admin).count()
    }

    /// All current members with a level above `None`.
    pub fn members(&self) -> BTreeMap<String, AccessLevel> {
        let mut latest: BTreeMap<String, AccessLevel> = BTreeMap::new();
        for change in self.changes.values() {
            latest.insert(change.target_id.clone(), change.new_level);
        }
        latest.retain(|_, l| *l != AccessLevel::None);
        latest
    }

    /// Check whether a change carried by head `head_id` and signed by
    /// `author_id` is applicable.
    ///
    /// The genesis change (first ever, author granting themselves Admin)
    /// seeds the pool; afterwards only an identity that was Admin strictly
    /// before `head_id` may change levels, and the last admin can never be
    /// demoted.
    pub fn validate(&self, head_id: u64, author_id: &str, change: &AccessChange) -> Result<()> {
        let genesis = self.changes.is_empty()
            && author_id == change.target_id
            && change.new_level == AccessLevel::Admin;
        if genesis {
            return Ok(());
        }

        if self.level_before(author_id, head_id) != AccessLevel::Admin {
            return Err(PoolError::Conflict(format!(
                "{author_id} is not admin as of head {head_id}"
            )));
        }
        if self.level(&change.target_id) == AccessLevel::Admin
            && change.new_level < AccessLevel::Admin
            && self.admins() <= 1
        {
            return Err(PoolError::Conflict("cannot demote the last admin".into()));
        }
        Ok(())
    }

    /// Validate and apply a change. Idempotent per head id.
    pub fn apply(&mut self, head_id: u64, author_id: &str, change: AccessChange) -> Result<()> {
        if let Some(existing) = self.changes.get(&head_id) {
            if *existing == change {
                return Ok(());
            }
            return Err(PoolError::Conflict(format!(
                "different change already applied at head {head_id}"
            )));
        }
        self.validate(head_id, author_id, &change)?;
        self.changes.insert(head_id, change);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(target: &str, level: AccessLevel) -> AccessChange {
        AccessChange {
            target_id: target.into(),
            new_level: level,
        }
    }

    #[test]
    fn test_genesis_seeds_admin() {
        let mut acl = AclState::new();
        acl.apply(1, "alice", change("alice", AccessLevel::Admin)).unwrap();
        assert_eq!(acl.level("alice"), AccessLevel::Admin);
        assert_eq!(acl.admins(), 1);
    }

    #[test]
    fn test_genesis_must_be_self_admin() {
        let mut acl = AclState::new();
        assert!(acl.apply(1, "alice", change("bob", AccessLevel::Admin)).is_err());
        assert!(acl
            .apply(1, "alice", change("alice", AccessLevel::Active))
            .is_err());
    }

    #[test]
    fn test_ladder_and_block() {
        let mut acl = AclState::new();
        acl.apply(1, "alice", change("alice", AccessLevel::Admin)).unwrap();
        acl.apply(2, "alice", change("bob", AccessLevel::Reader)).unwrap();
        acl.apply(3, "alice", change("bob", AccessLevel::Active)).unwrap();
        assert_eq!(acl.level("bob"), AccessLevel::Active);

        acl.apply(4, "alice", change("bob", AccessLevel::Blocked)).unwrap();
        assert_eq!(acl.level("bob"), AccessLevel::Blocked);

        // Blocking is terminal until re-added by an admin.
        acl.apply(5, "alice", change("bob", AccessLevel::Reader)).unwrap();
        assert_eq!(acl.level("bob"), AccessLevel::Reader);
    }

    #[test]
    fn test_non_admin_cannot_change() {
        let mut acl = AclState::new();
        acl.apply(1, "alice", change("alice", AccessLevel::Admin)).unwrap();
        acl.apply(2, "alice", change("bob", AccessLevel::Active)).unwrap();

        let err = acl
            .apply(3, "bob", change("carol", AccessLevel::Reader))
            .unwrap_err();
        assert!(matches!(err, PoolError::Conflict(_)));
    }

    #[test]
    fn test_admin_as_of_head_id() {
        let mut acl = AclState::new();
        acl.apply(1, "alice", change("alice", AccessLevel::Admin)).unwrap();
        acl.apply(5, "alice", change("bob", AccessLevel::Admin)).unwrap();

        // A change bob signed before becoming admin is stale, even when it
        // arrives after the promotion.
        assert!(acl.apply(3, "bob", change("carol", AccessLevel::Reader)).is_err());
        // After the promotion id it applies.
        acl.apply(7, "bob", change("carol", AccessLevel::Reader)).unwrap();
    }

    #[test]
    fn test_last_admin_cannot_be_demoted() {
        let mut acl = AclState::new();
        acl.apply(1, "alice", change("alice", AccessLevel::Admin)).unwrap();

        assert!(acl
            .apply(2, "alice", change("alice", AccessLevel::Active))
            .is_err());

        // With a second admin, self-demotion is allowed.
        acl.apply(3, "alice", change("bob", AccessLevel::Admin)).unwrap();
        acl.apply(4, "alice", change("alice", AccessLevel::Active)).unwrap();
        assert_eq!(acl.admins(), 1);
    }

    #[test]
    fn test_apply_idempotent_per_head() {
        let mut acl = AclState::new();
        acl.apply(1, "alice", change("alice", AccessLevel::Admin)).unwrap();
        acl.apply(1, "alice", change("alice", AccessLevel::Admin)).unwrap();
        assert!(acl.apply(1, "alice", change("alice", AccessLevel::Active)).is_err());
    }

    #[test]
    fn test_level_before_history() {
        let mut acl = AclState::new();
        acl.apply(1, "alice", change("alice", AccessLevel::Admin)).unwrap();
        acl.apply(2, "alice", change("bob", AccessLevel::Active)).unwrap();
        acl.apply(10, "alice", change("bob", AccessLevel::Blocked)).unwrap();

        assert_eq!(acl.level_before("bob", 2), AccessLevel::None);
        assert_eq!(acl.level_before("bob", 5), AccessLevel::Active);
        assert_eq!(acl.level_before("bob", 11), AccessLevel::Blocked);
        assert_eq!(acl.level("bob"), AccessLevel::Blocked);
    }

    #[test]
    fn test_replay_is_deterministic() {
        // Applying the same changes in any arrival order converges,
        // because validation is by head id, not arrival order.
        let changes = vec![
            (1u64, "alice", change("alice", AccessLevel::Admin)),
            (2, "alice", change("bob", AccessLevel::Active)),
            (3, "alice", change("carol", AccessLevel::Reader)),
        ];

        let mut in_order = AclState::new();
        for (id, author, c) in &changes {
            in_order.apply(*id, author, c.clone()).unwrap();
        }

        let mut reordered = AclState::new();
        reordered.apply(1, "alice", change("alice", AccessLevel::Admin)).unwrap();
        reordered.apply(3, "alice", change("carol", AccessLevel::Reader)).unwrap();
        reordered.apply(2, "alice", change("bob", AccessLevel::Active)).unwrap();

        assert_eq!(in_order.members(), reordered.members());
    }

    #[test]
    fn test_access_change_json() {
        let c = change("bob", AccessLevel::Blocked);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"targetId":"bob","newLevel":-1}"#);
        let back: AccessChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
