//! Bit-packed permission sets.
//!
//! A permission set is carried inside every token, so it has to stay small
//! no matter how many permissions exist. IDs are grouped eight at a time:
//! permission `id` lives in group `ceil(id / 8)` at bit `7 - ((id - 1) % 8)`,
//! so the lowest ID of a group occupies the most significant bit.
//!
//! ```text
//! ids {1, 2, 9}  =>  { 1: 0b1100_0000, 2: 0b1000_0000 }
//! ```
//!
//! Group indices start at 1. An empty set encodes to an empty mapping.
//!
//! ID `0` is not a valid permission: `encode` ignores it and
//! `has_permission` answers `false` for it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Number of permission bits packed into one group.
pub const BITS_PER_GROUP: u32 = 8;

/// Identifier of a single permission. Valid identifiers start at 1.
pub type PermissionId = u32;

/// Grouped permission bits, keyed by 1-based group index.
///
/// Serializes as a JSON object (`{"1": 192, "2": 128}`) so tokens stay
/// readable by any JWT library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionBitmask(BTreeMap<u32, u8>);

impl PermissionBitmask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pack `ids` into groups. Invalid IDs (`0`) are skipped.
    pub fn encode<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = PermissionId>,
    {
        let mut mask = Self::new();
        for id in ids {
            mask.insert(id);
        }
        mask
    }

    /// Set the bit for `id`. Returns `false` (and changes nothing) for `0`.
    pub fn insert(&mut self, id: PermissionId) -> bool {
        let Some((group, bit)) = locate(id) else {
            tracing::debug!(permission_id = id, "ignoring invalid permission id");
            return false;
        };
        *self.0.entry(group).or_insert(0) |= 1 << bit;
        true
    }

    /// Unpack every set bit back into a permission ID.
    pub fn decode(&self) -> BTreeSet<PermissionId> {
        self.iter().collect()
    }

    /// Membership test. Never fails: missing groups and invalid IDs are `false`.
    pub fn has_permission(&self, id: PermissionId) -> bool {
        match locate(id) {
            Some((group, bit)) => self
                .0
                .get(&group)
                .is_some_and(|bits| bits & (1 << bit) != 0),
            None => false,
        }
    }

    /// Permission IDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PermissionId> + '_ {
        self.0.iter().flat_map(|(&group, &bits)| {
            (0..BITS_PER_GROUP)
                .rev()
                .filter(move |bit| bits & (1 << bit) != 0)
                .filter_map(move |bit| id_at(group, bit))
        })
    }

    /// Raw bits of one group, if present.
    pub fn group(&self, index: u32) -> Option<u8> {
        self.0.get(&index).copied()
    }

    pub fn groups(&self) -> &BTreeMap<u32, u8> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|bits| *bits == 0)
    }
}

impl FromIterator<PermissionId> for PermissionBitmask {
    fn from_iter<T: IntoIterator<Item = PermissionId>>(iter: T) -> Self {
        Self::encode(iter)
    }
}

impl From<BTreeMap<u32, u8>> for PermissionBitmask {
    fn from(groups: BTreeMap<u32, u8>) -> Self {
        Self(groups)
    }
}

/// Free-function form of [`PermissionBitmask::encode`].
pub fn encode<I>(ids: I) -> PermissionBitmask
where
    I: IntoIterator<Item = PermissionId>,
{
    PermissionBitmask::encode(ids)
}

/// Free-function form of [`PermissionBitmask::decode`].
pub fn decode(mask: &PermissionBitmask) -> BTreeSet<PermissionId> {
    mask.decode()
}

/// Free-function form of [`PermissionBitmask::has_permission`].
pub fn has_permission(id: PermissionId, mask: &PermissionBitmask) -> bool {
    mask.has_permission(id)
}

fn locate(id: PermissionId) -> Option<(u32, u32)> {
    if id == 0 {
        return None;
    }
    let offset = id - 1;
    let group = offset / BITS_PER_GROUP + 1;
    let bit = BITS_PER_GROUP - 1 - offset % BITS_PER_GROUP;
    Some((group, bit))
}

// Group 0 or an overflowing group can only come from a hand-crafted token.
fn id_at(group: u32, bit: u32) -> Option<PermissionId> {
    let base = group.checked_sub(1)?.checked_mul(BITS_PER_GROUP)?;
    base.checked_add(BITS_PER_GROUP - 1 - bit)?.checked_add(1)
}
