//! UID ranges and the sub-priority map that keys them.
//!
//! A network routes traffic for the processes whose UID falls inside one of its ranges. Ranges
//! are grouped by sub-priority; lower sub-priorities win when several networks match a UID.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Sub-priority
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "sub-priority {0} is outside {lo}..={hi} and is not the no-default sentinel {sentinel}",
    lo = SubPriority::HIGHEST.0,
    hi = SubPriority::LOWEST.0,
    sentinel = SubPriority::NO_DEFAULT.0
)]
pub struct InvalidSubPriority(pub i32);

/// Tie-breaking rank among UID-range rules.
///
/// Constructed only through [`SubPriority::new`], so a value in hand is always inside
/// `HIGHEST..=LOWEST` or equal to `NO_DEFAULT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct SubPriority(i32);

impl SubPriority {
    pub const HIGHEST: SubPriority = SubPriority(0);
    pub const LOWEST: SubPriority = SubPriority(998);
    /// Rules at this sub-priority never select the network as a default route.
    pub const NO_DEFAULT: SubPriority = SubPriority(999);

    pub const fn new(value: i32) -> Result<Self, InvalidSubPriority> {
        if is_valid_sub_priority(value) {
            Ok(Self(value))
        } else {
            Err(InvalidSubPriority(value))
        }
    }

    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn is_no_default(self) -> bool {
        self.0 == Self::NO_DEFAULT.0
    }
}

#[must_use]
pub const fn is_valid_sub_priority(value: i32) -> bool {
    (value >= SubPriority::HIGHEST.0 && value <= SubPriority::LOWEST.0)
        || value == SubPriority::NO_DEFAULT.0
}

impl TryFrom<i32> for SubPriority {
    type Error = InvalidSubPriority;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubPriority> for i32 {
    fn from(value: SubPriority) -> Self {
        value.0
    }
}

impl fmt::Display for SubPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// UidRange
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("uid range start {start} is greater than stop {stop}")]
pub struct InvalidUidRange {
    pub start: u32,
    pub stop: u32,
}

#[derive(Deserialize)]
struct RawUidRange {
    start: u32,
    stop: u32,
}

/// Inclusive interval of UIDs. `start <= stop` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawUidRange")]
pub struct UidRange {
    start: u32,
    stop: u32,
}

impl UidRange {
    pub const fn new(start: u32, stop: u32) -> Result<Self, InvalidUidRange> {
        if start > stop {
            return Err(InvalidUidRange { start, stop });
        }
        Ok(Self { start, stop })
    }

    #[must_use]
    pub const fn single(uid: u32) -> Self {
        Self {
            start: uid,
            stop: uid,
        }
    }

    #[must_use]
    pub const fn start(self) -> u32 {
        self.start
    }

    #[must_use]
    pub const fn stop(self) -> u32 {
        self.stop
    }

    #[must_use]
    pub const fn contains(self, uid: u32) -> bool {
        self.start <= uid && uid <= self.stop
    }

    #[must_use]
    pub const fn overlaps(self, other: UidRange) -> bool {
        self.start <= other.stop && other.start <= self.stop
    }
}

impl TryFrom<RawUidRange> for UidRange {
    type Error = InvalidUidRange;

    fn try_from(raw: RawUidRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.stop)
    }
}

impl fmt::Display for UidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.stop)
    }
}

// ============================================================================
// UidRanges
// ============================================================================

/// Sorted collection of UID ranges. Duplicates are kept so that a later removal of one
/// registration leaves the other in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<UidRange>", into = "Vec<UidRange>")]
pub struct UidRanges(Vec<UidRange>);

impl UidRanges {
    #[must_use]
    pub fn new(ranges: impl IntoIterator<Item = UidRange>) -> Self {
        let mut ranges: Vec<UidRange> = ranges.into_iter().collect();
        ranges.sort_unstable();
        Self(ranges)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UidRange> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[UidRange] {
        &self.0
    }

    #[must_use]
    pub fn has_uid(&self, uid: u32) -> bool {
        self.0.iter().any(|range| range.contains(uid))
    }

    /// Whether any two ranges in this collection intersect.
    #[must_use]
    pub fn overlaps_self(&self) -> bool {
        self.0.windows(2).any(|pair| pair[0].overlaps(pair[1]))
    }

    pub fn add(&mut self, other: &UidRanges) {
        self.0.extend_from_slice(&other.0);
        self.0.sort_unstable();
    }

    /// Remove one occurrence of every range in `other`. Ranges that are not present are ignored.
    pub fn remove(&mut self, other: &UidRanges) {
        for range in &other.0 {
            if let Some(pos) = self.0.iter().position(|r| r == range) {
                self.0.remove(pos);
            }
        }
    }
}

impl From<Vec<UidRange>> for UidRanges {
    fn from(ranges: Vec<UidRange>) -> Self {
        Self::new(ranges)
    }
}

impl From<UidRanges> for Vec<UidRange> {
    fn from(ranges: UidRanges) -> Self {
        ranges.0
    }
}

impl FromIterator<UidRange> for UidRanges {
    fn from_iter<I: IntoIterator<Item = UidRange>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a UidRanges {
    type Item = &'a UidRange;
    type IntoIter = std::slice::Iter<'a, UidRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for UidRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, range) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{range}")?;
        }
        f.write_str("}")
    }
}

// ============================================================================
// UidRangeMap
// ============================================================================

/// Sub-priority → UID ranges. An entry is never present with an empty range set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UidRangeMap(BTreeMap<SubPriority, UidRanges>);

impl UidRangeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A map holding exactly one entry, as handed to per-rule collaborator calls.
    #[must_use]
    pub fn single(sub_priority: SubPriority, ranges: UidRanges) -> Self {
        let mut map = Self::new();
        map.add(sub_priority, &ranges);
        map
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn get(&self, sub_priority: SubPriority) -> Option<&UidRanges> {
        self.0.get(&sub_priority)
    }

    /// Entries in ascending sub-priority order (highest precedence first).
    pub fn iter(&self) -> impl Iterator<Item = (SubPriority, &UidRanges)> {
        self.0.iter().map(|(sub_priority, ranges)| (*sub_priority, ranges))
    }

    pub fn add(&mut self, sub_priority: SubPriority, ranges: &UidRanges) {
        if ranges.is_empty() {
            return;
        }
        self.0.entry(sub_priority).or_default().add(ranges);
    }

    pub fn remove(&mut self, sub_priority: SubPriority, ranges: &UidRanges) {
        let Some(existing) = self.0.get_mut(&sub_priority) else {
            return;
        };
        existing.remove(ranges);
        if existing.is_empty() {
            self.0.remove(&sub_priority);
        }
    }

    /// The highest-precedence sub-priority whose ranges contain `uid`.
    #[must_use]
    pub fn lookup(&self, uid: u32) -> Option<SubPriority> {
        self.0
            .iter()
            .find(|(_, ranges)| ranges.has_uid(uid))
            .map(|(sub_priority, _)| *sub_priority)
    }
}

impl fmt::Display for UidRangeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (sub_priority, ranges)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{sub_priority}: {ranges}")?;
        }
        f.write_str("]")
    }
}
