//! Identity types for pipeline graphs.
//!
//! Ids are `u32` newtypes that double as indices into the graph's stage and
//! hop vectors.

use std::fmt;

/// Index into `PipelineGraph::stages`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StageId(pub u32);

impl StageId {
    pub const INVALID: StageId = StageId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "StageId(INVALID)")
        } else {
            write!(f, "StageId({})", self.0)
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into `PipelineGraph::hops`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HopId(pub u32);

impl HopId {
    pub const INVALID: HopId = HopId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for HopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "HopId(INVALID)")
        } else {
            write!(f, "HopId({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id() {
        let id = StageId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!StageId::INVALID.is_valid());
        assert_eq!(format!("{}", StageId::INVALID), "StageId(INVALID)");
    }

    #[test]
    fn test_hop_id() {
        let id = HopId(5);
        assert!(id.is_valid());
        assert_eq!(format!("{:?}", id), "HopId(5)");
        assert!(!HopId::INVALID.is_valid());
    }
}
