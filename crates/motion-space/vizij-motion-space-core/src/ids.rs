//! Identifiers and simple allocators for core entities.

use serde::{Deserialize, Serialize};

/// Handle of a clip owned by an [`AnimationSet`](crate::clip::AnimationSet).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub u32);

/// Handle of an animation space.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub u32);

/// Index of a node inside a match graph arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u32);

/// Index of an edge inside a match graph arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl NodeHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Monotonic allocator for ClipId and SpaceId.
/// Ids are never reused, so a stale ClipId held by a space cannot alias a newer clip.
#[derive(Default, Debug, Clone)]
pub struct IdAllocator {
    next_clip: u32,
    next_space: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_clip(&mut self) -> ClipId {
        let id = ClipId(self.next_clip);
        self.next_clip = self.next_clip.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_space(&mut self) -> SpaceId {
        let id = SpaceId(self.next_space);
        self.next_space = self.next_space.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_clip(), ClipId(0));
        assert_eq!(alloc.alloc_clip(), ClipId(1));
        assert_eq!(alloc.alloc_space(), SpaceId(0));
        assert_eq!(alloc.alloc_space(), SpaceId(1));
        alloc.reset();
        assert_eq!(alloc.alloc_clip(), ClipId(0));
    }
}
