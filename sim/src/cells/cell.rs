use crate::battlefield::ObjectId;
use serde::{Deserialize, Serialize};

/// The three independently counted bubble types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BubbleKind {
    /// Carried by human air units; deaggregates air units.
    Air,
    /// Carried by human ground units; deaggregates ground units and
    /// activates static features.
    Mud,
    /// Carried by the camera; shows units and features.
    Visual,
}

impl BubbleKind {
    pub const ALL: [BubbleKind; 3] = [BubbleKind::Air, BubbleKind::Mud, BubbleKind::Visual];

    pub(crate) fn index(self) -> usize {
        match self {
            BubbleKind::Air => 0,
            BubbleKind::Mud => 1,
            BubbleKind::Visual => 2,
        }
    }
}

/// One square of the fixed grid.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub(crate) units: Vec<ObjectId>,
    pub(crate) features: Vec<ObjectId>,
    counts: [u32; 3],
    pub(crate) active: bool,
}

impl Cell {
    pub fn units(&self) -> &[ObjectId] {
        &self.units
    }

    pub fn features(&self) -> &[ObjectId] {
        &self.features
    }

    pub fn count(&self, kind: BubbleKind) -> u32 {
        self.counts[kind.index()]
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether any bubble covers the cell.
    pub fn is_covered(&self) -> bool {
        self.counts.iter().any(|&c| c > 0)
    }

    /// Increment a bubble count; returns true on the 0 -> 1 transition.
    pub(crate) fn add_bubble(&mut self, kind: BubbleKind) -> bool {
        let count = &mut self.counts[kind.index()];
        *count += 1;
        *count == 1
    }

    /// Decrement a bubble count; returns `Some(true)` on the 1 -> 0
    /// transition and `None` if the count was already zero.
    pub(crate) fn remove_bubble(&mut self, kind: BubbleKind) -> Option<bool> {
        let count = &mut self.counts[kind.index()];
        if *count == 0 {
            return None;
        }
        *count -= 1;
        Some(*count == 0)
    }

    pub(crate) fn remove_unit(&mut self, id: ObjectId) -> bool {
        match self.units.iter().position(|&u| u == id) {
            Some(pos) => {
                self.units.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_feature(&mut self, id: ObjectId) -> bool {
        match self.features.iter().position(|&f| f == id) {
            Some(pos) => {
                self.features.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bubble_transitions() {
        let mut cell = Cell::default();
        assert!(!cell.is_covered());
        assert!(cell.add_bubble(BubbleKind::Air));
        assert!(!cell.add_bubble(BubbleKind::Air));
        assert!(cell.is_covered());
        assert_eq!(cell.remove_bubble(BubbleKind::Air), Some(false));
        assert_eq!(cell.remove_bubble(BubbleKind::Air), Some(true));
        assert_eq!(cell.remove_bubble(BubbleKind::Air), None);
        assert_eq!(cell.count(BubbleKind::Mud), 0);
    }

    #[test]
    fn test_unit_list_keeps_order() {
        let mut cell = Cell::default();
        cell.units.extend([ObjectId(1), ObjectId(2), ObjectId(3)]);
        assert!(cell.remove_unit(ObjectId(2)));
        assert!(!cell.remove_unit(ObjectId(2)));
        assert_eq!(cell.units(), &[ObjectId(1), ObjectId(3)]);
    }
}
