//! Incremental enter/leave processing for one covered cell.
//!
//! Each walker is a resumable cursor over the cell's unit or feature list.
//! A call to [`ActiveCell::update`] advances every unfinished walker by at
//! most one relevant item, so the cost of a bubble sweeping over a crowded
//! cell is spread across several ticks.

use super::cell::{BubbleKind, Cell};
use super::{CellEvent, CellFeature, CellUnit};
use crate::battlefield::{ObjectId, UnitKind};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDirection {
    /// Deaggregate / show.
    Entering,
    /// Aggregate / hide.
    Leaving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Walker {
    direction: WalkDirection,
    cursor: usize,
    done: bool,
}

impl Walker {
    fn idle() -> Self {
        Self { direction: WalkDirection::Leaving, cursor: 0, done: true }
    }

    pub fn direction(&self) -> WalkDirection {
        self.direction
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn restart(&mut self, direction: WalkDirection) {
        self.direction = direction;
        self.cursor = 0;
        self.done = false;
    }

    fn rewind(&mut self) {
        if !self.done {
            self.cursor = 0;
        }
    }

    /// Visit the next item that `visit` reports as relevant. Returns true
    /// while items remain.
    fn step(&mut self, items: &[ObjectId], mut visit: impl FnMut(ObjectId, WalkDirection) -> bool) -> bool {
        if self.done {
            return false;
        }
        while self.cursor < items.len() {
            let item = items[self.cursor];
            self.cursor += 1;
            if visit(item, self.direction) {
                break;
            }
        }
        if self.cursor >= items.len() {
            self.done = true;
        }
        !self.done
    }
}

pub(crate) struct WalkContext<'a> {
    pub cell: &'a Cell,
    pub units: &'a mut HashMap<ObjectId, CellUnit>,
    pub features: &'a mut HashMap<ObjectId, CellFeature>,
    pub events: &'a mut Vec<CellEvent>,
}

/// Walker state for a cell that at least one bubble touches (or touched and
/// has not finished unwinding).
#[derive(Debug, Clone)]
pub struct ActiveCell {
    index: usize,
    air_units: Walker,
    mud_units: Walker,
    unit_visual: Walker,
    statics: Walker,
    static_visual: Walker,
}

impl ActiveCell {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            air_units: Walker::idle(),
            mud_units: Walker::idle(),
            unit_visual: Walker::idle(),
            statics: Walker::idle(),
            static_visual: Walker::idle(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn needs_update(&self) -> bool {
        [self.air_units, self.mud_units, self.unit_visual, self.statics, self.static_visual]
            .iter()
            .any(|w| !w.done)
    }

    pub fn walker(&self, kind: BubbleKind) -> Walker {
        match kind {
            BubbleKind::Air => self.air_units,
            BubbleKind::Mud => self.mud_units,
            BubbleKind::Visual => self.unit_visual,
        }
    }

    /// A bubble count crossed zero.
    pub(crate) fn on_bubble_change(&mut self, kind: BubbleKind, entering: bool) {
        let direction = if entering { WalkDirection::Entering } else { WalkDirection::Leaving };
        match kind {
            BubbleKind::Air => self.air_units.restart(direction),
            BubbleKind::Mud => {
                self.mud_units.restart(direction);
                self.statics.restart(direction);
            }
            BubbleKind::Visual => {
                self.unit_visual.restart(direction);
                self.static_visual.restart(direction);
            }
        }
    }

    /// The unit list changed under the walkers.
    pub(crate) fn rewind_units(&mut self) {
        self.air_units.rewind();
        self.mud_units.rewind();
        self.unit_visual.rewind();
    }

    pub(crate) fn rewind_features(&mut self) {
        self.statics.rewind();
        self.static_visual.rewind();
    }

    /// Advance every walker by one item. Returns true if work remains.
    pub(crate) fn update(&mut self, ctx: WalkContext<'_>) -> bool {
        let WalkContext { cell, units, features, events } = ctx;

        self.air_units.step(&cell.units, |id, dir| match units.get_mut(&id) {
            Some(unit) if unit.kind == UnitKind::Air => {
                unit.set_aggregated(dir == WalkDirection::Leaving, events);
                true
            }
            _ => false,
        });
        self.mud_units.step(&cell.units, |id, dir| match units.get_mut(&id) {
            Some(unit) if unit.kind == UnitKind::Ground => {
                unit.set_aggregated(dir == WalkDirection::Leaving, events);
                true
            }
            _ => false,
        });
        self.unit_visual.step(&cell.units, |id, dir| match units.get_mut(&id) {
            Some(unit) => {
                unit.set_visible(dir == WalkDirection::Entering, events);
                true
            }
            None => false,
        });
        self.statics.step(&cell.features, |id, dir| match features.get_mut(&id) {
            Some(feature) => {
                feature.set_active(dir == WalkDirection::Entering, events);
                true
            }
            None => false,
        });
        self.static_visual.step(&cell.features, |id, dir| match features.get_mut(&id) {
            Some(feature) => {
                feature.set_visible(dir == WalkDirection::Entering, events);
                true
            }
            None => false,
        });

        self.needs_update()
    }
}
