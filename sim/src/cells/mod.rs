//! Array-grid battlefield with amortized bubble processing.
//!
//! The world is cut into a fixed `size_x * size_y` grid of square cells.
//! Three bubble types are reference counted per cell:
//!
//! - **air**, carried by human air units, deaggregates air units;
//! - **mud**, carried by human ground units, deaggregates ground units and
//!   activates static feature groups;
//! - **visual**, carried by the camera, shows units and feature groups.
//!
//! A cell touched by any bubble gets an [`ActiveCell`] whose walkers apply
//! the resulting enter/leave transitions a few items at a time. Callers
//! drive the walkers with [`VirtualBattlefield::update`] under an
//! [`UpdateBudget`]; work that does not fit carries over to the next call.

pub mod active_cell;
pub mod cell;

pub use active_cell::{ActiveCell, WalkDirection, Walker};
pub use cell::{BubbleKind, Cell};

use crate::battlefield::{ControlMode, ObjectId, UnitKind};
use crate::error::{BattlefieldError, ConfigError};
use active_cell::WalkContext;
use glam::DVec3;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CellGridConfig {
    pub size_x: usize,
    pub size_y: usize,
    /// Side of one cell, meters.
    pub cell_size: f64,
    /// Bubble radii, in cells.
    pub air_range: u32,
    pub mud_range: u32,
    pub vis_range: u32,
}

impl Default for CellGridConfig {
    fn default() -> Self {
        Self { size_x: 64, size_y: 64, cell_size: 2000.0, air_range: 3, mud_range: 1, vis_range: 2 }
    }
}

impl CellGridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size_x == 0 || self.size_y == 0 {
            return Err(ConfigError::InvalidParameter("cell grid dimensions must be non-zero".to_string()));
        }
        if !(self.cell_size > 0.0) {
            return Err(ConfigError::InvalidParameter("cell size must be positive".to_string()));
        }
        Ok(())
    }

    fn range(&self, kind: BubbleKind) -> u32 {
        match kind {
            BubbleKind::Air => self.air_range,
            BubbleKind::Mud => self.mud_range,
            BubbleKind::Visual => self.vis_range,
        }
    }
}

/// Output of the cell grid, drained by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellEvent {
    Aggregate(ObjectId),
    Deaggregate(ObjectId),
    EnterScene(ObjectId),
    LeaveScene(ObjectId),
    FeatureActivated(ObjectId),
    FeatureDeactivated(ObjectId),
    FeatureShown(ObjectId),
    FeatureHidden(ObjectId),
    /// The cell entered the visual bubble; its terrain features should load.
    AddFeatureCell(usize),
    RemoveFeatureCell(usize),
}

/// Limit on the work done by one [`VirtualBattlefield::update`] call. At
/// least one active cell is always advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateBudget {
    Time(Duration),
    Cells(usize),
}

impl UpdateBudget {
    pub fn from_millis(ms: f64) -> Self {
        UpdateBudget::Time(Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX))
    }

    fn exhausted(&self, start: Instant, processed: usize) -> bool {
        if processed == 0 {
            return false;
        }
        match *self {
            UpdateBudget::Time(limit) => start.elapsed() >= limit,
            UpdateBudget::Cells(limit) => processed >= limit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Active cells advanced in this call.
    pub processed: usize,
    /// Active cells that still have walker work queued.
    pub pending: usize,
    /// Active cells destroyed in this call.
    pub destroyed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellUnit {
    pub id: ObjectId,
    pub kind: UnitKind,
    pub control: ControlMode,
    pub position: DVec3,
    pub cell: Option<usize>,
    pub aggregated: bool,
    pub visible: bool,
}

impl CellUnit {
    fn bubble(&self) -> Option<BubbleKind> {
        match (self.control, self.kind) {
            (ControlMode::Human, UnitKind::Air) => Some(BubbleKind::Air),
            (ControlMode::Human, UnitKind::Ground) => Some(BubbleKind::Mud),
            (ControlMode::Agent, _) => None,
        }
    }

    /// Bubble type that deaggregates this unit.
    fn covered_by(&self) -> BubbleKind {
        match self.kind {
            UnitKind::Air => BubbleKind::Air,
            UnitKind::Ground => BubbleKind::Mud,
        }
    }

    pub(crate) fn set_aggregated(&mut self, aggregated: bool, events: &mut Vec<CellEvent>) {
        if self.aggregated == aggregated {
            return;
        }
        self.aggregated = aggregated;
        events.push(if aggregated { CellEvent::Aggregate(self.id) } else { CellEvent::Deaggregate(self.id) });
    }

    pub(crate) fn set_visible(&mut self, visible: bool, events: &mut Vec<CellEvent>) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        events.push(if visible { CellEvent::EnterScene(self.id) } else { CellEvent::LeaveScene(self.id) });
    }
}

/// A static feature group (buildings, runway furniture, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct CellFeature {
    pub id: ObjectId,
    pub position: DVec3,
    pub cell: usize,
    pub active: bool,
    pub visible: bool,
}

impl CellFeature {
    pub(crate) fn set_active(&mut self, active: bool, events: &mut Vec<CellEvent>) {
        if self.active == active {
            return;
        }
        self.active = active;
        events.push(if active { CellEvent::FeatureActivated(self.id) } else { CellEvent::FeatureDeactivated(self.id) });
    }

    pub(crate) fn set_visible(&mut self, visible: bool, events: &mut Vec<CellEvent>) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        events.push(if visible { CellEvent::FeatureShown(self.id) } else { CellEvent::FeatureHidden(self.id) });
    }
}

pub struct VirtualBattlefield {
    config: CellGridConfig,
    cells: Vec<Cell>,
    active: BTreeMap<usize, ActiveCell>,
    /// Last active cell advanced; the next update resumes after it.
    cursor: Option<usize>,
    units: HashMap<ObjectId, CellUnit>,
    features: HashMap<ObjectId, CellFeature>,
    camera: Option<usize>,
    events: Vec<CellEvent>,
    next_id: u64,
}

impl Default for VirtualBattlefield {
    fn default() -> Self {
        Self::with_valid_config(&CellGridConfig::default())
    }
}

impl VirtualBattlefield {
    pub fn new(config: &CellGridConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: &CellGridConfig) -> Self {
        Self {
            config: config.clone(),
            cells: vec![Cell::default(); config.size_x * config.size_y],
            active: BTreeMap::new(),
            cursor: None,
            units: HashMap::new(),
            features: HashMap::new(),
            camera: None,
            events: Vec::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &CellGridConfig {
        &self.config
    }

    /// Cell containing `position`. Positions beyond the grid clamp to the
    /// border cells.
    pub fn cell_index(&self, position: DVec3) -> usize {
        let axis = |v: f64, size: usize| -> usize {
            let i = (v / self.config.cell_size).floor() + (size / 2) as f64;
            i.clamp(0.0, (size - 1) as f64) as usize
        };
        let ix = axis(position.x, self.config.size_x);
        let iy = axis(position.y, self.config.size_y);
        iy * self.config.size_x + ix
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn active_cell(&self, index: usize) -> Option<&ActiveCell> {
        self.active.get(&index)
    }

    pub fn active_cell_count(&self) -> usize {
        self.active.len()
    }

    pub fn needs_update(&self) -> bool {
        self.active.values().any(ActiveCell::needs_update)
    }

    pub fn unit(&self, id: ObjectId) -> Option<&CellUnit> {
        self.units.get(&id)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn feature(&self, id: ObjectId) -> Option<&CellFeature> {
        self.features.get(&id)
    }

    pub fn drain_events(&mut self) -> Vec<CellEvent> {
        std::mem::take(&mut self.events)
    }

    fn allocate_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_unit(&mut self, kind: UnitKind, control: ControlMode, position: DVec3) -> Result<ObjectId, BattlefieldError> {
        let id = self.allocate_id();
        self.units.insert(
            id,
            CellUnit { id, kind, control, position, cell: None, aggregated: true, visible: false },
        );
        let index = self.cell_index(position);
        self.relocate_unit(id, Some(index))?;
        Ok(id)
    }

    pub fn move_unit(&mut self, id: ObjectId, position: DVec3) -> Result<(), BattlefieldError> {
        let index = self.cell_index(position);
        let unit = self.units.get_mut(&id).ok_or(BattlefieldError::NotFound(id))?;
        unit.position = position;
        if unit.cell == Some(index) {
            return Ok(());
        }
        self.relocate_unit(id, Some(index))
    }

    pub fn remove_unit(&mut self, id: ObjectId) -> Result<(), BattlefieldError> {
        self.relocate_unit(id, None)?;
        self.units.remove(&id);
        Ok(())
    }

    pub fn set_control_mode(&mut self, id: ObjectId, control: ControlMode) -> Result<(), BattlefieldError> {
        let unit = self.units.get(&id).ok_or(BattlefieldError::NotFound(id))?;
        if unit.control == control {
            return Ok(());
        }
        let (cell, covering, old_bubble) = (unit.cell, unit.covered_by(), unit.bubble());
        if let Some(unit) = self.units.get_mut(&id) {
            unit.control = control;
        }
        let new_bubble = self.units.get(&id).and_then(CellUnit::bubble);

        // The unit stays in its cell; only the bubble it carries changes.
        if let Some(kind) = old_bubble {
            self.update_bubble(cell, None, self.config.range(kind), kind)?;
        }
        if let Some(kind) = new_bubble {
            self.update_bubble(None, cell, self.config.range(kind), kind)?;
        }
        let aggregated = cell.map_or(true, |index| self.cells[index].count(covering) == 0);
        if let Some(unit) = self.units.get_mut(&id) {
            unit.set_aggregated(aggregated, &mut self.events);
        }
        Ok(())
    }

    /// Move a unit between cell lists, carrying its bubble along and
    /// applying the state of the destination cell at once.
    fn relocate_unit(&mut self, id: ObjectId, to: Option<usize>) -> Result<(), BattlefieldError> {
        let unit = self.units.get(&id).ok_or(BattlefieldError::NotFound(id))?;
        let from = unit.cell;
        let bubble = unit.bubble();
        let covering = unit.covered_by();
        if from == to {
            return Ok(());
        }

        if let Some(old) = from {
            self.cells[old].remove_unit(id);
            if let Some(active) = self.active.get_mut(&old) {
                active.rewind_units();
            }
        }
        if let Some(new) = to {
            self.cells[new].units.push(id);
        }
        if let Some(kind) = bubble {
            self.update_bubble(from, to, self.config.range(kind), kind)?;
        }

        let (aggregated, visible) = match to {
            Some(new) => {
                let cell = &self.cells[new];
                (cell.count(covering) == 0, cell.count(BubbleKind::Visual) > 0)
            }
            None => (true, false),
        };
        if let Some(unit) = self.units.get_mut(&id) {
            unit.cell = to;
            unit.set_aggregated(aggregated, &mut self.events);
            unit.set_visible(visible, &mut self.events);
        }
        Ok(())
    }

    pub fn add_feature_group(&mut self, position: DVec3) -> ObjectId {
        let id = self.allocate_id();
        let index = self.cell_index(position);
        let cell = &mut self.cells[index];
        cell.features.push(id);
        let mut feature = CellFeature { id, position, cell: index, active: false, visible: false };
        feature.set_active(cell.count(BubbleKind::Mud) > 0, &mut self.events);
        feature.set_visible(cell.count(BubbleKind::Visual) > 0, &mut self.events);
        self.features.insert(id, feature);
        id
    }

    pub fn remove_feature_group(&mut self, id: ObjectId) -> Result<(), BattlefieldError> {
        let mut feature = self.features.remove(&id).ok_or(BattlefieldError::NotFound(id))?;
        self.cells[feature.cell].remove_feature(id);
        if let Some(active) = self.active.get_mut(&feature.cell) {
            active.rewind_features();
        }
        feature.set_visible(false, &mut self.events);
        feature.set_active(false, &mut self.events);
        Ok(())
    }

    /// Move (or remove, with `None`) the camera's visual bubble.
    pub fn set_camera(&mut self, position: Option<DVec3>) -> Result<(), BattlefieldError> {
        let index = position.map(|p| self.cell_index(p));
        if index == self.camera {
            return Ok(());
        }
        let from = self.camera;
        self.camera = index;
        self.update_bubble(from, index, self.config.vis_range, BubbleKind::Visual)
    }

    /// Cells within `range` of `center`, as a set of indices.
    fn bubble_cells(&self, center: Option<usize>, range: u32) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        let Some(center) = center else {
            return out;
        };
        let (sx, sy) = (self.config.size_x as i64, self.config.size_y as i64);
        let (cx, cy) = ((center % self.config.size_x) as i64, (center / self.config.size_x) as i64);
        let r = range as i64;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if x >= 0 && x < sx && y >= 0 && y < sy {
                    out.insert((y * sx + x) as usize);
                }
            }
        }
        out
    }

    /// Apply the symmetric difference between the bubble around `from` and
    /// the bubble around `to`.
    fn update_bubble(
        &mut self,
        from: Option<usize>,
        to: Option<usize>,
        range: u32,
        kind: BubbleKind,
    ) -> Result<(), BattlefieldError> {
        let old = self.bubble_cells(from, range);
        let new = self.bubble_cells(to, range);
        for &index in old.difference(&new) {
            self.remove_bubble(index, kind)?;
        }
        for &index in new.difference(&old) {
            self.add_bubble(index, kind);
        }
        Ok(())
    }

    fn activate(&mut self, index: usize) -> &mut ActiveCell {
        let cell = &mut self.cells[index];
        self.active.entry(index).or_insert_with(|| {
            debug!("cell {index} activated");
            cell.active = true;
            ActiveCell::new(index)
        })
    }

    fn add_bubble(&mut self, index: usize, kind: BubbleKind) {
        if self.cells[index].add_bubble(kind) {
            self.activate(index).on_bubble_change(kind, true);
            if kind == BubbleKind::Visual {
                self.events.push(CellEvent::AddFeatureCell(index));
            }
        }
    }

    fn remove_bubble(&mut self, index: usize, kind: BubbleKind) -> Result<(), BattlefieldError> {
        match self.cells[index].remove_bubble(kind) {
            None => {
                let message = format!("{kind:?} bubble count of cell {index} would become negative");
                error!("{message}");
                Err(BattlefieldError::InvariantViolation(message))
            }
            Some(true) => {
                self.activate(index).on_bubble_change(kind, false);
                if kind == BubbleKind::Visual {
                    self.events.push(CellEvent::RemoveFeatureCell(index));
                }
                Ok(())
            }
            Some(false) => Ok(()),
        }
    }

    /// Advance active cells round-robin until `budget` runs out. Cells with
    /// no remaining work and no bubble coverage are destroyed.
    pub fn update(&mut self, budget: UpdateBudget) -> UpdateReport {
        let start = Instant::now();
        let mut report = UpdateReport::default();

        let order: Vec<usize> = match self.cursor {
            Some(cursor) => self
                .active
                .range((Bound::Excluded(cursor), Bound::Unbounded))
                .chain(self.active.range(..=cursor))
                .map(|(&index, _)| index)
                .collect(),
            None => self.active.keys().copied().collect(),
        };

        for index in order {
            if budget.exhausted(start, report.processed) {
                break;
            }
            let Some(active) = self.active.get_mut(&index) else {
                continue;
            };
            let more = active.update(WalkContext {
                cell: &self.cells[index],
                units: &mut self.units,
                features: &mut self.features,
                events: &mut self.events,
            });
            report.processed += 1;
            self.cursor = Some(index);

            if !more && !self.cells[index].is_covered() {
                self.active.remove(&index);
                self.cells[index].active = false;
                report.destroyed += 1;
                debug!("cell {index} deactivated");
            }
        }

        report.pending = self.active.values().filter(|a| a.needs_update()).count();
        report
    }
}
