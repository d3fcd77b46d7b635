//! Spatial battlefield index with aggregation and visibility bubbles.
//!
//! Every unit is tracked in two quad-trees over the same integer grid:
//!
//! - the **motion index** (small leaves) follows the unit's exact grid
//!   point and answers proximity queries;
//! - the **dynamic index** (large leaves) is only re-bucketed once a unit
//!   has moved more than the hysteresis away from its last bucketed point.
//!   Aggregation and visibility are evaluated against these points.
//!
//! Human-controlled units carry an aggregation bubble (air or ground radius,
//! depending on the kind of the unit being covered). A unit's aggregation
//! count is the number of placed human units whose bubble covers it, itself
//! included when it is human. Units with a count of zero are aggregated;
//! `Deaggregate`/`Aggregate` events fire only on the 0/1 transitions.
//!
//! Nothing happens directly to simulated objects: every consequence is
//! queued as a [`BattlefieldEvent`] for the caller to drain.

pub mod global;
pub mod grid;
pub mod quadtree;

pub use global::{GlobalBattlefield, MessageSink, NetMessage, PeerId};
pub use grid::{GridPoint, GridTransform, GRID_EXTENT};
pub use quadtree::QuadTree;

use crate::error::{BattlefieldError, ConfigError};
use glam::DVec3;
use grid::{circles_overlap, in_circle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Identifier of a unit or static feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Selects which bubble radius applies to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Air,
    Ground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    Human,
    Agent,
}

/// Output of the battlefield, drained by the owner after each mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattlefieldEvent {
    /// The unit left every human bubble and may run a coarse model.
    Aggregate(ObjectId),
    /// The unit entered its first human bubble and needs full simulation.
    Deaggregate(ObjectId),
    ScheduleShow(ObjectId),
    ScheduleHide(ObjectId),
    /// `human`'s bubble started covering `unit`.
    BubbleEntered { human: ObjectId, unit: ObjectId },
    BubbleLeft { human: ObjectId, unit: ObjectId },
    /// A pending removal completed.
    Removed(ObjectId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BattlefieldConfig {
    /// Side of the square playable area, meters.
    pub world_size: f64,
    /// Extra border mapped into the grid on every side, meters.
    pub margin: f64,
    /// Aggregation radius for air units, meters.
    pub air_bubble: f64,
    /// Aggregation radius for ground units, meters.
    pub ground_bubble: f64,
    /// Movement below this distance does not re-bucket a unit, meters.
    pub hysteresis: f64,
    pub motion_capacity: usize,
    pub dynamic_capacity: usize,
    pub static_capacity: usize,
}

impl Default for BattlefieldConfig {
    fn default() -> Self {
        Self {
            world_size: 200_000.0,
            margin: 10_000.0,
            air_bubble: 40_000.0,
            ground_bubble: 10_000.0,
            hysteresis: 50.0,
            motion_capacity: 8,
            dynamic_capacity: 64,
            static_capacity: 64,
        }
    }
}

impl BattlefieldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.world_size > 0.0) || !(self.margin >= 0.0) {
            return Err(ConfigError::InvalidParameter("battlefield world size must be positive".to_string()));
        }
        if !(self.air_bubble >= 0.0) || !(self.ground_bubble >= 0.0) || !(self.hysteresis >= 0.0) {
            return Err(ConfigError::InvalidParameter(
                "battlefield bubble radii and hysteresis must be non-negative".to_string(),
            ));
        }
        if self.motion_capacity == 0 || self.dynamic_capacity == 0 || self.static_capacity == 0 {
            return Err(ConfigError::InvalidParameter("quad-tree capacities must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// The battlefield's view of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: ObjectId,
    pub kind: UnitKind,
    pub control: ControlMode,
    pub position: DVec3,
    /// Point in the motion index; follows every move.
    pub motion_point: GridPoint,
    /// Point in the dynamic index; moves with hysteresis.
    pub point: GridPoint,
    /// Number of human bubbles covering this unit.
    pub aggregation_count: u32,
    pub aggregated: bool,
    pub visible: bool,
}

impl UnitRecord {
    pub fn is_human(&self) -> bool {
        self.control == ControlMode::Human
    }

    pub fn is_placed(&self) -> bool {
        !self.point.is_null()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRecord {
    pub id: ObjectId,
    pub position: DVec3,
    pub point: GridPoint,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Camera {
    point: GridPoint,
    radius: u32,
}

/// Quad-tree battlefield.
#[derive(Debug, Clone)]
pub struct Battlefield {
    transform: GridTransform,
    air_bubble: u32,
    ground_bubble: u32,
    hysteresis: u32,
    units: HashMap<ObjectId, UnitRecord>,
    statics: HashMap<ObjectId, StaticRecord>,
    humans: BTreeSet<ObjectId>,
    motion_index: QuadTree<ObjectId>,
    dynamic_index: QuadTree<ObjectId>,
    static_index: QuadTree<ObjectId>,
    camera: Option<Camera>,
    pending_removals: Vec<ObjectId>,
    events: Vec<BattlefieldEvent>,
    next_id: u64,
}

impl Default for Battlefield {
    fn default() -> Self {
        Self::new(&BattlefieldConfig::default())
    }
}

impl Battlefield {
    pub fn new(config: &BattlefieldConfig) -> Self {
        let transform = GridTransform::new(config.world_size, config.margin);
        Self {
            air_bubble: transform.to_grid_distance(config.air_bubble),
            ground_bubble: transform.to_grid_distance(config.ground_bubble),
            hysteresis: transform.to_grid_distance(config.hysteresis),
            transform,
            units: HashMap::new(),
            statics: HashMap::new(),
            humans: BTreeSet::new(),
            motion_index: QuadTree::new(config.motion_capacity),
            dynamic_index: QuadTree::new(config.dynamic_capacity),
            static_index: QuadTree::new(config.static_capacity),
            camera: None,
            pending_removals: Vec::new(),
            events: Vec::new(),
            next_id: 1,
        }
    }

    pub fn transform(&self) -> &GridTransform {
        &self.transform
    }

    pub fn unit(&self, id: ObjectId) -> Option<&UnitRecord> {
        self.units.get(&id)
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitRecord> {
        self.units.values()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn static_feature(&self, id: ObjectId) -> Option<&StaticRecord> {
        self.statics.get(&id)
    }

    pub fn static_count(&self) -> usize {
        self.statics.len()
    }

    pub fn is_aggregated(&self, id: ObjectId) -> Option<bool> {
        self.units.get(&id).map(|u| u.aggregated)
    }

    pub fn has_pending_removals(&self) -> bool {
        !self.pending_removals.is_empty()
    }

    /// Take all events queued since the last drain, in emission order.
    pub fn drain_events(&mut self) -> Vec<BattlefieldEvent> {
        std::mem::take(&mut self.events)
    }

    fn allocate_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    fn bubble_radius(&self, kind: UnitKind) -> u32 {
        match kind {
            UnitKind::Air => self.air_bubble,
            UnitKind::Ground => self.ground_bubble,
        }
    }

    fn max_bubble(&self) -> u32 {
        self.air_bubble.max(self.ground_bubble)
    }

    /// Register a unit at the null point. It takes part in nothing until its
    /// first position update.
    pub fn add_unit(&mut self, kind: UnitKind, control: ControlMode) -> ObjectId {
        let id = self.allocate_id();
        self.register(id, kind, control);
        id
    }

    /// Register a unit under an externally assigned id.
    pub fn insert_unit(&mut self, id: ObjectId, kind: UnitKind, control: ControlMode) -> Result<(), BattlefieldError> {
        if self.units.contains_key(&id) || self.statics.contains_key(&id) {
            return Err(BattlefieldError::AlreadyPresent(id));
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.register(id, kind, control);
        Ok(())
    }

    fn register(&mut self, id: ObjectId, kind: UnitKind, control: ControlMode) {
        self.units.insert(
            id,
            UnitRecord {
                id,
                kind,
                control,
                position: DVec3::ZERO,
                motion_point: GridPoint::NULL,
                point: GridPoint::NULL,
                aggregation_count: 0,
                aggregated: true,
                visible: false,
            },
        );
        if control == ControlMode::Human {
            self.humans.insert(id);
        }
    }

    /// Add a unit and place it at `position` in one go.
    pub fn spawn_unit(&mut self, kind: UnitKind, control: ControlMode, position: DVec3) -> Result<ObjectId, BattlefieldError> {
        let id = self.add_unit(kind, control);
        self.set_unit_position(id, position)?;
        Ok(id)
    }

    /// Report a unit's new global position.
    pub fn set_unit_position(&mut self, id: ObjectId, position: DVec3) -> Result<(), BattlefieldError> {
        let unit = self.units.get_mut(&id).ok_or(BattlefieldError::NotFound(id))?;
        unit.position = position;
        let to = self.transform.global_to_grid(position);
        self.move_unit(id, to)
    }

    /// Hand a unit over between human and agent control.
    ///
    /// The unit stays where it is: only the bubble it carries appears or
    /// disappears, so coverage and visibility that do not change emit nothing.
    pub fn set_control_mode(&mut self, id: ObjectId, control: ControlMode) -> Result<(), BattlefieldError> {
        let unit = self.units.get_mut(&id).ok_or(BattlefieldError::NotFound(id))?;
        if unit.control == control {
            return Ok(());
        }
        unit.control = control;
        let (kind, point) = (unit.kind, unit.point);

        match control {
            ControlMode::Human => {
                self.humans.insert(id);
                self.sweep_bubble(id, point, true)?;
            }
            ControlMode::Agent => {
                self.sweep_bubble(id, point, false)?;
                self.humans.remove(&id);
            }
        }
        let own = self.covering_humans(id, kind, point).len() as u32;
        self.set_aggregation_count(id, own);
        Ok(())
    }

    /// Add (`gained`) or drop the bubble of human `id` sitting at `point`
    /// for every other unit it covers.
    fn sweep_bubble(&mut self, id: ObjectId, point: GridPoint, gained: bool) -> Result<(), BattlefieldError> {
        if point.is_null() {
            return Ok(());
        }
        let mut covered: Vec<ObjectId> = self
            .dynamic_index
            .query_circle(point, self.max_bubble())
            .into_iter()
            .map(|(other, _)| other)
            .filter(|&other| other != id)
            .collect();
        covered.sort_unstable();
        covered.dedup();

        for other in covered {
            let inside = match self.units.get(&other) {
                Some(u) => in_circle(u.point, point, self.bubble_radius(u.kind)),
                None => continue,
            };
            if !inside {
                continue;
            }
            if gained {
                self.events.push(BattlefieldEvent::BubbleEntered { human: id, unit: other });
                self.adjust_aggregation_count(other, 1)?;
            } else {
                self.events.push(BattlefieldEvent::BubbleLeft { human: id, unit: other });
                self.adjust_aggregation_count(other, -1)?;
            }
        }
        Ok(())
    }

    fn move_unit(&mut self, id: ObjectId, to: GridPoint) -> Result<(), BattlefieldError> {
        let unit = self.units.get(&id).ok_or(BattlefieldError::NotFound(id))?;
        let motion_from = unit.motion_point;
        let from = unit.point;

        if motion_from != to {
            if !motion_from.is_null() && !self.motion_index.remove(id, motion_from) {
                return Err(index_miss(id, "motion", motion_from));
            }
            if !to.is_null() {
                self.motion_index.insert(id, to);
            }
            if let Some(unit) = self.units.get_mut(&id) {
                unit.motion_point = to;
            }
        }

        let rebucket = if from.is_null() || to.is_null() { from != to } else { from.chebyshev(to) > self.hysteresis };
        if !rebucket {
            return Ok(());
        }

        if !from.is_null() && !self.dynamic_index.remove(id, from) {
            return Err(index_miss(id, "dynamic", from));
        }
        if !to.is_null() {
            self.dynamic_index.insert(id, to);
        }
        if let Some(unit) = self.units.get_mut(&id) {
            unit.point = to;
        }
        log::debug!("unit {id} re-bucketed {from} -> {to}");

        self.update_aggregation(id, from, to)?;
        self.update_unit_visibility(id);
        Ok(())
    }

    /// Humans whose bubble (sized for `kind`) covers `p`, with `id` assumed
    /// to sit at `p`.
    fn covering_humans(&self, id: ObjectId, kind: UnitKind, p: GridPoint) -> BTreeSet<ObjectId> {
        if p.is_null() {
            return BTreeSet::new();
        }
        let radius = self.bubble_radius(kind);
        self.humans
            .iter()
            .copied()
            .filter(|&h| {
                if h == id {
                    return true;
                }
                self.units.get(&h).map(|u| u.is_placed() && in_circle(u.point, p, radius)).unwrap_or(false)
            })
            .collect()
    }

    fn update_aggregation(&mut self, id: ObjectId, from: GridPoint, to: GridPoint) -> Result<(), BattlefieldError> {
        let (kind, human) = match self.units.get(&id) {
            Some(u) => (u.kind, u.is_human()),
            None => return Err(BattlefieldError::NotFound(id)),
        };

        // The moved unit's own membership: recomputed from scratch.
        let before = self.covering_humans(id, kind, from);
        let after = self.covering_humans(id, kind, to);
        for &h in before.difference(&after).filter(|&&h| h != id) {
            self.events.push(BattlefieldEvent::BubbleLeft { human: h, unit: id });
        }
        for &h in after.difference(&before).filter(|&&h| h != id) {
            self.events.push(BattlefieldEvent::BubbleEntered { human: h, unit: id });
        }
        self.set_aggregation_count(id, after.len() as u32);

        if !human {
            return Ok(());
        }

        // A human moved: adjust everyone its bubble swept over.
        for other in self.bubble_candidates(from, to) {
            if other == id {
                continue;
            }
            let (point, radius) = match self.units.get(&other) {
                Some(u) => (u.point, self.bubble_radius(u.kind)),
                None => continue,
            };
            let was = !from.is_null() && in_circle(point, from, radius);
            let is = !to.is_null() && in_circle(point, to, radius);
            match (was, is) {
                (false, true) => {
                    self.events.push(BattlefieldEvent::BubbleEntered { human: id, unit: other });
                    self.adjust_aggregation_count(other, 1)?;
                }
                (true, false) => {
                    self.events.push(BattlefieldEvent::BubbleLeft { human: id, unit: other });
                    self.adjust_aggregation_count(other, -1)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Units in the dynamic index that may lie in the bubble at `from` or at
    /// `to`. Overlapping regions are fetched with a single query.
    fn bubble_candidates(&self, from: GridPoint, to: GridPoint) -> Vec<ObjectId> {
        let r = self.max_bubble();
        let mut found = match (from.is_null(), to.is_null()) {
            (true, true) => Vec::new(),
            (false, true) => self.dynamic_index.query_circle(from, r),
            (true, false) => self.dynamic_index.query_circle(to, r),
            (false, false) if circles_overlap(from, r, to, r) => {
                let (min, max) = union_bounds(from, r, to, r);
                self.dynamic_index.query_rect(min, max)
            }
            (false, false) => {
                let mut both = self.dynamic_index.query_circle(from, r);
                both.extend(self.dynamic_index.query_circle(to, r));
                both
            }
        };
        found.sort_unstable_by_key(|(id, _)| *id);
        found.dedup_by_key(|(id, _)| *id);
        found.into_iter().map(|(id, _)| id).collect()
    }

    fn set_aggregation_count(&mut self, id: ObjectId, count: u32) {
        let Some(unit) = self.units.get_mut(&id) else {
            return;
        };
        let old = unit.aggregation_count;
        unit.aggregation_count = count;
        if old == 0 && count > 0 {
            unit.aggregated = false;
            log::debug!("unit {id} deaggregated");
            self.events.push(BattlefieldEvent::Deaggregate(id));
        } else if old > 0 && count == 0 {
            unit.aggregated = true;
            log::debug!("unit {id} aggregated");
            self.events.push(BattlefieldEvent::Aggregate(id));
        }
    }

    fn adjust_aggregation_count(&mut self, id: ObjectId, delta: i32) -> Result<(), BattlefieldError> {
        let current = self.units.get(&id).map(|u| u.aggregation_count).ok_or(BattlefieldError::NotFound(id))?;
        if delta < 0 && current == 0 {
            let err = BattlefieldError::InvariantViolation(format!("aggregation count of unit {id} would drop below zero"));
            log::error!("{err}");
            return Err(err);
        }
        self.set_aggregation_count(id, current.saturating_add_signed(delta));
        Ok(())
    }

    fn camera_covers(&self, p: GridPoint) -> bool {
        match self.camera {
            Some(cam) => !p.is_null() && in_circle(p, cam.point, cam.radius),
            None => false,
        }
    }

    fn update_unit_visibility(&mut self, id: ObjectId) {
        let Some(point) = self.units.get(&id).map(|u| u.point) else {
            return;
        };
        let visible = self.camera_covers(point);
        if let Some(unit) = self.units.get_mut(&id) {
            if unit.visible != visible {
                unit.visible = visible;
                self.events.push(if visible {
                    BattlefieldEvent::ScheduleShow(id)
                } else {
                    BattlefieldEvent::ScheduleHide(id)
                });
            }
        }
    }

    fn update_static_visibility(&mut self, id: ObjectId) {
        let Some(point) = self.statics.get(&id).map(|s| s.point) else {
            return;
        };
        let visible = self.camera_covers(point);
        if let Some(feature) = self.statics.get_mut(&id) {
            if feature.visible != visible {
                feature.visible = visible;
                self.events.push(if visible {
                    BattlefieldEvent::ScheduleShow(id)
                } else {
                    BattlefieldEvent::ScheduleHide(id)
                });
            }
        }
    }

    /// Move the visibility bubble. Everything in the old or new region is
    /// re-evaluated; everything else cannot have changed.
    pub fn set_camera(&mut self, position: DVec3, radius: f64) {
        let new = Camera { point: self.transform.global_to_grid(position), radius: self.transform.to_grid_distance(radius) };
        let old = self.camera.replace(new);

        let query = |index: &QuadTree<ObjectId>| -> Vec<ObjectId> {
            let mut found = match old {
                None => index.query_circle(new.point, new.radius),
                Some(old) if circles_overlap(old.point, old.radius, new.point, new.radius) => {
                    let (min, max) = union_bounds(old.point, old.radius, new.point, new.radius);
                    index.query_rect(min, max)
                }
                Some(old) => {
                    let mut both = index.query_circle(old.point, old.radius);
                    both.extend(index.query_circle(new.point, new.radius));
                    both
                }
            };
            found.sort_unstable_by_key(|(id, _)| *id);
            found.dedup_by_key(|(id, _)| *id);
            found.into_iter().map(|(id, _)| id).collect()
        };
        let units = query(&self.dynamic_index);
        let statics = query(&self.static_index);

        for id in units {
            self.update_unit_visibility(id);
        }
        for id in statics {
            self.update_static_visibility(id);
        }
    }

    /// Remove the visibility bubble; everything visible gets hidden.
    pub fn clear_camera(&mut self) {
        self.camera = None;
        let mut units: Vec<ObjectId> = self.units.values().filter(|u| u.visible).map(|u| u.id).collect();
        let mut statics: Vec<ObjectId> = self.statics.values().filter(|s| s.visible).map(|s| s.id).collect();
        units.sort_unstable();
        statics.sort_unstable();
        for id in units {
            self.update_unit_visibility(id);
        }
        for id in statics {
            self.update_static_visibility(id);
        }
    }

    /// Add an immovable feature (building, bridge, ...).
    pub fn add_static(&mut self, position: DVec3) -> ObjectId {
        let id = self.allocate_id();
        let point = self.transform.global_to_grid(position);
        self.statics.insert(id, StaticRecord { id, position, point, visible: false });
        self.static_index.insert(id, point);
        self.update_static_visibility(id);
        id
    }

    pub fn remove_static(&mut self, id: ObjectId) -> Result<(), BattlefieldError> {
        let feature = self.statics.remove(&id).ok_or(BattlefieldError::NotFound(id))?;
        if !feature.point.is_null() && !self.static_index.remove(id, feature.point) {
            return Err(index_miss(id, "static", feature.point));
        }
        if feature.visible {
            self.events.push(BattlefieldEvent::ScheduleHide(id));
        }
        Ok(())
    }

    /// Queue a unit for removal at the next [`Battlefield::update`].
    pub fn remove_unit(&mut self, id: ObjectId) -> Result<(), BattlefieldError> {
        if !self.units.contains_key(&id) {
            return Err(BattlefieldError::NotFound(id));
        }
        if !self.pending_removals.contains(&id) {
            self.pending_removals.push(id);
        }
        Ok(())
    }

    /// Complete pending removals.
    ///
    /// Each unit is first moved to the null point, which unwinds its bubbles
    /// and visibility through the normal motion path, then erased.
    ///
    /// If a removal fails, it and every removal queued after it stay
    /// pending.
    pub fn update(&mut self) -> Result<(), BattlefieldError> {
        let pending = std::mem::take(&mut self.pending_removals);
        for (i, &id) in pending.iter().enumerate() {
            if !self.units.contains_key(&id) {
                continue;
            }
            if let Err(err) = self.move_unit(id, GridPoint::NULL) {
                self.pending_removals.splice(0..0, pending[i..].iter().copied());
                return Err(err);
            }
            self.units.remove(&id);
            self.humans.remove(&id);
            self.events.push(BattlefieldEvent::Removed(id));
            log::debug!("unit {id} removed");
        }
        Ok(())
    }

    /// Units within `radius` meters of `position`, by motion-index point.
    pub fn units_in_radius(&self, position: DVec3, radius: f64) -> Vec<ObjectId> {
        let center = self.transform.global_to_grid(position);
        let r = self.transform.to_grid_distance(radius);
        let mut ids: Vec<ObjectId> = self.motion_index.query_circle(center, r).into_iter().map(|(id, _)| id).collect();
        ids.sort_unstable();
        ids
    }

    /// Recount every unit's bubble membership from scratch and compare with
    /// the incrementally maintained counts.
    pub fn check_consistency(&self) -> Result<(), BattlefieldError> {
        for unit in self.units.values() {
            let expected = self.covering_humans(unit.id, unit.kind, unit.point).len() as u32;
            if expected != unit.aggregation_count {
                return Err(BattlefieldError::InvariantViolation(format!(
                    "unit {} has aggregation count {} but {} bubbles cover it",
                    unit.id, unit.aggregation_count, expected
                )));
            }
            if unit.aggregated != (unit.aggregation_count == 0) {
                return Err(BattlefieldError::InvariantViolation(format!(
                    "unit {} aggregated flag disagrees with its count",
                    unit.id
                )));
            }
        }
        Ok(())
    }
}

fn index_miss(id: ObjectId, index: &str, point: GridPoint) -> BattlefieldError {
    let err = BattlefieldError::InvariantViolation(format!("unit {id} not found in the {index} index at {point}"));
    log::error!("{err}");
    err
}

/// Bounding box of two circles, clamped to the grid.
fn union_bounds(a: GridPoint, ra: u32, b: GridPoint, rb: u32) -> (GridPoint, GridPoint) {
    let min = GridPoint::new(a.x.saturating_sub(ra).min(b.x.saturating_sub(rb)), a.y.saturating_sub(ra).min(b.y.saturating_sub(rb)));
    let max = GridPoint::new(
        a.x.saturating_add(ra).max(b.x.saturating_add(rb)),
        a.y.saturating_add(ra).max(b.y.saturating_add(rb)),
    );
    (min, max)
}
