//! Server-side battlefield shared by several network peers.
//!
//! Peers own units and report their motion. Whenever one of a peer's human
//! units brings another unit into its bubble, that peer becomes interested
//! in the unit: it is told to create a proxy (`CommandAddUnit`) and the
//! unit's owner is told to start streaming updates to it
//! (`CommandUpdatePeer`). Interest is reference counted per (peer, unit) so
//! several overlapping bubbles of the same peer produce a single add.
//!
//! Message encoding and transport belong to the caller; this module only
//! produces [`NetMessage`] values through a [`MessageSink`].

use super::{Battlefield, BattlefieldConfig, BattlefieldEvent, ControlMode, ObjectId, UnitKind};
use crate::error::BattlefieldError;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetMessage {
    /// Client to server: a new unit owned by the sender.
    RegisterUnit { unit: ObjectId, kind: UnitKind, control: ControlMode, position: DVec3 },
    /// Client to server: the sender's unit moved.
    NotifyUnitMotion { unit: ObjectId, position: DVec3 },
    /// Server to client: create a proxy for a remote unit.
    CommandAddUnit { unit: ObjectId, kind: UnitKind, owner: Option<PeerId>, position: DVec3 },
    /// Either direction: the unit is gone (or no longer of interest).
    CommandRemoveUnit { unit: ObjectId },
    /// Server to owner: start (`add`) or stop sending `unit` updates to `peer`.
    CommandUpdatePeer { unit: ObjectId, peer: PeerId, add: bool },
}

/// Outgoing message queue.
pub trait MessageSink {
    fn send(&mut self, peer: PeerId, message: NetMessage);
}

impl MessageSink for Vec<(PeerId, NetMessage)> {
    fn send(&mut self, peer: PeerId, message: NetMessage) {
        self.push((peer, message));
    }
}

#[derive(Debug, Clone)]
pub struct GlobalBattlefield {
    battlefield: Battlefield,
    owners: HashMap<ObjectId, PeerId>,
    units_by_peer: BTreeMap<PeerId, BTreeSet<ObjectId>>,
    /// Number of the peer's human bubbles covering the unit.
    interest: BTreeMap<(PeerId, ObjectId), u32>,
}

impl GlobalBattlefield {
    pub fn new(config: &BattlefieldConfig) -> Self {
        Self {
            battlefield: Battlefield::new(config),
            owners: HashMap::new(),
            units_by_peer: BTreeMap::new(),
            interest: BTreeMap::new(),
        }
    }

    pub fn battlefield(&self) -> &Battlefield {
        &self.battlefield
    }

    pub fn owner(&self, unit: ObjectId) -> Option<PeerId> {
        self.owners.get(&unit).copied()
    }

    pub fn peer_units(&self, peer: PeerId) -> impl Iterator<Item = ObjectId> + '_ {
        self.units_by_peer.get(&peer).into_iter().flatten().copied()
    }

    /// Whether `peer` currently holds a proxy for `unit`.
    pub fn is_interested(&self, peer: PeerId, unit: ObjectId) -> bool {
        self.interest.contains_key(&(peer, unit))
    }

    /// Add a unit simulated by the server itself.
    pub fn add_local_unit(
        &mut self,
        kind: UnitKind,
        control: ControlMode,
        position: DVec3,
        sink: &mut impl MessageSink,
    ) -> Result<(ObjectId, Vec<BattlefieldEvent>), BattlefieldError> {
        let id = self.battlefield.spawn_unit(kind, control, position)?;
        let events = self.dispatch_events(sink);
        Ok((id, events))
    }

    /// Move a server-owned unit.
    pub fn move_local_unit(
        &mut self,
        unit: ObjectId,
        position: DVec3,
        sink: &mut impl MessageSink,
    ) -> Result<Vec<BattlefieldEvent>, BattlefieldError> {
        if let Some(&owner) = self.owners.get(&unit) {
            return Err(BattlefieldError::NotOwner { unit, peer: owner });
        }
        self.battlefield.set_unit_position(unit, position)?;
        Ok(self.dispatch_events(sink))
    }

    /// Process one message received from `peer`.
    ///
    /// Returns the battlefield events it produced so the caller can apply
    /// aggregation and visibility changes locally as well.
    pub fn handle_message(
        &mut self,
        peer: PeerId,
        message: NetMessage,
        sink: &mut impl MessageSink,
    ) -> Result<Vec<BattlefieldEvent>, BattlefieldError> {
        match message {
            NetMessage::RegisterUnit { unit, kind, control, position } => {
                self.battlefield.insert_unit(unit, kind, control)?;
                self.owners.insert(unit, peer);
                self.units_by_peer.entry(peer).or_default().insert(unit);
                log::info!("{peer} registered unit {unit} ({kind:?}, {control:?})");
                self.battlefield.set_unit_position(unit, position)?;
            }
            NetMessage::NotifyUnitMotion { unit, position } => {
                self.check_owner(peer, unit)?;
                self.battlefield.set_unit_position(unit, position)?;
            }
            NetMessage::CommandRemoveUnit { unit } => {
                self.check_owner(peer, unit)?;
                self.battlefield.remove_unit(unit)?;
            }
            other => {
                log::warn!("ignoring server-bound {other:?} from {peer}");
            }
        }
        Ok(self.dispatch_events(sink))
    }

    /// Peers are connected from their first registration until `disconnect`.
    fn is_connected(&self, peer: PeerId) -> bool {
        self.units_by_peer.contains_key(&peer)
    }

    fn check_owner(&self, peer: PeerId, unit: ObjectId) -> Result<(), BattlefieldError> {
        match self.owners.get(&unit) {
            Some(&owner) if owner == peer => Ok(()),
            Some(_) => Err(BattlefieldError::NotOwner { unit, peer }),
            None if self.battlefield.unit(unit).is_some() => Err(BattlefieldError::NotOwner { unit, peer }),
            None => Err(BattlefieldError::NotFound(unit)),
        }
    }

    /// Complete pending removals.
    pub fn update(&mut self, sink: &mut impl MessageSink) -> Result<Vec<BattlefieldEvent>, BattlefieldError> {
        self.battlefield.update()?;
        Ok(self.dispatch_events(sink))
    }

    /// Drop a peer: its units are removed and its proxies forgotten.
    pub fn disconnect(&mut self, peer: PeerId, sink: &mut impl MessageSink) -> Result<Vec<BattlefieldEvent>, BattlefieldError> {
        let units = self.units_by_peer.remove(&peer).unwrap_or_default();
        log::info!("{peer} disconnected, removing {} units", units.len());
        for &unit in &units {
            self.battlefield.remove_unit(unit)?;
        }
        self.interest.retain(|&(p, _), _| p != peer);
        self.battlefield.update()?;
        let events = self.dispatch_events(sink);
        for unit in units {
            self.owners.remove(&unit);
        }
        Ok(events)
    }

    /// Translate bubble events into peer interest changes.
    fn dispatch_events(&mut self, sink: &mut impl MessageSink) -> Vec<BattlefieldEvent> {
        let events = self.battlefield.drain_events();
        for event in &events {
            match *event {
                BattlefieldEvent::BubbleEntered { human, unit } => self.add_interest(human, unit, sink),
                BattlefieldEvent::BubbleLeft { human, unit } => self.remove_interest(human, unit, sink),
                BattlefieldEvent::Removed(unit) => self.forget_unit(unit, sink),
                _ => {}
            }
        }
        events
    }

    fn add_interest(&mut self, human: ObjectId, unit: ObjectId, sink: &mut impl MessageSink) {
        let Some(&viewer) = self.owners.get(&human) else {
            return;
        };
        let owner = self.owners.get(&unit).copied();
        if owner == Some(viewer) {
            return;
        }
        let count = self.interest.entry((viewer, unit)).or_insert(0);
        *count += 1;
        if *count == 1 {
            let (kind, position) = match self.battlefield.unit(unit) {
                Some(u) => (u.kind, u.position),
                None => return,
            };
            sink.send(viewer, NetMessage::CommandAddUnit { unit, kind, owner, position });
            if let Some(owner) = owner.filter(|o| self.is_connected(*o)) {
                sink.send(owner, NetMessage::CommandUpdatePeer { unit, peer: viewer, add: true });
            }
        }
    }

    fn remove_interest(&mut self, human: ObjectId, unit: ObjectId, sink: &mut impl MessageSink) {
        let Some(&viewer) = self.owners.get(&human) else {
            return;
        };
        let Some(count) = self.interest.get_mut(&(viewer, unit)) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.interest.remove(&(viewer, unit));
            sink.send(viewer, NetMessage::CommandRemoveUnit { unit });
            if let Some(owner) = self.owners.get(&unit).copied().filter(|o| self.is_connected(*o)) {
                sink.send(owner, NetMessage::CommandUpdatePeer { unit, peer: viewer, add: false });
            }
        }
    }

    fn forget_unit(&mut self, unit: ObjectId, sink: &mut impl MessageSink) {
        let stale: Vec<PeerId> = self.interest.keys().filter(|(_, u)| *u == unit).map(|(p, _)| *p).collect();
        for peer in stale {
            self.interest.remove(&(peer, unit));
            sink.send(peer, NetMessage::CommandRemoveUnit { unit });
        }
        if let Some(owner) = self.owners.remove(&unit) {
            if let Some(units) = self.units_by_peer.get_mut(&owner) {
                units.remove(&unit);
            }
        }
    }
}
