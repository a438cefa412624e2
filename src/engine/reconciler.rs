// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Entry points that keep the object graph consistent with the kernel and
//! the multipath library: per-device events and the list of all maps.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use itertools::Itertools;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::{
    engine::{
        graph::ObjectGraph,
        identity,
        projection::{project_block_multipath, project_drive_multipath},
        snapshot::{MpathRecord, MultipathLibrary, Snapshot},
        types::{BlockAction, BlockDevice, BlockEvent, DeviceRole, TreeAction},
    },
    mpath::{MpathError, MpathResult},
};

/// What the device that triggered an event is to a multipath map.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Trigger {
    /// The dm node exposing the map.
    MapNode,
    /// A SCSI path of the map.
    Member,
    /// The drive aggregating the map's paths.
    Drive,
}

impl Trigger {
    fn of(event: &BlockEvent) -> Trigger {
        match event.role {
            DeviceRole::Drive => Trigger::Drive,
            DeviceRole::Block if event.device.map_name().is_some() => Trigger::MapNode,
            DeviceRole::Block => Trigger::Member,
        }
    }

    /// Identity of the block or drive object that raised the event.
    fn object_path(self, device: &BlockDevice) -> String {
        match self {
            Trigger::Drive => identity::drive_object_path(device.drive_id()),
            Trigger::MapNode | Trigger::Member => identity::block_object_path(device.name()),
        }
    }
}

/// Owns the snapshot and the object graph. Every change to the graph is
/// forwarded, in order, on the action channel. Events the reconciler
/// synthesizes are sent to the loop-back channel, which feeds the same
/// receiver as kernel events.
pub struct Reconciler {
    snapshot: Snapshot,
    graph: ObjectGraph,
    /// Member paths seen for each drive object.
    drive_members: HashMap<String, BTreeSet<String>>,
    actions: UnboundedSender<TreeAction>,
    loopback: UnboundedSender<BlockEvent>,
}

impl Reconciler {
    pub fn new(
        snapshot: Snapshot,
        actions: UnboundedSender<TreeAction>,
        loopback: UnboundedSender<BlockEvent>,
    ) -> Reconciler {
        Reconciler {
            snapshot,
            graph: ObjectGraph::new(),
            drive_members: HashMap::new(),
            actions,
            loopback,
        }
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Wait for at least one event, then handle every event already queued.
    pub async fn process_block_events(
        &mut self,
        receiver: &mut UnboundedReceiver<BlockEvent>,
    ) -> MpathResult<()> {
        let mut events = Vec::new();
        events.push(receiver.recv().await.ok_or_else(|| {
            MpathError::Msg("Channel from udev thread to reconciler was shut".to_string())
        })?);

        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }

        for event in events {
            self.on_block_event(&event);
        }
        Ok(())
    }

    /// Reconcile the graph with one event. Never fails; every problem
    /// degrades the event to a no-op.
    pub fn on_block_event(&mut self, event: &BlockEvent) {
        self.reconcile(event);
        for action in self.graph.take_actions() {
            if self.actions.send(action).is_err() {
                warn!("Channel from reconciler to the bus adapter was shut; dropping tree actions");
                break;
            }
        }
    }

    fn reconcile(&mut self, event: &BlockEvent) {
        if let BlockAction::Unknown(action) = &event.action {
            warn!(
                "Ignoring unsupported action \"{}\" on block device {}",
                action,
                event.device.name()
            );
            return;
        }

        let name = match self.mpath_name(&event.device) {
            Some(name) => name,
            None => {
                trace!("{} does not belong to a multipath map", event.device.name());
                return;
            }
        };
        let trigger = Trigger::of(event);
        let object_path = trigger.object_path(&event.device);
        if trigger == Trigger::Drive && event.action != BlockAction::Remove {
            self.drive_members
                .entry(object_path.clone())
                .or_default()
                .insert(event.device.name().to_string());
        }

        if event.action == BlockAction::Add {
            if self.is_attached(trigger, &object_path) {
                debug!("Multipath attributes of {object_path} are already initialized; ignoring {event}");
                return;
            }
            if event.synthetic && self.graph.maps_named(&name).next().is_none() {
                debug!("Map {name} was retired before {event} was processed; dropping it");
                return;
            }
        } else if let Err(e) = self.snapshot.refresh() {
            warn!("Failed to refresh multipath snapshot for {event}: {e}; ignoring the event");
            return;
        }

        let record = self.snapshot.find_by_name(&name).cloned();

        if event.action == BlockAction::Remove {
            self.remove(trigger, &event.device, &object_path, &name, record.as_ref());
            return;
        }

        let record = match record {
            Some(record) => record,
            None => {
                if event.action.requires_refresh() {
                    let retired = self.graph.retire_maps_named(&name, None);
                    if retired > 0 {
                        info!("Map {name} is no longer known to the multipath library; retired {retired} map(s)");
                    }
                } else {
                    debug!("No multipath record named {name} for {event}; ignoring");
                }
                return;
            }
        };

        let (map_path, created) = match self.graph.upsert_map(&record) {
            Some(res) => res,
            None => {
                warn!(
                    "Multipath record \"{}\" with WWID \"{}\" can not be exported; ignoring {}",
                    record.name, record.wwid, event
                );
                return;
            }
        };
        // A map that changed WWID under the same name is a different map.
        self.graph.retire_maps_named(&name, Some(map_path.as_str()));

        match trigger {
            Trigger::MapNode => {
                self.graph.set_map_block(&map_path, &object_path);
                self.graph.set_block_multipath(
                    &object_path,
                    project_block_multipath(&event.device, &record),
                );
            }
            Trigger::Member => {
                self.graph.set_block_multipath(
                    &object_path,
                    project_block_multipath(&event.device, &record),
                );
            }
            Trigger::Drive => {
                self.graph
                    .set_drive_multipath(&object_path, project_drive_multipath(&record));
                self.graph.set_map_drive(&map_path, &object_path);
            }
        }

        if created && trigger != Trigger::MapNode {
            self.synthesize_map_node_add(&record);
        }
    }

    fn remove(
        &mut self,
        trigger: Trigger,
        device: &BlockDevice,
        object_path: &str,
        name: &str,
        record: Option<&MpathRecord>,
    ) {
        match trigger {
            Trigger::MapNode => {
                self.graph.unset_block_multipath(object_path);
                self.graph.clear_map_block(object_path);
                let retired = self.graph.retire_maps_named(name, None);
                debug!("dm node {} of map {name} removed; retired {retired} map(s)", device.name());
            }
            Trigger::Member => {
                self.graph.unset_block_multipath(object_path);
                if let Some(record) = record {
                    self.graph.update_map(record);
                }
                self.graph.retire_member(device.name());
                if record.is_none() {
                    self.graph.retire_maps_named(name, None);
                }
            }
            Trigger::Drive => {
                let remaining = self.forget_drive_member(object_path, device.name());
                let map_path = record.and_then(|r| self.graph.update_map(r));
                match (record, map_path) {
                    (Some(record), Some(map_path))
                        if remaining.iter().any(|m| record.has_member(m)) =>
                    {
                        debug!(
                            "Drive {object_path} still backs map {name} through {}",
                            remaining.iter().join(", ")
                        );
                        self.graph
                            .set_drive_multipath(object_path, project_drive_multipath(record));
                        self.graph.set_map_drive(&map_path, object_path);
                    }
                    _ => {
                        self.graph.unset_drive_multipath(object_path);
                        self.graph.clear_map_drive(object_path);
                        if record.is_none() {
                            self.graph.retire_maps_named(name, None);
                        }
                    }
                }
            }
        }
    }

    /// Forget that the named block device backs the drive. Returns the
    /// members still known for it.
    fn forget_drive_member(&mut self, drive_path: &str, block_name: &str) -> Vec<String> {
        match self.drive_members.get_mut(drive_path) {
            Some(members) => {
                members.remove(block_name);
                let remaining = members.iter().cloned().collect::<Vec<_>>();
                if remaining.is_empty() {
                    self.drive_members.remove(drive_path);
                }
                remaining
            }
            None => Vec::new(),
        }
    }

    /// The name of the multipath map the device belongs to, as its dm node
    /// or as a member path.
    fn mpath_name(&self, device: &BlockDevice) -> Option<String> {
        if let Some(name) = device.map_name() {
            return Some(name.to_string());
        }
        // Some other kind of dm device.
        if device.dm_name().is_some() {
            return None;
        }
        if let Some(name) = device.member_of() {
            return Some(name.to_string());
        }
        if device.is_multipath_member() {
            return self
                .graph
                .map_for_member(device.name())
                .map(|m| m.key().name.clone())
                .or_else(|| {
                    self.snapshot
                        .find_by_member(device)
                        .map(|r| r.name.clone())
                });
        }
        None
    }

    fn is_attached(&self, trigger: Trigger, object_path: &str) -> bool {
        match trigger {
            Trigger::Drive => self
                .graph
                .drive_multipath(object_path)
                .is_some_and(|props| props.is_attached()),
            Trigger::MapNode | Trigger::Member => self
                .graph
                .block_multipath(object_path)
                .is_some_and(|props| props.is_attached()),
        }
    }

    /// Queue an "add" for the map's dm node; the kernel does not always
    /// announce it when a map is assembled.
    fn synthesize_map_node_add(&self, record: &MpathRecord) {
        match record.kernel_name.as_deref() {
            Some(kernel_name) => {
                let event = BlockEvent::synthesized_add(BlockDevice::map_node(
                    kernel_name,
                    &record.name,
                    &record.wwid,
                ));
                debug!("Queueing {event}");
                if self.loopback.send(event).is_err() {
                    warn!("Event channel was shut; could not queue add event for {kernel_name}");
                }
            }
            None => {
                debug!(
                    "dm node of map {} is not known; not synthesizing an add event",
                    record.name
                );
            }
        }
    }
}

/// Identities of every map the multipath library currently reports. Uses a
/// fresh snapshot, not the one owned by the reconciler.
pub fn list_all_maps(library: Arc<dyn MultipathLibrary>) -> MpathResult<Vec<String>> {
    let snapshot = Snapshot::open(library)?;
    let identities = snapshot
        .records()
        .iter()
        .map(|record| {
            identity::map_path(&record.name, &record.wwid).ok_or_else(|| {
                MpathError::InvalidRecord(format!(
                    "map with name \"{}\" and WWID \"{}\" lacks an identifying field",
                    record.name, record.wwid
                ))
            })
        })
        .collect::<MpathResult<Vec<_>>>();
    snapshot.close();
    identities
}
