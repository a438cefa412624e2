// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The exported tree of multipath maps, path groups and paths.
//!
//! A map exclusively owns its groups and a group exclusively owns its paths.
//! Every exported identity is recorded in a global index together with its
//! location in the tree. Block and drive objects are not owned by the tree;
//! their multipath attributes are plain identity strings kept in separate
//! tables. Every change is recorded as a `TreeAction` which the caller
//! drains with `ObjectGraph::take_actions`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;

use crate::engine::{
    identity::{self, NO_OBJECT},
    projection::{BlockMultipathProps, DriveMultipathProps},
    snapshot::MpathRecord,
    types::{ObjectKind, ObjectProps, TreeAction},
};

pub use self::{group::GroupObject, map::MapObject, path::PathObject};

mod group;
mod map;
mod path;

/// Where an exported identity lives in the tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeRef {
    Map {
        map: String,
    },
    Group {
        map: String,
        id: u32,
    },
    Path {
        map: String,
        id: u32,
        block_name: String,
    },
}

impl NodeRef {
    pub fn kind(&self) -> ObjectKind {
        match self {
            NodeRef::Map { .. } => ObjectKind::Map,
            NodeRef::Group { .. } => ObjectKind::Group,
            NodeRef::Path { .. } => ObjectKind::Path,
        }
    }
}

/// A node of the tree, as returned by a lookup on its identity.
#[derive(Debug)]
pub enum Node<'a> {
    Map(&'a MapObject),
    Group(&'a GroupObject),
    Path(&'a PathObject),
}

/// The global index, the back-reference tables, and the list of changes
/// not yet handed to the bus adapter.
#[derive(Debug, Default)]
pub struct Ledger {
    index: HashMap<String, NodeRef>,
    blocks: BTreeMap<String, BlockMultipathProps>,
    drives: BTreeMap<String, DriveMultipathProps>,
    actions: Vec<TreeAction>,
}

impl Ledger {
    /// Record a new node. Refuses, and returns false, if the identity is
    /// already exported.
    fn export(&mut self, path: &str, node: NodeRef, props: ObjectProps) -> bool {
        if let Some(existing) = self.index.get(path) {
            error!(
                "Refusing to export {} {}; the identity is already held by a {}",
                node.kind(),
                path,
                existing.kind()
            );
            return false;
        }
        self.index.insert(path.to_string(), node);
        push_action!(self.actions, TreeAction::Export(path.to_string(), props));
        true
    }

    fn change(&mut self, path: &str, props: ObjectProps) {
        push_action!(self.actions, TreeAction::Change(path.to_string(), props));
    }

    fn unexport(&mut self, path: &str, kind: ObjectKind) {
        if self.index.remove(path).is_none() {
            warn!("Retiring {kind} {path} which was not in the index");
        }
        push_action!(self.actions, TreeAction::Unexport(path.to_string(), kind));
    }

    /// Publish the multipath attributes of a block object if they differ
    /// from what is published. Returns true if anything changed.
    fn set_block(&mut self, block_path: &str, props: BlockMultipathProps) -> bool {
        if self.blocks.get(block_path) == Some(&props) {
            return false;
        }
        self.blocks.insert(block_path.to_string(), props.clone());
        push_action!(
            self.actions,
            TreeAction::SetBlockMultipath(block_path.to_string(), props)
        );
        true
    }

    fn unset_block(&mut self, block_path: &str) {
        if self.blocks.remove(block_path).is_some() {
            push_action!(
                self.actions,
                TreeAction::UnsetBlockMultipath(block_path.to_string())
            );
        }
    }

    /// Reset to "/" the attributes of every attached block object matching
    /// the predicate.
    fn detach_blocks<F>(&mut self, pred: F)
    where
        F: Fn(&BlockMultipathProps) -> bool,
    {
        let detached = BlockMultipathProps::detached();
        for (path, props) in self
            .blocks
            .iter_mut()
            .filter(|(_, props)| props.is_attached() && pred(&**props))
        {
            *props = detached.clone();
            push_action!(
                self.actions,
                TreeAction::SetBlockMultipath(path.clone(), detached.clone())
            );
        }
    }

    fn set_drive(&mut self, drive_path: &str, props: DriveMultipathProps) -> bool {
        if self.drives.get(drive_path) == Some(&props) {
            return false;
        }
        self.drives.insert(drive_path.to_string(), props.clone());
        push_action!(
            self.actions,
            TreeAction::SetDriveMultipath(drive_path.to_string(), props)
        );
        true
    }

    fn unset_drive(&mut self, drive_path: &str) {
        if self.drives.remove(drive_path).is_some() {
            push_action!(
                self.actions,
                TreeAction::UnsetDriveMultipath(drive_path.to_string())
            );
        }
    }

    fn detach_drives(&mut self, map_path: &str) {
        let detached = DriveMultipathProps::detached();
        for (path, props) in self
            .drives
            .iter_mut()
            .filter(|(_, props)| props.multipath == map_path)
        {
            *props = detached.clone();
            push_action!(
                self.actions,
                TreeAction::SetDriveMultipath(path.clone(), detached.clone())
            );
        }
    }
}

/// The protocol shared by every node that owns a keyed set of children.
pub trait ChildSet {
    type Key: Ord + Clone;
    type Record;
    type Child;

    fn get_child(&self, key: &Self::Key) -> Option<&Self::Child>;

    /// Update the child with the given key from the record, or create and
    /// attach it if there is none. Returns false if no child could be
    /// created.
    fn upsert_child(&mut self, ledger: &mut Ledger, key: &Self::Key, record: &Self::Record)
        -> bool;

    /// Retire the child with the given key and all of its descendants.
    fn retire_child(&mut self, ledger: &mut Ledger, key: &Self::Key) -> bool;

    fn child_keys(&self) -> Vec<Self::Key>;

    /// Make the children match the records: retire every child whose key is
    /// absent, then upsert the rest. The first record for a key wins.
    fn reconcile_children<'a, I>(&mut self, ledger: &mut Ledger, records: I)
    where
        I: IntoIterator<Item = (Self::Key, &'a Self::Record)>,
        Self::Record: 'a,
    {
        let mut seen = BTreeSet::new();
        let wanted = records
            .into_iter()
            .filter(|(key, _)| seen.insert(key.clone()))
            .collect::<Vec<_>>();
        for key in self.child_keys() {
            if !seen.contains(&key) {
                self.retire_child(ledger, &key);
            }
        }
        for (key, record) in wanted {
            self.upsert_child(ledger, &key, record);
        }
    }
}

#[derive(Debug, Default)]
pub struct ObjectGraph {
    maps: BTreeMap<String, MapObject>,
    ledger: Ledger,
}

impl ObjectGraph {
    pub fn new() -> ObjectGraph {
        ObjectGraph::default()
    }

    /// Update the map for the record, creating it if it is not exported.
    /// Returns the map's identity and whether it was created, or None if
    /// the record does not yield a valid identity.
    pub fn upsert_map(&mut self, record: &MpathRecord) -> Option<(String, bool)> {
        let path = identity::map_path(&record.name, &record.wwid)?;
        if let Some(map) = self.maps.get_mut(&path) {
            map.update(&mut self.ledger, record);
            return Some((path, false));
        }
        let map = MapObject::new(&mut self.ledger, record)?;
        self.maps.insert(path.clone(), map);
        Some((path, true))
    }

    /// Update the map for the record only if it is already exported.
    /// Returns its identity if it was.
    pub fn update_map(&mut self, record: &MpathRecord) -> Option<String> {
        let map = identity::map_path(&record.name, &record.wwid)
            .and_then(|path| self.maps.get_mut(&path))?;
        map.update(&mut self.ledger, record);
        Some(map.path().to_string())
    }

    /// Retire the map at the given identity, post-order.
    pub fn retire_map(&mut self, map_path: &str) -> bool {
        match self.maps.remove(map_path) {
            Some(map) => {
                map.retire(&mut self.ledger);
                true
            }
            None => false,
        }
    }

    /// Retire every map with the given name except the one at `keep`.
    /// Returns the number of maps retired.
    pub fn retire_maps_named(&mut self, name: &str, keep: Option<&str>) -> usize {
        let doomed = self
            .maps
            .values()
            .filter(|m| m.key().name == name && Some(m.path()) != keep)
            .map(|m| m.path().to_string())
            .collect::<Vec<_>>();
        doomed.iter().filter(|p| self.retire_map(p)).count()
    }

    /// Retire every path object for the named block device, then any group
    /// or map left empty by that.
    pub fn retire_member(&mut self, block_name: &str) -> bool {
        let mut retired = false;
        let map_paths = self
            .maps
            .values()
            .filter(|m| m.has_member(block_name))
            .map(|m| m.path().to_string())
            .collect::<Vec<_>>();
        for map_path in map_paths {
            let now_empty = match self.maps.get_mut(&map_path) {
                Some(map) => {
                    retired |= map.retire_member(&mut self.ledger, block_name);
                    map.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.retire_map(&map_path);
            }
        }
        retired
    }

    pub fn get_by_path(&self, path: &str) -> Option<Node<'_>> {
        match self.ledger.index.get(path)? {
            NodeRef::Map { map } => self.maps.get(map).map(Node::Map),
            NodeRef::Group { map, id } => self
                .maps
                .get(map)
                .and_then(|m| m.find_group(*id))
                .map(Node::Group),
            NodeRef::Path {
                map,
                id,
                block_name,
            } => self
                .maps
                .get(map)
                .and_then(|m| m.find_group(*id))
                .and_then(|g| g.find_path(block_name))
                .map(Node::Path),
        }
    }

    pub fn get_map(&self, map_path: &str) -> Option<&MapObject> {
        self.maps.get(map_path)
    }

    pub fn maps(&self) -> impl Iterator<Item = &MapObject> {
        self.maps.values()
    }

    pub fn maps_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MapObject> + 'a {
        self.maps.values().filter(move |m| m.key().name == name)
    }

    /// The first exported map with a path for the named block device.
    pub fn map_for_member(&self, block_name: &str) -> Option<&MapObject> {
        self.maps.values().find(|m| m.has_member(block_name))
    }

    /// Every exported identity, sorted.
    pub fn identities(&self) -> Vec<String> {
        self.ledger.index.keys().cloned().sorted().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn set_map_block(&mut self, map_path: &str, block_path: &str) {
        if let Some(map) = self.maps.get_mut(map_path) {
            map.set_block(&mut self.ledger, block_path);
        }
    }

    pub fn set_map_drive(&mut self, map_path: &str, drive_path: &str) {
        if let Some(map) = self.maps.get_mut(map_path) {
            map.set_drive(&mut self.ledger, drive_path);
        }
    }

    /// Clear the block reference of every map that names the given block.
    pub fn clear_map_block(&mut self, block_path: &str) {
        for map in self.maps.values_mut().filter(|m| m.block() == block_path) {
            map.set_block(&mut self.ledger, NO_OBJECT);
        }
    }

    /// Clear the drive reference of every map that names the given drive.
    pub fn clear_map_drive(&mut self, drive_path: &str) {
        for map in self.maps.values_mut().filter(|m| m.drive() == drive_path) {
            map.set_drive(&mut self.ledger, NO_OBJECT);
        }
    }

    pub fn block_multipath(&self, block_path: &str) -> Option<&BlockMultipathProps> {
        self.ledger.blocks.get(block_path)
    }

    pub fn set_block_multipath(&mut self, block_path: &str, props: BlockMultipathProps) -> bool {
        self.ledger.set_block(block_path, props)
    }

    pub fn unset_block_multipath(&mut self, block_path: &str) {
        self.ledger.unset_block(block_path)
    }

    pub fn drive_multipath(&self, drive_path: &str) -> Option<&DriveMultipathProps> {
        self.ledger.drives.get(drive_path)
    }

    pub fn set_drive_multipath(&mut self, drive_path: &str, props: DriveMultipathProps) -> bool {
        self.ledger.set_drive(drive_path, props)
    }

    pub fn unset_drive_multipath(&mut self, drive_path: &str) {
        self.ledger.unset_drive(drive_path)
    }

    /// Hand over every change recorded since the last call.
    pub fn take_actions(&mut self) -> Vec<TreeAction> {
        std::mem::take(&mut self.ledger.actions)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{
        identity,
        snapshot::tests::{group, record},
        types::PathGroupStatus,
    };

    use super::*;

    fn mpatha() -> MpathRecord {
        record(
            "mpatha",
            "3600001",
            vec![
                group(1, 50, PathGroupStatus::Active, &["sdb", "sdc"]),
                group(2, 10, PathGroupStatus::Enabled, &["sdd"]),
            ],
        )
    }

    #[test]
    fn create_exports_pre_order() {
        let mut graph = ObjectGraph::new();
        let (map_path, created) = graph.upsert_map(&mpatha()).unwrap();
        assert!(created);

        let actions = graph.take_actions();
        let exported = actions
            .iter()
            .filter_map(|a| match a {
                TreeAction::Export(p, _) => Some(p.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(exported.len(), 6);
        assert_eq!(exported[0], map_path);
        assert!(exported[1].ends_with("path_group_1"));
        assert!(exported[2].ends_with("path_sdb"));

        assert_matches!(graph.get_by_path(&map_path), Some(Node::Map(_)));
        assert_matches!(
            graph.get_by_path(&format!("{map_path}/path_group_2/path_sdd")),
            Some(Node::Path(p)) if p.block_name() == "sdd"
        );
        // Path back-references are published on creation.
        let sdd = graph
            .block_multipath(&identity::block_object_path("sdd"))
            .unwrap();
        assert_eq!(sdd.path, format!("{map_path}/path_group_2/path_sdd"));
    }

    #[test]
    fn second_upsert_is_silent() {
        let mut graph = ObjectGraph::new();
        graph.upsert_map(&mpatha()).unwrap();
        graph.take_actions();
        let (_, created) = graph.upsert_map(&mpatha()).unwrap();
        assert!(!created);
        assert_eq!(graph.take_actions(), vec![]);
    }

    #[test]
    fn update_prunes_absent_children() {
        let mut graph = ObjectGraph::new();
        let (map_path, _) = graph.upsert_map(&mpatha()).unwrap();
        graph.take_actions();

        let shrunk = record(
            "mpatha",
            "3600001",
            vec![group(1, 50, PathGroupStatus::Active, &["sdb"])],
        );
        graph.upsert_map(&shrunk).unwrap();
        let retired = graph
            .take_actions()
            .into_iter()
            .filter_map(|a| match a {
                TreeAction::Unexport(p, _) => Some(p),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            retired,
            vec![
                format!("{map_path}/path_group_2/path_sdd"),
                format!("{map_path}/path_group_2"),
                format!("{map_path}/path_group_1/path_sdc"),
            ]
        );
        assert!(!graph
            .block_multipath(&identity::block_object_path("sdc"))
            .unwrap()
            .is_attached());
    }

    #[test]
    fn retire_member_retires_empty_ancestors() {
        let mut graph = ObjectGraph::new();
        let rec = record(
            "mpatha",
            "3600001",
            vec![group(1, 50, PathGroupStatus::Active, &["sdb"])],
        );
        graph.upsert_map(&rec).unwrap();
        assert!(graph.retire_member("sdb"));
        assert!(graph.is_empty());
        assert!(graph.identities().is_empty());
        assert!(!graph.retire_member("sdb"));
    }

    #[test]
    fn block_listed_twice_gets_one_path() {
        let mut graph = ObjectGraph::new();
        let rec = record(
            "mpatha",
            "3600001",
            vec![
                group(0, 0, PathGroupStatus::Unknown, &["sdb"]),
                group(2, 10, PathGroupStatus::Enabled, &["sdb", "sdc"]),
                group(3, 10, PathGroupStatus::Enabled, &["sdc", "sdd"]),
            ],
        );
        let (map_path, _) = graph.upsert_map(&rec).unwrap();

        let map = graph.get_map(&map_path).unwrap();
        let group_2 = format!("{map_path}/path_group_2");
        let group_3 = format!("{map_path}/path_group_3");
        assert_eq!(
            map.props().paths,
            vec![
                format!("{group_2}/path_sdb"),
                format!("{group_2}/path_sdc"),
                format!("{group_3}/path_sdd"),
            ]
        );
        assert!(map.find_group(3).unwrap().find_path("sdc").is_none());
        for (block, path) in [("sdb", &group_2), ("sdc", &group_2), ("sdd", &group_3)] {
            assert_eq!(
                graph
                    .block_multipath(&identity::block_object_path(block))
                    .unwrap()
                    .path,
                format!("{path}/path_{block}")
            );
        }
    }

    #[test]
    fn duplicate_identity_is_refused() {
        let mut graph = ObjectGraph::new();
        graph.upsert_map(&mpatha()).unwrap();
        let mut ledger = Ledger::default();
        assert!(MapObject::new(&mut ledger, &mpatha()).is_some());
        assert!(MapObject::new(&mut ledger, &mpatha()).is_none());
    }
}
