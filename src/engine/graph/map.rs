// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use crate::engine::{
    graph::{ChildSet, GroupObject, Ledger, NodeRef},
    identity::{self, NO_OBJECT},
    projection::{project_map, MapProps},
    snapshot::{MpathRecord, PathGroupRecord},
    types::{MapKey, ObjectKind, ObjectProps},
};

#[derive(Debug)]
pub struct MapObject {
    key: MapKey,
    path: String,
    props: MapProps,
    groups: BTreeMap<u32, GroupObject>,
}

impl MapObject {
    /// Export a map and all of its groups and paths. Returns None if the
    /// record has no valid identity or the identity is already taken.
    pub fn new(ledger: &mut Ledger, record: &MpathRecord) -> Option<MapObject> {
        let path = identity::map_path(&record.name, &record.wwid)?;
        let props = project_map(record, &path, NO_OBJECT, NO_OBJECT);
        if !ledger.export(
            &path,
            NodeRef::Map { map: path.clone() },
            ObjectProps::Map(props.clone()),
        ) {
            return None;
        }
        let mut map = MapObject {
            key: MapKey::new(&record.name, &record.wwid),
            path,
            props,
            groups: BTreeMap::new(),
        };
        let groups = record.exported_groups();
        map.reconcile_children(ledger, groups.iter().map(|g| (g.id, g)));
        Some(map)
    }

    pub fn update(&mut self, ledger: &mut Ledger, record: &MpathRecord) {
        let groups = record.exported_groups();
        self.reconcile_children(ledger, groups.iter().map(|g| (g.id, g)));
        let props = project_map(record, &self.path, &self.props.block, &self.props.drive);
        self.publish(ledger, props);
    }

    /// Unexport the map after all of its descendants. Block and drive
    /// objects that named the map are reset to "/".
    pub fn retire(self, ledger: &mut Ledger) {
        for (_, group) in self.groups {
            group.retire(ledger);
        }
        ledger.detach_blocks(|props| props.multipath == self.path);
        ledger.detach_drives(&self.path);
        ledger.unexport(&self.path, ObjectKind::Map);
    }

    /// Retire the path for the named block device, and its group if that
    /// leaves the group empty.
    pub fn retire_member(&mut self, ledger: &mut Ledger, block_name: &str) -> bool {
        let ids = self
            .groups
            .iter()
            .filter(|(_, g)| g.find_path(block_name).is_some())
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        let mut retired = false;
        for id in ids {
            if let Some(group) = self.groups.get_mut(&id) {
                retired |= group.retire_child(ledger, &block_name.to_string());
                if group.is_empty() {
                    self.retire_child(ledger, &id);
                }
            }
        }
        if retired {
            let mut props = self.props.clone();
            props.paths = self.current_paths();
            self.publish(ledger, props);
        }
        retired
    }

    pub fn set_block(&mut self, ledger: &mut Ledger, block_path: &str) {
        let mut props = self.props.clone();
        props.block = block_path.to_string();
        self.publish(ledger, props);
    }

    pub fn set_drive(&mut self, ledger: &mut Ledger, drive_path: &str) {
        let mut props = self.props.clone();
        props.drive = drive_path.to_string();
        self.publish(ledger, props);
    }

    fn publish(&mut self, ledger: &mut Ledger, props: MapProps) {
        if props != self.props {
            self.props = props;
            ledger.change(&self.path, ObjectProps::Map(self.props.clone()));
        }
    }

    fn current_paths(&self) -> Vec<String> {
        self.groups
            .values()
            .flat_map(|g| g.paths().map(|p| p.path().to_string()))
            .collect()
    }

    pub fn key(&self) -> &MapKey {
        &self.key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn props(&self) -> &MapProps {
        &self.props
    }

    pub fn block(&self) -> &str {
        &self.props.block
    }

    pub fn drive(&self) -> &str {
        &self.props.drive
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupObject> {
        self.groups.values()
    }

    pub fn find_group(&self, id: u32) -> Option<&GroupObject> {
        self.groups.get(&id)
    }

    pub fn has_member(&self, block_name: &str) -> bool {
        self.groups
            .values()
            .any(|g| g.find_path(block_name).is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl ChildSet for MapObject {
    type Key = u32;
    type Record = PathGroupRecord;
    type Child = GroupObject;

    fn get_child(&self, key: &u32) -> Option<&GroupObject> {
        self.groups.get(key)
    }

    fn upsert_child(&mut self, ledger: &mut Ledger, key: &u32, record: &PathGroupRecord) -> bool {
        if let Some(group) = self.groups.get_mut(key) {
            group.update(ledger, record);
            return true;
        }
        match GroupObject::new(ledger, &self.path, record) {
            Some(group) => {
                self.groups.insert(*key, group);
                true
            }
            None => false,
        }
    }

    fn retire_child(&mut self, ledger: &mut Ledger, key: &u32) -> bool {
        match self.groups.remove(key) {
            Some(group) => {
                group.retire(ledger);
                true
            }
            None => false,
        }
    }

    fn child_keys(&self) -> Vec<u32> {
        self.groups.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{
        snapshot::tests::{group, record},
        types::{PathGroupStatus, TreeAction},
    };

    use super::*;

    #[test]
    fn unknown_group_is_never_created() {
        let mut ledger = Ledger::default();
        let rec = record(
            "mpatha",
            "3600001",
            vec![
                group(0, 0, PathGroupStatus::Unknown, &["sdb"]),
                group(2, 10, PathGroupStatus::Enabled, &["sdc"]),
            ],
        );
        let map = MapObject::new(&mut ledger, &rec).unwrap();
        assert_eq!(map.child_keys(), vec![2]);
        assert!(map.get_child(&0).is_none());
        assert_eq!(map.props().paths.len(), 1);
        assert!(!map.has_member("sdb"));
    }

    #[test]
    fn empty_wwid_exports_nothing() {
        let mut ledger = Ledger::default();
        let rec = record(
            "mpatha",
            "",
            vec![group(1, 50, PathGroupStatus::Active, &["sdb"])],
        );
        assert!(MapObject::new(&mut ledger, &rec).is_none());
        assert!(ledger.actions.is_empty());
        assert!(ledger.index.is_empty());
    }

    #[test]
    fn retire_is_post_order() {
        let mut ledger = Ledger::default();
        let rec = record(
            "mpatha",
            "3600001",
            vec![
                group(1, 50, PathGroupStatus::Active, &["sdb", "sdc"]),
                group(2, 10, PathGroupStatus::Enabled, &["sdd"]),
            ],
        );
        let map = MapObject::new(&mut ledger, &rec).unwrap();
        let map_path = map.path().to_string();
        ledger.actions.clear();

        map.retire(&mut ledger);
        let retired = ledger
            .actions
            .iter()
            .filter_map(|a| match a {
                TreeAction::Unexport(p, _) => Some(p.strip_prefix(&map_path).unwrap_or(p)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            retired,
            vec![
                "/path_group_1/path_sdb",
                "/path_group_1/path_sdc",
                "/path_group_1",
                "/path_group_2/path_sdd",
                "/path_group_2",
                "",
            ]
        );
        assert!(ledger.index.is_empty());
        assert!(ledger.blocks.values().all(|b| !b.is_attached()));
    }
}
