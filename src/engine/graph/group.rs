// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use crate::engine::{
    graph::{ChildSet, Ledger, NodeRef, PathObject},
    identity,
    projection::{project_group, GroupProps},
    snapshot::{PathGroupRecord, PathRecord},
    types::{ObjectKind, ObjectProps},
};

#[derive(Debug)]
pub struct GroupObject {
    id: u32,
    path: String,
    map_path: String,
    props: GroupProps,
    paths: BTreeMap<String, PathObject>,
}

impl GroupObject {
    /// Returns None for the reserved unknown group id.
    pub fn new(ledger: &mut Ledger, map_path: &str, record: &PathGroupRecord) -> Option<GroupObject> {
        let path = identity::group_path(map_path, record.id)?;
        let props = project_group(record);
        if !ledger.export(
            &path,
            NodeRef::Group {
                map: map_path.to_string(),
                id: record.id,
            },
            ObjectProps::Group(props.clone()),
        ) {
            return None;
        }
        let mut group = GroupObject {
            id: record.id,
            path,
            map_path: map_path.to_string(),
            props,
            paths: BTreeMap::new(),
        };
        group.reconcile_children(ledger, named_paths(record));
        Some(group)
    }

    pub fn update(&mut self, ledger: &mut Ledger, record: &PathGroupRecord) {
        self.reconcile_children(ledger, named_paths(record));
        let props = project_group(record);
        if props != self.props {
            self.props = props;
            ledger.change(&self.path, ObjectProps::Group(self.props.clone()));
        }
    }

    pub fn retire(self, ledger: &mut Ledger) {
        for (_, path) in self.paths {
            path.retire(ledger);
        }
        ledger.unexport(&self.path, ObjectKind::Group);
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn map_path(&self) -> &str {
        &self.map_path
    }

    pub fn props(&self) -> &GroupProps {
        &self.props
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathObject> {
        self.paths.values()
    }

    pub fn find_path(&self, block_name: &str) -> Option<&PathObject> {
        self.paths.get(block_name)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn named_paths(record: &PathGroupRecord) -> impl Iterator<Item = (String, &PathRecord)> {
    record
        .paths
        .iter()
        .filter(|p| !p.block_name.is_empty())
        .map(|p| (p.block_name.clone(), p))
}

impl ChildSet for GroupObject {
    type Key = String;
    type Record = PathRecord;
    type Child = PathObject;

    fn get_child(&self, key: &String) -> Option<&PathObject> {
        self.paths.get(key)
    }

    fn upsert_child(&mut self, ledger: &mut Ledger, key: &String, record: &PathRecord) -> bool {
        if let Some(path) = self.paths.get_mut(key) {
            path.update(ledger, record);
            return true;
        }
        match PathObject::new(ledger, &self.map_path, &self.path, self.id, record) {
            Some(path) => {
                self.paths.insert(key.clone(), path);
                true
            }
            None => false,
        }
    }

    fn retire_child(&mut self, ledger: &mut Ledger, key: &String) -> bool {
        match self.paths.remove(key) {
            Some(path) => {
                path.retire(ledger);
                true
            }
            None => false,
        }
    }

    fn child_keys(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{
        snapshot::tests::{group, path},
        types::{PathGroupStatus, PathStatus, TreeAction},
    };

    use super::*;

    #[test]
    fn path_status_change_keeps_identity() {
        let mut ledger = Ledger::default();
        let mut rec = group(1, 50, PathGroupStatus::Active, &["sdb", "sdc"]);
        let mut g = GroupObject::new(&mut ledger, "/m", &rec).unwrap();
        let before = g.find_path("sdb").unwrap().path().to_string();
        ledger.actions.clear();

        rec.paths[0].status = PathStatus::Faulty;
        g.update(&mut ledger, &rec);
        assert_eq!(g.find_path("sdb").unwrap().path(), before);
        assert_matches!(
            ledger.actions.as_slice(),
            [TreeAction::Change(p, ObjectProps::Path(props))] if *p == before && props.status == "faulty"
        );
    }

    #[test]
    fn group_attributes_change_in_place() {
        let mut ledger = Ledger::default();
        let mut rec = group(1, 50, PathGroupStatus::Active, &["sdb"]);
        let mut g = GroupObject::new(&mut ledger, "/m", &rec).unwrap();
        ledger.actions.clear();

        rec.status = PathGroupStatus::Enabled;
        rec.paths.push(path("sde", 1));
        g.update(&mut ledger, &rec);
        assert_eq!(g.props().status, "enabled");
        assert_eq!(g.child_keys(), vec!["sdb".to_string(), "sde".to_string()]);
        assert_matches!(ledger.actions.last(), Some(TreeAction::Change(_, ObjectProps::Group(_))));
    }
}
