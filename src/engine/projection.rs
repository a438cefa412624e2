// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Attribute values of the exported interfaces, computed from snapshot
//! records. Every value type is comparable so that callers publish only
//! what changed.

use std::fmt::{self, Display};

use itertools::Itertools;

use crate::engine::{
    identity::{self, NO_OBJECT},
    snapshot::{MpathRecord, PathGroupRecord, PathRecord},
    types::BlockDevice,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MapProps {
    pub name: String,
    pub wwid: String,
    pub block: String,
    pub drive: String,
    pub paths: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupProps {
    pub id: u32,
    pub priority: u32,
    pub selector: String,
    pub status: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathProps {
    pub name: String,
    pub status: String,
    pub block: String,
    pub multipath: String,
}

/// The multipath attributes of a kernel block object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockMultipathProps {
    pub multipath: String,
    pub path: String,
}

impl BlockMultipathProps {
    pub fn detached() -> BlockMultipathProps {
        BlockMultipathProps {
            multipath: NO_OBJECT.to_string(),
            path: NO_OBJECT.to_string(),
        }
    }

    /// False once the map this block belonged to has been retired.
    pub fn is_attached(&self) -> bool {
        self.multipath != NO_OBJECT
    }
}

/// The multipath attributes of a drive object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriveMultipathProps {
    pub multipath: String,
}

impl DriveMultipathProps {
    pub fn detached() -> DriveMultipathProps {
        DriveMultipathProps {
            multipath: NO_OBJECT.to_string(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.multipath != NO_OBJECT
    }
}

impl Display for MapProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name: {}, wwid: {}, block: {}, drive: {}, paths: {}",
            self.name,
            self.wwid,
            self.block,
            self.drive,
            self.paths.len()
        )
    }
}

impl Display for GroupProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, priority: {}, selector: \"{}\", status: {}",
            self.id, self.priority, self.selector, self.status
        )
    }
}

impl Display for PathProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name: {}, status: {}, block: {}",
            self.name, self.status, self.block
        )
    }
}

impl Display for BlockMultipathProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multipath: {}, path: {}", self.multipath, self.path)
    }
}

impl Display for DriveMultipathProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multipath: {}", self.multipath)
    }
}

/// Identities of every exported path of the record, ordered by group id
/// and then by block name.
pub fn paths_flat(record: &MpathRecord, map_path: &str) -> Vec<String> {
    record
        .exported_groups()
        .into_iter()
        .flat_map(|g| {
            let id = g.id;
            g.paths.into_iter().map(move |p| (id, p.block_name))
        })
        .sorted_unstable()
        .filter_map(|(id, name)| {
            identity::group_path(map_path, id).and_then(|g| identity::path_path(&g, &name))
        })
        .collect()
}

pub fn project_map(record: &MpathRecord, map_path: &str, block: &str, drive: &str) -> MapProps {
    MapProps {
        name: record.name.clone(),
        wwid: record.wwid.clone(),
        block: block.to_string(),
        drive: drive.to_string(),
        paths: paths_flat(record, map_path),
    }
}

pub fn project_group(group: &PathGroupRecord) -> GroupProps {
    GroupProps {
        id: group.id,
        priority: group.priority,
        selector: group.selector.clone(),
        status: group.status.to_string(),
    }
}

pub fn project_path(path: &PathRecord, map_path: &str) -> PathProps {
    PathProps {
        name: path.block_name.clone(),
        status: path.status.to_string(),
        block: identity::block_object_path(&path.block_name),
        multipath: map_path.to_string(),
    }
}

/// The back-references for a block device that belongs to the record's
/// map, either as its dm node or as a member path.
pub fn project_block_multipath(device: &BlockDevice, record: &MpathRecord) -> BlockMultipathProps {
    let map_path = match identity::map_path(&record.name, &record.wwid) {
        Some(p) => p,
        None => return BlockMultipathProps::detached(),
    };
    let path = match record.group_of(device.name()) {
        Some(id) if device.map_name().is_none() => identity::group_path(&map_path, id)
            .and_then(|g| identity::path_path(&g, device.name())),
        _ => None,
    };
    BlockMultipathProps {
        multipath: map_path,
        path: path.unwrap_or_else(|| NO_OBJECT.to_string()),
    }
}

pub fn project_drive_multipath(record: &MpathRecord) -> DriveMultipathProps {
    DriveMultipathProps {
        multipath: identity::map_path(&record.name, &record.wwid)
            .unwrap_or_else(|| NO_OBJECT.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{
        snapshot::tests::{group, path, record},
        types::{PathGroupStatus, PathStatus},
    };

    use super::*;

    #[test]
    fn paths_are_ordered_by_group_then_name() {
        let rec = record(
            "mpatha",
            "3600001",
            vec![
                group(2, 10, PathGroupStatus::Enabled, &["sdc", "sda"]),
                group(0, 0, PathGroupStatus::Unknown, &["sdz"]),
                group(1, 50, PathGroupStatus::Active, &["sdd", "sdb"]),
            ],
        );
        let map = identity::map_path("mpatha", "3600001").unwrap();
        let props = project_map(&rec, &map, NO_OBJECT, NO_OBJECT);
        let names = props
            .paths
            .iter()
            .map(|p| p.rsplit('/').next().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["path_sdb", "path_sdd", "path_sda", "path_sdc"]);
        assert!(props.paths[0].contains("path_group_1"));
        assert!(props.paths.iter().all(|p| !p.contains("path_group_0")));
    }

    #[test]
    fn group_and_path_attributes() {
        let g = group(1, 50, PathGroupStatus::Active, &["sdb"]);
        assert_eq!(
            project_group(&g),
            GroupProps {
                id: 1,
                priority: 50,
                selector: "round-robin 0".to_string(),
                status: "active".to_string(),
            }
        );

        let mut p = path("sdb", 1);
        p.status = PathStatus::Faulty;
        let props = project_path(&p, "/m");
        assert_eq!(props.status, "faulty");
        assert_eq!(props.block, identity::block_object_path("sdb"));
        assert_eq!(props.multipath, "/m");
    }

    #[test]
    fn block_back_references() {
        let rec = record(
            "mpatha",
            "3600001",
            vec![group(1, 50, PathGroupStatus::Active, &["sdb"])],
        );
        let map = identity::map_path("mpatha", "3600001").unwrap();

        let member = project_block_multipath(&BlockDevice::member_path("sdb", "mpatha"), &rec);
        assert_eq!(member.multipath, map);
        assert!(member.path.ends_with("/path_group_1/path_sdb"));

        let node = project_block_multipath(&BlockDevice::map_node("dm-0", "mpatha", "3600001"), &rec);
        assert_eq!(node.multipath, map);
        assert_eq!(node.path, NO_OBJECT);

        let unnamed = record("mpatha", "", vec![]);
        assert!(!project_block_multipath(&BlockDevice::new("sdb"), &unnamed).is_attached());
        assert!(!project_drive_multipath(&unnamed).is_attached());
    }
}
