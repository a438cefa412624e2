// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub use self::{
    graph::{ChildSet, GroupObject, MapObject, Node, ObjectGraph, PathObject},
    identity::{
        block_object_path, drive_object_path, group_path, map_path, path_path, NO_OBJECT,
        OBJECT_ROOT,
    },
    projection::{
        project_block_multipath, project_drive_multipath, project_group, project_map,
        project_path, BlockMultipathProps, DriveMultipathProps, GroupProps, MapProps, PathProps,
    },
    reconciler::{list_all_maps, Reconciler},
    snapshot::{
        MpathRecord, MultipathLibrary, MultipathdLibrary, PathGroupRecord, PathRecord,
        SimLibrary, Snapshot, DEFAULT_MULTIPATHD_TIMEOUT, UNKNOWN_GROUP_ID,
    },
    types::{
        BlockAction, BlockDevice, BlockEvent, DeviceRole, MapKey, ObjectKind, ObjectProps,
        PathGroupStatus, PathStatus, TreeAction,
    },
};

mod graph;
pub mod identity;
mod projection;
mod reconciler;
mod snapshot;
mod types;
pub mod udev;
