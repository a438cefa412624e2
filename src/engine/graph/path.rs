// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::engine::{
    graph::{Ledger, NodeRef},
    identity,
    projection::{project_path, BlockMultipathProps, PathProps},
    snapshot::PathRecord,
    types::{ObjectKind, ObjectProps},
};

#[derive(Debug)]
pub struct PathObject {
    block_name: String,
    path: String,
    group_path: String,
    props: PathProps,
}

impl PathObject {
    /// Export a path and point its block object back at it.
    pub fn new(
        ledger: &mut Ledger,
        map_path: &str,
        group_path: &str,
        group_id: u32,
        record: &PathRecord,
    ) -> Option<PathObject> {
        let path = identity::path_path(group_path, &record.block_name)?;
        let props = project_path(record, map_path);
        if !ledger.export(
            &path,
            NodeRef::Path {
                map: map_path.to_string(),
                id: group_id,
                block_name: record.block_name.clone(),
            },
            ObjectProps::Path(props.clone()),
        ) {
            return None;
        }
        ledger.set_block(
            &props.block,
            BlockMultipathProps {
                multipath: map_path.to_string(),
                path: path.clone(),
            },
        );
        Some(PathObject {
            block_name: record.block_name.clone(),
            path,
            group_path: group_path.to_string(),
            props,
        })
    }

    pub fn update(&mut self, ledger: &mut Ledger, record: &PathRecord) {
        let props = project_path(record, &self.props.multipath);
        if props != self.props {
            self.props = props;
            ledger.change(&self.path, ObjectProps::Path(self.props.clone()));
        }
    }

    /// Unexport the path. A block object still naming it is reset to "/".
    pub fn retire(self, ledger: &mut Ledger) {
        ledger.detach_blocks(|props| props.path == self.path);
        ledger.unexport(&self.path, ObjectKind::Path);
    }

    pub fn block_name(&self) -> &str {
        &self.block_name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn group_path(&self) -> &str {
        &self.group_path
    }

    pub fn props(&self) -> &PathProps {
        &self.props
    }

    /// Identity of the block object realizing this path.
    pub fn block(&self) -> &str {
        &self.props.block
    }
}
