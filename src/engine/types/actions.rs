// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contains the type that records every change the reconciler makes to the
//! exported object tree. A bus adapter applies the actions in order; the
//! reconciler itself never talks to the bus.

use std::fmt::{self, Display};

use crate::engine::projection::{
    BlockMultipathProps, DriveMultipathProps, GroupProps, MapProps, PathProps,
};

/// The kind of a node in the multipath tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ObjectKind {
    Map,
    Group,
    Path,
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Map => write!(f, "multipath map"),
            ObjectKind::Group => write!(f, "path group"),
            ObjectKind::Path => write!(f, "path"),
        }
    }
}

/// The attributes of a node in the multipath tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ObjectProps {
    Map(MapProps),
    Group(GroupProps),
    Path(PathProps),
}

impl ObjectProps {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectProps::Map(_) => ObjectKind::Map,
            ObjectProps::Group(_) => ObjectKind::Group,
            ObjectProps::Path(_) => ObjectKind::Path,
        }
    }
}

impl Display for ObjectProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectProps::Map(p) => write!(f, "{p}"),
            ObjectProps::Group(p) => write!(f, "{p}"),
            ObjectProps::Path(p) => write!(f, "{p}"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TreeAction {
    /// A node was created at the given identity.
    Export(String, ObjectProps),
    /// Some attributes of an exported node changed; carries the full new
    /// value.
    Change(String, ObjectProps),
    /// The node at the given identity was retired.
    Unexport(String, ObjectKind),
    /// The multipath attributes of a block object were set or changed.
    SetBlockMultipath(String, BlockMultipathProps),
    /// The block object went away; its multipath attributes go with it.
    UnsetBlockMultipath(String),
    SetDriveMultipath(String, DriveMultipathProps),
    UnsetDriveMultipath(String),
}

impl TreeAction {
    /// The identity of the object this action applies to.
    pub fn object_path(&self) -> &str {
        match self {
            TreeAction::Export(p, _)
            | TreeAction::Change(p, _)
            | TreeAction::Unexport(p, _)
            | TreeAction::SetBlockMultipath(p, _)
            | TreeAction::UnsetBlockMultipath(p)
            | TreeAction::SetDriveMultipath(p, _)
            | TreeAction::UnsetDriveMultipath(p) => p,
        }
    }
}

impl Display for TreeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeAction::Export(path, props) => {
                write!(f, "Exported {} {path} ({props})", props.kind())
            }
            TreeAction::Change(path, props) => {
                write!(f, "Updated {} {path} ({props})", props.kind())
            }
            TreeAction::Unexport(path, kind) => write!(f, "Retired {kind} {path}"),
            TreeAction::SetBlockMultipath(path, props) => {
                write!(f, "Set multipath attributes of block {path} ({props})")
            }
            TreeAction::UnsetBlockMultipath(path) => {
                write!(f, "Removed multipath attributes of block {path}")
            }
            TreeAction::SetDriveMultipath(path, props) => {
                write!(f, "Set multipath attributes of drive {path} ({props})")
            }
            TreeAction::UnsetDriveMultipath(path) => {
                write!(f, "Removed multipath attributes of drive {path}")
            }
        }
    }
}
