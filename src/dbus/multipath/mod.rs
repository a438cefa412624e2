// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interfaces of the multipath map, path group and path objects. Each holds
//! the last published attribute values; updating one emits a change signal
//! for every attribute that differs.

use zbus::{interface, object_server::SignalEmitter, zvariant::OwnedObjectPath, Result};

use crate::{
    dbus::util::to_object_path,
    engine::{GroupProps, MapProps, PathProps},
};

pub struct MultipathR0 {
    props: MapProps,
}

impl MultipathR0 {
    pub fn new(props: MapProps) -> Self {
        MultipathR0 { props }
    }

    pub async fn update(&mut self, props: MapProps, emitter: &SignalEmitter<'_>) -> Result<()> {
        let old = std::mem::replace(&mut self.props, props);
        if old.name != self.props.name {
            self.name_changed(emitter).await?;
        }
        if old.wwid != self.props.wwid {
            self.wwid_changed(emitter).await?;
        }
        if old.block != self.props.block {
            self.block_changed(emitter).await?;
        }
        if old.drive != self.props.drive {
            self.drive_changed(emitter).await?;
        }
        if old.paths != self.props.paths {
            self.paths_changed(emitter).await?;
        }
        Ok(())
    }
}

#[interface(name = "org.storage.mpathd1.Multipath")]
impl MultipathR0 {
    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Name(&self) -> &str {
        &self.props.name
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Wwid(&self) -> &str {
        &self.props.wwid
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Block(&self) -> OwnedObjectPath {
        to_object_path(&self.props.block)
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Drive(&self) -> OwnedObjectPath {
        to_object_path(&self.props.drive)
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Paths(&self) -> Vec<OwnedObjectPath> {
        self.props.paths.iter().map(|p| to_object_path(p)).collect()
    }
}

pub struct PathGroupR0 {
    props: GroupProps,
}

impl PathGroupR0 {
    pub fn new(props: GroupProps) -> Self {
        PathGroupR0 { props }
    }

    pub async fn update(&mut self, props: GroupProps, emitter: &SignalEmitter<'_>) -> Result<()> {
        let old = std::mem::replace(&mut self.props, props);
        if old.id != self.props.id {
            self.id_changed(emitter).await?;
        }
        if old.priority != self.props.priority {
            self.priority_changed(emitter).await?;
        }
        if old.selector != self.props.selector {
            self.selector_changed(emitter).await?;
        }
        if old.status != self.props.status {
            self.status_changed(emitter).await?;
        }
        Ok(())
    }
}

#[interface(name = "org.storage.mpathd1.PathGroup")]
impl PathGroupR0 {
    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Id(&self) -> u32 {
        self.props.id
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Priority(&self) -> u32 {
        self.props.priority
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Selector(&self) -> &str {
        &self.props.selector
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Status(&self) -> &str {
        &self.props.status
    }
}

pub struct PathR0 {
    props: PathProps,
}

impl PathR0 {
    pub fn new(props: PathProps) -> Self {
        PathR0 { props }
    }

    pub async fn update(&mut self, props: PathProps, emitter: &SignalEmitter<'_>) -> Result<()> {
        let old = std::mem::replace(&mut self.props, props);
        if old.name != self.props.name {
            self.name_changed(emitter).await?;
        }
        if old.status != self.props.status {
            self.status_changed(emitter).await?;
        }
        if old.block != self.props.block {
            self.block_changed(emitter).await?;
        }
        if old.multipath != self.props.multipath {
            self.multipath_changed(emitter).await?;
        }
        Ok(())
    }
}

#[interface(name = "org.storage.mpathd1.Path")]
impl PathR0 {
    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Name(&self) -> &str {
        &self.props.name
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Status(&self) -> &str {
        &self.props.status
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Block(&self) -> OwnedObjectPath {
        to_object_path(&self.props.block)
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Multipath(&self) -> OwnedObjectPath {
        to_object_path(&self.props.multipath)
    }
}
