// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Multipath back-references attached to block and drive objects.

use zbus::{interface, object_server::SignalEmitter, zvariant::OwnedObjectPath, Result};

use crate::{
    dbus::util::to_object_path,
    engine::{BlockMultipathProps, DriveMultipathProps},
};

pub struct BlockMultipathR0 {
    props: BlockMultipathProps,
}

impl BlockMultipathR0 {
    pub fn new(props: BlockMultipathProps) -> Self {
        BlockMultipathR0 { props }
    }

    pub async fn update(
        &mut self,
        props: BlockMultipathProps,
        emitter: &SignalEmitter<'_>,
    ) -> Result<()> {
        let old = std::mem::replace(&mut self.props, props);
        if old.multipath != self.props.multipath {
            self.multipath_changed(emitter).await?;
        }
        if old.path != self.props.path {
            self.path_changed(emitter).await?;
        }
        Ok(())
    }
}

#[interface(name = "org.storage.mpathd1.Block.Multipath")]
impl BlockMultipathR0 {
    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Multipath(&self) -> OwnedObjectPath {
        to_object_path(&self.props.multipath)
    }

    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Path(&self) -> OwnedObjectPath {
        to_object_path(&self.props.path)
    }
}

pub struct DriveMultipathR0 {
    props: DriveMultipathProps,
}

impl DriveMultipathR0 {
    pub fn new(props: DriveMultipathProps) -> Self {
        DriveMultipathR0 { props }
    }

    pub async fn update(
        &mut self,
        props: DriveMultipathProps,
        emitter: &SignalEmitter<'_>,
    ) -> Result<()> {
        if self.props != props {
            self.props = props;
            self.multipath_changed(emitter).await?;
        }
        Ok(())
    }
}

#[interface(name = "org.storage.mpathd1.Drive.Multipath")]
impl DriveMultipathR0 {
    #[zbus(property)]
    #[allow(non_snake_case)]
    fn Multipath(&self) -> OwnedObjectPath {
        to_object_path(&self.props.multipath)
    }
}
