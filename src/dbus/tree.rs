// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use zbus::{zvariant::OwnedObjectPath, Connection};

use crate::{
    dbus::{
        block::{BlockMultipathR0, DriveMultipathR0},
        multipath::{MultipathR0, PathGroupR0, PathR0},
    },
    engine::{ObjectKind, ObjectProps, TreeAction},
    mpath::{MpathError, MpathResult},
};

/// Register the interface at the path, or if it is already there, update
/// it in place and signal each changed property.
macro_rules! publish {
    ($connection:expr, $path:expr, $iface:ty, $props:expr) => {{
        let server = $connection.object_server();
        match server.interface::<_, $iface>($path).await {
            Ok(iface_ref) => {
                let mut iface = iface_ref.get_mut().await;
                iface.update($props, iface_ref.signal_emitter()).await
            }
            Err(_) => server.at($path, <$iface>::new($props)).await.map(|_| ()),
        }
    }};
}

/// Applies the reconciler's tree actions to the object server, in the order
/// they were made.
pub struct TreeHandler {
    connection: Arc<Connection>,
    receiver: UnboundedReceiver<TreeAction>,
}

impl TreeHandler {
    pub fn new(connection: Arc<Connection>, receiver: UnboundedReceiver<TreeAction>) -> Self {
        TreeHandler {
            connection,
            receiver,
        }
    }

    pub async fn process_tree_actions(&mut self) -> MpathResult<()> {
        let mut actions = Vec::new();
        actions.push(self.receiver.recv().await.ok_or_else(|| {
            MpathError::Msg("Channel from reconciler to the tree handler was shut".to_string())
        })?);

        while let Ok(action) = self.receiver.try_recv() {
            actions.push(action);
        }

        for action in actions {
            self.handle_action(action).await;
        }
        Ok(())
    }

    async fn handle_action(&self, action: TreeAction) {
        let path = object_path_or_return!(action.object_path());
        if let Err(e) = self.apply(&path, &action).await {
            warn!("Failed to publish \"{action}\" on D-Bus: {e}");
        }
    }

    async fn apply(&self, path: &OwnedObjectPath, action: &TreeAction) -> zbus::Result<()> {
        let server = self.connection.object_server();
        match action {
            TreeAction::Export(_, props) | TreeAction::Change(_, props) => match props {
                ObjectProps::Map(props) => {
                    publish!(self.connection, path, MultipathR0, props.clone())
                }
                ObjectProps::Group(props) => {
                    publish!(self.connection, path, PathGroupR0, props.clone())
                }
                ObjectProps::Path(props) => publish!(self.connection, path, PathR0, props.clone()),
            },
            TreeAction::Unexport(_, kind) => {
                let removed = match kind {
                    ObjectKind::Map => server.remove::<MultipathR0, _>(path).await?,
                    ObjectKind::Group => server.remove::<PathGroupR0, _>(path).await?,
                    ObjectKind::Path => server.remove::<PathR0, _>(path).await?,
                };
                if !removed {
                    debug!("No {kind} interface was registered at {path}");
                }
                Ok(())
            }
            TreeAction::SetBlockMultipath(_, props) => {
                publish!(self.connection, path, BlockMultipathR0, props.clone())
            }
            TreeAction::UnsetBlockMultipath(_) => {
                server.remove::<BlockMultipathR0, _>(path).await?;
                Ok(())
            }
            TreeAction::SetDriveMultipath(_, props) => {
                publish!(self.connection, path, DriveMultipathR0, props.clone())
            }
            TreeAction::UnsetDriveMultipath(_) => {
                server.remove::<DriveMultipathR0, _>(path).await?;
                Ok(())
            }
        }
    }
}
