// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Conditionally compiled support for a D-Bus interface.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    dbus::create_dbus_handlers,
    engine::{MultipathLibrary, TreeAction},
    mpath::errors::MpathResult,
};

/// Connect to the system bus and apply tree actions until the channel
/// from the reconciler is shut or the bus fails.
pub async fn setup(
    library: Arc<dyn MultipathLibrary>,
    receiver: UnboundedReceiver<TreeAction>,
) -> MpathResult<()> {
    let mut tree = create_dbus_handlers(library, receiver).await?;
    info!("D-Bus API is available");

    loop {
        if let Err(e) = tree.process_tree_actions().await {
            error!("Failed to apply multipath tree changes to D-Bus: {e}; exiting D-Bus thread");
            return Err(e);
        }
    }
}
