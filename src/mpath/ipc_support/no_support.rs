// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    engine::{MultipathLibrary, TreeAction},
    mpath::errors::{MpathError, MpathResult},
};

/// Without a bus there is nowhere to publish the tree; drain the actions so
/// that the reconciler keeps running.
pub async fn setup(
    _library: Arc<dyn MultipathLibrary>,
    mut receiver: UnboundedReceiver<TreeAction>,
) -> MpathResult<()> {
    info!("mpathd was built without D-Bus support; the multipath tree is not published");
    while let Some(action) = receiver.recv().await {
        trace!("Not published: {action}");
    }
    Err(MpathError::Msg(
        "Channel from reconciler to the tree handler was shut".to_string(),
    ))
}
