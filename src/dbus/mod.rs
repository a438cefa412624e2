// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use zbus::{connection::Builder, fdo::ObjectManager};

use crate::{
    dbus::{manager::ManagerR0, tree::TreeHandler},
    engine::{MultipathLibrary, TreeAction, OBJECT_ROOT},
    mpath::MpathResult,
};

mod block;
mod consts;
mod manager;
mod multipath;
mod tree;
mod types;
mod util;

/// Claim the service name and serve the manager and the object manager at
/// the root. The returned handler publishes everything below it.
pub async fn create_dbus_handlers(
    library: Arc<dyn MultipathLibrary>,
    receiver: UnboundedReceiver<TreeAction>,
) -> MpathResult<TreeHandler> {
    let manager = ManagerR0::new(library);

    let connection = Arc::new(
        Builder::system()?
            .serve_at(OBJECT_ROOT, manager)?
            .serve_at(OBJECT_ROOT, ObjectManager)?
            .name(consts::MPATHD_BASE_SERVICE)?
            .build()
            .await?,
    );
    Ok(TreeHandler::new(connection, receiver))
}
