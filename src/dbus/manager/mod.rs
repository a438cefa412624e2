// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use zbus::{interface, zvariant::OwnedObjectPath};

use crate::engine::MultipathLibrary;

mod methods;

use methods::{get_all_multipaths_method, version_prop};

pub struct ManagerR0 {
    library: Arc<dyn MultipathLibrary>,
}

impl ManagerR0 {
    pub fn new(library: Arc<dyn MultipathLibrary>) -> Self {
        ManagerR0 { library }
    }
}

#[interface(name = "org.storage.mpathd1.Manager.Multipath")]
impl ManagerR0 {
    #[allow(non_snake_case)]
    async fn GetAllMultipaths(&self) -> (Vec<OwnedObjectPath>, u16, String) {
        get_all_multipaths_method(&self.library).await
    }

    #[zbus(property(emits_changed_signal = "const"))]
    #[allow(non_snake_case)]
    #[allow(clippy::unused_self)]
    fn Version(&self) -> &str {
        version_prop()
    }
}
