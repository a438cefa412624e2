// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use zbus::zvariant::OwnedObjectPath;

use crate::{
    dbus::types::DbusErrorEnum,
    engine::NO_OBJECT,
    mpath::MpathError,
};

/// Translates an engine error to the (errorcode, string) tuple that mpathd
/// D-Bus methods return.
pub fn engine_to_dbus_err_tuple(err: &MpathError) -> (u16, String) {
    let rc = match err {
        MpathError::InvalidRecord(_) => DbusErrorEnum::INVALID_RECORD,
        err if err.is_snapshot_unavailable() => DbusErrorEnum::SNAPSHOT_UNAVAILABLE,
        _ => DbusErrorEnum::ERROR,
    };
    (rc as u16, err.to_string())
}

/// Convert an identity to an object path property value. Identities are
/// built from escaped elements, so the fallback only covers corrupt input.
pub fn to_object_path(identity: &str) -> OwnedObjectPath {
    OwnedObjectPath::try_from(identity.to_string()).unwrap_or_else(|e| {
        warn!("{identity} is not a valid D-Bus object path: {e}; publishing {NO_OBJECT}");
        OwnedObjectPath::default()
    })
}
