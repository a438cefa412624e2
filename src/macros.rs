// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// Record a tree action for the bus adapter, logging it first.
macro_rules! push_action {
    ($actions:expr, $action:expr) => {{
        let action = $action;
        log::info!("{}", action);
        $actions.push(action);
    }};
}

/// Convert a string identity to a D-Bus object path. On failure, log and
/// return from the enclosing function.
#[cfg(feature = "dbus_enabled")]
macro_rules! object_path_or_return {
    ($path:expr) => {
        match zbus::zvariant::OwnedObjectPath::try_from($path.to_string()) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("{} is not a valid D-Bus object path: {}", $path, e);
                return;
            }
        }
    };
}
