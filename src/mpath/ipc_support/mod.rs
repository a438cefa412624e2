// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(feature = "dbus_enabled")]
mod dbus_support;
#[cfg(not(feature = "dbus_enabled"))]
mod no_support;

#[cfg(feature = "dbus_enabled")]
pub use dbus_support::setup;

#[cfg(not(feature = "dbus_enabled"))]
pub use no_support::setup;
