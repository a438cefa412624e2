// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{error::Error, fmt, io, str};

pub type MpathResult<T> = Result<T, MpathError>;

#[derive(Debug)]
pub enum MpathError {
    Msg(String),
    Chained(String, Box<MpathError>),

    /// The multipath library could not produce a snapshot.
    SnapshotUnavailable(String),
    /// A multipath record is missing a field required to identify it.
    InvalidRecord(String),

    Io(io::Error),
    Nix(nix::Error),
    Utf8(str::Utf8Error),
    Serde(serde_json::error::Error),
    Udev(libudev::Error),
    Join(tokio::task::JoinError),

    #[cfg(feature = "dbus_enabled")]
    Dbus(zbus::Error),
    #[cfg(feature = "dbus_enabled")]
    Zvariant(zbus::zvariant::Error),
}

impl MpathError {
    /// True if this error, or any error it chains, is a snapshot failure.
    pub fn is_snapshot_unavailable(&self) -> bool {
        match self {
            MpathError::SnapshotUnavailable(_) => true,
            MpathError::Chained(_, err) => err.is_snapshot_unavailable(),
            _ => false,
        }
    }
}

impl fmt::Display for MpathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MpathError::Msg(s) => write!(f, "{s}"),
            MpathError::Chained(s, err) => write!(f, "{s}; caused by: {err}"),
            MpathError::SnapshotUnavailable(msg) => {
                write!(f, "Multipath snapshot unavailable: {msg}")
            }
            MpathError::InvalidRecord(msg) => write!(f, "Invalid multipath record: {msg}"),
            MpathError::Io(err) => write!(f, "IO error: {err}"),
            MpathError::Nix(err) => write!(f, "Nix error: {err}"),
            MpathError::Utf8(err) => write!(f, "Utf8 error: {err}"),
            MpathError::Serde(err) => write!(f, "Serde error: {err}"),
            MpathError::Udev(err) => write!(f, "Udev error: {err}"),
            MpathError::Join(err) => write!(f, "Thread joining error: {err}"),

            #[cfg(feature = "dbus_enabled")]
            MpathError::Dbus(err) => write!(f, "D-Bus error: {err}"),
            #[cfg(feature = "dbus_enabled")]
            MpathError::Zvariant(err) => write!(f, "D-Bus type error: {err}"),
        }
    }
}

impl Error for MpathError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MpathError::Msg(_)
            | MpathError::SnapshotUnavailable(_)
            | MpathError::InvalidRecord(_) => None,
            MpathError::Chained(_, err) => Some(err.as_ref()),
            MpathError::Io(err) => Some(err),
            MpathError::Nix(err) => Some(err),
            MpathError::Utf8(err) => Some(err),
            MpathError::Serde(err) => Some(err),
            MpathError::Udev(err) => Some(err),
            MpathError::Join(err) => Some(err),

            #[cfg(feature = "dbus_enabled")]
            MpathError::Dbus(err) => Some(err),
            #[cfg(feature = "dbus_enabled")]
            MpathError::Zvariant(err) => Some(err),
        }
    }
}

impl From<io::Error> for MpathError {
    fn from(err: io::Error) -> MpathError {
        MpathError::Io(err)
    }
}

impl From<nix::Error> for MpathError {
    fn from(err: nix::Error) -> MpathError {
        MpathError::Nix(err)
    }
}

impl From<str::Utf8Error> for MpathError {
    fn from(err: str::Utf8Error) -> MpathError {
        MpathError::Utf8(err)
    }
}

impl From<serde_json::error::Error> for MpathError {
    fn from(err: serde_json::error::Error) -> MpathError {
        MpathError::Serde(err)
    }
}

impl From<libudev::Error> for MpathError {
    fn from(err: libudev::Error) -> MpathError {
        MpathError::Udev(err)
    }
}

impl From<tokio::task::JoinError> for MpathError {
    fn from(err: tokio::task::JoinError) -> MpathError {
        MpathError::Join(err)
    }
}

#[cfg(feature = "dbus_enabled")]
impl From<zbus::Error> for MpathError {
    fn from(err: zbus::Error) -> MpathError {
        MpathError::Dbus(err)
    }
}

#[cfg(feature = "dbus_enabled")]
impl From<zbus::zvariant::Error> for MpathError {
    fn from(err: zbus::zvariant::Error) -> MpathError {
        MpathError::Zvariant(err)
    }
}
