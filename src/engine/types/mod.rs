// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    str::FromStr,
};

use devicemapper::Device;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{AsRefStr, EnumString};

pub use crate::engine::types::actions::{ObjectKind, ObjectProps, TreeAction};

mod actions;

/// udev property naming the device-mapper device a block device exposes.
pub const DM_NAME_PROPERTY: &str = "DM_NAME";
/// udev property holding the device-mapper UUID; multipath maps use the
/// prefix "mpath-".
pub const DM_UUID_PROPERTY: &str = "DM_UUID";
/// udev property set to "1" by the multipath rules on member paths.
pub const DM_MULTIPATH_DEVICE_PATH_PROPERTY: &str = "DM_MULTIPATH_DEVICE_PATH";
pub const ID_SERIAL_PROPERTY: &str = "ID_SERIAL";
pub const ID_WWN_PROPERTY: &str = "ID_WWN";

pub const MPATH_DM_UUID_PREFIX: &str = "mpath-";

/// The kernel event actions delivered for a block device.
#[derive(Clone, Debug, Eq, PartialEq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum BlockAction {
    Add,
    Change,
    Online,
    Offline,
    Remove,
    #[strum(default)]
    Unknown(String),
}

impl BlockAction {
    pub fn as_str(&self) -> &str {
        match self {
            BlockAction::Add => "add",
            BlockAction::Change => "change",
            BlockAction::Online => "online",
            BlockAction::Offline => "offline",
            BlockAction::Remove => "remove",
            BlockAction::Unknown(s) => s,
        }
    }

    /// Every action except "add" forces the snapshot to be refreshed before
    /// the graph is touched.
    pub fn requires_refresh(&self) -> bool {
        matches!(
            self,
            BlockAction::Change | BlockAction::Online | BlockAction::Offline | BlockAction::Remove
        )
    }
}

impl<'a> From<&'a str> for BlockAction {
    fn from(s: &'a str) -> BlockAction {
        BlockAction::from_str(s).unwrap_or_else(|_| BlockAction::Unknown(s.to_string()))
    }
}

impl Display for BlockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the object triggering an event is a block object (a map's dm
/// node or a member path) or a drive object.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, AsRefStr)]
pub enum DeviceRole {
    Block,
    Drive,
}

/// Key of a multipath map in the exported tree.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct MapKey {
    pub name: String,
    pub wwid: String,
}

impl MapKey {
    pub fn new(name: &str, wwid: &str) -> MapKey {
        MapKey {
            name: name.to_string(),
            wwid: wwid.to_string(),
        }
    }
}

impl Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.wwid)
    }
}

macro_rules! status {
    (
        $(#[$meta:meta])*
        $vis:vis enum $ident:ident {
            $($variant:ident => $display:literal $(| $alias:literal)*,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, EnumString)]
        $vis enum $ident {
            $(
                #[strum(serialize = $display $(, serialize = $alias)*)]
                $variant,
            )*
            #[strum(default)]
            Other(String),
        }

        impl $ident {
            pub fn as_str(&self) -> &str {
                match self {
                    $($ident::$variant => $display,)*
                    $ident::Other(s) => s,
                }
            }
        }

        impl<'a> From<&'a str> for $ident {
            fn from(s: &'a str) -> $ident {
                $ident::from_str(s).unwrap_or_else(|_| $ident::Other(s.to_string()))
            }
        }

        impl Display for $ident {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl Serialize for $ident {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ident {
            fn deserialize<D>(deserializer: D) -> Result<$ident, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Ok($ident::from(s.as_str()))
            }
        }
    };
}

status! {
    /// Device-mapper state of a path group as reported by multipathd.
    /// Strings that are not recognized are carried through unchanged.
    pub enum PathGroupStatus {
        Active => "active",
        Enabled => "enabled",
        Disabled => "disabled",
        Unknown => "unknown" | "undef",
    }
}

status! {
    /// Checker state of a path as reported by multipathd.
    /// Strings that are not recognized are carried through unchanged.
    pub enum PathStatus {
        Ready => "ready" | "up",
        Faulty => "faulty" | "down",
        Shaky => "shaky",
        Ghost => "ghost",
        Pending => "i/o pending" | "pending",
        Timeout => "i/o timeout" | "timeout",
        Delayed => "delayed",
        Unknown => "unknown" | "undef",
    }
}

/// A sendable description of a kernel block device with everything the
/// reconciler needs to process an event on it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockDevice {
    name: String,
    device: Option<Device>,
    properties: HashMap<String, String>,
    member_of: Option<String>,
}

impl BlockDevice {
    /// A device with the given kernel name, e.g. "sdb" or "dm-0".
    pub fn new(name: &str) -> BlockDevice {
        BlockDevice {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// The dm node of a multipath map.
    pub fn map_node(kernel_name: &str, map_name: &str, wwid: &str) -> BlockDevice {
        BlockDevice::new(kernel_name)
            .with_property(DM_NAME_PROPERTY, map_name)
            .with_property(DM_UUID_PROPERTY, &format!("{MPATH_DM_UUID_PREFIX}{wwid}"))
    }

    /// A SCSI path that the kernel lists as a slave of the named map.
    pub fn member_path(kernel_name: &str, map_name: &str) -> BlockDevice {
        BlockDevice::new(kernel_name)
            .with_property(DM_MULTIPATH_DEVICE_PATH_PROPERTY, "1")
            .with_member_of(Some(map_name))
    }

    pub fn with_property(mut self, name: &str, value: &str) -> BlockDevice {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_properties(mut self, properties: HashMap<String, String>) -> BlockDevice {
        self.properties.extend(properties);
        self
    }

    pub fn with_devnum(mut self, devnum: Option<libc::dev_t>) -> BlockDevice {
        self.device = devnum.map(Device::from);
        self
    }

    pub fn with_member_of(mut self, map_name: Option<&str>) -> BlockDevice {
        self.member_of = map_name.map(|s| s.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The kernel device number, if udev reported one.
    pub fn device(&self) -> Option<Device> {
        self.device
    }

    pub fn property_value(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(|s| s.as_str())
    }

    /// Name of the multipath map holding this device, as read from the
    /// kernel's holder metadata.
    pub fn member_of(&self) -> Option<&str> {
        self.member_of.as_deref()
    }

    /// The device-mapper name, if the device is a dm device of any kind.
    pub fn dm_name(&self) -> Option<&str> {
        self.property_value(DM_NAME_PROPERTY)
            .filter(|name| !name.is_empty())
    }

    /// The multipath map name if this device is the dm node of a multipath
    /// map. A dm device whose DM_UUID is known and lacks the multipath
    /// prefix (LVM volumes, partitions of a map) is not a map.
    pub fn map_name(&self) -> Option<&str> {
        let name = self.dm_name()?;
        match self.property_value(DM_UUID_PROPERTY) {
            Some(uuid) if !uuid.is_empty() && !uuid.starts_with(MPATH_DM_UUID_PREFIX) => None,
            _ => Some(name),
        }
    }

    /// True if udev flagged this device as a multipath member path.
    pub fn is_multipath_member(&self) -> bool {
        self.property_value(DM_MULTIPATH_DEVICE_PATH_PROPERTY) == Some("1")
            || self.member_of.is_some()
    }

    /// A stable identifier of the drive this device belongs to.
    pub fn drive_id(&self) -> &str {
        self.property_value(ID_SERIAL_PROPERTY)
            .or_else(|| self.property_value(ID_WWN_PROPERTY))
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.name)
    }
}

/// A kernel event on a block device, ready to be handed to the reconciler.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockEvent {
    pub action: BlockAction,
    pub device: BlockDevice,
    pub role: DeviceRole,
    /// True if the reconciler generated this event itself rather than
    /// receiving it from the kernel.
    pub synthetic: bool,
}

impl BlockEvent {
    pub fn new(action: BlockAction, device: BlockDevice, role: DeviceRole) -> BlockEvent {
        BlockEvent {
            action,
            device,
            role,
            synthetic: false,
        }
    }

    pub fn block(action: BlockAction, device: BlockDevice) -> BlockEvent {
        BlockEvent::new(action, device, DeviceRole::Block)
    }

    pub fn drive(action: BlockAction, device: BlockDevice) -> BlockEvent {
        BlockEvent::new(action, device, DeviceRole::Drive)
    }

    pub fn synthesized_add(device: BlockDevice) -> BlockEvent {
        BlockEvent {
            action: BlockAction::Add,
            device,
            role: DeviceRole::Block,
            synthetic: true,
        }
    }
}

impl Display for BlockEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on {}{}{}",
            self.action,
            self.role.as_ref().to_lowercase(),
            self.device.name(),
            self.device
                .device()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default(),
            if self.synthetic { " (synthesized)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_actions() {
        assert_eq!(BlockAction::from("add"), BlockAction::Add);
        assert_eq!(BlockAction::from("offline"), BlockAction::Offline);
        assert_eq!(
            BlockAction::from("bind"),
            BlockAction::Unknown("bind".to_string())
        );
        assert_eq!(BlockAction::from("bind").to_string(), "bind");
        assert!(!BlockAction::Add.requires_refresh());
        assert!(BlockAction::Remove.requires_refresh());
        assert!(!BlockAction::Unknown("move".to_string()).requires_refresh());
    }

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(PathStatus::from("up"), PathStatus::Ready);
        assert_eq!(PathStatus::from("i/o pending").to_string(), "i/o pending");
        assert_eq!(PathGroupStatus::from("undef").to_string(), "unknown");
        assert_eq!(
            PathStatus::from("disconnected"),
            PathStatus::Other("disconnected".to_string())
        );
        assert_eq!(PathStatus::from("disconnected").to_string(), "disconnected");
    }

    #[test]
    fn map_name_requires_multipath_uuid() {
        let mpath = BlockDevice::map_node("dm-0", "mpatha", "3600a0b80");
        assert_eq!(mpath.map_name(), Some("mpatha"));

        let lvm = BlockDevice::new("dm-3")
            .with_property(DM_NAME_PROPERTY, "vg-root")
            .with_property(DM_UUID_PROPERTY, "LVM-abcdef");
        assert_eq!(lvm.dm_name(), Some("vg-root"));
        assert_eq!(lvm.map_name(), None);

        let no_uuid = BlockDevice::new("dm-1").with_property(DM_NAME_PROPERTY, "mpathb");
        assert_eq!(no_uuid.map_name(), Some("mpathb"));

        let empty = BlockDevice::new("dm-2").with_property(DM_NAME_PROPERTY, "");
        assert_eq!(empty.map_name(), None);
    }

    #[test]
    fn drive_id_falls_back_to_name() {
        let dev = BlockDevice::member_path("sdb", "mpatha");
        assert!(dev.is_multipath_member());
        assert_eq!(dev.drive_id(), "sdb");
        let dev = dev.with_property(ID_SERIAL_PROPERTY, "36001405abc");
        assert_eq!(dev.drive_id(), "36001405abc");
    }

    #[test]
    fn event_display_names_device_number() {
        let sdb = BlockDevice::member_path("sdb", "mpatha").with_devnum(Some(libc::makedev(8, 16)));
        assert_eq!(sdb.device(), Some(Device { major: 8, minor: 16 }));
        assert_eq!(
            BlockEvent::block(BlockAction::Remove, sdb).to_string(),
            "remove block on sdb (8:16)"
        );
        assert_eq!(
            BlockEvent::synthesized_add(BlockDevice::new("dm-0")).to_string(),
            "add block on dm-0 (synthesized)"
        );
    }
}
