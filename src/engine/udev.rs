// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! udev-related methods
use std::{
    collections::HashMap,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use libudev::EventType;

use crate::{
    engine::types::{
        BlockAction, BlockDevice, BlockEvent, DeviceRole, DM_MULTIPATH_DEVICE_PATH_PROPERTY,
        MPATH_DM_UUID_PREFIX,
    },
    mpath::{MpathError, MpathResult},
};

const ACTION_PROPERTY: &str = "ACTION";
const DEVNAME_PROPERTY: &str = "DEVNAME";
const DEVPATH_PROPERTY: &str = "DEVPATH";
const SYSFS_ROOT: &str = "/sys";
const DEVTYPE_PROPERTY: &str = "DEVTYPE";
const DEVTYPE_DISK: &str = "disk";

/// Make an enumerator for enumerating block devices. Return an error if there
/// was any udev-related error.
pub fn block_enumerator(context: &libudev::Context) -> libudev::Result<libudev::Enumerator> {
    let mut enumerator = libudev::Enumerator::new(context)?;
    enumerator.match_subsystem("block")?;
    Ok(enumerator)
}

/// Get a udev property with the given name for the given device.
/// Returns None if no udev property found for the given property name.
/// Returns an error if the value of the property can not be converted to
/// a string using the standard conversion for this OS.
pub fn get_udev_property<T>(device: &libudev::Device, property_name: T) -> Option<MpathResult<String>>
where
    T: AsRef<OsStr> + std::fmt::Display,
{
    device
        .property_value(&property_name)
        .map(|value| match value.to_str() {
            Some(value) => Ok(value.into()),
            None => Err(MpathError::Msg(format!(
                "Unable to convert udev property value with key {} belonging to device {} to a string",
                property_name,
                device.devnode().map_or("<unknown>".into(), |x| x.to_string_lossy().into_owned())
            ))),
        })
}

/// Returns true if udev indicates that the device is a multipath member
/// device, else false.
pub fn is_multipath_member(device: &libudev::Device) -> MpathResult<bool> {
    match get_udev_property(device, DM_MULTIPATH_DEVICE_PATH_PROPERTY) {
        None => Ok(false),
        Some(Ok(value)) => Ok(value == "1"),
        Some(Err(err)) => Err(err),
    }
}

/// Find the multipath map holding the block device at the given sysfs path
/// by reading the dm metadata of each of its holders.
pub fn multipath_holder(syspath: &Path) -> Option<String> {
    let holders = fs::read_dir(syspath.join("holders")).ok()?;
    holders.filter_map(|entry| entry.ok()).find_map(|entry| {
        let dm = entry.path().join("dm");
        let uuid = fs::read_to_string(dm.join("uuid")).ok()?;
        if !uuid.trim().starts_with(MPATH_DM_UUID_PREFIX) {
            return None;
        }
        fs::read_to_string(dm.join("name"))
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    })
}

/// The action of a udev event. The ACTION property carries every kernel
/// action; the libudev event type only distinguishes a few.
pub fn event_action(event: &libudev::Event) -> BlockAction {
    match get_udev_property(event.device(), ACTION_PROPERTY) {
        Some(Ok(action)) => BlockAction::from(action.as_str()),
        _ => match event.event_type() {
            EventType::Add => BlockAction::Add,
            EventType::Change => BlockAction::Change,
            EventType::Remove => BlockAction::Remove,
            _ => BlockAction::Unknown("unknown".to_string()),
        },
    }
}

/// Copy everything the reconciler needs out of a libudev device, which is
/// not Send. The kernel name comes from DEVNAME and the sysfs path from
/// DEVPATH.
pub fn block_device(device: &libudev::Device) -> MpathResult<BlockDevice> {
    let properties = device
        .properties()
        .filter_map(|p| match (p.name().to_str(), p.value().to_str()) {
            (Some(n), Some(v)) => Some((n.to_string(), v.to_string())),
            _ => None,
        })
        .collect::<HashMap<_, _>>();

    let name = properties
        .get(DEVNAME_PROPERTY)
        .and_then(|devname| Path::new(devname).file_name())
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| {
            MpathError::Msg(format!(
                "Block device {} has no usable {DEVNAME_PROPERTY} property",
                device
                    .devnode()
                    .map_or("<unknown>".into(), |x| x.to_string_lossy().into_owned())
            ))
        })?;

    let syspath = properties
        .get(DEVPATH_PROPERTY)
        .map(|devpath| PathBuf::from(format!("{SYSFS_ROOT}{devpath}")));
    let member_of = if is_multipath_member(device)? {
        syspath.as_deref().and_then(multipath_holder)
    } else {
        None
    };

    Ok(BlockDevice::new(&name)
        .with_properties(properties)
        .with_devnum(device.devnum())
        .with_member_of(member_of.as_deref()))
}

/// The reconciler events for one kernel event: one for the block object,
/// and for a whole-disk multipath member also one for its drive object.
pub fn block_events(action: BlockAction, device: BlockDevice, whole_disk: bool) -> Vec<BlockEvent> {
    let drive = (whole_disk && device.is_multipath_member())
        .then(|| BlockEvent::new(action.clone(), device.clone(), DeviceRole::Drive));
    let mut events = vec![BlockEvent::new(action, device, DeviceRole::Block)];
    events.extend(drive);
    events
}

/// Convert a udev event into reconciler events.
pub fn events_from_udev(event: &libudev::Event) -> MpathResult<Vec<BlockEvent>> {
    let device = event.device();
    let whole_disk = matches!(
        get_udev_property(device, DEVTYPE_PROPERTY),
        Some(Ok(ref devtype)) if devtype == DEVTYPE_DISK
    );
    Ok(block_events(event_action(event), block_device(device)?, whole_disk))
}

/// Convert an enumerated device into cold-plug "add" events.
pub fn events_from_enumerated(device: &libudev::Device) -> MpathResult<Vec<BlockEvent>> {
    let whole_disk = matches!(
        get_udev_property(device, DEVTYPE_PROPERTY),
        Some(Ok(ref devtype)) if devtype == DEVTYPE_DISK
    );
    Ok(block_events(BlockAction::Add, block_device(device)?, whole_disk))
}

#[cfg(test)]
mod tests {
    use std::{env, process};

    use super::*;

    #[test]
    fn drive_event_only_for_whole_disk_members() {
        let member = BlockDevice::member_path("sdb", "mpatha");
        let events = block_events(BlockAction::Add, member.clone(), true);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].role, DeviceRole::Block);
        assert_eq!(events[1].role, DeviceRole::Drive);

        assert_eq!(block_events(BlockAction::Add, member, false).len(), 1);
        assert_eq!(
            block_events(BlockAction::Change, BlockDevice::new("sda"), true).len(),
            1
        );
    }

    #[test]
    fn holder_lookup_requires_multipath_uuid() {
        let root = env::temp_dir().join(format!("mpathd-holders-{}", process::id()));
        let sdb = root.join("sdb");
        for (holder, uuid, name) in [
            ("dm-3", "LVM-xyz", "vg-lv"),
            ("dm-0", "mpath-3600001", "mpatha"),
        ] {
            let dm = sdb.join("holders").join(holder).join("dm");
            fs::create_dir_all(&dm).unwrap();
            fs::write(dm.join("uuid"), format!("{uuid}\n")).unwrap();
            fs::write(dm.join("name"), format!("{name}\n")).unwrap();
        }
        fs::create_dir_all(root.join("sdc").join("holders")).unwrap();

        assert_eq!(multipath_holder(&sdb).as_deref(), Some("mpatha"));
        assert_eq!(multipath_holder(&root.join("sdc")), None);
        assert_eq!(multipath_holder(&root.join("sdq")), None);

        fs::remove_dir_all(&root).unwrap();
    }
}
