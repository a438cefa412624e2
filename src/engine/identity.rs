// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pure functions that derive object identities from domain keys. The same
//! keys always give byte-identical identities; the reconciler never parses
//! them back.

use std::fmt::Write;

use crate::engine::snapshot::UNKNOWN_GROUP_ID;

/// Root of every object this service exports.
pub const OBJECT_ROOT: &str = "/org/storage/mpathd1";

/// The identity published in a reference that points at nothing.
pub const NO_OBJECT: &str = "/";

const MULTIPATH_ELEMENT: &str = "Multipath";
const BLOCK_DEVICES_ELEMENT: &str = "block_devices";
const DRIVES_ELEMENT: &str = "drives";

/// Escape a caller-supplied string for use inside an object path element.
/// ASCII alphanumerics are kept, every other byte becomes "_xx".
pub fn escape_element(value: &str) -> String {
    value.bytes().fold(String::with_capacity(value.len()), |mut acc, b| {
        if b.is_ascii_alphanumeric() {
            acc.push(char::from(b));
        } else {
            // Writing to a String cannot fail.
            let _ = write!(acc, "_{b:02x}");
        }
        acc
    })
}

/// Identity of a multipath map: "<root>/Multipath/<name>_<wwid>".
///
/// An escaped element never contains "__". A name that needed escaping is
/// joined to the wwid with "__", so its last escape can not run into the
/// wwid; a plain alphanumeric name ends at the first "_".
pub fn map_path(name: &str, wwid: &str) -> Option<String> {
    if name.is_empty() || wwid.is_empty() {
        return None;
    }
    let name = escape_element(name);
    let separator = if name.contains('_') { "__" } else { "_" };
    Some(format!(
        "{OBJECT_ROOT}/{MULTIPATH_ELEMENT}/{name}{separator}{}",
        escape_element(wwid)
    ))
}

/// Identity of a path group: "<map_path>/path_group_<id>".
pub fn group_path(map_path: &str, group_id: u32) -> Option<String> {
    if map_path.is_empty() || group_id == UNKNOWN_GROUP_ID {
        return None;
    }
    Some(format!("{map_path}/path_group_{group_id}"))
}

/// Identity of a path: "<group_path>/path_<block_name>".
pub fn path_path(group_path: &str, block_name: &str) -> Option<String> {
    if group_path.is_empty() || block_name.is_empty() {
        return None;
    }
    Some(format!("{group_path}/path_{}", escape_element(block_name)))
}

/// Identity of the block object for the kernel block device with the given
/// name, e.g. "sdb" or "dm-0".
pub fn block_object_path(kernel_name: &str) -> String {
    format!(
        "{OBJECT_ROOT}/{BLOCK_DEVICES_ELEMENT}/{}",
        escape_element(kernel_name)
    )
}

/// Identity of the drive object with the given drive identifier.
pub fn drive_object_path(drive_id: &str) -> String {
    format!("{OBJECT_ROOT}/{DRIVES_ELEMENT}/{}", escape_element(drive_id))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn literal_identities() {
        let map = map_path("mpatha", "3600001").unwrap();
        assert_eq!(map, "/org/storage/mpathd1/Multipath/mpatha_3600001");
        let group = group_path(&map, 1).unwrap();
        assert_eq!(group, format!("{map}/path_group_1"));
        assert_eq!(
            path_path(&group, "sdb").unwrap(),
            format!("{group}/path_sdb")
        );
        assert_eq!(
            block_object_path("dm-0"),
            "/org/storage/mpathd1/block_devices/dm_2d0"
        );
    }

    #[test]
    fn escaped_name_does_not_run_into_wwid() {
        let first = map_path("a_", "5fc").unwrap();
        let second = map_path("a", "5f_c").unwrap();
        assert_ne!(first, second);
        assert_eq!(first, "/org/storage/mpathd1/Multipath/a_5f__5fc");
        assert_eq!(second, "/org/storage/mpathd1/Multipath/a_5f_5fc");
        assert_eq!(
            map_path("mpath-a", "36001").unwrap(),
            "/org/storage/mpathd1/Multipath/mpath_2da__36001"
        );
    }

    #[test]
    fn invalid_keys() {
        assert_eq!(map_path("mpatha", ""), None);
        assert_eq!(map_path("", "3600001"), None);
        assert_eq!(group_path("/a", 0), None);
        assert_eq!(group_path("", 3), None);
        assert_eq!(path_path("/a", ""), None);
    }

    proptest! {
        #[test]
        fn identities_are_deterministic(
            name in "[a-z][a-z0-9._-]{0,15}",
            wwid in "[0-9a-f:]{1,32}",
            group_id in 1u32..64,
            block in "(sd|nvme|dm-)[a-z0-9]{1,4}",
        ) {
            let first = map_path(&name, &wwid).unwrap();
            let second = map_path(&name.clone(), &wwid.clone()).unwrap();
            prop_assert_eq!(&first, &second);

            let group = group_path(&first, group_id).unwrap();
            prop_assert_eq!(&group, &group_path(&second, group_id).unwrap());
            prop_assert_eq!(path_path(&group, &block), path_path(&group, &block));

            // Every identity must be usable as a D-Bus object path.
            let path = path_path(&group, &block).unwrap();
            prop_assert!(path
                .split('/')
                .skip(1)
                .all(|e| !e.is_empty() && e.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')));
        }

        #[test]
        fn escape_is_injective(a in ".{0,12}", b in ".{0,12}") {
            prop_assume!(a != b);
            prop_assert_ne!(escape_element(&a), escape_element(&b));
        }

        #[test]
        fn map_path_is_injective(
            first in ("[a5fc_.-]{1,6}", "[a5fc_:]{1,6}"),
            second in ("[a5fc_.-]{1,6}", "[a5fc_:]{1,6}"),
        ) {
            prop_assume!(first != second);
            prop_assert_ne!(
                map_path(&first.0, &first.1).unwrap(),
                map_path(&second.0, &second.1).unwrap()
            );
        }
    }
}
