// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The cached view of all multipath maps on the host.

use std::{collections::HashSet, fmt::Debug, sync::Arc};

use devicemapper::Device;

use crate::{
    engine::types::{BlockDevice, PathGroupStatus, PathStatus},
    mpath::{MpathError, MpathResult},
};

pub use self::{
    multipathd::{MultipathdLibrary, DEFAULT_MULTIPATHD_TIMEOUT},
    sim::SimLibrary,
};

mod multipathd;
mod sim;

/// Group id the multipath library uses for a path whose group it does not
/// know. Such groups are never exported.
pub const UNKNOWN_GROUP_ID: u32 = 0;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub block_name: String,
    pub status: PathStatus,
    pub group_id: u32,
    /// "major:minor" of the block device, if the library reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_t: Option<String>,
}

impl PathRecord {
    /// The device number, parsed from `dev_t`.
    pub fn device(&self) -> Option<Device> {
        let (major, minor) = self.dev_t.as_deref()?.split_once(':')?;
        Some(Device {
            major: major.trim().parse().ok()?,
            minor: minor.trim().parse().ok()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PathGroupRecord {
    pub id: u32,
    pub priority: u32,
    pub selector: String,
    pub status: PathGroupStatus,
    pub paths: Vec<PathRecord>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MpathRecord {
    pub name: String,
    pub wwid: String,
    /// Kernel name of the dm node exposing the map, e.g. "dm-0".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_name: Option<String>,
    pub groups: Vec<PathGroupRecord>,
}

impl MpathRecord {
    fn paths(&self) -> impl Iterator<Item = &PathRecord> {
        self.groups.iter().flat_map(|g| g.paths.iter())
    }

    /// The groups that get exported: the reserved id is skipped, the first
    /// group with a given id wins, and a block device listed by more than
    /// one group only appears in the first.
    pub fn exported_groups(&self) -> Vec<PathGroupRecord> {
        let mut ids = HashSet::new();
        let mut claimed = HashSet::new();
        self.groups
            .iter()
            .filter(|g| g.id != UNKNOWN_GROUP_ID && ids.insert(g.id))
            .map(|g| {
                let mut group = g.clone();
                group
                    .paths
                    .retain(|p| !p.block_name.is_empty() && claimed.insert(p.block_name.clone()));
                group
            })
            .collect()
    }

    /// The id of the exported group holding the named block device.
    pub fn group_of(&self, block_name: &str) -> Option<u32> {
        self.exported_groups()
            .into_iter()
            .find(|g| g.paths.iter().any(|p| p.block_name == block_name))
            .map(|g| g.id)
    }

    /// True if any group, exportable or not, lists the named block device.
    pub fn has_member(&self, block_name: &str) -> bool {
        self.paths().any(|p| p.block_name == block_name)
    }

    pub fn has_device(&self, device: Device) -> bool {
        self.paths().any(|p| p.device() == Some(device))
    }
}

/// The external library that reads multipath topology.
pub trait MultipathLibrary: Debug + Send + Sync {
    /// Check that the library can be reached at all.
    fn probe(&self) -> MpathResult<()>;

    /// Read every multipath map on the host. The result is owned by the
    /// caller.
    fn query(&self) -> MpathResult<Vec<MpathRecord>>;
}

/// Exactly one set of records is live at any time; a refresh replaces it
/// wholesale and a failed refresh leaves it untouched.
#[derive(Debug)]
pub struct Snapshot {
    library: Arc<dyn MultipathLibrary>,
    records: Vec<MpathRecord>,
    refreshes: u64,
}

impl Snapshot {
    /// Open a snapshot and load the initial records.
    pub fn open(library: Arc<dyn MultipathLibrary>) -> MpathResult<Snapshot> {
        library.probe().map_err(|e| {
            MpathError::Chained(
                "Multipath library is unavailable".to_string(),
                Box::new(e),
            )
        })?;
        let records = library.query()?;
        Ok(Snapshot {
            library,
            records,
            refreshes: 0,
        })
    }

    /// A snapshot with no records yet, for when the library is not reachable
    /// at startup. The first refresh loads it.
    pub fn empty(library: Arc<dyn MultipathLibrary>) -> Snapshot {
        Snapshot {
            library,
            records: Vec::new(),
            refreshes: 0,
        }
    }

    /// Replace the cached records with a fresh read from the library.
    pub fn refresh(&mut self) -> MpathResult<&[MpathRecord]> {
        let records = self.library.query()?;
        self.refreshes += 1;
        self.records.clear();
        self.records = records;
        Ok(&self.records)
    }

    pub fn records(&self) -> &[MpathRecord] {
        &self.records
    }

    /// Number of successful refreshes since the snapshot was opened.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }

    pub fn find_by_name(&self, name: &str) -> Option<&MpathRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// The first map listing the block device among its paths, by kernel
    /// name or else by device number.
    pub fn find_by_member(&self, device: &BlockDevice) -> Option<&MpathRecord> {
        self.records
            .iter()
            .find(|r| r.has_member(device.name()))
            .or_else(|| {
                let devnum = device.device()?;
                self.records.iter().find(|r| r.has_device(devnum))
            })
    }

    pub fn close(self) {
        debug!(
            "Closing multipath snapshot with {} records after {} refreshes",
            self.records.len(),
            self.refreshes
        );
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn path(block_name: &str, group_id: u32) -> PathRecord {
        PathRecord {
            block_name: block_name.to_string(),
            status: PathStatus::Ready,
            group_id,
            dev_t: None,
        }
    }

    pub fn group(
        id: u32,
        priority: u32,
        status: PathGroupStatus,
        paths: &[&str],
    ) -> PathGroupRecord {
        PathGroupRecord {
            id,
            priority,
            selector: "round-robin 0".to_string(),
            status,
            paths: paths.iter().map(|p| path(p, id)).collect(),
        }
    }

    pub fn record(name: &str, wwid: &str, groups: Vec<PathGroupRecord>) -> MpathRecord {
        MpathRecord {
            name: name.to_string(),
            wwid: wwid.to_string(),
            kernel_name: None,
            groups,
        }
    }

    #[test]
    fn failed_refresh_keeps_previous_records() {
        let sim = SimLibrary::new(vec![record(
            "mpatha",
            "3600001",
            vec![group(1, 50, PathGroupStatus::Active, &["sdb", "sdc"])],
        )]);
        let mut snapshot = Snapshot::open(Arc::new(sim.clone())).unwrap();
        assert_eq!(snapshot.records().len(), 1);

        sim.set_failing(true);
        assert_matches!(snapshot.refresh(), Err(MpathError::SnapshotUnavailable(_)));
        assert_eq!(snapshot.refresh_count(), 0);
        assert!(snapshot.find_by_name("mpatha").is_some());

        sim.set_failing(false);
        sim.set_records(vec![]);
        assert_eq!(snapshot.refresh().unwrap().len(), 0);
        assert_eq!(snapshot.refresh_count(), 1);
        assert!(snapshot.find_by_name("mpatha").is_none());
    }

    #[test]
    fn lookups_do_not_refresh() {
        let sim = SimLibrary::new(vec![record(
            "mpatha",
            "3600001",
            vec![
                group(1, 50, PathGroupStatus::Active, &["sdb"]),
                group(2, 10, PathGroupStatus::Enabled, &["sdc"]),
            ],
        )]);
        let snapshot = Snapshot::open(Arc::new(sim.clone())).unwrap();
        let queries = sim.query_count();

        let rec = snapshot.find_by_member(&BlockDevice::new("sdc")).unwrap();
        assert_eq!(rec.name, "mpatha");
        assert_eq!(rec.group_of("sdc"), Some(2));
        assert_eq!(snapshot.find_by_member(&BlockDevice::new("sdq")), None);
        assert_eq!(sim.query_count(), queries);
        snapshot.close();
    }

    #[test]
    fn member_found_by_device_number() {
        let mut rec = record(
            "mpatha",
            "3600001",
            vec![group(1, 50, PathGroupStatus::Active, &["sdb"])],
        );
        rec.groups[0].paths[0].dev_t = Some("8:16".to_string());
        let snapshot = Snapshot::open(Arc::new(SimLibrary::new(vec![rec]))).unwrap();

        let renamed = BlockDevice::new("sdx").with_devnum(Some(libc::makedev(8, 16)));
        assert_eq!(
            snapshot.find_by_member(&renamed).map(|r| r.name.as_str()),
            Some("mpatha")
        );
        let other = BlockDevice::new("sdy").with_devnum(Some(libc::makedev(8, 32)));
        assert_eq!(snapshot.find_by_member(&other), None);
    }

    #[test]
    fn unknown_group_is_skipped_by_group_of() {
        let rec = record(
            "mpatha",
            "3600001",
            vec![
                group(0, 0, PathGroupStatus::Unknown, &["sdb", "sdc"]),
                group(2, 10, PathGroupStatus::Enabled, &["sdb"]),
                group(3, 10, PathGroupStatus::Enabled, &["sdb"]),
            ],
        );
        assert_eq!(rec.group_of("sdb"), Some(2));
        assert_eq!(rec.group_of("sdc"), None);
        assert!(rec.has_member("sdc"));
        assert_eq!(path("sdb", 2).device(), None);
    }
}
