// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tokio::task::spawn_blocking;
use zbus::zvariant::OwnedObjectPath;

use crate::{
    dbus::{
        consts::OK_STRING,
        types::DbusErrorEnum,
        util::{engine_to_dbus_err_tuple, to_object_path},
    },
    engine::{list_all_maps, MultipathLibrary},
    mpath::{MpathResult, VERSION},
};

pub fn version_prop() -> &'static str {
    VERSION
}

async fn map_identities(library: Arc<dyn MultipathLibrary>) -> MpathResult<Vec<String>> {
    spawn_blocking(move || list_all_maps(library)).await?
}

/// Take a fresh snapshot, independent of the reconciler's, and return the
/// identity of every map in it.
pub async fn get_all_multipaths_method(
    library: &Arc<dyn MultipathLibrary>,
) -> (Vec<OwnedObjectPath>, u16, String) {
    let default_return = Vec::new();

    match map_identities(Arc::clone(library)).await {
        Ok(identities) => (
            identities.iter().map(|i| to_object_path(i)).collect(),
            DbusErrorEnum::OK as u16,
            OK_STRING.to_string(),
        ),
        Err(e) => {
            warn!("Failed to list multipath maps: {e}");
            let (rc, rs) = engine_to_dbus_err_tuple(&e);
            (default_return, rc, rs)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{
        identity::map_path, MpathRecord, PathGroupRecord, PathGroupStatus, PathRecord,
        PathStatus, SimLibrary,
    };

    use super::*;

    fn record(name: &str, wwid: &str) -> MpathRecord {
        MpathRecord {
            name: name.to_string(),
            wwid: wwid.to_string(),
            kernel_name: Some("dm-0".to_string()),
            groups: vec![PathGroupRecord {
                id: 1,
                priority: 50,
                selector: "service-time 0".to_string(),
                status: PathGroupStatus::Active,
                paths: vec![PathRecord {
                    block_name: "sda".to_string(),
                    status: PathStatus::Ready,
                    group_id: 1,
                    dev_t: None,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn lists_every_map() {
        let library: Arc<dyn MultipathLibrary> = Arc::new(SimLibrary::new(vec![
            record("mpatha", "3600a"),
            record("mpathb", "3600b"),
        ]));

        let (paths, rc, rs) = get_all_multipaths_method(&library).await;
        assert_eq!(rc, DbusErrorEnum::OK as u16);
        assert_eq!(rs, OK_STRING);
        let mut paths = paths
            .iter()
            .map(|p| p.as_str().to_string())
            .collect::<Vec<_>>();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                map_path("mpatha", "3600a").unwrap(),
                map_path("mpathb", "3600b").unwrap()
            ]
        );
    }

    #[tokio::test]
    async fn empty_snapshot_lists_nothing() {
        let library: Arc<dyn MultipathLibrary> = Arc::new(SimLibrary::new(Vec::new()));
        let (paths, rc, _) = get_all_multipaths_method(&library).await;
        assert!(paths.is_empty());
        assert_eq!(rc, DbusErrorEnum::OK as u16);
    }

    #[tokio::test]
    async fn snapshot_failure_is_reported() {
        let sim = SimLibrary::new(vec![record("mpatha", "3600a")]);
        sim.set_failing(true);
        let library: Arc<dyn MultipathLibrary> = Arc::new(sim);
        let (paths, rc, rs) = get_all_multipaths_method(&library).await;
        assert!(paths.is_empty());
        assert_eq!(rc, DbusErrorEnum::SNAPSHOT_UNAVAILABLE as u16);
        assert!(!rs.is_empty());
    }

    #[tokio::test]
    async fn record_without_wwid_is_reported() {
        let library: Arc<dyn MultipathLibrary> =
            Arc::new(SimLibrary::new(vec![record("mpatha", "")]));
        let (_, rc, _) = get_all_multipaths_method(&library).await;
        assert_eq!(rc, DbusErrorEnum::INVALID_RECORD as u16);
    }
}
