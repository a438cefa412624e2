// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    engine::snapshot::{multipathd::parse_maps_reply, MpathRecord, MultipathLibrary},
    mpath::{MpathError, MpathResult},
};

#[derive(Debug, Default)]
struct SimState {
    records: Vec<MpathRecord>,
    failing: bool,
    queries: u64,
}

/// An in-memory multipath library. Clones share state, so a test can keep
/// a handle and change the topology under a running reconciler.
#[derive(Clone, Debug, Default)]
pub struct SimLibrary {
    state: Arc<Mutex<SimState>>,
}

impl SimLibrary {
    pub fn new(records: Vec<MpathRecord>) -> SimLibrary {
        SimLibrary {
            state: Arc::new(Mutex::new(SimState {
                records,
                ..Default::default()
            })),
        }
    }

    /// Load a captured "show maps json" reply from multipathd.
    pub fn from_capture(path: &Path) -> MpathResult<SimLibrary> {
        let text = fs::read_to_string(path).map_err(|e| {
            MpathError::Chained(
                format!("Failed to read multipathd capture {}", path.display()),
                Box::new(MpathError::Io(e)),
            )
        })?;
        Ok(SimLibrary::new(parse_maps_reply(&text)?))
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A test that panicked while holding the lock has already failed.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_records(&self, records: Vec<MpathRecord>) {
        self.lock().records = records;
    }

    /// Apply a change to the simulated topology in place.
    pub fn modify<F>(&self, f: F)
    where
        F: FnOnce(&mut Vec<MpathRecord>),
    {
        f(&mut self.lock().records);
    }

    /// While set, every query fails as if multipathd were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn query_count(&self) -> u64 {
        self.lock().queries
    }
}

impl MultipathLibrary for SimLibrary {
    fn probe(&self) -> MpathResult<()> {
        if self.lock().failing {
            Err(MpathError::SnapshotUnavailable(
                "simulated multipath library is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn query(&self) -> MpathResult<Vec<MpathRecord>> {
        let mut state = self.lock();
        state.queries += 1;
        if state.failing {
            return Err(MpathError::SnapshotUnavailable(
                "simulated multipath library is offline".to_string(),
            ));
        }
        Ok(state.records.clone())
    }
}
