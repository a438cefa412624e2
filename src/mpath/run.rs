// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Main loop

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{runtime::Builder, select, signal, sync::mpsc::unbounded_channel, task};

use crate::{
    engine::{
        BlockEvent, MultipathLibrary, MultipathdLibrary, Reconciler, SimLibrary, Snapshot,
        TreeAction, DEFAULT_MULTIPATHD_TIMEOUT,
    },
    mpath::{
        consts::VERSION, errors::MpathResult, ipc_support::setup, udev_monitor::udev_thread,
    },
};

/// Settings the daemon takes from its command line.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Read multipath topology from this captured multipathd reply instead
    /// of a running multipathd.
    pub sim: Option<PathBuf>,
    pub multipathd_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> RunConfig {
        RunConfig {
            sim: None,
            multipathd_timeout: DEFAULT_MULTIPATHD_TIMEOUT,
        }
    }
}

// Waits for SIGINT. If received, sets should_exit to true.
async fn signal_thread(should_exit: Arc<AtomicBool>) {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failure while listening for signals: {e}");
    }
    should_exit.store(true, Ordering::Relaxed);
}

fn library(config: &RunConfig) -> MpathResult<Arc<dyn MultipathLibrary>> {
    Ok(match config.sim {
        Some(ref capture) => {
            info!(
                "Using simulated multipath library loaded from {}",
                capture.display()
            );
            Arc::new(SimLibrary::from_capture(capture)?)
        }
        None => {
            info!("Using multipathd");
            Arc::new(MultipathdLibrary::new(config.multipathd_timeout))
        }
    })
}

/// Set up the udev thread, the reconciler and the bus adapter and keep them
/// running until a signal is received or one of them fails.
pub fn run(config: RunConfig) -> MpathResult<()> {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name_fn(|| {
            static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
            let id = ATOMIC_ID.fetch_add(1, Ordering::SeqCst);
            format!("mpathd-wt-{id}")
        })
        .build()?;
    runtime.block_on(async move {
        info!("mpathd version {VERSION} started");
        let library = library(&config)?;
        let snapshot = match Snapshot::open(Arc::clone(&library)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Starting without multipath data: {e}; the next event will retry");
                Snapshot::empty(Arc::clone(&library))
            }
        };

        let should_exit = Arc::new(AtomicBool::new(false));
        let (event_sender, mut event_receiver) = unbounded_channel::<BlockEvent>();
        let (action_sender, action_receiver) = unbounded_channel::<TreeAction>();
        let mut reconciler = Reconciler::new(snapshot, action_sender, event_sender.clone());

        let udev_arc_clone = Arc::clone(&should_exit);
        let join_udev = task::spawn_blocking(move || udev_thread(event_sender, udev_arc_clone));
        let join_ipc = task::spawn(setup(Arc::clone(&library), action_receiver));
        let join_reconciler = task::spawn(async move {
            loop {
                if let Err(e) = reconciler.process_block_events(&mut event_receiver).await {
                    return Err::<(), _>(e);
                }
            }
        });
        let join_signal = task::spawn(signal_thread(Arc::clone(&should_exit)));

        select! {
            res = join_udev => {
                if let Ok(Err(e)) = res {
                    error!("The udev thread exited with an error: {e}; shutting down mpathd...");
                    return Err(e);
                } else {
                    error!("The udev thread exited; shutting down mpathd...");
                }
            }
            res = join_ipc => {
                if let Ok(Err(e)) = res {
                    error!("The IPC thread exited with an error: {e}; shutting down mpathd...");
                    return Err(e);
                } else {
                    error!("The IPC thread exited; shutting down mpathd...");
                }
            }
            res = join_reconciler => {
                if let Ok(Err(e)) = res {
                    error!("The reconciler exited with an error: {e}; shutting down mpathd...");
                    return Err(e);
                } else {
                    error!("The reconciler exited; shutting down mpathd...");
                }
            }
            _ = join_signal => {
                info!("Caught SIGINT; exiting...");
            }
        }
        should_exit.store(true, Ordering::Relaxed);
        Ok(())
    })?;
    Ok(())
}
