// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Support for monitoring udev events.

use std::{
    os::{
        fd::BorrowedFd,
        unix::io::{AsRawFd, RawFd},
    },
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use libudev::Event;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    engine::{
        udev::{block_enumerator, events_from_enumerated, events_from_udev},
        BlockEvent,
    },
    mpath::errors::{MpathError, MpathResult},
};

/// A facility for listening for block device events.
pub struct UdevMonitor {
    socket: libudev::MonitorSocket,
}

impl UdevMonitor {
    pub fn create(context: &libudev::Context) -> MpathResult<UdevMonitor> {
        let mut monitor = libudev::Monitor::new(context)?;
        monitor.match_subsystem("block")?;

        let socket = monitor.listen()?;

        Ok(UdevMonitor { socket })
    }

    pub fn poll(&mut self) -> Option<Event> {
        self.socket.receive_event()
    }
}

impl AsRawFd for UdevMonitor {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

fn send_events(sender: &UnboundedSender<BlockEvent>, events: Vec<BlockEvent>) -> MpathResult<()> {
    for event in events {
        sender.send(event).map_err(|_| {
            MpathError::Msg("Channel from udev thread to reconciler was shut".to_string())
        })?;
    }
    Ok(())
}

/// Announce every block device already present as an "add" event.
fn coldplug(context: &libudev::Context, sender: &UnboundedSender<BlockEvent>) -> MpathResult<()> {
    let mut enumerator = block_enumerator(context)?;
    let mut count = 0;
    for device in enumerator.scan_devices()?.filter(|dev| dev.is_initialized()) {
        match events_from_enumerated(&device) {
            Ok(events) => {
                count += 1;
                send_events(sender, events)?;
            }
            Err(e) => warn!("Skipping block device during enumeration: {e}"),
        }
    }
    info!("Enumerated {count} block devices");
    Ok(())
}

/// Forward block device events to the reconciler until told to exit. The
/// monitor is created before enumerating so that no event is missed.
pub fn udev_thread(
    sender: UnboundedSender<BlockEvent>,
    should_exit: Arc<AtomicBool>,
) -> MpathResult<()> {
    let context = libudev::Context::new()?;
    let mut udev = UdevMonitor::create(&context)?;
    coldplug(&context, &sender)?;

    // The monitor outlives every use of this descriptor below.
    let fd = unsafe { BorrowedFd::borrow_raw(udev.as_raw_fd()) };
    let mut pollers = [PollFd::new(fd, PollFlags::POLLIN)];
    loop {
        match poll(&mut pollers, PollTimeout::from(100u16))? {
            0 => {
                if should_exit.load(Ordering::Relaxed) {
                    info!("udev thread was signaled to exit");
                    return Ok(());
                }
            }
            _ => {
                if let Some(ref event) = udev.poll() {
                    match events_from_udev(event) {
                        Ok(events) => send_events(&sender, events)?,
                        Err(e) => warn!("Ignoring udev event: {e}"),
                    }
                }
            }
        }
    }
}
