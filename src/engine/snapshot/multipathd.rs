// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    io::{Read, Write},
    mem::size_of,
    os::{linux::net::SocketAddrExt, unix::net::SocketAddr, unix::net::UnixStream},
    time::Duration,
};

use crate::{
    engine::{
        snapshot::{MpathRecord, MultipathLibrary, PathGroupRecord, PathRecord},
        types::{PathGroupStatus, PathStatus},
    },
    mpath::{MpathError, MpathResult},
};

/// Abstract socket on which multipathd accepts commands.
const MULTIPATHD_SOCKET_NAME: &str = "/org/kernel/linux/storage/multipathd";
const SHOW_MAPS_COMMAND: &str = "show maps json";
const SUPPORTED_MAJOR_VERSION: u32 = 0;
// Replies longer than this are treated as a protocol error.
const MAX_REPLY_LEN: usize = 64 * 1024 * 1024;

pub const DEFAULT_MULTIPATHD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MapsReply {
    major_version: u32,
    #[serde(default)]
    maps: Vec<ReplyMap>,
}

#[derive(Debug, Deserialize)]
struct ReplyMap {
    #[serde(default)]
    name: String,
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    sysfs: Option<String>,
    #[serde(default)]
    path_groups: Vec<ReplyGroup>,
}

#[derive(Debug, Deserialize)]
struct ReplyGroup {
    #[serde(default)]
    selector: String,
    #[serde(default)]
    pri: i64,
    #[serde(default)]
    dm_st: String,
    #[serde(default)]
    group: u32,
    #[serde(default)]
    paths: Vec<ReplyPath>,
}

#[derive(Debug, Deserialize)]
struct ReplyPath {
    #[serde(default)]
    dev: String,
    #[serde(default)]
    dev_t: Option<String>,
    #[serde(default)]
    chk_st: String,
}

impl From<ReplyMap> for MpathRecord {
    fn from(map: ReplyMap) -> MpathRecord {
        MpathRecord {
            name: map.name,
            wwid: map.uuid,
            kernel_name: map.sysfs.filter(|s| !s.is_empty()),
            groups: map
                .path_groups
                .into_iter()
                .map(|g| PathGroupRecord {
                    id: g.group,
                    priority: u32::try_from(g.pri).unwrap_or(0),
                    selector: g.selector,
                    status: PathGroupStatus::from(g.dm_st.as_str()),
                    paths: g
                        .paths
                        .into_iter()
                        .map(|p| PathRecord {
                            block_name: p.dev,
                            status: PathStatus::from(p.chk_st.as_str()),
                            group_id: g.group,
                            dev_t: p.dev_t,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Decode the reply to "show maps json".
pub fn parse_maps_reply(reply: &str) -> MpathResult<Vec<MpathRecord>> {
    let reply = serde_json::from_str::<MapsReply>(reply).map_err(|e| {
        MpathError::Chained(
            "multipathd sent a malformed reply".to_string(),
            Box::new(MpathError::Serde(e)),
        )
    })?;
    if reply.major_version != SUPPORTED_MAJOR_VERSION {
        return Err(MpathError::Msg(format!(
            "multipathd JSON major version {} is not supported; expected {}",
            reply.major_version, SUPPORTED_MAJOR_VERSION
        )));
    }
    Ok(reply.maps.into_iter().map(MpathRecord::from).collect())
}

fn unavailable(context: &str, err: MpathError) -> MpathError {
    MpathError::SnapshotUnavailable(format!("{context}: {err}"))
}

/// Reads multipath topology from a running multipathd over its IPC socket.
#[derive(Debug)]
pub struct MultipathdLibrary {
    timeout: Duration,
}

impl MultipathdLibrary {
    pub fn new(timeout: Duration) -> MultipathdLibrary {
        MultipathdLibrary { timeout }
    }

    fn connect(&self) -> MpathResult<UnixStream> {
        let addr = SocketAddr::from_abstract_name(MULTIPATHD_SOCKET_NAME.as_bytes())?;
        let stream = UnixStream::connect_addr(&addr)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    /// Send one command and wait for its reply. Both directions carry a
    /// native-endian length, counting the trailing NUL, then the bytes.
    fn command(&self, command: &str) -> MpathResult<String> {
        let mut stream = self.connect()?;

        let mut buf = Vec::with_capacity(size_of::<usize>() + command.len() + 1);
        buf.extend_from_slice(&(command.len() + 1).to_ne_bytes());
        buf.extend_from_slice(command.as_bytes());
        buf.push(0);
        stream.write_all(&buf)?;

        let mut len_buf = [0u8; size_of::<usize>()];
        stream.read_exact(&mut len_buf)?;
        let len = usize::from_ne_bytes(len_buf);
        if len > MAX_REPLY_LEN {
            return Err(MpathError::Msg(format!(
                "multipathd reply of {len} bytes exceeds the {MAX_REPLY_LEN} byte limit"
            )));
        }

        let mut reply = vec![0u8; len];
        stream.read_exact(&mut reply)?;
        while reply.last() == Some(&0) {
            reply.pop();
        }
        Ok(std::str::from_utf8(&reply)?.to_string())
    }
}

impl Default for MultipathdLibrary {
    fn default() -> MultipathdLibrary {
        MultipathdLibrary::new(DEFAULT_MULTIPATHD_TIMEOUT)
    }
}

impl MultipathLibrary for MultipathdLibrary {
    fn probe(&self) -> MpathResult<()> {
        self.connect()
            .map(|_| ())
            .map_err(|e| unavailable("Failed to connect to multipathd", e))
    }

    fn query(&self) -> MpathResult<Vec<MpathRecord>> {
        let reply = self
            .command(SHOW_MAPS_COMMAND)
            .map_err(|e| unavailable("Failed to query multipathd", e))?;
        parse_maps_reply(&reply).map_err(|e| unavailable("Failed to decode multipathd maps", e))
    }
}
