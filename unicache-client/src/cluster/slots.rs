//! Hash-slot computation and the slot -> node table.

use crate::error::{ClientError, ClientResult};
use crate::resp::RespValue;

pub const SLOT_COUNT: u16 = 16384;

/// Slot owning `key`: CRC16/XMODEM of the key (or its `{hash tag}`) mod 16384.
pub fn hash_slot(key: &[u8]) -> u16 {
    let mut state = crc16::State::<crc16::XMODEM>::new();
    state.update(hash_tag(key));
    state.get() % SLOT_COUNT
}

/// Part of the key that is hashed. A non-empty `{...}` section wins.
fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        if let Some(len) = key[open + 1..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[open + 1..open + 1 + len];
            }
        }
    }
    key
}

/// Master address per slot, as reported by `CLUSTER SLOTS`.
#[derive(Debug, Clone)]
pub struct SlotMap {
    masters: Vec<Option<String>>,
}

impl SlotMap {
    pub fn new() -> Self {
        SlotMap {
            masters: vec![None; SLOT_COUNT as usize],
        }
    }

    /// Builds the table from a `CLUSTER SLOTS` reply.
    ///
    /// Nodes that do not know their own IP report an empty host; those take
    /// the host of the node that answered.
    pub fn from_slots_response(reply: RespValue, answered_by: &str) -> ClientResult<Self> {
        let entries = match reply {
            RespValue::Array(entries) => entries,
            _ => return Err(ClientError::Protocol("CLUSTER SLOTS must return an array")),
        };
        let fallback_host = answered_by
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(answered_by);

        let mut map = SlotMap::new();
        for entry in entries {
            map.apply_entry(entry, fallback_host)?;
        }
        Ok(map)
    }

    fn apply_entry(&mut self, entry: RespValue, fallback_host: &str) -> ClientResult<()> {
        let fields = match entry {
            RespValue::Array(fields) if fields.len() >= 3 => fields,
            _ => return Err(ClientError::Protocol("slot entry must hold start, end and master")),
        };
        let start = slot_number(&fields[0])?;
        let end = slot_number(&fields[1])?;
        if start > end {
            return Err(ClientError::Protocol("slot range is reversed"));
        }
        let master = endpoint(&fields[2], fallback_host)?;
        for slot in start..=end {
            self.masters[slot as usize] = Some(master.clone());
        }
        Ok(())
    }

    pub fn master_for_slot(&self, slot: u16) -> Option<&str> {
        self.masters.get(slot as usize).and_then(|addr| addr.as_deref())
    }

    /// Points one slot at a new owner after a MOVED reply.
    pub fn assign(&mut self, slot: u16, addr: &str) {
        if let Some(entry) = self.masters.get_mut(slot as usize) {
            *entry = Some(addr.to_string());
        }
    }

    /// Distinct master addresses, sorted.
    pub fn masters(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.masters.iter().flatten().cloned().collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }
}

impl Default for SlotMap {
    fn default() -> Self {
        SlotMap::new()
    }
}

fn slot_number(value: &RespValue) -> ClientResult<u16> {
    match value {
        RespValue::Integer(slot) if (0..i64::from(SLOT_COUNT)).contains(slot) => Ok(*slot as u16),
        _ => Err(ClientError::Protocol("slot number out of range")),
    }
}

fn endpoint(value: &RespValue, fallback_host: &str) -> ClientResult<String> {
    let fields = match value {
        RespValue::Array(fields) if fields.len() >= 2 => fields,
        _ => return Err(ClientError::Protocol("node entry must hold host and port")),
    };
    let host = match &fields[0] {
        RespValue::Bulk(Some(host)) | RespValue::Simple(host) => {
            std::str::from_utf8(host).map_err(|_| ClientError::Protocol("node host is not utf-8"))?
        }
        _ => return Err(ClientError::Protocol("node host must be a string")),
    };
    let port = match &fields[1] {
        RespValue::Integer(port) if (0..=i64::from(u16::MAX)).contains(port) => *port,
        _ => return Err(ClientError::Protocol("node port out of range")),
    };
    let host = if host.is_empty() { fallback_host } else { host };
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str, port: i64) -> RespValue {
        RespValue::Array(vec![
            RespValue::Bulk(Some(host.as_bytes().to_vec())),
            RespValue::Integer(port),
        ])
    }

    #[test]
    fn known_slots() {
        assert_eq!(hash_slot(b"foo"), 12182);
        assert_eq!(hash_slot(b"bar"), 5061);
        assert_eq!(hash_slot(b"123456789"), 12739);
    }

    #[test]
    fn hash_tags_share_a_slot() {
        assert_eq!(hash_slot(b"{user:1}:name"), hash_slot(b"{user:1}:email"));
        assert_eq!(hash_slot(b"{user:1}:name"), hash_slot(b"user:1"));
        // Empty tag hashes the whole key; only the first `{` counts.
        assert_eq!(hash_tag(b"{}foo"), b"{}foo");
        assert_eq!(hash_tag(b"foo{}{bar}"), b"foo{}{bar}");
        assert_eq!(hash_tag(b"foo{{bar}}"), b"{bar");
    }

    #[test]
    fn parses_slot_table() {
        let reply = RespValue::Array(vec![
            RespValue::Array(vec![
                RespValue::Integer(0),
                RespValue::Integer(8191),
                node("10.0.0.1", 7000),
                node("10.0.0.2", 7003),
            ]),
            RespValue::Array(vec![
                RespValue::Integer(8192),
                RespValue::Integer(16383),
                node("", 7001),
            ]),
        ]);
        let map = SlotMap::from_slots_response(reply, "10.0.0.9:7001").unwrap();
        assert_eq!(map.master_for_slot(0), Some("10.0.0.1:7000"));
        assert_eq!(map.master_for_slot(16383), Some("10.0.0.9:7001"));
        assert_eq!(map.masters(), ["10.0.0.1:7000", "10.0.0.9:7001"]);
    }

    #[test]
    fn moved_reassigns_one_slot() {
        let mut map = SlotMap::new();
        assert_eq!(map.master_for_slot(42), None);
        map.assign(42, "127.0.0.1:7002");
        assert_eq!(map.master_for_slot(42), Some("127.0.0.1:7002"));
        assert_eq!(map.master_for_slot(43), None);
    }

    #[test]
    fn rejects_out_of_range_slot() {
        let reply = RespValue::Array(vec![RespValue::Array(vec![
            RespValue::Integer(0),
            RespValue::Integer(16384),
            node("h", 1),
        ])]);
        assert!(SlotMap::from_slots_response(reply, "h:1").is_err());
    }
}
