// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Big-endian fixed-width codec for the on-disk pool layout.
//!
//! ```text
//! offset 0  : magic "DDP"                  (3 bytes)
//! offset 3  : version '1'                  (1 byte)
//! offset 4  : uuid, hyphenated text         (36 bytes)
//! offset 40 : PoolHeader { footer_addr }    (4 bytes)
//! ...
//! offset footer_addr: PoolFooter { entities_count, first_header_addr, last_data_id } (12 bytes)
//! ```
//!
//! No I/O happens here; callers own seeking and reading the right number of bytes.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{PoolError, Result};
use crate::types::{Address, DataSize, EntityId, PoolUuid};

pub const MAGIC: &[u8; 3] = b"DDP";
pub const VERSION: u8 = b'1';
pub const UUID_LEN: usize = 36;

/// `magic + version + uuid + header` — everything before the free body region.
pub const PREAMBLE_LEN: u32 = 3 + 1 + UUID_LEN as u32 + POOL_HEADER_LEN;
pub const POOL_HEADER_LEN: u32 = 4;
pub const POOL_FOOTER_LEN: u32 = 12;
pub const ENTITY_HEADER_LEN: u32 = 12;

/// Total bytes unavailable to entity data: preamble plus footer.
pub const POOL_OVERHEAD: u32 = PREAMBLE_LEN + POOL_FOOTER_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHeader {
    pub footer_addr: Address,
}

impl PoolHeader {
    pub fn encode(&self) -> [u8; POOL_HEADER_LEN as usize] {
        let mut buf = [0u8; POOL_HEADER_LEN as usize];
        (&mut buf[..]).write_u32::<BigEndian>(self.footer_addr).expect("fixed buffer");
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != POOL_HEADER_LEN as usize {
            return Err(PoolError::CorruptFormat("pool header: unexpected length".into()));
        }
        let footer_addr = Cursor::new(buf).read_u32::<BigEndian>()?;
        Ok(PoolHeader { footer_addr })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolFooter {
    pub entities_count: u32,
    pub first_header_addr: Address,
    pub last_data_id: EntityId,
}

impl PoolFooter {
    pub fn encode(&self) -> [u8; POOL_FOOTER_LEN as usize] {
        let mut buf = [0u8; POOL_FOOTER_LEN as usize];
        {
            let mut cursor = &mut buf[..];
            cursor.write_u32::<BigEndian>(self.entities_count).expect("fixed buffer");
            cursor.write_u32::<BigEndian>(self.first_header_addr).expect("fixed buffer");
            cursor.write_u32::<BigEndian>(self.last_data_id).expect("fixed buffer");
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != POOL_FOOTER_LEN as usize {
            return Err(PoolError::CorruptFormat("pool footer: unexpected length".into()));
        }
        let mut cursor = Cursor::new(buf);
        let entities_count = cursor.read_u32::<BigEndian>()?;
        let first_header_addr = cursor.read_u32::<BigEndian>()?;
        let last_data_id = cursor.read_u32::<BigEndian>()?;
        Ok(PoolFooter { entities_count, first_header_addr, last_data_id })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityHeader {
    pub id: EntityId,
    pub size: DataSize,
    pub next_header_addr: Address,
}

impl EntityHeader {
    pub fn encode(&self) -> [u8; ENTITY_HEADER_LEN as usize] {
        let mut buf = [0u8; ENTITY_HEADER_LEN as usize];
        {
            let mut cursor = &mut buf[..];
            cursor.write_u32::<BigEndian>(self.id).expect("fixed buffer");
            cursor.write_u32::<BigEndian>(self.size).expect("fixed buffer");
            cursor.write_u32::<BigEndian>(self.next_header_addr).expect("fixed buffer");
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != ENTITY_HEADER_LEN as usize {
            return Err(PoolError::CorruptFormat("entity header: unexpected length".into()));
        }
        let mut cursor = Cursor::new(buf);
        let id = cursor.read_u32::<BigEndian>()?;
        let size = cursor.read_u32::<BigEndian>()?;
        let next_header_addr = cursor.read_u32::<BigEndian>()?;
        Ok(EntityHeader { id, size, next_header_addr })
    }
}

pub fn encode_uuid(uuid: &PoolUuid) -> [u8; UUID_LEN] {
    let text = uuid.to_hyphenated();
    let bytes = text.as_bytes();
    let mut buf = [0u8; UUID_LEN];
    buf.copy_from_slice(bytes);
    buf
}

pub fn decode_uuid(buf: &[u8]) -> Result<PoolUuid> {
    if buf.len() != UUID_LEN {
        return Err(PoolError::CorruptFormat("uuid: unexpected length".into()));
    }
    let text = std::str::from_utf8(buf)
        .map_err(|_| PoolError::CorruptFormat("uuid: not valid utf-8".into()))?;
    PoolUuid::parse(text).ok_or_else(|| PoolError::CorruptFormat(format!("uuid: failed to parse '{text}'")))
}

pub fn validate_magic_and_version(buf: &[u8]) -> Result<()> {
    if buf.len() < 4 || &buf[0..3] != MAGIC || buf[3] != VERSION {
        return Err(PoolError::CorruptFormat("bad magic or version".into()));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pool_header_round_trips() {
        let h = PoolHeader { footer_addr: 123456 };
        assert_eq!(PoolHeader::decode(&h.encode()).unwrap(), h);
    }

    #[test]
    fn pool_footer_round_trips() {
        let f = PoolFooter { entities_count: 7, first_header_addr: 44, last_data_id: 99 };
        assert_eq!(PoolFooter::decode(&f.encode()).unwrap(), f);
    }

    #[test]
    fn entity_header_round_trips() {
        let e = EntityHeader { id: 1, size: 5, next_header_addr: 0 };
        assert_eq!(EntityHeader::decode(&e.encode()).unwrap(), e);
    }

    #[test]
    fn uuid_round_trips() {
        let u = PoolUuid::new();
        let decoded = decode_uuid(&encode_uuid(&u)).unwrap();
        assert_eq!(u, decoded);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(PoolHeader::decode(&[0u8; 3]).is_err());
    }

    #[test]
    fn decode_rejects_bad_magic() {
        assert!(validate_magic_and_version(b"XYZ1").is_err());
        assert!(validate_magic_and_version(b"DDP2").is_err());
        assert!(validate_magic_and_version(b"DDP1").is_ok());
    }
}
