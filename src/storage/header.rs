use bincode::{Decode, Encode, config};

use crate::{
    storage::SUPERBLOCK_SIZE,
    types::{
        Lsn, PAGE_SIZE, PageOffset, RowId,
        error::{DatabaseError, Result},
    },
};

/// File header kept in the first bytes of page 0. The rest of that page is
/// reserved so the first node begins at PAGE_SIZE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Superblock {
    pub last_key: RowId,
    pub page_table_root: PageOffset,
    pub next_free_offset: PageOffset,
    pub next_lsn: Lsn,
}

impl Default for Superblock {
    fn default() -> Self {
        Self {
            last_key: 0,
            page_table_root: 0,
            next_free_offset: PAGE_SIZE as PageOffset,
            next_lsn: 1,
        }
    }
}

fn layout() -> impl config::Config {
    config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

impl Superblock {
    pub fn to_bytes(&self) -> Result<[u8; SUPERBLOCK_SIZE]> {
        let mut buffer = [0u8; SUPERBLOCK_SIZE];
        let written = bincode::encode_into_slice(self, &mut buffer, layout()).map_err(|e| {
            DatabaseError::Serialization {
                details: e.to_string(),
            }
        })?;
        debug_assert_eq!(written, SUPERBLOCK_SIZE);
        Ok(buffer)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SUPERBLOCK_SIZE {
            return Err(DatabaseError::decode("superblock too short"));
        }
        let (superblock, _): (Self, usize) =
            bincode::decode_from_slice(&bytes[..SUPERBLOCK_SIZE], layout()).map_err(|e| {
                DatabaseError::Serialization {
                    details: e.to_string(),
                }
            })?;
        if superblock.next_free_offset < PAGE_SIZE as PageOffset
            || superblock.next_free_offset % PAGE_SIZE as PageOffset != 0
        {
            return Err(DatabaseError::decode(format!(
                "superblock next_free_offset {} is not a page boundary",
                superblock.next_free_offset
            )));
        }
        Ok(superblock)
    }
}
