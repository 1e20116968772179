//! Raw reads against an immutable heap snapshot.
//!
//! The engine never touches live memory. Everything it learns about an
//! object comes through `MemorySource`, so the same code serves both a
//! postmortem image on disk and an in-process capture.

use crate::{ArrayletConfig, ModelError, Result};

/// Byte-level access to a target process snapshot.
///
/// Implementations must be re-entrant: the engine may be called from
/// several inspection threads against the same snapshot.
pub trait MemorySource {
    /// Fill `buffer` from target address `address`. Fails with
    /// `UnreadableMemory` if any byte of the range is unmapped.
    fn read_bytes(&self, address: u64, buffer: &mut [u8]) -> Result<()>;

    fn read_u32(&self, address: u64) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read_bytes(address, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let mut raw = [0u8; 8];
        self.read_bytes(address, &mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    /// Read one heap reference, honoring the configured reference width
    /// and the compressed-pointer shift.
    fn read_ref(&self, address: u64, config: &ArrayletConfig) -> Result<u64> {
        let raw = if config.reference_size() == 4 {
            self.read_u32(address)? as u64
        } else {
            self.read_u64(address)?
        };
        if config.compressed_refs {
            Ok(raw << config.compressed_shift)
        } else {
            Ok(raw)
        }
    }
}

/// An in-memory snapshot: one contiguous byte image mapped at `base`.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    base: u64,
    bytes: Vec<u8>,
}

impl SnapshotBuffer {
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    pub fn zeroed(base: u64, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0; size],
        }
    }

    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    fn offset_of(&self, address: u64, size: usize) -> Result<usize> {
        let unreadable = ModelError::UnreadableMemory { address, size };
        if address < self.base {
            return Err(unreadable);
        }
        let offset = (address - self.base) as usize;
        if offset + size > self.bytes.len() {
            return Err(unreadable);
        }
        Ok(offset)
    }

    pub fn write_bytes(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let offset = self.offset_of(address, data.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn write_u32(&mut self, address: u64, value: u32) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_u64(&mut self, address: u64, value: u64) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Store one heap reference in the image, compressing it if the
    /// configuration says references are compressed.
    pub fn write_ref(
        &mut self,
        address: u64,
        value: u64,
        config: &ArrayletConfig,
    ) -> Result<()> {
        if config.compressed_refs {
            self.write_u32(address, (value >> config.compressed_shift) as u32)
        } else if config.reference_size() == 4 {
            self.write_u32(address, value as u32)
        } else {
            self.write_u64(address, value)
        }
    }
}

impl MemorySource for SnapshotBuffer {
    fn read_bytes(&self, address: u64, buffer: &mut [u8]) -> Result<()> {
        let offset = self.offset_of(address, buffer.len())?;
        buffer.copy_from_slice(&self.bytes[offset..offset + buffer.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SnapshotConfigInfo;

    fn mk_config(compressed: bool) -> ArrayletConfig {
        ArrayletConfig::new(SnapshotConfigInfo {
            compressed_refs: compressed,
            compressed_shift: if compressed { Some(3) } else { None },
            ..Default::default()
        })
        .expect("valid test configuration")
    }

    #[test]
    fn reads_round_trip_within_the_image() {
        let mut snap = SnapshotBuffer::zeroed(0x1000, 64);
        snap.write_u32(0x1000, 0xDEAD_BEEF).unwrap();
        snap.write_u64(0x1008, 0x0123_4567_89AB_CDEF).unwrap();

        assert_eq!(snap.read_u32(0x1000).unwrap(), 0xDEAD_BEEF);
        assert_eq!(snap.read_u64(0x1008).unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn out_of_image_reads_fail_as_unreadable() {
        let snap = SnapshotBuffer::zeroed(0x1000, 16);

        let low = snap.read_u32(0xFFF);
        assert_eq!(
            low,
            Err(ModelError::UnreadableMemory {
                address: 0xFFF,
                size: 4
            })
        );

        // straddling the end of the image is just as unreadable
        let high = snap.read_u64(0x100C);
        assert_eq!(
            high,
            Err(ModelError::UnreadableMemory {
                address: 0x100C,
                size: 8
            })
        );
    }

    #[test]
    fn reference_reads_decompress_with_the_configured_shift() {
        let config = mk_config(true);
        let mut snap = SnapshotBuffer::zeroed(0x2000, 32);

        // a compressed token occupies 4 bytes and expands by the shift
        snap.write_ref(0x2000, 0x5_0000_0008, &config).unwrap();
        assert_eq!(snap.read_ref(0x2000, &config).unwrap(), 0x5_0000_0008);

        let full = mk_config(false);
        snap.write_ref(0x2008, 0x7777_0000_1234, &full).unwrap();
        assert_eq!(snap.read_ref(0x2008, &full).unwrap(), 0x7777_0000_1234);
    }
}
