use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};

/// Compression method of an entry. Only stored and deflate can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl From<u16> for CompressionMethod {
    fn from(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            other => CompressionMethod::Unknown(other),
        }
    }
}

/// Check the signature and length of a fixed-size record and return a
/// cursor positioned just past the signature.
fn record<'a>(data: &'a [u8], signature: &[u8], size: usize, what: &str) -> Result<Cursor<&'a [u8]>> {
    if data.len() < size || !data.starts_with(signature) {
        return Err(Error::Format(format!("invalid {what}")));
    }
    Ok(Cursor::new(&data[signature.len()..size]))
}

/// End of Central Directory (EOCD) - 22 bytes plus comment
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = record(data, Self::SIGNATURE, Self::SIZE, "end of central directory record")?;
        Ok(Self {
            disk_number: r.read_u16::<LittleEndian>()?,
            disk_with_cd: r.read_u16::<LittleEndian>()?,
            disk_entries: r.read_u16::<LittleEndian>()?,
            total_entries: r.read_u16::<LittleEndian>()?,
            cd_size: r.read_u32::<LittleEndian>()?,
            cd_offset: r.read_u32::<LittleEndian>()?,
        })
    }

    /// Any saturated field means the real value lives in the ZIP64 record.
    pub fn is_zip64(&self) -> bool {
        self.disk_entries == u16::MAX
            || self.total_entries == u16::MAX
            || self.cd_size == u32::MAX
            || self.cd_offset == u32::MAX
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = record(data, Self::SIGNATURE, Self::SIZE, "ZIP64 end of central directory locator")?;
        Ok(Self {
            disk_with_eocd64: r.read_u32::<LittleEndian>()?,
            eocd64_offset: r.read_u64::<LittleEndian>()?,
            total_disks: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = record(data, Self::SIGNATURE, Self::MIN_SIZE, "ZIP64 end of central directory record")?;
        // record size, version made by, version needed
        r.set_position(r.position() + 12);
        Ok(Self {
            disk_number: r.read_u32::<LittleEndian>()?,
            disk_with_cd: r.read_u32::<LittleEndian>()?,
            disk_entries: r.read_u64::<LittleEndian>()?,
            total_entries: r.read_u64::<LittleEndian>()?,
            cd_size: r.read_u64::<LittleEndian>()?,
            cd_offset: r.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// General purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Extra field carrying 64-bit sizes and offsets.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// One entry of the container, as declared by the central directory.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub flags: u16,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    /// Start of the entry's data, resolved from its local file header.
    pub data_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub is_directory: bool,
}

impl ZipEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}
