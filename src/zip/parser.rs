//! Walks the trailing records of an archive back to its central directory
//! and turns each directory entry into a bounds-checked [`ZipEntry`].
//!
//! Any structural inconsistency is a format error, so every entry returned
//! can be handed out as a byte range of the archive without further checks.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashSet;
use std::io::{Cursor, Read};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::io::Stream;

use super::structures::*;

/// Longest archive comment; bounds the backwards search for the EOCD.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Location and size of the central directory.
struct CentralDirectory {
    offset: u64,
    size: u64,
    total_entries: u64,
    /// Where the trailing records (ZIP64 or plain EOCD) begin.
    end: u64,
}

/// Low-level ZIP file parser.
///
/// Typically used through [`ZipObject`](super::ZipObject) rather than
/// directly.
pub struct ZipParser {
    /// The underlying data source
    stream: Handle<dyn Stream>,
    /// Total size of the archive in bytes
    size: u64,
}

impl ZipParser {
    pub fn new(stream: Handle<dyn Stream>) -> Result<Self> {
        let size = stream.lock().size()?;
        Ok(Self { stream, size })
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset.checked_add(buf.len() as u64);
        if end.is_none_or(|end| end > self.size) {
            return Err(Error::Format(format!(
                "read of {} bytes at {offset} runs past the {}-byte archive",
                buf.len(),
                self.size
            )));
        }
        self.stream.lock().read_at(offset, buf)
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// Returns the EOCD record and its offset in the file.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let record = EndOfCentralDirectory::SIZE as u64;
        if self.size < record {
            return Err(Error::Format(format!(
                "{}-byte file is too small to be a ZIP archive",
                self.size
            )));
        }

        // Common case: no comment.
        let offset = self.size - record;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.read_at(offset, &mut buf)?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        let search_size = (MAX_COMMENT_SIZE + record).min(self.size);
        let search_start = self.size - search_size;
        let mut buf = vec![0u8; search_size as usize];
        self.read_at(search_start, &mut buf)?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length field must account for every trailing byte.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd =
                        EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(Error::Format(
            "end of central directory record not found".to_string(),
        ))
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF). Returns the record and its offset.
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<(Zip64EOCD, u64)> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| Error::Format("ZIP64 locator missing".to_string()))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.read_at(locator_offset, &mut locator_buf)?;
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        if locator.total_disks > 1 || locator.disk_with_eocd64 != 0 {
            return Err(Error::NotSupported(
                "multi-disk ZIP64 archives".to_string(),
            ));
        }
        if locator.eocd64_offset >= locator_offset {
            return Err(Error::Format(
                "ZIP64 end of central directory overlaps its locator".to_string(),
            ));
        }

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.read_at(locator.eocd64_offset, &mut eocd64_buf)?;
        Ok((Zip64EOCD::from_bytes(&eocd64_buf)?, locator.eocd64_offset))
    }

    fn central_directory(&self) -> Result<CentralDirectory> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        let cd = if eocd.is_zip64() {
            let (eocd64, eocd64_offset) = self.read_zip64_eocd(eocd_offset)?;
            if eocd64.disk_number != 0 || eocd64.disk_with_cd != 0 {
                return Err(Error::NotSupported("multi-disk archives".to_string()));
            }
            if eocd64.disk_entries != eocd64.total_entries {
                return Err(Error::Format(format!(
                    "ZIP64 directory declares {} entries on this disk but {} in total",
                    eocd64.disk_entries, eocd64.total_entries
                )));
            }
            CentralDirectory {
                offset: eocd64.cd_offset,
                size: eocd64.cd_size,
                total_entries: eocd64.total_entries,
                end: eocd64_offset,
            }
        } else {
            if eocd.disk_number != 0 || eocd.disk_with_cd != 0 {
                return Err(Error::NotSupported("multi-disk archives".to_string()));
            }
            if eocd.disk_entries != eocd.total_entries {
                return Err(Error::Format(format!(
                    "directory declares {} entries on this disk but {} in total",
                    eocd.disk_entries, eocd.total_entries
                )));
            }
            CentralDirectory {
                offset: eocd.cd_offset as u64,
                size: eocd.cd_size as u64,
                total_entries: eocd.total_entries as u64,
                end: eocd_offset,
            }
        };

        let cd_end = cd.offset.checked_add(cd.size);
        if cd_end.is_none_or(|end| end > cd.end) {
            return Err(Error::Format(format!(
                "central directory [{}, +{}) runs into the end records at {}",
                cd.offset, cd.size, cd.end
            )));
        }
        if cd.total_entries > cd.size / CDFH_MIN_SIZE as u64 {
            return Err(Error::Format(format!(
                "{} entries cannot fit in a {}-byte central directory",
                cd.total_entries, cd.size
            )));
        }
        Ok(cd)
    }

    /// Read every entry of the archive, in central directory order, with
    /// data offsets resolved and bounds checked.
    pub fn read_entries(&self) -> Result<Vec<ZipEntry>> {
        let cd = self.central_directory()?;

        let mut cd_data = vec![0u8; cd.size as usize];
        self.read_at(cd.offset, &mut cd_data)?;

        let mut entries = Vec::with_capacity(cd.total_entries as usize);
        let mut names = HashSet::new();
        let mut cursor = Cursor::new(cd_data.as_slice());

        for index in 0..cd.total_entries {
            let mut entry = parse_cdfh(&mut cursor)
                .map_err(|e| Error::Format(format!("central directory entry {index}: {e}")))?;
            if !names.insert(entry.file_name.clone()) {
                return Err(Error::Format(format!(
                    "duplicate entry name {:?}",
                    entry.file_name
                )));
            }
            entry.data_offset = self.resolve_data_offset(&entry, cd.offset)?;
            entries.push(entry);
        }

        if cursor.position() != cd.size {
            return Err(Error::Format(format!(
                "central directory holds {} bytes beyond its {} declared entries",
                cd.size - cursor.position(),
                cd.total_entries
            )));
        }

        Ok(entries)
    }

    /// Where the entry's data begins. The local header's extra field may differ
    /// from the directory's, so it is read here. Its name must match and the
    /// data must end before the central directory.
    fn resolve_data_offset(&self, entry: &ZipEntry, cd_offset: u64) -> Result<u64> {
        if entry.lfh_offset >= cd_offset {
            return Err(Error::Format(format!(
                "{}: local header offset {} lies outside the data area",
                entry.file_name, entry.lfh_offset
            )));
        }

        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.read_at(entry.lfh_offset, &mut lfh_buf)?;
        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(Error::Format(format!(
                "{}: invalid local file header",
                entry.file_name
            )));
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26);
        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        let mut name = vec![0u8; file_name_length as usize];
        self.read_at(entry.lfh_offset + LFH_SIZE as u64, &mut name)?;
        if name != entry.file_name.as_bytes() {
            return Err(Error::Format(format!(
                "{}: local header names {:?}",
                entry.file_name,
                String::from_utf8_lossy(&name)
            )));
        }

        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;
        let data_end = data_offset.checked_add(entry.compressed_size);
        if data_end.is_none_or(|end| end > cd_offset) {
            return Err(Error::Format(format!(
                "{}: {} bytes of data at {} overrun the central directory",
                entry.file_name, entry.compressed_size, data_offset
            )));
        }

        Ok(data_offset)
    }
}

/// Parse a Central Directory File Header from a cursor.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipEntry> {
    let start = cursor.position() as usize;
    let header = &cursor.get_ref()[start..];
    if header.len() < CDFH_MIN_SIZE || !header.starts_with(CDFH_SIGNATURE) {
        return Err(Error::Format("invalid central directory file header".to_string()));
    }
    // signature, version made by, version needed
    cursor.set_position(cursor.position() + 8);
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    // disk number start, internal and external attributes
    cursor.set_position(cursor.position() + 8);
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    let file_name = String::from_utf8(file_name_bytes)
        .map_err(|_| Error::Format("entry name is not valid UTF-8".to_string()))?;
    if file_name.is_empty() {
        return Err(Error::Format("entry has an empty name".to_string()));
    }

    let is_directory = file_name.ends_with('/');

    let extra_field_end = cursor.position() + extra_field_length as u64;
    if extra_field_end > cursor.get_ref().len() as u64 {
        return Err(Error::Format(format!("{file_name}: extra field is truncated")));
    }

    while cursor.position() + 4 <= extra_field_end {
        let header_id = cursor.read_u16::<LittleEndian>()?;
        let field_size = cursor.read_u16::<LittleEndian>()?;
        let field_end = cursor.position() + field_size as u64;
        if field_end > extra_field_end {
            return Err(Error::Format(format!("{file_name}: extra field overruns its header")));
        }

        if header_id == ZIP64_EXTRA_ID {
            // Only saturated header fields have a 64-bit counterpart here.
            if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                uncompressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                compressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                lfh_offset = cursor.read_u64::<LittleEndian>()?;
            }
        }
        cursor.set_position(field_end);
    }

    cursor.set_position(extra_field_end + file_comment_length as u64);
    if cursor.position() > cursor.get_ref().len() as u64 {
        return Err(Error::Format(format!("{file_name}: comment is truncated")));
    }

    let compression_method = CompressionMethod::from(compression_method);
    if compression_method == CompressionMethod::Stored && compressed_size != uncompressed_size {
        return Err(Error::Format(format!(
            "{file_name}: stored entry declares {compressed_size} compressed but {uncompressed_size} uncompressed bytes"
        )));
    }

    Ok(ZipEntry {
        file_name,
        compression_method,
        flags,
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        data_offset: 0,
        last_mod_time,
        last_mod_date,
        is_directory,
    })
}
