//! Fixture builder: writes real ZIP containers and package parts.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use sha2::{Digest, Sha256};

use appx_unpack::{
    AppxFactory, DiagnosticLog, DirectoryObject, FileMode, FileStream, Handle, PackageFactory,
    PackageReader, StorageObject, ValidationPolicy,
};

// 2024-01-01 12:00:00
const DOS_TIME: u16 = 12 << 11;
const DOS_DATE: u16 = ((2024 - 1980) << 9) | (1 << 5) | 1;

#[derive(Default)]
struct Entry {
    name: String,
    method: u16,
    flags: u16,
    crc: u32,
    size: u64,
    data: Vec<u8>,
    // Overrides for the local header name and the directory's packed size.
    local_name: Option<String>,
    packed_size: Option<u32>,
}

/// Writes a ZIP archive, entries in insertion order.
#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<Entry>,
    zip64: bool,
    disk: u16,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(Entry {
            name: name.to_string(),
            crc: crc32fast::hash(data),
            size: data.len() as u64,
            data: data.to_vec(),
            ..Entry::default()
        });
        self
    }

    pub fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        self.entries.push(Entry {
            name: name.to_string(),
            method: 8,
            crc: crc32fast::hash(data),
            size: data.len() as u64,
            data: encoder.finish().unwrap(),
            ..Entry::default()
        });
        self
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.entries.push(Entry {
            name: name.to_string(),
            ..Entry::default()
        });
        self
    }

    fn last(mut self, edit: impl FnOnce(&mut Entry)) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            edit(entry);
        }
        self
    }

    /// Overwrite the recorded CRC of the last entry.
    pub fn with_crc(self, crc: u32) -> Self {
        self.last(|entry| entry.crc = crc)
    }

    pub fn with_flags(self, flags: u16) -> Self {
        self.last(|entry| entry.flags = flags)
    }

    pub fn with_method(self, method: u16) -> Self {
        self.last(|entry| entry.method = method)
    }

    /// Declare a different uncompressed size for the last entry.
    pub fn with_size(self, size: u64) -> Self {
        self.last(|entry| entry.size = size)
    }

    /// Give the last entry's local header a different name.
    pub fn with_local_name(self, name: &str) -> Self {
        self.last(|entry| entry.local_name = Some(name.to_string()))
    }

    /// Declare a different compressed size in the central directory.
    pub fn with_packed_size(self, size: u32) -> Self {
        self.last(|entry| entry.packed_size = Some(size))
    }

    /// End the archive with ZIP64 records and a saturated EOCD.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    /// Claim the archive is disk `disk` of a spanned set.
    pub fn on_disk(mut self, disk: u16) -> Self {
        self.disk = disk;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offsets = Vec::new();

        for entry in &self.entries {
            offsets.push(out.len() as u32);
            out.write_u32::<LittleEndian>(0x0403_4b50).unwrap();
            let local_name = entry.local_name.as_deref().unwrap_or(&entry.name);
            out.write_u16::<LittleEndian>(20).unwrap();
            out.write_u16::<LittleEndian>(entry.flags).unwrap();
            out.write_u16::<LittleEndian>(entry.method).unwrap();
            out.write_u16::<LittleEndian>(DOS_TIME).unwrap();
            out.write_u16::<LittleEndian>(DOS_DATE).unwrap();
            out.write_u32::<LittleEndian>(entry.crc).unwrap();
            out.write_u32::<LittleEndian>(entry.data.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(entry.size as u32).unwrap();
            out.write_u16::<LittleEndian>(local_name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.extend_from_slice(local_name.as_bytes());
            out.extend_from_slice(&entry.data);
        }

        let cd_offset = out.len() as u32;
        for (entry, offset) in self.entries.iter().zip(&offsets) {
            out.write_u32::<LittleEndian>(0x0201_4b50).unwrap();
            out.write_u16::<LittleEndian>(20).unwrap();
            out.write_u16::<LittleEndian>(20).unwrap();
            out.write_u16::<LittleEndian>(entry.flags).unwrap();
            out.write_u16::<LittleEndian>(entry.method).unwrap();
            out.write_u16::<LittleEndian>(DOS_TIME).unwrap();
            out.write_u16::<LittleEndian>(DOS_DATE).unwrap();
            out.write_u32::<LittleEndian>(entry.crc).unwrap();
            let packed = entry.packed_size.unwrap_or(entry.data.len() as u32);
            out.write_u32::<LittleEndian>(packed).unwrap();
            out.write_u32::<LittleEndian>(entry.size as u32).unwrap();
            out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(*offset).unwrap();
            out.extend_from_slice(entry.name.as_bytes());
        }
        let cd_size = out.len() as u32 - cd_offset;
        let count = self.entries.len() as u64;

        let (entries, cd_size, cd_offset) = if self.zip64 {
            let eocd64_offset = out.len() as u64;
            out.write_u32::<LittleEndian>(0x0606_4b50).unwrap();
            out.write_u64::<LittleEndian>(44).unwrap();
            out.write_u16::<LittleEndian>(45).unwrap();
            out.write_u16::<LittleEndian>(45).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap();
            out.write_u64::<LittleEndian>(count).unwrap();
            out.write_u64::<LittleEndian>(count).unwrap();
            out.write_u64::<LittleEndian>(cd_size as u64).unwrap();
            out.write_u64::<LittleEndian>(cd_offset as u64).unwrap();

            out.write_u32::<LittleEndian>(0x0706_4b50).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap();
            out.write_u64::<LittleEndian>(eocd64_offset).unwrap();
            out.write_u32::<LittleEndian>(1).unwrap();
            (u16::MAX, u32::MAX, u32::MAX)
        } else {
            (count as u16, cd_size, cd_offset)
        };

        out.write_u32::<LittleEndian>(0x0605_4b50).unwrap();
        out.write_u16::<LittleEndian>(self.disk).unwrap();
        out.write_u16::<LittleEndian>(self.disk).unwrap();
        out.write_u16::<LittleEndian>(entries).unwrap();
        out.write_u16::<LittleEndian>(entries).unwrap();
        out.write_u32::<LittleEndian>(cd_size).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out
    }

    pub fn write_to(&self, path: &Path) -> PathBuf {
        std::fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

pub const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Package xmlns="http://schemas.microsoft.com/appx/manifest/foundation/windows10">
  <Identity Name="Contoso.Sample" Publisher="CN=Contoso" Version="1.0.0.0"/>
</Package>"#;

pub const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="txt" ContentType="text/plain"/>
  <Default Extension="bin" ContentType="application/octet-stream"/>
  <Default Extension="xml" ContentType="application/vnd.ms-appx.manifest+xml"/>
  <Override PartName="/AppxBlockMap.xml" ContentType="application/vnd.ms-appx.blockmap+xml"/>
  <Override PartName="/AppxSignature.p7x" ContentType="application/vnd.ms-appx.signature"/>
</Types>"#;

pub const SIGNATURE: &[u8] = b"PKCX\x30\x82\x01\x00signed";

/// Block map listing `files` with their real sizes and block hashes.
pub fn block_map(files: &[(&str, &[u8])]) -> String {
    let listed: Vec<(&str, u64, &[u8])> =
        files.iter().map(|(name, data)| (*name, data.len() as u64, *data)).collect();
    block_map_with_sizes(&listed)
}

/// Block map whose declared sizes may differ from the hashed content.
pub fn block_map_with_sizes(files: &[(&str, u64, &[u8])]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<BlockMap xmlns="http://schemas.microsoft.com/appx/2010/blockmap" HashMethod="http://www.w3.org/2001/04/xmlenc#sha256">"#,
    );
    for (name, size, data) in files {
        xml.push_str(&format!(
            r#"<File Name="{}" Size="{size}" LfhSize="30">"#,
            name.replace('/', "\\")
        ));
        for block in data.chunks(64 * 1024) {
            xml.push_str(&format!(
                r#"<Block Hash="{}"/>"#,
                STANDARD.encode(Sha256::digest(block))
            ));
        }
        xml.push_str("</File>");
    }
    xml.push_str("</BlockMap>");
    xml
}

/// A well-formed package: the given payload, a block map covering it and
/// the manifest, content types and (when `signed`) a signature.
pub fn package(payload: &[(&str, &[u8])], signed: bool) -> ZipBuilder {
    let mut zip = ZipBuilder::new().deflated("AppxManifest.xml", MANIFEST.as_bytes());
    for (name, data) in payload {
        zip = zip.deflated(name, data);
    }
    let mut hashed = vec![("AppxManifest.xml", MANIFEST.as_bytes())];
    hashed.extend_from_slice(payload);
    zip = zip.stored("AppxBlockMap.xml", block_map(&hashed).as_bytes());
    if signed {
        zip = zip.stored("AppxSignature.p7x", SIGNATURE);
    }
    zip.stored("[Content_Types].xml", CONTENT_TYPES.as_bytes())
}

/// Write `zip` to `dir/name` and build an unopened reader over it.
pub fn reader(
    dir: &Path,
    name: &str,
    zip: &ZipBuilder,
    policy: ValidationPolicy,
    log: &DiagnosticLog,
) -> Handle<dyn PackageReader> {
    let path = zip.write_to(&dir.join(name));
    let stream = Handle::from_stream(FileStream::open(&path, FileMode::Read).unwrap());
    AppxFactory::new(policy, None, log.clone())
        .create_package_reader(stream)
        .unwrap()
}

pub fn directory(root: &Path) -> Handle<dyn StorageObject> {
    Handle::from_storage(DirectoryObject::new(root))
}

/// Every file under `root`, as sorted `/`-separated relative names.
pub fn files_under(root: &Path) -> Vec<String> {
    let mut names = DirectoryObject::new(root).file_names().unwrap();
    names.sort();
    names
}
