//! The block map: declared size and per-64 KiB SHA-256 hashes of every
//! payload part.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use super::xml::{attribute, for_each_element, required_attribute};
use super::BLOCK_MAP;
use crate::error::{Error, Result};

/// Uncompressed bytes covered by one block hash.
pub const BLOCK_SIZE: u64 = 64 * 1024;

type BlockHash = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMapFile {
    /// Part name with `/` separators.
    pub name: String,
    pub size: u64,
    pub blocks: Vec<BlockHash>,
}

impl BlockMapFile {
    /// Number of blocks a part of this size must have.
    pub fn expected_blocks(&self) -> u64 {
        self.size.div_ceil(BLOCK_SIZE)
    }

    pub fn verifier(&self) -> BlockVerifier {
        BlockVerifier {
            name: self.name.clone(),
            expected: self.blocks.clone(),
            hasher: Sha256::new(),
            filled: 0,
            verified: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockMap {
    files: Vec<BlockMapFile>,
    index: HashMap<String, usize>,
}

impl BlockMap {
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut map = BlockMap::default();
        let mut saw_root = false;

        for_each_element(BLOCK_MAP, xml, |element| {
            match element.local_name().as_ref() {
                b"BlockMap" => saw_root = true,
                b"File" => {
                    let name = required_attribute(BLOCK_MAP, element, b"Name")?.replace('\\', "/");
                    let size = parse_u64(&required_attribute(BLOCK_MAP, element, b"Size")?)?;
                    if map.index.insert(name.clone(), map.files.len()).is_some() {
                        return Err(Error::Format(format!("{BLOCK_MAP}: {name} is listed twice")));
                    }
                    map.files.push(BlockMapFile {
                        name,
                        size,
                        blocks: Vec::new(),
                    });
                }
                b"Block" => {
                    let file = map.files.last_mut().ok_or_else(|| {
                        Error::Format(format!("{BLOCK_MAP}: <Block> outside of <File>"))
                    })?;
                    let hash = required_attribute(BLOCK_MAP, element, b"Hash")?;
                    file.blocks.push(decode_hash(&hash)?);
                    if let Some(size) = attribute(BLOCK_MAP, element, b"Size")? {
                        parse_u64(&size)?;
                    }
                }
                _ => {}
            }
            Ok(())
        })?;

        if !saw_root {
            return Err(Error::Format(format!("{BLOCK_MAP}: missing <BlockMap> element")));
        }
        Ok(map)
    }

    pub fn files(&self) -> &[BlockMapFile] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&BlockMapFile> {
        self.index.get(name).map(|&i| &self.files[i])
    }
}

fn parse_u64(value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Format(format!("{BLOCK_MAP}: {value:?} is not a size")))
}

fn decode_hash(value: &str) -> Result<BlockHash> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|e| Error::Format(format!("{BLOCK_MAP}: bad block hash {value:?}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::Format(format!("{BLOCK_MAP}: block hash {value:?} is not SHA-256")))
}

/// Checks a part's content block by block as it streams past.
pub struct BlockVerifier {
    name: String,
    expected: Vec<BlockHash>,
    hasher: Sha256,
    filled: u64,
    verified: usize,
}

impl BlockVerifier {
    pub fn update(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let take = ((BLOCK_SIZE - self.filled) as usize).min(data.len());
            self.hasher.update(&data[..take]);
            self.filled += take as u64;
            data = &data[take..];
            if self.filled == BLOCK_SIZE {
                self.close_block()?;
            }
        }
        Ok(())
    }

    /// Check the trailing partial block and the total block count.
    pub fn finish(mut self) -> Result<()> {
        if self.filled > 0 {
            self.close_block()?;
        }
        if self.verified != self.expected.len() {
            return Err(Error::Integrity(format!(
                "{}: block map lists {} blocks, content has {}",
                self.name,
                self.expected.len(),
                self.verified
            )));
        }
        Ok(())
    }

    fn close_block(&mut self) -> Result<()> {
        let digest = std::mem::take(&mut self.hasher).finalize();
        let index = self.verified;
        let expected = self.expected.get(index).ok_or_else(|| {
            Error::Integrity(format!(
                "{}: content has more blocks than the {} listed",
                self.name,
                self.expected.len()
            ))
        })?;
        if digest.as_slice() != expected {
            return Err(Error::Integrity(format!(
                "{}: block {index} does not match its hash",
                self.name
            )));
        }
        self.verified += 1;
        self.filled = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn hash_of(data: &[u8]) -> String {
        STANDARD.encode(Sha256::digest(data))
    }

    fn map_for(name: &str, data: &[u8]) -> String {
        let blocks: String = data
            .chunks(BLOCK_SIZE as usize)
            .map(|chunk| format!(r#"<Block Hash="{}" Size="{}"/>"#, hash_of(chunk), chunk.len()))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<BlockMap xmlns="http://schemas.microsoft.com/appx/2010/blockmap" HashMethod="http://www.w3.org/2001/04/xmlenc#sha256">
  <File Name="{name}" Size="{}" LfhSize="40">{blocks}</File>
</BlockMap>"#,
            data.len()
        )
    }

    #[test]
    fn parses_files_and_normalises_names() {
        let data = vec![7u8; 100_000];
        let map = BlockMap::parse(map_for("assets\\logo.png", &data).as_bytes()).unwrap();
        let file = map.file("assets/logo.png").unwrap();
        assert_eq!(file.size, 100_000);
        assert_eq!(file.blocks.len(), 2);
        assert_eq!(file.expected_blocks(), 2);
        assert_eq!(map.files().len(), 1);
    }

    #[test]
    fn verifier_accepts_matching_content_in_any_chunking() {
        let data: Vec<u8> = (0..150_000u32).map(|i| (i % 253) as u8).collect();
        let map = BlockMap::parse(map_for("a.bin", &data).as_bytes()).unwrap();
        let mut verifier = map.file("a.bin").unwrap().verifier();
        for chunk in data.chunks(10_007) {
            verifier.update(chunk).unwrap();
        }
        verifier.finish().unwrap();
    }

    #[test]
    fn verifier_rejects_altered_block() {
        let mut data = vec![1u8; 70_000];
        let map = BlockMap::parse(map_for("a.bin", &data).as_bytes()).unwrap();
        data[69_999] = 2;
        let mut verifier = map.file("a.bin").unwrap().verifier();
        verifier.update(&data).unwrap();
        assert_eq!(verifier.finish().unwrap_err().kind(), ErrorKind::IntegrityError);
    }

    #[test]
    fn verifier_rejects_extra_content() {
        let data = vec![1u8; 10];
        let map = BlockMap::parse(map_for("a.bin", &data).as_bytes()).unwrap();
        let mut verifier = map.file("a.bin").unwrap().verifier();
        let err = verifier.update(&vec![1u8; BLOCK_SIZE as usize + 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityError);
    }

    #[test]
    fn duplicate_file_is_format_error() {
        let xml = br#"<BlockMap><File Name="a" Size="0"/><File Name="a" Size="0"/></BlockMap>"#;
        assert_eq!(BlockMap::parse(xml).unwrap_err().kind(), ErrorKind::FormatError);
    }

    #[test]
    fn bad_hash_is_format_error() {
        let xml = br#"<BlockMap><File Name="a" Size="1"><Block Hash="AAAA"/></File></BlockMap>"#;
        assert_eq!(BlockMap::parse(xml).unwrap_err().kind(), ErrorKind::FormatError);
    }

    #[test]
    fn missing_root_is_format_error() {
        let xml = br#"<Other><File Name="a" Size="0"/></Other>"#;
        assert_eq!(BlockMap::parse(xml).unwrap_err().kind(), ErrorKind::FormatError);
    }
}
