use std::collections::HashMap;

use super::CONTENT_TYPES;
use super::xml::{for_each_element, required_attribute};
use crate::error::{Error, Result};

/// Parsed `[Content_Types].xml`: content types by extension and by part.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut types = ContentTypes::default();
        let mut saw_root = false;

        for_each_element(CONTENT_TYPES, xml, |element| {
            match element.local_name().as_ref() {
                b"Types" => saw_root = true,
                b"Default" => {
                    let extension = required_attribute(CONTENT_TYPES, element, b"Extension")?;
                    let content_type = required_attribute(CONTENT_TYPES, element, b"ContentType")?;
                    types
                        .defaults
                        .insert(extension.to_ascii_lowercase(), content_type);
                }
                b"Override" => {
                    let part = required_attribute(CONTENT_TYPES, element, b"PartName")?;
                    let content_type = required_attribute(CONTENT_TYPES, element, b"ContentType")?;
                    types
                        .overrides
                        .insert(normalize_part(&part), content_type);
                }
                _ => {}
            }
            Ok(())
        })?;

        if !saw_root {
            return Err(Error::Format(format!("{CONTENT_TYPES}: missing <Types> element")));
        }
        Ok(types)
    }

    /// Content type declared for a part, by override first, then by extension.
    pub fn content_type(&self, name: &str) -> Option<&str> {
        if let Some(content_type) = self.overrides.get(&normalize_part(name)) {
            return Some(content_type.as_str());
        }
        extension(name)
            .and_then(|ext| self.defaults.get(&ext.to_ascii_lowercase()))
            .map(String::as_str)
    }

    pub fn covers(&self, name: &str) -> bool {
        self.content_type(name).is_some()
    }
}

fn normalize_part(name: &str) -> String {
    name.trim_start_matches('/').replace('\\', "/").to_ascii_lowercase()
}

fn extension(name: &str) -> Option<&str> {
    let file = name.rsplit('/').next().unwrap_or(name);
    file.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}
