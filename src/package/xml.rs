//! Small helpers over `quick-xml` shared by the footprint part readers.

use std::fmt::Display;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{Error, Result};

pub(crate) fn xml_error(part: &str, err: impl Display) -> Error {
    Error::Format(format!("{part}: malformed XML: {err}"))
}

/// Unescaped value of the attribute whose local name is `name`.
pub(crate) fn attribute(part: &str, element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| xml_error(part, e))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(|e| xml_error(part, e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

pub(crate) fn required_attribute(part: &str, element: &BytesStart<'_>, name: &[u8]) -> Result<String> {
    attribute(part, element, name)?.ok_or_else(|| {
        Error::Format(format!(
            "{part}: <{}> lacks the {} attribute",
            String::from_utf8_lossy(element.local_name().as_ref()),
            String::from_utf8_lossy(name)
        ))
    })
}

/// Walk every element of `xml`, start and empty tags alike, in document order.
pub(crate) fn for_each_element(
    part: &str,
    xml: &[u8],
    mut visit: impl FnMut(&BytesStart<'_>) -> Result<()>,
) -> Result<()> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(part, e))? {
            Event::Start(element) | Event::Empty(element) => visit(&element)?,
            Event::Eof => return Ok(()),
            _ => {}
        }
        buf.clear();
    }
}

/// Local name of the document element.
pub(crate) fn root_element(part: &str, xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(part, e))? {
            Event::Start(element) | Event::Empty(element) => {
                return Ok(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
            }
            Event::Eof => return Err(Error::Format(format!("{part}: no document element"))),
            _ => {}
        }
        buf.clear();
    }
}
