//! Small XML helpers shared by the WebDAV and SOAP clients.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{ProviderError, ProviderResult};

/// Streaming builder for request bodies.
pub(crate) struct XmlBody {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlBody {
    pub(crate) fn new() -> ProviderResult<Self> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_error)?;
        Ok(Self { writer })
    }

    /// Opens `<name attr=...>`.
    pub(crate) fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> ProviderResult<()> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.writer
            .write_event(Event::Start(start))
            .map_err(xml_error)
    }

    pub(crate) fn close(&mut self, name: &str) -> ProviderResult<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    /// Writes `<name attr=.../>`.
    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> ProviderResult<()> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.writer
            .write_event(Event::Empty(start))
            .map_err(xml_error)
    }

    /// Writes escaped character data inside the open element.
    pub(crate) fn text_content(&mut self, text: &str) -> ProviderResult<()> {
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)
    }

    /// Writes `<name>text</name>` with `text` escaped.
    pub(crate) fn text(&mut self, name: &str, text: &str) -> ProviderResult<()> {
        self.open(name, &[])?;
        self.text_content(text)?;
        self.close(name)
    }

    pub(crate) fn finish(self) -> ProviderResult<String> {
        String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| ProviderError::internal("generated XML is not UTF-8").with_source(e))
    }
}

pub(crate) fn xml_error<E>(error: E) -> ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ProviderError::invalid_response(format!("XML error: {error}")).with_source(error)
}

/// Strips a namespace prefix: `d:href` becomes `href`.
pub(crate) fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rsplit(':').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_escaped_document() {
        let mut body = XmlBody::new().unwrap();
        body.open("a:root", &[("xmlns:a", "urn:x")]).unwrap();
        body.text("a:item", "Fish & <Chips>").unwrap();
        body.empty("a:flag", &[("on", "true")]).unwrap();
        body.close("a:root").unwrap();
        let xml = body.finish().unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<a:item>Fish &amp; &lt;Chips&gt;</a:item>"));
        assert!(xml.contains("<a:flag on=\"true\"/>"));
    }

    #[test]
    fn local_name_strips_prefix() {
        assert_eq!(local_name(b"d:href"), "href");
        assert_eq!(local_name(b"href"), "href");
        assert_eq!(local_name(b"t:CalendarItem"), "CalendarItem");
    }
}
