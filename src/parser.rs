use crate::config::READ_BUFFER_CAPACITY;
use crate::error::{RecordError, StreamError};
use crate::extract::{Extracted, Extractor, ParseEvent};
use bzip2::read::BzDecoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::iter::FusedIterator;
use std::path::Path;
use tracing::debug;

/// Byte source for dumps opened from disk.
pub type DumpSource = BufReader<Box<dyn Read + Send>>;

/// Single forward pass over a dump, yielding records as their `<page>` closes.
///
/// The first stream error ends iteration.
pub struct DumpReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    extractor: Extractor,
    depth: usize,
    finished: bool,
}

impl DumpReader<DumpSource> {
    /// Opens a plain or bzip2-compressed (`.bz2`) dump. The file closes when the reader drops.
    pub fn open(path: impl AsRef<Path>, extractor: Extractor) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| StreamError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let inner: Box<dyn Read + Send> = if is_bz2(path) {
            debug!(path = %path.display(), "Reading bzip2-compressed dump");
            Box::new(BzDecoder::new(file))
        } else {
            Box::new(file)
        };

        Ok(Self::from_reader(
            BufReader::with_capacity(READ_BUFFER_CAPACITY, inner),
            extractor,
        ))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn from_reader(source: R, extractor: Extractor) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::with_capacity(8192),
            extractor,
            depth: 0,
            finished: false,
        }
    }

    fn next_item(&mut self) -> Result<Option<Extracted>, StreamError> {
        loop {
            self.buf.clear();
            let position = self.reader.buffer_position() as u64;
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|source| StreamError::Xml { position, source })?;

            let extracted = match event {
                Event::Start(ref e) => {
                    self.depth += 1;
                    let name = element_name(e.name().into_inner(), position)?;
                    self.extractor.handle(ParseEvent::ElementStart(name))
                }
                Event::Empty(ref e) => {
                    let name = element_name(e.name().into_inner(), position)?;
                    self.extractor.handle(ParseEvent::ElementStart(name));
                    self.extractor.handle(ParseEvent::ElementEnd(name))
                }
                Event::End(ref e) => {
                    self.depth = self.depth.saturating_sub(1);
                    let name = element_name(e.name().into_inner(), position)?;
                    self.extractor.handle(ParseEvent::ElementEnd(name))
                }
                Event::Text(ref e) => match e.unescape() {
                    Ok(text) => self
                        .extractor
                        .handle(ParseEvent::CharacterData(&normalize_newlines(&text))),
                    Err(quick_xml::Error::EscapeError(err)) => self
                        .extractor
                        .handle(ParseEvent::Fault(RecordError::Unescape(err.to_string()))),
                    Err(source) => return Err(StreamError::Xml { position, source }),
                },
                Event::CData(ref e) => {
                    let text = std::str::from_utf8(e)
                        .map_err(|source| StreamError::Encoding { position, source })?;
                    self.extractor
                        .handle(ParseEvent::CharacterData(&normalize_newlines(text)))
                }
                Event::Eof => {
                    if self.depth > 0 {
                        let element = if self.extractor.in_record() {
                            self.extractor.names().record.clone()
                        } else {
                            "document".to_string()
                        };
                        return Err(StreamError::Truncated { element });
                    }
                    return Ok(None);
                }
                _ => None,
            };

            if extracted.is_some() {
                return Ok(extracted);
            }
        }
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<Extracted, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: BufRead> FusedIterator for DumpReader<R> {}

fn element_name(raw: &[u8], position: u64) -> Result<&str, StreamError> {
    std::str::from_utf8(raw).map_err(|source| StreamError::Encoding { position, source })
}

/// XML line-end handling: `\r\n` and lone `\r` both become `\n`.
fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn is_bz2(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "bz2")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElementNames;
    use crate::models::RawRecord;

    fn read_all(xml: &[u8]) -> Vec<Result<Extracted, StreamError>> {
        DumpReader::from_reader(xml, Extractor::new(ElementNames::default())).collect()
    }

    fn records(xml: &str) -> Vec<RawRecord> {
        read_all(xml.as_bytes())
            .into_iter()
            .map(|item| match item {
                Ok(Extracted::Record(r)) => r,
                other => panic!("unexpected item: {:?}", other),
            })
            .collect()
    }

    #[test]
    fn reads_records_in_order() {
        let xml = r#"<mediawiki>
            <siteinfo><sitename>Wikipedia</sitename></siteinfo>
            <page><title>A</title><ns>0</ns><revision><text>first</text></revision></page>
            <page><title>B</title><ns>0</ns><revision><text>second</text></revision></page>
        </mediawiki>"#;
        let recs = records(xml);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].title, "A");
        assert_eq!(recs[0].body, "first");
        assert_eq!(recs[1].title, "B");
        assert_eq!(recs[1].body, "second");
    }

    #[test]
    fn body_whitespace_is_preserved() {
        let xml = "<m><page><title>A</title><text>line one\n\n  line two\n</text></page></m>";
        assert_eq!(records(xml)[0].body, "line one\n\n  line two\n");
    }

    #[test]
    fn entities_are_unescaped() {
        let xml = "<m><page><title>AT&amp;T</title><text>&lt;ref&gt;x&lt;/ref&gt; &quot;q&quot;</text></page></m>";
        let recs = records(xml);
        assert_eq!(recs[0].title, "AT&T");
        assert_eq!(recs[0].body, "<ref>x</ref> \"q\"");
    }

    #[test]
    fn crlf_line_ends_become_lf() {
        let xml = "<m><page><title>A</title><text>== H ==\r\nl1\r\nl2\rl3<![CDATA[\r\nc]]></text></page></m>";
        assert_eq!(records(xml)[0].body, "== H ==\nl1\nl2\nl3\nc");
    }

    #[test]
    fn namespaced_element_names_are_kept_whole() {
        let xml = "<m><page><title>A</title><x:meta/><text>x</text></page></m>";
        let recs = records(xml);
        assert_eq!(recs[0].title, "A");
        assert_eq!(recs[0].body, "x");
    }

    #[test]
    fn cdata_is_appended() {
        let xml = "<m><page><title>A</title><text>before <![CDATA[<raw>]]> after</text></page></m>";
        assert_eq!(records(xml)[0].body, "before <raw> after");
    }

    #[test]
    fn empty_elements_do_not_break_records() {
        let xml = r#"<m><page><title>Rust</title><redirect title="Rust (language)" /><text>#REDIRECT</text></page></m>"#;
        let recs = records(xml);
        assert_eq!(recs[0].title, "Rust");
        assert_eq!(recs[0].body, "#REDIRECT");
    }

    #[test]
    fn empty_body_element() {
        let xml = "<m><page><title>C</title><text /></page></m>";
        let recs = records(xml);
        assert_eq!(recs[0].title, "C");
        assert_eq!(recs[0].body, "");
    }

    #[test]
    fn unknown_entity_rejects_record_and_continues() {
        let xml = "<m><page><title>Bad</title><text>a&nbsp;b</text></page><page><title>Good</title><text>ok</text></page></m>";
        let items = read_all(xml.as_bytes());
        assert_eq!(items.len(), 2);
        match &items[0] {
            Ok(Extracted::Rejected(f)) => {
                assert_eq!(f.context(), "Bad");
                assert!(matches!(f.error, RecordError::Unescape(_)));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(matches!(&items[1], Ok(Extracted::Record(r)) if r.title == "Good"));
    }

    #[test]
    fn mismatched_end_tag_is_fatal() {
        let xml = "<m><page><title>A</title><text>x</text></page><page><title>B</text></page></m>";
        let items = read_all(xml.as_bytes());
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(Extracted::Record(r)) if r.title == "A"));
        assert!(matches!(&items[1], Err(StreamError::Xml { .. })));
    }

    #[test]
    fn truncated_dump_is_fatal() {
        let xml = "<m><page><title>A</title><text>x</text></page><page><title>B</title>";
        let items = read_all(xml.as_bytes());
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(Extracted::Record(_))));
        match &items[1] {
            Err(StreamError::Truncated { element }) => assert_eq!(element, "page"),
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn invalid_utf8_in_cdata_is_fatal() {
        let mut xml = b"<m><page><title>A</title><text><![CDATA[".to_vec();
        xml.extend_from_slice(&[0xff, 0xfe]);
        xml.extend_from_slice(b"]]></text></page></m>");
        let items = read_all(&xml);
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(StreamError::Encoding { .. })));
    }

    #[test]
    fn iteration_stops_after_fatal_error() {
        let xml = "<m><page><title>A</wrong></page></m>";
        let mut reader = DumpReader::from_reader(xml.as_bytes(), Extractor::new(ElementNames::default()));
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(read_all(b"<mediawiki></mediawiki>").is_empty());
    }

    #[test]
    fn missing_file_is_open_error() {
        let result = DumpReader::open(
            "/nonexistent/dump.xml",
            Extractor::new(ElementNames::default()),
        );
        assert!(matches!(result, Err(StreamError::Open { .. })));
    }

    #[test]
    fn bz2_detection() {
        assert!(is_bz2(Path::new("enwiki-latest-pages-articles.xml.bz2")));
        assert!(!is_bz2(Path::new("dump.xml")));
        assert!(!is_bz2(Path::new("bz2")));
    }
}
