//! Tag-driven state machine that turns parse events into records.
//!
//! The machine only tracks which field the current character data belongs to.
//! It does not validate nesting; the XML reader in [`crate::parser`] does that.

use crate::config::{ElementNames, UNKNOWN_TITLE};
use crate::error::RecordError;
use crate::models::RawRecord;
use tracing::trace;

/// One event from the underlying XML reader.
#[derive(Debug)]
pub enum ParseEvent<'a> {
    ElementStart(&'a str),
    CharacterData(&'a str),
    ElementEnd(&'a str),
    /// Character data that could not be decoded
    Fault(RecordError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldState {
    #[default]
    Idle,
    InTitle,
    InBody,
}

/// A record the extractor could not produce.
#[derive(Debug)]
pub struct RecordFailure {
    pub title: String,
    pub error: RecordError,
}

impl RecordFailure {
    /// Title for failure reports, `unknown` when the record had none.
    pub fn context(&self) -> &str {
        if self.title.is_empty() {
            UNKNOWN_TITLE
        } else {
            &self.title
        }
    }
}

#[derive(Debug)]
pub enum Extracted {
    Record(RawRecord),
    Rejected(RecordFailure),
}

pub struct Extractor {
    names: ElementNames,
    state: FieldState,
    title: String,
    body: String,
    fault: Option<RecordError>,
    max_body_bytes: Option<usize>,
    in_record: bool,
}

impl Extractor {
    pub fn new(names: ElementNames) -> Self {
        Self {
            names,
            state: FieldState::Idle,
            title: String::new(),
            body: String::new(),
            fault: None,
            max_body_bytes: None,
            in_record: false,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn state(&self) -> FieldState {
        self.state
    }

    pub fn names(&self) -> &ElementNames {
        &self.names
    }

    /// True between the start and end of a record-boundary element.
    pub fn in_record(&self) -> bool {
        self.in_record
    }

    /// Feeds one event; returns a finished record when a boundary element closes.
    pub fn handle(&mut self, event: ParseEvent<'_>) -> Option<Extracted> {
        match event {
            ParseEvent::ElementStart(name) => {
                if name == self.names.record {
                    self.in_record = true;
                }
                self.state = if name == self.names.title {
                    FieldState::InTitle
                } else if name == self.names.body {
                    FieldState::InBody
                } else {
                    FieldState::Idle
                };
                None
            }
            ParseEvent::CharacterData(text) => {
                match self.state {
                    FieldState::InTitle => self.title.push_str(text),
                    FieldState::InBody => self.append_body(text),
                    FieldState::Idle => {}
                }
                None
            }
            ParseEvent::ElementEnd(name) => {
                if name == self.names.record {
                    Some(self.finish_record())
                } else {
                    self.state = FieldState::Idle;
                    None
                }
            }
            ParseEvent::Fault(error) => {
                if self.state != FieldState::Idle && self.fault.is_none() {
                    self.fault = Some(error);
                }
                None
            }
        }
    }

    fn append_body(&mut self, text: &str) {
        if self.fault.is_some() {
            return;
        }
        if let Some(limit) = self.max_body_bytes {
            if self.body.len() + text.len() > limit {
                // Release the partial body now; the record is rejected at its boundary.
                self.body = String::new();
                self.fault = Some(RecordError::Oversized { limit });
                return;
            }
        }
        self.body.push_str(text);
    }

    fn finish_record(&mut self) -> Extracted {
        let title = std::mem::take(&mut self.title);
        let body = std::mem::take(&mut self.body);
        let fault = self.fault.take();
        self.state = FieldState::Idle;
        self.in_record = false;

        match fault {
            Some(error) => Extracted::Rejected(RecordFailure { title, error }),
            None => {
                trace!(title = %title, bytes = body.len(), "Record extracted");
                Extracted::Record(RawRecord { title, body })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ParseEvent::*;

    fn extractor() -> Extractor {
        Extractor::new(ElementNames::default())
    }

    fn feed(ex: &mut Extractor, events: Vec<ParseEvent<'_>>) -> Vec<Extracted> {
        events.into_iter().filter_map(|e| ex.handle(e)).collect()
    }

    fn page<'a>(title: &'a str, body: &'a str) -> Vec<ParseEvent<'a>> {
        vec![
            ElementStart("page"),
            ElementStart("title"),
            CharacterData(title),
            ElementEnd("title"),
            ElementStart("revision"),
            ElementStart("text"),
            CharacterData(body),
            ElementEnd("text"),
            ElementEnd("revision"),
            ElementEnd("page"),
        ]
    }

    fn unwrap_record(item: &Extracted) -> &RawRecord {
        match item {
            Extracted::Record(r) => r,
            Extracted::Rejected(f) => panic!("unexpected rejection: {:?}", f),
        }
    }

    #[test]
    fn emits_record_on_boundary() {
        let mut ex = extractor();
        let out = feed(&mut ex, page("Rust", "body text"));
        assert_eq!(out.len(), 1);
        let rec = unwrap_record(&out[0]);
        assert_eq!(rec.title, "Rust");
        assert_eq!(rec.body, "body text");
    }

    #[test]
    fn nothing_emitted_before_boundary_closes() {
        let mut ex = extractor();
        let mut events = page("Rust", "body");
        events.pop();
        assert!(feed(&mut ex, events).is_empty());
        assert!(ex.in_record());
    }

    #[test]
    fn fragmented_title_is_concatenated_for_every_split() {
        let full = "Rust (programming language)";
        for split in 0..=full.len() {
            let mut ex = extractor();
            let (a, b) = full.split_at(split);
            let events = vec![
                ElementStart("page"),
                ElementStart("title"),
                CharacterData(a),
                CharacterData(b),
                ElementEnd("title"),
                ElementEnd("page"),
            ];
            let out = feed(&mut ex, events);
            assert_eq!(unwrap_record(&out[0]).title, full, "split at {}", split);
        }
    }

    #[test]
    fn fragmented_body_is_concatenated_in_order() {
        let mut ex = extractor();
        let pieces = ["'''Rust'''", " is ", "a ", "[[language]]"];
        let mut events = vec![ElementStart("page"), ElementStart("text")];
        events.extend(pieces.iter().map(|p| CharacterData(p)));
        events.push(ElementEnd("text"));
        events.push(ElementEnd("page"));
        let out = feed(&mut ex, events);
        assert_eq!(unwrap_record(&out[0]).body, pieces.concat());
    }

    #[test]
    fn stray_character_data_is_discarded() {
        let mut ex = extractor();
        let events = vec![
            ElementStart("page"),
            CharacterData("\n    "),
            ElementStart("title"),
            CharacterData("A"),
            ElementEnd("title"),
            CharacterData("after title"),
            ElementStart("id"),
            CharacterData("42"),
            ElementEnd("id"),
            ElementEnd("page"),
        ];
        let out = feed(&mut ex, events);
        let rec = unwrap_record(&out[0]);
        assert_eq!(rec.title, "A");
        assert_eq!(rec.body, "");
    }

    #[test]
    fn state_transitions() {
        let mut ex = extractor();
        assert_eq!(ex.state(), FieldState::Idle);
        ex.handle(ElementStart("title"));
        assert_eq!(ex.state(), FieldState::InTitle);
        ex.handle(ElementEnd("title"));
        assert_eq!(ex.state(), FieldState::Idle);
        ex.handle(ElementStart("text"));
        assert_eq!(ex.state(), FieldState::InBody);
        ex.handle(ElementStart("nested"));
        assert_eq!(ex.state(), FieldState::Idle);
    }

    #[test]
    fn accumulators_reset_between_records() {
        let mut ex = extractor();
        let mut events = page("First", "one");
        events.extend(page("Second", "two"));
        let out = feed(&mut ex, events);
        assert_eq!(out.len(), 2);
        assert_eq!(unwrap_record(&out[1]).title, "Second");
        assert_eq!(unwrap_record(&out[1]).body, "two");
        assert_eq!(ex.state(), FieldState::Idle);
        assert!(!ex.in_record());
    }

    #[test]
    fn empty_record() {
        let mut ex = extractor();
        let out = feed(&mut ex, vec![ElementStart("page"), ElementEnd("page")]);
        assert_eq!(unwrap_record(&out[0]), &RawRecord::default());
    }

    #[test]
    fn fault_rejects_only_its_record() {
        let mut ex = extractor();
        let mut events = page("Good", "one");
        events.extend(vec![
            ElementStart("page"),
            ElementStart("title"),
            CharacterData("Bad"),
            ElementEnd("title"),
            ElementStart("text"),
            Fault(RecordError::Unescape("unknown entity".to_string())),
            ElementEnd("text"),
            ElementEnd("page"),
        ]);
        events.extend(page("Next", "three"));

        let out = feed(&mut ex, events);
        assert_eq!(out.len(), 3);
        assert_eq!(unwrap_record(&out[0]).title, "Good");
        match &out[1] {
            Extracted::Rejected(f) => {
                assert_eq!(f.context(), "Bad");
                assert!(matches!(f.error, RecordError::Unescape(_)));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(unwrap_record(&out[2]).title, "Next");
    }

    #[test]
    fn fault_outside_tracked_field_is_ignored() {
        let mut ex = extractor();
        let mut events = vec![
            ElementStart("page"),
            ElementStart("comment"),
            Fault(RecordError::Unescape("x".to_string())),
            ElementEnd("comment"),
        ];
        events.extend(vec![
            ElementStart("title"),
            CharacterData("T"),
            ElementEnd("title"),
            ElementEnd("page"),
        ]);
        let out = feed(&mut ex, events);
        assert_eq!(unwrap_record(&out[0]).title, "T");
    }

    #[test]
    fn rejected_without_title_reports_unknown() {
        let mut ex = extractor();
        let events = vec![
            ElementStart("page"),
            ElementStart("text"),
            Fault(RecordError::Unescape("x".to_string())),
            ElementEnd("text"),
            ElementEnd("page"),
        ];
        let out = feed(&mut ex, events);
        match &out[0] {
            Extracted::Rejected(f) => assert_eq!(f.context(), "unknown"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn oversized_body_is_rejected() {
        let mut ex = extractor().with_max_body_bytes(Some(8));
        let events = vec![
            ElementStart("page"),
            ElementStart("title"),
            CharacterData("Big"),
            ElementEnd("title"),
            ElementStart("text"),
            CharacterData("12345"),
            CharacterData("67890"),
            ElementEnd("text"),
            ElementEnd("page"),
        ];
        let mut out = feed(&mut ex, events);
        match out.remove(0) {
            Extracted::Rejected(f) => {
                assert_eq!(f.title, "Big");
                assert!(matches!(f.error, RecordError::Oversized { limit: 8 }));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn body_at_limit_is_kept() {
        let mut ex = extractor().with_max_body_bytes(Some(5));
        let out = feed(&mut ex, page("Fits", "12345"));
        assert_eq!(unwrap_record(&out[0]).body, "12345");
    }

    #[test]
    fn custom_element_names() {
        let names = ElementNames {
            record: "doc".to_string(),
            title: "name".to_string(),
            body: "content".to_string(),
        };
        let mut ex = Extractor::new(names);
        let events = vec![
            ElementStart("doc"),
            ElementStart("name"),
            CharacterData("N"),
            ElementEnd("name"),
            ElementStart("content"),
            CharacterData("C"),
            ElementEnd("content"),
            ElementEnd("doc"),
        ];
        let out = feed(&mut ex, events);
        let rec = unwrap_record(&out[0]);
        assert_eq!((rec.title.as_str(), rec.body.as_str()), ("N", "C"));
    }
}
