use serde::Serialize;

/// A completed `<page>` exactly as it appeared in the dump.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRecord {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanRecord {
    pub title: String,
    pub text: String,
}

/// Unit of work for the writer pool. `id` is the dispatch sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: u64,
    pub records: Vec<CleanRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Groups cleaned records into fixed-size batches, preserving arrival order.
pub struct Batcher {
    size: usize,
    next_id: u64,
    current: Vec<CleanRecord>,
}

impl Batcher {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            next_id: 0,
            current: Vec::with_capacity(size),
        }
    }

    /// Returns a full batch once `size` records have been pushed.
    pub fn push(&mut self, record: CleanRecord) -> Option<Batch> {
        self.current.push(record);
        if self.current.len() >= self.size {
            Some(self.take())
        } else {
            None
        }
    }

    /// Returns the trailing partial batch, if any records remain.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn take(&mut self) -> Batch {
        let records = std::mem::replace(&mut self.current, Vec::with_capacity(self.size));
        let id = self.next_id;
        self.next_id += 1;
        Batch { id, records }
    }
}
