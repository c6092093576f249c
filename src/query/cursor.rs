use bson::Document as BsonDocument;

/// A forward-only cursor over the documents one find produced.
///
/// Each call to `find` builds its own cursor; cursors are never shared between calls.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    docs: Vec<BsonDocument>,
    pos: usize,
}

impl Cursor {
    #[must_use]
    pub const fn new(docs: Vec<BsonDocument>) -> Self {
        Self { docs, pos: 0 }
    }

    pub fn advance(&mut self) -> Option<BsonDocument> {
        let d = self.docs.get(self.pos)?.clone();
        self.pos += 1;
        Some(d)
    }

    /// Documents not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.docs.len().saturating_sub(self.pos)
    }

    /// Consumes the cursor, returning the documents not yet consumed.
    #[must_use]
    pub fn to_vec(mut self) -> Vec<BsonDocument> {
        self.docs.split_off(self.pos.min(self.docs.len()))
    }
}

impl Iterator for Cursor {
    type Item = BsonDocument;
    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

impl ExactSizeIterator for Cursor {}
