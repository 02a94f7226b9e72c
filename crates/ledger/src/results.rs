//! Statement results.

use std::collections::VecDeque;

use crate::types::Document;

/// Documents returned by one statement.
///
/// A result is a forward-only cursor: it is consumed by iterating and
/// cannot be rewound. Each document is yielded exactly once.
#[derive(Debug, Default)]
pub struct StatementResult {
    documents: VecDeque<Document>,
}

impl StatementResult {
    /// Creates a result over the given documents.
    #[must_use]
    pub fn new(documents: impl IntoIterator<Item = Document>) -> Self {
        Self { documents: documents.into_iter().collect() }
    }

    /// Creates a result with no documents.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl Iterator for StatementResult {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.documents.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.documents.len(), Some(self.documents.len()))
    }
}

impl ExactSizeIterator for StatementResult {}
