//! Rendering of statement results.

use quickstart_ledger::Document;

/// Renders each document as indented text, lazily and in order.
pub fn render_documents(
    documents: impl IntoIterator<Item = Document>,
) -> impl Iterator<Item = String> {
    documents.into_iter().map(|document| document.to_pretty_string())
}

/// Logs every document of a result at INFO and returns how many were printed.
///
/// The result is consumed; it cannot be printed twice.
pub fn print_documents(documents: impl IntoIterator<Item = Document>) -> usize {
    let mut printed = 0;
    for rendered in render_documents(documents) {
        printed += 1;
        tracing::info!("{rendered}");
    }
    printed
}
