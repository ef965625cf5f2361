//! Splits a symbol list into per-connection batches.

/// Chunk `symbols` into batches of at most `max_per_conn`, preserving order.
///
/// A limit of zero is treated as one so every symbol still gets a connection.
pub fn plan_batches(symbols: &[String], max_per_conn: usize) -> Vec<Vec<String>> {
    symbols.chunks(max_per_conn.max(1)).map(|c| c.to_vec()).collect()
}
