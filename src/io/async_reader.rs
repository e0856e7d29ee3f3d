//! Asynchronous ride script reader with batch interface
//!
//! # Architecture
//!
//! ```text
//! Script CSV → AsyncReader → Batches of ScriptEvents
//!                  ↓
//!           csv_format module
//!           (ScriptCsvRecord, convert_script_record)
//! ```
//!
//! Rows that fail to parse are logged and skipped; the batch carries only
//! valid events, in file order.

use crate::io::csv_format::{convert_script_record, ScriptCsvRecord};
use crate::types::ScriptEvent;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous script reader
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read up to `batch_size` script events
    ///
    /// Returns an empty vector at end of file.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<ScriptEvent> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<ScriptCsvRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(record)) => match convert_script_record(record) {
                    Ok(event) => batch.push(event),
                    Err(e) => warn!(error = %e, "skipping script row"),
                },
                Some(Err(e)) => warn!(error = %e, "script CSV parse error"),
                None => break,
            }
        }

        batch
    }
}
