use futures_core::Stream;

use crate::ArclinkConnection;
use arclink_rs_protocol::Record;

/// Convert an [`ArclinkConnection`] into a [`Stream`] of records.
///
/// The stream ends when [`ArclinkConnection::next`] returns `None`; the
/// reason is not observable through the stream.
pub fn record_stream(mut conn: ArclinkConnection) -> impl Stream<Item = Record> {
    async_stream::stream! {
        while let Some(record) = conn.next().await {
            yield record;
        }
    }
}
