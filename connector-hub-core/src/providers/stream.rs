//! Streaming decoder: transport bytes to unified stream chunks
//!
//! Bytes are split into SSE-style records, each record's payload is decoded
//! as the vendor's stream event, and the event is fed through the adapter's
//! accumulator. The whole pipeline is pull-driven: nothing is read from the
//! transport until the consumer asks for the next chunk.

use crate::protocol::{CompletionResponse, StreamAccumulator, StreamChunk};
use crate::providers::adapter::VendorAdapter;
use crate::providers::error::{ProviderError, ProviderResult, RawError};
use async_stream::stream;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// A boxed stream of unified chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamChunk>> + Send>>;

/// Where one record ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSeparator {
    /// Every `data:` line is its own record
    Newline,
    /// `data:` lines accumulate until a blank line
    BlankLine,
}

/// One complete record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseRecord {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental record splitter.
///
/// Holds incomplete trailing bytes across reads. Lines may end in `\n` or
/// `\r\n`. Comment lines (leading `:`) and unknown fields are dropped.
#[derive(Debug)]
pub struct RecordDecoder {
    separator: RecordSeparator,
    buffer: BytesMut,
    event: Option<String>,
    data: Vec<String>,
}

impl RecordDecoder {
    pub fn new(separator: RecordSeparator) -> Self {
        Self {
            separator,
            buffer: BytesMut::with_capacity(4096),
            event: None,
            data: Vec::new(),
        }
    }

    /// Feed bytes, returning every record completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseRecord> {
        self.buffer.extend_from_slice(bytes);
        let mut records = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let mut line = &line[..pos];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            self.process_line(line, &mut records);
        }

        records
    }

    /// Flush whatever is left at end of stream
    pub fn finish(&mut self) -> Vec<SseRecord> {
        let mut records = Vec::new();
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let line = rest.strip_suffix(b"\r").unwrap_or(&rest[..]);
            self.process_line(line, &mut records);
        }
        self.flush(&mut records);
        records
    }

    /// Bytes held back waiting for a line ending
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn process_line(&mut self, line: &[u8], records: &mut Vec<SseRecord>) {
        let line = String::from_utf8_lossy(line);

        if line.is_empty() {
            if self.separator == RecordSeparator::BlankLine {
                self.flush(records);
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };

        match field {
            "data" => match self.separator {
                RecordSeparator::Newline => records.push(SseRecord {
                    event: self.event.take(),
                    data: value.to_string(),
                }),
                RecordSeparator::BlankLine => self.data.push(value.to_string()),
            },
            "event" => self.event = Some(value.to_string()),
            _ if self.separator == RecordSeparator::Newline && line.starts_with('{') => {
                // bare NDJSON line
                records.push(SseRecord {
                    event: self.event.take(),
                    data: line.to_string(),
                });
            }
            _ => {}
        }
    }

    fn flush(&mut self, records: &mut Vec<SseRecord>) {
        if self.data.is_empty() {
            self.event = None;
            return;
        }
        records.push(SseRecord {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        });
    }
}

enum Read {
    Cancelled,
    Bytes(Bytes),
    Failed(reqwest::Error),
    Eof,
}

/// Decode a live byte stream into unified chunks.
///
/// Ends at the grammar's sentinel or at EOF. A record that is not valid JSON
/// for the vendor's event type is logged and skipped. Vendor error events and
/// transport failures are mapped and end the stream. Cancellation ends the
/// stream with [`ProviderError::Cancelled`].
pub fn decode_stream<A, S>(adapter: A, bytes: S, cancel: CancellationToken, request_id: Uuid) -> ChunkStream
where
    A: VendorAdapter,
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    Box::pin(stream! {
        let grammar = adapter.stream_grammar();
        let mut decoder = RecordDecoder::new(grammar.separator());
        let mut acc = A::Accumulator::default();
        let mut bytes = Box::pin(bytes);

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => Read::Cancelled,
                next = bytes.next() => match next {
                    Some(Ok(chunk)) => Read::Bytes(chunk),
                    Some(Err(e)) => Read::Failed(e),
                    None => Read::Eof,
                },
            };

            let (records, eof) = match read {
                Read::Cancelled => {
                    debug!("Stream cancelled [request_id: {}]", request_id);
                    yield Err(ProviderError::Cancelled);
                    return;
                }
                Read::Failed(e) => {
                    warn!("Stream transport error from {} [request_id: {}]: {}", adapter.name(), request_id, e);
                    yield Err(ProviderError::from(adapter.map_error(RawError::Transport(&e))));
                    return;
                }
                Read::Bytes(chunk) => (decoder.push(&chunk), false),
                Read::Eof => (decoder.finish(), true),
            };

            for record in records {
                if grammar.is_sentinel(&record.data) {
                    debug!("Stream from {} finished [request_id: {}]", adapter.name(), request_id);
                    return;
                }

                let event = match serde_json::from_str::<A::StreamEvent>(&record.data) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(
                            "Skipping undecodable {} stream record {:?} [request_id: {}]: {}",
                            adapter.name(),
                            record.event.as_deref().unwrap_or("message"),
                            request_id,
                            e
                        );
                        continue;
                    }
                };

                match adapter.transform_stream_event(event, &mut acc) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Stream error event from {} [request_id: {}]: {}", adapter.name(), request_id, e);
                        yield Err(e);
                        return;
                    }
                }
            }

            if eof {
                debug!("Stream from {} reached EOF [request_id: {}]", adapter.name(), request_id);
                return;
            }
        }
    })
}

/// Drain a chunk stream into an accumulator, stopping at the first error
pub async fn collect_stream(mut stream: ChunkStream) -> ProviderResult<StreamAccumulator> {
    let mut acc = StreamAccumulator::new();
    while let Some(chunk) = stream.next().await {
        acc.apply(&chunk?);
    }
    Ok(acc)
}

/// Drain a chunk stream into a complete response
pub async fn collect_response(
    stream: ChunkStream,
    id: impl Into<String>,
    model: impl Into<String>,
) -> ProviderResult<CompletionResponse> {
    Ok(collect_stream(stream).await?.into_response(id, model))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(records: &[SseRecord]) -> Vec<&str> {
        records.iter().map(|r| r.data.as_str()).collect()
    }

    #[test]
    fn test_newline_records_split_across_reads() {
        let mut decoder = RecordDecoder::new(RecordSeparator::Newline);
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        assert_eq!(decoder.pending(), 11);
        let records = decoder.push(b"1}\n\ndata: [DONE]\n\n");
        assert_eq!(data(&records), vec!["{\"a\":1}", "[DONE]"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut decoder = RecordDecoder::new(RecordSeparator::Newline);
        let records = decoder.push(b": keep-alive\r\ndata: {}\r\n\r\nid: 7\r\n");
        assert_eq!(data(&records), vec!["{}"]);
    }

    #[test]
    fn test_blank_line_grammar_with_event_names() {
        let mut decoder = RecordDecoder::new(RecordSeparator::BlankLine);
        let records = decoder.push(b"event: ping\ndata: {\"type\":\"ping\"}\n");
        assert!(records.is_empty());
        let records = decoder.push(b"\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event.as_deref(), Some("ping"));
        assert_eq!(records[1].event.as_deref(), Some("message_stop"));
    }

    #[test]
    fn test_multi_line_data_is_joined() {
        let mut decoder = RecordDecoder::new(RecordSeparator::BlankLine);
        let records = decoder.push(b"data: {\"a\":\ndata: 1}\n\n");
        assert_eq!(data(&records), vec!["{\"a\":\n1}"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_record() {
        let mut decoder = RecordDecoder::new(RecordSeparator::BlankLine);
        assert!(decoder.push(b"data: {\"x\":true}").is_empty());
        assert_eq!(data(&decoder.finish()), vec!["{\"x\":true}"]);

        let mut decoder = RecordDecoder::new(RecordSeparator::Newline);
        assert!(decoder.push(b"data: {}\r").is_empty());
        assert_eq!(data(&decoder.finish()), vec!["{}"]);
    }

    #[test]
    fn test_utf8_split_inside_line() {
        let text = "data: {\"t\":\"héllo\"}\n".as_bytes();
        let mut decoder = RecordDecoder::new(RecordSeparator::Newline);
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;
        assert!(decoder.push(&text[..split]).is_empty());
        assert_eq!(data(&decoder.push(&text[split..])), vec!["{\"t\":\"héllo\"}"]);
    }

    #[test]
    fn test_bare_json_lines() {
        let mut decoder = RecordDecoder::new(RecordSeparator::Newline);
        assert_eq!(data(&decoder.push(b"{\"n\":1}\n")), vec!["{\"n\":1}"]);
    }
}
