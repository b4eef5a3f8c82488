//! Server-sent event frame decoding.
//!
//! Turns raw body chunks into `data:` payload strings. Bytes are buffered
//! until a full line is available, so multi-byte UTF-8 sequences split across
//! reads decode correctly.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::Result;

const DATA_PREFIX: &[u8] = b"data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental decoder for newline-delimited `data:` frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and collect the payloads of every completed line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|b| *b == b'\n')
            .filter_map(data_payload)
            .collect()
    }

    /// Flush the held-back fragment once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }

    /// Bytes currently held back waiting for a newline.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Extract the payload of a single line, if it is a forwardable data frame.
fn data_payload(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let value = line.strip_prefix(DATA_PREFIX)?;
    let value = value.strip_prefix(b" ").unwrap_or(value);
    let payload = String::from_utf8_lossy(value);

    if payload == DONE_SENTINEL {
        return None;
    }

    Some(payload.into_owned())
}

/// Adapt a body byte stream into a stream of frame payloads.
///
/// A body error is forwarded and ends the stream.
pub fn data_frames<S>(body: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = Result<Bytes>>,
{
    async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        futures::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for payload in decoder.push(&chunk) {
                yield Ok(payload);
            }
        }

        if let Some(payload) = decoder.finish() {
            yield Ok(payload);
        }
    }
}
