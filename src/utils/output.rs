/// Bounded output collection
///
/// stdout and stderr are drained chunk by chunk into per-stream buffers that
/// never grow beyond their limit. The first chunk that does not fit marks the
/// buffer as overflowed and wakes the runner, which then kills the process.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;

const CHUNK_SIZE: usize = 8192;

/// Capture buffer for one stream
#[derive(Debug)]
pub struct OutputBuffer {
    data: Mutex<Vec<u8>>,
    limit: usize,
    overflowed: AtomicBool,
}

impl OutputBuffer {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(Vec::new()),
            limit,
            overflowed: AtomicBool::new(false),
        })
    }

    /// Append a chunk. Returns `false` once the limit would be exceeded; the
    /// part that still fits is kept.
    pub fn append(&self, chunk: &[u8]) -> bool {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let remaining = self.limit.saturating_sub(data.len());
        if chunk.len() > remaining {
            data.extend_from_slice(&chunk[..remaining]);
            self.overflowed.store(true, Ordering::Release);
            return false;
        }
        data.extend_from_slice(chunk);
        true
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Captured bytes as text, bounded to `max_bytes`
    pub fn to_text(&self, max_bytes: usize) -> String {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        bounded_utf8(&data, max_bytes)
    }
}

/// Drain `stream` into `sink` until EOF, a read error, or overflow.
/// Overflow is signalled through `overflow`.
pub async fn collect_stream<R>(mut stream: R, sink: Arc<OutputBuffer>, overflow: Arc<Notify>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if !sink.append(&chunk[..n]) {
                    overflow.notify_one();
                    break;
                }
            }
            Err(e) => {
                log::debug!("output stream read failed: {}", e);
                break;
            }
        }
    }
}

/// Decode lossily and cut at a char boundary so the result is at most
/// `max_bytes` long. Replacement characters can make lossy text longer than
/// the raw bytes, hence the second cut.
pub fn bounded_utf8(bytes: &[u8], max_bytes: usize) -> String {
    let raw = &bytes[..bytes.len().min(max_bytes)];
    let mut text = String::from_utf8_lossy(raw).into_owned();
    if text.len() > max_bytes {
        let mut cut = max_bytes;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_within_limit() {
        let buffer = OutputBuffer::new(8);
        assert!(buffer.append(b"abcd"));
        assert!(buffer.append(b"efgh"));
        assert!(!buffer.overflowed());
        assert_eq!(buffer.to_text(8), "abcdefgh");
    }

    #[test]
    fn test_append_over_limit_keeps_prefix() {
        let buffer = OutputBuffer::new(6);
        assert!(buffer.append(b"abcd"));
        assert!(!buffer.append(b"efgh"));
        assert!(buffer.overflowed());
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.to_text(6), "abcdef");
    }

    #[test]
    fn test_bounded_utf8_respects_char_boundaries() {
        let text = "héllo";
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(bounded_utf8(text.as_bytes(), 2), "h");
        assert_eq!(bounded_utf8(text.as_bytes(), 3), "hé");
        assert_eq!(bounded_utf8(text.as_bytes(), 100), "héllo");
    }

    #[test]
    fn test_bounded_utf8_invalid_bytes_stay_bounded() {
        let garbage = vec![0xffu8; 10];
        let text = bounded_utf8(&garbage, 10);
        assert!(text.len() <= 10);
        assert!(text.chars().all(|c| c == '\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_collect_stream_to_eof() {
        let sink = OutputBuffer::new(1024);
        let overflow = Arc::new(Notify::new());
        collect_stream(&b"hello\nworld\n"[..], Arc::clone(&sink), Arc::clone(&overflow)).await;
        assert_eq!(sink.to_text(1024), "hello\nworld\n");
        assert!(!sink.overflowed());
    }

    #[tokio::test]
    async fn test_collect_stream_signals_overflow() {
        let sink = OutputBuffer::new(16);
        let overflow = Arc::new(Notify::new());
        let data = vec![b'x'; 100];
        collect_stream(&data[..], Arc::clone(&sink), Arc::clone(&overflow)).await;
        assert!(sink.overflowed());
        assert_eq!(sink.len(), 16);
        // permit stored by notify_one
        tokio::time::timeout(std::time::Duration::from_secs(1), overflow.notified())
            .await
            .expect("overflow was not signalled");
    }
}
