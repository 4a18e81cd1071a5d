use std::io::{self, Write};

use crate::api::multipart::{write_part, write_stream_header};
use crate::bus::Subscriber;

/// Why a streaming session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// A write to the client failed.
    Disconnected(io::Error),
    /// The subscriber was cancelled, e.g. the client closed its side.
    Cancelled,
    /// The bus was closed at shutdown.
    Closed,
}

/// One connected stream client.
///
/// Waits on the bus for each newer frame and writes its annotated JPEG as one
/// multipart part. A slow client only ever delays itself: it skips straight to the
/// latest frame when it comes back.
pub struct StreamingSession<W: Write> {
    out: W,
    subscriber: Subscriber,
    frames_sent: u64,
}

impl<W: Write> StreamingSession<W> {
    pub fn new(out: W, subscriber: Subscriber) -> Self {
        Self {
            out,
            subscriber,
            frames_sent: 0,
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn run(&mut self) -> SessionEnd {
        if let Err(err) = write_stream_header(&mut self.out) {
            return SessionEnd::Disconnected(err);
        }
        loop {
            let Some(published) = self.subscriber.next() else {
                return if self.subscriber.is_cancelled() {
                    SessionEnd::Cancelled
                } else {
                    SessionEnd::Closed
                };
            };
            if let Err(err) = write_part(&mut self.out, &published.annotated) {
                return SessionEnd::Disconnected(err);
            }
            self.frames_sent += 1;
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FrameBus;
    use crate::frame::{DecodedImage, Frame, Published};
    use image::RgbImage;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    fn published(seq: u64) -> Published {
        let bytes: Arc<[u8]> = Arc::from(vec![0xFF, 0xD8, seq as u8, 0xFF, 0xD9]);
        Published {
            frame: Frame::new(seq, bytes.clone()),
            image: Arc::new(DecodedImage::from_rgb(RgbImage::new(1, 1))),
            annotated: bytes,
            detections: Vec::new(),
            stale: false,
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn idle_session_writes_only_the_header_until_cancelled() {
        let bus = FrameBus::new();
        let out = SharedBuf::default();
        let mut session = StreamingSession::new(out.clone(), bus.subscribe());
        let cancel = session.subscriber.cancel_handle();

        let handle = thread::spawn(move || {
            let end = session.run();
            (end, session.frames_sent())
        });
        thread::sleep(Duration::from_millis(100));
        let written = out.0.lock().unwrap().clone();
        assert!(String::from_utf8_lossy(&written).ends_with("\r\n\r\n"));
        assert!(!String::from_utf8_lossy(&written).contains("--FRAME"));

        cancel.cancel();
        let (end, sent) = handle.join().unwrap();
        assert!(matches!(end, SessionEnd::Cancelled));
        assert_eq!(sent, 0);
    }

    #[test]
    fn published_frames_become_parts_until_close() {
        let bus = FrameBus::new();
        let out = SharedBuf::default();
        let mut session = StreamingSession::new(out.clone(), bus.subscribe());

        let handle = thread::spawn(move || {
            let end = session.run();
            (end, session.frames_sent())
        });
        bus.publish(published(1));
        while out.0.lock().unwrap().windows(7).filter(|w| *w == b"--FRAME").count() < 1 {
            thread::sleep(Duration::from_millis(5));
        }
        bus.close();

        let (end, sent) = handle.join().unwrap();
        assert!(matches!(end, SessionEnd::Closed));
        assert_eq!(sent, 1);
    }

    #[test]
    fn write_failure_ends_session() {
        let bus = FrameBus::new();
        let mut session = StreamingSession::new(BrokenPipe, bus.subscribe());
        assert!(matches!(session.run(), SessionEnd::Disconnected(_)));
    }
}
