//! `multipart/x-mixed-replace` framing for the MJPEG stream.

use std::io::{self, Write};

pub const BOUNDARY: &str = "FRAME";

/// Response head for a stream. Caching is disabled so browsers keep the live image.
pub fn write_stream_header<W: Write>(out: &mut W) -> io::Result<()> {
    write!(
        out,
        "HTTP/1.1 200 OK\r\n\
         Age: 0\r\n\
         Cache-Control: no-cache, private\r\n\
         Pragma: no-cache\r\n\
         Content-Type: multipart/x-mixed-replace; boundary={}\r\n\
         \r\n",
        BOUNDARY
    )?;
    out.flush()
}

/// One JPEG part: boundary, part headers, bytes, trailing CRLF.
pub fn write_part<W: Write>(out: &mut W, jpeg: &[u8]) -> io::Result<()> {
    write!(
        out,
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    )?;
    out.write_all(jpeg)?;
    out.write_all(b"\r\n")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_is_framed_with_boundary_and_length() {
        let mut out = Vec::new();
        write_part(&mut out, b"\xFF\xD8abc\xFF\xD9").unwrap();
        let expected = b"--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: 7\r\n\r\n\xFF\xD8abc\xFF\xD9\r\n";
        assert_eq!(out, expected.to_vec());
    }

    #[test]
    fn header_disables_caching() {
        let mut out = Vec::new();
        write_stream_header(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Type: multipart/x-mixed-replace; boundary=FRAME\r\n"));
        assert!(text.contains("Cache-Control: no-cache, private\r\n"));
        assert!(text.contains("Pragma: no-cache\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
