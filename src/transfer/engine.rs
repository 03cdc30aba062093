//! Transfer engine
//!
//! Streams bytes between the data connection and the file store in fixed
//! 512-byte chunks. The engine knows nothing about the protocol: it
//! pushes bytes, pulls bytes, and reports I/O errors to the caller.

use std::io::{self, Read, Write};

use log::debug;

const CHUNK_SIZE: usize = 512;

/// Streams `src` to the data connection until end-of-file.
pub fn send_file(src: &mut dyn Read, conn: &mut dyn Write) -> io::Result<u64> {
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        conn.write_all(&chunk[..n])?;
        total += n as u64;
    }
    conn.flush()?;
    debug!("sent {total} bytes");
    Ok(total)
}

/// Streams the data connection into `dst` until the peer closes.
///
/// Closure of the connection is the only end-of-data signal; nothing in
/// the payload is interpreted.
pub fn receive_file(conn: &mut dyn Read, dst: &mut dyn Write) -> io::Result<u64> {
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = conn.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        dst.write_all(&chunk[..n])?;
        total += n as u64;
    }
    dst.flush()?;
    debug!("received {total} bytes");
    Ok(total)
}

/// Writes a directory listing as CRLF-joined names, one trailing CRLF.
pub fn send_listing(names: &[String], conn: &mut dyn Write) -> io::Result<()> {
    let mut listing = names.join("\r\n");
    listing.push_str("\r\n");
    conn.write_all(listing.as_bytes())?;
    conn.flush()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn send_file_copies_across_chunk_boundaries() {
        // Three full chunks plus a remainder.
        let content: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let mut src = Cursor::new(content.clone());
        let mut sink = Vec::new();
        let sent = send_file(&mut src, &mut sink).unwrap();
        assert_eq!(sent, content.len() as u64);
        assert_eq!(sink, content);
    }

    #[test]
    fn receive_file_stops_only_at_stream_end() {
        // A payload containing a fake completion marker must be stored
        // verbatim, not truncated at the marker.
        let payload = b"data\r\n226 Transfer complete.\r\nmore data".to_vec();
        let mut conn = Cursor::new(payload.clone());
        let mut dst = Vec::new();
        let received = receive_file(&mut conn, &mut dst).unwrap();
        assert_eq!(received, payload.len() as u64);
        assert_eq!(dst, payload);
    }

    #[test]
    fn empty_transfer_is_zero_bytes() {
        let mut src = Cursor::new(Vec::new());
        let mut sink = Vec::new();
        assert_eq!(send_file(&mut src, &mut sink).unwrap(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn listing_is_crlf_joined_and_terminated() {
        let names = vec!["a.txt".to_string(), "b.txt".to_string()];
        let mut sink = Vec::new();
        send_listing(&names, &mut sink).unwrap();
        assert_eq!(sink, b"a.txt\r\nb.txt\r\n");
    }

    #[test]
    fn empty_listing_is_a_bare_crlf() {
        let mut sink = Vec::new();
        send_listing(&[], &mut sink).unwrap();
        assert_eq!(sink, b"\r\n");
    }
}
