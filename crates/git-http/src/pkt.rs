//! pkt-line framing.
//!
//! A pkt-line is a 4 hex digit length (counting the 4 digits themselves)
//! followed by the payload. `0000` is a flush packet and carries nothing.

pub const PKT_FLUSH: &[u8] = b"0000";

pub fn encode_pkt_line(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    let len = 4 + data.len();
    out.extend_from_slice(format!("{len:04x}").as_bytes());
    out.extend_from_slice(data);
    out
}

/// Header that precedes the ref advertisement on `info/refs`:
/// `# service=git-<service>\n` as one pkt-line, then a flush.
pub fn service_advertisement_header(service: &str) -> Vec<u8> {
    let line = format!("# service=git-{service}\n");
    let mut out = encode_pkt_line(line.as_bytes());
    out.extend_from_slice(PKT_FLUSH);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pkt<'a> {
    Data(&'a [u8]),
    Flush,
}

/// Reads pkt-lines from the front of a buffer without copying. The reader
/// stops wherever the caller stops, so trailing non pkt-line bytes (a packfile)
/// are never touched.
pub struct PktReader<'a> {
    buf: &'a [u8],
}

impl<'a> PktReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> &'a [u8] {
        self.buf
    }

    /// Returns `Ok(None)` once the buffer is exhausted.
    pub fn next_pkt(&mut self) -> anyhow::Result<Option<Pkt<'a>>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.len() < 4 {
            anyhow::bail!("truncated pkt-line length");
        }
        let len_hex = std::str::from_utf8(&self.buf[..4])?;
        let len = usize::from_str_radix(len_hex, 16)?;
        if len == 0 {
            self.buf = &self.buf[4..];
            return Ok(Some(Pkt::Flush));
        }
        if len < 4 {
            anyhow::bail!("unsupported pkt-line length {len}");
        }
        if self.buf.len() < len {
            anyhow::bail!("truncated pkt-line data");
        }
        let data = &self.buf[4..len];
        self.buf = &self.buf[len..];
        Ok(Some(Pkt::Data(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_counts_prefix_in_length() {
        let enc = encode_pkt_line(b"hello\n");
        assert_eq!(&enc[..4], b"000a");
        assert_eq!(&enc[4..], b"hello\n");
    }

    #[test]
    fn upload_pack_header_bytes() {
        let payload = "# service=git-upload-pack\n";
        let expected = format!("{:04x}{}0000", payload.len() + 4, payload);
        assert_eq!(service_advertisement_header("upload-pack"), expected.as_bytes());
        assert_eq!(
            service_advertisement_header("upload-pack"),
            b"001e# service=git-upload-pack\n0000"
        );
    }

    #[test]
    fn receive_pack_header_bytes() {
        assert_eq!(
            service_advertisement_header("receive-pack"),
            b"001f# service=git-receive-pack\n0000"
        );
    }

    #[test]
    fn reader_stops_at_flush_and_keeps_the_rest() {
        let mut buf = encode_pkt_line(b"first\n");
        buf.extend_from_slice(PKT_FLUSH);
        buf.extend_from_slice(b"PACK\x00\x00\x00\x02");
        let mut reader = PktReader::new(&buf);
        assert_eq!(reader.next_pkt().unwrap(), Some(Pkt::Data(b"first\n")));
        assert_eq!(reader.next_pkt().unwrap(), Some(Pkt::Flush));
        assert_eq!(reader.remaining(), b"PACK\x00\x00\x00\x02");
    }

    #[test]
    fn reader_rejects_truncation() {
        let mut reader = PktReader::new(b"00ffshort");
        assert!(reader.next_pkt().is_err());
        let mut reader = PktReader::new(b"00");
        assert!(reader.next_pkt().is_err());
        let mut reader = PktReader::new(b"zzzz");
        assert!(reader.next_pkt().is_err());
    }
}
