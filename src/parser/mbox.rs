//! Streaming MBOX boundary scanner.
//!
//! Reads MBOX containers line-by-line through a large buffer and hands the
//! header block of each message (including its `From ` separator line) to a
//! callback. Bodies are skipped, never buffered. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, XrefError};

/// Default read buffer size (1 MB for fast sequential reads on modern SSDs).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Progress is reported every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// Header scanner over one MBOX container on disk.
///
/// Takeout containers are large and not always clean, so the scan accepts
/// CRLF lines, a leading BOM, binary bodies, a final message cut short, and
/// separators with no blank line before them (the last one is logged).
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    read_buffer_size: usize,
}

impl MboxParser {
    /// Bind to a container. Only existence is checked here; content is not.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                XrefError::FileNotFound(path.clone())
            } else {
                XrefError::io(&path, e)
            }
        })?;
        Ok(Self {
            path,
            file_size: metadata.len(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        })
    }

    /// Override the read buffer size (clamped to at least 4 KB).
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(4096);
        self
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the file, calling `header_callback(offset, message_length, header_bytes)`
    /// for every message. Returns the number of messages found.
    pub fn parse_headers_only(
        &self,
        header_callback: &mut dyn FnMut(u64, u64, &[u8]) -> bool,
        progress_callback: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }
        let file = File::open(&self.path).map_err(|e| XrefError::io(&self.path, e))?;
        let reader = BufReader::with_capacity(self.read_buffer_size, file);
        scan_headers(
            reader,
            self.file_size,
            header_callback,
            progress_callback,
        )
        .map_err(|e| XrefError::io(&self.path, e))
    }
}

/// Scan an MBOX stream for message boundaries.
///
/// The callback receives `(offset, message_length, header_bytes)`, where the
/// header bytes start with the `From ` separator line and stop at the first
/// blank line. Returning `false` from the callback stops the scan early.
///
/// `total` is only used for progress reporting and may be 0 when unknown.
pub fn scan_headers<R: BufRead>(
    mut reader: R,
    total: u64,
    header_callback: &mut dyn FnMut(u64, u64, &[u8]) -> bool,
    progress_callback: Option<&dyn Fn(u64, u64)>,
) -> std::io::Result<u64> {
    let mut count: u64 = 0;
    let mut current_offset: u64 = 0;
    let mut header_buf: Vec<u8> = Vec::with_capacity(16 * 1024);
    let mut in_headers = false;
    let mut prev_line_was_empty = true;
    let mut first_line = true;
    let mut last_progress: u64 = 0;
    let mut prev_piece_ended_line = true;
    let mut prev_message_start: Option<u64> = None;
    let mut prev_headers: Option<Vec<u8>> = None;

    // Reusable line buffer, zero-alloc in the common case
    let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

    loop {
        line_buf.clear();
        let line_len = {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                break; // EOF
            }
            let consume_len = match memchr_newline(buf) {
                Some(pos) => pos + 1,
                None => buf.len(),
            };
            line_buf.extend_from_slice(&buf[..consume_len]);
            reader.consume(consume_len);
            consume_len as u64
        };

        // A line longer than the read buffer arrives in pieces; only the
        // first piece of a line can be a separator.
        let is_from_line = prev_piece_ended_line && is_mbox_separator(&line_buf, first_line);
        prev_piece_ended_line = line_buf.last() == Some(&b'\n');

        if is_from_line {
            if !first_line && !prev_line_was_empty {
                warn!(
                    offset = current_offset,
                    "Found 'From ' separator without preceding blank line"
                );
            }

            // The previous message is complete now
            if let Some(pstart) = prev_message_start {
                let pheaders = prev_headers.take().unwrap_or_else(|| header_buf.clone());
                let msg_length = current_offset - pstart;
                if !header_callback(pstart, msg_length, &pheaders) {
                    return Ok(count);
                }
                count += 1;
            }

            header_buf.clear();
            header_buf.extend_from_slice(&line_buf);
            in_headers = true;
            prev_message_start = Some(current_offset);
        } else if in_headers {
            if is_blank_line(&line_buf) {
                // End of headers, save without cloning (swap trick)
                in_headers = false;
                let mut saved = Vec::with_capacity(header_buf.len());
                std::mem::swap(&mut saved, &mut header_buf);
                prev_headers = Some(saved);
            } else {
                header_buf.extend_from_slice(&line_buf);
            }
        }

        prev_line_was_empty = is_blank_line(&line_buf);
        first_line = false;
        current_offset += line_len;

        if let Some(cb) = progress_callback {
            if current_offset - last_progress >= PROGRESS_INTERVAL {
                cb(current_offset, total);
                last_progress = current_offset;
            }
        }
    }

    // Flush last message
    if let Some(pstart) = prev_message_start {
        let hdrs = prev_headers.unwrap_or(header_buf);
        let msg_length = current_offset - pstart;
        if header_callback(pstart, msg_length, &hdrs) {
            count += 1;
        }
    }

    if let Some(cb) = progress_callback {
        cb(current_offset, total.max(current_offset));
    }

    Ok(count)
}

/// Position of the next `\n`.
#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// `From ` at the start of a line marks a message boundary.
///
/// A UTF-8 BOM is only skipped on the very first line of the stream.
fn is_mbox_separator(line: &[u8], first_line: bool) -> bool {
    let line = if first_line {
        strip_bom(line)
    } else {
        line
    };
    line.starts_with(b"From ")
}

/// Strip a leading UTF-8 BOM.
pub(crate) fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

/// Whitespace-only line; ends a header block.
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
