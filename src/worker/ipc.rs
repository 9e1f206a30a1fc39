//! Line-framed I/O over pipes.
//!
//! Both ends of the worker protocol read and write one JSON document per
//! line. [`PipeFd`] retries reads and writes interrupted by signals.

use serde::Serialize;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

/// Buffer size for pipe I/O (64KB).
const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// An owned pipe end with EINTR-safe `Read`/`Write`.
#[derive(Debug)]
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

impl From<std::process::ChildStdin> for PipeFd {
    fn from(stdin: std::process::ChildStdin) -> Self {
        Self::new(stdin.into())
    }
}

impl From<std::process::ChildStdout> for PipeFd {
    fn from(stdout: std::process::ChildStdout) -> Self {
        Self::new(stdout.into())
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Create a connected pipe as `(read end, write end)`.
pub fn pipe() -> io::Result<(PipeFd, PipeFd)> {
    let (read, write) =
        nix::unistd::pipe().map_err(|e| io::Error::from_raw_os_error(e as i32))?;
    Ok((PipeFd::new(read), PipeFd::new(write)))
}

/// Reads newline-terminated lines, stripping the terminator.
pub struct LineReader<R = PipeFd> {
    reader: BufReader<R>,
    line: String,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::with_capacity(PIPE_BUFFER_SIZE, inner),
            line: String::with_capacity(4096),
        }
    }

    /// Read the next line into the internal buffer. `None` on EOF.
    pub fn read_line(&mut self) -> io::Result<Option<&str>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        let trimmed = self
            .line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(&self.line);
        Ok(Some(trimmed))
    }
}

/// Writes lines and flushes after each one so the peer sees whole messages.
pub struct LineWriter<W: Write = PipeFd> {
    writer: BufWriter<W>,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(PIPE_BUFFER_SIZE, inner),
        }
    }

    /// Write a line (a missing newline is added) and flush.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }

    /// Serialize `value` as one JSON line and flush.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lines_across_a_pipe() {
        let (read_end, write_end) = pipe().unwrap();
        let mut reader = LineReader::new(read_end);
        let mut writer = LineWriter::new(write_end);

        writer.write_line("first").unwrap();
        writer.write_line("second\n").unwrap();
        writer.write_line("").unwrap();
        drop(writer);

        assert_eq!(reader.read_line().unwrap(), Some("first"));
        assert_eq!(reader.read_line().unwrap(), Some("second"));
        assert_eq!(reader.read_line().unwrap(), Some(""));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let mut reader = LineReader::new(&b"one\r\ntwo"[..]);
        assert_eq!(reader.read_line().unwrap(), Some("one"));
        assert_eq!(reader.read_line().unwrap(), Some("two"));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn test_write_json_is_one_line() {
        let mut out = Vec::new();
        {
            let mut writer = LineWriter::new(&mut out);
            writer.write_json(&json!({"ok": 1, "response": "a\nb"})).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_large_line_over_pipe() {
        let (read_end, write_end) = pipe().unwrap();
        let payload = "x".repeat(PIPE_BUFFER_SIZE * 3);
        let expected = payload.clone();

        let writer = std::thread::spawn(move || {
            let mut writer = LineWriter::new(write_end);
            writer.write_line(&payload).unwrap();
        });

        let mut reader = LineReader::new(read_end);
        assert_eq!(reader.read_line().unwrap().map(str::len), Some(expected.len()));
        writer.join().unwrap();
    }
}
