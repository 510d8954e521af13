//! Line-oriented plain-text codec shared by every persisted component.
//!
//! A stream is a sequence of newline-terminated fields: type tags, counts,
//! scalars, whitespace-separated number rows and verbatim names. Opaque binary
//! payloads are framed as a `blob <n>` line, `n` raw bytes and a newline, so
//! readers never scan for sentinels. Floats are written in Rust's shortest
//! round-trip form and therefore reload bit-exactly.

use std::fmt::Display;
use std::io::{BufRead, Read, Write};
use std::str::FromStr;

/// Errors from reading or writing a model stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Returned when the underlying reader or writer fails.
    #[error("model stream I/O failed")]
    Io(#[from] std::io::Error),

    /// Returned when the stream ends before a required field.
    #[error("unexpected end of model stream after line {line}, expected {expected}")]
    UnexpectedEof {
        /// The last line number read.
        line: usize,
        /// Description of the missing field.
        expected: &'static str,
    },

    /// Returned when a field cannot be parsed.
    #[error("malformed model stream at line {line}: expected {expected}, found {found:?}")]
    Malformed {
        /// The one-based line number of the offending field.
        line: usize,
        /// Description of the expected field.
        expected: &'static str,
        /// The text actually found.
        found: String,
    },

    /// Returned when a section starts with a different tag than the one being opened.
    #[error("model stream at line {line}: expected tag {expected:?}, found {found:?}")]
    TagMismatch {
        /// The one-based line number of the tag.
        line: usize,
        /// The tag the reading component owns.
        expected: String,
        /// The tag present in the stream.
        found: String,
    },

    /// Returned when a name to be written contains a line break.
    #[error("text field {text:?} contains a line break")]
    InvalidText {
        /// The rejected text.
        text: String,
    },
}

/// Writes model fields to any [`Write`] sink.
pub struct ModelWriter<'a> {
    inner: &'a mut dyn Write,
}

impl<'a> ModelWriter<'a> {
    /// Wrap a sink.
    pub fn new(inner: &'a mut dyn Write) -> Self {
        Self { inner }
    }

    /// Write a type tag on its own line.
    pub fn tag(&mut self, tag: &str) -> Result<(), StreamError> {
        self.text(tag)
    }

    /// Write a single value on its own line.
    pub fn value<T: Display>(&mut self, value: T) -> Result<(), StreamError> {
        writeln!(self.inner, "{value}")?;
        Ok(())
    }

    /// Write an optional float; `-` marks absence.
    pub fn optional(&mut self, value: Option<f64>) -> Result<(), StreamError> {
        match value {
            Some(v) => self.value(v),
            None => self.text("-"),
        }
    }

    /// Write a row of values separated by single spaces.
    pub fn row<T: Display>(&mut self, values: &[T]) -> Result<(), StreamError> {
        let mut first = true;
        for v in values {
            if first {
                write!(self.inner, "{v}")?;
                first = false;
            } else {
                write!(self.inner, " {v}")?;
            }
        }
        writeln!(self.inner)?;
        Ok(())
    }

    /// Write a verbatim line of text.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidText`] if `text` contains `\n` or `\r`.
    pub fn text(&mut self, text: &str) -> Result<(), StreamError> {
        if text.contains(['\n', '\r']) {
            return Err(StreamError::InvalidText {
                text: text.to_string(),
            });
        }
        writeln!(self.inner, "{text}")?;
        Ok(())
    }

    /// Write a count line followed by one line per name.
    pub fn names(&mut self, names: &[String]) -> Result<(), StreamError> {
        self.value(names.len())?;
        for name in names {
            self.text(name)?;
        }
        Ok(())
    }

    /// Write an opaque length-prefixed payload.
    pub fn blob(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        writeln!(self.inner, "blob {}", bytes.len())?;
        self.inner.write_all(bytes)?;
        writeln!(self.inner)?;
        Ok(())
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<(), StreamError> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Reads model fields from any [`BufRead`] source.
///
/// Supports peeking the next line without consuming it, which is how
/// polymorphic loaders inspect a type tag before dispatching to the
/// component that re-reads it.
pub struct ModelReader<'a> {
    inner: &'a mut dyn BufRead,
    pending: Option<String>,
    line: usize,
}

impl<'a> ModelReader<'a> {
    /// Wrap a source.
    pub fn new(inner: &'a mut dyn BufRead) -> Self {
        Self {
            inner,
            pending: None,
            line: 0,
        }
    }

    /// Return the one-based number of the last line consumed.
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line
    }

    fn read_raw_line(&mut self) -> Result<Option<String>, StreamError> {
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        String::from_utf8(buf)
            .map(Some)
            .map_err(|e| StreamError::Malformed {
                line: self.line + 1,
                expected: "UTF-8 text",
                found: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            })
    }

    /// Return the next line without consuming it, or `None` at end of stream.
    pub fn peek(&mut self) -> Result<Option<&str>, StreamError> {
        if self.pending.is_none() {
            self.pending = self.read_raw_line()?;
        }
        Ok(self.pending.as_deref())
    }

    /// Consume and return the next line.
    pub fn next_line(&mut self, expected: &'static str) -> Result<String, StreamError> {
        let line = match self.pending.take() {
            Some(line) => line,
            None => self.read_raw_line()?.ok_or(StreamError::UnexpectedEof {
                line: self.line,
                expected,
            })?,
        };
        self.line += 1;
        Ok(line)
    }

    /// Peek the next line and return it as a type tag.
    pub fn peek_tag(&mut self) -> Result<String, StreamError> {
        let line = self.line;
        match self.peek()? {
            Some(tag) => Ok(tag.trim().to_string()),
            None => Err(StreamError::UnexpectedEof {
                line,
                expected: "type tag",
            }),
        }
    }

    /// Consume a tag line and check it equals `tag`.
    pub fn expect_tag(&mut self, tag: &str) -> Result<(), StreamError> {
        let found = self.next_line("type tag")?;
        if found.trim() != tag {
            return Err(StreamError::TagMismatch {
                line: self.line,
                expected: tag.to_string(),
                found,
            });
        }
        Ok(())
    }

    /// Consume a line holding one parseable value.
    pub fn value<T: FromStr>(&mut self, expected: &'static str) -> Result<T, StreamError> {
        let raw = self.next_line(expected)?;
        raw.trim().parse().map_err(|_| StreamError::Malformed {
            line: self.line,
            expected,
            found: raw,
        })
    }

    /// Consume an optional float written by [`ModelWriter::optional`].
    pub fn optional(&mut self, expected: &'static str) -> Result<Option<f64>, StreamError> {
        let raw = self.next_line(expected)?;
        let trimmed = raw.trim();
        if trimmed == "-" {
            return Ok(None);
        }
        trimmed
            .parse()
            .map(Some)
            .map_err(|_| StreamError::Malformed {
                line: self.line,
                expected,
                found: raw,
            })
    }

    /// Consume a row holding exactly `len` values.
    pub fn row<T: FromStr>(
        &mut self,
        len: usize,
        expected: &'static str,
    ) -> Result<Vec<T>, StreamError> {
        let raw = self.next_line(expected)?;
        let parsed: Option<Vec<T>> = raw.split_whitespace().map(|t| t.parse().ok()).collect();
        match parsed {
            Some(values) if values.len() == len => Ok(values),
            _ => Err(StreamError::Malformed {
                line: self.line,
                expected,
                found: raw,
            }),
        }
    }

    /// Consume a verbatim line of text.
    pub fn text(&mut self, expected: &'static str) -> Result<String, StreamError> {
        self.next_line(expected)
    }

    /// Consume a count line followed by that many names.
    pub fn names(&mut self, expected: &'static str) -> Result<Vec<String>, StreamError> {
        let count: usize = self.value(expected)?;
        (0..count).map(|_| self.text(expected)).collect()
    }

    /// Consume a length-prefixed payload written by [`ModelWriter::blob`].
    pub fn blob(&mut self) -> Result<Vec<u8>, StreamError> {
        let header = self.next_line("blob header")?;
        let len: usize = header
            .strip_prefix("blob ")
            .and_then(|n| n.trim().parse().ok())
            .ok_or_else(|| StreamError::Malformed {
                line: self.line,
                expected: "blob header",
                found: header.clone(),
            })?;
        // The declared length is not trusted for allocation.
        let mut bytes = Vec::new();
        (&mut *self.inner)
            .take(len as u64)
            .read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(StreamError::UnexpectedEof {
                line: self.line,
                expected: "blob payload",
            });
        }
        let terminator = self.next_line("blob terminator")?;
        if !terminator.is_empty() {
            return Err(StreamError::Malformed {
                line: self.line,
                expected: "empty line after blob payload",
                found: terminator,
            });
        }
        Ok(bytes)
    }

    /// Check that only blank lines remain.
    pub fn expect_end(&mut self) -> Result<(), StreamError> {
        loop {
            let line = match self.pending.take() {
                Some(line) => line,
                None => match self.read_raw_line()? {
                    Some(line) => line,
                    None => break,
                },
            };
            self.line += 1;
            if !line.trim().is_empty() {
                return Err(StreamError::Malformed {
                    line: self.line,
                    expected: "end of stream",
                    found: line,
                });
            }
        }
        Ok(())
    }
}
