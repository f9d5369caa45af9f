use std::collections::HashMap;
use std::io::{self, Write};

pub const MAJOR_VERSION: u8 = 4;
pub const MINOR_VERSION: u8 = 8;

const TYPE_TRUE: u8 = b'T';
const TYPE_ARRAY: u8 = b'[';
const TYPE_HASH: u8 = b'{';
const TYPE_SYMBOL: u8 = b':';
const TYPE_SYMLINK: u8 = b';';
const TYPE_IVAR: u8 = b'I';
const TYPE_STRING: u8 = b'"';

/// Instance variable Ruby attaches to UTF-8 strings.
const ENCODING_IVAR: &str = "E";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    #[error("write failed ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    #[error("{collection} declared {declared} elements but another was written")]
    Overflow {
        collection: &'static str,
        declared: usize,
    },

    #[error("{collection} closed after {written} of {declared} elements")]
    Underflow {
        collection: &'static str,
        declared: usize,
        written: usize,
    },

    #[error("cannot close {closing} while the innermost open value is {open}")]
    MismatchedClose {
        closing: &'static str,
        open: &'static str,
    },

    #[error("stream already holds a root value")]
    SecondRoot,

    #[error("stream holds no root value")]
    MissingRoot,

    #[error("instance variable wrapper accepts only a string")]
    IvarContent,

    #[error("symbol {0:?} is not ASCII")]
    NonAsciiSymbol(String),

    #[error("length {0} exceeds the Marshal integer range")]
    LengthOverflow(usize),

    #[error("{depth} collection(s) still open at end of stream")]
    UnclosedCollection { depth: usize },
}

impl From<io::Error> for MarshalError {
    fn from(err: io::Error) -> Self {
        MarshalError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Array,
    Hash,
    Ivar,
}

impl FrameKind {
    fn label(self) -> &'static str {
        match self {
            FrameKind::Array => "array",
            FrameKind::Hash => "hash",
            FrameKind::Ivar => "ivar",
        }
    }
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    // Hash frames count keys and values separately.
    declared: usize,
    written: usize,
}

/// Streaming Marshal 4.8 encoder.
///
/// Collections declare their element count when opened. Once a call fails,
/// the writer is poisoned: every later call returns the same error without
/// touching the output, and [`finish`](Self::finish) reports it.
pub struct MarshalWriter<W: Write> {
    out: W,
    stack: Vec<Frame>,
    symbols: HashMap<String, usize>,
    root_written: bool,
    error: Option<MarshalError>,
}

impl<W: Write> MarshalWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            stack: Vec::new(),
            symbols: HashMap::new(),
            root_written: false,
            error: None,
        }
    }

    /// Open an array of `len` elements.
    pub fn start_array(&mut self, len: usize) -> Result<(), MarshalError> {
        self.latched(|w| {
            w.begin_value(false)?;
            w.out.write_all(&[TYPE_ARRAY])?;
            w.write_length(len)?;
            w.stack.push(Frame {
                kind: FrameKind::Array,
                declared: len,
                written: 0,
            });
            Ok(())
        })
    }

    pub fn end_array(&mut self) -> Result<(), MarshalError> {
        self.latched(|w| w.close(FrameKind::Array))
    }

    /// Open a hash of `pairs` key/value pairs.
    pub fn start_hash(&mut self, pairs: usize) -> Result<(), MarshalError> {
        self.latched(|w| {
            w.begin_value(false)?;
            w.out.write_all(&[TYPE_HASH])?;
            w.write_length(pairs)?;
            let declared = pairs
                .checked_mul(2)
                .ok_or(MarshalError::LengthOverflow(pairs))?;
            w.stack.push(Frame {
                kind: FrameKind::Hash,
                declared,
                written: 0,
            });
            Ok(())
        })
    }

    pub fn end_hash(&mut self) -> Result<(), MarshalError> {
        self.latched(|w| w.close(FrameKind::Hash))
    }

    /// Write a symbol, or a link to it when it was written before.
    pub fn symbol(&mut self, name: &str) -> Result<(), MarshalError> {
        self.latched(|w| {
            w.begin_value(false)?;
            w.write_symbol(name)
        })
    }

    /// Open an instance-variable wrapper. Exactly one string must follow
    /// before [`end_ivar`](Self::end_ivar).
    pub fn start_ivar(&mut self) -> Result<(), MarshalError> {
        self.latched(|w| {
            w.begin_value(false)?;
            w.out.write_all(&[TYPE_IVAR])?;
            w.stack.push(Frame {
                kind: FrameKind::Ivar,
                declared: 1,
                written: 0,
            });
            Ok(())
        })
    }

    /// Close the wrapper, attaching the UTF-8 encoding flag.
    pub fn end_ivar(&mut self) -> Result<(), MarshalError> {
        self.latched(|w| {
            w.close(FrameKind::Ivar)?;
            w.write_length(1)?;
            w.write_symbol(ENCODING_IVAR)?;
            w.out.write_all(&[TYPE_TRUE])?;
            Ok(())
        })
    }

    /// Write a raw byte string.
    pub fn string(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        self.latched(|w| {
            w.begin_value(true)?;
            w.out.write_all(&[TYPE_STRING])?;
            w.write_length(bytes.len())?;
            w.out.write_all(bytes)?;
            Ok(())
        })
    }

    /// Write a UTF-8 string the way Ruby dumps one: `I"..." :E => true`.
    pub fn wrapped_string(&mut self, value: &str) -> Result<(), MarshalError> {
        self.start_ivar()?;
        self.string(value.as_bytes())?;
        self.end_ivar()
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W, MarshalError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if !self.stack.is_empty() {
            return Err(MarshalError::UnclosedCollection {
                depth: self.stack.len(),
            });
        }
        if !self.root_written {
            return Err(MarshalError::MissingRoot);
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn latched<F>(&mut self, op: F) -> Result<(), MarshalError>
    where
        F: FnOnce(&mut Self) -> Result<(), MarshalError>,
    {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        op(self).map_err(|err| {
            self.error = Some(err.clone());
            err
        })
    }

    // Account for one value in the enclosing collection, or start the stream.
    fn begin_value(&mut self, is_string: bool) -> Result<(), MarshalError> {
        let Some(frame) = self.stack.last_mut() else {
            if self.root_written {
                return Err(MarshalError::SecondRoot);
            }
            self.root_written = true;
            self.out.write_all(&[MAJOR_VERSION, MINOR_VERSION])?;
            return Ok(());
        };

        if frame.kind == FrameKind::Ivar && !is_string {
            return Err(MarshalError::IvarContent);
        }
        if frame.written >= frame.declared {
            return Err(MarshalError::Overflow {
                collection: frame.kind.label(),
                declared: frame.declared,
            });
        }
        frame.written += 1;
        Ok(())
    }

    fn close(&mut self, kind: FrameKind) -> Result<(), MarshalError> {
        let Some(frame) = self.stack.last() else {
            return Err(MarshalError::MismatchedClose {
                closing: kind.label(),
                open: "nothing",
            });
        };
        if frame.kind != kind {
            return Err(MarshalError::MismatchedClose {
                closing: kind.label(),
                open: frame.kind.label(),
            });
        }
        if frame.written != frame.declared {
            return Err(MarshalError::Underflow {
                collection: kind.label(),
                declared: frame.declared,
                written: frame.written,
            });
        }
        self.stack.pop();
        Ok(())
    }

    fn write_symbol(&mut self, name: &str) -> Result<(), MarshalError> {
        if !name.is_ascii() {
            return Err(MarshalError::NonAsciiSymbol(name.to_string()));
        }
        if let Some(&index) = self.symbols.get(name) {
            self.out.write_all(&[TYPE_SYMLINK])?;
            return self.write_length(index);
        }

        let index = self.symbols.len();
        self.symbols.insert(name.to_string(), index);
        self.out.write_all(&[TYPE_SYMBOL])?;
        self.write_length(name.len())?;
        self.out.write_all(name.as_bytes())?;
        Ok(())
    }

    fn write_length(&mut self, len: usize) -> Result<(), MarshalError> {
        let value = i32::try_from(len).map_err(|_| MarshalError::LengthOverflow(len))?;
        self.out.write_all(&encode_long(value))?;
        Ok(())
    }
}

/// Marshal's compact integer form.
pub(crate) fn encode_long(value: i32) -> Vec<u8> {
    match value {
        0 => vec![0],
        1..=122 => vec![(value + 5) as u8],
        -123..=-1 => vec![((value - 5) & 0xff) as u8],
        _ => {
            let mut out = vec![0];
            let mut rest = value as i64;
            for count in 1..=4u8 {
                out.push((rest & 0xff) as u8);
                rest >>= 8;
                if rest == 0 {
                    out[0] = count;
                    break;
                }
                if rest == -1 {
                    out[0] = (-(count as i8)) as u8;
                    break;
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_long() {
        assert_eq!(encode_long(0), vec![0x00]);
        assert_eq!(encode_long(1), vec![0x06]);
        assert_eq!(encode_long(122), vec![0x7f]);
        assert_eq!(encode_long(123), vec![0x01, 0x7b]);
        assert_eq!(encode_long(255), vec![0x01, 0xff]);
        assert_eq!(encode_long(256), vec![0x02, 0x00, 0x01]);
        assert_eq!(encode_long(65536), vec![0x03, 0x00, 0x00, 0x01]);
        assert_eq!(encode_long(i32::MAX), vec![0x04, 0xff, 0xff, 0xff, 0x7f]);
        assert_eq!(encode_long(-1), vec![0xfa]);
        assert_eq!(encode_long(-123), vec![0x80]);
        assert_eq!(encode_long(-124), vec![0xff, 0x84]);
        assert_eq!(encode_long(-256), vec![0xff, 0x00]);
        assert_eq!(encode_long(-257), vec![0xfe, 0xff, 0xfe]);
    }

    #[test]
    fn test_wrapped_string_bytes() {
        let mut writer = MarshalWriter::new(Vec::new());
        writer.wrapped_string("foo").unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            b"\x04\x08I\"\x08foo\x06:\x06ET".to_vec()
        );
    }

    #[test]
    fn test_repeated_symbols_are_linked() {
        let mut writer = MarshalWriter::new(Vec::new());
        writer.start_array(3).unwrap();
        writer.symbol("a").unwrap();
        writer.symbol("b").unwrap();
        writer.symbol("a").unwrap();
        writer.end_array().unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            vec![0x04, 0x08, b'[', 0x08, b':', 0x06, b'a', b':', 0x06, b'b', b';', 0x00]
        );
    }

    #[test]
    fn test_overflow_is_latched() {
        let mut writer = MarshalWriter::new(Vec::new());
        writer.start_array(1).unwrap();
        writer.wrapped_string("one").unwrap();

        let err = writer.wrapped_string("two").unwrap_err();
        assert!(matches!(err, MarshalError::Overflow { declared: 1, .. }));

        // Later calls, even valid ones, return the first error
        assert_eq!(writer.end_array().unwrap_err(), err);
        assert_eq!(writer.finish().unwrap_err(), err);
    }

    #[test]
    fn test_close_with_missing_elements() {
        let mut writer = MarshalWriter::new(Vec::new());
        writer.start_hash(2).unwrap();
        writer.symbol("name").unwrap();
        writer.wrapped_string("foo").unwrap();
        assert_eq!(
            writer.end_hash().unwrap_err(),
            MarshalError::Underflow {
                collection: "hash",
                declared: 4,
                written: 2
            }
        );
    }

    #[test]
    fn test_structural_violations() {
        let mut writer = MarshalWriter::new(Vec::new());
        writer.start_array(0).unwrap();
        assert!(matches!(
            writer.end_hash(),
            Err(MarshalError::MismatchedClose {
                closing: "hash",
                open: "array"
            })
        ));

        let mut writer = MarshalWriter::new(Vec::new());
        writer.start_array(0).unwrap();
        writer.end_array().unwrap();
        assert_eq!(writer.start_array(0), Err(MarshalError::SecondRoot));

        let mut writer = MarshalWriter::new(Vec::new());
        writer.start_ivar().unwrap();
        assert_eq!(writer.symbol("E"), Err(MarshalError::IvarContent));

        let mut writer = MarshalWriter::new(Vec::new());
        writer.start_array(1).unwrap();
        assert!(matches!(
            writer.symbol("café"),
            Err(MarshalError::NonAsciiSymbol(_))
        ));
    }

    #[test]
    fn test_finish_with_open_collections() {
        let mut writer = MarshalWriter::new(Vec::new());
        writer.start_array(1).unwrap();
        writer.start_array(0).unwrap();
        assert_eq!(
            writer.finish().unwrap_err(),
            MarshalError::UnclosedCollection { depth: 2 }
        );

        let writer = MarshalWriter::new(Vec::new());
        assert_eq!(writer.finish().unwrap_err(), MarshalError::MissingRoot);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_io_error_is_latched() {
        let mut writer = MarshalWriter::new(FailingWriter);
        let err = writer.start_array(0).unwrap_err();
        assert!(matches!(
            err,
            MarshalError::Io {
                kind: io::ErrorKind::BrokenPipe,
                ..
            }
        ));
        assert_eq!(writer.end_array().unwrap_err(), err);
    }
}
