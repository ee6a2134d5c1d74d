//! Streaming reader for the municipal CSV exports.
//!
//! The exports are Shift_JIS encoded, CRLF delimited, and open with a two-row
//! header block: a title row such as `【令和７年９月１日時点】` followed by the
//! column names. Bytes are decoded incrementally while the CSV reader pulls
//! them, so a file is read in a single pass and never held in memory whole.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use csv::StringRecord;
use encoding_rs::{Decoder, DecoderResult, Encoding};

use crate::error::ImportError;

/// Rows at the top of every export that never carry data.
pub const HEADER_ROWS: usize = 2;

const INPUT_BUFFER_SIZE: usize = 8 * 1024;
const OUTPUT_BUFFER_SIZE: usize = 3 * INPUT_BUFFER_SIZE;

/// Adapts a byte stream in a legacy encoding into a UTF-8 byte stream.
/// Malformed input surfaces as an `InvalidData` I/O error.
struct DecodingReader<R> {
    inner: R,
    encoding: &'static Encoding,
    decoder: Decoder,
    input: Vec<u8>,
    input_start: usize,
    input_end: usize,
    output: Vec<u8>,
    output_start: usize,
    output_end: usize,
    eof: bool,
    finished: bool,
    /// UTF-8 bytes produced so far.
    produced: u64,
    /// Offsets of line feeds not yet passed by a record start.
    newlines: VecDeque<u64>,
    lines_passed: u64,
}

impl<R: Read> DecodingReader<R> {
    fn new(inner: R, encoding: &'static Encoding) -> Self {
        DecodingReader {
            inner,
            encoding,
            decoder: encoding.new_decoder_without_bom_handling(),
            input: vec![0; INPUT_BUFFER_SIZE],
            input_start: 0,
            input_end: 0,
            output: vec![0; OUTPUT_BUFFER_SIZE],
            output_start: 0,
            output_end: 0,
            eof: false,
            finished: false,
            produced: 0,
            newlines: VecDeque::new(),
            lines_passed: 0,
        }
    }

    fn fill_input(&mut self) -> io::Result<()> {
        loop {
            match self.inner.read(&mut self.input) {
                Ok(n) => {
                    self.input_start = 0;
                    self.input_end = n;
                    self.eof = n == 0;
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// 1-based line of a record whose position is `offset`. With CRLF the
    /// previous terminator's line feed is still unconsumed at that offset, so
    /// a line feed at `offset` belongs to the lines before. Offsets must be
    /// queried in increasing order.
    fn line_at(&mut self, offset: u64) -> u64 {
        while self.newlines.front().is_some_and(|&nl| nl <= offset) {
            self.newlines.pop_front();
            self.lines_passed += 1;
        }
        self.lines_passed + 1
    }

    fn lines_seen(&self) -> u64 {
        self.lines_passed + self.newlines.len() as u64
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.output_start < self.output_end {
                let n = buf.len().min(self.output_end - self.output_start);
                let end = self.output_start + n;
                buf[..n].copy_from_slice(&self.output[self.output_start..end]);
                self.output_start = end;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            if self.input_start == self.input_end && !self.eof {
                self.fill_input()?;
            }

            let input = &self.input[self.input_start..self.input_end];
            let (result, read, written) =
                self.decoder.decode_to_utf8_without_replacement(input, &mut self.output, self.eof);
            self.input_start += read;
            self.output_start = 0;
            self.output_end = written;
            for (i, byte) in self.output[..written].iter().enumerate() {
                if *byte == b'\n' {
                    self.newlines.push_back(self.produced + i as u64);
                }
            }
            self.produced += written as u64;

            match result {
                DecoderResult::InputEmpty => {
                    if self.eof {
                        self.finished = true;
                    }
                }
                DecoderResult::OutputFull => {}
                DecoderResult::Malformed(_, _) => {
                    self.output_end = 0;
                    self.finished = true;
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "malformed {} byte sequence near line {}",
                            self.encoding.name(),
                            self.lines_seen() + 1
                        ),
                    ));
                }
            }
        }
    }
}

/// A data row together with the 1-based line it started on.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub line: u64,
    pub record: StringRecord,
}

/// Lazy, single-pass sequence of data rows. The header block is consumed when
/// the reader is opened and kept aside for column resolution.
pub struct CsvRows<R = File> {
    path: PathBuf,
    reader: csv::Reader<DecodingReader<R>>,
    headers: Vec<StringRecord>,
    done: bool,
}

impl CsvRows<File> {
    pub fn open(path: &Path, encoding: &'static Encoding) -> Result<Self, ImportError> {
        let file = File::open(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        CsvRows::from_reader(path, file, encoding)
    }
}

impl<R: Read> CsvRows<R> {
    pub fn from_reader(
        path: &Path,
        reader: R,
        encoding: &'static Encoding,
    ) -> Result<Self, ImportError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(DecodingReader::new(reader, encoding));
        let mut rows = CsvRows {
            path: path.to_path_buf(),
            reader,
            headers: Vec::with_capacity(HEADER_ROWS),
            done: false,
        };

        while rows.headers.len() < HEADER_ROWS {
            let mut record = StringRecord::new();
            match rows.reader.read_record(&mut record) {
                Ok(true) => rows.headers.push(record),
                Ok(false) => {
                    rows.done = true;
                    break;
                }
                Err(err) => return Err(classify(&rows.path, err)),
            }
        }
        Ok(rows)
    }

    /// The skipped header rows, in file order.
    pub fn headers(&self) -> &[StringRecord] {
        &self.headers
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = Result<RawRow, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => {
                let offset = record.position().map_or(0, |p| p.byte());
                let line = self.reader.get_mut().line_at(offset);
                Some(Ok(RawRow { line, record }))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(classify(&self.path, err)))
            }
        }
    }
}

fn classify(path: &Path, err: csv::Error) -> ImportError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) if source.kind() == io::ErrorKind::InvalidData => {
            ImportError::Decode {
                path: path.to_path_buf(),
                message: source.to_string(),
            }
        }
        csv::ErrorKind::Io(source) => ImportError::Io {
            path: path.to_path_buf(),
            source,
        },
        _ => ImportError::Decode {
            path: path.to_path_buf(),
            message,
        },
    }
}
