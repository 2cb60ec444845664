//! Reading and writing graphs.
//!
//! [`text`] covers the line based interchange formats, [`offline_tp`] the
//! block structured binary file. Malformed input is an error for the caller
//! to surface; a broken precondition inside a writer is a bug and asserts.

use crate::cli::CliErr;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

pub mod offline_tp;
pub mod text;

/// The formats the command line can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Text, OSM node and edge records.
    Std,
    /// Text, geo nodes and plain weighted edges.
    Simple,
    /// Like `Std` but with `#` comment lines before the header.
    Fmi,
    /// `Std` body under a hierarchy export header. Write only.
    FmiCh,
    /// The block structured binary file. Write only.
    OffTp,
}

impl FromStr for FileFormat {
    type Err = CliErr;

    fn from_str(s: &str) -> Result<FileFormat, CliErr> {
        match s {
            "STD" => Ok(FileFormat::Std),
            "SIMPLE" => Ok(FileFormat::Simple),
            "FMI" => Ok(FileFormat::Fmi),
            "FMI_CH" => Ok(FileFormat::FmiCh),
            "OFFTP" => Ok(FileFormat::OffTp),
            _ => Err(CliErr("unknown file format (expected STD, SIMPLE, FMI, FMI_CH or OFFTP)")),
        }
    }
}

/// A graph file that could not be read: carries the file name and the line
/// the reader gave up on.
#[derive(Debug)]
pub struct IngestError {
    pub file: String,
    pub line: usize,
    pub what: String,
}

impl IngestError {
    pub fn new(file: &str, line: usize, what: impl Into<String>) -> IngestError {
        IngestError {
            file: file.to_string(),
            line,
            what: what.into(),
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.what)
    }
}

impl Error for IngestError {}

/// An export was requested that the chosen format cannot express.
#[derive(Debug)]
pub struct FormatError(pub &'static str);

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Error for FormatError {}
