use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    fs::File,
    io::{BufRead, BufReader, BufWriter, Error as IoError, Read, Write},
    path::Path,
    sync::LazyLock,
};

use regex::Regex;
use thiserror::Error as ThisError;

use crate::{
    SavedState,
    serializers::{BinarySerializationError, BinarySerializer, TextSerializationError, TextSerializer},
};

/// Serializes and deserializes a [SavedState] in one encoding.
pub trait Serializer {
    type Error: Error;

    /// The encoding name written in the header.
    fn name() -> &'static str;

    /// The newest encoding version this serializer writes.
    fn version() -> i32;

    /// Writes the header and the state to the buffer.
    fn serialize(buffer: &mut impl Write, header: &Header, root: &SavedState) -> Result<(), Self::Error>;

    /// Reads a state from a buffer positioned right after the header line.
    fn deserialize(buffer: &mut impl BufRead, encoding: String, version: i32) -> Result<SavedState, Self::Error>;
}

#[derive(Debug, ThisError)]
pub enum SerializationError {
    #[error("IO Error: {0}")]
    Io(#[from] IoError),
    #[error("Header Was Not Found Or Is Malformed")]
    InvalidHeader,
    #[error("Header Is Longer Than {0} Bytes")]
    HeaderTooLong(usize),
    #[error("Unknown Encoding: {0}")]
    UnknownEncoding(String),
    #[error(transparent)]
    Binary(#[from] BinarySerializationError),
    #[error(transparent)]
    Text(#[from] TextSerializationError),
}

/// The format part of a serialized state's header.
///
/// The encoding part is filled in by the [Serializer] that writes the state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub format: String,
    pub version: i32,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            format: String::from(Self::DEFAULT_FORMAT),
            version: Self::DEFAULT_FORMAT_VERSION,
        }
    }
}

static HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<!-- savedstate encoding (\S+) (-?\d+) format (\S+) (-?\d+) -->$").expect("header pattern is valid")
});

impl Header {
    pub const DEFAULT_FORMAT: &str = "savedstate";
    pub const DEFAULT_FORMAT_VERSION: i32 = 1;
    pub const MAX_FORMAT_LENGTH: usize = 64;
    pub const MAX_HEADER_LENGTH: usize = 40 + 2 * Self::MAX_FORMAT_LENGTH;

    pub fn new(format: impl Into<String>, version: i32) -> Self {
        Self {
            format: format.into(),
            version,
        }
    }

    /// Checks if the format can be written in a header line and read back.
    ///
    /// The format must be non-empty, at most [Header::MAX_FORMAT_LENGTH] bytes, and free of whitespace.
    pub fn is_valid(&self) -> bool {
        !self.format.is_empty() && self.format.len() <= Self::MAX_FORMAT_LENGTH && !self.format.chars().any(char::is_whitespace)
    }

    /// Returns the header line for the given encoding, including the trailing newline.
    pub fn create_header(&self, encoding: &str, encoding_version: i32) -> String {
        format!(
            "<!-- savedstate encoding {} {} format {} {} -->\n",
            encoding, encoding_version, self.format, self.version
        )
    }

    /// Parses a header line. Returns the header with the encoding name and version.
    pub fn parse(line: &str) -> Result<(Self, String, i32), SerializationError> {
        let captures = HEADER_PATTERN.captures(line.trim_end()).ok_or(SerializationError::InvalidHeader)?;

        let encoding = captures[1].to_string();
        let encoding_version = captures[2].parse().map_err(|_| SerializationError::InvalidHeader)?;
        let format = captures[3].to_string();
        let version = captures[4].parse().map_err(|_| SerializationError::InvalidHeader)?;

        if format.len() > Self::MAX_FORMAT_LENGTH {
            return Err(SerializationError::InvalidHeader);
        }

        Ok((Self { format, version }, encoding, encoding_version))
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.format, self.version)
    }
}

/// Reads the header line and the state that follows it, picking the serializer the header names.
pub fn deserialize(buffer: &mut impl BufRead) -> Result<(SavedState, Header), SerializationError> {
    let mut header_line = Vec::new();
    buffer.by_ref().take(Header::MAX_HEADER_LENGTH as u64 + 1).read_until(b'\n', &mut header_line)?;

    if header_line.last() != Some(&b'\n') {
        if header_line.len() > Header::MAX_HEADER_LENGTH {
            return Err(SerializationError::HeaderTooLong(Header::MAX_HEADER_LENGTH));
        }
        return Err(SerializationError::InvalidHeader);
    }

    let header_line = std::str::from_utf8(&header_line).map_err(|_| SerializationError::InvalidHeader)?;
    let (header, encoding, version) = Header::parse(header_line)?;
    log::debug!("Deserializing {} state with {} encoding version {}", header, encoding, version);

    let root = match encoding.as_str() {
        "binary" => BinarySerializer::deserialize(buffer, encoding, version)?,
        "text" => TextSerializer::deserialize(buffer, encoding, version)?,
        _ => return Err(SerializationError::UnknownEncoding(encoding)),
    };

    Ok((root, header))
}

/// Writes the state with the given serializer.
pub fn serialize<S>(buffer: &mut impl Write, header: &Header, root: &SavedState) -> Result<(), S::Error>
where
    S: Serializer,
{
    S::serialize(buffer, header, root)
}

/// Reads a serialized state from a file.
pub fn read_file(path: impl AsRef<Path>) -> Result<(SavedState, Header), SerializationError> {
    let mut reader = BufReader::new(File::open(path)?);
    deserialize(&mut reader)
}

/// Writes a state to a file with the given serializer.
pub fn write_file<S>(path: impl AsRef<Path>, header: &Header, root: &SavedState) -> Result<(), SerializationError>
where
    S: Serializer,
    SerializationError: From<S::Error>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    S::serialize(&mut writer, header, root)?;
    writer.flush()?;
    Ok(())
}
