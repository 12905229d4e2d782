//! A library for reading and rewriting FLAC and CDA audio metadata
//!
//! This crate parses the FLAC metadata block section (a subset of RFC 9639)
//! and the CDA track-pointer container, and can rewrite a FLAC file's
//! Vorbis comments while preserving every other byte of the original.
//!
//! Reading is strategy-driven: callers decide which blocks get
//! materialized, and whether embedded pictures are loaded eagerly,
//! lazily, or filtered down to the best cover-art candidate.
//! Rewriting always goes through a temporary file which is atomically
//! renamed over the destination, so a failed or interrupted write
//! never leaves the destination in a partial state.
//!
//! ```no_run
//! use flactag::{ReadStrategy, read_path};
//!
//! let tag = read_path("album/track01.flac", &ReadStrategy::ALL)?;
//! for metadata in tag.metadatas.iter().flatten() {
//!     println!("{}={}", metadata.key, metadata.value);
//! }
//! # Ok::<(), flactag::Error>(())
//! ```

pub mod cda;
pub mod metadata;
pub mod read;
pub mod tag;
pub mod write;

pub use read::{PictureMode, ReadStrategy};
pub use tag::{AudioTag, Metadata};
pub use write::WriteOperation;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// An error from reading or writing an audio file
#[derive(Debug)]
pub enum Error {
    /// An I/O error from the underlying stream
    Io(std::io::Error),
    /// A string field was not valid UTF-8
    Utf8(std::string::FromUtf8Error),
    /// The file's extension is not a supported format
    UnsupportedFormat,
    /// The `"fLaC"` tag was not at the start of the stream
    MissingFlacTag,
    /// STREAMINFO block not first in file
    MissingStreaminfo,
    /// Multiple STREAMINFO blocks found in file
    MultipleStreaminfo,
    /// Multiple VORBIS_COMMENT blocks found in file
    MultipleVorbisComment,
    /// A reserved metadata block type was found
    ReservedMetadataBlock,
    /// The forbidden metadata block type was found
    InvalidMetadataBlock,
    /// A block's contents did not match its header's size
    InvalidMetadataBlockSize,
    /// STREAMINFO block sizes out of range or out of order
    InvalidBlockSize,
    /// STREAMINFO frame size too large for a 24-bit field
    InvalidFrameSize,
    /// STREAMINFO sample rate out of range
    InvalidSampleRate,
    /// STREAMINFO channel count out of range
    InvalidChannelCount,
    /// STREAMINFO bits-per-sample out of range
    InvalidBitsPerSample,
    /// STREAMINFO sample count too large for a 36-bit field
    InvalidSampleCount,
    /// SEEKTABLE block size not a multiple of the seek point size
    InvalidSeekTableSize,
    /// APPLICATION block too small for its ID
    InsufficientApplicationBlock,
    /// A string too large for its length field
    ExcessiveStringLength,
    /// A block too large for the 24-bit header size field
    ExcessiveBlockSize,
    /// Attempted to serialize a picture whose data was never loaded
    UnloadedPictureData,
    /// CDA file does not start with a RIFF chunk
    MissingRiffTag,
    /// CDA file's chunk is not CDDA
    MissingCddaTag,
    /// CDA format chunk has unexpected size or version
    InvalidCdaChunk,
    /// CDA track number is not positive
    InvalidCdaTrackNumber,
    /// CDA frame offset or duration is negative
    InvalidCdaOffset,
}

/// The broad category an [`Error`] falls into
///
/// Useful for surfacing a generic "couldn't read file" vs.
/// "couldn't access file" state without matching every variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The file's contents violate its format
    Format,
    /// The format is not supported at all
    Unsupported,
    /// The underlying stream failed
    Io,
}

impl Error {
    /// Returns the broad category of this error
    ///
    /// A truncated stream surfaces as an I/O error from the
    /// reader, but is classified as a format violation since the
    /// file itself is malformed.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => ErrorKind::Format,
            Self::Io(_) => ErrorKind::Io,
            Self::UnsupportedFormat => ErrorKind::Unsupported,
            _ => ErrorKind::Format,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::Utf8(error)
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::UnsupportedFormat => "unsupported file format".fmt(f),
            Self::MissingFlacTag => "missing FLAC tag".fmt(f),
            Self::MissingStreaminfo => "STREAMINFO block not first in file".fmt(f),
            Self::MultipleStreaminfo => "multiple STREAMINFO blocks found in file".fmt(f),
            Self::MultipleVorbisComment => "multiple VORBIS_COMMENT blocks found in file".fmt(f),
            Self::ReservedMetadataBlock => "reserved metadata block".fmt(f),
            Self::InvalidMetadataBlock => "invalid metadata block".fmt(f),
            Self::InvalidMetadataBlockSize => "invalid metadata block size".fmt(f),
            Self::InvalidBlockSize => "invalid STREAMINFO block sizes".fmt(f),
            Self::InvalidFrameSize => "invalid STREAMINFO frame sizes".fmt(f),
            Self::InvalidSampleRate => "invalid STREAMINFO sample rate".fmt(f),
            Self::InvalidChannelCount => "invalid STREAMINFO channel count".fmt(f),
            Self::InvalidBitsPerSample => "invalid STREAMINFO bits-per-sample".fmt(f),
            Self::InvalidSampleCount => "invalid STREAMINFO sample count".fmt(f),
            Self::InvalidSeekTableSize => "invalid SEEKTABLE block size".fmt(f),
            Self::InsufficientApplicationBlock => "APPLICATION block too small for ID".fmt(f),
            Self::ExcessiveStringLength => "string too large for length field".fmt(f),
            Self::ExcessiveBlockSize => "block too large for header size field".fmt(f),
            Self::UnloadedPictureData => "PICTURE data not loaded".fmt(f),
            Self::MissingRiffTag => "missing RIFF tag in CDA file".fmt(f),
            Self::MissingCddaTag => "missing CDDA tag in CDA file".fmt(f),
            Self::InvalidCdaChunk => "invalid CDA format chunk".fmt(f),
            Self::InvalidCdaTrackNumber => "invalid CDA track number".fmt(f),
            Self::InvalidCdaOffset => "invalid CDA frame offset".fmt(f),
        }
    }
}

/// Reads an audio tag from the given reader
///
/// `extension` selects the container format; `"flac"` and `"cda"`
/// are supported.  The reader should be positioned at the start of
/// the file.  Because this may perform many small reads, using a
/// buffered reader may greatly improve performance when reading
/// from a raw `File`.
///
/// The `strategy` decides which blocks are materialized into the
/// returned [`AudioTag`]; CDA files carry a fixed set of fields and
/// ignore it.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for any other extension,
/// or any error from parsing the stream.  No partial [`AudioTag`]
/// is ever returned.
pub fn read<R: std::io::Read>(
    reader: R,
    extension: &str,
    strategy: &ReadStrategy,
) -> Result<AudioTag, Error> {
    match extension {
        "flac" => read::read_flac(reader, strategy),
        "cda" => cda::read_cda(reader),
        _ => Err(Error::UnsupportedFormat),
    }
}

/// Reads an audio tag from the given path
///
/// The format is selected by the path's extension,
/// matched case-insensitively.
///
/// # Errors
///
/// Returns any error from opening or parsing the file.
pub fn read_path<P: AsRef<Path>>(path: P, strategy: &ReadStrategy) -> Result<AudioTag, Error> {
    let extension = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or(Error::UnsupportedFormat)?;

    File::open(path.as_ref())
        .map_err(Error::Io)
        .and_then(|f| read(BufReader::new(f), &extension, strategy))
}

/// Applies write operations to the file at `src`,
/// writing the result to `dst`
///
/// Only `"flac"` files support writing.  `src` and `dst` may be the
/// same path; the destination is replaced atomically and is never
/// observed in a partially written state.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for non-FLAC extensions,
/// or any error from reading the source or writing the destination.
/// On error the destination file is left untouched.
pub fn write<P: AsRef<Path>>(
    src: P,
    dst: P,
    extension: &str,
    operations: &[WriteOperation],
) -> Result<(), Error> {
    match extension {
        "flac" => write::write_flac(src.as_ref(), dst.as_ref(), operations),
        _ => Err(Error::UnsupportedFormat),
    }
}
