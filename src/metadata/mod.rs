//! Codecs for a FLAC file's metadata block section
//!
//! Type names keep the capitalization used by the FLAC format
//! documentation.
//!
//! A FLAC file opens with the `"fLaC"` signature and one or more
//! metadata blocks; the final block is flagged as such in its own
//! header, and the audio frames follow immediately after it.
//! The format defines seven block types:
//!
//! | Block Type | Contents |
//! |-----------:|----------|
//! | [STREAMINFO](`Streaminfo`) | the stream's sample rate, channel count, length, and so on |
//! | [PADDING](`Padding`) | zero bytes reserved for future metadata growth |
//! | [APPLICATION](`Application`) | binary data belonging to some registered application |
//! | [SEEKTABLE](`SeekTable`) | sample-to-byte mappings for faster seeking |
//! | [VORBIS_COMMENT](`VorbisComment`) | the textual metadata: track title, artist, album, and the rest |
//! | [CUESHEET](`Cuesheet`) | the source disc's table of contents, for CD images |
//! | [PICTURE](`Picture`) | an embedded image such as cover art |

use crate::Error;
use bitstream_io::{
    BigEndian, BitRead, BitReader, BitWrite, BitWriter, FromBitStream, FromBitStreamUsing,
    FromBitStreamWith, LittleEndian, ToBitStream, ToBitStreamUsing,
};
use std::io::{Read, Seek, SeekFrom};
use std::num::NonZero;
use std::path::Path;

pub(crate) const FLAC_TAG: &[u8; 4] = b"fLaC";

/// A metadata block's 32-bit header
///
/// One bit flags the final block in the file, seven bits carry
/// the block type, and the remaining 24 bits give the size of
/// the block's body in bytes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BlockHeader {
    /// Set on the file's final metadata block
    pub last: bool,
    /// The block's type
    pub block_type: BlockType,
    /// The body's size in bytes
    pub size: BlockSize,
}

impl FromBitStream for BlockHeader {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        Ok(Self {
            last: r.read::<1, _>()?,
            block_type: r.parse()?,
            size: r.parse()?,
        })
    }
}

impl ToBitStream for BlockHeader {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<1, _>(self.last)?;
        w.build(&self.block_type)?;
        w.build(&self.size).map_err(Error::Io)?;
        Ok(())
    }
}

/// A defined FLAC metadata block type
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub enum BlockType {
    /// The STREAMINFO block
    Streaminfo = 0,
    /// The PADDING block
    Padding = 1,
    /// The APPLICATION block
    Application = 2,
    /// The SEEKTABLE block
    SeekTable = 3,
    /// The VORBIS_COMMENT block
    VorbisComment = 4,
    /// The CUESHEET block
    Cuesheet = 5,
    /// The PICTURE block
    Picture = 6,
    /// The forbidden block type
    ///
    /// Defined to avoid confusion with a frame sync code;
    /// a block carrying it is always rejected.
    Invalid = 127,
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Streaminfo => "STREAMINFO".fmt(f),
            Self::Padding => "PADDING".fmt(f),
            Self::Application => "APPLICATION".fmt(f),
            Self::SeekTable => "SEEKTABLE".fmt(f),
            Self::VorbisComment => "VORBIS_COMMENT".fmt(f),
            Self::Cuesheet => "CUESHEET".fmt(f),
            Self::Picture => "PICTURE".fmt(f),
            Self::Invalid => "INVALID".fmt(f),
        }
    }
}

impl FromBitStream for BlockType {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        match r.read::<7, u8>()? {
            0 => Ok(Self::Streaminfo),
            1 => Ok(Self::Padding),
            2 => Ok(Self::Application),
            3 => Ok(Self::SeekTable),
            4 => Ok(Self::VorbisComment),
            5 => Ok(Self::Cuesheet),
            6 => Ok(Self::Picture),
            7..=126 => Err(Error::ReservedMetadataBlock),
            _ => Ok(Self::Invalid),
        }
    }
}

impl ToBitStream for BlockType {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<7, u8>(match self {
            Self::Streaminfo => 0,
            Self::Padding => 1,
            Self::Application => 2,
            Self::SeekTable => 3,
            Self::VorbisComment => 4,
            Self::Cuesheet => 5,
            Self::Picture => 6,
            Self::Invalid => 127,
        })
        .map_err(Error::Io)
    }
}

/// A block body size, restricted to the header's 24-bit range
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct BlockSize(u32);

impl BlockSize {
    const MAX: u32 = (1 << 24) - 1;

    /// The size as a plain u32
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BlockSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromBitStream for BlockSize {
    type Error = std::io::Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        r.read::<24, _>().map(Self)
    }
}

impl ToBitStream for BlockSize {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<24, _>(self.0)
    }
}

impl From<u8> for BlockSize {
    fn from(u: u8) -> Self {
        Self(u.into())
    }
}

impl From<u16> for BlockSize {
    fn from(u: u16) -> Self {
        Self(u.into())
    }
}

impl TryFrom<usize> for BlockSize {
    type Error = Error;

    fn try_from(u: usize) -> Result<Self, Error> {
        u32::try_from(u)
            .ok()
            .filter(|s| *s <= Self::MAX)
            .map(Self)
            .ok_or(Error::ExcessiveBlockSize)
    }
}

impl From<BlockSize> for u32 {
    #[inline]
    fn from(size: BlockSize) -> u32 {
        size.0
    }
}

/// A STREAMINFO metadata block
///
/// Carries the stream's technical parameters.  A well-formed FLAC
/// file has exactly one, and it is always the first block.
///
/// The body is 34 bytes of big-endian bit-packed fields: 16-bit
/// minimum and maximum block sizes (in samples), 24-bit minimum
/// and maximum frame sizes (in bytes), a 20-bit sample rate,
/// 3 bits of channel count (stored minus one), 5 bits of bit
/// depth (stored minus one), a 36-bit total sample count, and the
/// 16-byte MD5 hash of the unencoded audio.  Several fields
/// straddle byte boundaries: the sample rate spans two and a half
/// bytes, the channel count shares a byte with the top of the bit
/// depth, and the bit depth's low bits share a byte with the top
/// of the sample count.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Streaminfo {
    /// The minimum block size (in samples) used in the stream
    pub minimum_block_size: u16,
    /// The maximum block size (in samples) used in the stream
    pub maximum_block_size: u16,
    /// The minimum frame size (in bytes) used in the stream,
    /// 0 if unknown
    pub minimum_frame_size: u32,
    /// The maximum frame size (in bytes) used in the stream,
    /// 0 if unknown
    pub maximum_frame_size: u32,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count, 1 to 8
    pub channels: NonZero<u8>,
    /// Bit depth, from 4 to 32 bits per sample
    pub bits_per_sample: u8,
    /// Total number of interchannel samples in stream,
    /// 0 if unknown
    pub total_samples: u64,
    /// MD5 hash of the unencoded audio data
    ///
    /// `None` when the file leaves it unset (all zero bytes on disk).
    pub md5: Option<[u8; 16]>,
}

impl Streaminfo {
    /// Largest frame size a 24-bit field can carry, in bytes
    pub const MAX_FRAME_SIZE: u32 = (1 << 24) - 1;

    /// The maximum sample rate, in Hz
    pub const MAX_SAMPLE_RATE: u32 = 655350;

    /// Highest channel count the format allows (8)
    pub const MAX_CHANNELS: NonZero<u8> = NonZero::new(8).unwrap();

    /// Largest total sample count a 36-bit field can carry
    pub const MAX_TOTAL_SAMPLES: u64 = (1 << 36) - 1;

    /// Returns the MD5 hash rendered as 32 lowercase hex characters
    pub fn md5_hex(&self) -> Option<String> {
        self.md5.map(|md5| {
            md5.iter().fold(String::with_capacity(32), |mut s, b| {
                use std::fmt::Write;
                // infallible for String
                let _ = write!(s, "{b:02x}");
                s
            })
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.minimum_block_size < 16 || self.minimum_block_size > self.maximum_block_size {
            Err(Error::InvalidBlockSize)
        } else if self.minimum_frame_size > Self::MAX_FRAME_SIZE
            || self.maximum_frame_size > Self::MAX_FRAME_SIZE
        {
            Err(Error::InvalidFrameSize)
        } else if !(1..=Self::MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            Err(Error::InvalidSampleRate)
        } else if self.channels > Self::MAX_CHANNELS {
            Err(Error::InvalidChannelCount)
        } else if !(4..=32).contains(&self.bits_per_sample) {
            Err(Error::InvalidBitsPerSample)
        } else if self.total_samples > Self::MAX_TOTAL_SAMPLES {
            Err(Error::InvalidSampleCount)
        } else {
            Ok(())
        }
    }
}

impl FromBitStream for Streaminfo {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        let streaminfo = Self {
            minimum_block_size: r.read_to()?,
            maximum_block_size: r.read_to()?,
            minimum_frame_size: r.read::<24, _>()?,
            maximum_frame_size: r.read::<24, _>()?,
            sample_rate: r.read::<20, _>()?,
            channels: r.read::<3, _>()?,
            bits_per_sample: r.read::<5, u8>()? + 1,
            total_samples: r.read::<36, _>()?,
            md5: r
                .read_to()
                .map(|md5: [u8; 16]| md5.iter().any(|b| *b != 0).then_some(md5))?,
        };
        streaminfo.validate()?;
        Ok(streaminfo)
    }
}

impl ToBitStream for Streaminfo {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        self.validate()?;
        w.write_from(self.minimum_block_size)?;
        w.write_from(self.maximum_block_size)?;
        w.write::<24, _>(self.minimum_frame_size)?;
        w.write::<24, _>(self.maximum_frame_size)?;
        w.write::<20, _>(self.sample_rate)?;
        w.write::<3, _>(self.channels)?;
        w.write::<5, _>(self.bits_per_sample - 1)?;
        w.write::<36, _>(self.total_samples)?;
        w.write_from(self.md5.unwrap_or([0; 16]))?;
        Ok(())
    }
}

/// A PADDING metadata block
///
/// Padding blocks are empty blocks consisting of all 0 bytes,
/// re-emitted unchanged when a file is rewritten.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Padding {
    /// Padding length in bytes
    pub size: BlockSize,
}

impl FromBitStreamUsing for Padding {
    type Context = BlockSize;
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R, size: BlockSize) -> Result<Self, Self::Error> {
        r.skip(size.get() * 8)?;
        Ok(Self { size })
    }
}

impl ToBitStream for Padding {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.pad(self.size.get() * 8)
    }
}

/// An APPLICATION metadata block
///
/// A 32-bit registered application ID followed by whatever data
/// that application chose to store.  The payload is preserved
/// byte-for-byte when a file is rewritten.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Application {
    /// The application's registered ID
    pub id: u32,
    /// The application's opaque payload
    pub data: Vec<u8>,
}

impl FromBitStreamUsing for Application {
    type Context = BlockSize;
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R, size: BlockSize) -> Result<Self, Self::Error> {
        let payload_len = size
            .get()
            .checked_sub(4)
            .ok_or(Error::InsufficientApplicationBlock)?;

        Ok(Self {
            id: r.read_to()?,
            data: r.read_to_vec(payload_len.try_into().unwrap())?,
        })
    }
}

impl ToBitStream for Application {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_from(self.id)?;
        w.write_bytes(&self.data)
    }
}

/// A SEEKTABLE metadata block
///
/// A sequence of fixed-size seek points mapping sample numbers
/// to byte offsets within the audio frames.  The table is
/// preserved as-is when a file is rewritten; because its byte
/// offsets are relative to the first audio frame, resizing the
/// metadata section does not invalidate it.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct SeekTable {
    /// The table's seek points, in file order
    pub points: Vec<SeekPoint>,
}

/// A single SEEKTABLE record
///
/// 18 bytes: a 64-bit sample number, a 64-bit byte offset of the
/// target frame measured from the first frame, and a 16-bit count
/// of the samples in that frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SeekPoint {
    /// Sample number of the first sample in the target frame
    ///
    /// All bits set indicates a placeholder point.
    pub sample_number: u64,
    /// Offset in bytes from the first byte of the first frame
    pub stream_offset: u64,
    /// Sample count of the target frame
    pub frame_samples: u16,
}

impl SeekPoint {
    /// Size of a single seek point, in bytes
    pub const SIZE: u32 = (64 + 64 + 16) / 8;
}

impl FromBitStreamUsing for SeekTable {
    type Context = BlockSize;
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R, size: BlockSize) -> Result<Self, Self::Error> {
        if size.get() % SeekPoint::SIZE != 0 {
            return Err(Error::InvalidSeekTableSize);
        }

        Ok(Self {
            points: (0..(size.get() / SeekPoint::SIZE))
                .map(|_| {
                    Ok(SeekPoint {
                        sample_number: r.read_to()?,
                        stream_offset: r.read_to()?,
                        frame_samples: r.read_to()?,
                    })
                })
                .collect::<Result<Vec<_>, std::io::Error>>()?,
        })
    }
}

impl ToBitStream for SeekTable {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        self.points.iter().try_for_each(|point| {
            w.write_from(point.sample_number)?;
            w.write_from(point.stream_offset)?;
            w.write_from(point.frame_samples)
        })
    }
}

/// A VORBIS_COMMENT metadata block
///
/// Holds a vendor string and a sequence of `"FIELD=value"`
/// user comment strings, all length-prefixed with little-endian
/// 32-bit lengths (unlike every other field in FLAC, which is
/// big-endian).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VorbisComment {
    /// The vendor string
    pub vendor_string: String,
    /// The `"FIELD=value"` user comment strings
    pub fields: Vec<String>,
}

impl Default for VorbisComment {
    fn default() -> Self {
        Self {
            vendor_string: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
                .to_owned(),
            fields: vec![],
        }
    }
}

impl FromBitStream for VorbisComment {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        // lengths here are little-endian, unlike the rest of FLAC
        fn comment<R: BitRead + ?Sized>(r: &mut R) -> Result<String, Error> {
            let len = r.read_as_to::<LittleEndian, u32>()?;
            Ok(String::from_utf8(r.read_to_vec(len.try_into().unwrap())?)?)
        }

        let vendor_string = comment(r)?;
        let field_count = r.read_as_to::<LittleEndian, u32>()?;
        Ok(Self {
            vendor_string,
            fields: (0..field_count)
                .map(|_| comment(r))
                .collect::<Result<_, _>>()?,
        })
    }
}

impl ToBitStream for VorbisComment {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        fn comment<W: BitWrite + ?Sized>(w: &mut W, s: &str) -> Result<(), Error> {
            let len = s
                .len()
                .try_into()
                .map_err(|_| Error::ExcessiveStringLength)?;
            w.write_as_from::<LittleEndian, u32>(len)?;
            Ok(w.write_bytes(s.as_bytes())?)
        }

        comment(w, &self.vendor_string)?;

        let field_count = self
            .fields
            .len()
            .try_into()
            .map_err(|_| Error::ExcessiveStringLength)?;
        w.write_as_from::<LittleEndian, u32>(field_count)?;
        self.fields.iter().try_for_each(|field| comment(w, field))
    }
}

/// A CUESHEET metadata block
///
/// Stored as an opaque payload and re-emitted byte-for-byte
/// unchanged when a file is rewritten.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Cuesheet {
    /// The raw block contents
    pub data: Vec<u8>,
}

impl FromBitStreamUsing for Cuesheet {
    type Context = BlockSize;
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R, size: BlockSize) -> Result<Self, Self::Error> {
        Ok(Self {
            data: r.read_to_vec(size.get().try_into().unwrap())?,
        })
    }
}

impl ToBitStream for Cuesheet {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_bytes(&self.data)
    }
}

/// A PICTURE metadata block
///
/// All fields are big-endian 32-bit values or 32-bit
/// length-prefixed byte strings:
///
/// | Field | Meaning |
/// |------:|---------|
/// | `picture_type` | what the picture depicts |
/// | `media_type` | RFC 2046 media type string |
/// | `description` | description of the picture |
/// | `width` | width in pixels |
/// | `height` | height in pixels |
/// | `color_depth` | color depth in bits-per-pixel |
/// | `colors_number` | number of colors for indexed pictures, 0 otherwise |
/// | `data` | the binary picture data |
///
/// The binary data may be loaded eagerly or deferred to a
/// stream locator, depending on how the picture was read.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Picture {
    /// The picture type
    pub picture_type: PictureType,
    /// The media type string as specified by RFC 2046
    pub media_type: String,
    /// A textual description of the picture
    pub description: String,
    /// Picture width in pixels
    pub width: u32,
    /// Picture height in pixels
    pub height: u32,
    /// Color depth in bits per pixel
    pub color_depth: u32,
    /// Number of colors for indexed-color pictures, 0 otherwise
    pub colors_number: u32,
    /// The binary picture data, loaded or deferred
    pub data: PictureData,
}

/// The binary payload of a PICTURE block
///
/// Exactly one of the two representations is meaningful at a
/// time: either the bytes themselves, or the place in the source
/// stream they can be fetched from later.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PictureData {
    /// The picture bytes, read eagerly
    Loaded(Vec<u8>),
    /// Where the picture bytes live in the source stream
    Deferred(PictureLocation),
}

/// The location of a deferred picture payload in its source stream
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PictureLocation {
    /// Absolute byte offset of the payload from the stream's start
    pub offset: u64,
    /// Length of the payload, in bytes
    pub length: u32,
}

impl Picture {
    /// Returns the picture bytes, if they were loaded
    pub fn data(&self) -> Option<&[u8]> {
        match &self.data {
            PictureData::Loaded(data) => Some(data),
            PictureData::Deferred(_) => None,
        }
    }

    /// Returns the payload's stream location, if it was deferred
    pub fn location(&self) -> Option<PictureLocation> {
        match &self.data {
            PictureData::Loaded(_) => None,
            PictureData::Deferred(location) => Some(*location),
        }
    }

    /// Whether the picture bytes are loaded
    pub fn is_loaded(&self) -> bool {
        matches!(self.data, PictureData::Loaded(_))
    }

    /// Fetches the picture bytes from the given stream
    ///
    /// For a deferred picture, the stream must be the same one
    /// the picture was originally read from; this seeks to the
    /// recorded location and reads the payload.  For a loaded
    /// picture, this simply returns a copy of the bytes.
    ///
    /// # Errors
    ///
    /// Returns any error from seeking or reading the stream.
    pub fn load_data<R: Read + Seek>(&self, mut reader: R) -> Result<Vec<u8>, Error> {
        match &self.data {
            PictureData::Loaded(data) => Ok(data.clone()),
            PictureData::Deferred(location) => {
                reader.seek(SeekFrom::Start(location.offset))?;
                let mut data = vec![0; location.length.try_into().unwrap()];
                reader.read_exact(&mut data)?;
                Ok(data)
            }
        }
    }

    /// Fetches the picture bytes from the file at the given path
    ///
    /// See [`Picture::load_data`] for additional information.
    pub fn load_data_from<P: AsRef<Path>>(&self, path: P) -> Result<Vec<u8>, Error> {
        std::fs::File::open(path)
            .map_err(Error::Io)
            .and_then(|f| self.load_data(std::io::BufReader::new(f)))
    }
}

impl FromBitStream for Picture {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Error> {
        fn prefixed_field<R: BitRead + ?Sized>(r: &mut R) -> std::io::Result<Vec<u8>> {
            let size = r.read_to::<u32>()?;
            r.read_to_vec(size.try_into().unwrap())
        }

        Ok(Self {
            picture_type: r.parse()?,
            media_type: String::from_utf8(prefixed_field(r)?)?,
            description: String::from_utf8(prefixed_field(r)?)?,
            width: r.read_to()?,
            height: r.read_to()?,
            color_depth: r.read_to()?,
            colors_number: r.read_to()?,
            data: PictureData::Loaded(prefixed_field(r)?),
        })
    }
}

impl ToBitStream for Picture {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Error> {
        fn prefixed_field<W: BitWrite + ?Sized>(w: &mut W, field: &[u8]) -> Result<(), Error> {
            w.write_from::<u32>(
                field
                    .len()
                    .try_into()
                    .map_err(|_| Error::ExcessiveStringLength)?,
            )
            .map_err(Error::Io)?;
            w.write_bytes(field).map_err(Error::Io)
        }

        let data = match &self.data {
            PictureData::Loaded(data) => data,
            PictureData::Deferred(_) => return Err(Error::UnloadedPictureData),
        };

        w.build(&self.picture_type).map_err(Error::Io)?;
        prefixed_field(w, self.media_type.as_bytes())?;
        prefixed_field(w, self.description.as_bytes())?;
        w.write_from(self.width)?;
        w.write_from(self.height)?;
        w.write_from(self.color_depth)?;
        w.write_from(self.colors_number)?;
        prefixed_field(w, data)
    }
}

/// Defined variants of PICTURE type
///
/// Values outside the defined range are carried through as
/// [`PictureType::Unknown`] rather than rejected, and re-serialize
/// to the same on-disk value.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PictureType {
    /// Other
    Other,
    /// PNG file icon of 32x32 pixels
    Png32x32,
    /// General file icon
    GeneralFileIcon,
    /// Front cover
    FrontCover,
    /// Back cover
    BackCover,
    /// Liner notes page
    LinerNotes,
    /// Media label (e.g., CD, Vinyl or Cassette label)
    MediaLabel,
    /// Lead artist, lead performer, or soloist
    LeadArtist,
    /// Artist or performer
    Artist,
    /// Conductor
    Conductor,
    /// Band or orchestra
    Band,
    /// Composer
    Composer,
    /// Lyricist or text writer
    Lyricist,
    /// Recording location
    RecordingLocation,
    /// During recording
    DuringRecording,
    /// During performance
    DuringPerformance,
    /// Movie or video screen capture
    ScreenCapture,
    /// A bright colored fish
    Fish,
    /// Illustration
    Illustration,
    /// Band or artist logotype
    BandLogo,
    /// Publisher or studio logotype
    PublisherLogo,
    /// Any value not defined by the format
    Unknown(u32),
}

impl PictureType {
    /// Returns this type's priority as a cover-art candidate
    ///
    /// Used by smart front-cover selection: front covers beat
    /// back covers, which beat general file icons, which beat
    /// everything else.
    pub fn cover_priority(&self) -> u8 {
        match self {
            Self::FrontCover => 100,
            Self::BackCover => 80,
            Self::GeneralFileIcon => 60,
            _ => 10,
        }
    }
}

impl std::fmt::Display for PictureType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Other => "Other".fmt(f),
            Self::Png32x32 => "32×32 PNG Icon".fmt(f),
            Self::GeneralFileIcon => "General File Icon".fmt(f),
            Self::FrontCover => "Cover (front)".fmt(f),
            Self::BackCover => "Cover (back)".fmt(f),
            Self::LinerNotes => "Liner Notes".fmt(f),
            Self::MediaLabel => "Media Label".fmt(f),
            Self::LeadArtist => "Lead Artist".fmt(f),
            Self::Artist => "Artist".fmt(f),
            Self::Conductor => "Conductor".fmt(f),
            Self::Band => "Band or Orchestra".fmt(f),
            Self::Composer => "Composer".fmt(f),
            Self::Lyricist => "Lyricist or Text Writer".fmt(f),
            Self::RecordingLocation => "Recording Location".fmt(f),
            Self::DuringRecording => "During Recording".fmt(f),
            Self::DuringPerformance => "During Performance".fmt(f),
            Self::ScreenCapture => "Movie or Video Screen Capture".fmt(f),
            Self::Fish => "A Bright Colored Fish".fmt(f),
            Self::Illustration => "Illustration".fmt(f),
            Self::BandLogo => "Band or Artist Logotype".fmt(f),
            Self::PublisherLogo => "Publisher or Studio Logotype".fmt(f),
            Self::Unknown(n) => write!(f, "Unknown ({n})"),
        }
    }
}

impl From<u32> for PictureType {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Other,
            1 => Self::Png32x32,
            2 => Self::GeneralFileIcon,
            3 => Self::FrontCover,
            4 => Self::BackCover,
            5 => Self::LinerNotes,
            6 => Self::MediaLabel,
            7 => Self::LeadArtist,
            8 => Self::Artist,
            9 => Self::Conductor,
            10 => Self::Band,
            11 => Self::Composer,
            12 => Self::Lyricist,
            13 => Self::RecordingLocation,
            14 => Self::DuringRecording,
            15 => Self::DuringPerformance,
            16 => Self::ScreenCapture,
            17 => Self::Fish,
            18 => Self::Illustration,
            19 => Self::BandLogo,
            20 => Self::PublisherLogo,
            n => Self::Unknown(n),
        }
    }
}

impl From<PictureType> for u32 {
    fn from(picture_type: PictureType) -> u32 {
        match picture_type {
            PictureType::Other => 0,
            PictureType::Png32x32 => 1,
            PictureType::GeneralFileIcon => 2,
            PictureType::FrontCover => 3,
            PictureType::BackCover => 4,
            PictureType::LinerNotes => 5,
            PictureType::MediaLabel => 6,
            PictureType::LeadArtist => 7,
            PictureType::Artist => 8,
            PictureType::Conductor => 9,
            PictureType::Band => 10,
            PictureType::Composer => 11,
            PictureType::Lyricist => 12,
            PictureType::RecordingLocation => 13,
            PictureType::DuringRecording => 14,
            PictureType::DuringPerformance => 15,
            PictureType::ScreenCapture => 16,
            PictureType::Fish => 17,
            PictureType::Illustration => 18,
            PictureType::BandLogo => 19,
            PictureType::PublisherLogo => 20,
            PictureType::Unknown(n) => n,
        }
    }
}

impl FromBitStream for PictureType {
    type Error = std::io::Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        r.read_to::<u32>().map(Self::from)
    }
}

impl ToBitStream for PictureType {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_from(u32::from(*self))
    }
}

/// Any possible FLAC metadata block
///
/// On disk every block is a [`BlockHeader`] followed immediately
/// by the block's body.  Parsing dispatches on the header's type;
/// serializing computes a fresh header from the body's size.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Block {
    /// The STREAMINFO block
    Streaminfo(Streaminfo),
    /// The PADDING block
    Padding(Padding),
    /// The APPLICATION block
    Application(Application),
    /// The SEEKTABLE block
    SeekTable(SeekTable),
    /// The VORBIS_COMMENT block
    VorbisComment(VorbisComment),
    /// The CUESHEET block
    Cuesheet(Cuesheet),
    /// The PICTURE block
    Picture(Picture),
}

impl Block {
    /// The type tag matching this variant
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Streaminfo(_) => BlockType::Streaminfo,
            Self::Padding(_) => BlockType::Padding,
            Self::Application(_) => BlockType::Application,
            Self::SeekTable(_) => BlockType::SeekTable,
            Self::VorbisComment(_) => BlockType::VorbisComment,
            Self::Cuesheet(_) => BlockType::Cuesheet,
            Self::Picture(_) => BlockType::Picture,
        }
    }

    /// Serializes our contents, without header, to a fresh buffer
    fn body(&self) -> Result<Vec<u8>, Error> {
        let mut w = BitWriter::endian(Vec::new(), BigEndian);
        match self {
            Self::Streaminfo(streaminfo) => w.build(streaminfo)?,
            Self::Padding(padding) => w.build(padding).map_err(Error::Io)?,
            Self::Application(application) => w.build(application).map_err(Error::Io)?,
            Self::SeekTable(seektable) => w.build(seektable).map_err(Error::Io)?,
            Self::VorbisComment(vorbis_comment) => w.build(vorbis_comment)?,
            Self::Cuesheet(cuesheet) => w.build(cuesheet).map_err(Error::Io)?,
            Self::Picture(picture) => w.build(picture)?,
        }
        Ok(w.into_writer())
    }
}

impl FromBitStreamWith<'_> for Block {
    type Context = BlockHeader;
    type Error = Error;

    // the header has already been consumed by the caller
    fn from_reader<R: BitRead + ?Sized>(
        r: &mut R,
        header: &BlockHeader,
    ) -> Result<Self, Self::Error> {
        match header.block_type {
            BlockType::Streaminfo => Ok(Block::Streaminfo(r.parse()?)),
            BlockType::Padding => Ok(Block::Padding(r.parse_using(header.size)?)),
            BlockType::Application => Ok(Block::Application(r.parse_using(header.size)?)),
            BlockType::SeekTable => Ok(Block::SeekTable(r.parse_using(header.size)?)),
            BlockType::VorbisComment => Ok(Block::VorbisComment(r.parse()?)),
            BlockType::Cuesheet => Ok(Block::Cuesheet(r.parse_using(header.size)?)),
            BlockType::Picture => Ok(Block::Picture(r.parse()?)),
            BlockType::Invalid => Err(Error::InvalidMetadataBlock),
        }
    }
}

impl ToBitStreamUsing for Block {
    type Context = bool;
    type Error = Error;

    // builds to writer with a freshly computed header
    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W, is_last: bool) -> Result<(), Error> {
        let body = self.body()?;
        w.build(&BlockHeader {
            last: is_last,
            block_type: self.block_type(),
            size: body.len().try_into()?,
        })?;
        w.write_bytes(&body).map_err(Error::Io)
    }
}

/// Parses one block's body, enforcing that it consumes
/// exactly the size promised by its header.
pub(crate) fn parse_block<R: Read>(reader: &mut R, header: &BlockHeader) -> Result<Block, Error> {
    // like a slightly easier variant of "Take"
    struct LimitedReader<R> {
        reader: R,
        size: usize,
    }

    impl<R: Read> Read for LimitedReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let size = self.size.min(buf.len());
            self.reader.read(&mut buf[0..size]).inspect(|amt_read| {
                self.size -= amt_read;
            })
        }
    }

    let mut r = BitReader::endian(
        LimitedReader {
            reader: reader.by_ref(),
            size: header.size.get().try_into().unwrap(),
        },
        BigEndian,
    );

    let block = r.parse_with(header)?;

    match r.into_reader().size {
        0 => Ok(block),
        _ => Err(Error::InvalidMetadataBlockSize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(block: &Block) -> Block {
        let mut buf = Vec::new();
        let mut w = BitWriter::endian(&mut buf, BigEndian);
        w.build_using(block, true).unwrap();

        let mut r = BitReader::endian(buf.as_slice(), BigEndian);
        let header: BlockHeader = r.parse().unwrap();
        assert!(header.last);
        assert_eq!(header.block_type, block.block_type());
        r.parse_with::<Block>(&header).unwrap()
    }

    fn test_streaminfo() -> Streaminfo {
        Streaminfo {
            minimum_block_size: 4096,
            maximum_block_size: 4096,
            minimum_frame_size: 12,
            maximum_frame_size: 12,
            sample_rate: 44100,
            channels: NonZero::new(1).unwrap(),
            bits_per_sample: 16,
            total_samples: 80,
            md5: Some([
                0x3a, 0x5d, 0x00, 0x91, 0xff, 0x07, 0x42, 0x6e, 0x1c, 0x88, 0xb4, 0xd9, 0x20,
                0x65, 0xfa, 0x13,
            ]),
        }
    }

    #[test]
    fn block_header() {
        let data: &[u8] = &[0b1_0000000, 0x00, 0x00, 0x22];
        let mut r = BitReader::endian(data, BigEndian);
        assert_eq!(
            r.parse::<BlockHeader>().unwrap(),
            BlockHeader {
                last: true,
                block_type: BlockType::Streaminfo,
                size: 0x22u8.into(),
            },
        );

        // reserved types are rejected
        let data: &[u8] = &[0b0_0000111, 0x00, 0x00, 0x00];
        let mut r = BitReader::endian(data, BigEndian);
        assert!(matches!(
            r.parse::<BlockHeader>(),
            Err(Error::ReservedMetadataBlock)
        ));

        // the forbidden type still parses at the header level
        let data: &[u8] = &[0b0_1111111, 0x00, 0x00, 0x00];
        let mut r = BitReader::endian(data, BigEndian);
        assert_eq!(
            r.parse::<BlockHeader>().unwrap().block_type,
            BlockType::Invalid,
        );
    }

    #[test]
    fn streaminfo_decode() {
        // fields straddling byte boundaries
        let data: &[u8] = &[
            0x10, 0x00, // min block size
            0x10, 0x00, // max block size
            0x00, 0x00, 0x0c, // min frame size
            0x00, 0x00, 0x0c, // max frame size
            0b00001010, 0b11000100, 0b0100_000_0, 0b1111_0000, // 44100 Hz / 1 ch / 16 bps
            0b00000000, 0b00000000, 0b00000000, 0b01010000, // 80 samples
            0x3a, 0x5d, 0x00, 0x91, 0xff, 0x07, 0x42, 0x6e, // md5
            0x1c, 0x88, 0xb4, 0xd9, 0x20, 0x65, 0xfa, 0x13,
        ];

        let mut r = BitReader::endian(data, BigEndian);
        assert_eq!(r.parse::<Streaminfo>().unwrap(), test_streaminfo());
    }

    #[test]
    fn streaminfo_roundtrip() {
        for _ in 0..1000 {
            let minimum_block_size = fastrand::u16(16..=4096);
            let minimum_frame_size = fastrand::u32(0..=Streaminfo::MAX_FRAME_SIZE);
            let streaminfo = Streaminfo {
                minimum_block_size,
                maximum_block_size: fastrand::u16(minimum_block_size..=u16::MAX),
                minimum_frame_size,
                maximum_frame_size: fastrand::u32(minimum_frame_size..=Streaminfo::MAX_FRAME_SIZE),
                sample_rate: fastrand::u32(1..=Streaminfo::MAX_SAMPLE_RATE),
                channels: NonZero::new(fastrand::u8(1..=8)).unwrap(),
                bits_per_sample: fastrand::u8(4..=32),
                total_samples: fastrand::u64(0..=Streaminfo::MAX_TOTAL_SAMPLES),
                md5: fastrand::bool().then(|| std::array::from_fn(|_| fastrand::u8(1..))),
            };

            assert_eq!(
                roundtrip(&Block::Streaminfo(streaminfo.clone())),
                Block::Streaminfo(streaminfo),
            );
        }
    }

    #[test]
    fn streaminfo_validation() {
        let mut streaminfo = test_streaminfo();
        streaminfo.minimum_block_size = 15;
        let mut w = BitWriter::endian(Vec::new(), BigEndian);
        assert!(matches!(w.build(&streaminfo), Err(Error::InvalidBlockSize)));

        let mut streaminfo = test_streaminfo();
        streaminfo.bits_per_sample = 3;
        let mut w = BitWriter::endian(Vec::new(), BigEndian);
        assert!(matches!(
            w.build(&streaminfo),
            Err(Error::InvalidBitsPerSample)
        ));

        let mut streaminfo = test_streaminfo();
        streaminfo.sample_rate = Streaminfo::MAX_SAMPLE_RATE + 1;
        let mut w = BitWriter::endian(Vec::new(), BigEndian);
        assert!(matches!(
            w.build(&streaminfo),
            Err(Error::InvalidSampleRate)
        ));
    }

    #[test]
    fn md5_hex() {
        assert_eq!(
            test_streaminfo().md5_hex().as_deref(),
            Some("3a5d0091ff07426e1c88b4d92065fa13"),
        );

        let mut streaminfo = test_streaminfo();
        streaminfo.md5 = None;
        assert_eq!(streaminfo.md5_hex(), None);
    }

    #[test]
    fn vorbis_comment() {
        // little-endian length prefixes inside a big-endian stream
        let data: &[u8] = &[
            0x04, 0x00, 0x00, 0x00, // 4 byte vendor string
            0x74, 0x65, 0x73, 0x74, // "test"
            0x02, 0x00, 0x00, 0x00, // 2 fields
            0x0d, 0x00, 0x00, 0x00, // 13 byte field 1
            0x54, 0x49, 0x54, 0x4c, 0x45, 0x3d, 0x54, 0x65, 0x73, 0x74, 0x69, 0x6e, 0x67,
            0x10, 0x00, 0x00, 0x00, // 16 byte field 2
            0x41, 0x4c, 0x42, 0x55, 0x4d, 0x3d, 0x54, 0x65, 0x73, 0x74, 0x20, 0x41, 0x6c, 0x62,
            0x75, 0x6d,
        ];

        let mut r = BitReader::endian(data, BigEndian);
        let comment: VorbisComment = r.parse().unwrap();
        assert_eq!(
            comment,
            VorbisComment {
                vendor_string: "test".to_owned(),
                fields: vec!["TITLE=Testing".to_owned(), "ALBUM=Test Album".to_owned()],
            },
        );

        assert_eq!(
            roundtrip(&Block::VorbisComment(comment.clone())),
            Block::VorbisComment(comment),
        );
    }

    #[test]
    fn picture_roundtrip() {
        let picture = Picture {
            picture_type: PictureType::FrontCover,
            media_type: "image/png".to_owned(),
            description: "cover".to_owned(),
            width: 32,
            height: 32,
            color_depth: 24,
            colors_number: 0,
            data: PictureData::Loaded(vec![1, 2, 3, 4, 5]),
        };

        assert_eq!(
            roundtrip(&Block::Picture(picture.clone())),
            Block::Picture(picture),
        );
    }

    #[test]
    fn unknown_picture_type() {
        assert_eq!(PictureType::from(21), PictureType::Unknown(21));
        assert_eq!(u32::from(PictureType::Unknown(21)), 21);
        assert_eq!(PictureType::from(3), PictureType::FrontCover);

        let picture = Picture {
            picture_type: PictureType::Unknown(99),
            media_type: "image/jpeg".to_owned(),
            description: String::new(),
            width: 0,
            height: 0,
            color_depth: 0,
            colors_number: 0,
            data: PictureData::Loaded(vec![0xff]),
        };

        assert_eq!(
            roundtrip(&Block::Picture(picture.clone())),
            Block::Picture(picture),
        );
    }

    #[test]
    fn deferred_picture_rejected_on_write() {
        let picture = Picture {
            picture_type: PictureType::FrontCover,
            media_type: "image/png".to_owned(),
            description: String::new(),
            width: 0,
            height: 0,
            color_depth: 0,
            colors_number: 0,
            data: PictureData::Deferred(PictureLocation {
                offset: 100,
                length: 5,
            }),
        };

        let mut w = BitWriter::endian(Vec::new(), BigEndian);
        assert!(matches!(
            w.build(&picture),
            Err(Error::UnloadedPictureData)
        ));
    }

    #[test]
    fn seektable() {
        let seektable = SeekTable {
            points: vec![
                SeekPoint {
                    sample_number: 0,
                    stream_offset: 0,
                    frame_samples: 4096,
                },
                SeekPoint {
                    sample_number: 4096,
                    stream_offset: 1024,
                    frame_samples: 4096,
                },
            ],
        };

        assert_eq!(
            roundtrip(&Block::SeekTable(seektable.clone())),
            Block::SeekTable(seektable),
        );

        // size must be a multiple of the seek point size
        let data = [0; 17];
        let mut r = BitReader::endian(data.as_slice(), BigEndian);
        assert!(matches!(
            r.parse_using::<SeekTable>(BlockSize::from(17u8)),
            Err(Error::InvalidSeekTableSize),
        ));
    }

    #[test]
    fn opaque_blocks() {
        let application = Application {
            id: 0x1234,
            data: vec![1, 2, 3, 4],
        };
        assert_eq!(
            roundtrip(&Block::Application(application.clone())),
            Block::Application(application),
        );

        let cuesheet = Cuesheet {
            data: vec![0; 396],
        };
        assert_eq!(
            roundtrip(&Block::Cuesheet(cuesheet.clone())),
            Block::Cuesheet(cuesheet),
        );

        let padding = Padding { size: 64u8.into() };
        assert_eq!(
            roundtrip(&Block::Padding(padding.clone())),
            Block::Padding(padding),
        );
    }
}
