//! Reading CDA track descriptors
//!
//! A `.cda` file is not audio at all: it is a fixed 44-byte RIFF
//! record pointing at a track on an audio CD.  Everything about
//! the track's actual stream is implied by the CD-DA standard
//! (44.1 kHz, 2 channels, 16 bits), so reading one yields a
//! synthesized stream info plus the disc ID and track number.
//! CDA files are strictly read-only.

use crate::Error;
use crate::metadata::Streaminfo;
use crate::tag::{AudioTag, Metadata, fields};
use bitstream_io::{ByteRead, ByteReader, LittleEndian};
use std::io::Read;
use std::num::NonZero;

/// A time position in the CD's minutes/seconds/frames format
///
/// A frame here is a CD sector, 1/75th of a second.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TrackTime {
    /// Whole minutes
    pub minutes: u8,
    /// Whole seconds, 0..60
    pub seconds: u8,
    /// Remaining frames, 0..75
    pub frames: u8,
}

/// The track information a CDA file points to
///
/// | Bytes | Field | Meaning |
/// |------:|------:|---------|
/// | 4     | | `"RIFF"` |
/// | 4     | | chunk size, always 36 |
/// | 4     | | `"CDDA"` |
/// | 4     | | `"fmt "` |
/// | 4     | | format chunk length, always 24 |
/// | 2     | | format version, always 1 |
/// | 2     | `track_number` | track number on the disc |
/// | 4     | `disc_id` | disc serial number |
/// | 4     | `start_offset_frames` | track start, in frames from disc start |
/// | 4     | `total_duration_frames` | track length, in frames |
/// | 4     | | track start as M/S/F, redundant with the offset |
/// | 3     | `duration` | track length as frames/seconds/minutes bytes |
/// | 1     | | padding |
///
/// All integers are little-endian, unlike FLAC's.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Cda {
    /// The track's number on the disc, always positive
    pub track_number: i16,
    /// The disc's serial number
    pub disc_id: i32,
    /// The track's start offset from the start of the disc, in frames
    pub start_offset_frames: i32,
    /// The track's total duration, in frames
    pub total_duration_frames: i32,
    /// The track's duration in minutes/seconds/frames form
    pub duration: TrackTime,
}

impl Cda {
    /// CD sectors per second
    pub const FRAMES_PER_SECOND: u32 = 75;

    /// The CD-DA sample rate, in Hz
    pub const SAMPLE_RATE: u32 = 44100;

    /// The CD-DA channel count
    pub const CHANNELS: NonZero<u8> = NonZero::new(2).unwrap();

    /// The CD-DA bits-per-sample
    pub const BITS_PER_SAMPLE: u8 = 16;

    /// Parses a CDA record from the given reader
    ///
    /// # Errors
    ///
    /// Returns an error if any of the record's literal tokens or
    /// fixed constants are wrong, the track number is not positive,
    /// an offset is negative, or the underlying stream fails.
    pub fn parse<R: Read>(reader: R) -> Result<Self, Error> {
        let mut r = ByteReader::endian(reader, LittleEndian);

        if &r.read::<[u8; 4]>()? != b"RIFF" {
            return Err(Error::MissingRiffTag);
        }
        if r.read::<u32>()? != 36 {
            return Err(Error::InvalidCdaChunk);
        }
        if &r.read::<[u8; 4]>()? != b"CDDA" {
            return Err(Error::MissingCddaTag);
        }
        if &r.read::<[u8; 4]>()? != b"fmt " || r.read::<u32>()? != 24 || r.read::<i16>()? != 1 {
            return Err(Error::InvalidCdaChunk);
        }

        let track_number = r.read::<i16>()?;
        if track_number <= 0 {
            return Err(Error::InvalidCdaTrackNumber);
        }

        let disc_id = r.read::<i32>()?;
        let start_offset_frames = r.read::<i32>()?;
        let total_duration_frames = r.read::<i32>()?;
        if start_offset_frames < 0 || total_duration_frames < 0 {
            return Err(Error::InvalidCdaOffset);
        }

        // redundant M/S/F rendering of the start offset
        r.skip(4)?;

        let frames = r.read::<u8>()?;
        let seconds = r.read::<u8>()?;
        let minutes = r.read::<u8>()?;
        r.skip(1)?;

        Ok(Self {
            track_number,
            disc_id,
            start_offset_frames,
            total_duration_frames,
            duration: TrackTime {
                minutes,
                seconds,
                frames,
            },
        })
    }

    /// The track's total length in channel-independent samples
    pub fn total_samples(&self) -> u64 {
        // 588 samples per frame, exactly
        self.total_duration_frames as u64 * u64::from(Self::SAMPLE_RATE)
            / u64::from(Self::FRAMES_PER_SECOND)
    }
}

/// Reads a CDA file into an [`AudioTag`]
///
/// The stream info is synthesized from the CD-DA standard
/// parameters; the disc ID and track number surface as
/// [`fields::DISC_ID`] and [`fields::TRACK_NUMBER`] metadata.
/// The record itself is all metadata, so no pictures exist and
/// the file-level metadata length is zero.
pub fn read_cda<R: Read>(reader: R) -> Result<AudioTag, Error> {
    let cda = Cda::parse(reader)?;

    Ok(AudioTag {
        streaminfo: Some(Streaminfo {
            minimum_block_size: 4096,
            maximum_block_size: 4096,
            minimum_frame_size: 0,
            maximum_frame_size: 0,
            sample_rate: Cda::SAMPLE_RATE,
            channels: Cda::CHANNELS,
            bits_per_sample: Cda::BITS_PER_SAMPLE,
            total_samples: cda.total_samples(),
            md5: None,
        }),
        metadatas: Some(vec![
            Metadata::new(fields::DISC_ID, &cda.disc_id.to_string()),
            Metadata::new(fields::TRACK_NUMBER, &cda.track_number.to_string()),
        ]),
        pictures: None,
        file_level_metadata_length: 0,
    })
}
