//! The data model shared by all supported formats
//!
//! Textual metadata is normalized into [`Metadata`] key/value pairs
//! regardless of its on-disk representation, and everything a read
//! produces is gathered into an [`AudioTag`].

use crate::metadata::{Picture, Streaminfo};
use std::time::Duration;

/// Common metadata field names
///
/// Fields follow the Vorbis comment naming convention,
/// so they are not an exhaustive set.
pub mod fields {
    /// Track name
    pub const TITLE: &str = "TITLE";
    /// Track performer
    pub const ARTIST: &str = "ARTIST";
    /// Album name
    pub const ALBUM: &str = "ALBUM";
    /// Album's primary performer
    pub const ALBUM_ARTIST: &str = "ALBUMARTIST";
    /// Track genre
    pub const GENRE: &str = "GENRE";
    /// Recording date
    pub const DATE: &str = "DATE";
    /// Track number within the album
    pub const TRACK_NUMBER: &str = "TRACKNUMBER";
    /// Disc number within a multi-disc set
    pub const DISC_NUMBER: &str = "DISCNUMBER";
    /// Work composer
    pub const COMPOSER: &str = "COMPOSER";
    /// Freeform comment
    pub const COMMENT: &str = "COMMENT";
    /// Track lyrics
    pub const LYRICS: &str = "LYRICS";
    /// Source disc identifier, for CD rips
    pub const DISC_ID: &str = "DISCID";
}

/// A single normalized metadata entry
///
/// Keys are stored uppercased with surrounding whitespace removed,
/// so `" title "` and `"TITLE"` compare equal.  Values are kept
/// verbatim.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Metadata {
    /// The normalized field name
    pub key: String,
    /// The field's value, verbatim
    pub value: String,
}

impl Metadata {
    /// Builds a new entry, normalizing the key
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.trim().to_uppercase(),
            value: value.to_owned(),
        }
    }

    /// Parses a `"FIELD=value"` user comment string
    ///
    /// Returns `None` for comments with no `=` separator or an
    /// empty field name; such comments are tolerated in the wild
    /// and simply skipped.
    pub fn from_user_comment(comment: &str) -> Option<Self> {
        let (key, value) = comment.split_once('=')?;
        let metadata = Self::new(key, value);
        metadata.is_valid().then_some(metadata)
    }

    /// Renders this entry as a `"FIELD=value"` user comment string
    pub fn to_user_comment(&self) -> String {
        format!("{}={}", self.key, self.value)
    }

    /// Whether this entry has a usable field name
    pub fn is_valid(&self) -> bool {
        !self.key.is_empty()
    }
}

/// Everything a single read produced
///
/// Each field distinguishes "not requested" (`None`) from
/// "requested, but the file has none" (`Some` of an empty `Vec`),
/// so a caller can tell a file without pictures apart from a read
/// that never looked for any.
#[derive(Debug, Clone, Default)]
pub struct AudioTag {
    /// The stream's technical parameters, if requested
    pub streaminfo: Option<Streaminfo>,
    /// The file's textual metadata, if requested
    pub metadatas: Option<Vec<Metadata>>,
    /// The file's embedded pictures, if requested
    pub pictures: Option<Vec<Picture>>,
    /// Total size in bytes of the file-level metadata,
    /// including the format signature
    pub file_level_metadata_length: u64,
}

impl AudioTag {
    /// Returns the first metadata value with the given field name
    ///
    /// The name is normalized before comparison.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.trim().to_uppercase();
        self.metadatas
            .as_ref()?
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.value.as_str())
    }

    /// The stream's length in seconds, if it can be determined
    ///
    /// Requires a stream info with a known sample count.
    pub fn seconds(&self) -> Option<f64> {
        let streaminfo = self.streaminfo.as_ref()?;
        (streaminfo.total_samples > 0)
            .then(|| streaminfo.total_samples as f64 / f64::from(streaminfo.sample_rate))
    }

    /// The stream's length, if it can be determined
    pub fn duration(&self) -> Option<Duration> {
        self.seconds().map(Duration::from_secs_f64)
    }

    /// Estimates the stream's average bitrate in bits per second
    ///
    /// `file_size` is the size of the whole file in bytes; the
    /// file-level metadata is subtracted before dividing by the
    /// stream's length, so large embedded pictures do not inflate
    /// the estimate.
    pub fn guess_average_bitrate(&self, file_size: u64) -> Option<u32> {
        let seconds = self.seconds().filter(|s| *s > 0.0)?;
        let audio_size = file_size.checked_sub(self.file_level_metadata_length)?;
        Some((audio_size as f64 * 8.0 / seconds) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZero;

    #[test]
    fn key_normalization() {
        let metadata = Metadata::new(" title ", "Test Track");
        assert_eq!(metadata.key, "TITLE");
        assert_eq!(metadata.value, "Test Track");
        assert_eq!(metadata.to_user_comment(), "TITLE=Test Track");
    }

    #[test]
    fn user_comments() {
        assert_eq!(
            Metadata::from_user_comment("artist=Some Band"),
            Some(Metadata::new(fields::ARTIST, "Some Band")),
        );

        // values keep their embedded separators
        assert_eq!(
            Metadata::from_user_comment("COMMENT=a=b=c"),
            Some(Metadata::new(fields::COMMENT, "a=b=c")),
        );

        // empty values are fine
        assert_eq!(
            Metadata::from_user_comment("GENRE="),
            Some(Metadata::new(fields::GENRE, "")),
        );

        // malformed comments are skipped, not fatal
        assert_eq!(Metadata::from_user_comment("no separator here"), None);
        assert_eq!(Metadata::from_user_comment("=orphan value"), None);
        assert_eq!(Metadata::from_user_comment("  =orphan value"), None);
    }

    #[test]
    fn tag_lookup() {
        let tag = AudioTag {
            metadatas: Some(vec![
                Metadata::new(fields::TITLE, "First"),
                Metadata::new(fields::TITLE, "Second"),
            ]),
            ..AudioTag::default()
        };

        assert_eq!(tag.get("title"), Some("First"));
        assert_eq!(tag.get(fields::ALBUM), None);
        assert_eq!(AudioTag::default().get(fields::TITLE), None);
    }

    #[test]
    fn durations() {
        let tag = AudioTag {
            streaminfo: Some(Streaminfo {
                minimum_block_size: 4096,
                maximum_block_size: 4096,
                minimum_frame_size: 0,
                maximum_frame_size: 0,
                sample_rate: 44100,
                channels: NonZero::new(2).unwrap(),
                bits_per_sample: 16,
                total_samples: 441_000,
                md5: None,
            }),
            file_level_metadata_length: 8_042,
            ..AudioTag::default()
        };

        assert_eq!(tag.seconds(), Some(10.0));
        assert_eq!(tag.duration(), Some(Duration::from_secs(10)));

        // 10 seconds of audio in (1_008_042 - 8_042) bytes
        assert_eq!(tag.guess_average_bitrate(1_008_042), Some(800_000));

        // unknown sample count means unknown duration and bitrate
        let mut tag = tag;
        tag.streaminfo.as_mut().unwrap().total_samples = 0;
        assert_eq!(tag.seconds(), None);
        assert_eq!(tag.guess_average_bitrate(1_008_042), None);
    }
}
