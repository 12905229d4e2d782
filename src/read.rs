//! Strategy-driven reading of FLAC metadata
//!
//! A read makes a single forward pass over the metadata block
//! section.  The [`ReadStrategy`] decides which blocks are
//! materialized; everything else is skipped without parsing, so
//! reading only the stream info of a file with megabytes of
//! embedded cover art touches almost none of it.

use crate::Error;
use crate::metadata::{
    Block, BlockHeader, BlockType, FLAC_TAG, Picture, PictureData, PictureLocation, PictureType,
    parse_block,
};
use crate::tag::{AudioTag, Metadata};
use bitstream_io::{BigEndian, BitRead, BitReader};
use log::{debug, warn};
use std::io::Read;

/// Which parts of a file a read should materialize
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReadStrategy {
    /// Whether to populate [`AudioTag::streaminfo`]
    pub streaminfo: bool,
    /// Whether to populate [`AudioTag::metadatas`]
    pub metadatas: bool,
    /// Which pictures to populate [`AudioTag::pictures`] with
    pub pictures: PictureMode,
    /// Whether wanted pictures get their binary data read
    /// eagerly, or recorded as a stream location for a later
    /// [`Picture::load_data`] call
    pub load_picture_data: bool,
}

impl ReadStrategy {
    /// Reads everything, with picture data loaded eagerly
    pub const ALL: Self = Self {
        streaminfo: true,
        metadatas: true,
        pictures: PictureMode::All,
        load_picture_data: true,
    };

    /// Reads everything except pictures
    pub const IGNORE_PICTURES: Self = Self {
        streaminfo: true,
        metadatas: true,
        pictures: PictureMode::None,
        load_picture_data: false,
    };

    /// Reads only pictures, with their data loaded eagerly
    pub const ONLY_PICTURES: Self = Self {
        streaminfo: false,
        metadatas: false,
        pictures: PictureMode::All,
        load_picture_data: true,
    };
}

impl Default for ReadStrategy {
    fn default() -> Self {
        Self::ALL
    }
}

/// Which PICTURE blocks a read should materialize
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PictureMode {
    /// No pictures at all
    None,
    /// Every picture in the file
    All,
    /// At most one picture, the best cover-art candidate
    ///
    /// Candidates are ranked by [`PictureType::cover_priority`];
    /// a later picture replaces an earlier one only when its
    /// priority is strictly greater, so among pictures of equal
    /// rank the first in the file wins.
    SmartFrontCover,
    /// Pictures whose type the given predicate accepts
    ///
    /// Only the picture's type is read before consulting the
    /// predicate, so rejected pictures cost almost nothing.
    Custom(fn(PictureType) -> bool),
}

/// A reader which counts the bytes consumed through it
///
/// The sole source of stream offsets during a scan; every block
/// must advance it by exactly the size its header promised.
struct Counter<R> {
    reader: R,
    count: u64,
}

impl<R: Read> Read for Counter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf).inspect(|amt_read| {
            self.count += *amt_read as u64;
        })
    }
}

fn skip_bytes<R: Read>(reader: &mut R, bytes: u64) -> Result<(), Error> {
    match std::io::copy(&mut reader.by_ref().take(bytes), &mut std::io::sink())? {
        amt if amt == bytes => Ok(()),
        _ => Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into())),
    }
}

/// Reads a FLAC file's metadata per the given strategy
///
/// The reader must be positioned at the start of the file
/// and is left positioned at the first audio frame.
///
/// # Errors
///
/// Returns an error if the stream is not a FLAC file, any block
/// violates the format, or the underlying stream fails.
pub fn read_flac<R: Read>(reader: R, strategy: &ReadStrategy) -> Result<AudioTag, Error> {
    let mut counter = Counter { reader, count: 0 };

    let mut tag = [0; 4];
    counter.read_exact(&mut tag)?;
    if &tag != FLAC_TAG {
        return Err(Error::MissingFlacTag);
    }

    let mut streaminfo = None;
    let mut metadatas = strategy.metadatas.then(Vec::new);
    let mut pictures = (strategy.pictures != PictureMode::None).then(Vec::new);
    let mut best_cover: Option<Picture> = None;
    let mut seen_streaminfo = false;
    let mut seen_vorbis_comment = false;

    loop {
        let header: BlockHeader = BitReader::endian(&mut counter, BigEndian).parse()?;
        let block_start = counter.count;

        if !seen_streaminfo && header.block_type != BlockType::Streaminfo {
            return Err(Error::MissingStreaminfo);
        }

        match header.block_type {
            BlockType::Streaminfo if seen_streaminfo => return Err(Error::MultipleStreaminfo),
            BlockType::Streaminfo => {
                seen_streaminfo = true;
                if strategy.streaminfo {
                    if let Block::Streaminfo(info) = parse_block(&mut counter, &header)? {
                        streaminfo = Some(info);
                    }
                } else {
                    debug!("skipping {} block", header.block_type);
                    skip_bytes(&mut counter, header.size.get().into())?;
                }
            }
            BlockType::VorbisComment if seen_vorbis_comment => {
                return Err(Error::MultipleVorbisComment);
            }
            BlockType::VorbisComment => {
                seen_vorbis_comment = true;
                match metadatas.as_mut() {
                    Some(metadatas) => {
                        if let Block::VorbisComment(comment) = parse_block(&mut counter, &header)? {
                            metadatas.extend(comment.fields.iter().filter_map(|field| {
                                let metadata = Metadata::from_user_comment(field);
                                if metadata.is_none() {
                                    warn!("skipping malformed user comment {field:?}");
                                }
                                metadata
                            }));
                        }
                    }
                    None => {
                        debug!("skipping {} block", header.block_type);
                        skip_bytes(&mut counter, header.size.get().into())?;
                    }
                }
            }
            BlockType::Picture => match strategy.pictures {
                PictureMode::None => {
                    debug!("skipping {} block", header.block_type);
                    skip_bytes(&mut counter, header.size.get().into())?;
                }
                mode => {
                    let picture_type: PictureType =
                        BitReader::endian(&mut counter, BigEndian).parse()?;

                    let wanted = match mode {
                        PictureMode::All => true,
                        PictureMode::SmartFrontCover => best_cover.as_ref().is_none_or(|best| {
                            picture_type.cover_priority() > best.picture_type.cover_priority()
                        }),
                        PictureMode::Custom(accept) => accept(picture_type),
                        PictureMode::None => unreachable!(),
                    };

                    if wanted {
                        let picture = read_picture_fields(
                            &mut counter,
                            picture_type,
                            strategy.load_picture_data,
                        )?;
                        match mode {
                            PictureMode::SmartFrontCover => best_cover = Some(picture),
                            _ => {
                                if let Some(pictures) = pictures.as_mut() {
                                    pictures.push(picture);
                                }
                            }
                        }
                    } else {
                        debug!("skipping {picture_type} picture");
                        skip_bytes(
                            &mut counter,
                            u64::from(header.size.get())
                                .checked_sub(4)
                                .ok_or(Error::InvalidMetadataBlockSize)?,
                        )?;
                    }
                }
            },
            BlockType::Invalid => return Err(Error::InvalidMetadataBlock),
            block_type => {
                debug!("skipping {block_type} block");
                skip_bytes(&mut counter, header.size.get().into())?;
            }
        }

        if counter.count - block_start != u64::from(header.size.get()) {
            return Err(Error::InvalidMetadataBlockSize);
        }

        if header.last {
            break;
        }
    }

    if let (Some(pictures), Some(best)) = (pictures.as_mut(), best_cover) {
        pictures.push(best);
    }

    Ok(AudioTag {
        streaminfo,
        metadatas,
        pictures,
        file_level_metadata_length: counter.count,
    })
}

/// Reads a PICTURE block's remaining fields, the type having
/// already been consumed, loading or deferring its binary data
fn read_picture_fields<R: Read>(
    counter: &mut Counter<R>,
    picture_type: PictureType,
    load_data: bool,
) -> Result<Picture, Error> {
    let mut r = BitReader::endian(&mut *counter, BigEndian);

    fn prefixed_string<R: Read>(r: &mut BitReader<R, BigEndian>) -> Result<String, Error> {
        let size = r.read_to::<u32>()?;
        Ok(String::from_utf8(r.read_to_vec(size.try_into().unwrap())?)?)
    }

    let media_type = prefixed_string(&mut r)?;
    let description = prefixed_string(&mut r)?;
    let width = r.read_to()?;
    let height = r.read_to()?;
    let color_depth = r.read_to()?;
    let colors_number = r.read_to()?;
    let data_length = r.read_to::<u32>()?;
    drop(r);

    // all fields so far are whole bytes, so the count is exact
    let offset = counter.count;

    let data = if load_data {
        let mut data = vec![0; data_length.try_into().unwrap()];
        counter.read_exact(&mut data)?;
        PictureData::Loaded(data)
    } else {
        skip_bytes(counter, data_length.into())?;
        PictureData::Deferred(PictureLocation {
            offset,
            length: data_length,
        })
    };

    Ok(Picture {
        picture_type,
        media_type,
        description,
        width,
        height,
        color_depth,
        colors_number,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Padding, Streaminfo, VorbisComment};
    use bitstream_io::{BitWrite, BitWriter};
    use std::io::Cursor;
    use std::num::NonZero;

    fn test_streaminfo() -> Streaminfo {
        Streaminfo {
            minimum_block_size: 4096,
            maximum_block_size: 4096,
            minimum_frame_size: 0,
            maximum_frame_size: 0,
            sample_rate: 44100,
            channels: NonZero::new(2).unwrap(),
            bits_per_sample: 16,
            total_samples: 441_000,
            md5: None,
        }
    }

    fn test_picture(picture_type: PictureType, data: &[u8]) -> Picture {
        Picture {
            picture_type,
            media_type: "image/png".to_owned(),
            description: String::new(),
            width: 0,
            height: 0,
            color_depth: 0,
            colors_number: 0,
            data: PictureData::Loaded(data.to_vec()),
        }
    }

    const FRAMES: &[u8] = b"not really audio frames";

    fn flac_file(blocks: &[Block]) -> Vec<u8> {
        let mut file = FLAC_TAG.to_vec();

        let mut w = BitWriter::endian(&mut file, BigEndian);
        let mut blocks = blocks.iter().peekable();
        while let Some(block) = blocks.next() {
            w.build_using(block, blocks.peek().is_none()).unwrap();
        }
        drop(w);

        file.extend_from_slice(FRAMES);
        file
    }

    #[test]
    fn read_everything() {
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::VorbisComment(VorbisComment {
                vendor_string: "test".to_owned(),
                fields: vec![
                    "TITLE=Test Track".to_owned(),
                    "broken comment".to_owned(),
                    "artist=Some Band".to_owned(),
                ],
            }),
            Block::Padding(Padding { size: 64u8.into() }),
        ]);

        let tag = read_flac(file.as_slice(), &ReadStrategy::ALL).unwrap();
        assert_eq!(tag.streaminfo, Some(test_streaminfo()));
        assert_eq!(
            tag.metadatas,
            Some(vec![
                Metadata::new("TITLE", "Test Track"),
                Metadata::new("ARTIST", "Some Band"),
            ]),
        );
        assert_eq!(tag.pictures, Some(vec![]));
        assert_eq!(
            tag.file_level_metadata_length,
            (file.len() - FRAMES.len()) as u64,
        );
    }

    #[test]
    fn ignore_pictures() {
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::Picture(test_picture(PictureType::FrontCover, &[1, 2, 3])),
        ]);

        let tag = read_flac(file.as_slice(), &ReadStrategy::IGNORE_PICTURES).unwrap();
        assert_eq!(tag.streaminfo, Some(test_streaminfo()));
        assert_eq!(tag.metadatas, Some(vec![]));
        assert_eq!(tag.pictures, None);
    }

    #[test]
    fn only_pictures() {
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::Picture(test_picture(PictureType::FrontCover, &[1, 2, 3])),
        ]);

        let tag = read_flac(file.as_slice(), &ReadStrategy::ONLY_PICTURES).unwrap();
        assert_eq!(tag.streaminfo, None);
        assert_eq!(tag.metadatas, None);
        assert_eq!(
            tag.pictures,
            Some(vec![test_picture(PictureType::FrontCover, &[1, 2, 3])]),
        );
    }

    #[test]
    fn deferred_picture_data() {
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::Picture(test_picture(PictureType::FrontCover, &[9, 8, 7, 6])),
        ]);

        let strategy = ReadStrategy {
            load_picture_data: false,
            ..ReadStrategy::ONLY_PICTURES
        };

        let tag = read_flac(file.as_slice(), &strategy).unwrap();
        let picture = &tag.pictures.as_ref().unwrap()[0];
        assert!(!picture.is_loaded());
        assert_eq!(picture.data(), None);

        let location = picture.location().unwrap();
        assert_eq!(location.length, 4);
        assert_eq!(
            &file[location.offset as usize..][..location.length as usize],
            &[9, 8, 7, 6],
        );

        // fetching on demand pulls the same bytes
        assert_eq!(picture.load_data(Cursor::new(&file)).unwrap(), [9, 8, 7, 6]);
    }

    #[test]
    fn smart_front_cover() {
        let strategy = ReadStrategy {
            pictures: PictureMode::SmartFrontCover,
            ..ReadStrategy::ALL
        };

        // the front cover beats everything regardless of position
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::Picture(test_picture(PictureType::Artist, b"artist")),
            Block::Picture(test_picture(PictureType::BackCover, b"back")),
            Block::Picture(test_picture(PictureType::FrontCover, b"front")),
        ]);
        let tag = read_flac(file.as_slice(), &strategy).unwrap();
        assert_eq!(
            tag.pictures,
            Some(vec![test_picture(PictureType::FrontCover, b"front")]),
        );

        // without a front cover, the back cover is next best
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::Picture(test_picture(PictureType::Artist, b"artist")),
            Block::Picture(test_picture(PictureType::BackCover, b"back")),
        ]);
        let tag = read_flac(file.as_slice(), &strategy).unwrap();
        assert_eq!(
            tag.pictures,
            Some(vec![test_picture(PictureType::BackCover, b"back")]),
        );

        // anything is better than nothing
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::Picture(test_picture(PictureType::Artist, b"artist")),
        ]);
        let tag = read_flac(file.as_slice(), &strategy).unwrap();
        assert_eq!(
            tag.pictures,
            Some(vec![test_picture(PictureType::Artist, b"artist")]),
        );

        // among equals, the first in the file wins
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::Picture(test_picture(PictureType::FrontCover, b"first")),
            Block::Picture(test_picture(PictureType::FrontCover, b"second")),
        ]);
        let tag = read_flac(file.as_slice(), &strategy).unwrap();
        assert_eq!(
            tag.pictures,
            Some(vec![test_picture(PictureType::FrontCover, b"first")]),
        );

        // no pictures at all is not an error
        let file = flac_file(&[Block::Streaminfo(test_streaminfo())]);
        let tag = read_flac(file.as_slice(), &strategy).unwrap();
        assert_eq!(tag.pictures, Some(vec![]));
    }

    #[test]
    fn custom_picture_filter() {
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::Picture(test_picture(PictureType::FrontCover, b"front")),
            Block::Picture(test_picture(PictureType::MediaLabel, b"label")),
        ]);

        let strategy = ReadStrategy {
            pictures: PictureMode::Custom(|t| t == PictureType::MediaLabel),
            ..ReadStrategy::ALL
        };

        let tag = read_flac(file.as_slice(), &strategy).unwrap();
        assert_eq!(
            tag.pictures,
            Some(vec![test_picture(PictureType::MediaLabel, b"label")]),
        );
    }

    #[test]
    fn missing_flac_tag() {
        assert!(matches!(
            read_flac(&b"RIFF...."[..], &ReadStrategy::ALL),
            Err(Error::MissingFlacTag),
        ));
    }

    #[test]
    fn streaminfo_must_be_first() {
        let mut file = FLAC_TAG.to_vec();
        let mut w = BitWriter::endian(&mut file, BigEndian);
        w.build_using(&Block::Padding(Padding { size: 16u8.into() }), true)
            .unwrap();
        drop(w);

        assert!(matches!(
            read_flac(file.as_slice(), &ReadStrategy::ALL),
            Err(Error::MissingStreaminfo),
        ));
    }

    #[test]
    fn streaminfo_must_be_unique() {
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::Streaminfo(test_streaminfo()),
        ]);

        assert!(matches!(
            read_flac(file.as_slice(), &ReadStrategy::ALL),
            Err(Error::MultipleStreaminfo),
        ));
    }

    #[test]
    fn vorbis_comment_must_be_unique() {
        let file = flac_file(&[
            Block::Streaminfo(test_streaminfo()),
            Block::VorbisComment(VorbisComment::default()),
            Block::VorbisComment(VorbisComment::default()),
        ]);

        // even when comments are not requested
        let strategy = ReadStrategy {
            metadatas: false,
            ..ReadStrategy::ALL
        };

        assert!(matches!(
            read_flac(file.as_slice(), &strategy),
            Err(Error::MultipleVorbisComment),
        ));
    }

    #[test]
    fn block_must_fill_its_header_size() {
        let mut file = flac_file(&[Block::Streaminfo(test_streaminfo())]);

        // clear the last flag on the streaminfo header
        file[4] &= 0b0111_1111;
        let frames_at = file.len() - FRAMES.len();

        // a comment block whose header promises one byte too many
        let mut w = BitWriter::endian(Vec::new(), BigEndian);
        w.build(&VorbisComment {
            vendor_string: "v".to_owned(),
            fields: vec![],
        })
        .unwrap();
        let body = w.into_writer();

        let mut block = Vec::new();
        let mut w = BitWriter::endian(&mut block, BigEndian);
        w.build(&BlockHeader {
            last: true,
            block_type: BlockType::VorbisComment,
            size: ((body.len() + 1) as u16).into(),
        })
        .unwrap();
        drop(w);
        block.extend_from_slice(&body);
        block.push(0);

        file.splice(frames_at..frames_at, block);

        assert!(matches!(
            read_flac(file.as_slice(), &ReadStrategy::ALL),
            Err(Error::InvalidMetadataBlockSize),
        ));
    }
}
