//! Rewriting a FLAC file's metadata
//!
//! A write is a whole-file rewrite: every metadata block is
//! re-parsed from the source, the requested operations are applied
//! to the block list, and the result is serialized to a temporary
//! file in the destination's directory followed by a byte-for-byte
//! copy of the audio frames.  The temporary file is then renamed
//! over the destination, so a failed or interrupted write never
//! leaves a partially written file behind.

use crate::Error;
use crate::metadata::{Block, BlockHeader, BlockType, FLAC_TAG, VorbisComment, parse_block};
use crate::tag::Metadata;
use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// A transformation to apply to a file's metadata
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum WriteOperation {
    /// Replaces the file's entire set of textual metadata
    ///
    /// An existing comment block keeps its vendor string; a file
    /// without one gets a fresh block appended after all other
    /// blocks.  An empty set removes the comment block entirely.
    /// Entries without a usable field name are skipped.
    ///
    /// When several of these are applied, the last one wins.
    AllMetadata(Vec<Metadata>),
}

/// Applies write operations to the FLAC file at `src`,
/// writing the result to `dst`
///
/// `src` and `dst` may be the same path.  All blocks other than
/// the comment block are preserved, byte-for-byte for the opaque
/// types.
///
/// # Errors
///
/// Returns an error if `src` is not a well-formed FLAC file or
/// any I/O fails; `dst` is left untouched on error.
pub fn write_flac(src: &Path, dst: &Path, operations: &[WriteOperation]) -> Result<(), Error> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut blocks = read_blocks(&mut reader)?;

    for operation in operations {
        apply_operation(&mut blocks, operation);
    }

    // colocated with the destination so the final rename
    // stays on one filesystem
    let temp = NamedTempFile::new_in(
        dst.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new(".")),
    )?;

    let mut output = BufWriter::new(temp);
    output.write_all(FLAC_TAG)?;

    let mut w = BitWriter::endian(&mut output, BigEndian);
    let mut blocks = blocks.iter().peekable();
    while let Some(block) = blocks.next() {
        w.build_using(block, blocks.peek().is_none())?;
    }
    drop(w);

    // the audio frames, untouched
    std::io::copy(&mut reader, &mut output)?;

    output
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?
        .persist(dst)
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Parses the file's whole metadata block list,
/// leaving the reader positioned at the first audio frame
fn read_blocks<R: Read>(reader: &mut R) -> Result<Vec<Block>, Error> {
    let mut tag = [0; 4];
    reader.read_exact(&mut tag)?;
    if &tag != FLAC_TAG {
        return Err(Error::MissingFlacTag);
    }

    let mut blocks = Vec::new();
    loop {
        let header: BlockHeader = BitReader::endian(&mut *reader, BigEndian).parse()?;

        match (blocks.is_empty(), header.block_type == BlockType::Streaminfo) {
            (true, false) => return Err(Error::MissingStreaminfo),
            (false, true) => return Err(Error::MultipleStreaminfo),
            _ => {}
        }

        if header.block_type == BlockType::VorbisComment
            && blocks.iter().any(|b| matches!(b, Block::VorbisComment(_)))
        {
            return Err(Error::MultipleVorbisComment);
        }

        blocks.push(parse_block(reader, &header)?);

        if header.last {
            break;
        }
    }
    Ok(blocks)
}

fn apply_operation(blocks: &mut Vec<Block>, operation: &WriteOperation) {
    match operation {
        WriteOperation::AllMetadata(metadatas) => {
            let fields = metadatas
                .iter()
                .filter_map(|metadata| {
                    let metadata = Metadata::new(&metadata.key, &metadata.value);
                    if metadata.is_valid() {
                        Some(metadata.to_user_comment())
                    } else {
                        warn!("skipping metadata entry with empty field name");
                        None
                    }
                })
                .collect::<Vec<_>>();

            let position = blocks
                .iter()
                .position(|block| matches!(block, Block::VorbisComment(_)));

            match (position, fields.is_empty()) {
                (Some(position), true) => {
                    debug!("removing VORBIS_COMMENT block");
                    blocks.remove(position);
                }
                (Some(position), false) => {
                    if let Block::VorbisComment(comment) = &mut blocks[position] {
                        comment.fields = fields;
                    }
                }
                (None, true) => { /* nothing to remove */ }
                (None, false) => {
                    debug!("appending fresh VORBIS_COMMENT block");
                    blocks.push(Block::VorbisComment(VorbisComment {
                        fields,
                        ..VorbisComment::default()
                    }));
                }
            }
        }
    }
}
