//! Mono 16-bit PCM WAV reading and writing.
//!
//! Only the `fmt ` and `data` chunks are interpreted; any other chunk is
//! skipped. Compressed formats, other bit depths and multi-channel files are
//! rejected.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

const FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const STREAMING_DATA_SIZE: u32 = u32::MAX;

/// Errors from reading or writing WAV files.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed WAV file: {0}")]
    Format(&'static str),

    #[error("unsupported WAV format: tag={format_tag}, channels={channels}, bits={bits_per_sample} (only mono 16-bit PCM)")]
    Unsupported {
        format_tag: u16,
        channels: u16,
        bits_per_sample: u16,
    },
}

/// A decoded mono 16-bit WAV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavAudio {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

struct FmtChunk {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Reads a mono 16-bit PCM WAV file.
pub fn read_wav(path: impl AsRef<Path>) -> Result<WavAudio, AudioError> {
    let file = File::open(path)?;
    decode(&mut BufReader::new(file))
}

/// Writes `samples` as a mono 16-bit PCM WAV file.
pub fn write_wav(path: impl AsRef<Path>, sample_rate: u32, samples: &[i16]) -> Result<(), AudioError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode(&mut writer, sample_rate, samples)?;
    writer.flush()?;
    Ok(())
}

pub(crate) fn decode<R: Read + Seek>(reader: &mut R) -> Result<WavAudio, AudioError> {
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag)?;
    if &tag != b"RIFF" {
        return Err(AudioError::Format("not a RIFF file"));
    }
    reader.read_u32::<LittleEndian>()?; // file size - 8
    reader.read_exact(&mut tag)?;
    if &tag != b"WAVE" {
        return Err(AudioError::Format("not a WAVE file"));
    }

    let mut fmt: Option<FmtChunk> = None;
    loop {
        if let Err(e) = reader.read_exact(&mut tag) {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Err(AudioError::Format("no data chunk found"));
            }
            return Err(e.into());
        }
        let chunk_size = reader.read_u32::<LittleEndian>()?;

        match &tag {
            b"fmt " => {
                if chunk_size < 16 {
                    return Err(AudioError::Format("fmt chunk too short"));
                }
                let format_tag = reader.read_u16::<LittleEndian>()?;
                let channels = reader.read_u16::<LittleEndian>()?;
                let sample_rate = reader.read_u32::<LittleEndian>()?;
                reader.read_u32::<LittleEndian>()?; // byte rate
                reader.read_u16::<LittleEndian>()?; // block align
                let bits_per_sample = reader.read_u16::<LittleEndian>()?;
                skip(reader, chunk_size - 16)?;
                fmt = Some(FmtChunk {
                    format_tag,
                    channels,
                    sample_rate,
                    bits_per_sample,
                });
            }
            b"data" => {
                let fmt = fmt.ok_or(AudioError::Format("data chunk before fmt chunk"))?;
                if fmt.format_tag != FORMAT_PCM
                    || fmt.channels != 1
                    || fmt.bits_per_sample != BITS_PER_SAMPLE
                {
                    return Err(AudioError::Unsupported {
                        format_tag: fmt.format_tag,
                        channels: fmt.channels,
                        bits_per_sample: fmt.bits_per_sample,
                    });
                }
                // Streaming writers leave the size at 0xFFFFFFFF and truncated files
                // hold less than declared; take what is actually there.
                let mut bytes = Vec::new();
                Read::take(&mut *reader, chunk_size as u64).read_to_end(&mut bytes)?;
                if bytes.len() < chunk_size as usize {
                    if chunk_size != STREAMING_DATA_SIZE {
                        tracing::warn!(
                            declared = chunk_size,
                            present = bytes.len(),
                            "data chunk is shorter than declared"
                        );
                    }
                    if bytes.len() < 2 && chunk_size >= 2 {
                        return Err(AudioError::Format("data chunk holds no complete sample"));
                    }
                }
                let mut samples = vec![0i16; bytes.len() / 2];
                LittleEndian::read_i16_into(&bytes[..samples.len() * 2], &mut samples);
                return Ok(WavAudio {
                    sample_rate: fmt.sample_rate,
                    samples,
                });
            }
            _ => skip(reader, chunk_size)?,
        }
    }
}

pub(crate) fn encode<W: Write>(writer: &mut W, sample_rate: u32, samples: &[i16]) -> Result<(), AudioError> {
    let data_len = u32::try_from(samples.len() * 2)
        .ok()
        .filter(|len| *len <= u32::MAX - 36)
        .ok_or(AudioError::Format("too many samples for a WAV file"))?;
    let block_align = BITS_PER_SAMPLE / 8;

    writer.write_all(b"RIFF")?;
    writer.write_u32::<LittleEndian>(36 + data_len)?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_u32::<LittleEndian>(16)?;
    writer.write_u16::<LittleEndian>(FORMAT_PCM)?;
    writer.write_u16::<LittleEndian>(1)?;
    writer.write_u32::<LittleEndian>(sample_rate)?;
    writer.write_u32::<LittleEndian>(sample_rate * block_align as u32)?;
    writer.write_u16::<LittleEndian>(block_align)?;
    writer.write_u16::<LittleEndian>(BITS_PER_SAMPLE)?;

    writer.write_all(b"data")?;
    writer.write_u32::<LittleEndian>(data_len)?;
    for &s in samples {
        writer.write_i16::<LittleEndian>(s)?;
    }
    Ok(())
}

fn skip<R: Seek>(reader: &mut R, len: u32) -> io::Result<()> {
    // Chunks are word aligned.
    let padded = len as i64 + (len & 1) as i64;
    reader.seek(SeekFrom::Current(padded))?;
    Ok(())
}
