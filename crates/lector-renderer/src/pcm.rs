//! Raw linear PCM interpretation.
//!
//! Speech synthesis backends frequently return headerless 16-bit little-endian
//! mono PCM at 24 kHz, either declared via a `audio/L16;codec=pcm` media type
//! or recognizable by its leading sample bytes. This module is the terminal
//! interpretation the decode cascade falls back to when no container format
//! matches.

use crate::decode::DecodedAudio;
use crate::error::DecodeError;

/// Sample rate assumed for headerless PCM payloads.
pub const PCM_SAMPLE_RATE: u32 = 24_000;

/// Whether a producer-declared media type announces raw linear PCM.
pub fn hint_is_linear_pcm(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.contains("l16") && mime.contains("pcm")
}

/// Whether the leading bytes look like raw PCM rather than any container.
///
/// Loud 16-bit LE speech samples start near the signed extremes, so the
/// second byte of the first sample is `0xFF` and the first is high. No audio
/// container signature begins with these pairs.
pub fn looks_like_raw_pcm(bytes: &[u8]) -> bool {
    matches!(bytes, [0xEE, 0xFF, ..] | [0xFF, 0xFF, ..])
}

/// Interpret the payload as headerless mono 16-bit LE PCM at 24 kHz.
///
/// A trailing odd byte is ignored rather than rejected.
pub fn decode_l16(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    if bytes.len() < 2 {
        return Err(DecodeError::PcmTooShort);
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();
    Ok(DecodedAudio {
        samples,
        channels: 1,
        sample_rate: PCM_SAMPLE_RATE,
    })
}
