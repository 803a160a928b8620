//! The cascading decode engine.
//!
//! Encoded payloads arrive with an unreliable (often absent) media type, so
//! interpretation proceeds through an ordered cascade of strategies. Each
//! strategy inspects the payload and either declines (`Skip`, next strategy
//! runs), produces samples (`Decoded`, cascade stops), or fails terminally
//! (`Failed`, cascade stops: the strategy claimed the payload and could not
//! decode it). Raw-PCM interpretations are terminal: a payload that declares
//! or resembles PCM never falls through to container probing, because PCM
//! bytes reinterpreted as a container produce garbage rather than an error.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::pcm;
use crate::sniff::{self, ContainerKind};

// ── Decoded samples ────────────────────────────────────────────────

/// Interleaved f32 samples ready for the audio output.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Total duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.channels) / f64::from(self.sample_rate)
    }
}

// ── Strategy contract ──────────────────────────────────────────────

/// Outcome of one strategy's look at the payload.
#[derive(Debug)]
pub enum Attempt {
    /// Not applicable; the cascade moves on.
    Skip,
    /// Samples produced; the cascade stops here.
    Decoded(DecodedAudio),
    /// The strategy claimed the payload and failed; the cascade aborts.
    Failed(DecodeError),
}

/// One interpretation of the payload bytes.
pub trait DecodeStrategy: Send + Sync {
    /// Stable name, used in logs and surfaced by the cascade on success.
    fn name(&self) -> &'static str;

    fn attempt(&self, bytes: &[u8], mime_hint: Option<&str>) -> Attempt;
}

fn terminal(result: Result<DecodedAudio, DecodeError>) -> Attempt {
    match result {
        Ok(audio) => Attempt::Decoded(audio),
        Err(e) => Attempt::Failed(e),
    }
}

// ── Strategies, in cascade order ───────────────────────────────────

/// The producer declared linear PCM; trust it and decode directly.
struct HintedPcm;

impl DecodeStrategy for HintedPcm {
    fn name(&self) -> &'static str {
        "pcm-hint"
    }

    fn attempt(&self, bytes: &[u8], mime_hint: Option<&str>) -> Attempt {
        match mime_hint {
            Some(mime) if pcm::hint_is_linear_pcm(mime) => terminal(pcm::decode_l16(bytes)),
            _ => Attempt::Skip,
        }
    }
}

/// Leading bytes look like raw PCM samples rather than any container.
struct PcmMagic;

impl DecodeStrategy for PcmMagic {
    fn name(&self) -> &'static str {
        "pcm-magic"
    }

    fn attempt(&self, bytes: &[u8], _mime_hint: Option<&str>) -> Attempt {
        if pcm::looks_like_raw_pcm(bytes) {
            terminal(pcm::decode_l16(bytes))
        } else {
            Attempt::Skip
        }
    }
}

/// A container signature matched; demux with that hint. A signature can lie
/// (truncated or corrupt payload), so failure here falls through rather than
/// aborting the cascade.
struct ContainerSignature;

impl DecodeStrategy for ContainerSignature {
    fn name(&self) -> &'static str {
        "container-signature"
    }

    fn attempt(&self, bytes: &[u8], _mime_hint: Option<&str>) -> Attempt {
        let Some(kind) = sniff::sniff_container(bytes) else {
            return Attempt::Skip;
        };
        debug!(media_type = kind.media_type, "container signature matched");
        match decode_container(bytes, Some(kind)) {
            Ok(audio) => Attempt::Decoded(audio),
            Err(e) => {
                warn!(media_type = kind.media_type, error = %e, "signature matched but decode failed");
                Attempt::Skip
            }
        }
    }
}

/// Hintless probe: let the demuxer identify the format itself.
struct GenericProbe;

impl DecodeStrategy for GenericProbe {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn attempt(&self, bytes: &[u8], _mime_hint: Option<&str>) -> Attempt {
        match decode_container(bytes, None) {
            Ok(audio) => Attempt::Decoded(audio),
            Err(e) => {
                debug!(error = %e, "generic probe failed");
                Attempt::Skip
            }
        }
    }
}

/// Last resort: assume headerless PCM regardless of appearance.
struct PcmFallback;

impl DecodeStrategy for PcmFallback {
    fn name(&self) -> &'static str {
        "pcm-fallback"
    }

    fn attempt(&self, bytes: &[u8], _mime_hint: Option<&str>) -> Attempt {
        terminal(pcm::decode_l16(bytes))
    }
}

// ── Cascade ────────────────────────────────────────────────────────

/// Ordered strategy cascade over a payload.
pub struct DecodeCascade {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl Default for DecodeCascade {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(HintedPcm),
                Box::new(PcmMagic),
                Box::new(ContainerSignature),
                Box::new(GenericProbe),
                Box::new(PcmFallback),
            ],
        }
    }
}

impl DecodeCascade {
    /// Run the cascade; on success also report which strategy produced the
    /// samples.
    pub fn decode(
        &self,
        bytes: &[u8],
        mime_hint: Option<&str>,
    ) -> Result<(DecodedAudio, &'static str), DecodeError> {
        for strategy in &self.strategies {
            match strategy.attempt(bytes, mime_hint) {
                Attempt::Skip => {
                    debug!(strategy = strategy.name(), "strategy declined payload");
                }
                Attempt::Decoded(audio) => {
                    debug!(
                        strategy = strategy.name(),
                        samples = audio.samples.len(),
                        channels = audio.channels,
                        sample_rate = audio.sample_rate,
                        "decode succeeded"
                    );
                    return Ok((audio, strategy.name()));
                }
                Attempt::Failed(e) => return Err(e),
            }
        }
        Err(DecodeError::Exhausted)
    }
}

// ── Container decoding ─────────────────────────────────────────────

/// Demux and decode a containerized payload into interleaved f32 samples.
fn decode_container(bytes: &[u8], kind: Option<ContainerKind>) -> Result<DecodedAudio, DecodeError> {
    let source = MediaSourceStream::new(
        Box::new(Cursor::new(bytes.to_vec())),
        MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    if let Some(kind) = kind {
        hint.with_extension(kind.extension);
        hint.mime_type(kind.media_type);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Probe(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channels: u16 = 0;
    let mut sample_rate: u32 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of the in-memory payload.
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = u16::try_from(spec.channels.count()).unwrap_or(u16::MAX);
                sample_rate = spec.rate;
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // A corrupt packet; skip it and keep going.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "skipping undecodable packet");
            }
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        }
    }

    if samples.is_empty() {
        return Err(DecodeError::Codec("no audio frames decoded".to_owned()));
    }
    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

// ── Payload scrubbing ──────────────────────────────────────────────

/// Decode a possibly ragged base64 payload into bytes.
///
/// Characters outside the standard alphabet are stripped and the remainder is
/// padded to a multiple of four before decoding, so whitespace or transport
/// artifacts in the payload do not fail the whole request.
pub fn decode_base64_payload(raw: &str) -> Result<Vec<u8>, DecodeError> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    if raw.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }

    let mut clean: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect();
    let remainder = clean.len() % 4;
    if remainder != 0 {
        warn!(len = clean.len(), "base64 payload length not a multiple of 4, padding");
        clean.extend(std::iter::repeat('=').take(4 - remainder));
    }

    let bytes = STANDARD
        .decode(clean.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    Ok(bytes)
}
