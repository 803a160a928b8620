//! Container signature sniffing.
//!
//! Synthesis backends sometimes label their output with a generic or plain
//! wrong media type, so the cascade trusts the bytes over the declaration.
//! Signatures are checked in a fixed order against the payload head.

/// A recognized container format: the media type it implies and the file
/// extension used to hint the demuxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerKind {
    pub media_type: &'static str,
    pub extension: &'static str,
}

const OGG: ContainerKind = ContainerKind {
    media_type: "audio/ogg",
    extension: "ogg",
};
const WAV: ContainerKind = ContainerKind {
    media_type: "audio/wav",
    extension: "wav",
};
const WEBM: ContainerKind = ContainerKind {
    media_type: "audio/webm",
    extension: "webm",
};
const MP4: ContainerKind = ContainerKind {
    media_type: "audio/mp4",
    extension: "m4a",
};
const MPEG: ContainerKind = ContainerKind {
    media_type: "audio/mpeg",
    extension: "mp3",
};
const FLAC: ContainerKind = ContainerKind {
    media_type: "audio/flac",
    extension: "flac",
};

/// Identify the container from the payload's leading bytes.
///
/// Payloads shorter than 12 bytes cannot carry any of these signatures and
/// sniff as `None`.
pub fn sniff_container(bytes: &[u8]) -> Option<ContainerKind> {
    if bytes.len() < 12 {
        return None;
    }

    if bytes.starts_with(b"OggS") {
        return Some(OGG);
    }
    if bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WAVE" {
        return Some(WAV);
    }
    // EBML header, as used by WebM/Matroska.
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(WEBM);
    }
    // ISO BMFF: the `ftyp` box name sits at offset 4.
    if &bytes[4..8] == b"ftyp" {
        return Some(MP4);
    }
    if bytes.starts_with(b"ID3") {
        return Some(MPEG);
    }
    // Raw MPEG audio frame sync: 11 set bits.
    if bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0 {
        return Some(MPEG);
    }
    if bytes.starts_with(b"fLaC") {
        return Some(FLAC);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(head: &[u8]) -> Vec<u8> {
        let mut v = head.to_vec();
        v.resize(16, 0);
        v
    }

    #[test]
    fn recognizes_common_signatures() {
        assert_eq!(sniff_container(&padded(b"OggS")), Some(OGG));
        assert_eq!(sniff_container(&padded(b"RIFF\x00\x00\x00\x00WAVE")), Some(WAV));
        assert_eq!(sniff_container(&padded(&[0x1A, 0x45, 0xDF, 0xA3])), Some(WEBM));
        assert_eq!(sniff_container(&padded(b"\x00\x00\x00\x20ftypM4A ")), Some(MP4));
        assert_eq!(sniff_container(&padded(b"ID3\x04")), Some(MPEG));
        assert_eq!(sniff_container(&padded(b"fLaC")), Some(FLAC));
    }

    #[test]
    fn mpeg_frame_sync_requires_masked_second_byte() {
        assert_eq!(sniff_container(&padded(&[0xFF, 0xFB, 0x90])), Some(MPEG));
        assert_eq!(sniff_container(&padded(&[0xFF, 0x1B, 0x90])), None);
    }

    #[test]
    fn riff_without_wave_is_not_wav() {
        assert_eq!(sniff_container(&padded(b"RIFF\x00\x00\x00\x00AVI ")), None);
    }

    #[test]
    fn short_payloads_sniff_as_none() {
        assert_eq!(sniff_container(b"OggS\x00\x02"), None);
    }
}
