//! In-memory decoding of audio files into planar PCM.

use std::io::Cursor;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{PlayerError, Result};

/// Immutable decoded PCM data. Replaced wholesale on every load.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl DecodedAudio {
    /// Builds a buffer from planar channel data. All channels must share a
    /// length and at least one frame must be present.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PlayerError::InvalidInput("sample rate must be positive"));
        }
        let frames = channels.first().map(Vec::len).unwrap_or(0);
        if frames == 0 {
            return Err(PlayerError::InvalidInput("audio must contain at least one frame"));
        }
        if channels.iter().any(|channel| channel.len() != frames) {
            return Err(PlayerError::InvalidInput("channels differ in length"));
        }

        Ok(Self {
            channels,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Mono mix of the frame at `index`, or silence past the end.
    pub fn mono_sample(&self, index: usize) -> f32 {
        if index >= self.frames() {
            return 0.0;
        }
        let sum: f32 = self.channels.iter().map(|channel| channel[index]).sum();
        sum / self.channels.len() as f32
    }
}

/// Decodes a complete audio file held in memory.
///
/// `extension` is an optional container hint such as `"wav"` or `"mp3"`.
pub fn decode_audio(bytes: &[u8], extension: Option<&str>) -> Result<DecodedAudio> {
    let source = Cursor::new(bytes.to_vec());
    let stream = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| PlayerError::Decode(format!("unrecognised container: {err}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlayerError::Decode("no decodable audio track".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| PlayerError::Decode(format!("unsupported codec: {err}")))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(PlayerError::Decode(err.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                tracing::warn!(error = err, "skipping undecodable packet");
                continue;
            }
            Err(err) => return Err(PlayerError::Decode(err.to_string())),
        };

        let spec = *decoded.spec();
        let channel_count = spec.channels.count();
        if channel_count == 0 {
            continue;
        }
        sample_rate = spec.rate;
        if channels.is_empty() {
            channels = vec![Vec::new(); channel_count];
        }

        let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        interleaved.copy_interleaved_ref(decoded);
        for frame in interleaved.samples().chunks(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
    }

    DecodedAudio::from_channels(channels, sample_rate)
        .map_err(|err| PlayerError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for sample in samples {
                writer.write_sample(*sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_wav_into_planar_channels() {
        let interleaved: Vec<i16> = (0..2000)
            .map(|i| if i % 2 == 0 { i16::MAX / 2 } else { 0 })
            .collect();
        let audio = decode_audio(&wav_bytes(&interleaved, 1000, 2), Some("wav")).unwrap();

        assert_eq!(audio.channel_count(), 2);
        assert_eq!(audio.frames(), 1000);
        assert!((audio.duration() - 1.0).abs() < 1e-9);
        assert!(audio.channel(0).unwrap()[10] > 0.4);
        assert_eq!(audio.channel(1).unwrap()[10], 0.0);
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = decode_audio(b"definitely not audio", None).unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }

    #[test]
    fn mono_mix_averages_channels() {
        let audio = DecodedAudio::from_channels(vec![vec![1.0, 0.5], vec![0.0, 0.5]], 2).unwrap();
        assert_eq!(audio.mono_sample(0), 0.5);
        assert_eq!(audio.mono_sample(1), 0.5);
        assert_eq!(audio.mono_sample(9), 0.0);
    }

    #[test]
    fn rejects_empty_or_ragged_channels() {
        assert!(DecodedAudio::from_channels(vec![], 44_100).is_err());
        assert!(DecodedAudio::from_channels(vec![vec![0.0; 4], vec![0.0; 3]], 44_100).is_err());
        assert!(DecodedAudio::from_channels(vec![vec![0.0; 4]], 0).is_err());
    }
}
