use std::path::Path;

use crate::audio::domain::audio_converter::{AudioConverter, CONVERSION_OK};
use crate::audio::domain::audio_segment::sample_to_pcm16;
#[cfg(test)]
use crate::audio::domain::audio_segment::AudioSegment;
use crate::audio::infrastructure::ffmpeg_audio_decoder::FfmpegAudioDecoder;
use crate::runtime::native_runtime::{LibraryError, NativeLibrary};
use crate::shared::constants::WHISPER_SAMPLE_RATE;

/// Exit code for any conversion failure.
pub const CONVERSION_FAILED: i32 = -1;

/// Converts any ffmpeg-readable audio to a 16 kHz mono 16-bit WAV file.
///
/// Decoded samples go straight to the output file, one resampled frame at a
/// time.
pub struct FfmpegWavConverter {
    sample_rate: u32,
}

impl FfmpegWavConverter {
    pub fn new() -> Self {
        Self {
            sample_rate: WHISPER_SAMPLE_RATE,
        }
    }

    fn try_convert(&self, input: &Path, output: &Path) -> Result<(), LibraryError> {
        let decoder = FfmpegAudioDecoder::open(input, self.sample_rate)?
            .ok_or_else(|| format!("no audio stream in {}", input.display()))?;

        let mut writer = hound::WavWriter::create(output, pcm16_mono_spec(self.sample_rate))?;
        let samples = decoder.decode_into(|chunk| {
            for &sample in chunk {
                writer.write_sample(sample_to_pcm16(sample))?;
            }
            Ok(())
        })?;
        writer.finalize()?;

        log::info!(
            "Converted {} to {} ({:.1}s of audio)",
            input.display(),
            output.display(),
            samples as f64 / self.sample_rate as f64
        );
        Ok(())
    }
}

fn pcm16_mono_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

impl Default for FfmpegWavConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioConverter for FfmpegWavConverter {
    fn convert(&self, input: &Path, output: &Path) -> i32 {
        match self.try_convert(input, output) {
            Ok(()) => CONVERSION_OK,
            Err(e) => {
                log::error!("Audio conversion of {} failed: {e}", input.display());
                let _ = std::fs::remove_file(output);
                CONVERSION_FAILED
            }
        }
    }
}

impl NativeLibrary for FfmpegWavConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn load(&self) -> Result<(), LibraryError> {
        ffmpeg_next::init()?;
        Ok(())
    }

    fn unload(&self) {}
}

/// Writes a mono segment as signed 16-bit PCM WAV.
#[cfg(test)]
pub(crate) fn write_wav(path: &Path, audio: &AudioSegment) -> Result<(), hound::Error> {
    let mut writer = hound::WavWriter::create(path, pcm16_mono_spec(audio.sample_rate()))?;
    for &sample in audio.samples() {
        writer.write_sample(sample_to_pcm16(sample))?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_nonexistent_input_fails() {
        let converter = FfmpegWavConverter::new();
        converter.load().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");

        let code = converter.convert(Path::new("/nonexistent/input.mp3"), &output);
        assert_eq!(code, CONVERSION_FAILED);
        assert!(!output.exists());
    }

    #[test]
    fn test_write_wav_produces_16k_mono_pcm16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let audio = AudioSegment::new(vec![0.0, 0.5, -0.5, 1.0], 16000, 1);
        write_wav(&path, &audio).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let expected: Vec<i16> = audio.samples().iter().map(|&s| sample_to_pcm16(s)).collect();
        assert_eq!(samples, expected);
    }

    #[test]
    fn test_convert_wav_input_round_trips_through_ffmpeg() {
        let converter = FfmpegWavConverter::new();
        converter.load().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.wav");
        let output = dir.path().join("output.wav");
        let tone: Vec<f32> = (0..44100)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        write_wav(&input, &AudioSegment::new(tone, 44100, 1)).unwrap();

        assert_eq!(converter.convert(&input, &output), CONVERSION_OK);
        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let len = reader.len() as i64;
        assert!((len - 16000).abs() < 1600, "unexpected sample count {len}");
    }

    #[test]
    fn test_convert_file_without_audio_fails() {
        let converter = FfmpegWavConverter::new();
        converter.load().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.mp3");
        std::fs::write(&input, b"not audio at all").unwrap();
        let output = dir.path().join("out.wav");

        assert_eq!(converter.convert(&input, &output), CONVERSION_FAILED);
        assert!(!output.exists());
    }
}
