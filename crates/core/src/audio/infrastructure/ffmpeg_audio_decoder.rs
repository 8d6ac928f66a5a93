use std::path::Path;

use ffmpeg_next::codec::{self, decoder};
use ffmpeg_next::format::{self, sample};
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::frame;
use ffmpeg_next::{media, ChannelLayout};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("ffmpeg: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),
    #[error("failed to write samples: {0}")]
    Sink(#[from] hound::Error),
}

/// Streams the best audio stream of an ffmpeg-readable file as mono f32 PCM
/// at a fixed sample rate.
///
/// Samples are handed out one resampled frame at a time, so memory use does
/// not grow with the length of the recording.
pub struct FfmpegAudioDecoder {
    input: format::context::Input,
    stream_index: usize,
    pipeline: Resampling,
}

impl FfmpegAudioDecoder {
    /// Opens `path` for decoding at `sample_rate`. `None` if the file has
    /// no audio stream.
    pub fn open(path: &Path, sample_rate: u32) -> Result<Option<Self>, DecodeError> {
        let input = format::input(path)?;
        let (stream_index, decoder) = {
            let Some(stream) = input.streams().best(media::Type::Audio) else {
                return Ok(None);
            };
            let context = codec::context::Context::from_parameters(stream.parameters())?;
            (stream.index(), context.decoder().audio()?)
        };

        log::debug!(
            "Decoding {} ({} Hz, {} channels) to {sample_rate} Hz mono",
            path.display(),
            decoder.rate(),
            decoder.channels()
        );

        let resampler = resampling::Context::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            format::Sample::F32(sample::Type::Planar),
            ChannelLayout::MONO,
            sample_rate,
        )?;

        Ok(Some(Self {
            input,
            stream_index,
            pipeline: Resampling {
                decoder,
                resampler,
                decoded: frame::Audio::empty(),
                resampled: frame::Audio::empty(),
            },
        }))
    }

    /// Decodes the whole stream, passing each chunk of samples to `sink` as
    /// soon as it is resampled. Returns the number of samples produced.
    ///
    /// The first error from `sink` stops decoding and is returned as is.
    pub fn decode_into<F>(self, mut sink: F) -> Result<usize, DecodeError>
    where
        F: FnMut(&[f32]) -> Result<(), DecodeError>,
    {
        let Self {
            mut input,
            stream_index,
            mut pipeline,
        } = self;

        let mut produced = 0;
        for (stream, packet) in input.packets() {
            if stream.index() != stream_index {
                continue;
            }
            pipeline.decoder.send_packet(&packet)?;
            produced += pipeline.drain(&mut sink)?;
        }
        produced += pipeline.flush(&mut sink)?;
        Ok(produced)
    }
}

/// Decoder plus resampler, with the frames they reuse between packets.
struct Resampling {
    decoder: decoder::Audio,
    resampler: resampling::Context,
    decoded: frame::Audio,
    resampled: frame::Audio,
}

impl Resampling {
    /// Resamples every frame the decoder has ready.
    fn drain<F>(&mut self, sink: &mut F) -> Result<usize, DecodeError>
    where
        F: FnMut(&[f32]) -> Result<(), DecodeError>,
    {
        let mut produced = 0;
        while self.decoder.receive_frame(&mut self.decoded).is_ok() {
            self.resampler.run(&self.decoded, &mut self.resampled)?;
            produced += emit(&self.resampled, sink)?;
        }
        Ok(produced)
    }

    /// Drains the decoder at end of input, then the resampler's delay line.
    fn flush<F>(&mut self, sink: &mut F) -> Result<usize, DecodeError>
    where
        F: FnMut(&[f32]) -> Result<(), DecodeError>,
    {
        self.decoder.send_eof()?;
        let mut produced = self.drain(sink)?;
        if let Ok(Some(delay)) = self.resampler.flush(&mut self.resampled) {
            if delay.output > 0 {
                produced += emit(&self.resampled, sink)?;
            }
        }
        Ok(produced)
    }
}

fn emit<F>(frame: &frame::Audio, sink: &mut F) -> Result<usize, DecodeError>
where
    F: FnMut(&[f32]) -> Result<(), DecodeError>,
{
    if frame.samples() == 0 {
        return Ok(0);
    }
    // Planar mono: plane 0 holds every sample.
    let samples = frame.plane::<f32>(0);
    sink(samples)?;
    Ok(samples.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::domain::audio_segment::AudioSegment;
    use crate::audio::infrastructure::ffmpeg_wav_converter::write_wav;

    fn tone_file(dir: &Path, rate: u32, seconds: u32) -> std::path::PathBuf {
        let path = dir.join("tone.wav");
        let tone: Vec<f32> = (0..rate * seconds)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        write_wav(&path, &AudioSegment::new(tone, rate, 1)).unwrap();
        path
    }

    #[test]
    fn test_open_nonexistent_file_fails() {
        ffmpeg_next::init().unwrap();
        assert!(FfmpegAudioDecoder::open(Path::new("/nonexistent/file.mp3"), 16000).is_err());
    }

    #[test]
    fn test_decode_streams_resampled_chunks() {
        ffmpeg_next::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = tone_file(dir.path(), 44100, 2);

        let decoder = FfmpegAudioDecoder::open(&path, 16000).unwrap().unwrap();
        let mut chunks = 0;
        let mut seen = 0;
        let produced = decoder
            .decode_into(|chunk| {
                chunks += 1;
                seen += chunk.len();
                assert!(chunk.iter().all(|s| s.abs() <= 1.0));
                Ok(())
            })
            .unwrap();

        assert_eq!(produced, seen);
        assert!(chunks > 1, "expected several chunks, got {chunks}");
        assert!((produced as i64 - 32000).abs() < 1600, "unexpected sample count {produced}");
    }

    #[test]
    fn test_sink_error_stops_decoding() {
        ffmpeg_next::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = tone_file(dir.path(), 16000, 1);

        let decoder = FfmpegAudioDecoder::open(&path, 16000).unwrap().unwrap();
        let mut calls = 0;
        let result = decoder.decode_into(|_| {
            calls += 1;
            Err(DecodeError::Sink(hound::Error::Unsupported))
        });

        assert!(matches!(result, Err(DecodeError::Sink(_))));
        assert_eq!(calls, 1);
    }
}
