pub mod ffmpeg_audio_decoder;
pub mod ffmpeg_wav_converter;
pub mod whisper_recognizer;
