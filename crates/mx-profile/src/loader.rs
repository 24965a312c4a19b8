//! Audio file boundary
//!
//! Decodes WAV through hound (exact for float and integer PCM) and
//! everything else through symphonia, then resamples to the canonical
//! analysis rate so every track meets the measurement pipeline on the
//! same footing. Decoding lives entirely in this module; the engines
//! only ever see a [`PcmBuffer`].

use crate::error::{ProfileError, ProfileResult};
use mx_core::PcmBuffer;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode a file and resample it to `canonical_rate`.
pub fn load_track<P: AsRef<Path>>(path: P, canonical_rate: u32) -> ProfileResult<PcmBuffer> {
    let path = path.as_ref();
    let path_str = path.display().to_string();

    let (channels, sample_rate) = if path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
    {
        decode_wav(path, &path_str)?
    } else {
        decode_symphonia(path, &path_str)?
    };

    let channels = if sample_rate == canonical_rate {
        channels
    } else {
        log::debug!("{path_str}: resampling {sample_rate} Hz -> {canonical_rate} Hz");
        resample(channels, sample_rate, canonical_rate, &path_str)?
    };

    Ok(PcmBuffer::new(canonical_rate, channels)?)
}

fn load_error(path: &str, reason: impl ToString) -> ProfileError {
    ProfileError::Load {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn decode_wav(path: &Path, path_str: &str) -> ProfileResult<(Vec<Vec<f64>>, u32)> {
    let reader = hound::WavReader::open(path).map_err(|e| load_error(path_str, e))?;
    let spec = reader.spec();
    let num_channels = spec.channels as usize;
    if num_channels == 0 {
        return Err(load_error(path_str, "zero channels"));
    }

    let samples: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()
            .map_err(|e| load_error(path_str, e))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| load_error(path_str, e))?
        }
    };

    let frames = samples.len() / num_channels;
    let mut channels = vec![Vec::with_capacity(frames); num_channels];
    for (i, sample) in samples.into_iter().enumerate() {
        channels[i % num_channels].push(sample);
    }
    Ok((channels, spec.sample_rate))
}

fn decode_symphonia(path: &Path, path_str: &str) -> ProfileResult<(Vec<Vec<f64>>, u32)> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| load_error(path_str, e))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| load_error(path_str, "no audio track"))?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| load_error(path_str, "unknown sample rate"))?;
    let num_channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .ok_or_else(|| load_error(path_str, "unknown channel layout"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| load_error(path_str, e))?;

    let track_id = track.id;
    let mut channels = vec![Vec::new(); num_channels];

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(load_error(path_str, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder
            .decode(&packet)
            .map_err(|e| load_error(path_str, e))?;
        append_samples(&decoded, &mut channels);
    }

    if channels.first().is_none_or(|c| c.is_empty()) {
        return Err(load_error(path_str, "decoded zero frames"));
    }
    Ok((channels, sample_rate))
}

macro_rules! extend_plane {
    ($buf:expr, $channels:expr, |$s:ident| $conv:expr) => {{
        let present = $buf.spec().channels.count();
        for (ch_idx, channel) in $channels.iter_mut().enumerate().take(present) {
            channel.extend($buf.chan(ch_idx).iter().map(|&$s| $conv));
        }
    }};
}

fn append_samples(buffer: &AudioBufferRef, channels: &mut [Vec<f64>]) {
    match buffer {
        AudioBufferRef::F64(buf) => extend_plane!(buf, channels, |s| s),
        AudioBufferRef::F32(buf) => extend_plane!(buf, channels, |s| s as f64),
        AudioBufferRef::S32(buf) => {
            extend_plane!(buf, channels, |s| s as f64 / 2147483648.0)
        }
        AudioBufferRef::S24(buf) => {
            extend_plane!(buf, channels, |s| s.inner() as f64 / 8388608.0)
        }
        AudioBufferRef::S16(buf) => extend_plane!(buf, channels, |s| s as f64 / 32768.0),
        AudioBufferRef::S8(buf) => extend_plane!(buf, channels, |s| s as f64 / 128.0),
        AudioBufferRef::U32(buf) => {
            extend_plane!(buf, channels, |s| (s as f64 - 2147483648.0) / 2147483648.0)
        }
        AudioBufferRef::U24(buf) => {
            extend_plane!(buf, channels, |s| (s.inner() as f64 - 8388608.0) / 8388608.0)
        }
        AudioBufferRef::U16(buf) => {
            extend_plane!(buf, channels, |s| (s as f64 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U8(buf) => extend_plane!(buf, channels, |s| (s as f64 - 128.0) / 128.0),
    }
}

/// Windowed-sinc resample of all channels to the canonical rate.
fn resample(
    channels: Vec<Vec<f64>>,
    from: u32,
    to: u32,
    path_str: &str,
) -> ProfileResult<Vec<Vec<f64>>> {
    let resample_error = |reason: String| ProfileError::Resample {
        path: path_str.to_string(),
        reason,
    };

    let ratio = to as f64 / from as f64;
    let num_channels = channels.len();
    let in_len = channels.first().map(|c| c.len()).unwrap_or(0);
    let expected = (in_len as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f64>::new(ratio, 1.1, params, 1024, num_channels)
        .map_err(|e| resample_error(e.to_string()))?;

    let mut out = vec![Vec::with_capacity(expected); num_channels];
    let mut pos = 0usize;
    while pos < in_len {
        let need = resampler.input_frames_next();
        let mut chunk = vec![vec![0.0f64; need]; num_channels];
        let take = need.min(in_len - pos);
        for (dst, src) in chunk.iter_mut().zip(channels.iter()) {
            dst[..take].copy_from_slice(&src[pos..pos + take]);
        }
        let produced = resampler
            .process(&chunk, None)
            .map_err(|e| resample_error(e.to_string()))?;
        for (dst, frames) in out.iter_mut().zip(produced) {
            dst.extend(frames);
        }
        pos += need;
    }

    for ch in &mut out {
        ch.truncate(expected);
    }
    Ok(out)
}
