// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Sample-rate conversion and repitching with a band-limited sinc resampler.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::LoadError;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

fn sinc_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Resamples mono audio by the given ratio of output to input frames. A ratio above 1
/// lengthens the audio (lower pitch or higher target rate). The result holds exactly
/// `ceil(len * ratio)` frames, aligned with the input.
pub(crate) fn resample(samples: &[f32], ratio: f64) -> Result<Vec<f32>, LoadError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, sinc_parameters(), INPUT_BLOCK_SIZE, 1)
            .map_err(|e| LoadError::Resample {
                ratio,
                reason: e.to_string(),
            })?;
    let failed = |e: rubato::ResampleError| LoadError::Resample {
        ratio,
        reason: e.to_string(),
    };

    let expected = (samples.len() as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + INPUT_BLOCK_SIZE);

    let mut position = 0;
    while position + resampler.input_frames_next() <= samples.len() {
        let next = resampler.input_frames_next();
        let block = [&samples[position..position + next]];
        output.extend_from_slice(&resampler.process(&block, None).map_err(failed)?[0]);
        position += next;
    }

    let rest = [&samples[position..]];
    output.extend_from_slice(
        &resampler
            .process_partial(Some(&rest[..]), None)
            .map_err(failed)?[0],
    );
    // Flush the filter so the tail of the input makes it out.
    while output.len() < expected + delay {
        let flushed = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(failed)?;
        if flushed[0].is_empty() {
            break;
        }
        output.extend_from_slice(&flushed[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}
