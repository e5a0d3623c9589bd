//! Helpers for plain and interleaved `f32` sample buffers.

// -------------------------------------------------------------------------------------------------

/// Fill the given buffer with silence.
#[inline]
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.iter_mut().for_each(|s| *s = 0.0);
}

/// Multiply all samples in the given buffer with a constant gain.
#[inline]
pub fn scale_buffer(buffer: &mut [f32], gain: f32) {
    buffer.iter_mut().for_each(|s| *s *= gain);
}

/// Mix down an interleaved buffer with the given channel layout into a mono buffer.
pub fn interleaved_to_mono(interleaved: &[f32], channel_count: usize) -> Vec<f32> {
    debug_assert!(channel_count > 0, "Invalid channel count");
    match channel_count {
        1 => interleaved.to_vec(),
        _ => interleaved
            .chunks_exact(channel_count)
            .map(|frame| frame.iter().sum::<f32>() / channel_count as f32)
            .collect(),
    }
}

/// Copy a mono buffer into all channels of an interleaved output buffer. The number of copied
/// frames is the minimum of both buffer's frame counts.
pub fn mono_to_interleaved(mono: &[f32], interleaved: &mut [f32], channel_count: usize) {
    debug_assert!(channel_count > 0, "Invalid channel count");
    match channel_count {
        1 => {
            for (o, i) in interleaved.iter_mut().zip(mono) {
                *o = *i;
            }
        }
        2 => {
            for (frame, i) in interleaved.chunks_exact_mut(2).zip(mono) {
                frame[0] = *i;
                frame[1] = *i;
            }
        }
        _ => {
            for (frame, i) in interleaved.chunks_exact_mut(channel_count).zip(mono) {
                frame.iter_mut().for_each(|o| *o = *i);
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_interleaved() {
        // mono
        let mono = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(interleaved_to_mono(&mono, 1), mono);
        let mut mono_copy = vec![0.0; 4];
        mono_to_interleaved(&mono, &mut mono_copy, 1);
        assert_eq!(mono_copy, mono);

        // stereo
        let stereo = vec![1.0, 3.0, 2.0, 2.0, 0.0, -2.0];
        assert_eq!(interleaved_to_mono(&stereo, 2), vec![2.0, 2.0, -1.0]);
        let mut stereo_copy = vec![0.0; 6];
        mono_to_interleaved(&[1.0, 2.0, 3.0], &mut stereo_copy, 2);
        assert_eq!(stereo_copy, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);

        // general
        let mut general = vec![0.0; 6];
        mono_to_interleaved(&[5.0, 6.0], &mut general, 3);
        assert_eq!(general, vec![5.0, 5.0, 5.0, 6.0, 6.0, 6.0]);
    }

    #[test]
    fn scale_and_clear() {
        let mut buffer = vec![1.0, -2.0, 0.5];
        scale_buffer(&mut buffer, 2.0);
        assert_eq!(buffer, vec![2.0, -4.0, 1.0]);
        clear_buffer(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }
}
