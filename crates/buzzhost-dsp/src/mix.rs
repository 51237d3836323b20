//! Scaled copy/add kernels.
//!
//! Each `copy_*` overwrites its destination and each `add_*` accumulates into
//! it. Frame counts are the minimum of what the two slices hold.

/// `out[i] = input[i]`
#[inline]
pub fn copy(out: &mut [f32], input: &[f32]) {
    let n = out.len().min(input.len());
    out[..n].copy_from_slice(&input[..n]);
}

#[inline]
pub fn zero(out: &mut [f32]) {
    out.fill(0.0);
}

/// `out[i] = input[i] * amp`
#[inline]
pub fn copy_scaled(out: &mut [f32], input: &[f32], amp: f32) {
    for (o, i) in out.iter_mut().zip(input) {
        *o = *i * amp;
    }
}

/// `out[i] += input[i] * amp`
#[inline]
pub fn add_scaled(out: &mut [f32], input: &[f32], amp: f32) {
    for (o, i) in out.iter_mut().zip(input) {
        *o += *i * amp;
    }
}

/// Folds interleaved stereo into mono: `out[i] = (L + R) * amp`.
#[inline]
pub fn copy_stereo_to_mono(out: &mut [f32], input: &[f32], amp: f32) {
    for (o, frame) in out.iter_mut().zip(input.chunks_exact(2)) {
        *o = (frame[0] + frame[1]) * amp;
    }
}

#[inline]
pub fn add_stereo_to_mono(out: &mut [f32], input: &[f32], amp: f32) {
    for (o, frame) in out.iter_mut().zip(input.chunks_exact(2)) {
        *o += (frame[0] + frame[1]) * amp;
    }
}

/// Duplicates mono into both channels of an interleaved stereo buffer.
#[inline]
pub fn copy_mono_to_stereo(out: &mut [f32], input: &[f32], amp: f32) {
    for (frame, i) in out.chunks_exact_mut(2).zip(input) {
        let s = *i * amp;
        frame[0] = s;
        frame[1] = s;
    }
}

#[inline]
pub fn add_mono_to_stereo(out: &mut [f32], input: &[f32], amp: f32) {
    for (frame, i) in out.chunks_exact_mut(2).zip(input) {
        let s = *i * amp;
        frame[0] += s;
        frame[1] += s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_copy_scaled_then_add() {
        let mut out = [9.0f32; 4];
        copy_scaled(&mut out, &[1.0, 2.0, 3.0, 4.0], 0.5);
        add_scaled(&mut out, &[1.0, 1.0, 1.0, 1.0], 2.0);
        assert_relative_eq!(out[0], 2.5);
        assert_relative_eq!(out[3], 4.0);
    }

    #[test]
    fn test_stereo_fold() {
        let mut out = [0.0f32; 2];
        copy_stereo_to_mono(&mut out, &[0.25, 0.75, 1.0, -1.0], 2.0);
        assert_relative_eq!(out[0], 2.0);
        assert_relative_eq!(out[1], 0.0);

        add_stereo_to_mono(&mut out, &[0.5, 0.5, 0.5, 0.5], 1.0);
        assert_relative_eq!(out[0], 3.0);
        assert_relative_eq!(out[1], 1.0);
    }

    #[test]
    fn test_mono_to_stereo() {
        let mut out = [0.0f32; 4];
        copy_mono_to_stereo(&mut out, &[1.0, -2.0], 0.5);
        assert_eq!(out, [0.5, 0.5, -1.0, -1.0]);

        add_mono_to_stereo(&mut out, &[1.0, 1.0], 1.0);
        assert_eq!(out, [1.5, 1.5, 0.0, 0.0]);
    }

    #[test]
    fn test_short_slices_do_not_panic() {
        let mut out = [7.0f32; 3];
        copy(&mut out, &[1.0]);
        assert_eq!(out, [1.0, 7.0, 7.0]);

        copy_mono_to_stereo(&mut out, &[2.0, 3.0], 1.0);
        assert_eq!(out, [2.0, 2.0, 7.0]);

        zero(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.0]);
    }
}
