// L2 distance kernel used by the shadow index scan.
// AVX2/FMA on x86_64, NEON on aarch64, two-accumulator scalar code elsewhere.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

#[cfg(target_arch = "x86_64")]
const MIN_DIM_SIZE_AVX: usize = 32;

#[cfg(target_arch = "aarch64")]
const MIN_DIM_SIZE_NEON: usize = 16;

/// Euclidean distance between two equally sized slices.
/// Returns `f32::INFINITY` when the lengths differ.
#[inline]
pub fn l2_distance_simd(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2")
            && is_x86_feature_detected!("fma")
            && a.len() >= MIN_DIM_SIZE_AVX
        {
            return unsafe { l2_distance_avx2(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") && a.len() >= MIN_DIM_SIZE_NEON {
            return unsafe { l2_distance_neon(a, b) };
        }
    }

    l2_distance_scalar(a, b)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
unsafe fn l2_distance_avx2(a: &[f32], b: &[f32]) -> f32 {
    let dim = a.len();
    let mut i = 0;

    let mut acc_lo = _mm256_setzero_ps();
    let mut acc_hi = _mm256_setzero_ps();

    while i + 15 < dim {
        let d_lo = _mm256_sub_ps(
            _mm256_loadu_ps(a.as_ptr().add(i)),
            _mm256_loadu_ps(b.as_ptr().add(i)),
        );
        let d_hi = _mm256_sub_ps(
            _mm256_loadu_ps(a.as_ptr().add(i + 8)),
            _mm256_loadu_ps(b.as_ptr().add(i + 8)),
        );
        acc_lo = _mm256_fmadd_ps(d_lo, d_lo, acc_lo);
        acc_hi = _mm256_fmadd_ps(d_hi, d_hi, acc_hi);
        i += 16;
    }

    let acc = _mm256_add_ps(acc_lo, acc_hi);
    let mut half = _mm_add_ps(_mm256_extractf128_ps(acc, 1), _mm256_castps256_ps128(acc));
    half = _mm_hadd_ps(half, half);
    half = _mm_hadd_ps(half, half);

    let mut sum_sq = _mm_cvtss_f32(half);
    while i < dim {
        let diff = a[i] - b[i];
        sum_sq += diff * diff;
        i += 1;
    }

    sum_sq.sqrt()
}

#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
#[inline]
unsafe fn l2_distance_neon(a: &[f32], b: &[f32]) -> f32 {
    let dim = a.len();
    let mut i = 0;

    let mut acc_lo = vdupq_n_f32(0.0);
    let mut acc_hi = vdupq_n_f32(0.0);

    while i + 7 < dim {
        let d_lo = vsubq_f32(vld1q_f32(a.as_ptr().add(i)), vld1q_f32(b.as_ptr().add(i)));
        let d_hi = vsubq_f32(vld1q_f32(a.as_ptr().add(i + 4)), vld1q_f32(b.as_ptr().add(i + 4)));
        acc_lo = vfmaq_f32(acc_lo, d_lo, d_lo);
        acc_hi = vfmaq_f32(acc_hi, d_hi, d_hi);
        i += 8;
    }

    let mut sum_sq = vaddvq_f32(vaddq_f32(acc_lo, acc_hi));
    while i < dim {
        let diff = a[i] - b[i];
        sum_sq += diff * diff;
        i += 1;
    }

    sum_sq.sqrt()
}

#[inline]
fn l2_distance_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut even = 0.0f32;
    let mut odd = 0.0f32;

    let mut pairs_a = a.chunks_exact(2);
    let mut pairs_b = b.chunks_exact(2);
    for (pa, pb) in (&mut pairs_a).zip(&mut pairs_b) {
        let d0 = pa[0] - pb[0];
        let d1 = pa[1] - pb[1];
        even += d0 * d0;
        odd += d1 * d1;
    }
    for (x, y) in pairs_a.remainder().iter().zip(pairs_b.remainder()) {
        let d = x - y;
        even += d * d;
    }

    (even + odd).sqrt()
}
