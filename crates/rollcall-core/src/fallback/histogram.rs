//! Grayscale intensity histograms and their correlation.

use image::GrayImage;

pub const HISTOGRAM_BINS: usize = 256;

/// Pixel-count histogram of a grayscale image.
pub fn intensity_histogram(img: &GrayImage) -> [u32; HISTOGRAM_BINS] {
    let mut hist = [0u32; HISTOGRAM_BINS];
    for p in img.as_raw() {
        hist[*p as usize] += 1;
    }
    hist
}

/// Pearson correlation of two histograms, in [-1, 1].
///
/// Scale-invariant, so crops of different sizes compare fairly. Returns 0
/// when either histogram is flat (zero variance across bins).
pub fn correlation(a: &[u32; HISTOGRAM_BINS], b: &[u32; HISTOGRAM_BINS]) -> f32 {
    let n = HISTOGRAM_BINS as f64;
    let mean_a = a.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| f64::from(v)).sum::<f64>() / n;

    let mut num = 0.0f64;
    let mut var_a = 0.0f64;
    let mut var_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let da = f64::from(x) - mean_a;
        let db = f64::from(y) - mean_b;
        num += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > 0.0 {
        (num / denom) as f32
    } else {
        0.0
    }
}
