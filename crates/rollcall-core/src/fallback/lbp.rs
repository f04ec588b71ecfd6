//! Local Binary Pattern histograms and a nearest-neighbour classifier over them.
//!
//! Each canonical crop is split into a `LBP_GRID`×`LBP_GRID` grid; every cell
//! contributes a normalized 256-bin histogram of 8-neighbour LBP codes.
//! Distance is chi-square summed over cells, so identical crops score 0 and
//! the ceiling is `2 * LBP_GRID²`.

use image::GrayImage;

const LBP_GRID: u32 = 8;
const LBP_BINS: usize = 256;

/// Neighbour offsets, clockwise from top-left. Bit `i` is set when
/// neighbour `i` is at least as bright as the centre.
const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

/// Spatial LBP descriptor of one crop.
#[derive(Debug, Clone, PartialEq)]
pub struct LbpHistogram {
    cells: Vec<[f32; LBP_BINS]>,
}

impl LbpHistogram {
    pub fn compute(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        let cell_w = (w / LBP_GRID).max(1);
        let cell_h = (h / LBP_GRID).max(1);
        let mut counts = vec![[0u32; LBP_BINS]; (LBP_GRID * LBP_GRID) as usize];

        for y in 1..h.saturating_sub(1) {
            for x in 1..w.saturating_sub(1) {
                let centre = img.get_pixel(x, y).0[0];
                let mut code = 0u8;
                for (bit, (dx, dy)) in NEIGHBOURS.iter().enumerate() {
                    let nx = (x as i32 + dx) as u32;
                    let ny = (y as i32 + dy) as u32;
                    if img.get_pixel(nx, ny).0[0] >= centre {
                        code |= 1 << bit;
                    }
                }
                let col = (x / cell_w).min(LBP_GRID - 1);
                let row = (y / cell_h).min(LBP_GRID - 1);
                counts[(row * LBP_GRID + col) as usize][code as usize] += 1;
            }
        }

        let cells = counts
            .iter()
            .map(|hist| {
                let total: u32 = hist.iter().sum();
                let mut norm = [0f32; LBP_BINS];
                if total > 0 {
                    for (slot, &c) in norm.iter_mut().zip(hist.iter()) {
                        *slot = c as f32 / total as f32;
                    }
                }
                norm
            })
            .collect();

        Self { cells }
    }

    /// Chi-square distance, summed over grid cells.
    pub fn distance(&self, other: &LbpHistogram) -> f32 {
        let mut d = 0.0f32;
        for (a, b) in self.cells.iter().zip(other.cells.iter()) {
            for (x, y) in a.iter().zip(b.iter()) {
                let sum = x + y;
                if sum > 0.0 {
                    d += (x - y) * (x - y) / sum;
                }
            }
        }
        d
    }
}

/// 1-nearest-neighbour classifier over labelled LBP descriptors.
#[derive(Debug, Default)]
pub struct LbpClassifier {
    samples: Vec<(usize, LbpHistogram)>,
}

impl LbpClassifier {
    /// Fit on `(label, canonical crop)` pairs.
    pub fn train<'a>(samples: impl IntoIterator<Item = (usize, &'a GrayImage)>) -> Self {
        Self {
            samples: samples
                .into_iter()
                .map(|(label, img)| (label, LbpHistogram::compute(img)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nearest training sample as `(label, distance)`. Ties keep the earliest sample.
    pub fn predict(&self, img: &GrayImage) -> Option<(usize, f32)> {
        let probe = LbpHistogram::compute(img);
        let mut best: Option<(usize, f32)> = None;
        for (label, hist) in &self.samples {
            let d = probe.distance(hist);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((*label, d));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| image::Luma([((x * 3 + y * 5) % 256) as u8]))
    }

    fn checker(w: u32, h: u32, size: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            image::Luma([if ((x / size) + (y / size)) % 2 == 0 { 30 } else { 220 }])
        })
    }

    #[test]
    fn test_identical_crops_have_zero_distance() {
        let a = LbpHistogram::compute(&gradient(96, 96));
        let b = LbpHistogram::compute(&gradient(96, 96));
        assert_eq!(a.distance(&b), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric_and_bounded() {
        let a = LbpHistogram::compute(&gradient(96, 96));
        let b = LbpHistogram::compute(&checker(96, 96, 6));
        let d = a.distance(&b);
        assert!(d > 0.0);
        assert!((d - b.distance(&a)).abs() < 1e-4);
        assert!(d <= 2.0 * (LBP_GRID * LBP_GRID) as f32 + 1e-3);
    }

    #[test]
    fn test_uniform_image_has_single_code() {
        let flat = GrayImage::from_pixel(96, 96, image::Luma([128]));
        let hist = LbpHistogram::compute(&flat);
        // all neighbours equal the centre → every bit set
        assert!((hist.cells[LBP_GRID as usize + 1][255] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_predict_nearest_label() {
        let classifier = LbpClassifier::train([
            (0usize, &gradient(96, 96)),
            (1usize, &checker(96, 96, 6)),
        ]);
        assert_eq!(classifier.len(), 2);

        let (label, distance) = classifier.predict(&checker(96, 96, 6)).unwrap();
        assert_eq!(label, 1);
        assert_eq!(distance, 0.0);
    }

    #[test]
    fn test_predict_on_empty_classifier() {
        let classifier = LbpClassifier::default();
        assert!(classifier.is_empty());
        assert!(classifier.predict(&gradient(96, 96)).is_none());
    }
}
