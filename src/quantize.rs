//! Color quantization: many pixels in, a ranked pool of representative
//! colors with populations out.
//!
//! The default [`QuantizeMethod::Bucket`] runs in two stages over the
//! color histogram:
//!
//! 1. Variance split. Starting from one bucket holding every distinct
//!    color, repeatedly split the bucket with the largest
//!    population-weighted squared error along its highest-variance channel,
//!    at the weighted median, until the pool is full.
//! 2. Refinement. Weighted k-means seeded with the bucket means, using a
//!    luminance-weighted RGB distance. The loop is a small state machine
//!    with a hard iteration cap; it converges when no histogram entry
//!    changes cluster.
//!
//! [`QuantizeMethod::KMeansLab`] instead clusters every pixel in CIE Lab
//! with `kmeans_colors`.

use std::collections::BTreeMap;

use kmeans_colors::get_kmeans;
use log::debug;
use palette::{IntoColor, Lab, LinSrgb, Srgb};

use crate::color::PackedColor;
use crate::error::{PaletteError, Result};

/// Size of the candidate pool handed to the diversifier.
pub const POOL_SIZE: usize = 256;

/// Hard cap on refinement passes.
pub const MAX_REFINE_ITERATIONS: usize = 10;

/// Channel weights for the refinement distance (Rec. 601 luma).
const CHANNEL_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// `kmeans_colors` stores cluster indices as `u8`.
const KMEANS_MAX_CLUSTERS: usize = 256;

/// A representative color and the number of source pixels it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedEntry {
    pub color: PackedColor,
    pub population: u32,
}

/// Clustering strategy used to build the candidate pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuantizeMethod {
    /// Variance-split buckets refined by weighted k-means in RGB.
    #[default]
    Bucket,
    /// Seeded k-means over every pixel in CIE Lab.
    KMeansLab,
}

/// Reduce `pixels` to at most `pool` entries ranked by population
/// (descending, ties broken by packed value).
///
/// Images with no more than `pool` distinct colors are returned exactly,
/// one entry per distinct color.
pub fn quantize(pixels: &[PackedColor], pool: usize, method: QuantizeMethod) -> Result<Vec<QuantizedEntry>> {
    if pixels.is_empty() {
        return Err(PaletteError::EmptyImage);
    }
    if pool == 0 {
        return Err(PaletteError::Validation("quantizer pool size must be at least 1".into()));
    }

    let hist = histogram(pixels);
    debug!("quantize: {} pixels, {} distinct colors, pool {}", pixels.len(), hist.len(), pool);

    if hist.len() <= pool {
        return Ok(rank(hist.into_iter().map(|(color, population)| QuantizedEntry { color, population })));
    }

    let entries = match method {
        QuantizeMethod::Bucket => {
            let buckets = split_buckets(&hist, pool);
            refine(&hist, buckets)
        }
        QuantizeMethod::KMeansLab => kmeans_lab(pixels, pool),
    };
    Ok(rank(entries))
}

/// Distinct colors with their pixel counts, ordered by packed value.
fn histogram(pixels: &[PackedColor]) -> Vec<(PackedColor, u32)> {
    let mut counts: BTreeMap<PackedColor, u32> = BTreeMap::new();
    for &p in pixels {
        *counts.entry(p).or_insert(0) += 1;
    }
    counts.into_iter().collect()
}

/// Merge entries that share a color, then order by population.
fn rank(entries: impl IntoIterator<Item = QuantizedEntry>) -> Vec<QuantizedEntry> {
    let mut merged: BTreeMap<PackedColor, u32> = BTreeMap::new();
    for e in entries {
        if e.population > 0 {
            *merged.entry(e.color).or_insert(0) += e.population;
        }
    }
    let mut ranked: Vec<QuantizedEntry> = merged
        .into_iter()
        .map(|(color, population)| QuantizedEntry { color, population })
        .collect();
    ranked.sort_by(|a, b| b.population.cmp(&a.population).then(a.color.cmp(&b.color)));
    ranked
}

#[inline]
fn rgb_of(color: PackedColor) -> [f64; 3] {
    color.channels().map(f64::from)
}

#[inline]
fn weighted_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let mut d = 0.0;
    for c in 0..3 {
        let diff = a[c] - b[c];
        d += CHANNEL_WEIGHTS[c] * diff * diff;
    }
    d
}

fn packed_from_mean(mean: &[f64; 3]) -> PackedColor {
    let [r, g, b] = mean.map(|v| v.round().clamp(0.0, 255.0) as u8);
    PackedColor::from_rgb(r, g, b)
}

// ------------------------------------------------------------
// Stage 1: variance split
// ------------------------------------------------------------

/// A set of histogram entries and the moments needed to split it.
#[derive(Debug, Clone)]
struct Bucket {
    /// Indices into the histogram.
    members: Vec<usize>,
    count: f64,
    sum: [f64; 3],
    sum_sq: [f64; 3],
}

impl Bucket {
    fn new(members: Vec<usize>, hist: &[(PackedColor, u32)]) -> Self {
        let mut count = 0.0;
        let mut sum = [0.0; 3];
        let mut sum_sq = [0.0; 3];
        for &i in &members {
            let (color, n) = hist[i];
            let w = f64::from(n);
            let rgb = rgb_of(color);
            count += w;
            for c in 0..3 {
                sum[c] += w * rgb[c];
                sum_sq[c] += w * rgb[c] * rgb[c];
            }
        }
        Self { members, count, sum, sum_sq }
    }

    fn channel_variance(&self, c: usize) -> f64 {
        if self.count == 0.0 {
            return 0.0;
        }
        (self.sum_sq[c] - self.sum[c] * self.sum[c] / self.count).max(0.0)
    }

    /// Population-weighted squared error around the mean.
    fn error(&self) -> f64 {
        (0..3).map(|c| self.channel_variance(c)).sum()
    }

    fn mean(&self) -> [f64; 3] {
        if self.count == 0.0 {
            return [0.0; 3];
        }
        self.sum.map(|s| s / self.count)
    }

    fn is_splittable(&self) -> bool {
        self.members.len() >= 2
    }

    fn split(mut self, hist: &[(PackedColor, u32)]) -> (Bucket, Bucket) {
        let axis = (0..3)
            .fold((0, f64::NEG_INFINITY), |best, c| {
                let v = self.channel_variance(c);
                if v > best.1 { (c, v) } else { best }
            })
            .0;

        self.members.sort_by_key(|&i| (hist[i].0.channels()[axis], hist[i].0));

        let half = self.count / 2.0;
        let mut acc = 0.0;
        let mut split_at = 1;
        for (pos, &i) in self.members.iter().enumerate() {
            acc += f64::from(hist[i].1);
            if acc >= half {
                split_at = pos + 1;
                break;
            }
        }
        split_at = split_at.clamp(1, self.members.len() - 1);

        let right = self.members.split_off(split_at);
        (Bucket::new(self.members, hist), Bucket::new(right, hist))
    }
}

fn split_buckets(hist: &[(PackedColor, u32)], pool: usize) -> Vec<Bucket> {
    let mut buckets = Vec::with_capacity(pool);
    buckets.push(Bucket::new((0..hist.len()).collect(), hist));

    while buckets.len() < pool {
        let mut target: Option<(usize, f64)> = None;
        for (i, b) in buckets.iter().enumerate() {
            if !b.is_splittable() {
                continue;
            }
            let err = b.error();
            if target.is_none_or(|(_, best)| err > best) {
                target = Some((i, err));
            }
        }
        let Some((idx, _)) = target else {
            break;
        };
        let (left, right) = buckets.swap_remove(idx).split(hist);
        buckets.push(left);
        buckets.push(right);
    }

    buckets
}

// ------------------------------------------------------------
// Stage 2: bounded refinement
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefineState {
    Assigning { iteration: usize },
    Converged { iterations: usize },
    IterationCapReached,
}

fn refine(hist: &[(PackedColor, u32)], buckets: Vec<Bucket>) -> Vec<QuantizedEntry> {
    let points: Vec<[f64; 3]> = hist.iter().map(|&(c, _)| rgb_of(c)).collect();
    let mut centroids: Vec<[f64; 3]> = buckets.iter().map(Bucket::mean).collect();
    let mut assignment = vec![0usize; hist.len()];
    for (cluster, b) in buckets.iter().enumerate() {
        for &i in &b.members {
            assignment[i] = cluster;
        }
    }

    let mut state = RefineState::Assigning { iteration: 0 };
    while let RefineState::Assigning { iteration } = state {
        if iteration >= MAX_REFINE_ITERATIONS {
            state = RefineState::IterationCapReached;
            continue;
        }
        let moved = reassign(&points, &centroids, &mut assignment);
        recompute_centroids(hist, &points, &assignment, &mut centroids);
        state = if moved == 0 {
            RefineState::Converged { iterations: iteration + 1 }
        } else {
            RefineState::Assigning { iteration: iteration + 1 }
        };
    }
    match state {
        RefineState::Converged { iterations } => debug!("quantize: refinement converged after {iterations} passes"),
        RefineState::IterationCapReached => debug!("quantize: refinement stopped at {MAX_REFINE_ITERATIONS} passes"),
        RefineState::Assigning { .. } => {}
    }

    let mut population = vec![0u32; centroids.len()];
    for (i, &cluster) in assignment.iter().enumerate() {
        population[cluster] += hist[i].1;
    }

    centroids
        .iter()
        .zip(population)
        .filter(|&(_, n)| n > 0)
        .map(|(mean, n)| QuantizedEntry { color: packed_from_mean(mean), population: n })
        .collect()
}

/// Move every point to its nearest centroid; returns how many moved.
///
/// A candidate centroid `j` cannot beat the best centroid `b` found so far
/// when `d(b, j) >= 4 d(p, b)` (squared distances), which skips most pairs.
fn reassign(points: &[[f64; 3]], centroids: &[[f64; 3]], assignment: &mut [usize]) -> usize {
    let k = centroids.len();
    let mut between = vec![0.0f64; k * k];
    for i in 0..k {
        for j in (i + 1)..k {
            let d = weighted_distance(&centroids[i], &centroids[j]);
            between[i * k + j] = d;
            between[j * k + i] = d;
        }
    }

    let mut moved = 0;
    for (p, slot) in points.iter().zip(assignment.iter_mut()) {
        let current = *slot;
        let mut best = current;
        let mut best_dist = weighted_distance(p, &centroids[current]);
        for j in 0..k {
            if j == best || between[best * k + j] >= 4.0 * best_dist {
                continue;
            }
            let d = weighted_distance(p, &centroids[j]);
            if d < best_dist {
                best_dist = d;
                best = j;
            }
        }
        if best != current {
            *slot = best;
            moved += 1;
        }
    }
    moved
}

fn recompute_centroids(
    hist: &[(PackedColor, u32)],
    points: &[[f64; 3]],
    assignment: &[usize],
    centroids: &mut [[f64; 3]],
) {
    let mut sums = vec![[0.0f64; 3]; centroids.len()];
    let mut weights = vec![0.0f64; centroids.len()];
    for (i, &cluster) in assignment.iter().enumerate() {
        let w = f64::from(hist[i].1);
        for c in 0..3 {
            sums[cluster][c] += w * points[i][c];
        }
        weights[cluster] += w;
    }
    // empty clusters keep their previous position
    for ((centroid, sum), w) in centroids.iter_mut().zip(sums).zip(weights) {
        if w > 0.0 {
            *centroid = sum.map(|s| s / w);
        }
    }
}

// ------------------------------------------------------------
// Alternative: k-means in Lab
// ------------------------------------------------------------

fn kmeans_lab(pixels: &[PackedColor], pool: usize) -> Vec<QuantizedEntry> {
    let k = pool.min(KMEANS_MAX_CLUSTERS);

    let lab_pixels: Vec<Lab> = pixels
        .iter()
        .map(|p| {
            let [r, g, b] = p.channels();
            let linear: LinSrgb<f32> = Srgb::new(r, g, b).into_format::<f32>().into_linear();
            linear.into_color()
        })
        .collect();

    let kmeans = get_kmeans(k, 20, 1e-4, false, &lab_pixels, 0);

    let mut population = vec![0u32; kmeans.centroids.len()];
    for &idx in &kmeans.indices {
        population[idx as usize] += 1;
    }
    debug!("quantize: lab k-means score {}", kmeans.score);

    kmeans
        .centroids
        .iter()
        .zip(population)
        .map(|(&lab, n)| {
            let rgb_f32: Srgb<f32> = Srgb::from_linear(lab.into_color());
            let c: Srgb<u8> = rgb_f32.into_format::<u8>();
            QuantizedEntry { color: PackedColor::from_rgb(c.red, c.green, c.blue), population: n }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(n: usize) -> Vec<PackedColor> {
        (0..n)
            .map(|i| {
                let v = (i * 37 % 256) as u8;
                PackedColor::from_rgb(v, 255 - v, ((i * 11) % 256) as u8)
            })
            .collect()
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = quantize(&[], POOL_SIZE, QuantizeMethod::Bucket).unwrap_err();
        assert!(matches!(err, PaletteError::EmptyImage));
    }

    #[test]
    fn monochrome_image_yields_single_entry() {
        let pixels = vec![PackedColor::from_rgb(10, 20, 30); 4000];
        let q = quantize(&pixels, POOL_SIZE, QuantizeMethod::Bucket).unwrap();
        assert_eq!(q, vec![QuantizedEntry { color: pixels[0], population: 4000 }]);
    }

    #[test]
    fn few_distinct_colors_are_returned_exactly() {
        let red = PackedColor::from_rgb(255, 0, 0);
        let blue = PackedColor::from_rgb(0, 0, 255);
        let green = PackedColor::from_rgb(0, 255, 0);
        let pixels = [red, blue, red, green, red, blue];
        let q = quantize(&pixels, POOL_SIZE, QuantizeMethod::Bucket).unwrap();
        assert_eq!(
            q,
            vec![
                QuantizedEntry { color: red, population: 3 },
                QuantizedEntry { color: blue, population: 2 },
                QuantizedEntry { color: green, population: 1 },
            ]
        );
    }

    #[test]
    fn pool_bounds_output_and_populations_are_conserved() {
        let pixels: Vec<PackedColor> = (0..20_000u32)
            .map(|i| PackedColor::from_rgb((i % 251) as u8, (i * 7 % 256) as u8, (i / 97 % 256) as u8))
            .collect();
        let q = quantize(&pixels, 16, QuantizeMethod::Bucket).unwrap();
        assert!(!q.is_empty() && q.len() <= 16);
        assert!(q.iter().all(|e| e.population >= 1));
        let total: u64 = q.iter().map(|e| u64::from(e.population)).sum();
        assert_eq!(total, pixels.len() as u64);
        assert!(q.windows(2).all(|w| w[0].population >= w[1].population));
    }

    #[test]
    fn dominant_color_ranks_first() {
        let mut pixels = vec![PackedColor::from_rgb(0, 0, 200); 5000];
        pixels.extend(gradient(3000));
        let q = quantize(&pixels, 32, QuantizeMethod::Bucket).unwrap();
        let [r, g, b] = q[0].color.channels();
        assert!(r <= 8 && g <= 8 && b.abs_diff(200) <= 8, "top color {}", q[0].color);
        assert!(q[0].population >= 5000);
    }

    #[test]
    fn quantization_is_deterministic() {
        let pixels = gradient(10_000);
        let a = quantize(&pixels, 24, QuantizeMethod::Bucket).unwrap();
        let b = quantize(&pixels, 24, QuantizeMethod::Bucket).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bucket_split_fills_the_pool() {
        let pixels = gradient(2000);
        let hist = histogram(&pixels);
        let buckets = split_buckets(&hist, 8);
        assert_eq!(buckets.len(), 8);
        let members: usize = buckets.iter().map(|b| b.members.len()).sum();
        assert_eq!(members, hist.len());
    }

    #[test]
    fn weighted_distance_favours_green_sensitivity() {
        let base = [100.0, 100.0, 100.0];
        let green_shift = weighted_distance(&base, &[100.0, 120.0, 100.0]);
        let blue_shift = weighted_distance(&base, &[100.0, 100.0, 120.0]);
        assert!(green_shift > blue_shift);
    }

    fn nearest(p: &[f64; 3], centroids: &[[f64; 3]]) -> usize {
        (0..centroids.len())
            .min_by(|&a, &b| {
                weighted_distance(p, &centroids[a])
                    .partial_cmp(&weighted_distance(p, &centroids[b]))
                    .unwrap()
            })
            .unwrap()
    }

    #[test]
    fn reassign_finds_nearest_past_a_closer_intermediate() {
        let centroids = [[0.0, 0.0, 0.0], [90.0, 0.0, 0.0], [99.0, 0.0, 0.0]];
        let points = [[100.0, 0.0, 0.0]];
        let mut assignment = [0usize];
        let moved = reassign(&points, &centroids, &mut assignment);
        assert_eq!(moved, 1);
        assert_eq!(assignment[0], 2);
    }

    #[test]
    fn reassign_matches_exhaustive_search() {
        let centroids: Vec<[f64; 3]> = (0..24)
            .map(|i| {
                let i = i as f64;
                [(i * 47.0) % 256.0, (i * 89.0 + 13.0) % 256.0, (i * 151.0 + 7.0) % 256.0]
            })
            .collect();
        let points: Vec<[f64; 3]> = gradient(3000).into_iter().map(rgb_of).collect();
        // start everything on one arbitrary cluster so most points must move
        for start in [0, 11, 23] {
            let mut assignment = vec![start; points.len()];
            reassign(&points, &centroids, &mut assignment);
            for (p, &got) in points.iter().zip(&assignment) {
                let want = nearest(p, &centroids);
                assert_eq!(
                    weighted_distance(p, &centroids[got]),
                    weighted_distance(p, &centroids[want]),
                    "point {p:?} start {start}"
                );
            }
        }
    }

    #[test]
    fn lab_kmeans_conserves_population() {
        let pixels = gradient(1500);
        let q = quantize(&pixels, 8, QuantizeMethod::KMeansLab).unwrap();
        assert!(q.len() <= 8);
        let total: u64 = q.iter().map(|e| u64::from(e.population)).sum();
        assert_eq!(total, pixels.len() as u64);
    }
}
