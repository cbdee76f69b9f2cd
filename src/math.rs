use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::Rng;

#[inline]
pub fn round_to(x: f64, places: i32) -> f64 {
    let m = 10f64.powi(places);

    (x * m).round() / m
}

/// Stop condition for [`kmeans`]: whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criteria {
    pub max_iter: usize,
    /// Largest center movement (in feature units) still counted as converged
    pub epsilon: f32,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            max_iter: 10,
            epsilon: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Clustering {
    pub labels: Vec<usize>,
    /// One row per cluster
    pub centers: Array2<f32>,
    /// Sum of squared distances of every sample to its center
    pub compactness: f64,
}

impl Clustering {
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.centers.nrows()];

        for &l in &self.labels {
            counts[l] += 1;
        }

        counts
    }

    /// Cluster with the most members, the lowest index on ties.
    pub fn largest(&self) -> Option<usize> {
        let counts = self.counts();
        let max = *counts.iter().max()?;

        counts.iter().position(|&c| c == max)
    }
}

/// k-means over the rows of `data`, k-means++ seeded, best of `attempts` runs.
///
/// Returns `None` for empty input or `k == 0`; `k` is capped at the number of rows.
pub fn kmeans<R: Rng>(
    data: ArrayView2<'_, f32>,
    k: usize,
    criteria: Criteria,
    attempts: usize,
    rng: &mut R,
) -> Option<Clustering> {
    if k == 0 || data.nrows() == 0 {
        return None;
    }

    let k = k.min(data.nrows());
    let mut best: Option<Clustering> = None;

    for _ in 0..attempts.max(1) {
        let centers = seed_plus_plus(data, k, rng);
        let run = lloyd(data, centers, criteria);

        if best
            .as_ref()
            .map_or(true, |b| run.compactness < b.compactness)
        {
            best = Some(run);
        }
    }

    best
}

#[inline]
fn sq_dist(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: ArrayView1<'_, f32>, centers: &Array2<f32>) -> (usize, f32) {
    centers
        .outer_iter()
        .enumerate()
        .map(|(i, c)| (i, sq_dist(point, c)))
        .fold((0, f32::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn seed_plus_plus<R: Rng>(data: ArrayView2<'_, f32>, k: usize, rng: &mut R) -> Array2<f32> {
    let n = data.nrows();
    let mut centers = Array2::zeros((k, data.ncols()));

    centers.row_mut(0).assign(&data.row(rng.gen_range(0..n)));

    let mut d2: Vec<f32> = data
        .outer_iter()
        .map(|p| sq_dist(p, centers.row(0)))
        .collect();

    for c in 1..k {
        let total: f32 = d2.iter().sum();

        let idx = if total > 0.0 {
            let mut target = rng.gen::<f32>() * total;
            let mut chosen = n - 1;

            for (i, &d) in d2.iter().enumerate() {
                if target < d {
                    chosen = i;
                    break;
                }

                target -= d;
            }

            chosen
        } else {
            rng.gen_range(0..n)
        };

        centers.row_mut(c).assign(&data.row(idx));

        for (i, p) in data.outer_iter().enumerate() {
            d2[i] = d2[i].min(sq_dist(p, centers.row(c)));
        }
    }

    centers
}

fn lloyd(data: ArrayView2<'_, f32>, mut centers: Array2<f32>, criteria: Criteria) -> Clustering {
    let (k, dims) = centers.dim();
    let mut labels = vec![0; data.nrows()];

    for _ in 0..criteria.max_iter.max(1) {
        for (i, p) in data.outer_iter().enumerate() {
            labels[i] = nearest(p, &centers).0;
        }

        let mut sums = Array2::<f64>::zeros((k, dims));
        let mut counts = vec![0usize; k];

        for (p, &l) in data.outer_iter().zip(labels.iter()) {
            counts[l] += 1;

            for (s, &v) in sums.row_mut(l).iter_mut().zip(p.iter()) {
                *s += f64::from(v);
            }
        }

        let mut shift = 0.0f32;

        for (c, &count) in counts.iter().enumerate() {
            // an empty cluster keeps its previous center
            if count == 0 {
                continue;
            }

            let mean = sums.row(c).mapv(|s| (s / count as f64) as f32);
            shift = shift.max(sq_dist(mean.view(), centers.row(c)).sqrt());
            centers.row_mut(c).assign(&mean);
        }

        if shift <= criteria.epsilon {
            break;
        }
    }

    let mut compactness = 0.0;

    for (i, p) in data.outer_iter().enumerate() {
        let (label, d) = nearest(p, &centers);
        labels[i] = label;
        compactness += f64::from(d);
    }

    Clustering {
        labels,
        centers,
        compactness,
    }
}
