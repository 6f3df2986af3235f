//! Clustering algorithms operating on points in feature space.
//!
//! Every algorithm here is deterministic: the same points always give the same labels. Labels
//! are numbered in order of first appearance.
use itertools::Itertools;
use std::collections::HashMap;

/// The maximum number of iterations of Lloyd's algorithm
const KMEANS_MAX_ITER: usize = 300;

/// How dissimilar two points are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    /// Straight-line distance
    Euclidean,
    /// One minus the Pearson correlation, so that points of the same shape are close
    Correlation,
}

impl Distance {
    /// The distance between `a` and `b`
    pub fn between(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Self::Euclidean => squared_euclidean(a, b).sqrt(),
            Self::Correlation => correlation_distance(a, b),
        }
    }
}

/// How the distance between clusters is measured when building a hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Merge the clusters giving the smallest increase in within-cluster variance
    Ward,
    /// Mean distance between members of the two clusters
    Average(Distance),
}

fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn correlation_distance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    // Correlation is undefined for flat series: flat series are alike, and unlike others
    match (var_a > 0.0, var_b > 0.0) {
        (false, false) => 0.0,
        (true, true) => (1.0 - cov / (var_a * var_b).sqrt()).max(0.0),
        _ => 1.0,
    }
}

/// Rescale each column to have zero mean and unit variance.
///
/// Columns with no variance are set to zero, so they don't affect distances.
pub fn standardise(columns: &mut [Vec<f64>]) {
    for column in columns {
        let n = column.len() as f64;
        let mean = column.iter().sum::<f64>() / n;
        let std = (column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        for x in column.iter_mut() {
            *x = if std > 0.0 { (*x - mean) / std } else { 0.0 };
        }
    }
}

/// The number of distinct points
pub fn count_distinct<P: AsRef<[f64]>>(points: &[P]) -> usize {
    points
        .iter()
        .map(AsRef::as_ref)
        .sorted_by(|a, b| {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len()))
        })
        .dedup()
        .count()
}

/// Renumber labels in order of first appearance
fn compact_labels(labels: &[usize]) -> Vec<usize> {
    let mut mapping = HashMap::new();
    labels
        .iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(*label).or_insert(next)
        })
        .collect()
}

/// Index of the centroid nearest to `point`, preferring the lowest index on ties
fn nearest<P: AsRef<[f64]>>(centroids: &[P], point: &[f64]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(idx, centroid)| (idx, squared_euclidean(centroid.as_ref(), point)))
        .fold((0, f64::INFINITY), |best, (idx, dist)| {
            if dist < best.1 { (idx, dist) } else { best }
        })
}

fn mean_point<'a, I: Iterator<Item = &'a [f64]>>(points: I, dim: usize) -> Option<Vec<f64>> {
    let mut sum = vec![0.0; dim];
    let mut count = 0u32;
    for point in points {
        for (total, x) in sum.iter_mut().zip(point) {
            *total += x;
        }
        count += 1;
    }

    (count > 0).then(|| sum.into_iter().map(|total| total / f64::from(count)).collect())
}

/// Pick initial centroids by farthest-point seeding.
///
/// The first centroid is the point closest to the mean of all points. Each following centroid
/// is the point farthest from all the centroids chosen so far.
fn seed_centroids<P: AsRef<[f64]>>(points: &[P], k: usize) -> Vec<Vec<f64>> {
    let dim = points[0].as_ref().len();
    let Some(mean) = mean_point(points.iter().map(AsRef::as_ref), dim) else {
        return Vec::new();
    };

    let (first, _) = nearest(points, &mean);
    let mut centroids = vec![points[first].as_ref().to_vec()];
    let mut min_dist: Vec<f64> = points
        .iter()
        .map(|point| squared_euclidean(point.as_ref(), &centroids[0]))
        .collect();

    while centroids.len() < k {
        let (next, _) = min_dist
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (idx, dist)| {
                if *dist > best.1 { (idx, *dist) } else { best }
            });
        let centroid = points[next].as_ref().to_vec();
        for (dist, point) in min_dist.iter_mut().zip(points) {
            *dist = dist.min(squared_euclidean(point.as_ref(), &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

/// Cluster points into `k` clusters with Lloyd's k-means algorithm.
///
/// `k` must be no larger than the number of distinct points.
pub fn kmeans<P: AsRef<[f64]>>(points: &[P], k: usize) -> Vec<usize> {
    if points.is_empty() {
        return Vec::new();
    }
    let dim = points[0].as_ref().len();
    let mut centroids = seed_centroids(points, k.max(1));

    let mut labels: Vec<usize> = points
        .iter()
        .map(|point| nearest(&centroids, point.as_ref()).0)
        .collect();
    for _ in 0..KMEANS_MAX_ITER {
        for (idx, centroid) in centroids.iter_mut().enumerate() {
            let members = points
                .iter()
                .zip(&labels)
                .filter(|(_, label)| **label == idx)
                .map(|(point, _)| point.as_ref());

            // Empty clusters keep their previous centroid
            if let Some(mean) = mean_point(members, dim) {
                *centroid = mean;
            }
        }

        let new_labels: Vec<usize> = points
            .iter()
            .map(|point| nearest(&centroids, point.as_ref()).0)
            .collect();
        if new_labels == labels {
            break;
        }
        labels = new_labels;
    }

    compact_labels(&labels)
}

/// A square matrix of distances between clusters
struct DistanceMatrix {
    size: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    fn from_points<P: AsRef<[f64]>>(points: &[P], distance: impl Fn(&[f64], &[f64]) -> f64) -> Self {
        let size = points.len();
        let mut matrix = Self {
            size,
            data: vec![0.0; size * size],
        };
        for (i, j) in (0..size).tuple_combinations() {
            matrix.set(i, j, distance(points[i].as_ref(), points[j].as_ref()));
        }

        matrix
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.size + j]
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.size + j] = value;
        self.data[j * self.size + i] = value;
    }
}

/// A merge of two clusters, each identified by the index of one of its points
struct Merge {
    a: usize,
    b: usize,
    height: f64,
}

/// Build the full merge hierarchy with the nearest-neighbour chain algorithm.
///
/// Both supported linkages are reducible, so the merges found are the same as for the naive
/// algorithm.
fn merge_hierarchy<P: AsRef<[f64]>>(points: &[P], linkage: Linkage) -> Vec<Merge> {
    let n = points.len();
    // Ward's update formula applies to squared Euclidean distances
    let mut dist = match linkage {
        Linkage::Ward => DistanceMatrix::from_points(points, squared_euclidean),
        Linkage::Average(distance) => DistanceMatrix::from_points(points, |a, b| distance.between(a, b)),
    };
    let mut size = vec![1.0; n];
    let mut active = vec![true; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));
    let mut chain: Vec<usize> = Vec::new();

    while merges.len() + 1 < n {
        if chain.is_empty() {
            let Some(start) = active.iter().position(|is_active| *is_active) else {
                break;
            };
            chain.push(start);
        }

        let a = chain[chain.len() - 1];
        let previous = (chain.len() >= 2).then(|| chain[chain.len() - 2]);

        // Prefer the previous chain element on ties so the chain always terminates
        let mut best = previous.map(|p| (p, dist.get(a, p)));
        for c in (0..n).filter(|c| active[*c] && *c != a) {
            let d = dist.get(a, c);
            if best.is_none_or(|(_, best_d)| d < best_d) {
                best = Some((c, d));
            }
        }
        let Some((b, height)) = best else {
            break;
        };

        if Some(b) != previous {
            chain.push(b);
            continue;
        }

        chain.truncate(chain.len() - 2);
        let (size_a, size_b) = (size[a], size[b]);
        for c in (0..n).filter(|c| active[*c] && *c != a && *c != b) {
            let (d_ac, d_bc) = (dist.get(a, c), dist.get(b, c));
            let updated = match linkage {
                Linkage::Ward => {
                    let size_c = size[c];
                    ((size_a + size_c) * d_ac + (size_b + size_c) * d_bc - size_c * height)
                        / (size_a + size_b + size_c)
                }
                Linkage::Average(_) => (size_a * d_ac + size_b * d_bc) / (size_a + size_b),
            };
            dist.set(a, c, updated);
        }
        active[b] = false;
        size[a] = size_a + size_b;
        merges.push(Merge { a, b, height });
    }

    merges
}

fn find_root(parent: &mut [usize], mut idx: usize) -> usize {
    while parent[idx] != idx {
        parent[idx] = parent[parent[idx]];
        idx = parent[idx];
    }
    idx
}

/// Cluster points into `k` clusters by cutting an agglomerative hierarchy
pub fn agglomerative<P: AsRef<[f64]>>(points: &[P], k: usize, linkage: Linkage) -> Vec<usize> {
    let n = points.len();
    let k = k.clamp(1, n.max(1));
    let mut merges = merge_hierarchy(points, linkage);
    merges.sort_by(|x, y| x.height.total_cmp(&y.height));

    let mut parent: Vec<usize> = (0..n).collect();
    for merge in merges.iter().take(n.saturating_sub(k)) {
        let root_a = find_root(&mut parent, merge.a);
        let root_b = find_root(&mut parent, merge.b);
        parent[root_b] = root_a;
    }

    let roots: Vec<usize> = (0..n).map(|idx| find_root(&mut parent, idx)).collect();
    compact_labels(&roots)
}
