//! Dividing the values of a numeric feature into bins.
use super::spec::{BinMethod, BinSpec, CapacityTarget};
use crate::site::{Site, SiteView};
use crate::units::Capacity;
use anyhow::{Result, bail, ensure};
use itertools::Itertools;
use log::warn;

/// Non-negative values smaller than this are raised to it before binning
pub const MIN_BIN_VALUE: f64 = 1e-6;

/// A value derived from a specification, along with any explicit value it replaced.
///
/// Capacity targets take priority over explicit counts, which is not an error but should be
/// visible to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    /// The value to use
    pub value: T,
    /// An explicitly given value which was discarded in favour of `value`
    pub overwritten: Option<T>,
}

impl<T> Resolution<T> {
    /// A resolution where nothing was overwritten
    pub fn unchanged(value: T) -> Self {
        Self {
            value,
            overwritten: None,
        }
    }
}

/// Something with a capacity which counts towards capacity targets
pub trait HasCapacity {
    /// The capacity of this item
    fn capacity(&self) -> Capacity;
}

impl HasCapacity for Site {
    fn capacity(&self) -> Capacity {
        self.capacity
    }
}

impl HasCapacity for SiteView<'_> {
    fn capacity(&self) -> Capacity {
        self.site.capacity
    }
}

/// The number of bins (or clusters) needed for each to hold roughly `per_item` capacity.
///
/// Always at least one.
pub fn count_from_capacity(total: Capacity, per_item: Capacity) -> usize {
    // Tolerance stops exact multiples being rounded down by floating-point error
    let count = (total / per_item).value() + 1e-9;
    if count.is_finite() && count >= 1.0 {
        count.floor() as usize
    } else {
        1
    }
}

/// Resolve a capacity target in a bin method into an explicit number of bins or quantiles.
///
/// Methods without a capacity target are returned unchanged. If the target replaces an
/// explicitly given `bins` or `q`, a warning is logged and the replaced method is returned in
/// [`Resolution::overwritten`].
///
/// # Arguments
///
/// * `sites` - The sites which will be binned
/// * `method` - The bin method to resolve
pub fn num_bins_from_capacity<S: HasCapacity>(
    sites: &[S],
    method: &BinMethod,
) -> Resolution<BinMethod> {
    let BinMethod::CapacityTarget { target, replaces } = method else {
        return Resolution::unchanged(method.clone());
    };

    let total: Capacity = sites.iter().map(HasCapacity::capacity).sum();
    let value = match *target {
        CapacityTarget::PerBin(per_bin) => BinMethod::Count(count_from_capacity(total, per_bin)),
        CapacityTarget::PerQuantile(per_q) => {
            BinMethod::Quantiles(count_from_capacity(total, per_q))
        }
    };

    let overwritten = replaces.as_deref().cloned();
    if let Some(old) = &overwritten {
        warn!("Overwriting '{}' based on {}", old.key(), target.key());
    }

    Resolution { value, overwritten }
}

/// Count the internal edges strictly below `value`.
///
/// The first and last edges only bound the range, so values outside it fall in the first or
/// last bin.
fn bin_index(edges: &[f64], value: f64) -> usize {
    match edges {
        [] | [_] => 0,
        [_, internal @ .., _] => internal.iter().filter(|edge| **edge < value).count(),
    }
}

/// Equal-width bins spanning the range of `values`
fn equal_width_bins(values: &[f64], count: usize) -> Vec<usize> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
            (min.min(*value), max.max(*value))
        });
    if max <= min {
        return vec![0; values.len()];
    }

    // Bins are closed on the right, as for explicit edges
    let edges: Vec<f64> = (0..=count)
        .map(|i| min + (max - min) * i as f64 / count as f64)
        .collect();
    values.iter().map(|value| bin_index(&edges, *value)).collect()
}

/// The weighted quantiles of `values` at each of `fractions`.
///
/// Each quantile is the smallest value for which the cumulative weight reaches that fraction
/// of the total. Duplicate edges are removed.
fn weighted_quantile_edges(values: &[f64], weights: &[f64], fractions: &[f64]) -> Vec<f64> {
    let sorted: Vec<(f64, f64)> = values
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .sorted_by(|a, b| a.0.total_cmp(&b.0))
        .collect();
    let total: f64 = weights.iter().sum();

    let mut cumulative = Vec::with_capacity(sorted.len());
    let mut sum = 0.0;
    for (_, weight) in &sorted {
        sum += weight;
        cumulative.push(sum / total);
    }

    fractions
        .iter()
        .map(|fraction| {
            let idx = cumulative
                .iter()
                .position(|cum| *cum >= fraction - 1e-12)
                .unwrap_or(sorted.len() - 1);
            sorted[idx].0
        })
        .dedup()
        .collect()
}

/// Check weights and fall back to unit weights where needed
fn resolve_weights(len: usize, weights: Option<&[f64]>) -> Result<Vec<f64>> {
    let Some(weights) = weights else {
        return Ok(vec![1.0; len]);
    };
    ensure!(
        weights.len() == len,
        "Got {} weights for {len} values",
        weights.len()
    );
    ensure!(
        weights.iter().all(|weight| weight.is_finite() && *weight >= 0.0),
        "Weights must be finite, non-negative numbers"
    );

    if weights.iter().all(|weight| *weight == 0.0) {
        return Ok(vec![1.0; len]);
    }

    Ok(weights.to_vec())
}

/// Bins holding roughly equal (weighted) shares of `values`
fn quantile_bins(values: &[f64], fractions: &[f64], weights: Option<&[f64]>) -> Result<Vec<usize>> {
    let weights = resolve_weights(values.len(), weights)?;
    let edges = weighted_quantile_edges(values, &weights, fractions);

    Ok(values.iter().map(|value| bin_index(&edges, *value)).collect())
}

/// Assign a bin label to each of `values`.
///
/// Labels start at zero and never decrease as values increase. Degenerate inputs (e.g. all
/// values equal) give fewer distinct labels than requested rather than an error.
///
/// # Arguments
///
/// * `values` - The values to bin
/// * `method` - How to choose bin edges. Capacity targets must already have been resolved with
///   [`num_bins_from_capacity`].
/// * `weights` - Optional weight for each value, used for quantiles (e.g. site capacity)
pub fn value_bin(values: &[f64], method: &BinMethod, weights: Option<&[f64]>) -> Result<Vec<usize>> {
    ensure!(
        values.iter().all(|value| value.is_finite()),
        "Cannot bin non-finite values"
    );
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let values: Vec<f64> = values
        .iter()
        .map(|value| {
            if (0.0..MIN_BIN_VALUE).contains(value) {
                MIN_BIN_VALUE
            } else {
                *value
            }
        })
        .collect();

    let labels = match method {
        BinMethod::Count(count) => equal_width_bins(&values, (*count).max(1)),
        BinMethod::Edges(edges) => {
            let edges: Vec<f64> = edges.iter().copied().dedup().collect();
            values.iter().map(|value| bin_index(&edges, *value)).collect()
        }
        BinMethod::Quantiles(count) => {
            let count = (*count).max(1);
            let fractions: Vec<f64> = (0..=count).map(|i| i as f64 / count as f64).collect();
            quantile_bins(&values, &fractions, weights)?
        }
        BinMethod::QuantileEdges(fractions) => quantile_bins(&values, fractions, weights)?,
        BinMethod::CapacityTarget { target, .. } => {
            bail!("Capacity target `{}` must be resolved before binning", target.key())
        }
    };

    Ok(labels)
}

/// Assign each site a bin label according to `spec`.
///
/// Capacity targets are resolved using the capacity of `sites`.
pub fn bin_sites(sites: &[SiteView], spec: &BinSpec) -> Result<Vec<usize>> {
    let method = num_bins_from_capacity(sites, &spec.method).value;
    let values: Vec<f64> = sites
        .iter()
        .map(|view| view.site.numeric_value(&spec.feature))
        .collect::<Result<_>>()?;
    let weights: Option<Vec<f64>> = spec
        .weights
        .as_ref()
        .map(|column| {
            sites
                .iter()
                .map(|view| view.site.numeric_value(column))
                .collect::<Result<_>>()
        })
        .transpose()?;

    value_bin(&values, &method, weights.as_deref())
}
