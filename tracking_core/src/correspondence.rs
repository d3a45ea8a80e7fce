//! Soft correspondence between simulated nodes and observed points.
//!
//! One E-step of a robust point-matching mixture: each observed point `j` is
//! explained by a distribution over {model nodes} ∪ {outlier}. The affinity
//! of node `i` for point `j` is its visibility times a Gaussian kernel of
//! the distance; a fixed outlier term per column soaks up points that no
//! node explains (sensor noise, clutter, unmodeled scene).
//!
//! # Per-column math
//! a_ij = v_i · exp(−‖model_i − obs_j‖² / 2σ²)
//! p_ij = a_ij / (Σ_i a_ij + outlier_param)
//!
//! Columns are independent, so estimation is parallel across observed points.
//! Sparsification drops a column's smallest entries first and only while the
//! column's dropped mass stays within `cutoff`, so the aggregate mass lost is
//! bounded by `cutoff · M` no matter how the small entries are distributed.
//! A column whose affinities all vanish (point many bandwidths from every
//! node) degenerates to all-outlier and simply contributes no force
//! downstream.

use crate::error::TrackError;
use crate::types::Vec3;
use rayon::prelude::*;

/// One retained correspondence triple: node `i` explains point `j` with
/// probability mass `prob ∈ (0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrEntry {
    pub node: usize,
    pub point: usize,
    pub prob: f64,
}

/// Sparse node × point correspondence.
///
/// Stored as an explicit triple list sorted by `(node, point)` — never a
/// dense matrix; after cutoff the pair count is what bounds downstream cost.
/// The outlier mass of column `j` is implicit: `1 − Σ_i p_ij`.
#[derive(Clone, Debug, Default)]
pub struct SparseCorr {
    entries: Vec<CorrEntry>,
    n_nodes: usize,
    n_points: usize,
}

impl SparseCorr {
    /// All retained triples, sorted by `(node, point)`.
    pub fn entries(&self) -> &[CorrEntry] {
        &self.entries
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// Number of retained pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained probability mass per observed point (column sums).
    /// `1 − column_masses()[j]` is the outlier mass of point `j`.
    pub fn column_masses(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_points];
        for e in &self.entries {
            sums[e.point] += e.prob;
        }
        sums
    }

    /// Total outlier mass across all observed points.
    pub fn total_outlier_mass(&self) -> f64 {
        let retained: f64 = self.entries.iter().map(|e| e.prob).sum();
        self.n_points as f64 - retained
    }
}

/// Estimate the sparse soft correspondence between `model` nodes and `obs`
/// points, weighted by per-node `visibility`.
///
/// `bandwidth` (σ) controls matching tightness — larger σ tolerates bigger
/// tracking error before a pair is down-weighted. `outlier_param` is the
/// prior density of unexplained points; `cutoff` is the sparsification
/// budget: per column, sub-cutoff entries are dropped smallest-first until
/// dropping one more would push that column's lost mass past `cutoff`.
/// Entries above `cutoff` are always retained.
///
/// Empty node or point sets produce an empty correspondence (a no-op
/// downstream, not an error). Non-positive or non-finite `bandwidth` /
/// `outlier_param` fail with [`TrackError::InvalidParameter`].
pub fn estimate_correspondence(
    model: &[Vec3],
    obs: &[Vec3],
    visibility: &[f64],
    bandwidth: f64,
    outlier_param: f64,
    cutoff: f64,
) -> Result<SparseCorr, TrackError> {
    if !(bandwidth > 0.0) || !bandwidth.is_finite() {
        return Err(TrackError::InvalidParameter {
            name: "bandwidth",
            value: bandwidth,
        });
    }
    if !(outlier_param > 0.0) || !outlier_param.is_finite() {
        return Err(TrackError::InvalidParameter {
            name: "outlier_param",
            value: outlier_param,
        });
    }
    debug_assert_eq!(model.len(), visibility.len());

    let inv_two_sigma_sq = 1.0 / (2.0 * bandwidth * bandwidth);

    // Columns are independent: one task per observed point.
    let mut entries: Vec<CorrEntry> = obs
        .par_iter()
        .enumerate()
        .flat_map_iter(|(j, &obs_pt)| {
            let affinities: Vec<f64> = model
                .iter()
                .zip(visibility)
                .map(|(&m, &v)| v * (-(m - obs_pt).norm_squared() * inv_two_sigma_sq).exp())
                .collect();
            let denom: f64 = affinities.iter().sum::<f64>() + outlier_param;

            let mut kept = Vec::new();
            let mut small = Vec::new();
            for (i, a) in affinities.into_iter().enumerate() {
                let p = a / denom;
                if p <= 0.0 {
                    continue;
                }
                let entry = CorrEntry {
                    node: i,
                    point: j,
                    prob: p,
                };
                if p > cutoff {
                    kept.push(entry);
                } else {
                    small.push(entry);
                }
            }

            // Drop sub-cutoff entries smallest-first while the column's
            // dropped mass stays within the cutoff budget; the rest are
            // kept even though individually small.
            small.sort_unstable_by(|a, b| a.prob.total_cmp(&b.prob));
            let mut dropped = 0.0;
            let mut keep_from = small.len();
            for (idx, e) in small.iter().enumerate() {
                if dropped + e.prob <= cutoff {
                    dropped += e.prob;
                } else {
                    keep_from = idx;
                    break;
                }
            }
            kept.extend(small.drain(keep_from..));
            kept.into_iter()
        })
        .collect();

    entries.sort_unstable_by(|a, b| (a.node, a.point).cmp(&(b.node, b.point)));

    Ok(SparseCorr {
        entries,
        n_nodes: model.len(),
        n_points: obs.len(),
    })
}
