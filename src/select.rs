//! Representative selection: one canonical street per non-empty cluster.
//!
//! Under [`SelectionPolicy::FrequencyPriority`] a cluster takes its lowest
//! index member that is among the global top-N most frequent streets; if none
//! qualifies it falls back to the member nearest its centroid. Under
//! [`SelectionPolicy::CentroidNearest`] the fallback is the only rule. Distance
//! ties go to the lower street index. Empty clusters are skipped, and ids are
//! numbered over the clusters that produced a representative, so they have no
//! gaps.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cluster::{Cluster, ClusterModel};
use crate::config::SelectionPolicy;
use crate::corpus::UniqueStreetSet;
use crate::normalize::Normalizer;
use crate::reference::ReferenceEntity;
use crate::vectorize::FeatureMatrix;

/// Which rule picked a representative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectedBy {
    /// The member is among the global top-N most frequent streets.
    TopFrequency,
    /// The member is nearest the cluster centroid.
    CentroidDistance,
}

impl fmt::Display for SelectedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopFrequency => write!(f, "top_frequency"),
            Self::CentroidDistance => write!(f, "centroid_distance"),
        }
    }
}

/// The street chosen for one cluster, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representative {
    /// Cluster the street represents.
    pub cluster_id: usize,
    /// Stable index of the street in the unique set.
    pub street_index: usize,
    /// Raw street text.
    pub street: String,
    /// Rule that chose it.
    pub rule: SelectedBy,
}

/// Picks representatives according to a policy.
#[derive(Debug, Clone)]
pub struct RepresentativeSelector {
    policy: SelectionPolicy,
    top_n: usize,
}

impl RepresentativeSelector {
    /// Creates a selector; `top_n` is ignored under `CentroidNearest`.
    #[must_use]
    pub const fn new(policy: SelectionPolicy, top_n: usize) -> Self {
        Self { policy, top_n }
    }

    /// One representative per non-empty cluster, in cluster id order.
    #[must_use]
    pub fn select(
        &self,
        streets: &UniqueStreetSet,
        matrix: &FeatureMatrix,
        model: &ClusterModel,
    ) -> Vec<Representative> {
        let frequent = match self.policy {
            SelectionPolicy::FrequencyPriority => streets.top_n_indices(self.top_n),
            SelectionPolicy::CentroidNearest => BTreeSet::new(),
        };

        model
            .clusters()
            .into_iter()
            .filter_map(|cluster| self.select_one(&cluster, &frequent, matrix))
            .map(|(cluster_id, street_index, rule)| Representative {
                cluster_id,
                street_index,
                street: streets
                    .get(street_index)
                    .map(|s| s.text.clone())
                    .unwrap_or_default(),
                rule,
            })
            .collect()
    }

    fn select_one(
        &self,
        cluster: &Cluster,
        frequent: &BTreeSet<usize>,
        matrix: &FeatureMatrix,
    ) -> Option<(usize, usize, SelectedBy)> {
        if cluster.is_empty() {
            return None;
        }

        // Members are ascending, so the first hit is the lowest stable index.
        if let Some(&index) = cluster.members.iter().find(|i| frequent.contains(*i)) {
            return Some((cluster.cluster_id, index, SelectedBy::TopFrequency));
        }

        nearest_member(cluster, matrix)
            .map(|index| (cluster.cluster_id, index, SelectedBy::CentroidDistance))
    }
}

/// Member with the smallest distance to the centroid; lowest index on ties.
fn nearest_member(cluster: &Cluster, matrix: &FeatureMatrix) -> Option<usize> {
    let centroid_norm: f64 = cluster.centroid.iter().map(|x| x * x).sum();
    let mut best: Option<(usize, f64)> = None;
    for &i in &cluster.members {
        let d = matrix.row(i).squared_distance(&cluster.centroid, centroid_norm);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// Normalizes representatives and numbers them `1..=len`.
#[must_use]
pub fn to_reference_entities(
    representatives: &[Representative],
    normalizer: &Normalizer,
) -> Vec<ReferenceEntity> {
    representatives
        .iter()
        .zip(1u64..)
        .map(|(rep, id)| ReferenceEntity::new(id, normalizer.normalize(&rep.street)))
        .collect()
}
