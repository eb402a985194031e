use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use log::{debug, info, warn};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use storemix::{Float, StoreId};

use crate::balance::errors::ConstraintSpecError;
use crate::balance::hyperparams::{BalanceParams, BalanceValidParams};
use crate::balance::partition::{sq_dist, Cluster, Partition};
use storemix::ParamGuard;

/// Progress of the balancer
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalanceState {
    Initial,
    Repairing,
    /// Every cluster respects its size bounds and purity
    Satisfied,
    /// The budget ran out or no open violation admits a move
    Partial,
}

impl fmt::Display for BalanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            BalanceState::Initial => "INITIAL",
            BalanceState::Repairing => "REPAIRING",
            BalanceState::Satisfied => "SATISFIED",
            BalanceState::Partial => "PARTIAL",
        };
        write!(f, "{}", state)
    }
}

/// The constraint a cluster breaks. Violations are repaired in this order.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ViolationKind {
    Oversized,
    Impure,
    Undersized,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ViolationKind::Oversized => "oversized",
            ViolationKind::Impure => "impure",
            ViolationKind::Undersized => "undersized",
        };
        write!(f, "{}", kind)
    }
}

/// A constraint broken by a cluster
///
/// `store_ids` lists the stores involved: every member for a size violation, the members outside
/// the dominant band for a purity violation.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub cluster_id: usize,
    pub size: usize,
    pub impurity: f64,
    pub store_ids: Vec<StoreId>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cluster {} is {} (size {}, impurity {:.3}): {}",
            self.cluster_id,
            self.kind,
            self.size,
            self.impurity,
            self.store_ids.join(", ")
        )
    }
}

/// A store reassignment performed by the balancer
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Move {
    pub store_id: StoreId,
    pub from: usize,
    pub to: usize,
    /// The violation the move repairs
    pub repairs: ViolationKind,
    /// Whether `to` was opened by this move
    pub opened: bool,
}

/// Outcome of [`BalanceValidParams::balance`]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct BalanceReport {
    pub state: BalanceState,
    pub moves: Vec<Move>,
    /// Violations still open, empty when `state` is `Satisfied`
    pub violations: Vec<Violation>,
    pub opened_clusters: Vec<usize>,
    pub budget_exhausted: bool,
}

impl BalanceReport {
    pub fn is_satisfied(&self) -> bool {
        self.state == BalanceState::Satisfied
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    Existing(usize),
    New,
}

#[derive(Clone, Copy, Debug)]
struct Step {
    row: usize,
    to: Target,
    repairs: ViolationKind,
}

fn cmp_dist<F: Float>(a: F, b: F) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

impl BalanceParams {
    /// Checks the constraints, then [balances](BalanceValidParams::balance) `partition`
    pub fn balance<F: Float>(
        &self,
        partition: &mut Partition<F>,
    ) -> Result<BalanceReport, ConstraintSpecError> {
        self.check_ref()?.balance(partition)
    }
}

impl BalanceValidParams {
    /// Every open violation of `partition`, oversized clusters first, then impure, then
    /// undersized ones, each group in cluster id order
    pub fn violations<F: Float>(&self, partition: &Partition<F>) -> Vec<Violation> {
        let mut violations = Vec::new();
        for &kind in &[
            ViolationKind::Oversized,
            ViolationKind::Impure,
            ViolationKind::Undersized,
        ] {
            for cluster in partition.clusters() {
                if self.is_violated(kind, cluster) {
                    violations.push(self.describe(kind, cluster, partition));
                }
            }
        }
        violations
    }

    fn is_violated<F: Float>(&self, kind: ViolationKind, cluster: &Cluster<F>) -> bool {
        match kind {
            ViolationKind::Oversized => cluster.size() > self.max_cluster_size(),
            ViolationKind::Impure => cluster.impurity() > self.temperature_tolerance(),
            ViolationKind::Undersized => cluster.size() < self.min_cluster_size(),
        }
    }

    fn describe<F: Float>(
        &self,
        kind: ViolationKind,
        cluster: &Cluster<F>,
        partition: &Partition<F>,
    ) -> Violation {
        let dominant = cluster.dominant_band();
        let store_ids = cluster
            .members()
            .iter()
            .filter(|&&row| kind != ViolationKind::Impure || Some(partition.band(row)) != dominant)
            .map(|&row| partition.store_id(row).clone())
            .collect();
        Violation {
            kind,
            cluster_id: cluster.id(),
            size: cluster.size(),
            impurity: cluster.impurity(),
            store_ids,
        }
    }

    /// Repair the violations of `partition` by moving stores between clusters.
    ///
    /// The balancer is a state machine going from `Initial` to `Repairing` and ending in either
    /// `Satisfied` or `Partial`. Each iteration rebuilds the violation queue and performs a single
    /// move for the first violation that admits one:
    /// * an undersized cluster receives the closest acceptable store of the nearest cluster that
    ///   can spare one
    /// * an oversized cluster hands its worst fitting store over to the nearest cluster with room
    ///   for it
    /// * an impure cluster hands a store outside its dominant band over to the nearest cluster
    ///   dominated by the band of that store
    ///
    /// When an oversized or impure cluster finds no receiver and growth is allowed, a new
    /// cluster is opened around the store instead. A store never moves back into a cluster it
    /// left.
    ///
    /// Fails before any move if the minimum size cannot be reached by every cluster.
    pub fn balance<F: Float>(
        &self,
        partition: &mut Partition<F>,
    ) -> Result<BalanceReport, ConstraintSpecError> {
        let n_stores = partition.n_stores();
        let n_clusters = partition.n_clusters();
        self.check_feasibility(n_stores, n_clusters)?;
        let max_clusters = self.max_clusters(n_clusters);
        let budget = self.max_n_iterations(n_stores);

        info!(
            "balancing {} stores in {} clusters (sizes {}..={}, tolerance {}, up to {} clusters)",
            n_stores,
            n_clusters,
            self.min_cluster_size(),
            self.max_cluster_size(),
            self.temperature_tolerance(),
            max_clusters
        );

        let mut state = BalanceState::Initial;
        let mut left: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut moves = Vec::new();
        let mut opened_clusters = Vec::new();
        let mut budget_exhausted = false;

        let violations = loop {
            let violations = self.violations(partition);
            if violations.is_empty() {
                state = BalanceState::Satisfied;
                break violations;
            }
            if state == BalanceState::Initial {
                debug!("{} violations in the initial partition", violations.len());
                state = BalanceState::Repairing;
            }
            if moves.len() >= budget {
                budget_exhausted = true;
                state = BalanceState::Partial;
                break violations;
            }

            let step = violations
                .iter()
                .find_map(|v| self.repair(v, partition, &left, max_clusters));
            let step = match step {
                Some(step) => step,
                None => {
                    state = BalanceState::Partial;
                    break violations;
                }
            };

            let from = partition.memberships()[step.row];
            let (to, opened) = match step.to {
                Target::Existing(to) => {
                    partition.move_store(step.row, to);
                    (to, false)
                }
                Target::New => {
                    let to = partition.open_cluster(step.row);
                    opened_clusters.push(to);
                    (to, true)
                }
            };
            left.insert((step.row, from));

            let mv = Move {
                store_id: partition.store_id(step.row).clone(),
                from,
                to,
                repairs: step.repairs,
                opened,
            };
            debug!(
                "move {}: store {} from cluster {} to cluster {} ({}{})",
                moves.len(),
                mv.store_id,
                mv.from,
                mv.to,
                mv.repairs,
                if opened { ", opened" } else { "" }
            );
            moves.push(mv);
        };

        match state {
            BalanceState::Satisfied => info!(
                "balancing {} after {} moves with {} clusters",
                state,
                moves.len(),
                partition.n_clusters()
            ),
            _ => {
                warn!(
                    "balancing {} after {} moves, {} violations left{}",
                    state,
                    moves.len(),
                    violations.len(),
                    if budget_exhausted {
                        " (budget exhausted)"
                    } else {
                        ""
                    }
                );
                for violation in &violations {
                    warn!("{}", violation);
                }
            }
        }

        Ok(BalanceReport {
            state,
            moves,
            violations,
            opened_clusters,
            budget_exhausted,
        })
    }

    fn repair<F: Float>(
        &self,
        violation: &Violation,
        partition: &Partition<F>,
        left: &BTreeSet<(usize, usize)>,
        max_clusters: usize,
    ) -> Option<Step> {
        let cluster = violation.cluster_id;
        let (row, to) = match violation.kind {
            ViolationKind::Undersized => self.fill(cluster, partition, left)?,
            ViolationKind::Oversized => self.shrink(cluster, partition, left, max_clusters)?,
            ViolationKind::Impure => self.purify(cluster, partition, left, max_clusters)?,
        };
        Some(Step {
            row,
            to,
            repairs: violation.kind,
        })
    }

    fn can_grow<F: Float>(&self, partition: &Partition<F>, max_clusters: usize) -> bool {
        let n_clusters = partition.n_clusters();
        n_clusters < max_clusters
            && (n_clusters + 1).saturating_mul(self.min_cluster_size()) <= partition.n_stores()
    }

    /// Members of `cluster` sorted by decreasing distance to its centroid
    fn worst_fit_first<F: Float>(&self, cluster: usize, partition: &Partition<F>) -> Vec<usize> {
        let mut members = partition
            .cluster(cluster)
            .members()
            .iter()
            .map(|&row| (row, partition.distance_to(row, cluster)))
            .collect::<Vec<_>>();
        members.sort_by(|a, b| cmp_dist(b.1, a.1));
        members.into_iter().map(|(row, _)| row).collect()
    }

    /// The cluster closest to `row` that can take it, ties going to the smallest then to the
    /// lowest id
    fn nearest_receiver<F: Float>(
        &self,
        row: usize,
        partition: &Partition<F>,
        left: &BTreeSet<(usize, usize)>,
        eligible: impl Fn(&Cluster<F>) -> bool,
    ) -> Option<usize> {
        let band = partition.band(row);
        let from = partition.memberships()[row];
        partition
            .clusters()
            .iter()
            .filter(|c| {
                c.id() != from
                    && c.size() < self.max_cluster_size()
                    && c.accepts(band, self.temperature_tolerance())
                    && !left.contains(&(row, c.id()))
                    && eligible(*c)
            })
            .map(|c| (partition.distance_to(row, c.id()), c.size(), c.id()))
            .min_by(|a, b| cmp_dist(a.0, b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)))
            .map(|(_, _, id)| id)
    }

    fn fill<F: Float>(
        &self,
        receiver: usize,
        partition: &Partition<F>,
        left: &BTreeSet<(usize, usize)>,
    ) -> Option<(usize, Target)> {
        let target = partition.cluster(receiver);
        let tolerance = self.temperature_tolerance();

        let mut donors = partition
            .clusters()
            .iter()
            .filter(|d| d.id() != receiver && d.size() > self.min_cluster_size())
            .map(|d| (sq_dist(d.centroid(), target.centroid()), d))
            .collect::<Vec<_>>();
        donors.sort_by(|a, b| {
            cmp_dist(a.0, b.0)
                .then(a.1.size().cmp(&b.1.size()))
                .then(a.1.id().cmp(&b.1.id()))
        });

        donors.into_iter().find_map(|(_, donor)| {
            donor
                .members()
                .iter()
                .copied()
                .filter(|&row| {
                    let band = partition.band(row);
                    !left.contains(&(row, receiver))
                        && target.accepts(band, tolerance)
                        && donor.releases(band, tolerance)
                })
                .map(|row| {
                    (
                        row,
                        partition.distance_to(row, receiver),
                        partition.distance_to(row, donor.id()),
                    )
                })
                .min_by(|a, b| cmp_dist(a.1, b.1).then(cmp_dist(b.2, a.2)))
                .map(|(row, _, _)| (row, Target::Existing(receiver)))
        })
    }

    fn shrink<F: Float>(
        &self,
        source: usize,
        partition: &Partition<F>,
        left: &BTreeSet<(usize, usize)>,
        max_clusters: usize,
    ) -> Option<(usize, Target)> {
        let cluster = partition.cluster(source);
        let tolerance = self.temperature_tolerance();
        let candidates = self
            .worst_fit_first(source, partition)
            .into_iter()
            .filter(|&row| cluster.releases(partition.band(row), tolerance))
            .collect::<Vec<_>>();

        for &row in &candidates {
            if let Some(to) = self.nearest_receiver(row, partition, left, |_| true) {
                return Some((row, Target::Existing(to)));
            }
        }
        if self.can_grow(partition, max_clusters) {
            return candidates.first().map(|&row| (row, Target::New));
        }
        None
    }

    fn purify<F: Float>(
        &self,
        source: usize,
        partition: &Partition<F>,
        left: &BTreeSet<(usize, usize)>,
        max_clusters: usize,
    ) -> Option<(usize, Target)> {
        let cluster = partition.cluster(source);
        if cluster.size() <= self.min_cluster_size() {
            return None;
        }
        let dominant = cluster.dominant_band()?;
        let minority = self
            .worst_fit_first(source, partition)
            .into_iter()
            .filter(|&row| partition.band(row) != dominant)
            .collect::<Vec<_>>();

        for &row in &minority {
            let band = partition.band(row);
            let to = self.nearest_receiver(row, partition, left, |c| {
                c.dominant_band() == Some(band)
            });
            if let Some(to) = to {
                return Some((row, Target::Existing(to)));
            }
        }
        if self.can_grow(partition, max_clusters) {
            return minority.first().map(|&row| (row, Target::New));
        }
        None
    }
}
