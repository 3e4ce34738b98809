use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::{Beach, common_name, find_beach};
use crate::models::{Nest, NestEvent, NestStatus, Turtle};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub active_nests: usize,
    pub incubating: usize,
    pub hatching: usize,
    pub hatched: usize,
    pub relocated: usize,
    pub nests_per_beach: BTreeMap<String, usize>,
    pub total_eggs: u32,
    pub current_eggs: u32,
    pub turtles: usize,
    pub turtles_per_species: BTreeMap<String, usize>,
    /// Hatched-stage eggs over all eggs recorded by inventory events, as a
    /// percentage. `None` until at least one inventory recorded eggs.
    pub hatching_success: Option<f64>,
}

impl DashboardStats {
    pub fn compute(nests: &[Nest], turtles: &[Turtle], events: &[NestEvent]) -> Self {
        let mut s = DashboardStats::default();
        for n in nests.iter().filter(|n| !n.is_archived) {
            s.active_nests += 1;
            match n.status {
                NestStatus::Incubating => s.incubating += 1,
                NestStatus::Hatching => s.hatching += 1,
                NestStatus::Hatched => s.hatched += 1,
            }
            if n.relocated {
                s.relocated += 1;
            }
            *s.nests_per_beach.entry(n.beach.clone()).or_default() += 1;
            s.total_eggs += n.total_num_eggs.unwrap_or(0);
            s.current_eggs += n.current_num_eggs.unwrap_or(0);
        }

        s.turtles = turtles.len();
        for t in turtles {
            *s.turtles_per_species
                .entry(common_name(&t.species).to_string())
                .or_default() += 1;
        }

        let (hatched, recorded) = events
            .iter()
            .filter(|e| e.event_type.is_inventory())
            .fold((0u64, 0u64), |(h, r), e| {
                (
                    h + u64::from(e.stages.hatched.count),
                    r + u64::from(e.stages.total()),
                )
            });
        if recorded > 0 {
            s.hatching_success = Some(hatched as f64 * 100.0 / recorded as f64);
        }
        s
    }

    /// Nest counts per beach: every configured beach in its configured order,
    /// zero when it has no active nests, then beaches only the data knows.
    pub fn beach_rows(&self, beaches: &[Beach]) -> Vec<(String, usize)> {
        let mut rows: Vec<(String, usize)> = beaches.iter().map(|b| (b.name.clone(), 0)).collect();
        for (name, n) in &self.nests_per_beach {
            let known = find_beach(beaches, name)
                .and_then(|b| rows.iter_mut().find(|(row, _)| *row == b.name));
            match known {
                Some(row) => row.1 += n,
                None => rows.push((name.clone(), *n)),
            }
        }
        rows
    }
}
