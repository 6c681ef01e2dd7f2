use crate::domain::VariantScores;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One eligible record in a variant's pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ticker: String,
    pub earnings_yield: f64,
    pub return_on_capital: f64,
}

/// Ranks the pool by earnings yield and by return on capital (1 = highest)
/// and sums the two ranks. Equal metrics are ordered by ticker.
pub fn rank(pool: &[Candidate]) -> BTreeMap<String, VariantScores> {
    let ey_ranks = positions(pool, |c| c.earnings_yield);
    let roc_ranks = positions(pool, |c| c.return_on_capital);

    pool.iter()
        .zip(ey_ranks.into_iter().zip(roc_ranks))
        .map(|(c, (ey_rank, roc_rank))| {
            (c.ticker.clone(), VariantScores::ranked(ey_rank, roc_rank))
        })
        .collect()
}

/// 1-based rank of each pool entry, descending by `metric`.
fn positions(pool: &[Candidate], metric: impl Fn(&Candidate) -> f64) -> Vec<u32> {
    let mut order: Vec<usize> = (0..pool.len()).collect();
    order.sort_by(|&a, &b| {
        descending(metric(&pool[a]), metric(&pool[b]))
            .then_with(|| pool[a].ticker.cmp(&pool[b].ticker))
    });

    let mut ranks = vec![0u32; pool.len()];
    for (pos, idx) in order.into_iter().enumerate() {
        ranks[idx] = pos as u32 + 1;
    }
    ranks
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}
