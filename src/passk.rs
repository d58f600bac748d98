use std::collections::BTreeMap;

use crate::problem::ProblemResult;
use crate::store::ResultStore;

/// Final scores keyed `pass@k`
pub type Metrics = BTreeMap<String, f64>;

/// Unbiased pass@k estimator for `n` samples of which `c` are correct.
///
/// pass@k = 1 - C(n-c, k) / C(n, k), evaluated as a running product so large
/// `n` neither overflows nor loses precision. Returns `None` when `k` is 0
/// or larger than `n`, where the estimate is undefined.
pub fn pass_at_k(n: usize, c: usize, k: usize) -> Option<f64> {
    if k == 0 || k > n {
        return None;
    }
    let c = c.min(n);
    if n - c < k {
        return Some(1.0);
    }

    // C(n-c, k) / C(n, k) = prod_{i = n-c+1}^{n} (1 - k / i)
    let ratio: f64 = (n - c + 1..=n)
        .map(|i| 1.0 - k as f64 / i as f64)
        .product();
    Some(1.0 - ratio)
}

/// Averages per-problem estimates for every requested `k`.
///
/// A problem with fewer than `k` samples is left out of that `k`'s mean
/// instead of counting as zero; a `k` no problem can support is omitted.
pub fn reduce(results: &[ProblemResult], ks: &[usize]) -> Metrics {
    let mut metrics = Metrics::new();
    for &k in ks {
        let estimates: Vec<f64> = results
            .iter()
            .filter_map(|r| pass_at_k(r.outcomes.len(), r.num_correct(), k))
            .collect();
        if estimates.is_empty() {
            log::debug!("No problem has {k} samples, pass@{k} not reported");
            continue;
        }
        let mean = estimates.iter().sum::<f64>() / estimates.len() as f64;
        metrics.insert(format!("pass@{k}"), mean);
    }
    metrics
}

/// Reduces every result artifact found in the store
pub fn reduce_store(store: &ResultStore, ks: &[usize]) -> std::io::Result<Metrics> {
    let results = store.load_results()?;
    log::info!(
        "Reducing {} result artifacts from {}",
        results.len(),
        store.dir().display()
    );
    Ok(reduce(&results, ks))
}
