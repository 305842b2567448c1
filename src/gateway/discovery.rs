//! Cluster discovery by directory listing.
//!
//! The clustering script leaves exactly two files per cluster in the clusters
//! directory (`<i>_elasticity_prices.csv` and `<i>_cross_elasticity_prices.csv`),
//! so the cluster count is the entry count halved. This is a structural
//! assumption about that script's output, not a computation; if the script ever
//! writes a manifest, replace [`count_clusters`] and nothing else.

use std::io;
use std::path::Path;

pub const FILES_PER_CLUSTER: usize = 2;

pub async fn count_clusters(clusters_dir: &Path) -> io::Result<u32> {
    let mut entries = 0usize;
    let mut listing = tokio::fs::read_dir(clusters_dir).await?;
    while listing.next_entry().await?.is_some() {
        entries += 1;
    }
    Ok(u32::try_from(entries / FILES_PER_CLUSTER).unwrap_or(u32::MAX))
}
