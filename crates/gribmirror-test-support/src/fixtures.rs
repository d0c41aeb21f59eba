//! Scenario builders shared by integration suites.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gribmirror_config::MirrorConfig;

use crate::remote::MemoryRemote;

/// Remote base directory used by every fixture.
pub const BASE_DIR: &str = "/pub/data/nccf/com/gfs/prod";

/// Payload written for the primary scenario file.
pub const SCENARIO_PAYLOAD: &[u8] = b"GRIB2 forecast hour zero";

/// Timestamp `hours` after 2024-01-01T00:00:00Z.
#[must_use]
pub fn ts(hours: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200 + hours * 3_600, 0).unwrap_or_default()
}

/// Deterministic payload bytes of length `len` seeded by `name`.
#[must_use]
pub fn payload(name: &str, len: usize) -> Vec<u8> {
    name.bytes().cycle().take(len).collect()
}

/// Remote holding one relevant folder `gfs.20240101` with a payload file, its
/// index sidecar and an unrelated file.
#[must_use]
pub fn gfs_scenario() -> MemoryRemote {
    let remote = MemoryRemote::new();
    let folder = format!("{BASE_DIR}/gfs.20240101");
    remote.add_dir(&folder, ts(6));
    remote.add_file(
        &format!("{folder}/gfs.t00z.pgrb2.1p00.f000"),
        SCENARIO_PAYLOAD,
        ts(5),
    );
    remote.add_file(
        &format!("{folder}/gfs.t00z.pgrb2.1p00.f000.idx"),
        b"1:0:d=2024010100:PRMSL:mean sea level:anl:".to_vec(),
        ts(5),
    );
    remote.add_file(&format!("{folder}/other.txt"), b"readme".to_vec(), ts(5));
    remote
}

/// Configuration pointing at [`BASE_DIR`] with fast retries and the given
/// partition layout.
#[must_use]
pub fn scenario_config(destination: &Path, partitions: &[&str]) -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.remote.host = "memory".into();
    config.remote.base_dir = BASE_DIR.into();
    config.destination_root = destination.to_path_buf();
    config.layout.partitions = partitions.iter().map(|p| (*p).to_string()).collect();
    config.pipeline.concurrency = 4;
    config.pipeline.queue_capacity = 64;
    config.pipeline.retry.max_attempts = 5;
    config.pipeline.retry.initial_backoff = Duration::from_millis(1);
    config.pipeline.retry.max_backoff = Duration::from_millis(5);
    config.notify.nats_url = None;
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use gribmirror_remote::RemoteTransport;

    #[tokio::test]
    async fn scenario_lists_three_files() -> anyhow::Result<()> {
        let remote = gfs_scenario();
        let mut session = remote.connect().await?;
        let folders = session.list(BASE_DIR).await?;
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "gfs.20240101");
        let files = session.list(&format!("{BASE_DIR}/gfs.20240101")).await?;
        assert_eq!(files.len(), 3);
        Ok(())
    }

    #[test]
    fn timestamps_are_hour_offsets() {
        assert_eq!((ts(2) - ts(1)).num_seconds(), 3_600);
        assert_eq!(payload("ab", 5), b"ababa");
    }
}
