//! Deployment defaults for the NOAA GFS mirror.
//!
//! # Design
//! - Centralize defaults so the CLI, config files and tests agree.
//! - Values mirror the production deployment against `ftp.ncep.noaa.gov`.

use std::time::Duration;

/// Remote host serving the GFS products.
pub const HOST: &str = "ftp.ncep.noaa.gov";
/// Control-channel port of the remote server.
pub const PORT: u16 = 21;
/// Remote directory containing the dated product folders.
pub const BASE_DIR: &str = "/pub/data/nccf/com/gfs/prod/";
/// Login name used for anonymous access.
pub const USERNAME: &str = "anonymous";
/// Password used for anonymous access.
pub const PASSWORD: &str = "anything";
/// Local directory that receives the mirrored tree.
pub const DESTINATION_ROOT: &str = "gribfiles";
/// Timeout applied when dialing the remote server.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Folder names carrying an 8-digit run date.
pub const FOLDER_PATTERN: &str = "gfs.([0-9]{8})";
/// Payload file names for the 1-degree GRIB2 products.
pub const PAYLOAD_PATTERN: &str = "gfs.t([0-9]{2})z.pgrb2.1p00.f([0-9]{3})";
/// Substring marking index sidecar files.
pub const EXCLUDE_SUBSTRING: &str = "idx";
/// Model cycle partitions beneath each dated folder.
pub const PARTITIONS: [&str; 4] = ["00", "06", "12", "18"];

/// Maximum number of concurrent fetches.
pub const CONCURRENCY: usize = 16;
/// Capacity of the fetch queue.
pub const QUEUE_CAPACITY: usize = 1_000;
/// Maximum attempts per file before it is dead-lettered.
pub const MAX_ATTEMPTS: u32 = 10;
/// Delay before the first retry.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Upper bound for the retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Growth factor applied to the retry delay per attempt.
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// NATS server receiving completion notifications.
pub const NATS_URL: &str = "nats://pi.hole:4222";
/// Subject completion notifications are published on.
pub const SUBJECT: &str = "leia.noaa.files";
