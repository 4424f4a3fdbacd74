//! Read policy: primary first, fallback ledger when the primary fails.
//!
//! The two stores are never merged; a page comes entirely from one of them.

use tracing::{info, warn};

use crate::fallback::FallbackStore;
use crate::models::{StorageTag, StoredAlert, StoredReading};
use crate::primary::PrimaryStore;

// ---

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone)]
pub struct RecentPage<T> {
    pub storage: StorageTag,
    pub records: Vec<T>,
}

/// Page size from a raw `limit` query value.
///
/// Anything that is not a non-negative integer means the default; larger
/// values are capped.
pub fn parse_limit(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_LIMIT)
        .min(MAX_LIMIT)
}

pub async fn recent_readings(primary: &dyn PrimaryStore, fallback: &FallbackStore, limit: u32) -> RecentPage<StoredReading> {
    // ---
    match primary.connect().await {
        Ok(mut session) => {
            let rows = session.fetch_recent_readings(i64::from(limit)).await;
            session.close().await;
            match rows {
                Ok(records) => {
                    info!(count = records.len(), storage = StorageTag::Primary.as_str(), "Listed readings");
                    return RecentPage {
                        storage: StorageTag::Primary,
                        records,
                    };
                }
                Err(e) => warn!(error = %e, "Primary read failed, reading fallback ledger"),
            }
        }
        Err(e) => warn!(error = %e, "Primary unreachable, reading fallback ledger"),
    }

    let records = fallback.fetch_recent_readings(limit as usize).await;
    info!(count = records.len(), storage = StorageTag::Fallback.as_str(), "Listed readings");
    RecentPage {
        storage: StorageTag::Fallback,
        records,
    }
}

pub async fn recent_alerts(primary: &dyn PrimaryStore, fallback: &FallbackStore, limit: u32) -> RecentPage<StoredAlert> {
    // ---
    match primary.connect().await {
        Ok(mut session) => {
            let rows = session.fetch_recent_alerts(i64::from(limit)).await;
            session.close().await;
            match rows {
                Ok(records) => {
                    info!(count = records.len(), storage = StorageTag::Primary.as_str(), "Listed alerts");
                    return RecentPage {
                        storage: StorageTag::Primary,
                        records,
                    };
                }
                Err(e) => warn!(error = %e, "Primary read failed, reading fallback ledger"),
            }
        }
        Err(e) => warn!(error = %e, "Primary unreachable, reading fallback ledger"),
    }

    let records = fallback.fetch_recent_alerts(limit as usize).await;
    info!(count = records.len(), storage = StorageTag::Fallback.as_str(), "Listed alerts");
    RecentPage {
        storage: StorageTag::Fallback,
        records,
    }
}
