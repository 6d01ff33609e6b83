//! Resource governor
//!
//! Keeps concurrent recognition runs from collectively exhausting host
//! memory. Jobs are never rejected; instead each run's heap ceiling shrinks
//! as the running-job count grows. The count lives in the database so it
//! survives process restarts, with a TTL floor against crashed workers.

use sqlx::SqlitePool;
use sysinfo::System;
use tracing::warn;
use uuid::Uuid;

use crate::db::slots;

/// Per-run heap ceiling bounds in GB
pub const MIN_CEILING_GB: f64 = 1.0;
pub const MAX_CEILING_GB: f64 = 2.5;

/// Fraction of host memory the recognition runs may share
const MEMORY_SHARE: f64 = 0.6;

/// Largest sheet dimension (pixels) accepted by the recognition engine,
/// reduced on small hosts
const MAX_SHEET_DIMENSION: u32 = 8192;
const MAX_SHEET_DIMENSION_SMALL_HOST: u32 = 6144;
const SMALL_HOST_THRESHOLD_GB: f64 = 4.0;

/// Heap ceiling in GB for one run: an even share of the memory budget,
/// clamped so a run never gets an unusably small heap nor a wasteful one
pub fn compute_memory_ceiling(total_memory_gb: f64, running_jobs: u64) -> f64 {
    (MEMORY_SHARE * total_memory_gb / running_jobs.max(1) as f64).clamp(MIN_CEILING_GB, MAX_CEILING_GB)
}

/// Sheet dimension cap for the recognition engine, by host memory
pub fn max_sheet_dimension(total_memory_gb: f64) -> u32 {
    if total_memory_gb >= SMALL_HOST_THRESHOLD_GB {
        MAX_SHEET_DIMENSION
    } else {
        MAX_SHEET_DIMENSION_SMALL_HOST
    }
}

/// Total host memory in GB
pub fn total_memory_gb() -> f64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0)
}

/// Governs slot acquisition and per-run memory budgets
#[derive(Clone)]
pub struct ResourceGovernor {
    pool: SqlitePool,
}

impl ResourceGovernor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Acquire a running-job slot. A counter-store failure is tolerated:
    /// the job proceeds unslotted and is treated as the only run.
    pub async fn acquire_slot(&self) -> Option<Uuid> {
        match slots::acquire_slot(&self.pool).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Slot acquisition failed, proceeding unslotted: {}", e);
                None
            }
        }
    }

    /// Release a slot; double-release and unslotted runs are no-ops
    pub async fn release_slot(&self, slot: Option<Uuid>) {
        if let Some(id) = slot {
            if let Err(e) = slots::release_slot(&self.pool, id).await {
                warn!("Slot release failed: {}", e);
            }
        }
    }

    /// Current running-job count; a counter-store failure reads as zero
    /// (safe default: maximum allowed memory per run)
    pub async fn running_jobs(&self) -> u64 {
        match slots::count_active_slots(&self.pool).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Slot count unavailable, assuming no running jobs: {}", e);
                0
            }
        }
    }
}
