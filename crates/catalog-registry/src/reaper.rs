//! Stale and orphaned record collection
//!
//! The reaper runs independently of every client. Each sweep removes
//! devices and services that stopped sending heartbeats, and devices and
//! medications whose patient is gone. All removals go through the
//! registry's delete operation so back-references stay consistent.

use crate::{
    api::CatalogApi,
    clock::{Clock, SystemClock},
    config::StalenessThresholds,
    models::{Device, EntityId, Medication, Patient, Record, Service},
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Records removed by one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Removed device IDs
    pub devices: Vec<EntityId>,
    /// Removed service IDs
    pub services: Vec<EntityId>,
    /// Removed medication IDs
    pub medications: Vec<EntityId>,
    /// Registry calls that failed and are left for the next sweep
    pub failures: usize,
}

impl SweepReport {
    /// Number of records removed
    pub fn removed(&self) -> usize {
        self.devices.len() + self.services.len() + self.medications.len()
    }
}

/// Why a record is being removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Orphaned,
    Stale,
    OrphanedAndStale,
}

impl Verdict {
    fn of(orphaned: bool, stale: bool) -> Option<Self> {
        match (orphaned, stale) {
            (true, true) => Some(Verdict::OrphanedAndStale),
            (true, false) => Some(Verdict::Orphaned),
            (false, true) => Some(Verdict::Stale),
            (false, false) => None,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Verdict::Orphaned => "its patient no longer exists",
            Verdict::Stale => "it stopped sending heartbeats",
            Verdict::OrphanedAndStale => "its patient no longer exists and it stopped sending heartbeats",
        }
    }
}

/// Periodic sweeper over a catalog
pub struct Reaper<C> {
    api: C,
    thresholds: StalenessThresholds,
    clock: Arc<dyn Clock>,
}

impl<C: CatalogApi> Reaper<C> {
    /// Create a reaper using wall-clock time
    pub fn new(api: C, thresholds: StalenessThresholds) -> Self {
        Self::with_clock(api, thresholds, Arc::new(SystemClock))
    }

    /// Create a reaper with an explicit time source
    pub fn with_clock(api: C, thresholds: StalenessThresholds, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            thresholds,
            clock,
        }
    }

    /// Run one sweep
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.clock.now();

        self.sweep_devices(now, &mut report).await;
        self.sweep_services(now, &mut report).await;
        self.sweep_medications(&mut report).await;
        report
    }

    /// Sweep every `interval`, forever
    pub async fn run(&self, interval: Duration) {
        info!("Reaper sweeping every {:?}", interval);
        loop {
            let report = self.sweep().await;
            if report.removed() > 0 || report.failures > 0 {
                info!(
                    "Sweep removed {} devices, {} services, {} medications ({} failed calls)",
                    report.devices.len(),
                    report.services.len(),
                    report.medications.len(),
                    report.failures
                );
            } else {
                debug!("Sweep found nothing to remove");
            }
            async_io::Timer::after(interval).await;
        }
    }

    async fn sweep_devices(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let Some(devices) = self.fetch::<Device>(report).await else {
            return;
        };
        if devices.is_empty() {
            return;
        }
        let Some(patients) = self.patient_ids(report).await else {
            return;
        };

        let threshold = self.thresholds.devices();
        for device in devices {
            let orphaned = !patients.contains(&device.patient_id);
            let stale = is_stale(&device, now, threshold);
            if let Some(verdict) = Verdict::of(orphaned, stale) {
                if self.remove::<Device>(&device, verdict, report).await {
                    report.devices.push(device.id);
                }
            }
        }
    }

    async fn sweep_services(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let Some(services) = self.fetch::<Service>(report).await else {
            return;
        };

        let threshold = self.thresholds.services();
        for service in services {
            if is_stale(&service, now, threshold)
                && self.remove::<Service>(&service, Verdict::Stale, report).await
            {
                report.services.push(service.id);
            }
        }
    }

    async fn sweep_medications(&self, report: &mut SweepReport) {
        let Some(medications) = self.fetch::<Medication>(report).await else {
            return;
        };
        if medications.is_empty() {
            return;
        }
        let Some(patients) = self.patient_ids(report).await else {
            return;
        };

        for medication in medications {
            if !patients.contains(&medication.patient_id)
                && self.remove::<Medication>(&medication, Verdict::Orphaned, report).await
            {
                report.medications.push(medication.id);
            }
        }
    }

    async fn fetch<R: Record>(&self, report: &mut SweepReport) -> Option<Vec<R>> {
        match self.api.list_records::<R>().await {
            Ok(records) => Some(records),
            Err(e) => {
                warn!("Failed to list {}, skipping until next sweep: {}", R::COLLECTION, e);
                report.failures += 1;
                None
            }
        }
    }

    async fn patient_ids(&self, report: &mut SweepReport) -> Option<HashSet<EntityId>> {
        let patients = self.fetch::<Patient>(report).await?;
        Some(patients.into_iter().map(|p| p.id).collect())
    }

    async fn remove<R: Record>(&self, record: &R, verdict: Verdict, report: &mut SweepReport) -> bool {
        match self.api.delete_record::<R>(record.id()).await {
            Ok(_) => {
                info!("Removed {}: {}", record.describe(), verdict.reason());
                true
            }
            Err(e) if e.is_not_found() => {
                debug!("{} already gone", record.describe());
                false
            }
            Err(e) => {
                warn!("Failed to remove {}, retrying next sweep: {}", record.describe(), e);
                report.failures += 1;
                false
            }
        }
    }
}

/// Whether a record has gone longer than `threshold` without an update
///
/// Records that were never stamped count as stale.
pub fn is_stale<R: Record>(record: &R, now: DateTime<Utc>, threshold: Duration) -> bool {
    match record.last_update() {
        Some(at) => (now - at).to_std().is_ok_and(|age| age > threshold),
        None => true,
    }
}
