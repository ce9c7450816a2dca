//! DTC table with pending → confirmed promotion.
//!
//! A DTC is `pending` from its first occurrence and promotes to
//! `confirmed` when it either repeats `DIAG_CONFIRM_THRESHOLD` times or
//! stays active for `DIAG_CONFIRM_TIME_MS`. Promotion emits exactly one
//! `DtcConfirmed` event; the CAN notification is flushed by the
//! communication task through [`DiagnosticStore::process_pending`].

use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ecu_common::config::ConfigError;
use ecu_common::consts::{DIAG_CONFIRM_THRESHOLD, DIAG_CONFIRM_TIME_MS, DIAG_MAX_DTC};
use ecu_common::diag::{DiagEventKind, DtcCode, DtcStatus};
use ecu_common::error::EcuError;
use ecu_common::hal::{CommsSink, tick_delta};

use crate::events::EventLog;

/// One stored diagnostic trouble code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DtcEntry {
    /// The trouble code.
    pub code: DtcCode,
    /// Status flags (`ACTIVE`, `PENDING`, `CONFIRMED`).
    pub status: DtcStatus,
    /// Tick of the first occurrence.
    pub first_occurrence: u32,
    /// Tick of the most recent occurrence.
    pub last_occurrence: u32,
    /// Tick of the most recent clear, 0 if never cleared.
    pub cleared_at: u32,
    /// Total occurrences since first stored.
    pub occurrence_count: u32,
    /// Total clears.
    pub clear_count: u32,
}

/// Aggregate counters for external reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiagnosticStatistics {
    /// Entries ever stored in the table.
    pub total_dtc_count: u32,
    /// Entries currently active.
    pub active_dtc_count: u32,
    /// Entries currently confirmed.
    pub confirmed_dtc_count: u32,
    /// Events currently held by the circular log.
    pub event_count: u32,
    /// Tick of the last housekeeping update.
    pub last_update: u32,
}

/// DTC table plus event log; the fault-data back-end for every subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticStore {
    dtc_table: Vec<DtcEntry, DIAG_MAX_DTC>,
    event_log: EventLog,
    /// Confirmed codes awaiting a CAN notification.
    notify_queue: Vec<DtcCode, DIAG_MAX_DTC>,
    active_dtc_count: u32,
    total_dtc_count: u32,
    last_update: u32,
    update_count: u32,
}

impl DiagnosticStore {
    /// Empty store.
    pub const fn new() -> Self {
        Self {
            dtc_table: Vec::new(),
            event_log: EventLog::new(),
            notify_queue: Vec::new(),
            active_dtc_count: 0,
            total_dtc_count: 0,
            last_update: 0,
            update_count: 0,
        }
    }

    // ── DTC operations ──────────────────────────────────────────────

    /// Store or re-raise a trouble code.
    ///
    /// An existing active entry gets its occurrence bumped; a cleared
    /// entry is reactivated; otherwise the code takes the first free slot.
    /// On duplicate entries (forbidden by invariant) the first match wins.
    ///
    /// # Errors
    /// `BufferFull` when the table has no free slot for a new code.
    pub fn set_dtc(&mut self, code: DtcCode, now: u32) -> Result<(), EcuError> {
        if let Some(entry) = self.dtc_table.iter_mut().find(|e| e.code == code) {
            if !entry.status.contains(DtcStatus::ACTIVE) {
                entry.status.insert(DtcStatus::ACTIVE);
                self.active_dtc_count += 1;
            }
            entry.last_occurrence = now;
            entry.occurrence_count += 1;
            // Borrow of the entry ends here; promotion re-finds it.
            self.promote_if_due(code, now);
            return Ok(());
        }

        let entry = DtcEntry {
            code,
            status: DtcStatus::ACTIVE | DtcStatus::PENDING,
            first_occurrence: now,
            last_occurrence: now,
            cleared_at: 0,
            occurrence_count: 1,
            clear_count: 0,
        };
        if self.dtc_table.push(entry).is_err() {
            warn!(code = code.code(), "DTC table full, dropping code");
            return Err(EcuError::BufferFull);
        }
        self.active_dtc_count += 1;
        self.total_dtc_count += 1;
        self.log_event(DiagEventKind::DtcSet, u32::from(code.code()), now);
        Ok(())
    }

    /// Clear a matching active entry.
    ///
    /// # Errors
    /// `InvalidParam` when no active entry with this code exists.
    pub fn clear_dtc(&mut self, code: DtcCode, now: u32) -> Result<(), EcuError> {
        let Some(entry) = self
            .dtc_table
            .iter_mut()
            .find(|e| e.code == code && e.status.contains(DtcStatus::ACTIVE))
        else {
            return Err(EcuError::InvalidParam);
        };

        entry.status.remove(DtcStatus::ACTIVE);
        entry.cleared_at = now;
        entry.clear_count += 1;
        self.active_dtc_count = self.active_dtc_count.saturating_sub(1);
        self.log_event(DiagEventKind::DtcCleared, u32::from(code.code()), now);
        Ok(())
    }

    /// Whether a code is currently active.
    pub fn is_active(&self, code: DtcCode) -> bool {
        self.dtc_table
            .iter()
            .any(|e| e.code == code && e.status.contains(DtcStatus::ACTIVE))
    }

    /// Whether a code is currently confirmed.
    pub fn is_confirmed(&self, code: DtcCode) -> bool {
        self.dtc_table
            .iter()
            .any(|e| e.code == code && e.status.contains(DtcStatus::CONFIRMED))
    }

    /// Number of active entries.
    pub fn active_count(&self) -> u32 {
        self.active_dtc_count
    }

    /// Look up one entry.
    pub fn entry(&self, code: DtcCode) -> Option<&DtcEntry> {
        self.dtc_table.iter().find(|e| e.code == code)
    }

    /// All stored entries.
    pub fn entries(&self) -> &[DtcEntry] {
        &self.dtc_table
    }

    /// Aggregate counters.
    pub fn statistics(&self) -> DiagnosticStatistics {
        DiagnosticStatistics {
            total_dtc_count: self.total_dtc_count,
            active_dtc_count: self.active_dtc_count,
            confirmed_dtc_count: self
                .dtc_table
                .iter()
                .filter(|e| e.status.contains(DtcStatus::CONFIRMED))
                .count() as u32,
            event_count: self.event_log.len() as u32,
            last_update: self.last_update,
        }
    }

    // ── Promotion & notification ────────────────────────────────────

    /// Promote every due pending entry and flush CAN notifications.
    ///
    /// Called by the communication task. Each confirmation is notified
    /// exactly once; send failures keep the code queued for the next run.
    pub fn process_pending<C: CommsSink>(&mut self, now: u32, comms: &mut C) {
        let codes: Vec<DtcCode, DIAG_MAX_DTC> = self
            .dtc_table
            .iter()
            .filter(|e| {
                e.status.contains(DtcStatus::PENDING) && e.status.contains(DtcStatus::ACTIVE)
            })
            .map(|e| e.code)
            .collect();
        for code in codes {
            self.promote_if_due(code, now);
        }

        while let Some(&code) = self.notify_queue.first() {
            if comms.send_dtc(code.code(), true).is_err() {
                warn!(code = code.code(), "DTC notification deferred");
                break;
            }
            self.notify_queue.remove(0);
        }
    }

    /// Periodic housekeeping entry point (100 ms task).
    pub fn update(&mut self, now: u32) {
        self.last_update = now;
        self.update_count += 1;
    }

    fn promote_if_due(&mut self, code: DtcCode, now: u32) {
        let Some(entry) = self.dtc_table.iter_mut().find(|e| e.code == code) else {
            return;
        };
        if !entry.status.contains(DtcStatus::PENDING) {
            return;
        }
        let aged = tick_delta(now, entry.first_occurrence) >= DIAG_CONFIRM_TIME_MS;
        if entry.occurrence_count >= DIAG_CONFIRM_THRESHOLD || aged {
            entry.status.remove(DtcStatus::PENDING);
            entry.status.insert(DtcStatus::CONFIRMED);
            debug!(code = code.code(), "DTC confirmed");
            if self.notify_queue.push(code).is_err() {
                warn!(code = code.code(), "DTC notify queue full");
            }
            self.log_event(DiagEventKind::DtcConfirmed, u32::from(code.code()), now);
        }
    }

    // ── Event log ───────────────────────────────────────────────────

    /// Append an event to the circular log.
    pub fn log_event(&mut self, kind: DiagEventKind, data: u32, now: u32) {
        self.event_log.push(kind, data, now);
    }

    /// The circular event log.
    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Persist the full store (every DTC field, every event) to TOML.
    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let text =
            toml::to_string_pretty(self).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteError(e.to_string()))
    }

    /// Restore a previously saved store; round-trips identically.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl Default for DiagnosticStore {
    fn default() -> Self {
        Self::new()
    }
}
