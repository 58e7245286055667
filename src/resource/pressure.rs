use std::sync::atomic::{AtomicU64, Ordering};

/// Cost signal for native memory owned by live wrappers.
///
/// Owning arrays add their backing-buffer size when constructed and remove the
/// same value when released, so `current()` tracks the unmanaged footprint that
/// Rust-side accounting would otherwise not see.
#[derive(Debug, Default)]
pub struct MemoryPressure {
    current: AtomicU64,
    peak: AtomicU64,
    registrations: AtomicU64,
    warn_threshold: Option<u64>,
}

impl MemoryPressure {
    pub fn new(warn_threshold: Option<u64>) -> Self {
        MemoryPressure {
            warn_threshold,
            ..Default::default()
        }
    }

    pub fn add(&self, bytes: u64) {
        let previous = self.current.fetch_add(bytes, Ordering::SeqCst);
        let now = previous.saturating_add(bytes);
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(limit) = self.warn_threshold {
            if previous <= limit && now > limit {
                tracing::warn!(current = now, limit, "native memory pressure above threshold");
            }
        }
    }

    pub fn remove(&self, bytes: u64) {
        let result = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                Some(cur.saturating_sub(bytes))
            });
        if let Ok(previous) = result {
            if previous < bytes {
                tracing::error!(
                    registered = previous,
                    removed = bytes,
                    "memory pressure removal exceeds registered amount"
                );
            }
        }
        self.registrations.fetch_sub(1, Ordering::SeqCst);
    }

    /// Bytes currently registered.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of registrations not yet reversed.
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn warn_threshold(&self) -> Option<u64> {
        self.warn_threshold
    }
}
