//! Thread pinning and timing helpers shared by the engine runner and demo
//! binary.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Spawns a Tokio task on a new thread with a specific CPU affinity.
///
/// If `core_id` is `Some`, this function will create a new thread, pin it to the
/// specified CPU core, and then spawn the given future on a single-threaded Tokio
/// runtime on that thread.
///
/// If `core_id` is `None`, it will spawn the future on the default Tokio runtime
/// without any specific affinity.
///
/// # Arguments
///
/// * `future` - The future to execute.
/// * `core_id` - The ID of the CPU core to pin the thread to.
///
/// # Returns
///
/// A `JoinHandle` for the spawned task.
pub async fn spawn_with_affinity<F, T>(future: F, core_id: Option<usize>) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match core_id {
        Some(id) => {
            let handle = tokio::task::spawn_blocking(move || {
                let core_ids = core_affinity::get_core_ids().ok_or_else(|| {
                    anyhow!("Failed to get core IDs, is this a supported platform?")
                })?;

                if core_ids.is_empty() {
                    return Err(anyhow!("No available CPU cores found."));
                }

                let target_core = core_ids.get(id).ok_or_else(|| {
                    anyhow!(
                        "Invalid core ID: {}. System has {} available cores (valid IDs are 0 to {}).",
                        id,
                        core_ids.len(),
                        core_ids.len() - 1
                    )
                })?;

                if !core_affinity::set_for_current(*target_core) {
                    warn!("Failed to set affinity for core ID: {}", id);
                }

                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                rt.block_on(future)
            });
            handle.await?
        }
        None => future.await,
    }
}

/// Get current timestamp as nanoseconds since Unix epoch
///
/// Provides high-precision timing information for performance measurement
/// and result correlation. The nanosecond precision enables accurate timing
/// even for very fast operations.
///
/// ## Returns
/// Number of nanoseconds since January 1, 1970, 00:00:00 UTC
///
/// ## Precision
///
/// The returned value has nanosecond precision on systems that support it,
/// though the actual resolution depends on system capabilities. Most modern
/// systems provide microsecond or better resolution.
///
/// ## Error Handling
///
/// If the system time is before the Unix epoch (very rare), returns 0
/// to provide a safe fallback rather than panicking.
///
/// ## Usage
///
/// - Timestamping measurement data
/// - Calculating time differences
/// - Correlating events across different system components
/// - High-precision performance measurement
pub fn current_timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
