use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// A snapshot of cursor profiling metrics.
///
/// Profiling is enabled via the `DBUTILS_PROFILE` environment variable and
/// tracks how much time the chunking engine spends in each round trip it
/// issues against the backing store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorProfileSnapshot {
    /// Total nanoseconds spent fetching chunks.
    pub chunk_fetch_ns: u64,
    /// Number of chunk fetches.
    pub chunk_fetch_count: u64,
    /// Total nanoseconds spent computing MIN/MAX key bounds.
    pub bounds_ns: u64,
    /// Number of MIN/MAX aggregates issued.
    pub bounds_count: u64,
    /// Total nanoseconds spent in keyed bulk attaches.
    pub attach_ns: u64,
    /// Number of keyed bulk attaches that reached the store.
    pub attach_count: u64,
    /// Total nanoseconds spent in per-chunk callbacks.
    pub callback_ns: u64,
    /// Number of callback invocations.
    pub callback_count: u64,
    /// Rows handed to callers by chunking cursors.
    pub rows_yielded: u64,
}

#[derive(Default)]
struct CursorProfileCounters {
    chunk_fetch_ns: AtomicU64,
    chunk_fetch_count: AtomicU64,
    bounds_ns: AtomicU64,
    bounds_count: AtomicU64,
    attach_ns: AtomicU64,
    attach_count: AtomicU64,
    callback_ns: AtomicU64,
    callback_count: AtomicU64,
    rows_yielded: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<CursorProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("DBUTILS_PROFILE").is_some())
}

fn counters() -> Option<&'static CursorProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(CursorProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum CursorProfileKind {
    /// One chunk or page fetch.
    ChunkFetch,
    /// MIN/MAX bound aggregate.
    Bounds,
    /// Keyed bulk attach round trip.
    Attach,
    /// One per-chunk callback invocation.
    Callback,
}

pub(crate) fn record_profile_timer(kind: CursorProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    let (ns, count) = match kind {
        CursorProfileKind::ChunkFetch => (&counters.chunk_fetch_ns, &counters.chunk_fetch_count),
        CursorProfileKind::Bounds => (&counters.bounds_ns, &counters.bounds_count),
        CursorProfileKind::Attach => (&counters.attach_ns, &counters.attach_count),
        CursorProfileKind::Callback => (&counters.callback_ns, &counters.callback_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_rows_yielded(rows: u64) {
    if let Some(counters) = counters() {
        counters.rows_yielded.fetch_add(rows, Ordering::Relaxed);
    }
}

/// Retrieves a snapshot of current cursor profiling metrics.
///
/// When `reset` is true every counter is zeroed after being read. Returns
/// `None` when profiling is disabled.
///
/// ```no_run
/// use dbutils::query::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(false) {
///     println!("chunk fetches: {}", snapshot.chunk_fetch_count);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<CursorProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(CursorProfileSnapshot {
        chunk_fetch_ns: load(&counters.chunk_fetch_ns),
        chunk_fetch_count: load(&counters.chunk_fetch_count),
        bounds_ns: load(&counters.bounds_ns),
        bounds_count: load(&counters.bounds_count),
        attach_ns: load(&counters.attach_ns),
        attach_count: load(&counters.attach_count),
        callback_ns: load(&counters.callback_ns),
        callback_count: load(&counters.callback_count),
        rows_yielded: load(&counters.rows_yielded),
    })
}
