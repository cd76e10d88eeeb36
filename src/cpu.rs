use lazy_static::lazy_static;

lazy_static! {
    static ref CPUS: usize = num_cpus::get();
}

/// Number of logical cpus, read once per process.
#[inline]
pub fn cpus() -> usize {
    *CPUS
}

/// Busy-waiting only makes progress when the lock holder can run on another cpu.
///
/// On a single cpu the holder is descheduled while we spin, so yielding is the only useful thing
/// to do.
#[inline]
pub fn spinning_pays_off() -> bool {
    cpus() > 1
}
