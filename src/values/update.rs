//! In-place value mutation under the seqlock discipline
//!
//! Fixed-width numeric updates fit one atomically writable unit and skip
//! the generation bump. String and multi-field updates always run inside a
//! generation critical section, serialized between the writer's threads by
//! the registry's internal mutex.

use std::mem::offset_of;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::catalog::MetricType;
use crate::error::{Result, ShmStatsError};
use crate::layout::constants::{SENTINEL_VALUE, STRING_MAX};
use crate::layout::headers::ValueBlock;
use crate::region::writer::write_string_slot;
use crate::region::MappedRegistry;

use super::handle::ValueHandle;

/// An in-progress elapsed-time measurement
///
/// Returned by [`MappedRegistry::interval_start`]; stays valid until ended
/// or the region is torn down. Ending consumes the handle.
#[derive(Debug)]
pub struct TimerHandle {
    handle: ValueHandle,
    started_at: u64,
}

impl MappedRegistry {
    /// Add `delta` to a numeric value slot
    ///
    /// Meaningful for counter semantics but only type-checked as
    /// numeric-vs-string. A single 8-byte atomic update, no generation
    /// bump needed.
    pub fn increment(&self, handle: &ValueHandle, delta: f64) -> Result<()> {
        let slot = self.payload_atomic(handle)?;
        let sentinel = self.registry().flags().sentinel;
        let mut current = slot.load(Ordering::Relaxed);
        loop {
            let effective = if sentinel && current == SENTINEL_VALUE {
                encode(handle.mtype, 0.0)
            } else {
                current
            };
            let next = apply_delta(handle.mtype, effective, delta);
            match slot.compare_exchange_weak(current, next, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// Overwrite a numeric value slot
    pub fn set(&self, handle: &ValueHandle, value: f64) -> Result<()> {
        let slot = self.payload_atomic(handle)?;
        slot.store(encode(handle.mtype, value), Ordering::Release);
        Ok(())
    }

    /// Copy `text` into a string value slot
    ///
    /// Truncates to `max_len` bytes (bounded by the slot capacity) and
    /// always NUL-terminates. String writes span multiple bytes, so they
    /// always run under the generation bump.
    pub fn set_string(&self, handle: &ValueHandle, text: &str, max_len: usize) -> Result<()> {
        if handle.mtype != MetricType::String {
            return Err(ShmStatsError::type_mismatch(
                &handle.metric_name,
                "set_string on a non-string metric",
            ));
        }
        let base = self.active_base()?;
        let len = text.len().min(max_len).min(STRING_MAX - 1);

        let _guard = self.write_lock.lock().unwrap();
        self.generation.begin_write();
        unsafe {
            write_string_slot(base, handle.string_offset, &text.as_bytes()[..len]);
            let extra = base.add(handle.offset as usize + offset_of!(ValueBlock, extra));
            (*(extra as *const AtomicU64)).store(len as u64, Ordering::Relaxed);
        }
        self.generation.end_write();
        Ok(())
    }

    /// Record the start of an elapsed-time interval
    ///
    /// Stores the current monotonic timestamp in the slot's scratch field
    /// and returns the handle that [`interval_end`](Self::interval_end)
    /// consumes.
    pub fn interval_start(
        &self,
        metric: &str,
        instance: Option<&str>,
    ) -> Result<TimerHandle> {
        let handle = self.lookup(metric, instance)?;
        if handle.mtype != MetricType::Elapsed {
            return Err(ShmStatsError::type_mismatch(
                metric,
                "interval timing requires an elapsed-time metric",
            ));
        }
        let started_at = monotonic_nanos();
        self.extra_atomic(&handle)?.store(started_at, Ordering::Release);
        Ok(TimerHandle { handle, started_at })
    }

    /// Accumulate the elapsed time since the paired start into the value
    ///
    /// Fails with InvalidState when the scratch slot holds no matching
    /// start (never started, already ended, or superseded by a newer
    /// start); the value is left untouched in that case.
    pub fn interval_end(&self, timer: TimerHandle) -> Result<()> {
        let extra = self.extra_atomic(&timer.handle)?;
        let recorded = extra.load(Ordering::Acquire);
        if recorded == 0 || recorded != timer.started_at {
            return Err(ShmStatsError::invalid_state(format!(
                "no matching interval start for metric '{}'",
                timer.handle.metric_name
            )));
        }
        let elapsed_us = monotonic_nanos().saturating_sub(recorded) / 1_000;

        // Two fields change together, so this is a generation-bumped batch
        let slot = self.payload_atomic(&timer.handle)?;
        let _guard = self.write_lock.lock().unwrap();
        self.generation.begin_write();
        let current = slot.load(Ordering::Relaxed);
        slot.store(current.wrapping_add(elapsed_us), Ordering::Relaxed);
        extra.store(0, Ordering::Relaxed);
        self.generation.end_write();
        Ok(())
    }

    /// Name-based convenience: add `delta` to a metric's value
    pub fn add(&self, metric: &str, instance: Option<&str>, delta: f64) -> Result<()> {
        let handle = self.lookup(metric, instance)?;
        self.increment(&handle, delta)
    }

    /// Name-based convenience: add one to a metric's value
    pub fn inc(&self, metric: &str, instance: Option<&str>) -> Result<()> {
        self.add(metric, instance, 1.0)
    }

    /// Name-based convenience: overwrite a metric's value
    pub fn set_named(&self, metric: &str, instance: Option<&str>, value: f64) -> Result<()> {
        let handle = self.lookup(metric, instance)?;
        self.set(&handle, value)
    }

    /// Name-based convenience: overwrite a string metric's value
    pub fn set_string_named(
        &self,
        metric: &str,
        instance: Option<&str>,
        text: &str,
    ) -> Result<()> {
        let handle = self.lookup(metric, instance)?;
        self.set_string(&handle, text, STRING_MAX - 1)
    }

    /// Add `delta` to `primary`, falling back to `secondary` when the
    /// primary metric is not in the catalog
    ///
    /// Resolution is primary-then-secondary, never the reverse. When both
    /// metrics exist but disagree on having an instance domain, the call
    /// is rejected instead of guessing which shape the caller meant.
    pub fn add_fallback(
        &self,
        primary: &str,
        secondary: &str,
        instance: Option<&str>,
        delta: f64,
    ) -> Result<()> {
        let handle = self.lookup_fallback(primary, secondary, instance)?;
        self.increment(&handle, delta)
    }

    /// As [`add_fallback`](Self::add_fallback) with a delta of one
    pub fn inc_fallback(
        &self,
        primary: &str,
        secondary: &str,
        instance: Option<&str>,
    ) -> Result<()> {
        self.add_fallback(primary, secondary, instance, 1.0)
    }

    fn lookup_fallback(
        &self,
        primary: &str,
        secondary: &str,
        instance: Option<&str>,
    ) -> Result<ValueHandle> {
        let primary_desc = self.registry().metric(primary);
        let secondary_desc = self.registry().metric(secondary);
        if let (Some(p), Some(s)) = (primary_desc, secondary_desc) {
            if p.indom.is_some() != s.indom.is_some() {
                return Err(ShmStatsError::validation(format!(
                    "fallback metrics '{}' and '{}' differ in instance domain shape",
                    primary, secondary
                )));
            }
        }
        match primary_desc {
            Some(_) => self.lookup(primary, instance),
            None => self.lookup(secondary, instance),
        }
    }

    fn payload_atomic(&self, handle: &ValueHandle) -> Result<&AtomicU64> {
        if handle.mtype == MetricType::String {
            return Err(ShmStatsError::type_mismatch(
                &handle.metric_name,
                "numeric operation on a string metric",
            ));
        }
        let base = self.active_base()?;
        let offset = handle.offset as usize + offset_of!(ValueBlock, payload);
        Ok(unsafe { &*(base.add(offset) as *const AtomicU64) })
    }

    fn extra_atomic(&self, handle: &ValueHandle) -> Result<&AtomicU64> {
        let base = self.active_base()?;
        let offset = handle.offset as usize + offset_of!(ValueBlock, extra);
        Ok(unsafe { &*(base.add(offset) as *const AtomicU64) })
    }
}

/// Encode an f64 into the slot representation for a metric type
fn encode(mtype: MetricType, value: f64) -> u64 {
    match mtype {
        MetricType::I32 => (value as i32) as u32 as u64,
        MetricType::U32 => (value as u32) as u64,
        MetricType::I64 => (value as i64) as u64,
        MetricType::U64 | MetricType::Elapsed => value as u64,
        MetricType::Float => (value as f32).to_bits() as u64,
        MetricType::Double => value.to_bits(),
        MetricType::String => 0,
    }
}

/// Apply a delta to the current slot bits per the metric type
fn apply_delta(mtype: MetricType, current: u64, delta: f64) -> u64 {
    match mtype {
        MetricType::I32 => {
            ((current as u32 as i32).wrapping_add(delta as i32)) as u32 as u64
        }
        MetricType::U32 => ((current as u32).wrapping_add(delta as u32)) as u64,
        MetricType::I64 => ((current as i64).wrapping_add(delta as i64)) as u64,
        MetricType::U64 | MetricType::Elapsed => current.wrapping_add(delta as u64),
        MetricType::Float => {
            (f32::from_bits(current as u32) + delta as f32).to_bits() as u64
        }
        MetricType::Double => (f64::from_bits(current) + delta).to_bits(),
        MetricType::String => current,
    }
}

/// Monotonic clock reading in nanoseconds
///
/// The raw value lands in the shared region, so it has to come from a
/// clock meaningful across processes; `Instant` is opaque and won't do.
pub(crate) fn monotonic_nanos() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC cannot fail with a valid timespec pointer
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_apply_integer_types() {
        assert_eq!(apply_delta(MetricType::U64, 40, 2.0), 42);
        assert_eq!(apply_delta(MetricType::I64, (-5i64) as u64, 3.0) as i64, -2);
        assert_eq!(apply_delta(MetricType::U32, 7, 1.0), 8);
        assert_eq!(
            apply_delta(MetricType::I32, (-1i32) as u32 as u64, -1.0) as u32 as i32,
            -2
        );
    }

    #[test]
    fn test_encode_apply_float_types() {
        let bits = encode(MetricType::Double, 1.5);
        let bumped = apply_delta(MetricType::Double, bits, 0.25);
        assert_eq!(f64::from_bits(bumped), 1.75);

        let bits = encode(MetricType::Float, 2.0);
        let bumped = apply_delta(MetricType::Float, bits, 0.5);
        assert_eq!(f32::from_bits(bumped as u32), 2.5);
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }
}
