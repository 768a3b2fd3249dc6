//! CPU-level primitives for spin-based coordination and benchmarking.
//!
//! Two free functions, both thin wrappers over hardware instructions:
//!
//! - [`pause()`]: spin-loop hint so a sibling hardware thread can make progress
//! - [`cycle_counter()`]: raw hardware cycle/tick counter
//!
//! The implementation is chosen at build time per architecture:
//!
//! | Target | `pause()` | `cycle_counter()` |
//! |--------|-----------|-------------------|
//! | x86 / x86_64 | `PAUSE` | `RDTSC` |
//! | aarch64 | `YIELD` / `ISB` | `CNTVCT_EL0` (virtual counter) |
//! | 32-bit ARM | `YIELD` | sentinel `0` |
//! | anything else | no-op | sentinel `0` |
//!
//! Neither function allocates, locks, or enters the kernel, so both are safe to
//! call from the audio thread. `pause()` is meant for non-real-time threads
//! waiting on state the audio thread publishes; the audio thread itself never
//! spins.

// Inline asm and the RDTSC intrinsic need `unsafe`; nothing else in the crate does.
#![allow(unsafe_code)]

/// Value returned by [`cycle_counter()`] on targets without a usable counter.
///
/// 32-bit ARM cores (older phones in particular) keep the PMU cycle counter
/// behind a privilege bit, so reading it from user space either traps or
/// returns zero depending on the device. Rather than guess, those targets
/// always report this sentinel.
pub const CYCLE_COUNTER_UNSUPPORTED: u64 = 0;

/// Whether [`cycle_counter()`] reads a real hardware counter on this target.
pub const CYCLE_COUNTER_AVAILABLE: bool = cfg!(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "aarch64"
));

/// Hints to the CPU that the current core is busy-waiting.
///
/// Compiles to `PAUSE` on x86, `YIELD` (or `ISB` on newer toolchains) on ARM
/// and to nothing on other architectures. Never yields to the OS scheduler.
#[inline(always)]
pub fn pause() {
    core::hint::spin_loop();
}

/// Reads the hardware cycle counter.
///
/// Monotonic within a core modulo wraparound. Epoch and rate are platform
/// defined: on x86 this is the TSC, on aarch64 the virtual timer count (which
/// ticks at `CNTFRQ_EL0`, not the core clock). Values are not comparable across
/// cores or after a thread migrates.
///
/// Returns [`CYCLE_COUNTER_UNSUPPORTED`] where no counter is readable.
#[inline]
#[allow(unused_unsafe)]
pub fn cycle_counter() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: RDTSC has no memory effects and is available on every x86_64 CPU.
        unsafe {
            core::arch::x86_64::_rdtsc()
        }
    }
    #[cfg(target_arch = "x86")]
    {
        // SAFETY: as above; every CPU Rust targets for `x86` implements RDTSC.
        unsafe {
            core::arch::x86::_rdtsc()
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        let ticks: u64;
        // SAFETY: CNTVCT_EL0 is readable from EL0 on every aarch64 OS we target.
        unsafe {
            core::arch::asm!(
                "isb",
                "mrs {ticks}, cntvct_el0",
                ticks = out(reg) ticks,
                options(nomem, nostack, preserves_flags),
            );
        }
        ticks
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
    {
        CYCLE_COUNTER_UNSUPPORTED
    }
}

/// Elapsed counter ticks from `start` to `end`, tolerating one wraparound.
#[inline]
pub fn cycles_between(start: u64, end: u64) -> u64 {
    end.wrapping_sub(start)
}
