//! The load-reserved/store-conditional reservation, backing the bus lock `LR`/`SC` rely on for
//! their atomicity.
//!
//! > Complying with the forward progress semantic requires that practical implementations never
//! > fail an SC that immediately follows a matching LR. Complying with the broader forward
//! > progress property is more complex, as it requires ensuring that a hart will eventually
//! > succeed with an SC.
//!
//! On real multi-hart hardware this is backed by a bus-wide exclusive lock: `LR` takes the lock
//! and records an address, a competing hart's `LR`/AMO steals the lock and so invalidates the
//! reservation, and `SC` only succeeds while the lock is still held by the same hart for the same
//! address. Since [`super::Core`] supports exactly one hart, there is no other hart that could
//! ever steal the lock — so holding or not holding the reservation *is* holding or not holding the
//! lock, and the only remaining way a reservation can be lost before a matching `SC` is the
//! forward-progress timeout below.

/// Number of additional instructions (beyond the `LR` itself) an `LR`/`SC` pair is guaranteed to
/// retire within before the reservation is forfeited regardless of whether a conflicting access
/// occurred. Mirrors the 16-instruction window real single-hart VP implementations use as a safe
/// over-approximation of "forward progress eventually happens".
const FORWARD_PROGRESS_LIMIT: u32 = 16;

/// Tracks the address reserved by the most recent `LR`, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reservation {
    address: Option<u32>,
    /// Instructions left to retire before the reservation lapses on its own. Only meaningful
    /// while `address.is_some()`.
    countdown: u32,
}

impl Reservation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a reservation on `address`, as performed by `LR`. Replaces any reservation
    /// already held.
    pub fn acquire(&mut self, address: u32) {
        self.address = Some(address);
        self.countdown = FORWARD_PROGRESS_LIMIT;
    }

    /// Attempts to consume the reservation for a matching `SC` at `address`.
    ///
    /// Returns `true` (the store proceeds) iff a live reservation for this exact address is
    /// held. Either way, the reservation is extinguished: a non-matching or expired `SC` still
    /// clears any reservation that happened to be held, matching the ISA's requirement that an
    /// `SC` always terminates its hart's reservation.
    pub fn try_release(&mut self, address: u32) -> bool {
        let success = self.address == Some(address);
        self.address = None;
        success
    }

    /// Called once per retired instruction to age the reservation; forfeits it once the
    /// forward-progress window has elapsed without a matching `SC`.
    pub fn tick(&mut self) {
        if self.address.is_some() {
            if self.countdown == 0 {
                self.address = None;
            } else {
                self.countdown -= 1;
            }
        }
    }

    /// Unconditionally forfeits any held reservation. Called on trap entry, mirroring real
    /// implementations freeing the bus lock before running a trap/interrupt handler.
    pub fn release(&mut self) {
        self.address = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lr_sc_success() {
        let mut reservation = Reservation::new();
        reservation.acquire(0x1000);
        assert!(reservation.try_release(0x1000));
    }

    #[test]
    fn test_sc_to_different_address_fails() {
        let mut reservation = Reservation::new();
        reservation.acquire(0x1000);
        assert!(!reservation.try_release(0x2000));
    }

    #[test]
    fn test_sc_without_lr_fails() {
        let mut reservation = Reservation::new();
        assert!(!reservation.try_release(0x1000));
    }

    #[test]
    fn test_sc_extinguishes_reservation_even_on_failure() {
        let mut reservation = Reservation::new();
        reservation.acquire(0x1000);
        assert!(!reservation.try_release(0x2000));
        assert!(!reservation.try_release(0x1000));
    }

    #[test]
    fn test_forward_progress_expiry() {
        let mut reservation = Reservation::new();
        reservation.acquire(0x1000);
        for _ in 0..=FORWARD_PROGRESS_LIMIT {
            reservation.tick();
        }
        assert!(!reservation.try_release(0x1000));
    }

    #[test]
    fn test_immediate_sc_survives_one_tick() {
        let mut reservation = Reservation::new();
        reservation.acquire(0x1000);
        reservation.tick();
        assert!(reservation.try_release(0x1000));
    }

    #[test]
    fn test_trap_releases_reservation() {
        let mut reservation = Reservation::new();
        reservation.acquire(0x1000);
        reservation.release();
        assert!(!reservation.try_release(0x1000));
    }
}
