//! Cache Entry Module
//!
//! Defines stored items and the two time types used for expiry: `Ttl`, a
//! lifetime policy, and `Expiration`, a point in time an item stops being
//! valid.

use std::time::{Duration, Instant};

// == Ttl ==
/// How long an item lives after it is written or renewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Items never expire
    Never,
    /// Items expire this long after being written or renewed
    After(Duration),
}

impl Ttl {
    /// Builds a `Ttl` from a duration, treating zero as `Never`.
    pub fn from_duration(duration: Duration) -> Self {
        if duration.is_zero() {
            Ttl::Never
        } else {
            Ttl::After(duration)
        }
    }

    /// Maps `After(0)` to `Never`, matching `from_duration`.
    pub fn normalized(self) -> Self {
        match self {
            Ttl::After(duration) => Ttl::from_duration(duration),
            Ttl::Never => Ttl::Never,
        }
    }

    /// Returns true if this policy gives items a finite lifetime.
    pub fn is_finite(&self) -> bool {
        matches!(self, Ttl::After(_))
    }

    /// Computes the expiration for an item written at `now`.
    pub fn expiration_from(&self, now: Instant) -> Expiration {
        match *self {
            Ttl::Never => Expiration::Never,
            Ttl::After(ttl) => match now.checked_add(ttl) {
                Some(at) => Expiration::At(at),
                None => Expiration::Never,
            },
        }
    }
}

// == Expiration ==
/// The point in time an item stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// The item never expires
    Never,
    /// The item expires once this instant has passed
    At(Instant),
}

impl Expiration {
    /// Checks if the expiration has passed as of `now`.
    ///
    /// Boundary condition: an item is expired only when `now` is strictly
    /// after its expiration instant.
    pub fn expired_at(&self, now: Instant) -> bool {
        match *self {
            Expiration::Never => false,
            Expiration::At(at) => now > at,
        }
    }

    /// Returns the expiration instant, or None if the item never expires.
    pub fn instant(&self) -> Option<Instant> {
        match *self {
            Expiration::Never => None,
            Expiration::At(at) => Some(at),
        }
    }

    /// Returns true if moving to `candidate` would push the expiration
    /// strictly forward. `Never` is never renewed, in either direction.
    pub fn renews_to(&self, candidate: Expiration) -> bool {
        match (*self, candidate) {
            (Expiration::At(current), Expiration::At(next)) => next > current,
            _ => false,
        }
    }
}

// == Item ==
/// A stored value with its expiration.
#[derive(Debug, Clone)]
pub struct Item<V> {
    /// The stored value
    pub value: V,
    /// When the item stops being valid
    pub expires_at: Expiration,
}

impl<V> Item<V> {
    /// Creates a new item.
    pub fn new(value: V, expires_at: Expiration) -> Self {
        Self { value, expires_at }
    }

    /// Checks if the item has expired as of `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.expired_at(now)
    }
}
