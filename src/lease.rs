//! Lease table: address pool, per-client lease records, expiry.
//!
//! [`LeasePool`] owns every lease plus the pool bounds and implements the
//! server-side allocation policy:
//!
//! - static MAC-to-IP reservations with unconditional precedence
//! - idempotent re-offer for retransmitted client requests
//! - honoring an in-pool requested address when it is free
//! - ascending first-free scan otherwise
//! - declined-address blacklisting
//!
//! Leases move through two states: OFFERED (sent in an OFFER, tentative)
//! and BOUND (confirmed by a REQUEST). At most one entry exists per MAC
//! and at most one live lease per IP.
//!
//! Expiry is swept lazily on the next table access; there is no background
//! timer. Every mutating call takes `now` explicitly, which keeps expiry
//! behavior deterministic under test. The pool itself is not synchronized;
//! the server guards it with a single mutex so exchanges never interleave.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::Error;

/// How long a declined address stays out of the pool.
///
/// A client DECLINE signals an address conflict; re-offering the same
/// address immediately would just bounce. There is no conflict probing, so
/// the blacklist is the only defense.
const DECLINE_COOLDOWN: Duration = Duration::from_secs(600);

/// A 6-byte client hardware address, the lease key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Wraps raw address bytes.
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Returns the raw address bytes.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    /// Parses `aa:bb:cc:dd:ee:ff` (or `-`-separated) into a [`MacAddr`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', ":");
        let mut octets = [0u8; 6];
        let mut count = 0;

        for part in normalized.split(':') {
            if count == 6 {
                count += 1;
                break;
            }
            octets[count] = u8::from_str_radix(part, 16).map_err(|_| {
                Error::InvalidConfig(format!(
                    "invalid MAC address {:?}, expecting format aa:bb:cc:dd:ee:ff",
                    s
                ))
            })?;
            count += 1;
        }

        if count != 6 {
            return Err(Error::InvalidConfig(format!(
                "invalid MAC address {:?}, expecting 6 octets",
                s
            )));
        }

        Ok(Self(octets))
    }
}

/// Lease lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// Sent in an OFFER, not yet confirmed by a REQUEST.
    Offered,
    /// Confirmed by a REQUEST.
    Bound,
}

/// One client's address assignment.
#[derive(Debug, Clone)]
pub struct Lease {
    /// The assigned IPv4 address.
    pub ip: Ipv4Addr,
    /// Absolute time after which the lease is reclaimable.
    pub expires_at: Instant,
    /// Tentative (OFFERED) or confirmed (BOUND).
    pub state: LeaseState,
}

/// The lease table: pool bounds, per-MAC leases, static reservations, and
/// the decline blacklist.
#[derive(Debug)]
pub struct LeasePool {
    pool_start: u32,
    pool_end: u32,
    lease_ttl: Duration,
    leases: HashMap<MacAddr, Lease>,
    reservations: HashMap<MacAddr, Ipv4Addr>,
    reserved_ips: HashMap<Ipv4Addr, MacAddr>,
    /// Declined addresses mapped to when their cooldown ends.
    declined: HashMap<Ipv4Addr, Instant>,
}

impl LeasePool {
    /// Creates a pool over `[pool_start, pool_end]` (inclusive) with the
    /// given TTL and static reservations.
    ///
    /// Bounds are validated by [`Config::validate`](crate::Config::validate)
    /// before the pool is built. Reserved addresses are never assigned
    /// dynamically, whether they fall inside the range or not.
    pub fn new(
        pool_start: Ipv4Addr,
        pool_end: Ipv4Addr,
        lease_ttl: Duration,
        reservations: impl IntoIterator<Item = (MacAddr, Ipv4Addr)>,
    ) -> Self {
        let reservations: HashMap<MacAddr, Ipv4Addr> = reservations.into_iter().collect();
        let reserved_ips = reservations.iter().map(|(mac, ip)| (*ip, *mac)).collect();

        Self {
            pool_start: u32::from(pool_start),
            pool_end: u32::from(pool_end),
            lease_ttl,
            leases: HashMap::new(),
            reservations,
            reserved_ips,
            declined: HashMap::new(),
        }
    }

    /// Returns true if `ip` lies within the dynamic range.
    pub fn in_pool(&self, ip: Ipv4Addr) -> bool {
        let addr = u32::from(ip);
        addr >= self.pool_start && addr <= self.pool_end
    }

    /// Returns true if a live (unexpired) lease holds `ip`.
    pub fn ip_in_use(&self, ip: Ipv4Addr, now: Instant) -> bool {
        self.leases
            .values()
            .any(|lease| lease.ip == ip && lease.expires_at > now)
    }

    /// Returns the current lease entry for `mac`, expired or not.
    pub fn lease(&self, mac: MacAddr) -> Option<&Lease> {
        self.leases.get(&mac)
    }

    /// Returns the static reservation for `mac`, if one exists.
    pub fn reservation(&self, mac: MacAddr) -> Option<Ipv4Addr> {
        self.reservations.get(&mac).copied()
    }

    /// Drops expired leases and lapsed decline entries.
    fn sweep(&mut self, now: Instant) {
        self.leases.retain(|_, lease| lease.expires_at > now);
        self.declined.retain(|_, until| *until > now);
    }

    /// Returns true if `ip` can be handed to a new client right now.
    fn assignable(&self, ip: Ipv4Addr, now: Instant) -> bool {
        !self.reserved_ips.contains_key(&ip)
            && !self.declined.contains_key(&ip)
            && !self.ip_in_use(ip, now)
    }

    /// Scans the pool in ascending address order for the first free IP.
    fn first_free(&self, now: Instant) -> Option<Ipv4Addr> {
        (self.pool_start..=self.pool_end)
            .map(Ipv4Addr::from)
            .find(|ip| self.assignable(*ip, now))
    }

    /// Finds or assigns an address for `mac`, recording the lease in the
    /// caller-specified `state` with a fresh expiry.
    ///
    /// Allocation order:
    ///
    /// 1. static reservation (returned unconditionally, never recorded)
    /// 2. the MAC's existing live entry (idempotent re-offer/re-ack)
    /// 3. `requested`, when it is in the pool and free
    /// 4. the first free address in ascending order
    ///
    /// Returns `None` when the pool is exhausted; the caller answers with
    /// NAK or stays silent.
    pub fn get_or_assign(
        &mut self,
        mac: MacAddr,
        requested: Option<Ipv4Addr>,
        state: LeaseState,
        now: Instant,
    ) -> Option<Ipv4Addr> {
        self.sweep(now);

        if let Some(&ip) = self.reservations.get(&mac) {
            return Some(ip);
        }

        if let Some(lease) = self.leases.get_mut(&mac) {
            lease.state = state;
            lease.expires_at = now + self.lease_ttl;
            return Some(lease.ip);
        }

        let ip = requested
            .filter(|ip| self.in_pool(*ip) && self.assignable(*ip, now))
            .or_else(|| self.first_free(now))?;

        self.leases.insert(
            mac,
            Lease {
                ip,
                expires_at: now + self.lease_ttl,
                state,
            },
        );
        Some(ip)
    }

    /// Confirms a REQUEST: transitions the MAC's OFFERED entry to BOUND
    /// and refreshes its expiry.
    ///
    /// A REQUEST from a MAC with no prior entry is INIT-REBOOT: the
    /// requested address is revalidated (in pool, not held by any other
    /// live lease) and bound if free. The table is authoritative at
    /// REQUEST time - the first REQUEST to arrive wins an address, and a
    /// later REQUEST for the same address by a different MAC returns
    /// `None` (NAK).
    pub fn confirm(
        &mut self,
        mac: MacAddr,
        requested: Option<Ipv4Addr>,
        now: Instant,
    ) -> Option<Ipv4Addr> {
        self.sweep(now);

        if let Some(&ip) = self.reservations.get(&mac) {
            return Some(ip);
        }

        if let Some(lease) = self.leases.get_mut(&mac)
            && (requested.is_none() || requested == Some(lease.ip))
        {
            lease.state = LeaseState::Bound;
            lease.expires_at = now + self.lease_ttl;
            return Some(lease.ip);
        }

        // INIT-REBOOT, or the client is asking for something other than
        // its recorded address: revalidate against the table.
        let ip = requested?;
        if !self.in_pool(ip) || !self.assignable(ip, now) {
            return None;
        }

        self.leases.insert(
            mac,
            Lease {
                ip,
                expires_at: now + self.lease_ttl,
                state: LeaseState::Bound,
            },
        );
        Some(ip)
    }

    /// Removes the MAC's lease immediately, regardless of TTL.
    pub fn release(&mut self, mac: MacAddr) {
        self.leases.remove(&mac);
    }

    /// Handles a DECLINE: drops the MAC's entry and blacklists the
    /// conflicted address for [`DECLINE_COOLDOWN`].
    ///
    /// Static reservations are never blacklisted; a reservation conflict
    /// is a configuration problem, not a pool problem.
    pub fn decline(&mut self, mac: MacAddr, ip: Ipv4Addr, now: Instant) {
        self.leases.remove(&mac);
        if self.in_pool(ip) && !self.reserved_ips.contains_key(&ip) {
            self.declined.insert(ip, now + DECLINE_COOLDOWN);
        }
    }

    /// Returns the count of live leases in the given state.
    pub fn count_in_state(&self, state: LeaseState, now: Instant) -> usize {
        self.leases
            .values()
            .filter(|lease| lease.state == state && lease.expires_at > now)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(3600);

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, last])
    }

    fn small_pool() -> LeasePool {
        LeasePool::new(
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 12),
            TTL,
            [],
        )
    }

    #[test]
    fn test_mac_parse_and_display() {
        let parsed: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(parsed.octets(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(parsed.to_string(), "aa:bb:cc:dd:ee:ff");

        let dashed: MacAddr = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        assert_eq!(dashed, parsed);

        assert!("aa:bb:cc".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00".parse::<MacAddr>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<MacAddr>().is_err());
        assert!("".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_discover_is_idempotent() {
        let mut pool = small_pool();
        let now = Instant::now();

        let first = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        let second = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now + Duration::from_secs(5))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(pool.lease(mac(1)).unwrap().state, LeaseState::Offered);
    }

    #[test]
    fn test_ascending_allocation() {
        let mut pool = small_pool();
        let now = Instant::now();

        let first = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        let second = pool
            .get_or_assign(mac(2), None, LeaseState::Offered, now)
            .unwrap();

        assert_eq!(first, Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(second, Ipv4Addr::new(10, 0, 0, 11));
    }

    #[test]
    fn test_requested_ip_honored_when_free() {
        let mut pool = small_pool();
        let now = Instant::now();
        let wanted = Ipv4Addr::new(10, 0, 0, 12);

        let got = pool
            .get_or_assign(mac(1), Some(wanted), LeaseState::Offered, now)
            .unwrap();
        assert_eq!(got, wanted);
    }

    #[test]
    fn test_requested_ip_outside_pool_falls_back() {
        let mut pool = small_pool();
        let now = Instant::now();

        let got = pool
            .get_or_assign(
                mac(1),
                Some(Ipv4Addr::new(192, 168, 1, 1)),
                LeaseState::Offered,
                now,
            )
            .unwrap();
        assert_eq!(got, Ipv4Addr::new(10, 0, 0, 10));
    }

    #[test]
    fn test_requested_ip_in_use_falls_back() {
        let mut pool = small_pool();
        let now = Instant::now();

        let taken = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        let got = pool
            .get_or_assign(mac(2), Some(taken), LeaseState::Offered, now)
            .unwrap();

        assert_ne!(got, taken);
    }

    #[test]
    fn test_confirm_transitions_offered_to_bound() {
        let mut pool = small_pool();
        let now = Instant::now();

        let offered = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        let confirmed = pool.confirm(mac(1), Some(offered), now).unwrap();

        assert_eq!(confirmed, offered);
        assert_eq!(pool.lease(mac(1)).unwrap().state, LeaseState::Bound);
    }

    #[test]
    fn test_confirm_without_requested_renews() {
        let mut pool = small_pool();
        let now = Instant::now();

        let offered = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        pool.confirm(mac(1), Some(offered), now).unwrap();

        let later = now + Duration::from_secs(1800);
        let renewed = pool.confirm(mac(1), None, later).unwrap();

        assert_eq!(renewed, offered);
        assert!(pool.lease(mac(1)).unwrap().expires_at > now + TTL);
    }

    #[test]
    fn test_request_for_bound_ip_of_other_mac_is_refused() {
        let mut pool = small_pool();
        let now = Instant::now();

        let ip = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        pool.confirm(mac(1), Some(ip), now).unwrap();

        assert_eq!(pool.confirm(mac(2), Some(ip), now), None);
    }

    #[test]
    fn test_request_race_first_wins() {
        let mut pool = small_pool();
        let now = Instant::now();
        let contested = Ipv4Addr::new(10, 0, 0, 10);

        // Both clients were told about the same address by whatever means;
        // the table is authoritative when the REQUESTs arrive.
        let winner = pool.confirm(mac(1), Some(contested), now);
        let loser = pool.confirm(mac(2), Some(contested), now);

        assert_eq!(winner, Some(contested));
        assert_eq!(loser, None);

        // The loser restarts discovery and is steered elsewhere.
        let reassigned = pool
            .get_or_assign(mac(2), Some(contested), LeaseState::Offered, now)
            .unwrap();
        assert_ne!(reassigned, contested);
    }

    #[test]
    fn test_init_reboot_without_requested_refused() {
        let mut pool = small_pool();
        let now = Instant::now();

        assert_eq!(pool.confirm(mac(1), None, now), None);
    }

    #[test]
    fn test_init_reboot_outside_pool_refused() {
        let mut pool = small_pool();
        let now = Instant::now();

        let outside = Ipv4Addr::new(192, 168, 1, 40);
        assert_eq!(pool.confirm(mac(1), Some(outside), now), None);
    }

    #[test]
    fn test_release_frees_address_for_next_client() {
        let mut pool = small_pool();
        let now = Instant::now();

        let ip = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        pool.confirm(mac(1), Some(ip), now).unwrap();
        pool.release(mac(1));

        assert!(!pool.ip_in_use(ip, now));
        let next = pool
            .get_or_assign(mac(3), None, LeaseState::Offered, now)
            .unwrap();
        assert_eq!(next, ip);
    }

    #[test]
    fn test_expired_lease_is_reclaimed() {
        let mut pool = small_pool();
        let now = Instant::now();

        let ip = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        pool.confirm(mac(1), Some(ip), now).unwrap();

        let after_expiry = now + TTL + Duration::from_secs(1);
        assert!(!pool.ip_in_use(ip, after_expiry));

        let reassigned = pool
            .get_or_assign(mac(2), None, LeaseState::Offered, after_expiry)
            .unwrap();
        assert_eq!(reassigned, ip);
        assert!(pool.lease(mac(1)).is_none());
    }

    #[test]
    fn test_pool_exhaustion_yields_none() {
        let mut pool = small_pool();
        let now = Instant::now();

        for index in 1..=3u8 {
            assert!(
                pool.get_or_assign(mac(index), None, LeaseState::Offered, now)
                    .is_some()
            );
        }

        assert_eq!(
            pool.get_or_assign(mac(4), None, LeaseState::Offered, now),
            None
        );
    }

    #[test]
    fn test_one_bound_lease_per_ip() {
        let mut pool = small_pool();
        let now = Instant::now();

        for index in 1..=3u8 {
            let ip = pool
                .get_or_assign(mac(index), None, LeaseState::Offered, now)
                .unwrap();
            pool.confirm(mac(index), Some(ip), now).unwrap();
        }

        let mut bound_ips: Vec<Ipv4Addr> = (1..=3u8)
            .map(|index| pool.lease(mac(index)).unwrap().ip)
            .collect();
        bound_ips.sort();
        bound_ips.dedup();
        assert_eq!(bound_ips.len(), 3);
        assert_eq!(pool.count_in_state(LeaseState::Bound, now), 3);
    }

    #[test]
    fn test_static_reservation_precedence() {
        let reserved_mac = mac(0x42);
        // Deliberately outside the dynamic range.
        let reserved_ip = Ipv4Addr::new(10, 0, 1, 5);
        let mut pool = LeasePool::new(
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 12),
            TTL,
            [(reserved_mac, reserved_ip)],
        );
        let now = Instant::now();

        assert_eq!(pool.reservation(reserved_mac), Some(reserved_ip));
        assert_eq!(pool.reservation(mac(1)), None);

        assert_eq!(
            pool.get_or_assign(reserved_mac, None, LeaseState::Offered, now),
            Some(reserved_ip)
        );
        assert_eq!(pool.confirm(reserved_mac, Some(reserved_ip), now), Some(reserved_ip));

        // Reservations never expire.
        let much_later = now + TTL + TTL;
        assert_eq!(
            pool.get_or_assign(reserved_mac, None, LeaseState::Offered, much_later),
            Some(reserved_ip)
        );
    }

    #[test]
    fn test_reserved_ip_never_assigned_dynamically() {
        let reserved_mac = mac(0x42);
        let reserved_ip = Ipv4Addr::new(10, 0, 0, 10);
        let mut pool = LeasePool::new(
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 12),
            TTL,
            [(reserved_mac, reserved_ip)],
        );
        let now = Instant::now();

        let got = pool
            .get_or_assign(mac(1), Some(reserved_ip), LeaseState::Offered, now)
            .unwrap();
        assert_ne!(got, reserved_ip);

        assert_eq!(pool.confirm(mac(2), Some(reserved_ip), now), None);
    }

    #[test]
    fn test_decline_blacklists_address() {
        let mut pool = small_pool();
        let now = Instant::now();

        let ip = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        pool.decline(mac(1), ip, now);

        assert!(pool.lease(mac(1)).is_none());
        let next = pool
            .get_or_assign(mac(2), Some(ip), LeaseState::Offered, now)
            .unwrap();
        assert_ne!(next, ip);

        // After the cooldown the address is assignable again.
        let after_cooldown = now + DECLINE_COOLDOWN + Duration::from_secs(1);
        let recycled = pool
            .get_or_assign(mac(3), Some(ip), LeaseState::Offered, after_cooldown)
            .unwrap();
        assert_eq!(recycled, ip);
    }

    #[test]
    fn test_lease_walk_scenario() {
        // Pool 10.0.0.10-10.0.0.12, TTL 3600s, three clients.
        let mut pool = small_pool();
        let now = Instant::now();

        let first = pool
            .get_or_assign(mac(1), None, LeaseState::Offered, now)
            .unwrap();
        assert_eq!(first, Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(pool.confirm(mac(1), Some(first), now), Some(first));

        let second = pool
            .get_or_assign(mac(2), None, LeaseState::Offered, now)
            .unwrap();
        assert_eq!(second, Ipv4Addr::new(10, 0, 0, 11));

        pool.release(mac(1));

        let third = pool
            .get_or_assign(mac(3), None, LeaseState::Offered, now)
            .unwrap();
        assert_eq!(third, Ipv4Addr::new(10, 0, 0, 10));
    }
}
