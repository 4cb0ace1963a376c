// ABOUTME: Host port allocation for sandbox exposed ports
// ABOUTME: Keeps in-process reservations so concurrent starts never hand out the same port

use rand::Rng;
use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("No free host port in range {start}-{end}")]
    Exhausted { start: u16, end: u16 },

    #[error("Invalid port range {start}-{end}")]
    InvalidRange { start: u16, end: u16 },
}

/// Hands out free host ports from a fixed range.
///
/// A port stays reserved for as long as the returned [`PortReservation`] is
/// alive, which covers the window between picking a port and the container
/// runtime actually binding it.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    start: u16,
    end: u16,
    reserved: Arc<Mutex<HashSet<u16>>>,
}

impl PortAllocator {
    pub fn new(start: u16, end: u16) -> Result<Self, PortError> {
        if start == 0 || start > end {
            return Err(PortError::InvalidRange { start, end });
        }
        Ok(Self {
            start,
            end,
            reserved: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn range(&self) -> (u16, u16) {
        (self.start, self.end)
    }

    /// Reserve `count` distinct free ports
    pub fn allocate(&self, count: usize) -> Result<PortReservation, PortError> {
        let mut reservation = PortReservation {
            ports: Vec::with_capacity(count),
            reserved: Arc::clone(&self.reserved),
        };

        let mut reserved = lock(&self.reserved);
        for _ in 0..count {
            let port = self.pick(&mut reserved)?;
            reservation.ports.push(port);
        }

        debug!("Reserved host ports {:?}", reservation.ports);
        Ok(reservation)
    }

    /// Check every reserved port is still bindable, swapping out any that
    /// something outside this process grabbed since it was picked.
    pub fn reverify(&self, reservation: &mut PortReservation) -> Result<(), PortError> {
        let mut reserved = lock(&self.reserved);
        for slot in reservation.ports.iter_mut() {
            if is_port_free(*slot) {
                continue;
            }
            let replacement = self.pick(&mut reserved)?;
            warn!(
                "Host port {} was taken after allocation, using {} instead",
                slot, replacement
            );
            reserved.remove(slot);
            *slot = replacement;
        }
        Ok(())
    }

    /// Scan the whole range, wrapping around from a random starting point
    /// so separate processes sharing the range rarely race for one port.
    fn pick(&self, reserved: &mut HashSet<u16>) -> Result<u16, PortError> {
        let span = u32::from(self.end - self.start) + 1;
        let offset = rand::thread_rng().gen_range(0..span);

        for step in 0..span {
            let port = self.start + ((offset + step) % span) as u16;
            if !reserved.contains(&port) && is_port_free(port) {
                reserved.insert(port);
                return Ok(port);
            }
        }

        Err(PortError::Exhausted {
            start: self.start,
            end: self.end,
        })
    }
}

/// Ports held for one sandbox start; released on drop
#[derive(Debug)]
pub struct PortReservation {
    ports: Vec<u16>,
    reserved: Arc<Mutex<HashSet<u16>>>,
}

impl PortReservation {
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        let mut reserved = lock(&self.reserved);
        for port in &self.ports {
            reserved.remove(port);
        }
    }
}

/// Check if port is available on every interface
pub fn is_port_free(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

fn lock(set: &Mutex<HashSet<u16>>) -> MutexGuard<'_, HashSet<u16>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_port() -> u16 {
        portpicker::pick_unused_port().expect("no free port on test host")
    }

    #[test]
    fn test_rejects_invalid_range() {
        assert_eq!(
            PortAllocator::new(2000, 1000).unwrap_err(),
            PortError::InvalidRange {
                start: 2000,
                end: 1000
            }
        );
        assert!(PortAllocator::new(0, 10).is_err());
    }

    #[test]
    fn test_allocated_ports_are_distinct_and_in_range() {
        let allocator = PortAllocator::new(20000, 60000).unwrap();
        let reservation = allocator.allocate(5).unwrap();
        let ports = reservation.ports().to_vec();

        assert_eq!(ports.len(), 5);
        let unique: HashSet<u16> = ports.iter().copied().collect();
        assert_eq!(unique.len(), 5);
        assert!(ports.iter().all(|p| (20000..=60000).contains(p)));
    }

    #[test]
    fn test_small_range_is_fully_used() {
        let allocator = PortAllocator::new(41000, 41009).unwrap();
        let free: HashSet<u16> = (41000..=41009).filter(|p| is_port_free(*p)).collect();

        let reservation = allocator.allocate(free.len()).unwrap();
        let picked: HashSet<u16> = reservation.ports().iter().copied().collect();
        assert_eq!(picked, free);
        assert!(allocator.allocate(1).is_err());
    }

    #[test]
    fn test_reservation_blocks_reuse_until_dropped() {
        let port = free_port();
        let allocator = PortAllocator::new(port, port).unwrap();

        let first = allocator.allocate(1).unwrap();
        assert_eq!(first.ports(), &[port]);
        assert_eq!(
            allocator.allocate(1).unwrap_err(),
            PortError::Exhausted {
                start: port,
                end: port
            }
        );

        drop(first);
        assert_eq!(allocator.allocate(1).unwrap().ports(), &[port]);
    }

    #[test]
    fn test_clones_share_reservations() {
        let port = free_port();
        let allocator = PortAllocator::new(port, port).unwrap();
        let clone = allocator.clone();

        let _held = allocator.allocate(1).unwrap();
        assert!(clone.allocate(1).is_err());
    }

    #[test]
    fn test_bound_port_is_skipped() {
        let port = free_port();
        let _listener = TcpListener::bind(("0.0.0.0", port)).unwrap();
        let allocator = PortAllocator::new(port, port).unwrap();
        assert!(allocator.allocate(1).is_err());
    }

    #[test]
    fn test_reverify_detects_port_taken_after_allocation() {
        let port = free_port();
        let allocator = PortAllocator::new(port, port).unwrap();
        let mut reservation = allocator.allocate(1).unwrap();

        allocator.reverify(&mut reservation).unwrap();
        assert_eq!(reservation.ports(), &[port]);

        let _listener = TcpListener::bind(("0.0.0.0", port)).unwrap();
        assert!(allocator.reverify(&mut reservation).is_err());
    }
}
