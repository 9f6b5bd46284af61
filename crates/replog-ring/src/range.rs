use replog_keys::PublicKey;
use replog_proto::Hash;

/// One peer's claimed replication arc: `[offset, offset + factor) mod 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct Range {
    pub peer: PublicKey,
    pub offset: f64,
    pub factor: f64,
    pub timestamp: u64,
}

impl Range {
    /// `offset` is derived from the peer's public key so it's stable
    /// across updates (only `factor`/`timestamp` change as the peer's
    /// role evolves).
    pub fn new(peer: PublicKey, factor: f64, timestamp: u64) -> Self {
        let offset = Hash::of(&peer.bytes).to_unit_interval();
        Range {
            peer,
            offset,
            factor: factor.clamp(0.0, 1.0),
            timestamp,
        }
    }

    /// Constructs a range with an explicit offset, bypassing the
    /// hash-derived default. Used by tests that pin specific ring
    /// geometries (e.g. the spec's §8 scenario 4 fixture).
    pub fn with_offset(peer: PublicKey, offset: f64, factor: f64, timestamp: u64) -> Self {
        Range {
            peer,
            offset: offset.rem_euclid(1.0),
            factor: factor.clamp(0.0, 1.0),
            timestamp,
        }
    }

    pub fn end(&self) -> f64 {
        self.offset + self.factor
    }

    pub fn covers(&self, point: f64) -> bool {
        if self.factor <= 0.0 {
            return false;
        }
        let end = self.end();
        if end <= 1.0 {
            point >= self.offset && point < end
        } else {
            point >= self.offset || point < end - 1.0
        }
    }

    pub fn midpoint(&self) -> f64 {
        (self.offset + self.factor / 2.0).rem_euclid(1.0)
    }

    pub fn circular_distance_to_midpoint(&self, point: f64) -> f64 {
        circular_distance(point, self.midpoint())
    }

    pub fn forward_distance(&self, point: f64) -> f64 {
        (point - self.offset).rem_euclid(1.0)
    }
}

fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(1.0);
    d.min(1.0 - d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replog_keys::KeyKind;

    #[test]
    fn range_offset_is_derived_from_peer() {
        let peer = PublicKey {
            kind: KeyKind::Ed25519,
            bytes: [1u8; 32],
        };
        let a = Range::new(peer.clone(), 0.5, 0);
        let b = Range::new(peer, 0.1, 100);
        assert_eq!(a.offset, b.offset);
    }

    #[test]
    fn covers_wraps_past_one() {
        let peer = PublicKey {
            kind: KeyKind::Ed25519,
            bytes: [1u8; 32],
        };
        let mut range = Range::new(peer, 0.2, 0);
        range.offset = 0.9;
        assert!(range.covers(0.95));
        assert!(range.covers(0.05));
        assert!(!range.covers(0.5));
    }
}
