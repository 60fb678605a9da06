//! The node's own advertised record.

use parking_lot::RwLock;

use crate::domain::{Coordinate, PeerId, PeerRecord};

/// Shared, versioned view of what this node advertises.
///
/// Gossip self-entries and node-info replies read it; the coordinate
/// estimator writes the coordinate into it.
#[derive(Debug)]
pub struct LocalNode {
    id: PeerId,
    record: RwLock<PeerRecord>,
}

impl LocalNode {
    pub fn new(record: PeerRecord) -> Self {
        Self {
            id: record.id,
            record: RwLock::new(record),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Snapshot of the current record.
    pub fn record(&self) -> PeerRecord {
        self.record.read().clone()
    }

    /// Publish a new coordinate, bumping the epoch so peers prefer the
    /// updated record.
    pub fn publish_coordinate(&self, coordinate: Coordinate) {
        let mut record = self.record.write();
        record.coordinate = Some(coordinate);
        record.epoch = record.epoch.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_bumps_epoch() {
        let addr = "127.0.0.1:7000".parse().unwrap();
        let local = LocalNode::new(PeerRecord::new(PeerId::from_u128(1), addr, "c"));

        local.publish_coordinate(Coordinate::new([1.0, 2.0, 3.0]));

        let record = local.record();
        assert_eq!(record.epoch, 1);
        assert_eq!(record.coordinate, Some(Coordinate::new([1.0, 2.0, 3.0])));
        assert_eq!(local.id(), PeerId::from_u128(1));
    }
}
