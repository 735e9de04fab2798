use super::node::{NodeContact, NodeId};

/// Bounded list of known contacts.
///
/// There is no eviction: once `max_size` contacts are held, new ones are
/// dropped until the crawler drains the table on its next walk.
#[derive(Debug)]
pub struct RoutingTable {
    our_id: NodeId,
    max_size: usize,
    nodes: Vec<NodeContact>,
}

impl RoutingTable {
    pub fn new(our_id: NodeId, max_size: usize) -> Self {
        Self {
            our_id,
            max_size,
            nodes: Vec::new(),
        }
    }

    pub fn our_id(&self) -> &NodeId {
        &self.our_id
    }

    /// Adds `contact` if there is room. Returns whether it was added.
    pub fn push(&mut self, contact: NodeContact) -> bool {
        if self.nodes.len() >= self.max_size {
            return false;
        }
        self.nodes.push(contact);
        true
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Up to `count` contacts ordered by XOR distance to `target`.
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<NodeContact> {
        let mut nodes = self.nodes.clone();
        nodes.sort_by_key(|n| n.id.distance(target));
        nodes.dedup_by_key(|n| n.id);
        nodes.truncate(count);
        nodes
    }

    /// Removes and returns every contact, oldest first.
    pub fn drain(&mut self) -> Vec<NodeContact> {
        std::mem::take(&mut self.nodes)
    }
}
