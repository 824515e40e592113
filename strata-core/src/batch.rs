//! Batch Optimizer
//!
//! Splits a batch into groups of identical shape (request type plus sorted
//! layer set) so every member of a group shares one planning decision.

use tokio::sync::OnceCell;

use crate::types::{AccessRequest, AccessStrategy};

/// Requests sharing one shape, with their positions in the original batch
#[derive(Debug, Clone)]
pub struct RequestGroup {
    pub key: String,
    pub members: Vec<(usize, AccessRequest)>,
}

impl RequestGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Group a batch by shape. Groups appear in order of first occurrence.
pub fn group_requests(requests: &[AccessRequest]) -> Vec<RequestGroup> {
    let mut groups: Vec<RequestGroup> = Vec::new();

    for (index, req) in requests.iter().enumerate() {
        let key = req.shape_key();
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.members.push((index, req.clone())),
            None => groups.push(RequestGroup {
                key,
                members: vec![(index, req.clone())],
            }),
        }
    }

    groups
}

/// Strategy planned once and reused by every member of a group.
///
/// Planning happens lazily on the group's first cache miss, so a group served
/// entirely from cache never plans at all.
#[derive(Debug)]
pub struct GroupPlan {
    shape: String,
    strategy: OnceCell<AccessStrategy>,
}

impl GroupPlan {
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            strategy: OnceCell::new(),
        }
    }

    /// Whether a (resolved) request can reuse this plan
    pub fn applies_to(&self, req: &AccessRequest) -> bool {
        req.shape_key() == self.shape
    }

    pub(crate) fn cell(&self) -> &OnceCell<AccessStrategy> {
        &self.strategy
    }

    pub fn is_planned(&self) -> bool {
        self.strategy.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryTier, RequestType};

    #[test]
    fn test_grouping_by_shape() {
        let requests = vec![
            AccessRequest::new(1, RequestType::ChapterContext, [MemoryTier::ShortTerm]),
            AccessRequest::new(2, RequestType::WorldKnowledge, [MemoryTier::LongTerm]),
            AccessRequest::new(3, RequestType::ChapterContext, [MemoryTier::ShortTerm]),
            AccessRequest::new(4, RequestType::ChapterContext, [MemoryTier::ShortTerm, MemoryTier::MidTerm]),
            AccessRequest::new(5, RequestType::WorldKnowledge, [MemoryTier::LongTerm]),
        ];

        let groups = group_requests(&requests);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].members.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(groups[1].len(), 2);
        assert_eq!(groups[2].len(), 1);
        assert_eq!(groups.iter().map(RequestGroup::len).sum::<usize>(), requests.len());
    }

    #[test]
    fn test_empty_batch() {
        assert!(group_requests(&[]).is_empty());
    }

    #[test]
    fn test_group_plan_applies_to_same_shape_only() {
        let plan = GroupPlan::new("narrative_state:short_term");
        let same = AccessRequest::new(9, RequestType::NarrativeState, [MemoryTier::ShortTerm]);
        let other = AccessRequest::new(9, RequestType::NarrativeState, [MemoryTier::MidTerm]);

        assert!(plan.applies_to(&same));
        assert!(!plan.applies_to(&other));
        assert!(!plan.is_planned());
    }
}
