// crates/fanout-core/src/policy/consistent_hash.rs
//
// Consistent-hash dispatch: each pool worker is a ring node "worker-{id}".
// A task is routed to the owner of its routing key, so tasks sharing a key
// land on the same worker while membership is stable. Owners receive their
// tasks regardless of load.
//
// Explicit keys are recorded on the ring and show up in rebalance reports.
// Unkeyed tasks route by id without being recorded, so completed tasks leave
// nothing behind.

use crate::error::{FanoutError, Result};
use crate::policy::{MembershipChange, PolicyKind};
use crate::pool::{Admission, WorkerPool};
use crate::ring::{HashRing, RebalanceReport};
use crate::task::Task;
use crate::traits::DispatchPolicy;
use crate::worker::WorkerId;

#[derive(Debug, Clone)]
pub struct ConsistentHashPolicy {
    ring: HashRing,
}

impl ConsistentHashPolicy {
    /// Place workers `0..workers` on a ring with `virtual_nodes` each.
    pub fn new(workers: usize, virtual_nodes: u32) -> Result<Self> {
        let ring = HashRing::with_nodes(virtual_nodes, (0..workers).map(Self::node_id))?;
        Ok(Self { ring })
    }

    /// Ring node id of a worker.
    pub fn node_id(worker: WorkerId) -> String {
        format!("worker-{}", worker)
    }

    /// Worker behind a ring node id, if it names one.
    pub fn worker_of(node_id: &str) -> Option<WorkerId> {
        node_id.strip_prefix("worker-")?.parse().ok()
    }

    fn check_worker(worker: WorkerId, pool: &WorkerPool) -> Result<()> {
        if worker >= pool.len() {
            return Err(FanoutError::UnknownWorker(worker));
        }
        Ok(())
    }
}

impl DispatchPolicy for ConsistentHashPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::ConsistentHash
    }

    fn admission(&self) -> Admission {
        Admission::Blind
    }

    fn select(&mut self, task: &Task, _pool: &WorkerPool) -> Option<WorkerId> {
        match &task.key {
            Some(key) => {
                let owner = self.ring.assign_key(key)?;
                Self::worker_of(&owner)
            }
            None => Self::worker_of(self.ring.node_for(&task.routing_key())?),
        }
    }

    fn ring(&self) -> Option<&HashRing> {
        Some(&self.ring)
    }

    fn membership(&mut self, change: MembershipChange, pool: &WorkerPool) -> Result<RebalanceReport> {
        let report = match change {
            MembershipChange::AddWorker(worker) => {
                Self::check_worker(worker, pool)?;
                self.ring.add_node(&Self::node_id(worker))
            }
            MembershipChange::RemoveWorker(worker) => {
                Self::check_worker(worker, pool)?;
                self.ring.remove_node(&Self::node_id(worker))
            }
            MembershipChange::SetVirtualNodes(v) => self.ring.set_virtual_node_count(v)?,
        };
        tracing::info!(
            "Ring membership change {:?}: {}/{} keys moved",
            change,
            report.moved_count(),
            report.total_keys
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskRequest;
    use std::time::Duration;

    fn keyed(id: u64, key: &str) -> Task {
        Task::from_request(id, id, TaskRequest::new(Duration::from_millis(1)).with_key(key))
    }

    #[test]
    fn test_node_id_round_trip() {
        assert_eq!(ConsistentHashPolicy::node_id(3), "worker-3");
        assert_eq!(ConsistentHashPolicy::worker_of("worker-3"), Some(3));
        assert_eq!(ConsistentHashPolicy::worker_of("node-3"), None);
    }

    #[test]
    fn test_same_key_same_worker() {
        let pool = WorkerPool::with_workers(4, 1).unwrap();
        let mut policy = ConsistentHashPolicy::new(4, 10).unwrap();
        let first = policy.select(&keyed(1, "session-9"), &pool);
        let second = policy.select(&keyed(2, "session-9"), &pool);
        assert!(first.is_some());
        assert_eq!(first, second);
        assert!(policy.ring().unwrap().key("session-9").is_some());
    }

    #[test]
    fn test_unkeyed_tasks_are_not_tracked() {
        let pool = WorkerPool::with_workers(4, 1).unwrap();
        let mut policy = ConsistentHashPolicy::new(4, 10).unwrap();
        let unkeyed = Task::from_request(7, 7, TaskRequest::new(Duration::from_millis(1)));
        let first = policy.select(&unkeyed, &pool);
        assert!(first.is_some());
        assert_eq!(policy.select(&unkeyed, &pool), first);
        assert_eq!(policy.ring().unwrap().keys().count(), 0);
    }

    #[test]
    fn test_removed_worker_receives_nothing() {
        let pool = WorkerPool::with_workers(3, 1).unwrap();
        let mut policy = ConsistentHashPolicy::new(3, 10).unwrap();
        policy
            .membership(MembershipChange::RemoveWorker(1), &pool)
            .unwrap();
        for id in 0..200 {
            let w = policy.select(&keyed(id, &format!("k{}", id)), &pool).unwrap();
            assert_ne!(w, 1);
        }
    }

    #[test]
    fn test_membership_rejects_unknown_worker() {
        let pool = WorkerPool::with_workers(2, 1).unwrap();
        let mut policy = ConsistentHashPolicy::new(2, 5).unwrap();
        assert_eq!(
            policy
                .membership(MembershipChange::AddWorker(7), &pool)
                .unwrap_err(),
            FanoutError::UnknownWorker(7)
        );
    }

    #[test]
    fn test_empty_ring_leaves_task_queued() {
        let pool = WorkerPool::with_workers(1, 1).unwrap();
        let mut policy = ConsistentHashPolicy::new(1, 5).unwrap();
        policy
            .membership(MembershipChange::RemoveWorker(0), &pool)
            .unwrap();
        assert_eq!(policy.select(&keyed(1, "a"), &pool), None);
    }
}
