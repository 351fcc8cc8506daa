//! Intrusive singly-linked task lists.
//!
//! The links live in a [`TaskNode`] array owned by the scheduler, indexed by
//! [`TaskId`]. A [`TaskList`] is just a head index; the same node array backs
//! every ready list and the blocked list, which is sound because a task is a
//! member of at most one list at a time.

use crate::task::{TaskId, TaskNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskList {
    head: Option<TaskId>,
}

impl TaskList {
    pub const EMPTY: Self = Self { head: None };

    #[inline]
    pub fn head(&self) -> Option<TaskId> {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append `id` at the tail. O(n) in the list length.
    pub fn push_back(&mut self, nodes: &mut [TaskNode], id: TaskId) {
        nodes[id.index()].next = None;

        let Some(mut cur) = self.head else {
            self.head = Some(id);
            return;
        };
        while let Some(next) = nodes[cur.index()].next {
            cur = next;
        }
        nodes[cur.index()].next = Some(id);
    }

    /// Splice `id` out of the list. Returns `false` if it was not a member.
    pub fn remove(&mut self, nodes: &mut [TaskNode], id: TaskId) -> bool {
        let Some(head) = self.head else {
            return false;
        };

        // Sole member or head: the list head moves on.
        if head == id {
            self.head = nodes[id.index()].next.take();
            return true;
        }

        // Middle or tail: find the predecessor.
        let mut prev = head;
        while let Some(cur) = nodes[prev.index()].next {
            if cur == id {
                nodes[prev.index()].next = nodes[id.index()].next.take();
                return true;
            }
            prev = cur;
        }
        false
    }

    pub fn contains(&self, nodes: &[TaskNode], id: TaskId) -> bool {
        self.iter(nodes).any(|member| member == id)
    }

    pub fn iter<'a>(&self, nodes: &'a [TaskNode]) -> Iter<'a> {
        Iter {
            nodes,
            cur: self.head,
        }
    }
}

pub struct Iter<'a> {
    nodes: &'a [TaskNode],
    cur: Option<TaskId>,
}

impl Iterator for Iter<'_> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        let id = self.cur?;
        self.cur = self.nodes[id.index()].next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &TaskList, nodes: &[TaskNode]) -> Vec<u32> {
        list.iter(nodes).map(|id| id.as_u32()).collect()
    }

    #[test]
    fn test_push_back_is_fifo() {
        let mut nodes = [TaskNode::EMPTY; 4];
        let mut list = TaskList::EMPTY;
        for i in 0..4 {
            list.push_back(&mut nodes, TaskId::new(i));
        }
        assert_eq!(ids(&list, &nodes), [0, 1, 2, 3]);
    }

    #[test]
    fn test_remove_sole_member() {
        let mut nodes = [TaskNode::EMPTY; 2];
        let mut list = TaskList::EMPTY;
        list.push_back(&mut nodes, TaskId::new(1));
        assert!(list.remove(&mut nodes, TaskId::new(1)));
        assert!(list.is_empty());
    }

    #[test]
    fn test_remove_head_middle_and_tail() {
        let mut nodes = [TaskNode::EMPTY; 5];
        let mut list = TaskList::EMPTY;
        for i in 0..5 {
            list.push_back(&mut nodes, TaskId::new(i));
        }

        assert!(list.remove(&mut nodes, TaskId::new(0)));
        assert_eq!(ids(&list, &nodes), [1, 2, 3, 4]);

        assert!(list.remove(&mut nodes, TaskId::new(2)));
        assert_eq!(ids(&list, &nodes), [1, 3, 4]);

        assert!(list.remove(&mut nodes, TaskId::new(4)));
        assert_eq!(ids(&list, &nodes), [1, 3]);

        // removed nodes are unlinked
        assert_eq!(nodes[2].next, None);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut nodes = [TaskNode::EMPTY; 3];
        let mut list = TaskList::EMPTY;
        list.push_back(&mut nodes, TaskId::new(0));
        list.push_back(&mut nodes, TaskId::new(1));
        assert!(!list.remove(&mut nodes, TaskId::new(2)));
        assert_eq!(ids(&list, &nodes), [0, 1]);
        assert!(!TaskList::EMPTY.contains(&nodes, TaskId::new(0)));
    }

    #[test]
    fn test_reinsert_after_remove() {
        let mut nodes = [TaskNode::EMPTY; 3];
        let mut list = TaskList::EMPTY;
        for i in 0..3 {
            list.push_back(&mut nodes, TaskId::new(i));
        }
        list.remove(&mut nodes, TaskId::new(0));
        list.push_back(&mut nodes, TaskId::new(0));
        assert_eq!(ids(&list, &nodes), [1, 2, 0]);
    }
}
