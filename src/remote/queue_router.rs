//! 队列名到通道槽位的映射。
//!
//! 任意队列名按需映射到最小的空闲槽位；空闲后（默认队列除外）映射被回收，
//! 下次使用时可能拿到不同的槽位。

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::models::{ChannelId, DEFAULT_QUEUE_NAME};

#[derive(Debug, Clone)]
pub struct QueueRouter {
    slots: usize,
    indices: BTreeMap<String, usize>,
}

impl QueueRouter {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: slots.max(1),
            indices: BTreeMap::new(),
        }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// 槽位编号超出通道数时回绕。
    pub fn channel_from_index(&self, index: usize, any_host: bool) -> ChannelId {
        let slot = index % self.slots;
        if any_host {
            ChannelId::any_host(slot)
        } else {
            ChannelId::restricted(slot)
        }
    }

    pub fn channel_for_queue(&mut self, queue_name: &str, any_host: bool) -> ChannelId {
        if let Some(&index) = self.indices.get(queue_name) {
            return self.channel_from_index(index, any_host);
        }

        let index = self.lowest_unused_index();
        self.indices.insert(queue_name.to_string(), index);
        let channel = self.channel_from_index(index, any_host);
        debug!(queue = queue_name, index, %channel, "队列映射已建立");
        channel
    }

    fn lowest_unused_index(&self) -> usize {
        let used: BTreeSet<usize> = self.indices.values().copied().collect();
        let mut idx = 0;
        while used.contains(&idx) {
            idx += 1;
        }
        idx
    }

    pub fn index_of(&self, queue_name: &str) -> Option<usize> {
        self.indices.get(queue_name).copied()
    }

    /// 当前所有映射的快照，遍历期间可以安全地增删映射。
    pub fn mappings(&self) -> Vec<(String, usize)> {
        self.indices
            .iter()
            .map(|(name, idx)| (name.clone(), *idx))
            .collect()
    }

    /// 回收一个队列映射；默认队列永远保留。
    pub fn release(&mut self, queue_name: &str) -> bool {
        if queue_name == DEFAULT_QUEUE_NAME {
            return false;
        }
        let removed = self.indices.remove(queue_name).is_some();
        if removed {
            debug!(queue = queue_name, "空闲队列映射已回收");
        }
        removed
    }

    /// 某个槽位在两个区域上的通道。
    pub fn channels_for_index(&self, index: usize) -> [ChannelId; 2] {
        [
            self.channel_from_index(index, false),
            self.channel_from_index(index, true),
        ]
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_names_take_the_lowest_free_index() {
        let mut router = QueueRouter::new(100);
        assert_eq!(router.channel_for_queue("a", false), ChannelId::restricted(0));
        assert_eq!(router.channel_for_queue("b", false), ChannelId::restricted(1));
        assert_eq!(router.channel_for_queue("c", true), ChannelId::any_host(2));

        assert!(router.release("b"));
        assert_eq!(router.channel_for_queue("d", false), ChannelId::restricted(1));
        assert_eq!(router.channel_for_queue("e", false), ChannelId::restricted(3));
    }

    #[test]
    fn known_name_keeps_its_slot_in_both_regions() {
        let mut router = QueueRouter::new(100);
        router.channel_for_queue("x", false);
        router.channel_for_queue("y", false);
        assert_eq!(router.channel_for_queue("y", true), ChannelId::any_host(1));
        assert_eq!(router.channel_for_queue("y", false), ChannelId::restricted(1));
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn default_queue_is_never_released() {
        let mut router = QueueRouter::new(4);
        router.channel_for_queue(DEFAULT_QUEUE_NAME, false);
        assert!(!router.release(DEFAULT_QUEUE_NAME));
        assert_eq!(router.index_of(DEFAULT_QUEUE_NAME), Some(0));
    }

    #[test]
    fn indices_past_the_slot_count_wrap() {
        let mut router = QueueRouter::new(2);
        router.channel_for_queue("a", false);
        router.channel_for_queue("b", false);
        assert_eq!(router.channel_for_queue("c", true), ChannelId::any_host(0));
        assert_eq!(router.index_of("c"), Some(2));
    }

    #[test]
    fn releasing_unknown_name_is_a_no_op() {
        let mut router = QueueRouter::new(4);
        assert!(!router.release("nope"));
        assert!(router.is_empty());
    }
}
