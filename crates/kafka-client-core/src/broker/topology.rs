//! Shared view of the cluster learned from metadata.

use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;

use crate::protocol::{BrokerNodeInformation, MetadataResponse, TopicInformation};

#[derive(Debug, Default)]
struct ClusterInfo {
    cluster_id: Option<String>,
    controller_id: Option<i32>,
}

#[derive(Debug, Default)]
struct Inner {
    brokers: DashMap<i32, BrokerNodeInformation>,
    topics: DashMap<String, TopicInformation>,
    cluster: RwLock<ClusterInfo>,
}

/// Brokers, topics and cluster identity from the latest metadata responses.
///
/// Cheap to clone; clones share the same view.
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    inner: Arc<Inner>,
}

impl ClusterTopology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a metadata response. Brokers and topics are upserted; entries
    /// missing from the response are kept.
    pub fn update(&self, response: &MetadataResponse) {
        for broker in &response.brokers {
            self.inner.brokers.insert(broker.node_id, broker.clone());
        }
        for topic in &response.topics {
            self.inner.topics.insert(topic.name.clone(), topic.clone());
        }

        let mut cluster = self
            .inner
            .cluster
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        cluster.cluster_id = Some(response.cluster_id.clone()).filter(|id| !id.is_empty());
        cluster.controller_id = Some(response.controller_id).filter(|id| *id >= 0);
    }

    #[must_use]
    pub fn broker(&self, node_id: i32) -> Option<BrokerNodeInformation> {
        self.inner.brokers.get(&node_id).map(|b| b.value().clone())
    }

    /// All known brokers ordered by node id.
    #[must_use]
    pub fn brokers(&self) -> Vec<BrokerNodeInformation> {
        let mut brokers: Vec<_> = self
            .inner
            .brokers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        brokers.sort_by_key(|b| b.node_id);
        brokers
    }

    #[must_use]
    pub fn broker_count(&self) -> usize {
        self.inner.brokers.len()
    }

    #[must_use]
    pub fn topic(&self, name: &str) -> Option<TopicInformation> {
        self.inner.topics.get(name).map(|t| t.value().clone())
    }

    /// Names of all known topics, sorted.
    #[must_use]
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .inner
            .topics
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Node id of the leader of `topic`/`partition`.
    #[must_use]
    pub fn leader(&self, topic: &str, partition: i32) -> Option<i32> {
        self.inner.topics.get(topic).and_then(|t| {
            t.partitions
                .iter()
                .find(|p| p.partition_index == partition)
                .map(|p| p.leader_id)
        })
    }

    #[must_use]
    pub fn cluster_id(&self) -> Option<String> {
        self.inner
            .cluster
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cluster_id
            .clone()
    }

    #[must_use]
    pub fn controller_id(&self) -> Option<i32> {
        self.inner
            .cluster
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .controller_id
    }
}
