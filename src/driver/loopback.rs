//! In-process broker.
//!
//! A complete implementation of the driver traits backed by in-memory
//! partition queues: partitioned topics with round-robin append, a group
//! registry with membership epochs, greedy partition assignment, rebalance
//! on membership change (live sessions end so the caller's outer loop
//! re-enters), per-message acknowledgment tracking, and delivery faults for
//! unknown topics.
//!
//! The integration tests run the workload core against this broker; the
//! binaries expose it via `--driver loopback` for smoke runs without a
//! real cluster.
//!
//! Simplifications relative to a real broker: messages are delivered
//! at-most-once across sessions (committed offsets are recorded but not
//! used for replay), and queues are unbounded, so the send path never
//! applies backpressure.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex as TokioMutex, Notify, OwnedMutexGuard};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    AdminClient, AsyncProducer, BrokerDriver, ClaimHandler, ConsumerFault, DeliveryFault,
    FaultStream, GroupConsumer, GroupSession, InboundRecord, PartitionClaim, TopicSpec,
};
use crate::error::{Error, Result};

type ClaimHandle = Arc<TokioMutex<UnboundedReceiver<InboundRecord>>>;

struct PartitionLog {
    tx: UnboundedSender<InboundRecord>,
    rx: ClaimHandle,
    next_offset: AtomicI64,
}

impl PartitionLog {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(TokioMutex::new(rx)),
            next_offset: AtomicI64::new(0),
        }
    }
}

struct TopicState {
    partitions: Vec<PartitionLog>,
    cursor: AtomicUsize,
}

struct Member {
    id: u64,
    topics: Vec<String>,
}

/// One consumer group's membership.
///
/// The epoch bumps on every membership or subscription change; live
/// sessions watch it and end when it moves, which is the rebalance signal.
#[derive(Default)]
struct GroupState {
    epoch: AtomicU64,
    next_member: AtomicU64,
    members: StdMutex<Vec<Member>>,
    changed: Notify,
}

impl GroupState {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn rebalance_locked(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    fn join(&self) -> u64 {
        let id = self.next_member.fetch_add(1, Ordering::SeqCst);
        let mut members = self.members.lock().unwrap();
        members.push(Member {
            id,
            topics: Vec::new(),
        });
        id
    }

    fn leave(&self, id: u64) {
        let mut members = self.members.lock().unwrap();
        members.retain(|m| m.id != id);
        self.rebalance_locked();
    }

    fn set_subscription(&self, id: u64, topics: &[String]) {
        let mut members = self.members.lock().unwrap();
        let Some(member) = members.iter_mut().find(|m| m.id == id) else {
            return;
        };
        if member.topics == topics {
            // unchanged subscription on session re-entry must not trigger
            // another rebalance, or the group would never stabilize
            return;
        }
        member.topics = topics.to_vec();
        self.rebalance_locked();
    }
}

/// Shared in-memory broker state.
pub struct LoopbackBroker {
    topics: DashMap<String, Arc<TopicState>>,
    groups: DashMap<String, Arc<GroupState>>,
    committed: DashMap<(String, String, i32), i64>,
}

impl LoopbackBroker {
    fn new() -> Self {
        Self {
            topics: DashMap::new(),
            groups: DashMap::new(),
            committed: DashMap::new(),
        }
    }

    fn group_state(&self, group: &str) -> Arc<GroupState> {
        self.groups
            .entry(group.to_string())
            .or_insert_with(|| Arc::new(GroupState::default()))
            .clone()
    }

    fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        if spec.partitions < 1 {
            return Err(Error::Admin(format!(
                "invalid partition count {} for topic {}",
                spec.partitions, spec.name
            )));
        }
        let state = Arc::new(TopicState {
            partitions: (0..spec.partitions).map(|_| PartitionLog::new()).collect(),
            cursor: AtomicUsize::new(0),
        });
        match self.topics.entry(spec.name.clone()) {
            Entry::Occupied(_) => Err(Error::Admin(format!("topic already exists: {}", spec.name))),
            Entry::Vacant(entry) => {
                entry.insert(state);
                Ok(())
            }
        }
    }

    fn publish(&self, topic: &str, payload: Bytes) -> std::result::Result<(), String> {
        let Some(state) = self.topics.get(topic) else {
            return Err(format!("unknown topic: {topic}"));
        };
        let idx = state.cursor.fetch_add(1, Ordering::Relaxed) % state.partitions.len();
        let log = &state.partitions[idx];
        let offset = log.next_offset.fetch_add(1, Ordering::Relaxed);
        let _ = log.tx.send(InboundRecord {
            topic: topic.to_string(),
            partition: idx as i32,
            offset,
            payload,
        });
        Ok(())
    }

    fn claim_handle(&self, topic: &str, partition: i32) -> Option<ClaimHandle> {
        let state = self.topics.get(topic)?;
        state
            .partitions
            .get(partition as usize)
            .map(|log| log.rx.clone())
    }

    /// Compute the partitions owned by `member`, with the epoch the
    /// computation is valid for.
    ///
    /// For each subscribed topic the partitions are split round-robin
    /// across the members subscribed to that topic, ranked by join order.
    /// Every member computes its share from the same membership list, so
    /// shares are disjoint within an epoch.
    fn assignment(&self, group: &str, member: u64) -> (u64, Vec<(String, i32)>) {
        let state = self.group_state(group);
        let members = state.members.lock().unwrap();
        let epoch = state.epoch();
        let Some(me) = members.iter().find(|m| m.id == member) else {
            return (epoch, Vec::new());
        };

        let mut mine = Vec::new();
        for topic in &me.topics {
            let Some(topic_state) = self.topics.get(topic) else {
                continue;
            };
            let subscribers: Vec<u64> = members
                .iter()
                .filter(|m| m.topics.contains(topic))
                .map(|m| m.id)
                .collect();
            let Some(rank) = subscribers.iter().position(|id| *id == member) else {
                continue;
            };
            for partition in 0..topic_state.partitions.len() {
                if partition % subscribers.len() == rank {
                    mine.push((topic.clone(), partition as i32));
                }
            }
        }
        (epoch, mine)
    }

    /// Number of partitions of `topic`, if it exists.
    pub fn partition_count(&self, topic: &str) -> Option<usize> {
        self.topics.get(topic).map(|t| t.partitions.len())
    }

    /// Offset committed for a partition by a group, if any was acknowledged.
    pub fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .map(|v| *v)
    }

    /// Current member count of a group.
    pub fn member_count(&self, group: &str) -> usize {
        self.group_state(group).members.lock().unwrap().len()
    }
}

/// Driver handing out handles onto one shared [`LoopbackBroker`].
pub struct LoopbackDriver {
    broker: Arc<LoopbackBroker>,
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self {
            broker: Arc::new(LoopbackBroker::new()),
        }
    }

    /// The shared broker state, for assertions in tests.
    pub fn broker(&self) -> Arc<LoopbackBroker> {
        self.broker.clone()
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerDriver for LoopbackDriver {
    async fn connect_admin(&self, _addr: &str) -> Result<Arc<dyn AdminClient>> {
        Ok(Arc::new(LoopbackAdmin {
            broker: self.broker.clone(),
        }))
    }

    async fn open_producer(
        &self,
        _addr: &str,
    ) -> Result<(Arc<dyn AsyncProducer>, FaultStream<DeliveryFault>)> {
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        let producer = LoopbackProducer {
            broker: self.broker.clone(),
            faults: faults_tx,
        };
        Ok((Arc::new(producer), faults_rx))
    }

    async fn join_group(
        &self,
        _addr: &str,
        group: &str,
    ) -> Result<(Arc<dyn GroupConsumer>, FaultStream<ConsumerFault>)> {
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        let state = self.broker.group_state(group);
        let member_id = state.join();
        debug!("member {member_id} joined group {group}");
        let member = LoopbackGroupMember {
            broker: self.broker.clone(),
            group: group.to_string(),
            member_id,
            faults: faults_tx,
        };
        Ok((Arc::new(member), faults_rx))
    }
}

struct LoopbackAdmin {
    broker: Arc<LoopbackBroker>,
}

#[async_trait]
impl AdminClient for LoopbackAdmin {
    async fn create_topics(&self, specs: &[TopicSpec], _timeout: Duration) -> Result<()> {
        for spec in specs {
            self.broker.create_topic(spec)?;
        }
        Ok(())
    }
}

struct LoopbackProducer {
    broker: Arc<LoopbackBroker>,
    faults: UnboundedSender<DeliveryFault>,
}

#[async_trait]
impl AsyncProducer for LoopbackProducer {
    async fn send(&self, topic: &str, payload: Bytes) {
        if let Err(reason) = self.broker.publish(topic, payload) {
            let _ = self.faults.send(DeliveryFault {
                topic: topic.to_string(),
                reason,
            });
        }
    }
}

struct LoopbackGroupMember {
    broker: Arc<LoopbackBroker>,
    group: String,
    member_id: u64,
    faults: UnboundedSender<ConsumerFault>,
}

impl Drop for LoopbackGroupMember {
    fn drop(&mut self) {
        self.broker.group_state(&self.group).leave(self.member_id);
    }
}

#[async_trait]
impl GroupConsumer for LoopbackGroupMember {
    async fn consume(
        &self,
        ctx: &CancellationToken,
        topics: &[String],
        handler: Arc<dyn ClaimHandler>,
    ) -> Result<()> {
        let state = self.broker.group_state(&self.group);

        let mut known = Vec::new();
        for topic in topics {
            if self.broker.topics.contains_key(topic) {
                known.push(topic.clone());
            } else {
                let _ = self.faults.send(ConsumerFault {
                    group: self.group.clone(),
                    reason: format!("unknown topic: {topic}"),
                });
            }
        }
        state.set_subscription(self.member_id, &known);

        let (epoch, assignment) = self.broker.assignment(&self.group, self.member_id);
        let mut claims = Vec::new();
        for (topic, partition) in assignment {
            // a claim released by the previous session may still be winding
            // down; wait for its guard
            if let Some(handle) = self.broker.claim_handle(&topic, partition) {
                let rx = handle.lock_owned().await;
                claims.push(LoopbackClaim {
                    topic,
                    partition,
                    rx,
                });
            }
        }

        let session_token = ctx.child_token();
        let session = Arc::new(LoopbackSession {
            broker: self.broker.clone(),
            group: self.group.clone(),
            done: session_token.clone(),
        });

        handler.setup(session.as_ref()).await;

        let mut workers = JoinSet::new();
        for mut claim in claims {
            let handler = handler.clone();
            let session = session.clone();
            workers.spawn(async move {
                handler.consume_claim(&*session, &mut claim).await;
            });
        }

        let rebalanced = async {
            loop {
                let notified = state.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if state.epoch() != epoch {
                    return;
                }
                notified.await;
            }
        };
        tokio::select! {
            _ = ctx.cancelled() => {}
            _ = rebalanced => {
                debug!("group {} epoch moved, ending session of member {}", self.group, self.member_id);
            }
        }

        session_token.cancel();
        while workers.join_next().await.is_some() {}
        handler.cleanup(session.as_ref()).await;
        Ok(())
    }
}

struct LoopbackSession {
    broker: Arc<LoopbackBroker>,
    group: String,
    done: CancellationToken,
}

impl GroupSession for LoopbackSession {
    fn ack(&self, record: &InboundRecord) {
        self.broker.committed.insert(
            (self.group.clone(), record.topic.clone(), record.partition),
            record.offset + 1,
        );
    }

    fn done(&self) -> &CancellationToken {
        &self.done
    }
}

struct LoopbackClaim {
    topic: String,
    partition: i32,
    rx: OwnedMutexGuard<UnboundedReceiver<InboundRecord>>,
}

#[async_trait]
impl PartitionClaim for LoopbackClaim {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition(&self) -> i32 {
        self.partition
    }

    async fn recv(&mut self) -> Option<InboundRecord> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CREATE_TOPICS_TIMEOUT;

    fn spec(name: &str, partitions: i32) -> TopicSpec {
        TopicSpec {
            name: name.to_string(),
            partitions,
            replication: 1,
        }
    }

    #[tokio::test]
    async fn test_create_topic_and_publish() {
        let driver = LoopbackDriver::new();
        let admin = driver.connect_admin("local").await.unwrap();
        admin
            .create_topics(&[spec("aaaa000000", 3)], CREATE_TOPICS_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(driver.broker().partition_count("aaaa000000"), Some(3));

        let (producer, _faults) = driver.open_producer("local").await.unwrap();
        for _ in 0..6 {
            producer.send("aaaa000000", Bytes::from_static(b"x")).await;
        }

        // round-robin append: two records per partition
        let broker = driver.broker();
        for partition in 0..3 {
            let handle = broker.claim_handle("aaaa000000", partition).unwrap();
            let mut rx = handle.lock_owned().await;
            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            assert_eq!(first.partition, partition);
            assert_eq!((first.offset, second.offset), (0, 1));
        }
    }

    #[tokio::test]
    async fn test_duplicate_topic_rejected() {
        let driver = LoopbackDriver::new();
        let admin = driver.connect_admin("local").await.unwrap();
        admin
            .create_topics(&[spec("bbbb000000", 1)], CREATE_TOPICS_TIMEOUT)
            .await
            .unwrap();
        let err = admin
            .create_topics(&[spec("bbbb000000", 1)], CREATE_TOPICS_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Admin(_)));
    }

    #[tokio::test]
    async fn test_send_to_unknown_topic_surfaces_fault() {
        let driver = LoopbackDriver::new();
        let (producer, mut faults) = driver.open_producer("local").await.unwrap();
        producer.send("nonexistent", Bytes::from_static(b"x")).await;
        let fault = faults.recv().await.unwrap();
        assert_eq!(fault.topic, "nonexistent");
        assert!(fault.reason.contains("unknown topic"));
    }

    #[tokio::test]
    async fn test_member_leave_bumps_epoch() {
        let driver = LoopbackDriver::new();
        let broker = driver.broker();
        let (member, _faults) = driver.join_group("local", "g1").await.unwrap();
        assert_eq!(broker.member_count("g1"), 1);
        let before = broker.group_state("g1").epoch();
        drop(member);
        assert_eq!(broker.member_count("g1"), 0);
        assert!(broker.group_state("g1").epoch() > before);
    }

    #[test]
    fn test_assignment_splits_partitions_disjointly() {
        let broker = LoopbackBroker::new();
        broker.create_topic(&spec("cccc000000", 4)).unwrap();
        let state = broker.group_state("g2");
        let a = state.join();
        let b = state.join();
        state.set_subscription(a, &["cccc000000".to_string()]);
        state.set_subscription(b, &["cccc000000".to_string()]);

        let (_, mine_a) = broker.assignment("g2", a);
        let (_, mine_b) = broker.assignment("g2", b);
        assert_eq!(mine_a.len() + mine_b.len(), 4);
        for claim in &mine_a {
            assert!(!mine_b.contains(claim));
        }
    }
}
