//! Metadata API (key 3, version 8).
//!
//! The request names the topics of interest; the response describes the
//! brokers of the cluster and, per topic, every partition with its leader
//! and replica set.

use super::buffer::{string_size, Buffer};
use super::error_code::ErrorCode;
use super::packet::{
    end_frame, Decodable, Encodable, RequestHeader, ResponseHeader, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE,
};
use crate::error::BufferResult;

/// API key of the metadata request.
pub const METADATA_API_KEY: i16 = 3;

/// Schema version spoken by this client.
pub const METADATA_API_VERSION: i16 = 8;

/// Request for cluster and topic metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRequest {
    pub header: RequestHeader,
    pub topics: Vec<String>,
    pub allow_auto_topic_creation: bool,
    pub include_cluster_authorized_operations: bool,
    pub include_topic_authorized_operations: bool,
}

impl MetadataRequest {
    /// Request metadata for `topics`, without authorized-operation details.
    #[must_use]
    pub fn new(topics: Vec<String>, allow_auto_topic_creation: bool) -> Self {
        Self {
            header: RequestHeader::new(METADATA_API_KEY, METADATA_API_VERSION),
            topics,
            allow_auto_topic_creation,
            include_cluster_authorized_operations: false,
            include_topic_authorized_operations: false,
        }
    }
}

impl Encodable for MetadataRequest {
    fn size(&self) -> usize {
        REQUEST_HEADER_SIZE
            + 4
            + self.topics.iter().map(|t| string_size(t)).sum::<usize>()
            + 3
    }

    fn write(&self, buffer: &mut Buffer) -> BufferResult<()> {
        let size_offset = self.header.write(buffer)?;

        write_count(buffer, self.topics.len())?;
        for topic in &self.topics {
            buffer.write_string(topic)?;
        }

        buffer.write_bool(self.allow_auto_topic_creation)?;
        buffer.write_bool(self.include_cluster_authorized_operations)?;
        buffer.write_bool(self.include_topic_authorized_operations)?;

        end_frame(buffer, size_offset)
    }
}

impl Decodable for MetadataRequest {
    fn read(buffer: &mut Buffer) -> BufferResult<Self> {
        let (_, header) = RequestHeader::read(buffer)?;
        let topics = read_array(buffer, Buffer::read_string)?;
        Ok(Self {
            header,
            topics,
            allow_auto_topic_creation: buffer.read_bool()?,
            include_cluster_authorized_operations: buffer.read_bool()?,
            include_topic_authorized_operations: buffer.read_bool()?,
        })
    }
}

/// One member of the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerNodeInformation {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
    pub rack: String,
}

impl Encodable for BrokerNodeInformation {
    fn size(&self) -> usize {
        4 + string_size(&self.host) + 4 + string_size(&self.rack)
    }

    fn write(&self, buffer: &mut Buffer) -> BufferResult<()> {
        buffer.write::<i32>(self.node_id)?;
        buffer.write_string(&self.host)?;
        buffer.write::<i32>(self.port)?;
        buffer.write_string(&self.rack)?;
        Ok(())
    }
}

impl Decodable for BrokerNodeInformation {
    fn read(buffer: &mut Buffer) -> BufferResult<Self> {
        Ok(Self {
            node_id: buffer.read::<i32>()?,
            host: buffer.read_string()?,
            port: buffer.read::<i32>()?,
            rack: buffer.read_string()?,
        })
    }
}

/// Leadership and replica placement of one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionInformation {
    pub error_code: i16,
    pub partition_index: i32,
    pub leader_id: i32,
    pub leader_epoch: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
    pub offline_replicas: Vec<i32>,
}

impl Encodable for PartitionInformation {
    fn size(&self) -> usize {
        2 + 4 + 4 + 4
            + 4 * (3 + self.replicas.len() + self.isr.len() + self.offline_replicas.len())
    }

    fn write(&self, buffer: &mut Buffer) -> BufferResult<()> {
        buffer.write::<i16>(self.error_code)?;
        buffer.write::<i32>(self.partition_index)?;
        buffer.write::<i32>(self.leader_id)?;
        buffer.write::<i32>(self.leader_epoch)?;
        for nodes in [&self.replicas, &self.isr, &self.offline_replicas] {
            write_count(buffer, nodes.len())?;
            for node in nodes {
                buffer.write::<i32>(*node)?;
            }
        }
        Ok(())
    }
}

impl Decodable for PartitionInformation {
    fn read(buffer: &mut Buffer) -> BufferResult<Self> {
        Ok(Self {
            error_code: buffer.read::<i16>()?,
            partition_index: buffer.read::<i32>()?,
            leader_id: buffer.read::<i32>()?,
            leader_epoch: buffer.read::<i32>()?,
            replicas: read_array(buffer, Buffer::read::<i32>)?,
            isr: read_array(buffer, Buffer::read::<i32>)?,
            offline_replicas: read_array(buffer, Buffer::read::<i32>)?,
        })
    }
}

/// Metadata of one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicInformation {
    pub error_code: i16,
    pub name: String,
    pub is_internal: bool,
    pub partitions: Vec<PartitionInformation>,
    pub topic_authorized_operations: i32,
}

impl TopicInformation {
    /// The topic-level error, if any. Unknown codes map to `Err(code)`.
    pub fn error(&self) -> Option<Result<ErrorCode, i16>> {
        (self.error_code != 0).then(|| ErrorCode::try_from(self.error_code))
    }
}

impl Encodable for TopicInformation {
    fn size(&self) -> usize {
        2 + string_size(&self.name)
            + 1
            + 4
            + self.partitions.iter().map(Encodable::size).sum::<usize>()
            + 4
    }

    fn write(&self, buffer: &mut Buffer) -> BufferResult<()> {
        buffer.write::<i16>(self.error_code)?;
        buffer.write_string(&self.name)?;
        buffer.write_bool(self.is_internal)?;
        write_count(buffer, self.partitions.len())?;
        for partition in &self.partitions {
            partition.write(buffer)?;
        }
        buffer.write::<i32>(self.topic_authorized_operations)?;
        Ok(())
    }
}

impl Decodable for TopicInformation {
    fn read(buffer: &mut Buffer) -> BufferResult<Self> {
        Ok(Self {
            error_code: buffer.read::<i16>()?,
            name: buffer.read_string()?,
            is_internal: buffer.read_bool()?,
            partitions: read_array(buffer, PartitionInformation::read)?,
            topic_authorized_operations: buffer.read::<i32>()?,
        })
    }
}

/// Response to [`MetadataRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: i32,
    pub brokers: Vec<BrokerNodeInformation>,
    pub cluster_id: String,
    pub controller_id: i32,
    pub topics: Vec<TopicInformation>,
    pub cluster_authorized_operations: i32,
}

impl Encodable for MetadataResponse {
    fn size(&self) -> usize {
        RESPONSE_HEADER_SIZE
            + 4
            + 4
            + self.brokers.iter().map(Encodable::size).sum::<usize>()
            + string_size(&self.cluster_id)
            + 4
            + 4
            + self.topics.iter().map(Encodable::size).sum::<usize>()
            + 4
    }

    fn write(&self, buffer: &mut Buffer) -> BufferResult<()> {
        let size_offset = self.header.write(buffer)?;
        buffer.write::<i32>(self.throttle_time_ms)?;

        write_count(buffer, self.brokers.len())?;
        for broker in &self.brokers {
            broker.write(buffer)?;
        }

        buffer.write_string(&self.cluster_id)?;
        buffer.write::<i32>(self.controller_id)?;

        write_count(buffer, self.topics.len())?;
        for topic in &self.topics {
            topic.write(buffer)?;
        }

        buffer.write::<i32>(self.cluster_authorized_operations)?;
        end_frame(buffer, size_offset)
    }
}

impl Decodable for MetadataResponse {
    fn read(buffer: &mut Buffer) -> BufferResult<Self> {
        Ok(Self {
            header: ResponseHeader::read(buffer)?,
            throttle_time_ms: buffer.read::<i32>()?,
            brokers: read_array(buffer, BrokerNodeInformation::read)?,
            cluster_id: buffer.read_string()?,
            controller_id: buffer.read::<i32>()?,
            topics: read_array(buffer, TopicInformation::read)?,
            cluster_authorized_operations: buffer.read::<i32>()?,
        })
    }
}

fn write_count(buffer: &mut Buffer, count: usize) -> BufferResult<()> {
    // Counts come from in-memory collections that were sized into the buffer,
    // so they are bounded by its capacity long before i32::MAX.
    buffer.write::<i32>(count as i32).map(|_| ())
}

/// Read an i32-counted array. A negative count is the null array.
fn read_array<T>(
    buffer: &mut Buffer,
    mut read_item: impl FnMut(&mut Buffer) -> BufferResult<T>,
) -> BufferResult<Vec<T>> {
    let count = buffer.read::<i32>()?;
    let count = usize::try_from(count).unwrap_or(0);
    // Never trust the count for preallocation beyond what the frame can hold.
    let mut items = Vec::with_capacity(count.min(buffer.remaining()));
    for _ in 0..count {
        items.push(read_item(buffer)?);
    }
    Ok(items)
}
