//! Kafka wire protocol: buffer, packet framing and the metadata API.

pub mod buffer;
pub mod error_code;
pub mod metadata;
pub mod packet;

pub use buffer::{Buffer, WireScalar};
pub use error_code::{is_retryable, ErrorCode};
pub use metadata::{
    BrokerNodeInformation, MetadataRequest, MetadataResponse, PartitionInformation,
    TopicInformation, METADATA_API_KEY, METADATA_API_VERSION,
};
pub use packet::{
    decode, encode, Decodable, Encodable, RequestHeader, ResponseHeader, CORRELATION_ID_OFFSET,
};
