//! Feed: the WebSocket connection to the message interceptor.
//!
//! `protocol` holds the frame codecs, `adapter` the client connection, `stub` a stand-in feed
//! server for local runs and tests.

mod adapter;
pub mod protocol;
pub mod stub;

pub use adapter::{CloseInfo, FeedAdapter, FeedEvent, FeedHandle, FeedSender, ABNORMAL_CLOSURE};
pub use protocol::{decode_frame, decode_inbound, encode_decision, FeedFrame, InboundMessage};
pub use stub::{StubFeed, Verdict};
