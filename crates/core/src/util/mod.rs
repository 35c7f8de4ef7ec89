pub mod retry;
pub mod ring_buffer;

pub use retry::{retry_with_backoff, RetryConfig};
pub use ring_buffer::RingBuffer;
