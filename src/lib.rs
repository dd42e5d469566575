pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod frame;
pub mod subscriber;

pub use client::Client;
pub use error::{Error, Result};
pub use frame::Frame;
pub use subscriber::{Message, Subscriber};
