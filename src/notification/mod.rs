pub mod notification_publisher;
pub mod notification_service;

pub use notification_publisher::{MessageCreated, MessagePublisher};
pub use notification_service::start_notification_service;
