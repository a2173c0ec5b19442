pub mod history_service;
pub mod notification_channel_service;
pub mod target_service;
