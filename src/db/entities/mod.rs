pub mod monitor_history;
pub mod monitor_target;
pub mod notification_channel;

pub mod prelude {
    pub use super::monitor_history::Entity as MonitorHistory;
    pub use super::monitor_target::Entity as MonitorTarget;
    pub use super::notification_channel::Entity as NotificationChannel;
}
