pub mod broker;
pub mod listener;

pub use broker::BrokerClient;
pub use listener::UserEventListener;
