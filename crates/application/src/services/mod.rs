pub mod fanout;

pub use fanout::{CreateMessageCommand, FanoutDependencies, FanoutOutcome, MessageFanoutService};
