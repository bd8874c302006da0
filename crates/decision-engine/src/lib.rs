pub mod config;
pub mod guard;
pub mod notifier;
pub mod order_submitter;
pub mod pipeline;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use config::{AppConfig, LogBackend, StoreBackend};
pub use guard::ActiveTradeGuard;
pub use notifier::{DecisionEvent, Notifier, NotifierSet, TelegramNotifier, WebhookNotifier};
pub use order_submitter::OrderSubmitter;
pub use pipeline::{DecisionPipeline, PipelineReport};
pub use scheduler::{Scheduler, SchedulerStatus};
