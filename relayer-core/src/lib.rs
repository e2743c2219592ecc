//! Cross-chain atomic-swap relayer core: chain adapters, the order state
//! machine, the resolver/protocol engine, and the supervisor that ties them
//! together (spec.md §4).

pub mod chain;
pub mod config;
pub mod error;
pub mod ingestor;
pub mod metrics;
pub mod order;
pub mod resolver;
pub mod supervisor;

pub use chain::{Action, ChainAdapter, ChainId, Event, EventKind, EventPayload};
pub use config::ServiceConfig;
pub use error::{AdapterError, ConfigError, InvariantError, OrderError, ResolverError};
pub use order::{CrossChainOrder, OrderState};
pub use resolver::Resolver;
pub use supervisor::Supervisor;
