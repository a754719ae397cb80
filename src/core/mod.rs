//! 核心编排层：回合状态机、路由、策略与错误

pub mod engine;
pub mod error;
pub mod router;
pub mod strategy;

pub use engine::{create_model_from_config, default_registry, Engine, EngineConfig};
pub use error::AgentError;
pub use router::{route, RouteContext, RoutingDecision};
pub use strategy::{Strategy, StrategyTable};
