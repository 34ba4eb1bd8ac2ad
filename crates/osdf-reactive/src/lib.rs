//! OSDF Reactive - policy-driven reactive forwarding
//!
//! Packets the controller punts to the engine are classified against the
//! current policies. Each matching policy's route action picks a path,
//! builds a traffic selector and installs one rule per hop, recording every
//! rule against the policy so that removing the policy withdraws them.
//!
//! # Pipeline
//!
//! ```text
//! InboundPacket
//!      │
//!      ▼
//! PacketClassifier ──ARP──► VirtualGatewayResponder ──► PacketService::emit
//!      │ IPv4, regions resolved
//!      ▼
//! for each matching policy
//!      │
//!      ▼
//! Intra/InterRouteAction ──► PathSelector ──► SelectorBuilder
//!      │
//!      ▼
//! PolicyStore::install_flow_rule ──► FlowRuleService
//! ```

#![warn(missing_docs)]

pub mod admin;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod region;
pub mod route;
pub mod selector;

pub use admin::{CreatePolicyRequest, PolicyAdmin, PolicySummary, StoreSnapshot};
pub use classifier::{Disposition, PacketClassifier};
pub use config::ReactiveConfig;
pub use engine::{Collaborators, EngineStats, ReactiveEngine};
pub use gateway::{GatewayReply, VirtualGatewayResponder};
pub use region::{RegionConfig, RegionDirectory};
pub use route::{InterRouteAction, IntraRouteAction, RouteAction, RouteOutcome};
pub use selector::{RouteClass, SelectorBuilder};
