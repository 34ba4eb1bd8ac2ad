//! OSDF Policy - policy table and flow-rule ownership
//!
//! ```text
//!  admin (create/remove) ──► admin lock ──► PolicyStore ──► listeners
//!                                              ▲   │
//!  packet workers ── current_policies() ───────┘   └──► FlowRuleService
//!                 ── install_flow_rule() ──────────────►
//! ```

#![warn(missing_docs)]

pub mod allocator;
pub mod store;

pub use allocator::PolicyIdAllocator;
pub use store::PolicyStore;
