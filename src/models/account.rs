//! Ledger accounts.
//!
//! Accounts form a tree of ledger nodes. Tasks accrue cost and revenue
//! into their effective account; per-scenario balances are derived state
//! owned by the scheduler, so the structural node carries no amounts.

use serde::{Deserialize, Serialize};

use crate::models::ids::AccountId;

/// A ledger account node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountNode {
    pub id: AccountId,

    /// Hierarchical dot-path (e.g. `project.labor`).
    pub path: String,

    pub name: String,

    pub parent: Option<AccountId>,

    /// Child accounts in declaration order.
    pub children: Vec<AccountId>,
}
