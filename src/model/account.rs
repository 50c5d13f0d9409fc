use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

/// A node in the ledger tree that tasks accrue cost/revenue to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub parent: Option<AccountId>,
}
