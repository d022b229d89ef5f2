//! Service tunables

use crate::lock::LockSettings;

pub const DEFAULT_MAX_ACCOUNTS_PER_USER: u32 = 10;

/// Attempts at finding an unused account number before giving up
pub const DEFAULT_ACCOUNT_NUMBER_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    pub lock: LockSettings,
    pub max_accounts_per_user: u32,
    pub account_number_attempts: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            lock: LockSettings::default(),
            max_accounts_per_user: DEFAULT_MAX_ACCOUNTS_PER_USER,
            account_number_attempts: DEFAULT_ACCOUNT_NUMBER_ATTEMPTS,
        }
    }
}
