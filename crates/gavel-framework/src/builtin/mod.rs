//! Built-in modules.
//!
//! | Module  | Default   | Provides                                         |
//! |---------|-----------|--------------------------------------------------|
//! | `admin` | enabled   | module, visibility, permission and cache control |
//! | `help`  | disabled  | `list commands`, `list modules` text commands    |
//! | `ping`  | disabled  | `/ping` and `ping`                               |
//!
//! Each module is contributed to [`BOT_MODULES`](crate::module::BOT_MODULES)
//! at link time and is also listed in [`ALL`] for explicit registration.

pub mod admin;
pub mod help;
pub mod ping;

use crate::module::ModuleDescriptor;

/// Every built-in module.
pub const ALL: [ModuleDescriptor; 3] = [admin::DESCRIPTOR, help::DESCRIPTOR, ping::DESCRIPTOR];
