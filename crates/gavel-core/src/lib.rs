//! # Gavel Core
//!
//! Leaf types of the Gavel guild command engine.
//!
//! - **Identifiers**: typed snowflakes ([`GuildId`], [`ChannelId`], [`UserId`], [`RoleId`])
//! - **Parameter model**: the closed [`ParameterType`] set and validated [`Parameter`]s
//! - **Permission model**: [`Permission`] answered against persisted [`PermissionGrants`]
//! - **Persistence**: the memoizing [`Store`] over a byte-level [`StorageBackend`]
//! - **Platform**: inbound [`Interaction`]/[`ComponentEvent`]/[`MessageEvent`] and the
//!   outbound [`Platform`] trait
//! - **Health**: [`HealthStatus`] and [`HealthReport`]
//!
//! Nothing here knows about modules or dispatch; that lives in
//! `gavel-framework`.

pub mod error;
pub mod health;
pub mod id;
pub mod parameter;
pub mod permission;
pub mod platform;
pub mod store;

pub use error::{
    ApiError, ApiResult, BoxError, DefinitionError, DefinitionResult, PersistenceError,
    PersistenceResult,
};
pub use health::{HealthReport, HealthStatus};
pub use id::{ChannelId, GuildId, InteractionId, RoleId, UserId};
pub use parameter::{
    Choice, ChoiceValue, MAX_DESCRIPTION_LEN, MAX_NAME_LEN, MAX_PARAMETERS, Parameter,
    ParameterType, validate_description, validate_name,
};
pub use permission::{Member, Permission, PermissionGrants, PermissionManager};
pub use platform::{
    BoxedPlatform, ChannelKind, CommandData, CommandPrivilege, ComponentEvent, ComponentKind,
    Interaction, InvokedPath, Mentionable, MessageEvent, OptionChoiceData, OptionData, Platform,
    PlatformValue, SubcommandData, SubcommandGroupData,
};
pub use store::{MemoryBackend, PersistentObject, Shared, StorageBackend, Store};
