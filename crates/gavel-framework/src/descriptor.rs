//! Compiled command descriptors and typed arguments.
//!
//! A [`CommandDescriptor`] is the validated form of one slash command: its
//! position in the three-level tree, its parameters, its permission and the
//! handler to invoke. Descriptors are produced by the
//! [compiler](crate::compiler) and consumed by the tree assembler and the
//! dispatcher.
//!
//! # Paths
//!
//! Every descriptor has a [`path`](CommandDescriptor::path) used as its key
//! in the dispatch index:
//!
//! | Declared as                 | Path               |
//! |-----------------------------|--------------------|
//! | `cmd`                       | `cmd`              |
//! | `cmd` + `sub`               | `cmd/sub`          |
//! | `cmd` + `group` + `sub`     | `sub/group/sub`    |
//!
//! The grouped form nests under the group rather than the top command. The
//! dispatcher computes paths with the same [`command_path`] function, so the
//! two sides always agree.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use gavel_core::{
    ChannelId, ChannelKind, DefinitionError, DefinitionResult, MAX_PARAMETERS, Mentionable,
    Parameter, ParameterType, Permission, RoleId, UserId, validate_description, validate_name,
};

use crate::context::CallContext;
use crate::error::{CommandError, CommandResult};

/// Type-erased slash command handler.
pub type CommandFn = Arc<dyn Fn(CallContext, Args) -> BoxFuture<'static, CommandResult> + Send + Sync>;

/// Joins a `(command, group?, subcommand?)` triple into a dispatch path.
pub fn command_path(command: &str, group: Option<&str>, subcommand: Option<&str>) -> String {
    match (group, subcommand) {
        (Some(group), Some(sub)) => format!("{sub}/{group}/{sub}"),
        (None, Some(sub)) => format!("{command}/{sub}"),
        _ => command.to_string(),
    }
}

// =============================================================================
// Typed arguments
// =============================================================================

/// A channel argument.
///
/// Channel options resolve to a message-capable handle when the channel can
/// receive messages, and to a generic guild channel otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelHandle {
    Message(ChannelId),
    Guild { id: ChannelId, kind: ChannelKind },
}

impl ChannelHandle {
    pub fn id(&self) -> ChannelId {
        match self {
            Self::Message(id) | Self::Guild { id, .. } => *id,
        }
    }

    /// The message-capable channel id, if this is one.
    pub fn as_message_channel(&self) -> Option<ChannelId> {
        match self {
            Self::Message(id) => Some(*id),
            Self::Guild { .. } => None,
        }
    }
}

/// One converted argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    User(UserId),
    Channel(ChannelHandle),
    Role(RoleId),
    Mentionable(Mentionable),
}

/// Static description of how a Rust type maps onto a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeShape {
    pub kind: ParameterType,
    /// Whether the type can represent an absent value.
    pub nullable: bool,
    pub type_name: &'static str,
}

/// A Rust type usable as a command parameter.
///
/// Implemented for the plain types backing each [`ParameterType`] and for
/// `Option<T>` of each. Only the primitive `i64` and `bool` are non-nullable:
/// an optional integer or boolean parameter must be declared as `Option<_>`.
/// Other plain types may back an optional parameter and are read back with
/// `args.get::<Option<T>>`.
pub trait ArgType: Sized + Send + 'static {
    const SHAPE: TypeShape;

    /// Converts a dispatched value. `None` means the option was absent.
    fn from_arg(value: Option<&ArgValue>) -> Result<Self, CommandError>;
}

macro_rules! arg_type {
    ($ty:ty, $kind:ident, $variant:ident, nullable = $nullable:literal, $value:ident => $conv:expr) => {
        impl ArgType for $ty {
            const SHAPE: TypeShape = TypeShape {
                kind: ParameterType::$kind,
                nullable: $nullable,
                type_name: stringify!($ty),
            };

            fn from_arg(value: Option<&ArgValue>) -> Result<Self, CommandError> {
                match value {
                    Some(ArgValue::$variant($value)) => Ok($conv),
                    Some(other) => Err(CommandError::argument(format!(
                        "expected {}, got {other:?}",
                        stringify!($ty)
                    ))),
                    None => Err(CommandError::argument(format!(
                        "missing {} argument",
                        stringify!($ty)
                    ))),
                }
            }
        }

        impl ArgType for Option<$ty> {
            const SHAPE: TypeShape = TypeShape {
                kind: ParameterType::$kind,
                nullable: true,
                type_name: concat!("Option<", stringify!($ty), ">"),
            };

            fn from_arg(value: Option<&ArgValue>) -> Result<Self, CommandError> {
                match value {
                    None => Ok(None),
                    some => <$ty as ArgType>::from_arg(some).map(Some),
                }
            }
        }
    };
}

arg_type!(String, String, String, nullable = true, v => v.clone());
arg_type!(i64, Integer, Integer, nullable = false, v => *v);
arg_type!(bool, Boolean, Boolean, nullable = false, v => *v);
arg_type!(UserId, User, User, nullable = true, v => *v);
arg_type!(ChannelHandle, Channel, Channel, nullable = true, v => *v);
arg_type!(RoleId, Role, Role, nullable = true, v => *v);
arg_type!(Mentionable, Mentionable, Mentionable, nullable = true, v => *v);

/// Arguments handed to a handler, in declaration order.
///
/// Absent optional parameters are present as explicit `None` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    values: Vec<(String, Option<ArgValue>)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Option<ArgValue>) {
        self.values.push((name.into(), value));
    }

    /// The raw value for `name`; `None` if absent or undeclared.
    pub fn raw(&self, name: &str) -> Option<&ArgValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    /// Whether `name` was declared on the command.
    pub fn is_declared(&self, name: &str) -> bool {
        self.values.iter().any(|(n, _)| n == name)
    }

    /// Extracts `name` as `T`.
    pub fn get<T: ArgType>(&self, name: &str) -> Result<T, CommandError> {
        if !self.is_declared(name) {
            return Err(CommandError::argument(format!("undeclared argument `{name}`")));
        }
        T::from_arg(self.raw(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&ArgValue>)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v.as_ref()))
    }
}

// =============================================================================
// CommandDescriptor
// =============================================================================

/// A validated, invocable slash command.
#[derive(Clone)]
pub struct CommandDescriptor {
    module: String,
    command_name: String,
    subcommand_group: Option<String>,
    subcommand_name: Option<String>,
    description: String,
    required: Vec<Parameter>,
    optional: Vec<Parameter>,
    permission: Permission,
    invoke: CommandFn,
}

/// Field bundle for [`CommandDescriptor::new`].
pub struct DescriptorParts {
    pub module: String,
    pub command_name: String,
    pub subcommand_group: Option<String>,
    pub subcommand_name: Option<String>,
    pub description: String,
    pub required: Vec<Parameter>,
    pub optional: Vec<Parameter>,
    pub permission: Permission,
    pub invoke: CommandFn,
}

impl CommandDescriptor {
    /// Validates and builds a descriptor.
    pub fn new(parts: DescriptorParts) -> DefinitionResult<Self> {
        validate_name("command", &parts.command_name)?;
        if let Some(group) = &parts.subcommand_group {
            validate_name("subcommand group", group)?;
        }
        if let Some(sub) = &parts.subcommand_name {
            validate_name("subcommand", sub)?;
        }
        if parts.subcommand_group.is_some() && parts.subcommand_name.is_none() {
            return Err(DefinitionError::GroupWithoutSubcommand {
                command: parts.command_name,
            });
        }

        let path = command_path(
            &parts.command_name,
            parts.subcommand_group.as_deref(),
            parts.subcommand_name.as_deref(),
        );
        validate_description(&path, &parts.description)?;

        let count = parts.required.len() + parts.optional.len();
        if count > MAX_PARAMETERS {
            return Err(DefinitionError::TooManyParameters { path, count });
        }
        let mut seen = HashSet::new();
        for param in parts.required.iter().chain(&parts.optional) {
            if !seen.insert(param.name()) {
                return Err(DefinitionError::DuplicateParameter {
                    path,
                    name: param.name().to_string(),
                });
            }
        }

        Ok(Self {
            module: parts.module,
            command_name: parts.command_name,
            subcommand_group: parts.subcommand_group,
            subcommand_name: parts.subcommand_name,
            description: parts.description,
            required: parts.required,
            optional: parts.optional,
            permission: parts.permission,
            invoke: parts.invoke,
        })
    }

    /// Name of the module that declared this command.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    pub fn subcommand_group(&self) -> Option<&str> {
        self.subcommand_group.as_deref()
    }

    pub fn subcommand_name(&self) -> Option<&str> {
        self.subcommand_name.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn required_parameters(&self) -> &[Parameter] {
        &self.required
    }

    pub fn optional_parameters(&self) -> &[Parameter] {
        &self.optional
    }

    /// Required parameters followed by optional ones.
    pub fn parameters(&self) -> impl Iterator<Item = (&Parameter, bool)> {
        self.required
            .iter()
            .map(|p| (p, true))
            .chain(self.optional.iter().map(|p| (p, false)))
    }

    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    /// The dispatch path.
    pub fn path(&self) -> String {
        command_path(
            &self.command_name,
            self.subcommand_group.as_deref(),
            self.subcommand_name.as_deref(),
        )
    }

    /// Runs the handler.
    pub fn invoke(&self, ctx: CallContext, args: Args) -> BoxFuture<'static, CommandResult> {
        (self.invoke)(ctx, args)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("module", &self.module)
            .field("path", &self.path())
            .field("required", &self.required.len())
            .field("optional", &self.optional.len())
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::FutureExt;

    pub(crate) fn noop() -> CommandFn {
        Arc::new(|_ctx, _args| async { Ok(()) }.boxed())
    }

    pub(crate) fn descriptor(
        command: &str,
        group: Option<&str>,
        sub: Option<&str>,
        permission: Permission,
    ) -> CommandDescriptor {
        CommandDescriptor::new(DescriptorParts {
            module: "test".into(),
            command_name: command.into(),
            subcommand_group: group.map(Into::into),
            subcommand_name: sub.map(Into::into),
            description: "A test command".into(),
            required: Vec::new(),
            optional: Vec::new(),
            permission,
            invoke: noop(),
        })
        .unwrap()
    }

    #[test]
    fn test_paths() {
        assert_eq!(command_path("ping", None, None), "ping");
        assert_eq!(command_path("module", None, Some("enable")), "module/enable");
        assert_eq!(
            command_path("admin", Some("caches"), Some("invalidate")),
            "invalidate/caches/invalidate"
        );
        let d = descriptor("admin", Some("caches"), Some("invalidate"), Permission::Everyone);
        assert_eq!(d.path(), "invalidate/caches/invalidate");
    }

    #[test]
    fn test_group_requires_subcommand() {
        let result = CommandDescriptor::new(DescriptorParts {
            module: "test".into(),
            command_name: "admin".into(),
            subcommand_group: Some("caches".into()),
            subcommand_name: None,
            description: "x".into(),
            required: Vec::new(),
            optional: Vec::new(),
            permission: Permission::Everyone,
            invoke: noop(),
        });
        assert!(matches!(
            result,
            Err(DefinitionError::GroupWithoutSubcommand { .. })
        ));
    }

    #[test]
    fn test_parameter_limit() {
        let params: Vec<Parameter> = (0..26)
            .map(|i| Parameter::new(ParameterType::String, format!("p{i}"), "param").unwrap())
            .collect();
        let result = CommandDescriptor::new(DescriptorParts {
            module: "test".into(),
            command_name: "big".into(),
            subcommand_group: None,
            subcommand_name: None,
            description: "x".into(),
            required: params[..20].to_vec(),
            optional: params[20..].to_vec(),
            permission: Permission::Everyone,
            invoke: noop(),
        });
        assert!(matches!(
            result,
            Err(DefinitionError::TooManyParameters { count: 26, .. })
        ));
    }

    #[test]
    fn test_args_extraction() {
        let mut args = Args::new();
        args.push("count", Some(ArgValue::Integer(3)));
        args.push("note", None);

        assert_eq!(args.get::<i64>("count").unwrap(), 3);
        assert_eq!(args.get::<Option<i64>>("count").unwrap(), Some(3));
        assert_eq!(args.get::<Option<String>>("note").unwrap(), None);
        assert!(args.get::<String>("note").is_err());
        assert!(args.get::<bool>("count").is_err());
        assert!(args.get::<i64>("missing").is_err());
    }

    #[test]
    fn test_shapes() {
        assert_eq!(<i64 as ArgType>::SHAPE.kind, ParameterType::Integer);
        assert!(!<i64 as ArgType>::SHAPE.nullable);
        assert!(<Option<bool> as ArgType>::SHAPE.nullable);
        assert_eq!(<Option<bool> as ArgType>::SHAPE.type_name, "Option<bool>");
        assert_eq!(<ChannelHandle as ArgType>::SHAPE.kind, ParameterType::Channel);
        assert!(<String as ArgType>::SHAPE.nullable);
        assert!(<RoleId as ArgType>::SHAPE.nullable);
        assert!(!<bool as ArgType>::SHAPE.nullable);
    }
}
