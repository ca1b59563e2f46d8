//! Command descriptor compiler.
//!
//! Modules declare slash commands with the [`CommandDecl`] builder:
//!
//! ```rust,ignore
//! CommandDecl::new("play")
//!     .description("Queue a track")
//!     .param(ParamDecl::new::<String>("query", "What to search for"))
//!     .param(ParamDecl::new::<Option<i64>>("position", "Queue slot").optional())
//!     .handler(|ctx, args| async move {
//!         let query: String = args.get("query")?;
//!         ctx.reply(&format!("Queued {query}")).await?;
//!         Ok(())
//!     })
//! ```
//!
//! [`compile_commands`] turns a module's declarations into
//! [`CommandDescriptor`]s. There are two failure tiers:
//!
//! - **Skipped**: a declaration with a malformed handler shape is dropped
//!   with a warning and reported in [`CompiledCommands::skipped`]. This
//!   covers a missing handler, a non-nullable optional parameter, and choices
//!   on a non-string parameter. The rest of the module still compiles.
//! - **Fatal**: a name or description outside the platform's limits is a
//!   [`DefinitionError`] that fails the whole module.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use gavel_core::{Choice, DefinitionResult, Parameter, ParameterType, Permission};
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::descriptor::{ArgType, Args, CommandDescriptor, CommandFn, DescriptorParts, TypeShape};
use crate::error::CommandResult;

// ─── ParamDecl ────────────────────────────────────────────────────────────────

/// Declaration of one parameter.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    name: String,
    description: String,
    optional: bool,
    choices: Vec<(String, String)>,
    shape: TypeShape,
}

impl ParamDecl {
    /// Declares a parameter backed by the Rust type `T`.
    pub fn new<T: ArgType>(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            optional: false,
            choices: Vec::new(),
            shape: T::SHAPE,
        }
    }

    /// Marks the parameter optional. Integer and boolean parameters must use
    /// `Option<i64>` or `Option<bool>`.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Adds a fixed `(label, value)` choice. Only valid on string parameters.
    pub fn choice(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.choices.push((label.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    fn check_shape(&self) -> Result<(), SkipReason> {
        if self.optional && !self.shape.nullable {
            return Err(SkipReason::NonNullableOptional {
                param: self.name.clone(),
                type_name: self.shape.type_name,
            });
        }
        if !self.choices.is_empty() && self.shape.kind != ParameterType::String {
            return Err(SkipReason::ChoicesOnNonString {
                param: self.name.clone(),
                kind: self.shape.kind,
            });
        }
        Ok(())
    }

    fn build(self) -> DefinitionResult<Parameter> {
        let choices = self
            .choices
            .into_iter()
            .map(|(label, value)| Choice::string(label, value))
            .collect();
        Parameter::new(self.shape.kind, self.name, self.description)?.with_choices(choices)
    }
}

// ─── CommandDecl ──────────────────────────────────────────────────────────────

/// Declaration of one slash command.
#[derive(Clone)]
pub struct CommandDecl {
    ident: String,
    name: Option<String>,
    group: Option<String>,
    subcommand: Option<String>,
    description: String,
    everyone: bool,
    params: Vec<ParamDecl>,
    handler: Option<CommandFn>,
}

impl CommandDecl {
    /// Starts a declaration for the handler named `ident`.
    ///
    /// Unless [`name`](Self::name) is set, the command name is `ident`
    /// lowercased.
    pub fn new(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            name: None,
            group: None,
            subcommand: None,
            description: String::new(),
            everyone: false,
            params: Vec::new(),
            handler: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn subcommand(mut self, subcommand: impl Into<String>) -> Self {
        self.subcommand = Some(subcommand.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Lets every guild member run the command.
    ///
    /// Without this the command requires the named permission
    /// `cmd:<command name>`.
    pub fn everyone(mut self) -> Self {
        self.everyone = true;
        self
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    /// Binds the async handler.
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(CallContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        let invoke: CommandFn = Arc::new(move |ctx: CallContext, args: Args| {
            let fut: BoxFuture<'static, CommandResult> = handler(ctx, args).boxed();
            fut
        });
        self.handler = Some(invoke);
        self
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// The command name after derivation.
    pub fn command_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.ident.to_lowercase())
    }
}

impl fmt::Debug for CommandDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDecl")
            .field("ident", &self.ident)
            .field("name", &self.command_name())
            .field("group", &self.group)
            .field("subcommand", &self.subcommand)
            .field("params", &self.params)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

// ─── Compilation ──────────────────────────────────────────────────────────────

/// Why a declaration was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No handler was bound.
    MissingHandler,
    /// An optional parameter uses a type that cannot be absent.
    NonNullableOptional {
        param: String,
        type_name: &'static str,
    },
    /// Choices were declared on a non-string parameter.
    ChoicesOnNonString { param: String, kind: ParameterType },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHandler => write!(f, "no handler bound"),
            Self::NonNullableOptional { param, type_name } => write!(
                f,
                "optional parameter `{param}` uses non-nullable type `{type_name}`"
            ),
            Self::ChoicesOnNonString { param, kind } => write!(
                f,
                "parameter `{param}` declares choices on a {kind} parameter"
            ),
        }
    }
}

/// A declaration dropped during compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDeclaration {
    pub ident: String,
    pub reason: SkipReason,
}

/// Output of [`compile_commands`].
#[derive(Debug, Default)]
pub struct CompiledCommands {
    pub descriptors: Vec<CommandDescriptor>,
    pub skipped: Vec<SkippedDeclaration>,
}

/// Compiles one module's command declarations.
pub fn compile_commands(
    module: &str,
    declarations: Vec<CommandDecl>,
) -> DefinitionResult<CompiledCommands> {
    let mut out = CompiledCommands::default();

    for decl in declarations {
        match check_declaration(&decl) {
            Ok(handler) => {
                let descriptor = build_descriptor(module, decl, handler)?;
                debug!(module, path = %descriptor.path(), "Compiled command");
                out.descriptors.push(descriptor);
            }
            Err(reason) => {
                warn!(module, handler = %decl.ident, %reason, "Skipping command declaration");
                out.skipped.push(SkippedDeclaration {
                    ident: decl.ident,
                    reason,
                });
            }
        }
    }

    Ok(out)
}

fn check_declaration(decl: &CommandDecl) -> Result<CommandFn, SkipReason> {
    let handler = decl.handler.clone().ok_or(SkipReason::MissingHandler)?;
    for param in &decl.params {
        param.check_shape()?;
    }
    Ok(handler)
}

fn build_descriptor(
    module: &str,
    decl: CommandDecl,
    invoke: CommandFn,
) -> DefinitionResult<CommandDescriptor> {
    let command_name = decl.command_name();
    let permission = if decl.everyone {
        Permission::Everyone
    } else {
        Permission::named(format!("cmd:{command_name}"))
    };

    let mut required = Vec::new();
    let mut optional = Vec::new();
    for param in decl.params {
        let is_optional = param.optional;
        let built = param.build()?;
        if is_optional {
            optional.push(built);
        } else {
            required.push(built);
        }
    }

    CommandDescriptor::new(DescriptorParts {
        module: module.to_string(),
        command_name,
        subcommand_group: decl.group,
        subcommand_name: decl.subcommand,
        description: decl.description,
        required,
        optional,
        permission,
        invoke,
    })
}
