//! Free-text commands.
//!
//! The legacy surface: a message starting with the channel's prefix is
//! matched against the display names of the text commands visible in that
//! channel, and the rest of the message is passed to the handler verbatim.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use gavel_core::{DefinitionError, DefinitionResult, Permission};
use tracing::warn;

use crate::context::TextContext;
use crate::error::CommandResult;

/// Type-erased text command handler. Receives the raw argument remainder.
pub type TextFn = Arc<dyn Fn(TextContext, String) -> BoxFuture<'static, CommandResult> + Send + Sync>;

/// Declaration of one text command.
#[derive(Clone)]
pub struct TextCommandDecl {
    ident: String,
    name: Option<String>,
    syntax: Option<String>,
    help: String,
    permission: Option<Permission>,
    handler: Option<TextFn>,
}

impl TextCommandDecl {
    /// Starts a declaration for the handler named `ident`.
    ///
    /// The display name defaults to `ident` lowercased with `_` turned into
    /// spaces, so `list_modules` answers to `list modules`.
    pub fn new(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            name: None,
            syntax: None,
            help: String::new(),
            permission: None,
            handler: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Usage line shown by `list commands`.
    pub fn syntax(mut self, syntax: impl Into<String>) -> Self {
        self.syntax = Some(syntax.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Overrides the default `<module>.<ident>` permission.
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn everyone(self) -> Self {
        self.permission(Permission::Everyone)
    }

    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(TextContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        let invoke: TextFn = Arc::new(move |ctx: TextContext, args: String| {
            let fut: BoxFuture<'static, CommandResult> = handler(ctx, args).boxed();
            fut
        });
        self.handler = Some(invoke);
        self
    }

    fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.split_whitespace().collect::<Vec<_>>().join(" "),
            None => self
                .ident
                .to_lowercase()
                .split('_')
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A compiled text command.
#[derive(Clone)]
pub struct TextCommand {
    module: String,
    name: String,
    syntax: String,
    help: String,
    permission: Permission,
    invoke: TextFn,
}

impl TextCommand {
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Space-separated display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn syntax(&self) -> &str {
        &self.syntax
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    pub fn invoke(&self, ctx: TextContext, args: String) -> BoxFuture<'static, CommandResult> {
        (self.invoke)(ctx, args)
    }
}

impl fmt::Debug for TextCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextCommand")
            .field("module", &self.module)
            .field("name", &self.name)
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}

/// Compiles one module's text command declarations.
///
/// Declarations without a handler are skipped with a warning; an empty
/// display name fails the module.
pub fn compile_text_commands(
    module: &str,
    declarations: Vec<TextCommandDecl>,
) -> DefinitionResult<Vec<TextCommand>> {
    let mut out = Vec::with_capacity(declarations.len());
    for decl in declarations {
        let Some(invoke) = decl.handler.clone() else {
            warn!(module, handler = %decl.ident, "Skipping text command without handler");
            continue;
        };
        let name = decl.display_name();
        if name.is_empty() {
            return Err(DefinitionError::EmptyTextCommand { ident: decl.ident });
        }
        let permission = decl
            .permission
            .unwrap_or_else(|| Permission::named(format!("{module}.{}", decl.ident)));
        out.push(TextCommand {
            module: module.to_string(),
            syntax: decl.syntax.unwrap_or_else(|| name.clone()),
            name,
            help: decl.help,
            permission,
            invoke,
        });
    }
    Ok(out)
}
