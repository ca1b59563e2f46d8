//! Command tree assembly.
//!
//! Folds the descriptors of every visible module into the platform's
//! three-level tree and, in the same pass, the flat path index used for
//! dispatch.
//!
//! ```text
//! top ─┬─ leaf                       /top
//!      └─ groups ─┬─ g1 ─ leaf       /top g1
//!                 └─ g2 ─┬─ s1       /top g2 s1
//!                        └─ s2       /top g2 s2
//! ```
//!
//! # Conflicts
//!
//! A node holds either a leaf or children, never both. Deeper structure
//! wins: a leaf that would sit above children is dropped, whichever arrived
//! first. Two descriptors for the same slot keep the first. Every conflict
//! becomes a [`TreeDiagnostic`]; dropped descriptors appear neither in the
//! registered tree nor in the index. Assembly itself never fails;
//! [`AssembledTree::check`] lets the caller turn diagnostics into an error.
//!
//! Output is deterministic: nodes are emitted in name order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use gavel_core::{
    CommandData, CommandPrivilege, OptionChoiceData, OptionData, Parameter, Permission,
    PermissionManager, RoleId, SubcommandData, SubcommandGroupData,
};
use tracing::{debug, error};

use crate::descriptor::CommandDescriptor;
use crate::error::TreeError;
use crate::module::GroupDescription;
use crate::registry::LoadedModule;

/// Most children a platform node may carry.
pub const MAX_CHILDREN: usize = 25;

// =============================================================================
// Diagnostics
// =============================================================================

/// One conflict found during assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDiagnostic {
    /// A top-level leaf was dropped because the command has subcommands.
    ShadowedTopLevel { command: String, module: String },
    /// A subcommand leaf was dropped because a group of that name has
    /// subcommands.
    ShadowedSubcommand {
        command: String,
        subcommand: String,
        module: String,
    },
    /// A second descriptor for an occupied slot was dropped.
    DuplicatePath {
        path: String,
        module: String,
        kept: String,
    },
    /// Two tree positions produced the same dispatch path.
    PathCollision {
        path: String,
        module: String,
        kept: String,
    },
    /// A node had more than [`MAX_CHILDREN`] children; the rest were dropped.
    TooManyChildren { node: String, dropped: Vec<String> },
    /// A node was described twice; the first description is kept.
    DuplicateDescription { node: String, module: String },
}

impl fmt::Display for TreeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShadowedTopLevel { command, module } => write!(
                f,
                "subcommands shadow top-level command `{command}` from module `{module}`"
            ),
            Self::ShadowedSubcommand {
                command,
                subcommand,
                module,
            } => write!(
                f,
                "subcommands shadow `{command} {subcommand}` from module `{module}`"
            ),
            Self::DuplicatePath { path, module, kept } => write!(
                f,
                "duplicate command `{path}` from module `{module}`, keeping the one from `{kept}`"
            ),
            Self::PathCollision { path, module, kept } => write!(
                f,
                "command from module `{module}` collides on path `{path}` with one from `{kept}`"
            ),
            Self::TooManyChildren { node, dropped } => write!(
                f,
                "`{node}` has more than {MAX_CHILDREN} children, dropped {}",
                dropped.join(", ")
            ),
            Self::DuplicateDescription { node, module } => write!(
                f,
                "description for `{node}` from module `{module}` was already set"
            ),
        }
    }
}

// =============================================================================
// PathIndex
// =============================================================================

/// Flat `path → descriptor` map used for dispatch.
///
/// Never mutated once built; a new tree replaces the whole index.
#[derive(Debug, Default, Clone)]
pub struct PathIndex {
    entries: HashMap<String, Arc<CommandDescriptor>>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Arc<CommandDescriptor>> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every indexed path, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

// =============================================================================
// AssembledTree
// =============================================================================

/// Output of [`TreeAssembler::finish`].
#[derive(Debug, Clone)]
pub struct AssembledTree {
    /// Registrable top-level commands, sorted by name.
    pub commands: Vec<CommandData>,
    pub index: PathIndex,
    pub diagnostics: Vec<TreeDiagnostic>,
}

impl AssembledTree {
    /// Fails with every diagnostic when `strict` and any were produced.
    pub fn check(&self, strict: bool) -> Result<(), TreeError> {
        if strict && !self.diagnostics.is_empty() {
            return Err(TreeError::Conflicts(self.diagnostics.clone()));
        }
        Ok(())
    }

    /// Explicit access lists for every command that is not default-enabled.
    pub fn privileges(&self, permissions: &PermissionManager) -> Vec<CommandPrivilege> {
        self.commands
            .iter()
            .filter(|c| !c.default_enabled)
            .map(|c| {
                let permission = Permission::named(format!("cmd:{}", c.name));
                CommandPrivilege {
                    command: c.name.clone(),
                    users: permissions.targeted_users(&permission),
                    roles: permissions.targeted_roles(&permission),
                }
            })
            .collect()
    }
}

// =============================================================================
// Assembler
// =============================================================================

#[derive(Clone)]
struct Slot {
    seq: usize,
    descriptor: Arc<CommandDescriptor>,
}

#[derive(Default)]
struct GroupNode {
    leaf: Option<Slot>,
    leaves: BTreeMap<String, Slot>,
}

#[derive(Default)]
struct TopNode {
    leaf: Option<Slot>,
    groups: BTreeMap<String, GroupNode>,
}

/// Incremental tree builder.
#[derive(Default)]
pub struct TreeAssembler {
    nodes: BTreeMap<String, TopNode>,
    descriptions: HashMap<(String, Option<String>), String>,
    diagnostics: Vec<TreeDiagnostic>,
    next_seq: usize,
    public_role: Option<RoleId>,
}

impl TreeAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `Role(role)` leaves as public when deriving `default_enabled`.
    pub fn public_role(mut self, role: RoleId) -> Self {
        self.public_role = Some(role);
        self
    }

    fn is_public(&self, permission: &Permission) -> bool {
        match self.public_role {
            Some(role) => permission.is_public(role),
            None => permission.is_everyone(),
        }
    }

    /// Records a node description declared by `module`.
    pub fn describe(&mut self, description: &GroupDescription, module: &str) {
        let key = (description.command.clone(), description.group.clone());
        if self.descriptions.contains_key(&key) {
            let node = match &description.group {
                Some(group) => format!("{} {group}", description.command),
                None => description.command.clone(),
            };
            self.report(TreeDiagnostic::DuplicateDescription {
                node,
                module: module.to_string(),
            });
            return;
        }
        self.descriptions
            .insert(key, description.description.clone());
    }

    /// Places one descriptor.
    pub fn insert(&mut self, descriptor: Arc<CommandDescriptor>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let slot = Slot { seq, descriptor };
        let command = slot.descriptor.command_name().to_string();

        let group = slot.descriptor.subcommand_group().map(str::to_string);
        let sub = slot.descriptor.subcommand_name().map(str::to_string);

        let mut found = Vec::new();
        let node = self.nodes.entry(command.clone()).or_default();
        match (group, sub) {
            (None, None) => {
                if !node.groups.is_empty() {
                    found.push(TreeDiagnostic::ShadowedTopLevel {
                        command,
                        module: module_of(&slot),
                    });
                } else if let Some(kept) = &node.leaf {
                    found.push(duplicate(&slot, kept));
                } else {
                    node.leaf = Some(slot);
                }
            }
            (None, Some(sub)) => {
                if let Some(shadowed) = node.leaf.take() {
                    found.push(TreeDiagnostic::ShadowedTopLevel {
                        command: command.clone(),
                        module: module_of(&shadowed),
                    });
                }
                let group = node.groups.entry(sub.clone()).or_default();
                if !group.leaves.is_empty() {
                    found.push(TreeDiagnostic::ShadowedSubcommand {
                        command,
                        subcommand: sub,
                        module: module_of(&slot),
                    });
                } else if let Some(kept) = &group.leaf {
                    found.push(duplicate(&slot, kept));
                } else {
                    group.leaf = Some(slot);
                }
            }
            (Some(group_name), Some(sub)) => {
                if let Some(shadowed) = node.leaf.take() {
                    found.push(TreeDiagnostic::ShadowedTopLevel {
                        command: command.clone(),
                        module: module_of(&shadowed),
                    });
                }
                let group = node.groups.entry(group_name.clone()).or_default();
                if let Some(shadowed) = group.leaf.take() {
                    found.push(TreeDiagnostic::ShadowedSubcommand {
                        command,
                        subcommand: group_name,
                        module: module_of(&shadowed),
                    });
                }
                match group.leaves.get(&sub) {
                    Some(kept) => found.push(duplicate(&slot, kept)),
                    None => {
                        group.leaves.insert(sub, slot);
                    }
                }
            }
            // Rejected by CommandDescriptor::new.
            (Some(_), None) => {}
        }

        for diagnostic in found {
            self.report(diagnostic);
        }
    }

    /// Inserts every descriptor and description of `modules`, in order.
    pub fn insert_modules<'a>(&mut self, modules: impl IntoIterator<Item = &'a LoadedModule>) {
        for module in modules {
            for description in module.group_descriptions() {
                self.describe(description, module.name());
            }
            for descriptor in module.commands() {
                self.insert(Arc::clone(descriptor));
            }
        }
    }

    /// Emits the registrable tree and the path index.
    pub fn finish(mut self) -> AssembledTree {
        self.enforce_child_limits();

        let mut slots: Vec<&Slot> = Vec::new();
        for node in self.nodes.values() {
            slots.extend(node.leaf.as_ref());
            for group in node.groups.values() {
                slots.extend(group.leaf.as_ref());
                slots.extend(group.leaves.values());
            }
        }
        slots.sort_by_key(|s| s.seq);

        let mut index = PathIndex::new();
        let mut collided = HashSet::new();
        let mut found = Vec::new();
        for slot in slots {
            let path = slot.descriptor.path();
            match index.entries.get(&path) {
                Some(kept) => {
                    found.push(TreeDiagnostic::PathCollision {
                        path,
                        module: module_of(slot),
                        kept: kept.module().to_string(),
                    });
                    collided.insert(slot.seq);
                }
                None => {
                    index.entries.insert(path, Arc::clone(&slot.descriptor));
                }
            }
        }
        for diagnostic in found {
            self.report(diagnostic);
        }

        let commands = self
            .nodes
            .iter()
            .filter_map(|(name, node)| self.command_data(name, node, &collided))
            .collect::<Vec<_>>();
        debug!(
            commands = commands.len(),
            paths = index.len(),
            diagnostics = self.diagnostics.len(),
            "Assembled command tree"
        );

        AssembledTree {
            commands,
            index,
            diagnostics: self.diagnostics,
        }
    }

    fn enforce_child_limits(&mut self) {
        let mut found = Vec::new();
        for (name, node) in &mut self.nodes {
            if node.groups.len() > MAX_CHILDREN {
                let dropped = split_excess(&mut node.groups);
                found.push(TreeDiagnostic::TooManyChildren {
                    node: name.clone(),
                    dropped,
                });
            }
            for (group_name, group) in &mut node.groups {
                if group.leaves.len() > MAX_CHILDREN {
                    let dropped = split_excess(&mut group.leaves);
                    found.push(TreeDiagnostic::TooManyChildren {
                        node: format!("{name} {group_name}"),
                        dropped,
                    });
                }
            }
        }
        for diagnostic in found {
            self.report(diagnostic);
        }
    }

    fn command_data(
        &self,
        name: &str,
        node: &TopNode,
        collided: &HashSet<usize>,
    ) -> Option<CommandData> {
        let live = |slot: &&Slot| !collided.contains(&slot.seq);

        if let Some(slot) = node.leaf.as_ref().filter(live) {
            let d = &slot.descriptor;
            return Some(CommandData {
                name: name.to_string(),
                description: d.description().to_string(),
                options: options_of(d),
                subcommands: Vec::new(),
                groups: Vec::new(),
                default_enabled: self.is_public(d.permission()),
            });
        }

        let mut default_enabled = true;
        let mut subcommands = Vec::new();
        let mut groups = Vec::new();
        for (group_name, group) in &node.groups {
            if let Some(slot) = group.leaf.as_ref().filter(live) {
                default_enabled &= self.is_public(slot.descriptor.permission());
                subcommands.push(subcommand_data(group_name, &slot.descriptor));
                continue;
            }
            let leaves: Vec<SubcommandData> = group
                .leaves
                .iter()
                .filter(|(_, slot)| live(slot))
                .map(|(sub, slot)| {
                    default_enabled &= self.is_public(slot.descriptor.permission());
                    subcommand_data(sub, &slot.descriptor)
                })
                .collect();
            if !leaves.is_empty() {
                groups.push(SubcommandGroupData {
                    name: group_name.clone(),
                    description: self.description_for(name, Some(group_name)),
                    subcommands: leaves,
                });
            }
        }

        if subcommands.is_empty() && groups.is_empty() {
            return None;
        }
        Some(CommandData {
            name: name.to_string(),
            description: self.description_for(name, None),
            options: Vec::new(),
            subcommands,
            groups,
            default_enabled,
        })
    }

    fn description_for(&self, command: &str, group: Option<&str>) -> String {
        self.descriptions
            .get(&(command.to_string(), group.map(str::to_string)))
            .cloned()
            .unwrap_or_else(|| group.unwrap_or(command).to_string())
    }

    fn report(&mut self, diagnostic: TreeDiagnostic) {
        error!(%diagnostic, "Command tree conflict");
        self.diagnostics.push(diagnostic);
    }
}

/// Assembles the tree for `modules`.
pub fn assemble<'a>(modules: impl IntoIterator<Item = &'a LoadedModule>) -> AssembledTree {
    let mut assembler = TreeAssembler::new();
    assembler.insert_modules(modules);
    assembler.finish()
}

fn module_of(slot: &Slot) -> String {
    slot.descriptor.module().to_string()
}

fn duplicate(slot: &Slot, kept: &Slot) -> TreeDiagnostic {
    TreeDiagnostic::DuplicatePath {
        path: slot.descriptor.path(),
        module: module_of(slot),
        kept: module_of(kept),
    }
}

/// Keeps the first [`MAX_CHILDREN`] entries by name, returns the rest's names.
fn split_excess<V>(children: &mut BTreeMap<String, V>) -> Vec<String> {
    let Some(first_dropped) = children.keys().nth(MAX_CHILDREN).cloned() else {
        return Vec::new();
    };
    children.split_off(&first_dropped).into_keys().collect()
}

fn subcommand_data(name: &str, descriptor: &CommandDescriptor) -> SubcommandData {
    SubcommandData {
        name: name.to_string(),
        description: descriptor.description().to_string(),
        options: options_of(descriptor),
    }
}

fn options_of(descriptor: &CommandDescriptor) -> Vec<OptionData> {
    descriptor
        .parameters()
        .map(|(param, required)| option_data(param, required))
        .collect()
}

fn option_data(param: &Parameter, required: bool) -> OptionData {
    OptionData {
        kind: param.kind(),
        name: param.name().to_string(),
        description: param.description().to_string(),
        required,
        choices: param
            .choices()
            .iter()
            .map(|c| OptionChoiceData {
                name: c.label.clone(),
                value: c.value.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::{Member, ParameterType, UserId};

    use crate::descriptor::tests::{descriptor, noop};
    use crate::descriptor::DescriptorParts;

    fn everyone(command: &str, group: Option<&str>, sub: Option<&str>) -> Arc<CommandDescriptor> {
        Arc::new(descriptor(command, group, sub, Permission::Everyone))
    }

    fn restricted(command: &str, group: Option<&str>, sub: Option<&str>) -> Arc<CommandDescriptor> {
        Arc::new(descriptor(
            command,
            group,
            sub,
            Permission::named(format!("cmd:{command}")),
        ))
    }

    fn build(descriptors: Vec<Arc<CommandDescriptor>>) -> AssembledTree {
        let mut assembler = TreeAssembler::new();
        for d in descriptors {
            assembler.insert(d);
        }
        assembler.finish()
    }

    #[test]
    fn test_conflict_free_index_has_one_entry_per_path() {
        let input = vec![
            everyone("ping", None, None),
            everyone("module", None, Some("enable")),
            everyone("module", None, Some("disable")),
            everyone("admin", Some("caches"), Some("invalidate")),
            everyone("admin", Some("caches"), Some("stats")),
        ];
        let tree = build(input.clone());
        assert!(tree.diagnostics.is_empty());
        assert_eq!(tree.index.len(), input.len());
        for d in &input {
            assert!(Arc::ptr_eq(tree.index.get(&d.path()).unwrap(), d));
        }
        let names: Vec<_> = tree.commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["admin", "module", "ping"]);
    }

    #[test]
    fn test_grouped_command_shadows_earlier_top_level_leaf() {
        let tree = build(vec![
            everyone("ping", None, None),
            everyone("ping", Some("admin"), Some("restart")),
        ]);
        assert_eq!(
            tree.diagnostics,
            vec![TreeDiagnostic::ShadowedTopLevel {
                command: "ping".into(),
                module: "test".into(),
            }]
        );
        assert!(tree.index.get("ping").is_none());
        assert!(tree.index.get("restart/admin/restart").is_some());

        let ping = &tree.commands[0];
        assert!(ping.options.is_empty());
        assert_eq!(ping.groups[0].name, "admin");
        assert_eq!(ping.groups[0].subcommands[0].name, "restart");
    }

    #[test]
    fn test_top_level_leaf_after_children_is_dropped() {
        let tree = build(vec![
            everyone("module", None, Some("enable")),
            everyone("module", None, None),
        ]);
        assert!(matches!(
            tree.diagnostics[0],
            TreeDiagnostic::ShadowedTopLevel { .. }
        ));
        assert!(tree.index.get("module").is_none());
        assert!(tree.index.get("module/enable").is_some());
    }

    #[test]
    fn test_subcommand_leaf_shadowed_by_group() {
        let tree = build(vec![
            everyone("admin", None, Some("caches")),
            everyone("admin", Some("caches"), Some("invalidate")),
            everyone("admin", None, Some("caches")),
        ]);
        assert_eq!(tree.diagnostics.len(), 2);
        assert!(
            tree.diagnostics
                .iter()
                .all(|d| matches!(d, TreeDiagnostic::ShadowedSubcommand { .. }))
        );
        assert!(tree.index.get("admin/caches").is_none());
        assert_eq!(tree.index.paths(), vec!["invalidate/caches/invalidate"]);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let first = everyone("ping", None, None);
        let tree = build(vec![Arc::clone(&first), restricted("ping", None, None)]);
        assert!(matches!(
            tree.diagnostics[0],
            TreeDiagnostic::DuplicatePath { .. }
        ));
        assert!(Arc::ptr_eq(tree.index.get("ping").unwrap(), &first));
        assert!(tree.commands[0].default_enabled);
    }

    #[test]
    fn test_path_collision_across_commands() {
        let first = everyone("alpha", Some("tools"), Some("run"));
        let tree = build(vec![
            Arc::clone(&first),
            everyone("beta", Some("tools"), Some("run")),
        ]);
        assert!(matches!(
            tree.diagnostics[0],
            TreeDiagnostic::PathCollision { .. }
        ));
        assert!(Arc::ptr_eq(tree.index.get("run/tools/run").unwrap(), &first));
        let names: Vec<_> = tree.commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha"]);
        assert!(tree.check(true).is_err());
        assert!(tree.check(false).is_ok());
    }

    #[test]
    fn test_default_enabled_requires_every_leaf_public() {
        let tree = build(vec![
            everyone("module", None, Some("status")),
            restricted("module", None, Some("enable")),
            everyone("ping", None, None),
        ]);
        let module = tree.commands.iter().find(|c| c.name == "module").unwrap();
        assert!(!module.default_enabled);
        assert_eq!(module.description, "module");

        let permissions = PermissionManager::in_memory(RoleId(1));
        permissions.grant_user(UserId(7), "cmd:module");
        permissions.grant_role(RoleId(9), "cmd:module");
        permissions.grant_all(UserId(3));
        let privileges = tree.privileges(&permissions);
        assert_eq!(privileges.len(), 1);
        assert_eq!(privileges[0].command, "module");
        assert_eq!(privileges[0].users, vec![UserId(3), UserId(7)]);
        assert_eq!(privileges[0].roles, vec![RoleId(9)]);
        let member = Member::new(UserId(7), Vec::<RoleId>::new());
        assert!(permissions.member_has_permission(&Permission::named("cmd:module"), &member));
    }

    #[test]
    fn test_public_role_leaf_is_default_enabled() {
        let public = RoleId(1000);
        let raw = |sub: &str| {
            Arc::new(descriptor("module", None, Some(sub), Permission::Role(public)))
        };
        let mut assembler = TreeAssembler::new().public_role(public);
        assembler.insert(raw("status"));
        assembler.insert(everyone("module", None, Some("list")));
        let tree = assembler.finish();
        assert!(tree.commands[0].default_enabled);
        assert!(tree.privileges(&PermissionManager::in_memory(public)).is_empty());

        let without = build(vec![raw("status")]);
        assert!(!without.commands[0].default_enabled);
    }

    #[test]
    fn test_descriptions_and_duplicates() {
        let mut assembler = TreeAssembler::new();
        assembler.describe(&GroupDescription::command("admin", "Administration"), "admin");
        assembler.describe(&GroupDescription::group("admin", "caches", "Cache control"), "admin");
        assembler.describe(&GroupDescription::command("admin", "Other"), "rogue");
        assembler.insert(everyone("admin", Some("caches"), Some("invalidate")));
        let tree = assembler.finish();

        assert_eq!(tree.commands[0].description, "Administration");
        assert_eq!(tree.commands[0].groups[0].description, "Cache control");
        assert_eq!(
            tree.diagnostics,
            vec![TreeDiagnostic::DuplicateDescription {
                node: "admin".into(),
                module: "rogue".into(),
            }]
        );
    }

    #[test]
    fn test_child_limit() {
        let input: Vec<_> = (0..27)
            .map(|i| everyone("many", None, Some(&format!("s{i:02}"))))
            .collect();
        let tree = build(input);
        assert_eq!(tree.commands[0].subcommands.len(), MAX_CHILDREN);
        assert_eq!(tree.index.len(), MAX_CHILDREN);
        assert_eq!(
            tree.diagnostics,
            vec![TreeDiagnostic::TooManyChildren {
                node: "many".into(),
                dropped: vec!["s25".into(), "s26".into()],
            }]
        );
    }

    #[test]
    fn test_options_required_first() {
        let d = CommandDescriptor::new(DescriptorParts {
            module: "test".into(),
            command_name: "play".into(),
            subcommand_group: None,
            subcommand_name: None,
            description: "Play".into(),
            required: vec![Parameter::new(ParameterType::String, "query", "Search").unwrap()],
            optional: vec![Parameter::new(ParameterType::Integer, "slot", "Slot").unwrap()],
            permission: Permission::Everyone,
            invoke: noop(),
        })
        .unwrap();
        let tree = build(vec![Arc::new(d)]);
        let options = &tree.commands[0].options;
        assert_eq!(options[0].name, "query");
        assert!(options[0].required);
        assert_eq!(options[1].name, "slot");
        assert!(!options[1].required);
    }
}
