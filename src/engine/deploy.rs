//! Command deployment: name validation and merging of shared roots.
//!
//! Multiple flow commands may share a root or subcommand group, e.g.
//! `settings view` and `settings edit`. Before the bulk registration is
//! pushed upstream the full name set is validated pairwise, then specs
//! with the same root are merged into one registration entry.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::model::{CommandOptionType, CommandSpec};

#[derive(Debug, Error, Diagnostic)]
pub enum DeployError {
    #[error("empty command name")]
    #[diagnostic(code(flowcord::deploy::empty_command_name))]
    EmptyCommandName,

    #[error("duplicate command name: {0}")]
    #[diagnostic(code(flowcord::deploy::duplicate_command_name))]
    DuplicateCommandName(String),

    #[error("mixed nested and unnested commands: {0}, {1}")]
    #[diagnostic(
        code(flowcord::deploy::mixed_commands),
        help("a root command cannot coexist with subcommands of the same root")
    )]
    MixedCommands(String, String),

    #[error("duplicate subcommand name: {0}")]
    #[diagnostic(code(flowcord::deploy::duplicate_subcommand_name))]
    DuplicateSubcommandName(String),

    #[error("mixed nested and unnested subcommands: {0}, {1}")]
    #[diagnostic(code(flowcord::deploy::mixed_subcommands))]
    MixedSubcommands(String, String),
}

/// Pairwise validation of the app's full command names.
pub fn validate_command_names(names: &[String]) -> Result<(), DeployError> {
    for (a, a_name) in names.iter().enumerate() {
        if a_name.is_empty() {
            return Err(DeployError::EmptyCommandName);
        }
        let a_parts: Vec<&str> = a_name.split(' ').collect();

        for (b, b_name) in names.iter().enumerate() {
            if a == b {
                continue;
            }
            let b_parts: Vec<&str> = b_name.split(' ').collect();
            if a_parts[0] != b_parts[0] {
                continue;
            }

            if a_parts.len() == 1 && b_parts.len() == 1 {
                return Err(DeployError::DuplicateCommandName(a_name.clone()));
            }
            if a_parts.len() == 1 || b_parts.len() == 1 {
                return Err(DeployError::MixedCommands(a_name.clone(), b_name.clone()));
            }

            if a_parts[1] != b_parts[1] {
                continue;
            }
            if a_parts.len() == 2 && b_parts.len() == 2 {
                return Err(DeployError::DuplicateSubcommandName(a_name.clone()));
            }
            if a_parts.len() == 2 || b_parts.len() == 2 {
                return Err(DeployError::MixedSubcommands(
                    a_name.clone(),
                    b_name.clone(),
                ));
            }
            if a_parts[2] == b_parts[2] {
                return Err(DeployError::DuplicateSubcommandName(a_name.clone()));
            }
        }
    }
    Ok(())
}

/// Merges specs sharing a root into one registration entry, then merges
/// subcommand groups of the same name within each root. Assumes the name
/// set already validated.
pub fn merge_commands(commands: Vec<CommandSpec>) -> Vec<CommandSpec> {
    let mut roots: FxHashMap<String, CommandSpec> = FxHashMap::default();
    let mut order: Vec<String> = Vec::new();

    for command in commands {
        match roots.get_mut(&command.name) {
            Some(existing) => existing.options.extend(command.options),
            None => {
                order.push(command.name.clone());
                roots.insert(command.name.clone(), command);
            }
        }
    }

    for root in roots.values_mut() {
        let mut groups: FxHashMap<String, usize> = FxHashMap::default();
        let mut merged = Vec::with_capacity(root.options.len());
        for option in root.options.drain(..) {
            if option.kind == CommandOptionType::SubCommandGroup {
                match groups.get(&option.name) {
                    Some(&at) => {
                        let slot: &mut crate::model::CommandOptionSpec = &mut merged[at];
                        slot.options.extend(option.options);
                        continue;
                    }
                    None => {
                        groups.insert(option.name.clone(), merged.len());
                    }
                }
            }
            merged.push(option);
        }
        root.options = merged;
    }

    order
        .into_iter()
        .filter_map(|name| roots.remove(&name))
        .collect()
}
