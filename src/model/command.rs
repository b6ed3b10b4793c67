//! Command set types
//!
//! Commands are grouped by applicability: a universal group that runs on
//! every target, and one group per [`TargetMode`].

use super::Validate;
use super::errors::ConfigError;
use super::target::TargetMode;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Body of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandBody {
    /// A shell string, run through `sh -c`
    Shell(String),
    /// An argv list, run without a shell where the backend allows it
    Argv(Vec<String>),
}

impl CommandBody {
    /// Creates a shell body
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell(command.into())
    }

    /// Creates an argv body
    #[must_use]
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Argv(args.into_iter().map(Into::into).collect())
    }

    /// Renders the body as a single shell string
    ///
    /// Argv bodies are quoted so that a shell reproduces the same argv.
    #[must_use]
    pub fn to_shell_string(&self) -> String {
        match self {
            Self::Shell(command) => command.clone(),
            Self::Argv(args) => shell_words::join(args),
        }
    }

    /// Renders the body as an argv list
    ///
    /// Shell bodies are wrapped as `sh -c <command>`.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            Self::Shell(command) => vec!["sh".to_string(), "-c".to_string(), command.clone()],
            Self::Argv(args) => args.clone(),
        }
    }

    fn check(&self, name: &str) -> Result<(), ConfigError> {
        let malformed = |reason: &str| ConfigError::MalformedCommand {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        match self {
            Self::Shell(command) if command.trim().is_empty() => Err(malformed("empty command")),
            Self::Argv(args) if args.is_empty() => Err(malformed("empty argument list")),
            Self::Argv(args) if args[0].trim().is_empty() => Err(malformed("empty program name")),
            _ => Ok(()),
        }
    }
}

impl From<&str> for CommandBody {
    fn from(command: &str) -> Self {
        Self::Shell(command.to_string())
    }
}

impl From<String> for CommandBody {
    fn from(command: String) -> Self {
        Self::Shell(command)
    }
}

impl From<Vec<String>> for CommandBody {
    fn from(args: Vec<String>) -> Self {
        Self::Argv(args)
    }
}

impl fmt::Display for CommandBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}

/// A named command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCommand {
    /// Command name, the second-level report key
    pub name: String,
    /// What to run
    pub body: CommandBody,
}

/// Ordered mapping from command name to body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandGroup {
    commands: Vec<NamedCommand>,
}

impl CommandGroup {
    /// Creates an empty group
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the group has no commands
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Looks up a command by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandBody> {
        self.commands
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.body)
    }

    /// Iterates commands in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &NamedCommand> {
        self.commands.iter()
    }

    /// Appends a command; a name already present is kept in the group and
    /// reported by [`Validate::validate`]
    pub fn push(&mut self, name: impl Into<String>, body: impl Into<CommandBody>) {
        self.commands.push(NamedCommand {
            name: name.into(),
            body: body.into(),
        });
    }

    fn check(&self, group: &str) -> Result<(), ConfigError> {
        for (idx, command) in self.commands.iter().enumerate() {
            if command.name.trim().is_empty() {
                return Err(ConfigError::MalformedCommand {
                    name: command.name.clone(),
                    reason: format!("empty command name in group '{group}'"),
                });
            }
            if self.commands[..idx].iter().any(|c| c.name == command.name) {
                return Err(ConfigError::DuplicateCommand {
                    group: group.to_string(),
                    name: command.name.clone(),
                });
            }
            command.body.check(&command.name)?;
        }
        Ok(())
    }
}

impl<N: Into<String>, B: Into<CommandBody>> FromIterator<(N, B)> for CommandGroup {
    fn from_iter<T: IntoIterator<Item = (N, B)>>(iter: T) -> Self {
        let mut group = Self::new();
        for (name, body) in iter {
            group.push(name, body);
        }
        group
    }
}

struct CommandGroupVisitor;

impl<'de> Visitor<'de> for CommandGroupVisitor {
    type Value = CommandGroup;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of command names to command bodies")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(CommandGroup::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut group = CommandGroup::new();
        while let Some((name, body)) = map.next_entry::<String, CommandBody>()? {
            group.push(name, body);
        }
        Ok(group)
    }
}

impl<'de> Deserialize<'de> for CommandGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CommandGroupVisitor)
    }
}

/// Commands partitioned by applicability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSet {
    universal: CommandGroup,
    per_mode: Vec<(TargetMode, CommandGroup)>,
}

impl CommandSet {
    /// Creates an empty command set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command that runs on every target
    #[must_use]
    pub fn universal(mut self, name: impl Into<String>, body: impl Into<CommandBody>) -> Self {
        self.universal.push(name, body);
        self
    }

    /// Adds a command that runs only on targets of `mode`
    #[must_use]
    pub fn for_mode(
        mut self,
        mode: TargetMode,
        name: impl Into<String>,
        body: impl Into<CommandBody>,
    ) -> Self {
        self.group_mut(mode).push(name, body);
        self
    }

    /// Replaces the universal group
    #[must_use]
    pub fn with_universal_group(mut self, group: CommandGroup) -> Self {
        self.universal = group;
        self
    }

    /// Replaces the group for `mode`
    #[must_use]
    pub fn with_mode_group(mut self, mode: TargetMode, group: CommandGroup) -> Self {
        *self.group_mut(mode) = group;
        self
    }

    fn group_mut(&mut self, mode: TargetMode) -> &mut CommandGroup {
        let idx = match self.per_mode.iter().position(|(m, _)| *m == mode) {
            Some(idx) => idx,
            None => {
                self.per_mode.push((mode, CommandGroup::new()));
                self.per_mode.len() - 1
            }
        };
        &mut self.per_mode[idx].1
    }

    /// Returns the universal group
    #[must_use]
    pub fn universal_group(&self) -> &CommandGroup {
        &self.universal
    }

    /// Returns the group for `mode`, if any commands were added for it
    #[must_use]
    pub fn mode_group(&self, mode: TargetMode) -> Option<&CommandGroup> {
        self.per_mode
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, group)| group)
    }

    /// Returns true if no command applies to any mode
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.universal.is_empty() && self.per_mode.iter().all(|(_, g)| g.is_empty())
    }

    /// Returns the commands that apply to `mode`, in run order
    ///
    /// Universal commands come first. A per-mode command with the same name
    /// as a universal one replaces its body in place; the remaining per-mode
    /// commands follow in their own order.
    #[must_use]
    pub fn applicable(&self, mode: TargetMode) -> Vec<&NamedCommand> {
        let specific = self.mode_group(mode);
        let mut commands: Vec<&NamedCommand> = self
            .universal
            .iter()
            .map(|universal| {
                specific
                    .and_then(|group| group.iter().find(|c| c.name == universal.name))
                    .unwrap_or(universal)
            })
            .collect();

        if let Some(group) = specific {
            commands.extend(
                group
                    .iter()
                    .filter(|c| self.universal.get(&c.name).is_none()),
            );
        }
        commands
    }
}

impl Validate for CommandSet {
    type Error = ConfigError;

    fn validate(&self) -> Result<(), Self::Error> {
        self.universal.check("universal")?;
        for (mode, group) in &self.per_mode {
            group.check(&mode.to_string())?;
        }
        Ok(())
    }
}
