//! Command model
//!
//! A [`CommandSyntax`] describes one command of the catalogue; a parsed
//! [`Command`] binds it to arguments and options for one batch and carries
//! its per-attempt output.

use cfgctl_core::{ExError, InvocationContext, Result, SymbolTable, Table};
use cfgctl_store::{Schema, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Options given to one command: `--name` or `--name=value`
pub type CommandOptions = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

/// How a handler stops a batch early
#[derive(Debug, Clone)]
pub enum HandlerSignal {
    /// Abandon the invocation with this error
    Fatal(ExError),
    /// Discard the attempt and rerun the batch on a newer snapshot
    TryAgain,
}

impl From<ExError> for HandlerSignal {
    fn from(err: ExError) -> Self {
        HandlerSignal::Fatal(err)
    }
}

impl From<cfgctl_core::CtlError> for HandlerSignal {
    fn from(err: cfgctl_core::CtlError) -> Self {
        HandlerSignal::Fatal(err.into())
    }
}

pub type HandlerResult = std::result::Result<(), HandlerSignal>;

/// Checks run once per invocation, before any attempt
pub struct PrereqContext<'a> {
    pub schema: &'a Schema,
    pub args: &'a [String],
    pub options: &'a CommandOptions,
    pub invocation: &'a mut InvocationContext,
}

/// What a handler sees during one attempt
pub struct CommandContext<'a> {
    pub args: &'a [String],
    pub options: &'a CommandOptions,
    pub output: &'a mut String,
    pub table: &'a mut Option<Table>,
    /// Row created by this command, for postprocessing
    pub created: &'a mut Option<Uuid>,
    pub txn: &'a mut Transaction,
    pub symtab: &'a mut SymbolTable,
    pub invocation: &'a InvocationContext,
}

impl<'a> CommandContext<'a> {
    pub fn has_option(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    pub fn option_value(&self, name: &str) -> Option<&'a str> {
        self.options.get(name).and_then(|v| v.as_deref())
    }

    pub fn schema(&self) -> std::sync::Arc<Schema> {
        self.txn.snapshot().schema().clone()
    }
}

pub type PrereqFn = fn(&mut PrereqContext<'_>) -> Result<()>;
pub type RunFn = fn(&mut CommandContext<'_>) -> HandlerResult;
pub type PostprocessFn = fn(&mut Command) -> Result<()>;

pub struct CommandSyntax {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    /// Argument synopsis for help output
    pub arguments: &'static str,
    /// Comma-separated option names; a trailing `=` means the option takes a value
    pub options: &'static str,
    pub mode: Mode,
    pub prerequisites: Option<PrereqFn>,
    pub run: RunFn,
    pub postprocess: Option<PostprocessFn>,
    pub help: &'static str,
}

impl CommandSyntax {
    /// Whether `option` is accepted, and whether it takes a value
    pub fn option_spec(&self, option: &str) -> Option<bool> {
        self.options
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .find_map(|spec| match spec.strip_suffix('=') {
                Some(name) if name == option => Some(true),
                None if spec == option => Some(false),
                _ => None,
            })
    }
}

impl std::fmt::Debug for CommandSyntax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSyntax")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Debug)]
pub struct Command {
    pub syntax: &'static CommandSyntax,
    pub args: Vec<String>,
    pub options: CommandOptions,
    pub output: String,
    pub table: Option<Table>,
    pub created: Option<Uuid>,
}

impl Command {
    pub fn new(syntax: &'static CommandSyntax, args: Vec<String>, options: CommandOptions) -> Self {
        Self {
            syntax,
            args,
            options,
            output: String::new(),
            table: None,
            created: None,
        }
    }

    /// Drop everything a previous attempt produced
    pub fn reset(&mut self) {
        self.output.clear();
        self.table = None;
        self.created = None;
    }
}

/// The set of commands a batch may use
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    commands: BTreeMap<&'static str, &'static CommandSyntax>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema-driven commands shipped with cfgctl
    pub fn generic() -> Self {
        let mut catalogue = Self::new();
        for syntax in crate::commands::GENERIC_COMMANDS {
            catalogue.register(syntax);
        }
        catalogue
    }

    pub fn register(&mut self, syntax: &'static CommandSyntax) {
        self.commands.insert(syntax.name, syntax);
    }

    pub fn get(&self, name: &str) -> Option<&'static CommandSyntax> {
        self.commands.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static CommandSyntax> + '_ {
        self.commands.values().copied()
    }

    /// One line per command, for `--help`
    pub fn usage(&self) -> String {
        self.iter()
            .map(|s| {
                let opts = if s.options.is_empty() {
                    String::new()
                } else {
                    format!("[{}] ", s.options.replace(',', "|"))
                };
                format!("  {}{} {}\n      {}\n", opts, s.name, s.arguments, s.help)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut CommandContext<'_>) -> HandlerResult {
        Ok(())
    }

    static SAMPLE: CommandSyntax = CommandSyntax {
        name: "sample",
        min_args: 0,
        max_args: 1,
        arguments: "[X]",
        options: "--id=,--if-exists",
        mode: Mode::ReadOnly,
        prerequisites: None,
        run: noop,
        postprocess: None,
        help: "test command",
    };

    #[test]
    fn test_option_spec() {
        assert_eq!(SAMPLE.option_spec("--id"), Some(true));
        assert_eq!(SAMPLE.option_spec("--if-exists"), Some(false));
        assert_eq!(SAMPLE.option_spec("--all"), None);
    }

    #[test]
    fn test_catalogue_register_and_usage() {
        let mut catalogue = Catalogue::new();
        catalogue.register(&SAMPLE);
        assert!(catalogue.get("sample").is_some());
        assert!(catalogue.get("nope").is_none());
        assert!(catalogue.usage().contains("[--id=|--if-exists] sample [X]"));
    }

    #[test]
    fn test_reset_clears_output() {
        let mut cmd = Command::new(&SAMPLE, vec![], CommandOptions::new());
        cmd.output.push_str("stale");
        cmd.table = Some(Table::new(["a"]));
        cmd.created = Some(Uuid::new_v4());
        cmd.reset();
        assert!(cmd.output.is_empty());
        assert!(cmd.table.is_none());
        assert!(cmd.created.is_none());
    }
}
