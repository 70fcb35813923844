//! Batch parsing
//!
//! Commands are separated by `--` words. Words of a command that start with
//! `--` before its name are that command's options.

use crate::command::{Catalogue, Command, CommandOptions};
use cfgctl_core::{CtlError, Result};

/// Parse a whole batch
///
/// # Errors
///
/// Unknown commands or options, repeated options, wrong arity, or an empty
/// batch.
pub fn parse_commands(catalogue: &Catalogue, words: &[String]) -> Result<Vec<Command>> {
    let commands = words
        .split(|w| w == "--")
        .filter(|group| !group.is_empty())
        .map(|group| parse_command(catalogue, group))
        .collect::<Result<Vec<_>>>()?;
    if commands.is_empty() {
        return Err(CtlError::MissingCommandName.into());
    }
    Ok(commands)
}

fn parse_command(catalogue: &Catalogue, words: &[String]) -> Result<Command> {
    let n_options = words.iter().take_while(|w| w.starts_with("--")).count();
    let (option_words, rest) = words.split_at(n_options);
    let Some((name, args)) = rest.split_first() else {
        return Err(CtlError::MissingCommandName.into());
    };
    let syntax = catalogue
        .get(name)
        .ok_or_else(|| CtlError::UnknownCommand { name: name.clone() })?;

    let mut options = CommandOptions::new();
    for word in option_words {
        let (option, value) = match word.split_once('=') {
            Some((o, v)) => (o.to_string(), Some(v.to_string())),
            None => (word.clone(), None),
        };
        let takes_value = syntax.option_spec(&option).ok_or_else(|| CtlError::UnknownOption {
            command: syntax.name.to_string(),
            option: option.clone(),
        })?;
        match (takes_value, &value) {
            (true, None) => {
                return Err(CtlError::OptionRequiresArgument {
                    command: syntax.name.to_string(),
                    option,
                }
                .into())
            }
            (false, Some(_)) => {
                return Err(CtlError::OptionTakesNoArgument {
                    command: syntax.name.to_string(),
                    option,
                }
                .into())
            }
            _ => {}
        }
        if options.contains_key(&option) {
            return Err(CtlError::DuplicateOption { option }.into());
        }
        options.insert(option, value);
    }

    if args.len() < syntax.min_args {
        return Err(CtlError::TooFewArguments {
            command: syntax.name.to_string(),
            min: syntax.min_args,
        }
        .into());
    }
    if args.len() > syntax.max_args {
        return Err(CtlError::TooManyArguments {
            command: syntax.name.to_string(),
            max: syntax.max_args,
        }
        .into());
    }

    Ok(Command::new(syntax, args.to_vec(), options))
}
