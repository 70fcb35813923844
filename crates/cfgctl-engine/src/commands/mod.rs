//! The schema-driven command catalogue
//!
//! Every command works on any table of the loaded schema. Records are named
//! by uuid, by `@symbol`, by the table's index column, or by `.` for a table
//! that holds one row.

mod read;
pub mod records;
mod write;

use crate::command::{CommandContext, CommandSyntax, HandlerResult, Mode, PrereqContext};
use cfgctl_core::{Result, WaitType};
use tracing::info;

const UNLIMITED: usize = usize::MAX;

fn init(_ctx: &mut CommandContext<'_>) -> HandlerResult {
    Ok(())
}

fn sync_prereq(ctx: &mut PrereqContext<'_>) -> Result<()> {
    if ctx.invocation.wait != WaitType::None {
        ctx.invocation.force_wait = true;
    } else {
        info!("\"sync\" command has no effect without --wait");
    }
    Ok(())
}

fn sync(_ctx: &mut CommandContext<'_>) -> HandlerResult {
    Ok(())
}

pub static GENERIC_COMMANDS: &[CommandSyntax] = &[
    CommandSyntax {
        name: "init",
        min_args: 0,
        max_args: 0,
        arguments: "",
        options: "",
        mode: Mode::ReadWrite,
        prerequisites: None,
        run: init,
        postprocess: None,
        help: "initialize the database",
    },
    CommandSyntax {
        name: "sync",
        min_args: 0,
        max_args: 0,
        arguments: "",
        options: "",
        mode: Mode::ReadOnly,
        prerequisites: Some(sync_prereq),
        run: sync,
        postprocess: None,
        help: "wait until earlier changes have been applied",
    },
    CommandSyntax {
        name: "show",
        min_args: 0,
        max_args: 1,
        arguments: "[TABLE]",
        options: "",
        mode: Mode::ReadOnly,
        prerequisites: Some(read::show_prereq),
        run: read::show,
        postprocess: None,
        help: "print an overview of the database contents",
    },
    CommandSyntax {
        name: "list",
        min_args: 1,
        max_args: UNLIMITED,
        arguments: "TABLE [RECORD...]",
        options: "--columns=",
        mode: Mode::ReadOnly,
        prerequisites: Some(read::list_prereq),
        run: read::list,
        postprocess: None,
        help: "list RECORDs (or all records) in TABLE",
    },
    CommandSyntax {
        name: "get",
        min_args: 2,
        max_args: UNLIMITED,
        arguments: "TABLE RECORD [COLUMN[:KEY]...]",
        options: "--id=,--if-exists",
        mode: Mode::ReadOnly,
        prerequisites: Some(read::get_prereq),
        run: read::get,
        postprocess: None,
        help: "print values of COLUMNs in RECORD",
    },
    CommandSyntax {
        name: "create",
        min_args: 1,
        max_args: UNLIMITED,
        arguments: "TABLE COLUMN[:KEY]=VALUE...",
        options: "--id=",
        mode: Mode::ReadWrite,
        prerequisites: Some(write::create_prereq),
        run: write::create,
        postprocess: Some(write::create_postprocess),
        help: "create a record in TABLE with the given COLUMN values",
    },
    CommandSyntax {
        name: "set",
        min_args: 3,
        max_args: UNLIMITED,
        arguments: "TABLE RECORD COLUMN[:KEY]=VALUE...",
        options: "--if-exists",
        mode: Mode::ReadWrite,
        prerequisites: Some(write::set_prereq),
        run: write::set,
        postprocess: None,
        help: "set COLUMNs of RECORD to VALUEs",
    },
    CommandSyntax {
        name: "add",
        min_args: 4,
        max_args: UNLIMITED,
        arguments: "TABLE RECORD COLUMN [KEY=]VALUE...",
        options: "--if-exists",
        mode: Mode::ReadWrite,
        prerequisites: Some(write::column_prereq),
        run: write::add,
        postprocess: None,
        help: "add VALUEs to the set or map COLUMN of RECORD",
    },
    CommandSyntax {
        name: "remove",
        min_args: 4,
        max_args: UNLIMITED,
        arguments: "TABLE RECORD COLUMN KEY|VALUE|KEY=VALUE...",
        options: "--if-exists",
        mode: Mode::ReadWrite,
        prerequisites: Some(write::column_prereq),
        run: write::remove,
        postprocess: None,
        help: "remove VALUEs or KEYs from COLUMN of RECORD",
    },
    CommandSyntax {
        name: "clear",
        min_args: 3,
        max_args: UNLIMITED,
        arguments: "TABLE RECORD COLUMN...",
        options: "--if-exists",
        mode: Mode::ReadWrite,
        prerequisites: Some(write::clear_prereq),
        run: write::clear,
        postprocess: None,
        help: "empty the set or map COLUMNs of RECORD",
    },
    CommandSyntax {
        name: "destroy",
        min_args: 1,
        max_args: UNLIMITED,
        arguments: "TABLE [RECORD...]",
        options: "--if-exists,--all",
        mode: Mode::ReadWrite,
        prerequisites: Some(write::destroy_prereq),
        run: write::destroy,
        postprocess: None,
        help: "delete RECORDs (or, with --all, every record) from root TABLE",
    },
];
