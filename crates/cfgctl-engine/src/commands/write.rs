//! Commands that change rows: `create`, `set`, `add`, `remove`, `clear`,
//! `destroy`

use super::records::{
    apply_setting, current_map, current_set, find_record, must_find_record, parse_setting,
    parse_value,
};
use crate::command::{Command, CommandContext, HandlerResult, PrereqContext};
use cfgctl_core::{CtlError, Result};
use cfgctl_store::{datum::parse_map_entry, ColumnKind, Datum, TableSchema};
use tracing::warn;
use uuid::Uuid;

fn check_settings(table: &TableSchema, args: &[String]) -> Result<()> {
    for arg in args {
        let setting = parse_setting(arg)?;
        table.column(setting.column)?;
    }
    Ok(())
}

fn check_symbol(options: &crate::command::CommandOptions) -> Result<()> {
    match options.get("--id") {
        Some(Some(id)) if !id.starts_with('@') => {
            Err(CtlError::InvalidSymbolName { name: id.clone() }.into())
        }
        _ => Ok(()),
    }
}

pub(super) fn create_prereq(ctx: &mut PrereqContext<'_>) -> Result<()> {
    let table = ctx.schema.table(&ctx.args[0])?;
    check_symbol(ctx.options)?;
    check_settings(table, &ctx.args[1..])
}

pub(super) fn create(ctx: &mut CommandContext<'_>) -> HandlerResult {
    let schema = ctx.schema();
    let table = schema.table(&ctx.args[0])?;

    let uuid = match ctx.option_value("--id") {
        Some(id) => {
            let symbol = ctx.symtab.declare(id)?;
            ctx.symtab.mark_created(symbol)?;
            if table.is_root {
                ctx.symtab.mark_strong_ref(symbol);
            }
            ctx.symtab.uuid(symbol)
        }
        None => {
            if !table.is_root {
                warn!(
                    table = %table.name,
                    "applying \"create\" command to table {} without --id option will have no effect",
                    table.name
                );
            }
            Uuid::new_v4()
        }
    };

    ctx.txn.insert(&table.name, Some(uuid))?;
    for arg in &ctx.args[1..] {
        let setting = parse_setting(arg)?;
        apply_setting(ctx.txn, ctx.symtab, table, uuid, &setting)?;
    }
    *ctx.created = Some(uuid);
    Ok(())
}

pub(super) fn create_postprocess(cmd: &mut Command) -> Result<()> {
    if let Some(uuid) = cmd.created {
        cmd.output.push_str(&format!("{}\n", uuid));
    }
    Ok(())
}

/// Resolve the record argument, honouring `--if-exists`
fn target_row(ctx: &CommandContext<'_>, table: &TableSchema) -> Result<Option<Uuid>> {
    let record = &ctx.args[1];
    match find_record(ctx.txn, ctx.symtab, table, record)? {
        Some(uuid) => Ok(Some(uuid)),
        None if ctx.has_option("--if-exists") => Ok(None),
        None => Err(CtlError::RecordNotFound {
            table: table.name.clone(),
            record: record.clone(),
        }
        .into()),
    }
}

pub(super) fn set_prereq(ctx: &mut PrereqContext<'_>) -> Result<()> {
    let table = ctx.schema.table(&ctx.args[0])?;
    check_settings(table, &ctx.args[2..])
}

pub(super) fn set(ctx: &mut CommandContext<'_>) -> HandlerResult {
    let schema = ctx.schema();
    let table = schema.table(&ctx.args[0])?;
    let Some(uuid) = target_row(ctx, table)? else {
        return Ok(());
    };
    for arg in &ctx.args[2..] {
        let setting = parse_setting(arg)?;
        apply_setting(ctx.txn, ctx.symtab, table, uuid, &setting)?;
    }
    Ok(())
}

/// `TABLE RECORD COLUMN ...` commands name a column third
pub(super) fn column_prereq(ctx: &mut PrereqContext<'_>) -> Result<()> {
    let table = ctx.schema.table(&ctx.args[0])?;
    table.column(&ctx.args[2])?;
    Ok(())
}

fn scalar_error(column: &str, operation: &str) -> CtlError {
    CtlError::InvalidValue {
        column: column.to_string(),
        reason: format!("\"{}\" operation cannot be applied to a scalar column", operation),
    }
}

pub(super) fn add(ctx: &mut CommandContext<'_>) -> HandlerResult {
    let schema = ctx.schema();
    let table = schema.table(&ctx.args[0])?;
    let column = table.column(&ctx.args[2])?;
    let Some(uuid) = target_row(ctx, table)? else {
        return Ok(());
    };

    let datum = match column.kind {
        ColumnKind::Scalar => return Err(scalar_error(&column.name, "add").into()),
        ColumnKind::Set => {
            let mut set = current_set(ctx.txn.row(&table.name, &uuid), &column.name);
            for value in &ctx.args[3..] {
                let added = parse_value(ctx.txn, ctx.symtab, column, value, true)?;
                set.extend(added.atoms().cloned());
            }
            Datum::Set(set)
        }
        ColumnKind::Map => {
            let mut map = current_map(ctx.txn.row(&table.name, &uuid), &column.name);
            for value in &ctx.args[3..] {
                if let Datum::Map(added) = parse_value(ctx.txn, ctx.symtab, column, value, true)? {
                    for (key, value) in added {
                        map.entry(key).or_insert(value);
                    }
                }
            }
            Datum::Map(map)
        }
    };
    ctx.txn.set_column(&table.name, &uuid, &column.name, datum)?;
    Ok(())
}

pub(super) fn remove(ctx: &mut CommandContext<'_>) -> HandlerResult {
    let schema = ctx.schema();
    let table = schema.table(&ctx.args[0])?;
    let column = table.column(&ctx.args[2])?;
    let Some(uuid) = target_row(ctx, table)? else {
        return Ok(());
    };

    let datum = match column.kind {
        ColumnKind::Scalar => return Err(scalar_error(&column.name, "remove").into()),
        ColumnKind::Set => {
            let mut set = current_set(ctx.txn.row(&table.name, &uuid), &column.name);
            for value in &ctx.args[3..] {
                let removed = parse_value(ctx.txn, ctx.symtab, column, value, false)?;
                for atom in removed.atoms() {
                    set.remove(atom);
                }
            }
            Datum::Set(set)
        }
        ColumnKind::Map => {
            let mut map = current_map(ctx.txn.row(&table.name, &uuid), &column.name);
            for value in &ctx.args[3..] {
                match parse_map_entry(&column.name, value) {
                    Ok((key, expected)) => {
                        if map.get(&key) == Some(&expected) {
                            map.remove(&key);
                        }
                    }
                    Err(_) => {
                        map.remove(value.trim_matches('"'));
                    }
                }
            }
            Datum::Map(map)
        }
    };
    ctx.txn.set_column(&table.name, &uuid, &column.name, datum)?;
    Ok(())
}

pub(super) fn clear_prereq(ctx: &mut PrereqContext<'_>) -> Result<()> {
    let table = ctx.schema.table(&ctx.args[0])?;
    for column in &ctx.args[2..] {
        table.column(column)?;
    }
    Ok(())
}

pub(super) fn clear(ctx: &mut CommandContext<'_>) -> HandlerResult {
    let schema = ctx.schema();
    let table = schema.table(&ctx.args[0])?;
    let Some(uuid) = target_row(ctx, table)? else {
        return Ok(());
    };
    for name in &ctx.args[2..] {
        let column = table.column(name)?;
        let empty = match column.kind {
            ColumnKind::Scalar => {
                return Err(CtlError::InvalidValue {
                    column: column.name.clone(),
                    reason: "\"clear\" operation cannot be applied to a column that is not allowed to be empty".to_string(),
                }
                .into())
            }
            ColumnKind::Set => Datum::Set(Default::default()),
            ColumnKind::Map => Datum::Map(Default::default()),
        };
        ctx.txn.set_column(&table.name, &uuid, &column.name, empty)?;
    }
    Ok(())
}

pub(super) fn destroy_prereq(ctx: &mut PrereqContext<'_>) -> Result<()> {
    let table = ctx.schema.table(&ctx.args[0])?;
    if ctx.options.contains_key("--all") && ctx.args.len() > 1 {
        return Err(CtlError::AllWithRecords.into());
    }
    if !table.is_root {
        return Err(CtlError::NotRootTable {
            table: table.name.clone(),
        }
        .into());
    }
    Ok(())
}

pub(super) fn destroy(ctx: &mut CommandContext<'_>) -> HandlerResult {
    let schema = ctx.schema();
    let table = schema.table(&ctx.args[0])?;

    if ctx.has_option("--all") {
        ctx.txn.verify_table(&table.name);
        let uuids: Vec<Uuid> = ctx.txn.rows(&table.name).into_iter().map(|(u, _)| u).collect();
        for uuid in uuids {
            ctx.txn.delete(&table.name, &uuid)?;
        }
        return Ok(());
    }

    let if_exists = ctx.has_option("--if-exists");
    for record in &ctx.args[1..] {
        let uuid = if if_exists {
            match find_record(ctx.txn, ctx.symtab, table, record)? {
                Some(uuid) => uuid,
                None => continue,
            }
        } else {
            must_find_record(ctx.txn, ctx.symtab, table, record)?
        };
        ctx.txn.delete(&table.name, &uuid)?;
    }
    Ok(())
}
