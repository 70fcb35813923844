//! Read-only commands: `show`, `list`, `get`

use super::records::{find_record, parse_column_key, row_label};
use crate::command::{CommandContext, HandlerResult, PrereqContext};
use cfgctl_core::{CtlError, Result, Table};
use cfgctl_store::{AtomType, ColumnKind, Datum, RefStrength, Row, Schema, TableSchema, Transaction};
use std::collections::BTreeSet;
use std::fmt::Write;
use uuid::Uuid;

const UUID_COLUMN: &str = "_uuid";

pub(super) fn show_prereq(ctx: &mut PrereqContext<'_>) -> Result<()> {
    if let Some(table) = ctx.args.first() {
        ctx.schema.table(table)?;
    }
    Ok(())
}

pub(super) fn show(ctx: &mut CommandContext<'_>) -> HandlerResult {
    let schema = ctx.schema();
    let tables: Vec<&TableSchema> = match ctx.args.first() {
        Some(name) => vec![schema.table(name)?],
        None => schema.tables.values().filter(|t| t.is_root).collect(),
    };
    for table in tables {
        for (uuid, row) in sorted_rows(ctx.txn, table) {
            let mut visited = BTreeSet::new();
            show_row(ctx.output, &schema, ctx.txn, table, uuid, row, 0, &mut visited);
        }
    }
    Ok(())
}

/// Rows of `table` ordered by index value, then uuid
fn sorted_rows<'t>(txn: &'t Transaction, table: &TableSchema) -> Vec<(Uuid, &'t Row)> {
    let mut rows = txn.rows(&table.name);
    if let Some(index) = &table.index {
        rows.sort_by(|(a_uuid, a), (b_uuid, b)| {
            let a_name = a.get(index).and_then(Datum::as_str);
            let b_name = b.get(index).and_then(Datum::as_str);
            a_name.cmp(&b_name).then(a_uuid.cmp(b_uuid))
        });
    }
    rows
}

#[allow(clippy::too_many_arguments)]
fn show_row(
    out: &mut String,
    schema: &Schema,
    txn: &Transaction,
    table: &TableSchema,
    uuid: Uuid,
    row: &Row,
    depth: usize,
    visited: &mut BTreeSet<Uuid>,
) {
    let indent = "    ".repeat(depth);
    let _ = writeln!(out, "{}{} {}", indent, table.name, row_label(table, &uuid, row));
    if !visited.insert(uuid) {
        return;
    }

    let mut children = Vec::new();
    for column in table.columns.values() {
        if table.index.as_deref() == Some(column.name.as_str()) {
            continue;
        }
        let Some(datum) = row.get(&column.name) else {
            continue;
        };
        if is_empty(datum) {
            continue;
        }
        if let AtomType::Uuid {
            ref_table,
            strength: RefStrength::Strong,
        } = &column.atom
        {
            children.extend(datum.uuids().map(|u| (ref_table.clone(), u)));
            continue;
        }
        let _ = writeln!(out, "{}    {}: {}", indent, column.name, datum);
    }

    for (ref_table, child) in children {
        let (Ok(child_table), Some(child_row)) = (schema.table(&ref_table), txn.row(&ref_table, &child)) else {
            continue;
        };
        show_row(out, schema, txn, child_table, child, child_row, depth + 1, visited);
    }
}

fn is_empty(datum: &Datum) -> bool {
    match datum {
        Datum::Scalar(_) => false,
        Datum::Set(set) => set.is_empty(),
        Datum::Map(map) => map.is_empty(),
    }
}

pub(super) fn list_prereq(ctx: &mut PrereqContext<'_>) -> Result<()> {
    let table = ctx.schema.table(&ctx.args[0])?;
    if let Some(Some(columns)) = ctx.options.get("--columns") {
        for column in columns.split(',').filter(|c| *c != UUID_COLUMN) {
            table.column(column.trim())?;
        }
    }
    Ok(())
}

pub(super) fn list(ctx: &mut CommandContext<'_>) -> HandlerResult {
    let schema = ctx.schema();
    let table = schema.table(&ctx.args[0])?;
    let columns: Vec<String> = match ctx.option_value("--columns") {
        Some(spec) => spec
            .split(',')
            .map(|c| match c.trim() {
                UUID_COLUMN => Ok(UUID_COLUMN.to_string()),
                name => table.column(name).map(|col| col.name.clone()),
            })
            .collect::<Result<_>>()?,
        None => std::iter::once(UUID_COLUMN.to_string())
            .chain(table.columns.keys().cloned())
            .collect(),
    };

    let uuids: Vec<Uuid> = if ctx.args.len() > 1 {
        ctx.args[1..]
            .iter()
            .map(|record| super::records::must_find_record(ctx.txn, ctx.symtab, table, record))
            .collect::<Result<_>>()?
    } else {
        sorted_rows(ctx.txn, table).into_iter().map(|(u, _)| u).collect()
    };

    let mut result = Table::new(columns.iter().cloned());
    for uuid in uuids {
        let Some(row) = ctx.txn.row(&table.name, &uuid) else {
            continue;
        };
        let cells = columns
            .iter()
            .map(|c| match c.as_str() {
                UUID_COLUMN => uuid.to_string(),
                name => row.get(name).map(ToString::to_string).unwrap_or_default(),
            })
            .collect();
        result.add_row(cells);
    }
    *ctx.table = Some(result);
    Ok(())
}

pub(super) fn get_prereq(ctx: &mut PrereqContext<'_>) -> Result<()> {
    let table = ctx.schema.table(&ctx.args[0])?;
    if let Some(Some(id)) = ctx.options.get("--id") {
        if !id.starts_with('@') {
            return Err(CtlError::InvalidSymbolName { name: id.clone() }.into());
        }
    }
    for arg in &ctx.args[2..] {
        let (column, key) = parse_column_key(arg);
        if column == UUID_COLUMN {
            continue;
        }
        let column = table.column(column)?;
        if key.is_some() && column.kind != ColumnKind::Map {
            return Err(CtlError::KeyOnNonMap {
                column: column.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

pub(super) fn get(ctx: &mut CommandContext<'_>) -> HandlerResult {
    let schema = ctx.schema();
    let table = schema.table(&ctx.args[0])?;
    let record = &ctx.args[1];
    let if_exists = ctx.has_option("--if-exists");

    let Some(uuid) = find_record(ctx.txn, ctx.symtab, table, record)? else {
        if if_exists {
            return Ok(());
        }
        return Err(CtlError::RecordNotFound {
            table: table.name.clone(),
            record: record.clone(),
        }
        .into());
    };
    ctx.txn.verify(&table.name, &uuid);

    if let Some(id) = ctx.option_value("--id") {
        let symbol = ctx.symtab.declare(id)?;
        ctx.symtab.bind_existing(symbol, uuid)?;
        // Non-root rows stay alive only through references; this one is
        // already referenced from the database.
        if !table.is_root {
            ctx.symtab.mark_strong_ref(symbol);
        }
    }

    let Some(row) = ctx.txn.row(&table.name, &uuid) else {
        return Ok(());
    };
    for arg in &ctx.args[2..] {
        let (column, key) = parse_column_key(arg);
        if column == UUID_COLUMN {
            let _ = writeln!(ctx.output, "{}", uuid);
            continue;
        }
        let column = table.column(column)?;
        let datum = row.get(&column.name);
        match (key, datum) {
            (Some(key), Some(Datum::Map(map))) => match map.get(key) {
                Some(value) => {
                    let _ = writeln!(ctx.output, "{}", cfgctl_store::Atom::String(value.clone()));
                }
                None if if_exists => {}
                None => {
                    return Err(CtlError::InvalidValue {
                        column: column.name.clone(),
                        reason: format!("no key \"{}\" in {} record \"{}\"", key, table.name, record),
                    }
                    .into())
                }
            },
            (_, Some(datum)) => {
                let _ = writeln!(ctx.output, "{}", datum);
            }
            (_, None) => {
                let _ = writeln!(ctx.output);
            }
        }
    }
    Ok(())
}
