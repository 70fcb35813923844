//! Naming records and values on the command line

use cfgctl_core::{CtlError, Result, SymbolTable};
use cfgctl_store::{Atom, ColumnKind, ColumnSchema, Datum, RefStrength, Row, TableSchema, Transaction};
use uuid::Uuid;

/// Find the row `record` names in `table`
///
/// `record` may be `.` for a table holding one row, a symbol bound earlier in
/// the batch, a uuid, or the value of the table's index column.
///
/// # Errors
///
/// `.` on a table without exactly one row, or an index value shared by
/// several rows.
pub fn find_record(
    txn: &Transaction,
    symtab: &SymbolTable,
    table: &TableSchema,
    record: &str,
) -> Result<Option<Uuid>> {
    if record == "." {
        let rows = txn.rows(&table.name);
        return match rows.as_slice() {
            [(uuid, _)] => Ok(Some(*uuid)),
            _ => Err(CtlError::NotSingleton {
                table: table.name.clone(),
                count: rows.len(),
            }
            .into()),
        };
    }

    if record.starts_with('@') {
        let uuid = symtab
            .lookup(record)
            .and_then(|id| symtab.resolve(id).ok())
            .filter(|uuid| txn.row(&table.name, uuid).is_some());
        return Ok(uuid);
    }

    if let Ok(uuid) = Uuid::parse_str(record) {
        if txn.row(&table.name, &uuid).is_some() {
            return Ok(Some(uuid));
        }
    }

    let Some(index) = &table.index else {
        return Ok(None);
    };
    let matches: Vec<Uuid> = txn
        .rows(&table.name)
        .into_iter()
        .filter(|(_, row)| row.get(index).and_then(Datum::as_str) == Some(record))
        .map(|(uuid, _)| uuid)
        .collect();
    match matches.as_slice() {
        [] => Ok(None),
        [uuid] => Ok(Some(*uuid)),
        _ => Err(CtlError::AmbiguousRecord {
            table: table.name.clone(),
            record: record.to_string(),
        }
        .into()),
    }
}

/// Like [`find_record`], but a missing row is an error
///
/// # Errors
///
/// Everything [`find_record`] reports, plus a record that matches nothing.
pub fn must_find_record(
    txn: &Transaction,
    symtab: &SymbolTable,
    table: &TableSchema,
    record: &str,
) -> Result<Uuid> {
    find_record(txn, symtab, table, record)?.ok_or_else(|| {
        CtlError::RecordNotFound {
            table: table.name.clone(),
            record: record.to_string(),
        }
        .into()
    })
}

/// Parse `text` as a value of `column`
///
/// References may be symbols, which are declared on first use. When
/// `inserting` is set, each symbol is also marked as referenced with the
/// column's strength.
///
/// # Errors
///
/// Malformed values, bad symbol names, or references to missing records.
pub fn parse_value(
    txn: &Transaction,
    symtab: &mut SymbolTable,
    column: &ColumnSchema,
    text: &str,
    inserting: bool,
) -> Result<Datum> {
    let schema = txn.snapshot().schema().clone();
    Datum::parse(column, text, &mut |piece: &str| {
        let Some((ref_table, strength)) = column.atom.reference() else {
            return Atom::parse_plain(&column.atom, &column.name, piece);
        };
        if piece.starts_with('@') {
            let id = symtab.declare(piece)?;
            if inserting {
                match strength {
                    RefStrength::Strong => symtab.mark_strong_ref(id),
                    RefStrength::Weak => symtab.mark_weak_ref(id),
                }
            }
            return Ok(Atom::Uuid(symtab.uuid(id)));
        }
        let target = schema.table(ref_table)?;
        must_find_record(txn, symtab, target, piece).map(Atom::Uuid)
    })
}

/// One `COLUMN[:KEY]=VALUE` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting<'a> {
    pub column: &'a str,
    pub target: SettingTarget<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingTarget<'a> {
    /// Replace the whole column
    Whole(&'a str),
    /// Set one key of a map column
    Key { key: String, value: String },
}

/// Split a `COLUMN[:KEY]=VALUE` argument
///
/// # Errors
///
/// Arguments without `=`, or a key entry that is not `KEY=VALUE`.
pub fn parse_setting(arg: &str) -> Result<Setting<'_>> {
    let missing_value = || CtlError::InvalidValue {
        column: arg.to_string(),
        reason: "argument does not end in \"=\" followed by a value".to_string(),
    };
    let split = arg.find([':', '=']).ok_or_else(missing_value)?;
    let column = &arg[..split];
    let rest = &arg[split + 1..];
    let target = if arg[split..].starts_with(':') {
        if !rest.contains('=') {
            return Err(missing_value().into());
        }
        let (key, value) = cfgctl_store::datum::parse_map_entry(column, rest)?;
        SettingTarget::Key { key, value }
    } else {
        SettingTarget::Whole(rest)
    };
    Ok(Setting { column, target })
}

/// Split a `COLUMN[:KEY]` argument
pub fn parse_column_key(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once(':') {
        Some((column, key)) => (column, Some(key.trim_matches('"'))),
        None => (arg, None),
    }
}

/// Apply one setting to an existing row
///
/// # Errors
///
/// Unknown columns, keys on non-map columns, or values that do not parse.
pub fn apply_setting(
    txn: &mut Transaction,
    symtab: &mut SymbolTable,
    table: &TableSchema,
    uuid: Uuid,
    setting: &Setting<'_>,
) -> Result<()> {
    let column = table.column(setting.column)?;
    let datum = match &setting.target {
        SettingTarget::Whole(text) => parse_value(txn, symtab, column, text, true)?,
        SettingTarget::Key { key, value } => {
            if column.kind != ColumnKind::Map {
                return Err(CtlError::KeyOnNonMap {
                    column: column.name.clone(),
                }
                .into());
            }
            let mut map = current_map(txn.row(&table.name, &uuid), &column.name);
            map.insert(key.clone(), value.clone());
            Datum::Map(map)
        }
    };
    txn.set_column(&table.name, &uuid, &column.name, datum)
}

/// The map held by `column`, empty when the row or value is missing
pub fn current_map(row: Option<&Row>, column: &str) -> std::collections::BTreeMap<String, String> {
    match row.and_then(|r| r.get(column)) {
        Some(Datum::Map(map)) => map.clone(),
        _ => Default::default(),
    }
}

/// The set held by `column`, empty when the row or value is missing
pub fn current_set(row: Option<&Row>, column: &str) -> std::collections::BTreeSet<Atom> {
    match row.and_then(|r| r.get(column)) {
        Some(Datum::Set(set)) => set.clone(),
        _ => Default::default(),
    }
}

/// Display text for one row: its index value when it has one, else its uuid
pub fn row_label(table: &TableSchema, uuid: &Uuid, row: &Row) -> String {
    table
        .index
        .as_ref()
        .and_then(|index| row.get(index))
        .and_then(Datum::as_str)
        .map(|name| format!("{} ({})", Atom::String(name.to_string()), uuid))
        .unwrap_or_else(|| format!("({})", uuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgctl_core::ExErrorKind;
    use cfgctl_store::{Schema, Snapshot};
    use std::sync::Arc;

    fn txn() -> Transaction {
        let schema = Arc::new(Schema::default_schema().unwrap());
        Transaction::new(Arc::new(Snapshot::empty(schema, 1)))
    }

    fn add_switch(txn: &mut Transaction, name: &str) -> Uuid {
        let uuid = txn.insert("Switch", None).unwrap();
        txn.set_column("Switch", &uuid, "name", Datum::Scalar(Atom::String(name.into())))
            .unwrap();
        uuid
    }

    #[test]
    fn test_find_record_by_index_and_uuid() {
        let mut txn = txn();
        let symtab = SymbolTable::new();
        let sw0 = add_switch(&mut txn, "sw0");
        let schema = txn.snapshot().schema().clone();
        let table = schema.table("Switch").unwrap();

        assert_eq!(find_record(&txn, &symtab, table, "sw0").unwrap(), Some(sw0));
        assert_eq!(find_record(&txn, &symtab, table, &sw0.to_string()).unwrap(), Some(sw0));
        assert_eq!(find_record(&txn, &symtab, table, "sw9").unwrap(), None);
    }

    #[test]
    fn test_find_record_ambiguous_index() {
        let mut txn = txn();
        let symtab = SymbolTable::new();
        add_switch(&mut txn, "dup");
        add_switch(&mut txn, "dup");
        let schema = txn.snapshot().schema().clone();
        let table = schema.table("Switch").unwrap();

        let err = find_record(&txn, &symtab, table, "dup").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Ambiguous);
    }

    #[test]
    fn test_dot_requires_exactly_one_row() {
        let mut txn = txn();
        let symtab = SymbolTable::new();
        let schema = txn.snapshot().schema().clone();
        let table = schema.table("Global").unwrap();

        assert!(find_record(&txn, &symtab, table, ".").is_err());
        let global = txn.insert("Global", None).unwrap();
        assert_eq!(find_record(&txn, &symtab, table, ".").unwrap(), Some(global));
    }

    #[test]
    fn test_must_find_record_message() {
        let txn = txn();
        let symtab = SymbolTable::new();
        let schema = txn.snapshot().schema().clone();
        let err = must_find_record(&txn, &symtab, schema.table("Switch").unwrap(), "nope")
            .unwrap_err();
        assert_eq!(err.message(), "no row \"nope\" in table Switch");
    }

    #[test]
    fn test_parse_value_marks_symbol_strength() {
        let txn = txn();
        let mut symtab = SymbolTable::new();
        let schema = txn.snapshot().schema().clone();
        let switch = schema.table("Switch").unwrap();

        let ports = parse_value(&txn, &mut symtab, switch.column("ports").unwrap(), "@p", true)
            .unwrap();
        let lbs = parse_value(&txn, &mut symtab, switch.column("load_balancers").unwrap(), "@lb", true)
            .unwrap();
        let p = symtab.lookup("@p").unwrap();
        let lb = symtab.lookup("@lb").unwrap();
        assert_eq!(ports.uuids().collect::<Vec<_>>(), vec![symtab.uuid(p)]);
        assert_eq!(lbs.uuids().count(), 1);

        symtab.mark_created(p).unwrap();
        symtab.mark_created(lb).unwrap();
        let warnings = symtab.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].name, "@lb");
    }

    #[test]
    fn test_parse_setting_forms() {
        let whole = parse_setting("name=sw0").unwrap();
        assert_eq!(whole.column, "name");
        assert_eq!(whole.target, SettingTarget::Whole("sw0"));

        let keyed = parse_setting("external_ids:owner=ops").unwrap();
        assert_eq!(keyed.column, "external_ids");
        assert_eq!(
            keyed.target,
            SettingTarget::Key {
                key: "owner".into(),
                value: "ops".into()
            }
        );

        assert!(parse_setting("name").is_err());
        assert!(parse_setting("external_ids:owner").is_err());
    }

    #[test]
    fn test_apply_key_setting_on_non_map() {
        let mut txn = txn();
        let mut symtab = SymbolTable::new();
        let sw0 = add_switch(&mut txn, "sw0");
        let schema = txn.snapshot().schema().clone();
        let setting = parse_setting("name:x=y").unwrap();
        let err = apply_setting(&mut txn, &mut symtab, schema.table("Switch").unwrap(), sw0, &setting)
            .unwrap_err();
        assert_eq!(err.message(), "cannot specify key to set for non-map column name");
    }
}
