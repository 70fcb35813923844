//! Forward-reference symbol table
//!
//! Symbols (`@name`) let commands in one batch point at rows that another
//! command in the same batch creates, in either order. Each symbol reserves a
//! row uuid when first declared so that references can be written before the
//! row exists. The table lives for exactly one transaction attempt.

use crate::errors::{CtlError, Result};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Handle to a declared symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(usize);

#[derive(Debug, Clone)]
pub struct Symbol {
    name: String,
    uuid: Uuid,
    created: bool,
    strong_ref: bool,
    weak_ref: bool,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Row uuid the symbol stands for
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Tagged state derived from the flags
    pub fn state(&self) -> SymbolState {
        if !self.created {
            SymbolState::Unresolved
        } else if self.strong_ref {
            SymbolState::Created(Reachability::Strong)
        } else if self.weak_ref {
            SymbolState::Created(Reachability::WeakOnly)
        } else {
            SymbolState::Created(Reachability::Unreferenced)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Strong,
    WeakOnly,
    Unreferenced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolState {
    Unresolved,
    Created(Reachability),
}

/// Non-fatal finding from [`SymbolTable::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolWarning {
    pub name: String,
    pub reachability: Reachability,
}

impl std::fmt::Display for SymbolWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let how = match self.reachability {
            Reachability::WeakOnly => "only a weak reference to it was inserted",
            _ => "no reference to it was inserted",
        };
        write!(
            f,
            "row id \"{}\" was created but {}, so it will not actually appear in the database",
            self.name, how
        )
    }
}

/// A `get --id=@x` that rebound a symbol to an existing row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rebinding {
    pub reserved: Uuid,
    pub bound: Uuid,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: BTreeMap<String, SymbolId>,
    rebindings: Vec<Rebinding>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name`, or return the handle it already has
    ///
    /// # Errors
    ///
    /// Fails when `name` does not begin with `@`.
    pub fn declare(&mut self, name: &str) -> Result<SymbolId> {
        if !name.starts_with('@') {
            return Err(CtlError::InvalidSymbolName {
                name: name.to_string(),
            }
            .into());
        }
        if let Some(id) = self.by_name.get(name) {
            return Ok(*id);
        }
        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            name: name.to_string(),
            uuid: Uuid::new_v4(),
            created: false,
            strong_ref: false,
            weak_ref: false,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    /// Uuid reserved for (or bound to) the symbol, created or not
    pub fn uuid(&self, id: SymbolId) -> Uuid {
        self.symbols[id.0].uuid
    }

    /// Record that a command created the symbol's row
    ///
    /// # Errors
    ///
    /// A symbol may be created once per batch.
    pub fn mark_created(&mut self, id: SymbolId) -> Result<()> {
        let symbol = &mut self.symbols[id.0];
        if symbol.created {
            return Err(CtlError::SymbolAlreadyCreated {
                name: symbol.name.clone(),
            }
            .into());
        }
        symbol.created = true;
        Ok(())
    }

    /// Bind the symbol to an existing row instead of a new one
    ///
    /// References written before the binding still carry the reserved uuid;
    /// the returned [`Rebinding`] is kept so they can be rewritten before
    /// commit.
    ///
    /// # Errors
    ///
    /// Same as [`SymbolTable::mark_created`].
    pub fn bind_existing(&mut self, id: SymbolId, row: Uuid) -> Result<()> {
        self.mark_created(id)?;
        let symbol = &mut self.symbols[id.0];
        if symbol.uuid != row {
            self.rebindings.push(Rebinding {
                reserved: symbol.uuid,
                bound: row,
            });
            symbol.uuid = row;
        }
        Ok(())
    }

    pub fn rebindings(&self) -> &[Rebinding] {
        &self.rebindings
    }

    pub fn mark_strong_ref(&mut self, id: SymbolId) {
        self.symbols[id.0].strong_ref = true;
    }

    pub fn mark_weak_ref(&mut self, id: SymbolId) {
        self.symbols[id.0].weak_ref = true;
    }

    /// The row a symbol names, once something created it
    ///
    /// # Errors
    ///
    /// Fails for a symbol nothing has created (yet).
    pub fn resolve(&self, id: SymbolId) -> Result<Uuid> {
        let symbol = &self.symbols[id.0];
        if symbol.created {
            Ok(symbol.uuid)
        } else {
            Err(CtlError::SymbolNeverCreated {
                name: symbol.name.clone(),
            }
            .into())
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.by_name.values().map(|id| &self.symbols[id.0])
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Check every declared symbol once, in name order
    ///
    /// # Errors
    ///
    /// The first symbol that was referenced but never created is fatal.
    pub fn validate(&self) -> Result<Vec<SymbolWarning>> {
        let mut warnings = Vec::new();
        for symbol in self.iter() {
            match symbol.state() {
                SymbolState::Unresolved => {
                    return Err(CtlError::SymbolNeverCreated {
                        name: symbol.name.clone(),
                    }
                    .into())
                }
                SymbolState::Created(Reachability::Strong) => {}
                SymbolState::Created(reachability) => warnings.push(SymbolWarning {
                    name: symbol.name.clone(),
                    reachability,
                }),
            }
        }
        Ok(warnings)
    }
}
