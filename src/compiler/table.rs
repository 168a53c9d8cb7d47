//! The symbol table: declaration records plus scope-nesting bookkeeping.
//!
//! Entries live in one append-only-by-index array with an explicit active
//! length. Closing a scope rolls the active length back to where it stood
//! when the scope opened; the next sibling scope then overwrites the dead
//! entries in place. Lookup scans backward from the active length, which
//! is what makes inner declarations shadow outer ones.

use core::fmt;

use lasso::{Rodeo, Spur};

/// A `(level, offset)` pair naming one storage slot, resolved through the
/// display at run time. For functions the offset is the code entry address
/// instead of a stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelAddr {
    pub level: usize,
    pub offset: i64,
}

impl fmt::Display for RelAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.level, self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Var,
    Par,
    Func,
    Const,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Var => write!(f, "variable"),
            EntryKind::Par => write!(f, "parameter"),
            EntryKind::Func => write!(f, "function"),
            EntryKind::Const => write!(f, "constant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Var { name: Spur, addr: RelAddr },
    Par { name: Spur, addr: RelAddr },
    Func { name: Spur, addr: RelAddr, pars: usize },
    Const { name: Spur, value: i64 },
}

impl Entry {
    fn name(&self) -> Spur {
        match self {
            Entry::Var { name, .. }
            | Entry::Par { name, .. }
            | Entry::Func { name, .. }
            | Entry::Const { name, .. } => *name,
        }
    }

    fn kind(&self) -> EntryKind {
        match self {
            Entry::Var { .. } => EntryKind::Var,
            Entry::Par { .. } => EntryKind::Par,
            Entry::Func { .. } => EntryKind::Func,
            Entry::Const { .. } => EntryKind::Const,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum TableError {
    #[error("`{0}` is not defined")]
    UndefinedSymbol(Box<str>),
    #[error("`{name}` is a {found}, which has no {wanted}")]
    WrongEntryKind {
        name: Box<str>,
        found: EntryKind,
        wanted: &'static str,
    },
    #[error("parameter `{0}` declared outside a parameter list")]
    MisplacedParameterDeclaration(Box<str>),
}

/// Per-scope save record. The saved pair is the table state captured at
/// scope open and is what `end_scope` rolls back to.
#[derive(Debug)]
struct Scope {
    saved_active: usize,
    saved_offset: i64,
    /// Function entry whose body this scope compiles; `None` for the
    /// outermost (program) scope.
    owner: Option<usize>,
    /// True between the owning `declare_function` and `end_parameter_list`.
    params_open: bool,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Rodeo,
    entries: Vec<Entry>,
    /// Logical length; entries at and beyond this index are dead.
    active: usize,
    scopes: Vec<Scope>,
    next_offset: i64,
    /// Most recently declared function, adopted as owner by the next
    /// `begin_scope`.
    last_func: Option<usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a scope whose first local variable sits at `first_local`.
    ///
    /// The current (active-length, offset-counter) pair is saved so that
    /// the matching [`Self::end_scope`] can restore it exactly. The first
    /// call establishes the outermost scope.
    pub fn begin_scope(&mut self, first_local: i64) {
        let owner = self.last_func.take();
        self.scopes.push(Scope {
            saved_active: self.active,
            saved_offset: self.next_offset,
            owner,
            params_open: owner.is_some(),
        });
        self.next_offset = first_local;
    }

    /// Closes the innermost scope, rolling the active length and offset
    /// counter back to their values at the matching `begin_scope`. The
    /// outermost scope stays open; closing it is a no-op.
    pub fn end_scope(&mut self) {
        if self.scopes.len() <= 1 {
            return;
        }
        if let Some(scope) = self.scopes.pop() {
            self.active = scope.saved_active;
            self.next_offset = scope.saved_offset;
        }
    }

    /// Nesting depth of the innermost open scope, 0 for the outermost.
    pub fn current_level(&self) -> usize {
        self.scopes.len().saturating_sub(1)
    }

    /// First free local offset of the current scope, i.e. the number of
    /// stack slots the frame needs (header plus locals).
    pub fn frame_size(&self) -> i64 {
        self.next_offset
    }

    pub fn declare_const(&mut self, name: &str, value: i64) -> usize {
        let name = self.names.get_or_intern(name);
        self.push(Entry::Const { name, value })
    }

    pub fn declare_variable(&mut self, name: &str) -> usize {
        let name = self.names.get_or_intern(name);
        let addr = RelAddr {
            level: self.current_level(),
            offset: self.next_offset,
        };
        self.next_offset += 1;
        self.push(Entry::Var { name, addr })
    }

    /// Declares a function at the current level with a provisional entry
    /// address; [`Self::patch_function_entry`] rewrites it once the body's
    /// real position is known. The parameter count starts at zero and
    /// grows as parameters are declared.
    pub fn declare_function(&mut self, name: &str, entry: usize) -> usize {
        let name = self.names.get_or_intern(name);
        let addr = RelAddr {
            level: self.current_level(),
            offset: entry as i64,
        };
        let index = self.push(Entry::Func { name, addr, pars: 0 });
        self.last_func = Some(index);
        index
    }

    /// Declares one parameter of the function owning the current scope.
    /// Its offset stays unassigned until [`Self::end_parameter_list`].
    pub fn declare_parameter(&mut self, name: &str) -> Result<usize, TableError> {
        let Some(owner) = self
            .scopes
            .last()
            .filter(|scope| scope.params_open)
            .and_then(|scope| scope.owner)
        else {
            return Err(TableError::MisplacedParameterDeclaration(Box::from(name)));
        };
        let key = self.names.get_or_intern(name);
        let level = self.current_level();
        let index = self.push(Entry::Par {
            name: key,
            // placeholder until the whole list is known
            addr: RelAddr { level, offset: 0 },
        });
        if let Entry::Func { pars, .. } = &mut self.entries[owner] {
            *pars += 1;
        }
        Ok(index)
    }

    /// Closes the parameter list of the current scope's owning function,
    /// assigning its k parameters offsets -k..-1 in declaration order.
    /// Parameters live one level deeper than the function itself.
    pub fn end_parameter_list(&mut self) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        let Some(owner) = scope.owner.filter(|_| scope.params_open) else {
            return;
        };
        scope.params_open = false;
        let level = self.scopes.len() - 1;
        let k = match &self.entries[owner] {
            Entry::Func { pars, .. } => *pars,
            _ => 0,
        };
        for j in 0..k {
            if let Entry::Par { addr, .. } = &mut self.entries[owner + 1 + j] {
                *addr = RelAddr {
                    level,
                    offset: j as i64 - k as i64,
                };
            }
        }
    }

    /// Rewrites a function's entry address once its body's position is
    /// known.
    pub fn patch_function_entry(&mut self, index: usize, entry: usize) -> Result<(), TableError> {
        match &mut self.entries[index] {
            Entry::Func { addr, .. } => {
                addr.offset = entry as i64;
                Ok(())
            }
            other => {
                let name = other.name();
                let found = other.kind();
                Err(self.wrong_kind(name, found, "entry address"))
            }
        }
    }

    /// Finds the innermost visible declaration of `name`, scanning
    /// backward from the most recent active entry.
    pub fn lookup(&self, name: &str) -> Result<usize, TableError> {
        self.names
            .get(name)
            .and_then(|key| {
                self.entries[..self.active]
                    .iter()
                    .rposition(|entry| entry.name() == key)
            })
            .ok_or_else(|| TableError::UndefinedSymbol(Box::from(name)))
    }

    pub fn kind_of(&self, index: usize) -> EntryKind {
        self.entries[index].kind()
    }

    pub fn name_of(&self, index: usize) -> &str {
        self.names.resolve(&self.entries[index].name())
    }

    /// The `(level, offset)` pair of a variable, parameter, or function.
    pub fn relative_address_of(&self, index: usize) -> Result<RelAddr, TableError> {
        match &self.entries[index] {
            Entry::Var { addr, .. } | Entry::Par { addr, .. } | Entry::Func { addr, .. } => {
                Ok(*addr)
            }
            other => Err(self.wrong_kind(other.name(), other.kind(), "relative address")),
        }
    }

    pub fn value_of(&self, index: usize) -> Result<i64, TableError> {
        match &self.entries[index] {
            Entry::Const { value, .. } => Ok(*value),
            other => Err(self.wrong_kind(other.name(), other.kind(), "constant value")),
        }
    }

    pub fn parameter_count_of(&self, index: usize) -> Result<usize, TableError> {
        match &self.entries[index] {
            Entry::Func { pars, .. } => Ok(*pars),
            other => Err(self.wrong_kind(other.name(), other.kind(), "parameter count")),
        }
    }

    /// Parameter count of the function whose scope is currently open,
    /// 0 in the program scope. Used when emitting a return.
    pub fn enclosing_function_parameter_count(&self) -> usize {
        self.scopes
            .last()
            .and_then(|scope| scope.owner)
            .map(|owner| match &self.entries[owner] {
                Entry::Func { pars, .. } => *pars,
                _ => 0,
            })
            .unwrap_or(0)
    }

    fn wrong_kind(&self, name: Spur, found: EntryKind, wanted: &'static str) -> TableError {
        TableError::WrongEntryKind {
            name: Box::from(self.names.resolve(&name)),
            found,
            wanted,
        }
    }

    /// Appends at the active index, overwriting a dead entry if one is
    /// there from a sibling scope that already closed.
    fn push(&mut self, entry: Entry) -> usize {
        let index = self.active;
        if index < self.entries.len() {
            self.entries[index] = entry;
        } else {
            self.entries.push(entry);
        }
        self.active = index + 1;
        index
    }
}
