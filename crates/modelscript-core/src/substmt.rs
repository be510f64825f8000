//! Substatement cardinality tables and their compiled storage.
//!
//! A statement's compilable children are fully described by a
//! [`SubstmtTable`]: one [`SubstmtDescriptor`] per allowed child kind, listed
//! in canonical statement order. The same table shape drives built-in
//! statement bodies and extension-instance bodies; plugin authors populate
//! one to declare their extension's legal children.
//!
//! The table is declarative only. The matching algorithm lives in the
//! compiler crate; the result of a successful match is stored here, in
//! [`CompiledSubstmts`].

use crate::error::CompileError;
use crate::stmt::StmtKind;

/// Allowed occurrence count class of a substatement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// 0..1
    Opt,
    /// exactly 1
    Mand,
    /// 1..n
    Some,
    /// 0..n
    Any,
}

impl Cardinality {
    /// Whether at least one occurrence is required.
    #[inline]
    pub fn required(self) -> bool {
        matches!(self, Cardinality::Mand | Cardinality::Some)
    }

    /// Whether more than one occurrence is allowed.
    #[inline]
    pub fn multiple(self) -> bool {
        matches!(self, Cardinality::Some | Cardinality::Any)
    }
}

/// One allowed substatement kind and its cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubstmtDescriptor {
    /// Allowed substatement kind.
    pub stmt: StmtKind,
    /// Its cardinality.
    pub cardinality: Cardinality,
}

impl SubstmtDescriptor {
    /// Shorthand constructor.
    pub const fn new(stmt: StmtKind, cardinality: Cardinality) -> Self {
        Self { stmt, cardinality }
    }
}

/// A validated table of allowed substatements.
///
/// Construction rejects duplicate kinds and out-of-canonical-order listings,
/// so a table in hand is always well-formed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstmtTable {
    descriptors: Vec<SubstmtDescriptor>,
}

impl SubstmtTable {
    /// Validate and build a table from descriptors.
    pub fn new(descriptors: Vec<SubstmtDescriptor>) -> Result<Self, CompileError> {
        let mut last: Option<StmtKind> = None;
        for desc in &descriptors {
            if let Some(prev) = last {
                if desc.stmt == prev {
                    return Err(CompileError::DuplicateDescriptor { stmt: desc.stmt });
                }
                if desc.stmt.canonical_order() < prev.canonical_order() {
                    // An equal rank further back is also a duplicate.
                    if descriptors.iter().filter(|d| d.stmt == desc.stmt).count() > 1 {
                        return Err(CompileError::DuplicateDescriptor { stmt: desc.stmt });
                    }
                    return Err(CompileError::TableOrder { stmt: desc.stmt });
                }
            }
            last = Some(desc.stmt);
        }
        Ok(Self { descriptors })
    }

    /// The descriptor for the given kind, if the table declares it.
    pub fn find(&self, kind: StmtKind) -> Option<&SubstmtDescriptor> {
        self.descriptors.iter().find(|d| d.stmt == kind)
    }

    /// Index of the descriptor for the given kind.
    pub fn position(&self, kind: StmtKind) -> Option<usize> {
        self.descriptors.iter().position(|d| d.stmt == kind)
    }

    /// All descriptors, in canonical order.
    pub fn descriptors(&self) -> &[SubstmtDescriptor] {
        &self.descriptors
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the table allows no substatements at all.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// A generically compiled statement: its kind, argument, and compiled
/// children, if its kind has a substatement grammar of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStmt {
    /// Statement kind.
    pub kind: StmtKind,
    /// Compiled argument.
    pub arg: Option<String>,
    /// Compiled substatements, for kinds with their own grammar.
    pub substmts: Option<Box<CompiledSubstmts>>,
}

impl CompiledStmt {
    /// Create a compiled statement without children.
    pub fn new(kind: StmtKind, arg: Option<String>) -> Self {
        Self {
            kind,
            arg,
            substmts: None,
        }
    }

    /// Attach compiled substatements.
    pub fn with_substmts(mut self, substmts: CompiledSubstmts) -> Self {
        self.substmts = Some(Box::new(substmts));
        self
    }
}

/// Destination storage of one descriptor.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    /// `Opt` / `Mand`: at most one compiled statement.
    Single(Option<CompiledStmt>),
    /// `Some` / `Any`: compiled statements in source order.
    Many(Vec<CompiledStmt>),
}

/// Compiled substatement storage produced by a successful table match.
///
/// Every slot reflects exactly the statements present in the source, in
/// source order for multi-valued slots.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSubstmts {
    slots: Vec<(StmtKind, Slot)>,
}

impl CompiledSubstmts {
    /// Prepare empty storage for the given table.
    pub fn for_table(table: &SubstmtTable) -> Self {
        let slots = table
            .descriptors()
            .iter()
            .map(|d| {
                let slot = if d.cardinality.multiple() {
                    Slot::Many(Vec::new())
                } else {
                    Slot::Single(None)
                };
                (d.stmt, slot)
            })
            .collect();
        Self { slots }
    }

    /// Store a compiled statement into its kind's destination.
    ///
    /// Returns `false` if the storage has no slot for the kind; the caller
    /// is expected to have matched the kind against the table already.
    pub fn store(&mut self, value: CompiledStmt) -> bool {
        let Some((_, slot)) = self.slots.iter_mut().find(|(k, _)| *k == value.kind) else {
            return false;
        };
        match slot {
            Slot::Single(dest) => *dest = Some(value),
            Slot::Many(dest) => dest.push(value),
        }
        true
    }

    /// The compiled statement in a single-valued slot.
    pub fn single(&self, kind: StmtKind) -> Option<&CompiledStmt> {
        match self.slot(kind)? {
            Slot::Single(dest) => dest.as_ref(),
            Slot::Many(dest) => dest.first(),
        }
    }

    /// The compiled statements in a multi-valued slot, in source order.
    pub fn many(&self, kind: StmtKind) -> &[CompiledStmt] {
        match self.slot(kind) {
            Some(Slot::Many(dest)) => dest,
            Some(Slot::Single(Some(dest))) => std::slice::from_ref(dest),
            _ => &[],
        }
    }

    /// Argument of the statement in a slot, single-valued or first of many.
    pub fn first_arg(&self, kind: StmtKind) -> Option<&str> {
        self.single(kind).and_then(|s| s.arg.as_deref())
    }

    fn slot(&self, kind: StmtKind) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, slot)| slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(descs: &[(StmtKind, Cardinality)]) -> Result<SubstmtTable, CompileError> {
        SubstmtTable::new(
            descs
                .iter()
                .map(|&(stmt, cardinality)| SubstmtDescriptor::new(stmt, cardinality))
                .collect(),
        )
    }

    #[test]
    fn well_formed_table() {
        let t = table(&[
            (StmtKind::Type, Cardinality::Mand),
            (StmtKind::Units, Cardinality::Opt),
            (StmtKind::Description, Cardinality::Opt),
        ])
        .unwrap();
        assert_eq!(t.len(), 3);
        assert!(t.find(StmtKind::Units).is_some());
        assert!(t.find(StmtKind::Status).is_none());
    }

    #[test]
    fn duplicate_descriptor_rejected() {
        let err = table(&[
            (StmtKind::Description, Cardinality::Opt),
            (StmtKind::Description, Cardinality::Any),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            CompileError::DuplicateDescriptor {
                stmt: StmtKind::Description
            }
        );
    }

    #[test]
    fn out_of_order_table_rejected() {
        let err = table(&[
            (StmtKind::Description, Cardinality::Opt),
            (StmtKind::Type, Cardinality::Mand),
        ])
        .unwrap_err();
        assert_eq!(err, CompileError::TableOrder { stmt: StmtKind::Type });
    }

    #[test]
    fn non_adjacent_duplicate_rejected() {
        let err = table(&[
            (StmtKind::Type, Cardinality::Mand),
            (StmtKind::Units, Cardinality::Opt),
            (StmtKind::Type, Cardinality::Opt),
        ])
        .unwrap_err();
        assert_eq!(err, CompileError::DuplicateDescriptor { stmt: StmtKind::Type });
    }

    #[test]
    fn storage_slots_follow_cardinality() {
        let t = table(&[
            (StmtKind::Must, Cardinality::Any),
            (StmtKind::Description, Cardinality::Opt),
        ])
        .unwrap();
        let mut storage = CompiledSubstmts::for_table(&t);

        assert!(storage.store(CompiledStmt::new(StmtKind::Must, Some("a".into()))));
        assert!(storage.store(CompiledStmt::new(StmtKind::Must, Some("b".into()))));
        assert!(storage.store(CompiledStmt::new(StmtKind::Description, Some("d".into()))));
        assert!(!storage.store(CompiledStmt::new(StmtKind::Units, None)));

        let musts: Vec<_> = storage
            .many(StmtKind::Must)
            .iter()
            .map(|s| s.arg.as_deref().unwrap())
            .collect();
        assert_eq!(musts, ["a", "b"]);
        assert_eq!(storage.first_arg(StmtKind::Description), Some("d"));
        assert_eq!(storage.first_arg(StmtKind::Units), None);
    }
}
