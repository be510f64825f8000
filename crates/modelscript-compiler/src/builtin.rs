//! Built-in substatement tables.
//!
//! One table per statement kind with a substatement grammar, listed in
//! canonical statement order. Statement kinds without a table take no
//! substatements at all.

use std::sync::LazyLock;

use modelscript_core::stmt::StmtKind;
use modelscript_core::substmt::{Cardinality, SubstmtDescriptor, SubstmtTable};

use Cardinality::{Any, Mand, Opt};
use StmtKind::*;

fn table(descs: &[(StmtKind, Cardinality)]) -> SubstmtTable {
    SubstmtTable::new(
        descs
            .iter()
            .map(|&(stmt, cardinality)| SubstmtDescriptor::new(stmt, cardinality))
            .collect(),
    )
    .expect("built-in table must be well-formed")
}

static MODULE: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (Namespace, Mand),
        (Prefix, Mand),
        (Import, Any),
        (Revision, Any),
        (Extension, Any),
        (Typedef, Any),
        (Grouping, Any),
        (Container, Any),
        (Leaf, Any),
        (LeafList, Any),
        (List, Any),
        (Uses, Any),
        (Description, Opt),
        (Reference, Opt),
    ])
});

static IMPORT: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (Prefix, Mand),
        (Revision, Opt),
        (Description, Opt),
        (Reference, Opt),
    ])
});

static REVISION: LazyLock<SubstmtTable> =
    LazyLock::new(|| table(&[(Description, Opt), (Reference, Opt)]));

static EXTENSION: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (Argument, Opt),
        (Description, Opt),
        (Reference, Opt),
        (Status, Opt),
    ])
});

static TYPEDEF: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (Type, Mand),
        (Units, Opt),
        (Default, Opt),
        (Description, Opt),
        (Reference, Opt),
        (Status, Opt),
    ])
});

static GROUPING: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (Typedef, Any),
        (Grouping, Any),
        (Container, Any),
        (Leaf, Any),
        (LeafList, Any),
        (List, Any),
        (Uses, Any),
        (Description, Opt),
        (Reference, Opt),
        (Status, Opt),
    ])
});

static TYPE: LazyLock<SubstmtTable> = LazyLock::new(|| table(&[(Path, Opt)]));

static MUST: LazyLock<SubstmtTable> =
    LazyLock::new(|| table(&[(Description, Opt), (Reference, Opt)]));

static WHEN: LazyLock<SubstmtTable> =
    LazyLock::new(|| table(&[(Description, Opt), (Reference, Opt)]));

static CONTAINER: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (Typedef, Any),
        (Grouping, Any),
        (Must, Any),
        (When, Opt),
        (Config, Opt),
        (Container, Any),
        (Leaf, Any),
        (LeafList, Any),
        (List, Any),
        (Uses, Any),
        (Description, Opt),
        (Reference, Opt),
        (Status, Opt),
    ])
});

static LEAF: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (Type, Mand),
        (Units, Opt),
        (Must, Any),
        (When, Opt),
        (Default, Opt),
        (Config, Opt),
        (Mandatory, Opt),
        (Description, Opt),
        (Reference, Opt),
        (Status, Opt),
    ])
});

static LEAF_LIST: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (Type, Mand),
        (Units, Opt),
        (Must, Any),
        (When, Opt),
        (Default, Any),
        (Config, Opt),
        (MinElements, Opt),
        (MaxElements, Opt),
        (Description, Opt),
        (Reference, Opt),
        (Status, Opt),
    ])
});

static LIST: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (Typedef, Any),
        (Grouping, Any),
        (Must, Any),
        (When, Opt),
        (Key, Opt),
        (Config, Opt),
        (MinElements, Opt),
        (MaxElements, Opt),
        (Container, Any),
        (Leaf, Any),
        (LeafList, Any),
        (List, Any),
        (Uses, Any),
        (Description, Opt),
        (Reference, Opt),
        (Status, Opt),
    ])
});

static USES: LazyLock<SubstmtTable> = LazyLock::new(|| {
    table(&[
        (When, Opt),
        (Description, Opt),
        (Reference, Opt),
        (Status, Opt),
    ])
});

/// The built-in table of a statement kind, if the kind takes substatements.
pub fn builtin_table(kind: StmtKind) -> Option<&'static SubstmtTable> {
    Some(match kind {
        Module => &MODULE,
        Import => &IMPORT,
        Revision => &REVISION,
        Extension => &EXTENSION,
        Typedef => &TYPEDEF,
        Grouping => &GROUPING,
        Type => &TYPE,
        Must => &MUST,
        When => &WHEN,
        Container => &CONTAINER,
        Leaf => &LEAF,
        LeafList => &LEAF_LIST,
        List => &LIST,
        Uses => &USES,
        _ => return None,
    })
}
