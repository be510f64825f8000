//! Statement kinds of the modeling language.
//!
//! The numeric value of each kind doubles as its rank in the canonical
//! statement order, which substatement tables must follow (see
//! [`SubstmtTable`](crate::substmt::SubstmtTable)).

use std::fmt;

use num_enum::IntoPrimitive;

/// Kind tag of a parsed or compiled statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive)]
#[repr(u16)]
pub enum StmtKind {
    Module = 0,
    Namespace,
    Prefix,
    Import,
    Revision,
    Extension,
    Argument,
    Typedef,
    Grouping,
    Type,
    Path,
    Units,
    Must,
    When,
    Key,
    Default,
    Config,
    Mandatory,
    MinElements,
    MaxElements,
    Container,
    Leaf,
    LeafList,
    List,
    Uses,
    Description,
    Reference,
    Status,
}

impl StmtKind {
    /// The source keyword of this statement kind.
    pub fn keyword(self) -> &'static str {
        match self {
            StmtKind::Module => "module",
            StmtKind::Namespace => "namespace",
            StmtKind::Prefix => "prefix",
            StmtKind::Import => "import",
            StmtKind::Revision => "revision",
            StmtKind::Extension => "extension",
            StmtKind::Argument => "argument",
            StmtKind::Typedef => "typedef",
            StmtKind::Grouping => "grouping",
            StmtKind::Type => "type",
            StmtKind::Path => "path",
            StmtKind::Units => "units",
            StmtKind::Must => "must",
            StmtKind::When => "when",
            StmtKind::Key => "key",
            StmtKind::Default => "default",
            StmtKind::Config => "config",
            StmtKind::Mandatory => "mandatory",
            StmtKind::MinElements => "min-elements",
            StmtKind::MaxElements => "max-elements",
            StmtKind::Container => "container",
            StmtKind::Leaf => "leaf",
            StmtKind::LeafList => "leaf-list",
            StmtKind::List => "list",
            StmtKind::Uses => "uses",
            StmtKind::Description => "description",
            StmtKind::Reference => "reference",
            StmtKind::Status => "status",
        }
    }

    /// Rank of this kind in the canonical statement order.
    #[inline]
    pub fn canonical_order(self) -> u16 {
        self.into()
    }

    /// Whether this kind declares a schema data node.
    pub fn is_data_node(self) -> bool {
        matches!(
            self,
            StmtKind::Container | StmtKind::Leaf | StmtKind::LeafList | StmtKind::List
        )
    }
}

impl fmt::Display for StmtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_roundtrip() {
        assert_eq!(StmtKind::LeafList.keyword(), "leaf-list");
        assert_eq!(StmtKind::MinElements.to_string(), "min-elements");
    }

    #[test]
    fn canonical_order_follows_declaration() {
        assert!(StmtKind::Namespace.canonical_order() < StmtKind::Prefix.canonical_order());
        assert!(StmtKind::Type.canonical_order() < StmtKind::Description.canonical_order());
        assert!(StmtKind::Uses.canonical_order() < StmtKind::Status.canonical_order());
    }

    #[test]
    fn data_node_kinds() {
        assert!(StmtKind::Container.is_data_node());
        assert!(StmtKind::LeafList.is_data_node());
        assert!(!StmtKind::Uses.is_data_node());
        assert!(!StmtKind::Typedef.is_data_node());
    }
}
