//! Format-node schema trees
//!
//! A schema is a tree of [`FormatNode`]s describing a binary layout: scalars,
//! padding, arrays, groups (nested records), derived values and seeks. Nodes
//! are built once, shared via [`Node`] handles and never mutated afterwards;
//! all per-call state (cursor, seek map, output buffer) travels through the
//! decode/encode drivers as explicit arguments.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::atom::Atom;
use crate::error::SchemaError;

/// Shared handle to a schema node
pub type Node = Arc<FormatNode>;

/// Stable node identity, used as the seek-map key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Primitive format code for scalar fields (little-endian on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCode {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    /// Raw byte run of fixed length
    Bytes(usize),
    /// Consume/emit N bytes without producing a value
    Skip(usize),
}

impl FormatCode {
    /// Width in bytes on the wire
    pub fn width(&self) -> usize {
        match self {
            FormatCode::I8 | FormatCode::U8 => 1,
            FormatCode::I16 | FormatCode::U16 => 2,
            FormatCode::I32 | FormatCode::U32 => 4,
            FormatCode::I64 | FormatCode::U64 => 8,
            FormatCode::Bytes(n) | FormatCode::Skip(n) => *n,
        }
    }

    /// True for codes that decode to an integer value
    pub fn is_int(&self) -> bool {
        !matches!(self, FormatCode::Bytes(_) | FormatCode::Skip(_))
    }
}

/// Fallible per-record format-code computation, falling back to the static
/// code when it returns `None`
#[derive(Clone)]
pub struct CodeFn(pub Arc<dyn Fn(&Atom) -> Option<FormatCode> + Send + Sync>);

impl fmt::Debug for CodeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodeFn")
    }
}

/// How an array decides how many elements it has
#[derive(Debug, Clone)]
pub enum CountRule {
    /// No count; stop on the terminator or when the cursor is exhausted
    None,
    /// Literal element count
    Fixed(usize),
    /// Count is read from an already-decoded sibling field
    Field(String),
}

/// Operator in a derived-value chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedOp {
    Add,
    Sub,
}

/// Operand in a derived-value chain
#[derive(Debug, Clone)]
pub enum Operand {
    /// Current decoded value of a named sibling node
    Node(Node),
    Const(i64),
}

/// Where a seek's anchor position comes from
#[derive(Debug, Clone)]
pub enum AnchorRule {
    /// The cursor's position when the seek executes (decode-only, relative)
    Current,
    /// Fixed absolute position
    Absolute(usize),
    /// Recorded start position of a previously visited node
    Node(Node),
}

/// A reference to a field owned by a possibly different record in the tree.
///
/// `namespace` is the owning record's path from the schema root; an empty
/// namespace means the record the referencing node is decoded/encoded under.
#[derive(Debug, Clone)]
pub struct FieldRef {
    pub node: Node,
    pub namespace: Vec<String>,
}

impl FieldRef {
    /// Reference to a sibling field in the current record
    pub fn local(node: &Node) -> Self {
        FieldRef {
            node: node.clone(),
            namespace: Vec::new(),
        }
    }

    /// Reference to a field under the record at `namespace`
    pub fn at(node: &Node, namespace: &[&str]) -> Self {
        FieldRef {
            node: node.clone(),
            namespace: namespace.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Where a seek's offset value comes from
#[derive(Debug, Clone)]
pub enum OffsetRule {
    Literal(i64),
    /// Offset is stored in a field; during encode that field is written as a
    /// placeholder and patched once the target position is known
    Field(FieldRef),
}

/// Editing role tagged onto a field at schema-construction time.
///
/// Consumers (e.g. an editor UI) dispatch on this instead of sniffing field
/// name prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRole {
    Plain,
    /// Value indexes the named external lookup table
    Lookup(String),
    /// Packed sub-values sharing one integer
    Bitfield,
    /// Bit flags over a byte run
    FlagSet,
}

/// Variant payload of a schema node
#[derive(Debug)]
pub enum FormatKind {
    Scalar {
        code: FormatCode,
        code_fn: Option<CodeFn>,
    },
    Padding {
        length: usize,
        fill: Vec<u8>,
        align: usize,
    },
    Array {
        item: Node,
        count: CountRule,
        terminator: Option<i64>,
    },
    Group {
        children: Vec<Node>,
    },
    Derived {
        first: Operand,
        chain: Vec<(DerivedOp, Operand)>,
    },
    Seek {
        anchor: AnchorRule,
        offset: OffsetRule,
    },
}

/// One node of a schema tree
#[derive(Debug)]
pub struct FormatNode {
    id: NodeId,
    name: Option<String>,
    role: FieldRole,
    kind: FormatKind,
}

impl FormatNode {
    fn build(name: Option<String>, role: FieldRole, kind: FormatKind) -> Node {
        Arc::new(FormatNode {
            id: NodeId::next(),
            name,
            role,
            kind,
        })
    }

    /// Fixed-width scalar field
    pub fn scalar(name: impl Into<String>, code: FormatCode) -> Node {
        Self::build(
            Some(name.into()),
            FieldRole::Plain,
            FormatKind::Scalar {
                code,
                code_fn: None,
            },
        )
    }

    /// Scalar field carrying an editing role
    pub fn scalar_role(name: impl Into<String>, code: FormatCode, role: FieldRole) -> Node {
        Self::build(
            Some(name.into()),
            role,
            FormatKind::Scalar {
                code,
                code_fn: None,
            },
        )
    }

    /// Scalar whose format code is computed per record, with a static
    /// fallback when the computation declines
    pub fn scalar_fn(
        name: impl Into<String>,
        fallback: FormatCode,
        f: impl Fn(&Atom) -> Option<FormatCode> + Send + Sync + 'static,
    ) -> Node {
        Self::build(
            Some(name.into()),
            FieldRole::Plain,
            FormatKind::Scalar {
                code: fallback,
                code_fn: Some(CodeFn(Arc::new(f))),
            },
        )
    }

    /// Anonymous skip of `n` bytes (the "pad" format code)
    pub fn skip(n: usize) -> Node {
        Self::build(
            None,
            FieldRole::Plain,
            FormatKind::Scalar {
                code: FormatCode::Skip(n),
                code_fn: None,
            },
        )
    }

    /// Zero-filled padding, optionally aligned
    pub fn padding(length: usize, align: usize) -> Node {
        Self::padding_with(length, &[0], align)
    }

    /// Padding with an explicit repeating fill pattern
    pub fn padding_with(length: usize, fill: &[u8], align: usize) -> Node {
        let fill = if fill.is_empty() { vec![0] } else { fill.to_vec() };
        Self::build(
            None,
            FieldRole::Plain,
            FormatKind::Padding {
                length,
                fill,
                align,
            },
        )
    }

    /// Repeated sub-node with a count rule and/or integer terminator
    pub fn array(
        name: impl Into<String>,
        item: Node,
        count: CountRule,
        terminator: Option<i64>,
    ) -> Node {
        Self::build(
            Some(name.into()),
            FieldRole::Plain,
            FormatKind::Array {
                item,
                count,
                terminator,
            },
        )
    }

    /// Array field carrying an editing role
    pub fn array_role(
        name: impl Into<String>,
        item: Node,
        count: CountRule,
        terminator: Option<i64>,
        role: FieldRole,
    ) -> Node {
        Self::build(
            Some(name.into()),
            role,
            FormatKind::Array {
                item,
                count,
                terminator,
            },
        )
    }

    /// Anonymous group; the usual schema root
    pub fn group(children: Vec<Node>) -> Node {
        Self::build(None, FieldRole::Plain, FormatKind::Group { children })
    }

    /// Named group decoding to a nested record field
    pub fn named_group(name: impl Into<String>, children: Vec<Node>) -> Node {
        Self::build(
            Some(name.into()),
            FieldRole::Plain,
            FormatKind::Group { children },
        )
    }

    /// Read-only value combined from named sibling fields and constants,
    /// evaluated left to right
    pub fn derived(
        name: impl Into<String>,
        first: Operand,
        chain: Vec<(DerivedOp, Operand)>,
    ) -> Result<Node, SchemaError> {
        for op in std::iter::once(&first).chain(chain.iter().map(|(_, o)| o)) {
            if let Operand::Node(node) = op {
                if node.name().is_none() {
                    return Err(SchemaError::UnnamedOperand);
                }
            }
        }
        Ok(Self::build(
            Some(name.into()),
            FieldRole::Plain,
            FormatKind::Derived { first, chain },
        ))
    }

    /// Cursor reposition to anchor + offset.
    ///
    /// A field-driven offset must name an integer scalar and cannot use the
    /// current-position anchor: the stored value would always encode as zero.
    pub fn seek(anchor: AnchorRule, offset: OffsetRule) -> Result<Node, SchemaError> {
        if let OffsetRule::Field(fr) = &offset {
            if matches!(anchor, AnchorRule::Current) {
                return Err(SchemaError::SeekNeedsAnchor);
            }
            let int_scalar = matches!(
                fr.node.kind(),
                FormatKind::Scalar { code, .. } if code.is_int()
            );
            if !int_scalar {
                return Err(SchemaError::BadSeekOffset {
                    name: fr.node.name().unwrap_or("<anonymous>").to_string(),
                });
            }
        }
        Ok(Self::build(
            None,
            FieldRole::Plain,
            FormatKind::Seek { anchor, offset },
        ))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn role(&self) -> &FieldRole {
        &self.role
    }

    pub fn kind(&self) -> &FormatKind {
        &self.kind
    }

    /// Look up a group's direct child node by field name
    pub fn child(&self, name: &str) -> Option<&Node> {
        match &self.kind {
            FormatKind::Group { children } => {
                children.iter().find(|c| c.name() == Some(name))
            }
            _ => None,
        }
    }

    /// Collect the ids of every scalar that backs a field-driven seek
    /// offset; those fields are encoded as placeholders and patched later.
    pub(crate) fn collect_offset_targets(&self, out: &mut HashSet<NodeId>) {
        match &self.kind {
            FormatKind::Seek {
                offset: OffsetRule::Field(fr),
                ..
            } => {
                out.insert(fr.node.id());
            }
            FormatKind::Array { item, .. } => item.collect_offset_targets(out),
            FormatKind::Group { children } => {
                for child in children {
                    child.collect_offset_targets(out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_widths() {
        assert_eq!(FormatCode::U8.width(), 1);
        assert_eq!(FormatCode::I16.width(), 2);
        assert_eq!(FormatCode::U32.width(), 4);
        assert_eq!(FormatCode::I64.width(), 8);
        assert_eq!(FormatCode::Bytes(13).width(), 13);
        assert_eq!(FormatCode::Skip(3).width(), 3);
        assert!(!FormatCode::Bytes(1).is_int());
        assert!(FormatCode::U16.is_int());
    }

    #[test]
    fn test_node_ids_unique() {
        let a = FormatNode::scalar("a", FormatCode::U8);
        let b = FormatNode::scalar("a", FormatCode::U8);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_group_child_lookup() {
        let hp = FormatNode::scalar("hp", FormatCode::U8);
        let atk = FormatNode::scalar("atk", FormatCode::U8);
        let group = FormatNode::group(vec![hp.clone(), atk]);
        assert_eq!(group.child("hp").map(|n| n.id()), Some(hp.id()));
        assert!(group.child("def").is_none());
        assert!(hp.child("hp").is_none());
    }

    #[test]
    fn test_seek_validation() {
        let off = FormatNode::scalar("off", FormatCode::U16);
        let blob = FormatNode::scalar("blob", FormatCode::Bytes(4));

        assert!(FormatNode::seek(
            AnchorRule::Absolute(0),
            OffsetRule::Field(FieldRef::local(&off))
        )
        .is_ok());
        assert!(matches!(
            FormatNode::seek(
                AnchorRule::Current,
                OffsetRule::Field(FieldRef::local(&off))
            ),
            Err(SchemaError::SeekNeedsAnchor)
        ));
        assert!(matches!(
            FormatNode::seek(
                AnchorRule::Absolute(0),
                OffsetRule::Field(FieldRef::local(&blob))
            ),
            Err(SchemaError::BadSeekOffset { .. })
        ));
        assert!(FormatNode::seek(AnchorRule::Current, OffsetRule::Literal(4)).is_ok());
    }

    #[test]
    fn test_derived_needs_named_operands() {
        let x = FormatNode::scalar("x", FormatCode::U8);
        let pad = FormatNode::skip(1);
        assert!(FormatNode::derived("sum", Operand::Node(x), vec![]).is_ok());
        assert!(matches!(
            FormatNode::derived("sum", Operand::Node(pad), vec![]),
            Err(SchemaError::UnnamedOperand)
        ));
    }

    #[test]
    fn test_offset_target_collection() {
        let off = FormatNode::scalar("off", FormatCode::U16);
        let seek = FormatNode::seek(
            AnchorRule::Absolute(0),
            OffsetRule::Field(FieldRef::local(&off)),
        )
        .unwrap();
        let schema = FormatNode::group(vec![off.clone(), seek]);
        let mut targets = HashSet::new();
        schema.collect_offset_targets(&mut targets);
        assert!(targets.contains(&off.id()));
        assert_eq!(targets.len(), 1);
    }
}
