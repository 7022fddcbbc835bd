//! Decoding byte buffers into atoms
//!
//! The driver walks the schema tree top-down against one [`ByteCursor`] and
//! one [`SeekMap`] per call; nodes themselves hold no per-call state, so a
//! schema can serve concurrent decodes over independent buffers.

use tracing::trace;

use crate::atom::{join_path, Atom, Value};
use crate::cursor::{pad_len, ByteCursor, SeekMap};
use crate::error::{DecodeError, Result, SchemaError};
use crate::schema::{
    AnchorRule, CountRule, DerivedOp, FieldRef, FormatCode, FormatKind, Node, OffsetRule, Operand,
};

/// Decode `data` against a schema whose root is a group node.
pub fn decode(schema: &Node, data: &[u8]) -> Result<Atom> {
    if !matches!(schema.kind(), FormatKind::Group { .. }) {
        return Err(SchemaError::RootNotGroup.into());
    }
    let mut cursor = ByteCursor::new(data);
    let mut seeks = SeekMap::default();
    let atom = decode_group(schema, Vec::new(), &mut cursor, &mut seeks)?;
    trace!(bytes = cursor.consumed(), fields = atom.len(), "record decoded");
    Ok(atom)
}

fn decode_group(
    node: &Node,
    namespace: Vec<String>,
    parent: &mut ByteCursor<'_>,
    seeks: &mut SeekMap,
) -> Result<Atom> {
    let FormatKind::Group { children } = node.kind() else {
        return Err(SchemaError::RootNotGroup.into());
    };
    let mut cursor = parent.view();
    let mut atom = Atom::new(node.clone(), namespace);
    for child in children {
        let value = decode_node(child, &mut atom, &mut cursor, seeks)?;
        if let (Some(name), Some(value)) = (child.name(), value) {
            atom.insert(name, value)?;
            if matches!(child.kind(), FormatKind::Derived { .. }) {
                atom.mark_read_only(name);
            }
        }
    }
    atom.freeze();
    // the parent moves by exactly what the children consumed, never by the
    // full window
    let consumed = cursor.consumed();
    let path = if atom.namespace().is_empty() {
        "<root>".to_string()
    } else {
        atom.namespace().join(".")
    };
    parent.skip(consumed, &path)?;
    Ok(atom)
}

fn decode_node(
    node: &Node,
    atom: &mut Atom,
    cursor: &mut ByteCursor<'_>,
    seeks: &mut SeekMap,
) -> Result<Option<Value>> {
    seeks.record(node.id(), cursor.position());
    let path = join_path(atom.namespace(), node.name().unwrap_or("<anonymous>"));
    match node.kind() {
        FormatKind::Scalar { code, code_fn } => {
            let code = code_fn.as_ref().and_then(|f| (f.0)(atom)).unwrap_or(*code);
            match code {
                FormatCode::Skip(n) => {
                    cursor.skip(n, &path)?;
                    Ok(None)
                }
                FormatCode::Bytes(n) => {
                    Ok(Some(Value::Bytes(cursor.take(n, &path)?.to_vec())))
                }
                _ => {
                    let raw = cursor.take(code.width(), &path)?;
                    Ok(Some(Value::Int(read_int(code, raw))))
                }
            }
        }
        FormatKind::Padding { length, align, .. } => {
            let n = pad_len(cursor.position(), *length, *align);
            cursor.skip(n, &path)?;
            Ok(None)
        }
        FormatKind::Array {
            item,
            count,
            terminator,
        } => decode_array(
            node.name(),
            item,
            count,
            *terminator,
            atom,
            cursor,
            seeks,
            &path,
        )
        .map(Some),
        FormatKind::Group { .. } => {
            let mut ns = atom.namespace().to_vec();
            if let Some(name) = node.name() {
                ns.push(name.to_string());
            }
            Ok(Some(Value::Record(decode_group(node, ns, cursor, seeks)?)))
        }
        FormatKind::Derived { first, chain } => {
            Ok(Some(Value::Int(eval_derived(first, chain, atom)?)))
        }
        FormatKind::Seek { anchor, offset } => {
            apply_seek(anchor, offset, atom, cursor, seeks, &path)?;
            Ok(None)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_array(
    name: Option<&str>,
    item: &Node,
    count: &CountRule,
    terminator: Option<i64>,
    atom: &mut Atom,
    cursor: &mut ByteCursor<'_>,
    seeks: &mut SeekMap,
    path: &str,
) -> Result<Value> {
    // a list already present on the record (re-decode) pins the count
    let existing = name
        .and_then(|name| atom.get(name))
        .and_then(Value::as_list)
        .map(|l| l.len());
    let count = match existing {
        Some(n) => Some(n),
        None => match count {
            CountRule::None => None,
            CountRule::Fixed(n) => Some(*n),
            CountRule::Field(field) => {
                let v = atom.get_int(field).ok_or_else(|| DecodeError::BadCount {
                    path: path.to_string(),
                })?;
                Some(usize::try_from(v).map_err(|_| DecodeError::BadCount {
                    path: path.to_string(),
                })?)
            }
        },
    };

    let mut items = Vec::new();
    loop {
        if let Some(c) = count {
            if items.len() >= c {
                break;
            }
        } else if cursor.remaining() == 0 {
            break;
        }
        let value = decode_node(item, atom, cursor, seeks)?.ok_or_else(|| {
            SchemaError::StructuralArrayItem {
                path: path.to_string(),
            }
        })?;
        if let Some(t) = terminator {
            if value == Value::Int(t) {
                break;
            }
        }
        items.push(value);
    }
    Ok(Value::List(items))
}

fn eval_derived(first: &Operand, chain: &[(DerivedOp, Operand)], atom: &Atom) -> Result<i64> {
    let mut value = operand_value(first, atom)?;
    for (op, operand) in chain {
        let rhs = operand_value(operand, atom)?;
        value = match op {
            DerivedOp::Add => value.wrapping_add(rhs),
            DerivedOp::Sub => value.wrapping_sub(rhs),
        };
    }
    Ok(value)
}

fn operand_value(operand: &Operand, atom: &Atom) -> Result<i64> {
    match operand {
        Operand::Const(v) => Ok(*v),
        Operand::Node(node) => {
            let name = node.name().ok_or(SchemaError::UnnamedOperand)?;
            atom.get_int(name).ok_or_else(|| {
                SchemaError::UnknownField {
                    name: name.to_string(),
                }
                .into()
            })
        }
    }
}

fn apply_seek(
    anchor: &AnchorRule,
    offset: &OffsetRule,
    atom: &Atom,
    cursor: &mut ByteCursor<'_>,
    seeks: &SeekMap,
    path: &str,
) -> Result<()> {
    let off = match offset {
        OffsetRule::Literal(v) => *v,
        OffsetRule::Field(fr) => field_int(fr, atom)?,
    };
    match anchor {
        AnchorRule::Current => cursor.seek_by(off, path)?,
        AnchorRule::Absolute(p) => cursor.seek_to(*p as i64 + off, path)?,
        AnchorRule::Node(node) => {
            let p = seeks
                .lookup(node.id())
                .ok_or_else(|| DecodeError::UnknownAnchor {
                    path: path.to_string(),
                })?;
            cursor.seek_to(p as i64 + off, path)?;
        }
    }
    Ok(())
}

/// Read an integer field referenced by a seek, resolving the owning record
/// by namespace. Decode walks downward from the current record; ancestor
/// references only resolve during encode, where the full tree exists.
fn field_int(fr: &FieldRef, atom: &Atom) -> Result<i64> {
    let name = fr.node.name().ok_or(SchemaError::UnnamedOperand)?;
    let owner = if fr.namespace.is_empty() {
        Some(atom)
    } else {
        atom.locate(&fr.namespace)
    };
    owner.and_then(|a| a.get_int(name)).ok_or_else(|| {
        DecodeError::MissingField {
            path: join_path(&fr.namespace, name),
        }
        .into()
    })
}

fn read_int(code: FormatCode, raw: &[u8]) -> i64 {
    use byteorder::{ByteOrder, LittleEndian};
    match code {
        FormatCode::I8 => raw[0] as i8 as i64,
        FormatCode::U8 => raw[0] as i64,
        FormatCode::I16 => LittleEndian::read_i16(raw) as i64,
        FormatCode::U16 => LittleEndian::read_u16(raw) as i64,
        FormatCode::I32 => LittleEndian::read_i32(raw) as i64,
        FormatCode::U32 => LittleEndian::read_u32(raw) as i64,
        FormatCode::I64 => LittleEndian::read_i64(raw),
        FormatCode::U64 => LittleEndian::read_u64(raw) as i64,
        // handled before the width read
        FormatCode::Bytes(_) | FormatCode::Skip(_) => unreachable!(),
    }
}
