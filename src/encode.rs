//! Encoding atoms back into bytes
//!
//! The driver walks the same schema tree the decode pass used and appends
//! each node's bytes to an [`EncodeBuf`]. Offset fields referenced by seek
//! nodes cannot be known up front: they are written as zero placeholders,
//! and when the seek node later executes (at the position the pointed-to
//! data begins) the placeholder is patched in place with
//! `current position - seek_map[anchor]`. Each placeholder moves through
//! `unresolved -> anchor-recorded -> patched`; anything still unresolved when
//! the pass ends fails the encode rather than silently emitting zeros.

use std::collections::{HashMap, HashSet};

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use crate::atom::{join_path, Atom, Value};
use crate::cursor::{pad_len, SeekMap};
use crate::error::{EncodeError, Result, SchemaError};
use crate::schema::{
    AnchorRule, CountRule, FormatCode, FormatKind, Node, NodeId, OffsetRule,
};

/// Growable output buffer supporting in-place patching of already-written
/// bytes.
#[derive(Debug, Default)]
pub struct EncodeBuf {
    bytes: Vec<u8>,
}

impl EncodeBuf {
    pub fn new() -> Self {
        EncodeBuf::default()
    }

    /// Next write position (also the byte count produced so far)
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub fn put(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Append `n` bytes of a repeating fill pattern, truncated to fit
    pub fn put_pattern(&mut self, pattern: &[u8], n: usize) {
        let mut cycle = pattern.iter().cycle();
        for _ in 0..n {
            self.bytes.push(*cycle.next().unwrap_or(&0));
        }
    }

    /// Overwrite already-produced bytes; never extends the buffer
    pub fn patch(&mut self, at: usize, bytes: &[u8]) -> std::result::Result<(), EncodeError> {
        let end = at.checked_add(bytes.len()).unwrap_or(usize::MAX);
        if end > self.bytes.len() {
            return Err(EncodeError::BadPatch {
                at,
                len: bytes.len(),
                buf: self.bytes.len(),
            });
        }
        self.bytes[at..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

struct EncodeCtx<'a> {
    out: EncodeBuf,
    seeks: SeekMap,
    /// Ids of scalars that back a field-driven seek offset; written as
    /// placeholders
    deferred: HashSet<NodeId>,
    /// Placeholders written but not yet patched, by offset-field id
    pending: HashMap<NodeId, String>,
    /// Root of the record tree, for ancestor namespace resolution
    root: &'a Atom,
}

/// Encode a record through a schema whose root is a group node.
pub fn encode(schema: &Node, atom: &Atom) -> Result<Vec<u8>> {
    if !matches!(schema.kind(), FormatKind::Group { .. }) {
        return Err(SchemaError::RootNotGroup.into());
    }
    let mut deferred = HashSet::new();
    schema.collect_offset_targets(&mut deferred);
    let mut ctx = EncodeCtx {
        out: EncodeBuf::new(),
        seeks: SeekMap::default(),
        deferred,
        pending: HashMap::new(),
        root: atom,
    };
    encode_group(schema, atom, &mut ctx)?;
    if let Some(path) = ctx.pending.into_values().next() {
        return Err(EncodeError::UnresolvedSeek { path }.into());
    }
    trace!(bytes = ctx.out.position(), "record encoded");
    Ok(ctx.out.into_inner())
}

fn encode_group(node: &Node, atom: &Atom, ctx: &mut EncodeCtx<'_>) -> Result<()> {
    let FormatKind::Group { children } = node.kind() else {
        return Err(SchemaError::RootNotGroup.into());
    };
    for child in children {
        encode_node(child, atom, ctx)?;
    }
    Ok(())
}

/// Encode a node whose value (if any) lives on `atom` under the node's name.
fn encode_node(node: &Node, atom: &Atom, ctx: &mut EncodeCtx<'_>) -> Result<()> {
    ctx.seeks.record(node.id(), ctx.out.position());
    let path = join_path(atom.namespace(), node.name().unwrap_or("<anonymous>"));
    match node.kind() {
        FormatKind::Scalar { code, code_fn } => {
            let code = code_fn.as_ref().and_then(|f| (f.0)(atom)).unwrap_or(*code);
            if let FormatCode::Skip(n) = code {
                ctx.out.put_pattern(&[0], n);
                return Ok(());
            }
            if ctx.deferred.contains(&node.id()) {
                ctx.pending.insert(node.id(), path.clone());
                ctx.out.put_pattern(&[0], code.width());
                return Ok(());
            }
            let value = field_value(node, atom, &path)?;
            write_scalar(&mut ctx.out, code, value, &path)
        }
        FormatKind::Padding {
            length,
            fill,
            align,
        } => {
            let n = pad_len(ctx.out.position(), *length, *align);
            ctx.out.put_pattern(fill, n);
            Ok(())
        }
        FormatKind::Array {
            item,
            count,
            terminator,
        } => {
            let value = field_value(node, atom, &path)?;
            let list = value.as_list().ok_or_else(|| EncodeError::WrongShape {
                path: path.clone(),
                expected: "list",
            })?;
            encode_array(item, count, *terminator, list, atom, ctx, &path)
        }
        FormatKind::Group { .. } => {
            let value = field_value(node, atom, &path)?;
            let record = value.as_record().ok_or_else(|| EncodeError::WrongShape {
                path: path.clone(),
                expected: "record",
            })?;
            encode_group(node, record, ctx)
        }
        // derived values are recomputed on decode, never written
        FormatKind::Derived { .. } => Ok(()),
        FormatKind::Seek { anchor, offset } => resolve_seek(anchor, offset, ctx, &path),
    }
}

/// Encode a node against an explicit value (array elements and terminators).
fn encode_value(node: &Node, value: &Value, atom: &Atom, ctx: &mut EncodeCtx<'_>) -> Result<()> {
    ctx.seeks.record(node.id(), ctx.out.position());
    let path = join_path(atom.namespace(), node.name().unwrap_or("<item>"));
    match node.kind() {
        FormatKind::Scalar { code, code_fn } => {
            let code = code_fn.as_ref().and_then(|f| (f.0)(atom)).unwrap_or(*code);
            if let FormatCode::Skip(n) = code {
                ctx.out.put_pattern(&[0], n);
                return Ok(());
            }
            write_scalar(&mut ctx.out, code, value, &path)
        }
        FormatKind::Padding {
            length,
            fill,
            align,
        } => {
            let n = pad_len(ctx.out.position(), *length, *align);
            ctx.out.put_pattern(fill, n);
            Ok(())
        }
        FormatKind::Array {
            item,
            count,
            terminator,
        } => {
            let list = value.as_list().ok_or_else(|| EncodeError::WrongShape {
                path: path.clone(),
                expected: "list",
            })?;
            encode_array(item, count, *terminator, list, atom, ctx, &path)
        }
        FormatKind::Group { .. } => {
            let record = value.as_record().ok_or_else(|| EncodeError::WrongShape {
                path: path.clone(),
                expected: "record",
            })?;
            encode_group(node, record, ctx)
        }
        FormatKind::Derived { .. } => Ok(()),
        FormatKind::Seek { anchor, offset } => resolve_seek(anchor, offset, ctx, &path),
    }
}

fn encode_array(
    item: &Node,
    count: &CountRule,
    terminator: Option<i64>,
    list: &[Value],
    atom: &Atom,
    ctx: &mut EncodeCtx<'_>,
    path: &str,
) -> Result<()> {
    let resolved = match count {
        CountRule::None => None,
        CountRule::Fixed(n) => {
            let bad = list.len() > *n || (terminator.is_none() && list.len() != *n);
            if bad {
                return Err(EncodeError::LengthMismatch {
                    path: path.to_string(),
                    expected: *n,
                    actual: list.len(),
                }
                .into());
            }
            Some(*n)
        }
        CountRule::Field(field) => atom
            .get_int(field)
            .and_then(|v| usize::try_from(v).ok()),
    };
    for value in list {
        encode_value(item, value, atom, ctx)?;
    }
    if let Some(t) = terminator {
        // the decoder only consumed a terminator when the count rule had not
        // already capped the list; mirror that
        let capped = resolved.is_some_and(|c| list.len() >= c);
        if !capped {
            encode_value(item, &Value::Int(t), atom, ctx)?;
        }
    }
    Ok(())
}

fn resolve_seek(
    anchor: &AnchorRule,
    offset: &OffsetRule,
    ctx: &mut EncodeCtx<'_>,
    path: &str,
) -> Result<()> {
    // a literal offset fixes the layout by itself; there is nothing to patch
    let OffsetRule::Field(fr) = offset else {
        return Ok(());
    };
    let anchor_pos = match anchor {
        AnchorRule::Absolute(p) => *p,
        AnchorRule::Node(n) => {
            ctx.seeks
                .lookup(n.id())
                .ok_or_else(|| EncodeError::UnresolvedSeek {
                    path: path.to_string(),
                })?
        }
        // rejected at schema construction
        AnchorRule::Current => return Err(SchemaError::SeekNeedsAnchor.into()),
    };
    let placeholder_path =
        ctx.pending
            .remove(&fr.node.id())
            .ok_or_else(|| EncodeError::UnresolvedSeek {
                path: path.to_string(),
            })?;
    let at = ctx
        .seeks
        .lookup(fr.node.id())
        .ok_or_else(|| EncodeError::UnresolvedSeek {
            path: path.to_string(),
        })?;
    let value = ctx.out.position() as i64 - anchor_pos as i64;
    let FormatKind::Scalar { code, .. } = fr.node.kind() else {
        return Err(SchemaError::BadSeekOffset {
            name: placeholder_path,
        }
        .into());
    };
    let bytes = int_bytes(*code, value, &placeholder_path)?;
    ctx.out.patch(at, &bytes)?;
    Ok(())
}

fn field_value<'a>(node: &Node, atom: &'a Atom, path: &str) -> Result<&'a Value> {
    node.name()
        .and_then(|name| atom.get(name))
        .ok_or_else(|| {
            EncodeError::MissingField {
                path: path.to_string(),
            }
            .into()
        })
}

fn write_scalar(out: &mut EncodeBuf, code: FormatCode, value: &Value, path: &str) -> Result<()> {
    match code {
        FormatCode::Bytes(n) => {
            let bytes = value.as_bytes().ok_or_else(|| EncodeError::WrongShape {
                path: path.to_string(),
                expected: "byte string",
            })?;
            if bytes.len() != n {
                return Err(EncodeError::LengthMismatch {
                    path: path.to_string(),
                    expected: n,
                    actual: bytes.len(),
                }
                .into());
            }
            out.put(bytes);
            Ok(())
        }
        FormatCode::Skip(_) => Err(EncodeError::WrongShape {
            path: path.to_string(),
            expected: "value-producing code",
        }
        .into()),
        _ => {
            let v = value.as_int().ok_or_else(|| EncodeError::WrongShape {
                path: path.to_string(),
                expected: "integer",
            })?;
            out.put(&int_bytes(code, v, path)?);
            Ok(())
        }
    }
}

fn int_bytes(code: FormatCode, v: i64, path: &str) -> std::result::Result<Vec<u8>, EncodeError> {
    let range = |_| EncodeError::ValueRange {
        path: path.to_string(),
        value: v,
    };
    let mut buf = vec![0u8; code.width()];
    match code {
        FormatCode::I8 => buf[0] = i8::try_from(v).map_err(range)? as u8,
        FormatCode::U8 => buf[0] = u8::try_from(v).map_err(range)?,
        FormatCode::I16 => LittleEndian::write_i16(&mut buf, i16::try_from(v).map_err(range)?),
        FormatCode::U16 => LittleEndian::write_u16(&mut buf, u16::try_from(v).map_err(range)?),
        FormatCode::I32 => LittleEndian::write_i32(&mut buf, i32::try_from(v).map_err(range)?),
        FormatCode::U32 => LittleEndian::write_u32(&mut buf, u32::try_from(v).map_err(range)?),
        FormatCode::I64 => LittleEndian::write_i64(&mut buf, v),
        FormatCode::U64 => LittleEndian::write_u64(&mut buf, u64::try_from(v).map_err(range)?),
        FormatCode::Bytes(_) | FormatCode::Skip(_) => {
            return Err(EncodeError::WrongShape {
                path: path.to_string(),
                expected: "integer code",
            })
        }
    }
    Ok(buf)
}
