//! Serialization of the node tree to and from a store file.
//!
//! Every node is written as a group block whose first child is a header data
//! block. Group headers list the child names; the remaining children are the
//! child nodes in the same order. Dataset headers carry the declaration, and
//! the remaining children are the chunks in row-major chunk order. A chunk
//! holding nothing but the fill value is written as an empty data offset.
//!
//! Loading reads the node blocks and chunk offsets only. Writing appends the
//! nodes that changed since they were loaded or last written and reuses the
//! offsets of everything else, so unchanged chunks are never copied.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;
use rayon::prelude::*;

use super::compression::encode_chunk;
use super::format::*;
use super::node::{encode_text, Attributes, Buffer, Chunk, DatasetNode, GroupNode, Node};
use super::reader::IStreams;
use super::stream::OStream;
use super::types::{AttrValue, ElementType, StringKind};
use crate::util::{DataType, Dimensions, Error, Result, Scalar};

// ============================================================================
// Header encoding
// ============================================================================

fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    buf.write_u32::<LittleEndian>(s.len() as u32)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn get_str(cur: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cur.read_u32::<LittleEndian>()? as usize;
    let remaining = cur.get_ref().len() as u64 - cur.position();
    if len as u64 > remaining {
        return Err(Error::invalid(format!("string of {} bytes overruns header", len)));
    }
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

fn put_scalar(buf: &mut Vec<u8>, v: Scalar) -> Result<()> {
    match v {
        Scalar::Int(v) => {
            buf.write_u8(ATTR_INT)?;
            buf.write_i64::<LittleEndian>(v)?;
        }
        Scalar::UInt(v) => {
            buf.write_u8(ATTR_UINT)?;
            buf.write_u64::<LittleEndian>(v)?;
        }
        Scalar::Float(v) => {
            buf.write_u8(ATTR_FLOAT)?;
            buf.write_f64::<LittleEndian>(v)?;
        }
    }
    Ok(())
}

fn put_attr(buf: &mut Vec<u8>, value: &AttrValue) -> Result<()> {
    match value {
        AttrValue::Text(s, StringKind::Fixed) => {
            buf.write_u8(ATTR_FIXED_TEXT)?;
            put_str(buf, s)
        }
        AttrValue::Text(s, StringKind::Variable) => {
            buf.write_u8(ATTR_VAR_TEXT)?;
            put_str(buf, s)
        }
        other => match other.as_scalar() {
            Some(v) => put_scalar(buf, v),
            None => Err(Error::invalid("unencodable attribute")),
        },
    }
}

fn get_attr(cur: &mut Cursor<&[u8]>) -> Result<AttrValue> {
    match cur.read_u8()? {
        ATTR_INT => Ok(AttrValue::Int(cur.read_i64::<LittleEndian>()?)),
        ATTR_UINT => Ok(AttrValue::UInt(cur.read_u64::<LittleEndian>()?)),
        ATTR_FLOAT => Ok(AttrValue::Float(cur.read_f64::<LittleEndian>()?)),
        ATTR_FIXED_TEXT => Ok(AttrValue::fixed_text(get_str(cur)?)),
        ATTR_VAR_TEXT => Ok(AttrValue::text(get_str(cur)?)),
        tag => Err(Error::invalid(format!("unknown attribute tag {}", tag))),
    }
}

fn put_attrs(buf: &mut Vec<u8>, attrs: &Attributes) -> Result<()> {
    buf.write_u32::<LittleEndian>(attrs.len() as u32)?;
    for (name, value) in attrs {
        put_str(buf, name)?;
        put_attr(buf, value)?;
    }
    Ok(())
}

fn get_attrs(cur: &mut Cursor<&[u8]>) -> Result<Attributes> {
    let count = cur.read_u32::<LittleEndian>()?;
    let mut attrs = Attributes::new();
    for _ in 0..count {
        let name = get_str(cur)?;
        attrs.insert(name, get_attr(cur)?);
    }
    Ok(attrs)
}

fn put_dims(buf: &mut Vec<u8>, dims: &Dimensions) -> Result<()> {
    buf.write_u8(dims.rank() as u8)?;
    for &n in dims.sizes() {
        buf.write_u64::<LittleEndian>(n)?;
    }
    Ok(())
}

fn get_dims(cur: &mut Cursor<&[u8]>) -> Result<Dimensions> {
    let rank = cur.read_u8()? as usize;
    let mut sizes = Vec::with_capacity(rank);
    for _ in 0..rank {
        sizes.push(cur.read_u64::<LittleEndian>()?);
    }
    Ok(Dimensions::from(sizes))
}

fn group_header(group: &GroupNode) -> Result<Vec<u8>> {
    let mut buf = vec![NODE_KIND_GROUP];
    put_attrs(&mut buf, &group.attrs)?;
    buf.write_u32::<LittleEndian>(group.children.len() as u32)?;
    for name in group.children.keys() {
        put_str(&mut buf, name)?;
    }
    Ok(buf)
}

fn dataset_header(ds: &DatasetNode) -> Result<Vec<u8>> {
    let mut buf = vec![NODE_KIND_DATASET];
    put_attrs(&mut buf, &ds.attrs)?;
    match ds.element {
        ElementType::Numeric(dt) => {
            buf.write_u8(ELEMENT_NUMERIC)?;
            buf.write_u16::<LittleEndian>(dt.code())?;
        }
        ElementType::FixedString(width) => {
            buf.write_u8(ELEMENT_FIXED_STRING)?;
            buf.write_u32::<LittleEndian>(width as u32)?;
        }
        ElementType::VarString => buf.write_u8(ELEMENT_VAR_STRING)?,
    }
    put_dims(&mut buf, &ds.shape)?;
    match &ds.chunks {
        Some(chunks) => {
            buf.write_u8(1)?;
            put_dims(&mut buf, chunks)?;
        }
        None => buf.write_u8(0)?,
    }
    buf.write_u8(ds.compression)?;
    match ds.fill {
        Some(fill) => {
            buf.write_u8(1)?;
            put_scalar(&mut buf, fill)?;
        }
        None => buf.write_u8(0)?,
    }
    Ok(buf)
}

// ============================================================================
// Writing
// ============================================================================

/// Append every changed node below `group` and return its group offset.
///
/// With `allocate` set, chunks that hold only the fill value are still given
/// a raw block so that other handles can patch them in place later.
pub(crate) fn write_group(os: &mut OStream, group: &mut GroupNode, allocate: bool) -> Result<u64> {
    let mut offsets = Vec::with_capacity(group.children.len());
    for child in group.children.values_mut() {
        offsets.push(match child {
            Node::Group(g) => write_group(os, g, allocate)?,
            Node::Dataset(d) => write_dataset(os, &mut d.write(), allocate)?,
        });
    }
    if let Some((pos, written)) = &group.stored {
        if *written == offsets {
            return Ok(*pos);
        }
    }

    let mut children = Vec::with_capacity(offsets.len() + 1);
    children.push(make_data_offset(os.write_data(&group_header(group)?)?));
    children.extend_from_slice(&offsets);
    let pos = make_group_offset(os.write_group(&children)?);
    group.stored = Some((pos, offsets));
    Ok(pos)
}

fn allocated_fill(ds: &DatasetNode, index: usize) -> Result<Option<Vec<u8>>> {
    match ds.fill_buffer(index) {
        Buffer::Raw(bytes) => Ok(Some(bytes)),
        Buffer::Text(values) if ds.is_fixed_size() => encode_text(&values, ds.element).map(Some),
        Buffer::Text(_) => Ok(None),
    }
}

fn write_dataset(os: &mut OStream, ds: &mut DatasetNode, allocate: bool) -> Result<u64> {
    if let Some(pos) = ds.stored {
        if !allocate || !ds.grid.contains(&Chunk::Fill) {
            return Ok(pos);
        }
    }
    let level = if allocate { 0 } else { ds.compression };

    // Modified chunks are encoded in parallel; everything else keeps its offset.
    let encoded: Vec<Option<Vec<u8>>> = ds
        .grid
        .par_iter()
        .map(|chunk| match chunk {
            Chunk::Dirty(buf) => match ds.encode_buffer(buf)? {
                Some(payload) => encode_chunk(&payload, level).map(Some),
                None => Ok(None),
            },
            _ => Ok(None),
        })
        .collect::<Result<_>>()?;

    let mut children = Vec::with_capacity(ds.grid.len() + 1);
    children.push(make_data_offset(os.write_data(&dataset_header(ds)?)?));
    for (index, payload) in encoded.into_iter().enumerate() {
        let offset = match (&ds.grid[index], payload) {
            (Chunk::Stored(pos), _) => make_data_offset(*pos),
            (_, Some(block)) => make_data_offset(os.write_data(&block)?),
            _ if allocate => match allocated_fill(ds, index)? {
                Some(raw) => make_data_offset(os.write_data(&encode_chunk(&raw, 0)?)?),
                None => EMPTY_DATA,
            },
            _ => EMPTY_DATA,
        };
        children.push(offset);
    }

    for (chunk, &offset) in ds.grid.iter_mut().zip(&children[1..]) {
        *chunk = if is_empty_offset(offset) {
            Chunk::Fill
        } else {
            Chunk::Stored(extract_offset(offset))
        };
    }
    let pos = make_group_offset(os.write_group(&children)?);
    ds.stored = Some(pos);
    Ok(pos)
}

/// Create a store at `path` holding an empty root group.
pub(crate) fn init(path: &Path) -> Result<()> {
    let mut os = OStream::create(path)?;
    let mut root = GroupNode::default();
    let root_pos = write_group(&mut os, &mut root, false)?;
    os.commit(root_pos)?;
    tracing::debug!(path = %path.display(), "store initialized");
    Ok(())
}

// ============================================================================
// Reading
// ============================================================================

struct NodeBlocks {
    header: Vec<u8>,
    children: Vec<u64>,
}

fn read_blocks(streams: &IStreams, offset: u64) -> Result<NodeBlocks> {
    if !is_group_offset(offset) || is_empty_offset(offset) {
        return Err(Error::invalid(format!("expected node group at {:#x}", offset)));
    }
    let mut children = streams.read_group(extract_offset(offset))?;
    if children.is_empty() {
        return Err(Error::invalid("node without header block"));
    }
    let header_off = children.remove(0);
    let header = streams.read_data(extract_offset(header_off))?;
    Ok(NodeBlocks { header, children })
}

fn read_node(streams: &IStreams, offset: u64, depth: usize) -> Result<Node> {
    if depth > 256 {
        return Err(Error::invalid("node tree too deep"));
    }
    let blocks = read_blocks(streams, offset)?;
    let mut cur = Cursor::new(blocks.header.as_slice());
    match cur.read_u8()? {
        NODE_KIND_GROUP => {
            let mut group = read_group_node(streams, &mut cur, &blocks.children, depth)?;
            group.stored = Some((offset, blocks.children));
            Ok(Node::Group(group))
        }
        NODE_KIND_DATASET => {
            let mut ds = read_dataset_node(&mut cur, &blocks.children)?;
            ds.stored = Some(offset);
            Ok(Node::Dataset(Arc::new(RwLock::new(ds))))
        }
        kind => Err(Error::invalid(format!("unknown node kind {}", kind))),
    }
}

fn read_group_node(
    streams: &IStreams,
    cur: &mut Cursor<&[u8]>,
    children: &[u64],
    depth: usize,
) -> Result<GroupNode> {
    let attrs = get_attrs(cur)?;
    let count = cur.read_u32::<LittleEndian>()? as usize;
    if count != children.len() {
        return Err(Error::invalid(format!(
            "group lists {} names for {} children",
            count,
            children.len()
        )));
    }
    let mut group = GroupNode { attrs, ..Default::default() };
    for &child in children {
        let name = get_str(cur)?;
        group.children.insert(name, read_node(streams, child, depth + 1)?);
    }
    Ok(group)
}

fn read_dataset_node(cur: &mut Cursor<&[u8]>, children: &[u64]) -> Result<DatasetNode> {
    let attrs = get_attrs(cur)?;
    let element = match cur.read_u8()? {
        ELEMENT_NUMERIC => ElementType::Numeric(DataType::from_code(cur.read_u16::<LittleEndian>()?)?),
        ELEMENT_FIXED_STRING => ElementType::FixedString(cur.read_u32::<LittleEndian>()? as usize),
        ELEMENT_VAR_STRING => ElementType::VarString,
        tag => return Err(Error::invalid(format!("unknown element tag {}", tag))),
    };
    let shape = get_dims(cur)?;
    let chunks = match cur.read_u8()? {
        0 => None,
        _ => Some(get_dims(cur)?),
    };
    let compression = cur.read_u8()?;
    let fill = match cur.read_u8()? {
        0 => None,
        _ => get_attr(cur)?.as_scalar(),
    };

    let mut ds = DatasetNode::new(element, shape, chunks, compression, fill)?;
    ds.attrs = attrs;
    if ds.grid.len() != children.len() {
        return Err(Error::invalid(format!(
            "dataset has {} chunks, expected {}",
            children.len(),
            ds.grid.len()
        )));
    }
    for (chunk, &offset) in ds.grid.iter_mut().zip(children) {
        if is_empty_offset(offset) {
            continue;
        }
        if !is_data_offset(offset) {
            return Err(Error::invalid(format!("chunk offset {:#x} is not a data block", offset)));
        }
        *chunk = Chunk::Stored(extract_offset(offset));
    }
    Ok(ds)
}

/// Load the node tree committed in the header. Chunk contents stay on disk.
pub(crate) fn load(streams: &IStreams, path: &Path) -> Result<GroupNode> {
    if !streams.is_frozen() {
        return Err(Error::invalid(format!(
            "{} was not completely written",
            path.display()
        )));
    }
    let root = streams.root_pos()?;
    match read_node(streams, root, 0)? {
        Node::Group(g) => {
            tracing::debug!(path = %path.display(), version = streams.version(), root, "store loaded");
            Ok(g)
        }
        Node::Dataset(_) => Err(Error::invalid("root node is not a group")),
    }
}
