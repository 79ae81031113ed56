//! Node tree of an open store.
//!
//! Groups and dataset declarations are held in memory. Dataset chunks stay in
//! the file until they are read or modified; only modified chunks are kept as
//! decoded buffers, and only until the next flush.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;
use rayon::prelude::*;

use super::compression::decode_chunk;
use super::format::CHUNK_RAW;
use super::reader::IStreams;
use super::selection::Selection;
use super::stream::Patcher;
use super::types::{AttrValue, ElementType};
use crate::util::{Dimensions, Error, Result, Scalar};

/// Attribute table of a node, kept in name order.
pub(crate) type Attributes = BTreeMap<String, AttrValue>;

/// Decoded contents of one chunk.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Buffer {
    /// Little-endian numeric elements.
    Raw(Vec<u8>),
    /// Fixed or variable-length text elements.
    Text(Vec<String>),
}

/// State of one chunk of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Chunk {
    /// Never written; reads as the fill value.
    Fill,
    /// Encoded data block at this file position.
    Stored(u64),
    /// Modified since the last flush.
    Dirty(Buffer),
}

/// Where stored chunks come from, and where collective handles patch them.
pub(crate) struct ChunkIo<'a> {
    pub streams: &'a IStreams,
    pub patcher: Option<&'a Patcher>,
}

/// Dataset declaration and chunk table.
#[derive(Debug)]
pub(crate) struct DatasetNode {
    pub element: ElementType,
    pub shape: Dimensions,
    pub chunks: Option<Dimensions>,
    pub compression: u8,
    pub fill: Option<Scalar>,
    pub attrs: Attributes,
    pub grid: Vec<Chunk>,
    /// Region of each entry of `grid`, in row-major chunk order.
    pub regions: Vec<Selection>,
    /// Group offset of this node in the file while it is unchanged.
    pub stored: Option<u64>,
}

impl DatasetNode {
    /// Declare a dataset whose chunks all read as the fill value.
    pub fn new(
        element: ElementType,
        shape: Dimensions,
        chunks: Option<Dimensions>,
        compression: u8,
        fill: Option<Scalar>,
    ) -> Result<Self> {
        let regions = chunk_selections(&shape, chunks.as_ref());
        let largest = regions.iter().map(Selection::num_points).max().unwrap_or(0);
        if usize::try_from(largest).is_err() {
            return Err(Error::invalid(format!("chunk of {} elements is too large", largest)));
        }
        Ok(Self {
            element,
            shape,
            chunks,
            compression,
            fill,
            attrs: Attributes::new(),
            grid: vec![Chunk::Fill; regions.len()],
            regions,
            stored: None,
        })
    }

    /// Encoded fill element for numeric datasets.
    pub fn fill_bytes(&self) -> Option<Vec<u8>> {
        let dt = self.element.dtype()?;
        Some(self.fill.map_or_else(|| vec![0u8; dt.num_bytes()], |f| f.to_bytes(dt)))
    }

    /// Decoded contents of chunk `index` when it holds only the fill value.
    pub fn fill_buffer(&self, index: usize) -> Buffer {
        let count = self.regions[index].num_points() as usize;
        match self.fill_bytes() {
            Some(one) => Buffer::Raw(one.repeat(count)),
            None => Buffer::Text(vec![String::new(); count]),
        }
    }

    /// Whether the chunks of this dataset have a fixed encoded size.
    pub fn is_fixed_size(&self) -> bool {
        self.element.num_bytes().is_some() || matches!(self.element, ElementType::FixedString(_))
    }

    fn element_size(&self) -> usize {
        match self.element {
            ElementType::FixedString(width) => width,
            _ => self.element.num_bytes().unwrap_or(0),
        }
    }

    fn check_numeric(&self) -> Result<usize> {
        self.element.num_bytes().ok_or_else(|| Error::TypeMismatch {
            expected: "numeric dataset".to_string(),
            actual: self.element.to_string(),
        })
    }

    fn check_text(&self) -> Result<()> {
        if self.element.is_string() {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: "string dataset".to_string(),
                actual: self.element.to_string(),
            })
        }
    }

    /// Indices of the chunks overlapping `sel`.
    fn overlapping(&self, sel: &Selection) -> Vec<usize> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, region)| sel.intersect(region).is_some())
            .map(|(i, _)| i)
            .collect()
    }

    /// Contents of chunk `index`, or None when it holds only the fill value.
    fn chunk_buffer(&self, index: usize, streams: &IStreams) -> Result<Option<Cow<'_, Buffer>>> {
        match &self.grid[index] {
            Chunk::Fill => Ok(None),
            Chunk::Dirty(buf) => Ok(Some(Cow::Borrowed(buf))),
            Chunk::Stored(pos) => {
                let payload = decode_chunk(&streams.read_data(*pos)?)?;
                let count = self.regions[index].num_points() as usize;
                let buf = if self.element.is_string() {
                    Buffer::Text(decode_text(&payload, count, self.element)?)
                } else {
                    if payload.len() != count * self.element_size() {
                        return Err(Error::invalid(format!(
                            "chunk at {:#x} holds {} bytes, expected {}",
                            pos,
                            payload.len(),
                            count * self.element_size()
                        )));
                    }
                    Buffer::Raw(payload)
                };
                Ok(Some(Cow::Owned(buf)))
            }
        }
    }

    /// Decode the chunks overlapping `sel` in parallel.
    fn load_overlapping(&self, sel: &Selection, streams: &IStreams) -> Result<Vec<(usize, Cow<'_, Buffer>)>> {
        let loaded: Vec<Option<(usize, Cow<'_, Buffer>)>> = self
            .overlapping(sel)
            .into_par_iter()
            .map(|i| Ok(self.chunk_buffer(i, streams)?.map(|buf| (i, buf))))
            .collect::<Result<_>>()?;
        Ok(loaded.into_iter().flatten().collect())
    }

    /// Take chunk `index` out for modification.
    fn take_buffer(&mut self, index: usize, streams: &IStreams) -> Result<Buffer> {
        if let Chunk::Dirty(buf) = &mut self.grid[index] {
            return Ok(std::mem::replace(buf, Buffer::Raw(Vec::new())));
        }
        Ok(match self.chunk_buffer(index, streams)? {
            Some(buf) => buf.into_owned(),
            None => self.fill_buffer(index),
        })
    }

    /// Start of the raw payload of chunk `index` when it can be patched in place.
    fn patchable(&self, index: usize, io: &ChunkIo<'_>) -> Result<Option<u64>> {
        let Chunk::Stored(pos) = self.grid[index] else { return Ok(None) };
        if io.patcher.is_none() || !self.is_fixed_size() {
            return Ok(None);
        }
        let head = io.streams.read_bytes(pos, 9)?;
        let mut cur = Cursor::new(head.as_slice());
        let size = cur.read_u64::<LittleEndian>()?;
        let expected = self.regions[index].num_points() * self.element_size() as u64 + 1;
        Ok((cur.read_u8()? == CHUNK_RAW && size == expected).then_some(pos + 9))
    }

    /// Copy the selected numeric elements into a packed buffer.
    pub fn read_raw(&self, sel: &Selection, streams: &IStreams) -> Result<Vec<u8>> {
        sel.validate(&self.shape)?;
        let size = self.check_numeric()?;
        let fill = self.fill_bytes().unwrap_or_default();
        let mut out = fill.repeat(sel.num_points() as usize);

        for (i, buf) in self.load_overlapping(sel, streams)? {
            let Buffer::Raw(bytes) = buf.as_ref() else { continue };
            sel.for_each_chunk_run(&self.regions[i], |c, p, n| {
                out[p * size..(p + n) * size].copy_from_slice(&bytes[c * size..(c + n) * size]);
            });
        }
        Ok(out)
    }

    /// Scatter a packed buffer into the selected numeric elements.
    pub fn write_raw(&mut self, sel: &Selection, src: &[u8], io: &ChunkIo<'_>) -> Result<()> {
        sel.validate(&self.shape)?;
        let size = self.check_numeric()?;
        let expected = sel.num_points() as usize;
        if src.len() != expected * size {
            return Err(Error::ShapeMismatch { expected, actual: src.len() / size.max(1) });
        }

        for i in self.overlapping(sel) {
            if let (Some(patcher), Some(base)) = (io.patcher, self.patchable(i, io)?) {
                let mut result = Ok(());
                sel.for_each_chunk_run(&self.regions[i], |c, p, n| {
                    if result.is_ok() {
                        result = patcher.write_at(base + (c * size) as u64, &src[p * size..(p + n) * size]);
                    }
                });
                result?;
                continue;
            }

            let mut buf = self.take_buffer(i, io.streams)?;
            if let Buffer::Raw(bytes) = &mut buf {
                sel.for_each_chunk_run(&self.regions[i], |c, p, n| {
                    bytes[c * size..(c + n) * size].copy_from_slice(&src[p * size..(p + n) * size]);
                });
            }
            self.grid[i] = Chunk::Dirty(buf);
            self.stored = None;
        }
        Ok(())
    }

    pub fn read_text(&self, sel: &Selection, streams: &IStreams) -> Result<Vec<String>> {
        sel.validate(&self.shape)?;
        self.check_text()?;
        let mut out = vec![String::new(); sel.num_points() as usize];

        for (i, buf) in self.load_overlapping(sel, streams)? {
            let Buffer::Text(values) = buf.as_ref() else { continue };
            sel.for_each_chunk_run(&self.regions[i], |c, p, n| {
                out[p..p + n].clone_from_slice(&values[c..c + n]);
            });
        }
        Ok(out)
    }

    pub fn write_text(&mut self, sel: &Selection, src: &[String], io: &ChunkIo<'_>) -> Result<()> {
        sel.validate(&self.shape)?;
        self.check_text()?;
        let expected = sel.num_points() as usize;
        if src.len() != expected {
            return Err(Error::ShapeMismatch { expected, actual: src.len() });
        }
        if let ElementType::FixedString(width) = self.element {
            if let Some(long) = src.iter().find(|s| s.len() > width) {
                return Err(Error::invalid(format!(
                    "text of {} bytes does not fit fixed width {}",
                    long.len(),
                    width
                )));
            }
        }

        for i in self.overlapping(sel) {
            if let (Some(patcher), Some(base)) = (io.patcher, self.patchable(i, io)?) {
                let width = self.element_size();
                let mut result = Ok(());
                sel.for_each_chunk_run(&self.regions[i], |c, p, n| {
                    if result.is_ok() {
                        let bytes = encode_fixed(&src[p..p + n], width);
                        result = patcher.write_at(base + (c * width) as u64, &bytes);
                    }
                });
                result?;
                continue;
            }

            let mut buf = self.take_buffer(i, io.streams)?;
            if let Buffer::Text(values) = &mut buf {
                sel.for_each_chunk_run(&self.regions[i], |c, p, n| {
                    values[c..c + n].clone_from_slice(&src[p..p + n]);
                });
            }
            self.grid[i] = Chunk::Dirty(buf);
            self.stored = None;
        }
        Ok(())
    }

    /// Payload of a modified chunk, or None when it holds only the fill value.
    pub fn encode_buffer(&self, buf: &Buffer) -> Result<Option<Vec<u8>>> {
        match buf {
            Buffer::Raw(bytes) => {
                let fill = self.fill_bytes().unwrap_or_default();
                if !fill.is_empty() && bytes.chunks(fill.len()).all(|e| e == fill.as_slice()) {
                    return Ok(None);
                }
                Ok(Some(bytes.clone()))
            }
            Buffer::Text(values) => {
                if values.iter().all(String::is_empty) {
                    return Ok(None);
                }
                encode_text(values, self.element).map(Some)
            }
        }
    }
}

// ============================================================================
// Chunk geometry and text payloads
// ============================================================================

/// Selections of every chunk of a dataset, in row-major chunk order.
pub(crate) fn chunk_selections(shape: &Dimensions, chunks: Option<&Dimensions>) -> Vec<Selection> {
    let chunk = chunks.unwrap_or(shape);
    let grid = shape.chunk_grid(chunk);
    let total: u64 = grid.iter().product();

    let mut out = Vec::with_capacity(total as usize);
    for linear in 0..total {
        let mut rem = linear;
        let mut ranges = vec![0..0; grid.len()];
        for axis in (0..grid.len()).rev() {
            let idx = rem % grid[axis];
            rem /= grid[axis];
            let c = chunk.sizes()[axis];
            let start = idx * c;
            ranges[axis] = start..(start + c).min(shape.sizes()[axis]);
        }
        out.push(Selection::new(ranges));
    }
    out
}

fn encode_fixed(values: &[String], width: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * width);
    for v in values {
        buf.extend_from_slice(v.as_bytes());
        buf.resize(buf.len() + width - v.len(), 0);
    }
    buf
}

pub(crate) fn encode_text(values: &[String], element: ElementType) -> Result<Vec<u8>> {
    if let ElementType::FixedString(width) = element {
        return Ok(encode_fixed(values, width));
    }
    let mut buf = Vec::new();
    for v in values {
        buf.write_u32::<LittleEndian>(v.len() as u32)?;
        buf.extend_from_slice(v.as_bytes());
    }
    Ok(buf)
}

fn decode_text(bytes: &[u8], count: usize, element: ElementType) -> Result<Vec<String>> {
    match element {
        ElementType::FixedString(width) => {
            if bytes.len() != count * width {
                return Err(Error::invalid("fixed string chunk has wrong size"));
            }
            bytes
                .chunks(width.max(1))
                .take(count)
                .map(|raw| {
                    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                    Ok(String::from_utf8(raw[..end].to_vec())?)
                })
                .collect()
        }
        _ => {
            let mut cur = Cursor::new(bytes);
            (0..count)
                .map(|_| {
                    let len = cur.read_u32::<LittleEndian>()? as usize;
                    if len as u64 > bytes.len() as u64 - cur.position() {
                        return Err(Error::invalid(format!("string of {} bytes overruns chunk", len)));
                    }
                    let mut raw = vec![0u8; len];
                    cur.read_exact(&mut raw)?;
                    Ok(String::from_utf8(raw)?)
                })
                .collect()
        }
    }
}

// ============================================================================
// Groups
// ============================================================================

/// A child of a group.
#[derive(Debug)]
pub(crate) enum Node {
    Group(GroupNode),
    Dataset(Arc<RwLock<DatasetNode>>),
}

/// Group with attributes and named children (kept in name order).
#[derive(Debug, Default)]
pub(crate) struct GroupNode {
    pub attrs: Attributes,
    pub children: BTreeMap<String, Node>,
    /// Group offset in the file and the child offsets it was written with.
    pub stored: Option<(u64, Vec<u64>)>,
}

/// Split a slash-separated path into its components.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl GroupNode {
    /// Look up a node by path. The empty path is the group itself (None here).
    pub fn get(&self, path: &str) -> Option<&Node> {
        let parts = split_path(path);
        let (last, parents) = parts.split_last()?;
        let mut group = self;
        for part in parents {
            match group.children.get(*part)? {
                Node::Group(g) => group = g,
                Node::Dataset(_) => return None,
            }
        }
        group.children.get(*last)
    }

    pub fn group(&self, path: &str) -> Result<&GroupNode> {
        if split_path(path).is_empty() {
            return Ok(self);
        }
        match self.get(path) {
            Some(Node::Group(g)) => Ok(g),
            Some(Node::Dataset(_)) => Err(Error::TypeMismatch {
                expected: "group".to_string(),
                actual: "dataset".to_string(),
            }),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    /// Walk to a group for modification, creating missing intermediate
    /// groups when asked to. The returned group is marked as changed.
    pub fn group_mut(&mut self, parts: &[&str], create: bool) -> Result<&mut GroupNode> {
        let mut group = self;
        for (depth, part) in parts.iter().enumerate() {
            if create && !group.children.contains_key(*part) {
                group.children.insert(part.to_string(), Node::Group(GroupNode::default()));
            }
            group = match group.children.get_mut(*part) {
                Some(Node::Group(g)) => g,
                Some(Node::Dataset(_)) => {
                    return Err(Error::TypeMismatch {
                        expected: "group".to_string(),
                        actual: format!("dataset at {}", parts[..=depth].join("/")),
                    })
                }
                None => return Err(Error::NotFound(parts[..=depth].join("/"))),
            };
        }
        group.stored = None;
        Ok(group)
    }

    /// Insert a new child, creating intermediate groups.
    pub fn insert(&mut self, path: &str, node: Node) -> Result<()> {
        let parts = split_path(path);
        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| Error::invalid("cannot insert at the root path"))?;
        let parent = self.group_mut(parents, true)?;
        if parent.children.contains_key(*last) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        parent.children.insert(last.to_string(), node);
        Ok(())
    }

    /// Unlink a child and return it.
    pub fn remove(&mut self, path: &str) -> Result<Node> {
        let parts = split_path(path);
        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| Error::invalid("cannot remove the root group"))?;
        let parent = self.group_mut(parents, false)?;
        parent
            .children
            .remove(*last)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    /// Whether anything below this group changed since it was written.
    pub fn is_dirty(&self) -> bool {
        self.stored.is_none()
            || self.children.values().any(|child| match child {
                Node::Group(g) => g.is_dirty(),
                Node::Dataset(d) => d.read().stored.is_none(),
            })
    }
}
