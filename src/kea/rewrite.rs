//! Post-pass converting fixed-length text to variable-length text.
//!
//! Containers written in parallel mode store all text as fixed-length fields
//! with a single space standing in for empty values. Once the parallel
//! writers are done, a single process runs [`rewrite_strings`] so the file
//! reads like one written serially.

use std::path::Path;

use super::schema::EMPTY_PLACEHOLDER;
use crate::store::{Access, AttrValue, DatasetBuilder, ElementType, File, Mode, StringKind};
use crate::util::Result;

fn restore(value: String) -> String {
    if value == EMPTY_PLACEHOLDER {
        String::new()
    } else {
        value
    }
}

/// Rewrite every fixed-length text dataset and attribute in the store at
/// `path` as variable-length text. Returns the number of datasets converted.
///
/// Must not run while other handles have the file open.
pub fn rewrite_strings(path: impl AsRef<Path>) -> Result<usize> {
    let file = File::open(path, Mode::ReadWrite, Access::Serial)?;
    let mut converted = 0;
    walk(&file, "", &mut converted)?;
    file.close()?;
    tracing::info!(path = %file.path().display(), datasets = converted, "rewrote fixed-length strings");
    Ok(converted)
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

fn walk(file: &File, group: &str, converted: &mut usize) -> Result<()> {
    convert_attrs(file, group)?;
    for name in file.member_names(group)? {
        let path = join(group, &name);
        if file.is_group(&path)? {
            walk(file, &path, converted)?;
        } else {
            if convert_dataset(file, &path)? {
                *converted += 1;
            }
            convert_attrs(file, &path)?;
        }
    }
    Ok(())
}

fn convert_attrs(file: &File, path: &str) -> Result<()> {
    for name in file.attr_names(path)? {
        if let Some(AttrValue::Text(value, StringKind::Fixed)) = file.attr(path, &name)? {
            file.set_attr(path, &name, AttrValue::text(restore(value)))?;
        }
    }
    Ok(())
}

fn convert_dataset(file: &File, path: &str) -> Result<bool> {
    let ds = file.dataset(path)?;
    if !matches!(ds.element_type()?, ElementType::FixedString(_)) {
        return Ok(false);
    }

    let shape = ds.shape()?;
    let sel = ds.selection_all();
    let values: Vec<String> = ds.read_text(&sel)?.into_iter().map(restore).collect();
    let mut attrs = Vec::new();
    for name in ds.attr_names()? {
        if let Some(value) = ds.attr(&name)? {
            attrs.push((name, value));
        }
    }

    let mut builder = DatasetBuilder::new(ElementType::VarString, shape).compression(ds.compression()?);
    if let Some(chunks) = ds.chunks()? {
        builder = builder.chunks(chunks);
    }

    file.delete(path)?;
    let fresh = file.create_dataset(path, builder)?;
    fresh.write_text(&sel, &values)?;
    for (name, value) in attrs {
        fresh.set_attr(&name, value)?;
    }
    tracing::debug!(path, "converted fixed-length text dataset");
    Ok(true)
}
