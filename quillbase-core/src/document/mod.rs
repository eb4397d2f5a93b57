// document/mod.rs
// Schema-less hierarchical record
//
// A document owns two scalar tapes (load-time and write-time) and a trie of
// structure nodes whose root is always an object. All field addressing is
// RFC 6901 JSON Pointer with `~0`/`~1` unescaping. Sub-documents returned
// by `get_array`/`get_dict` share the parent's tapes and trie, so mutation
// through either side is visible to the other.

pub mod builder;
pub mod tape;
pub mod trie;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, QuillBaseError, Result};
use crate::types::LogicalType;
use crate::value::ScalarValue;

use self::builder::{ImmutableWriter, MutableWriter, TapeBuilder};
use self::tape::{new_tape_handle, ElementAs, TapeHandle};
use self::trie::{deep_copy, nodes_equal, ArrayNode, ObjectNode, TrieNode, TrieNodeRef};

pub type DocumentPtr = Arc<Document>;

/// Identity of a document: the string stored at `/_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        DocumentId(id.into())
    }

    /// Fresh random id (hex, no dashes).
    pub fn generate() -> Self {
        DocumentId(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

enum ContainerSlot {
    Object { container: TrieNodeRef, key: String },
    Array { container: TrieNodeRef, index: usize },
}

pub struct Document {
    immutable: TapeHandle,
    mutable: TapeHandle,
    builder: TapeBuilder<MutableWriter>,
    root: TrieNodeRef,
    is_root: bool,
}

impl Document {
    /// Fresh empty document (object root, empty tapes).
    pub fn new() -> DocumentPtr {
        let immutable = new_tape_handle();
        let mutable = new_tape_handle();
        Arc::new(Document {
            immutable,
            mutable: mutable.clone(),
            builder: TapeBuilder::new(MutableWriter(mutable)),
            root: TrieNode::new_object(),
            is_root: true,
        })
    }

    /// Parse source JSON onto the immutable tape. The top level must be an
    /// object.
    pub fn from_json(text: &str) -> Result<DocumentPtr> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let map = value.as_object().ok_or(QuillBaseError::NotAnObject)?;

        let immutable = new_tape_handle();
        let mutable = new_tape_handle();
        let load_builder = TapeBuilder::new(ImmutableWriter(immutable.clone()));
        let root = TrieNode::new_object();
        {
            let mut guard = root.write();
            if let TrieNode::Object(object) = &mut *guard {
                for (key, val) in map {
                    object.insert(
                        key.clone(),
                        TrieNode::new_leaf(load_builder.build_string(key)),
                        build_from_json(val, &load_builder),
                    );
                }
            }
        }
        Ok(Arc::new(Document {
            immutable,
            mutable: mutable.clone(),
            builder: TapeBuilder::new(MutableWriter(mutable)),
            root,
            is_root: true,
        }))
    }

    /// Serialize to JSON text. 128-bit integers come out as the
    /// `"hugeint"` placeholder.
    pub fn to_json(&self) -> String {
        let mut out = String::new();
        trie::to_json(&self.root, &mut out);
        out
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn root_node(&self) -> &TrieNodeRef {
        &self.root
    }

    // ========================================================================
    // POINTER RESOLUTION
    // ========================================================================

    fn find_node(&self, pointer: &str) -> std::result::Result<TrieNodeRef, ErrorCode> {
        if pointer.is_empty() {
            return Ok(self.root.clone());
        }
        let rest = pointer
            .strip_prefix('/')
            .ok_or(ErrorCode::InvalidJsonPointer)?;
        let mut current = self.root.clone();
        for segment in rest.split('/') {
            let next = {
                let guard = current.read();
                match &*guard {
                    TrieNode::Object(object) => {
                        let key = unescape_segment(segment)?;
                        object.get(&key).ok_or(ErrorCode::NoSuchElement)?
                    }
                    TrieNode::Array(array) => {
                        let index: i64 =
                            segment.parse().map_err(|_| ErrorCode::NoSuchElement)?;
                        if index < 0 {
                            return Err(ErrorCode::InvalidIndex);
                        }
                        array.get(index as usize).ok_or(ErrorCode::NoSuchElement)?
                    }
                    _ => return Err(ErrorCode::NoSuchElement),
                }
            };
            if next.read().is_deleted() {
                return Err(ErrorCode::NoSuchElement);
            }
            current = next;
        }
        Ok(current)
    }

    /// Split off the final segment and resolve its container. Array indices
    /// past the end clamp to the length (a set there appends).
    fn find_container_slot(&self, pointer: &str) -> std::result::Result<ContainerSlot, ErrorCode> {
        let pos = pointer.rfind('/').ok_or(ErrorCode::InvalidJsonPointer)?;
        let container = match self.find_node(&pointer[..pos]) {
            Ok(node) => node,
            Err(ErrorCode::NoSuchElement) => return Err(ErrorCode::NoSuchContainer),
            Err(code) => return Err(code),
        };
        let last = &pointer[pos + 1..];
        let guard = container.read();
        match &*guard {
            TrieNode::Object(_) => {
                let key = unescape_segment(last)?.into_owned();
                drop(guard);
                Ok(ContainerSlot::Object { container, key })
            }
            TrieNode::Array(array) => {
                let raw: i64 = last.parse().map_err(|_| ErrorCode::InvalidIndex)?;
                if raw < 0 {
                    return Err(ErrorCode::InvalidIndex);
                }
                let index = (raw as usize).min(array.len());
                drop(guard);
                Ok(ContainerSlot::Array { container, index })
            }
            _ => Err(ErrorCode::NoSuchContainer),
        }
    }

    // ========================================================================
    // TYPED ACCESS
    // ========================================================================

    /// Logical type at the pointer; `Invalid` for missing or ill-formed.
    pub fn type_by_key(&self, pointer: &str) -> LogicalType {
        match self.find_node(pointer) {
            Ok(node) => {
                let guard = node.read();
                match &*guard {
                    TrieNode::Object(_) => LogicalType::Map,
                    TrieNode::Array(_) => LogicalType::Array,
                    TrieNode::Leaf(element) => element.logical_type(),
                    TrieNode::Deleted => LogicalType::Invalid,
                }
            }
            Err(_) => LogicalType::Invalid,
        }
    }

    pub fn is_exists(&self, pointer: &str) -> bool {
        self.find_node(pointer).is_ok()
    }

    pub fn is_null(&self, pointer: &str) -> bool {
        match self.find_node(pointer) {
            Ok(node) => node.read().as_leaf().map(|e| e.is_null()).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Child count for containers, 0 otherwise.
    pub fn count(&self, pointer: &str) -> usize {
        match self.find_node(pointer) {
            Ok(node) => {
                let guard = node.read();
                match &*guard {
                    TrieNode::Object(object) => object.len(),
                    TrieNode::Array(array) => array.len(),
                    _ => 0,
                }
            }
            Err(_) => 0,
        }
    }

    pub fn is_as<T: ElementAs>(&self, pointer: &str) -> bool {
        match self.find_node(pointer) {
            Ok(node) => node.read().as_leaf().map(|e| e.is_as::<T>()).unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn get_as<T: ElementAs>(&self, pointer: &str) -> Option<T> {
        let node = self.find_node(pointer).ok()?;
        let guard = node.read();
        guard.as_leaf()?.get_as::<T>()
    }

    pub fn is_bool(&self, pointer: &str) -> bool { self.is_as::<bool>(pointer) }
    pub fn is_tinyint(&self, pointer: &str) -> bool { self.is_as::<i8>(pointer) }
    pub fn is_smallint(&self, pointer: &str) -> bool { self.is_as::<i16>(pointer) }
    pub fn is_int(&self, pointer: &str) -> bool { self.is_as::<i32>(pointer) }
    pub fn is_long(&self, pointer: &str) -> bool { self.is_as::<i64>(pointer) }
    pub fn is_hugeint(&self, pointer: &str) -> bool { self.is_as::<i128>(pointer) }
    pub fn is_utinyint(&self, pointer: &str) -> bool { self.is_as::<u8>(pointer) }
    pub fn is_usmallint(&self, pointer: &str) -> bool { self.is_as::<u16>(pointer) }
    pub fn is_uint(&self, pointer: &str) -> bool { self.is_as::<u32>(pointer) }
    pub fn is_ulong(&self, pointer: &str) -> bool { self.is_as::<u64>(pointer) }
    pub fn is_float(&self, pointer: &str) -> bool { self.is_as::<f32>(pointer) }
    pub fn is_double(&self, pointer: &str) -> bool { self.is_as::<f64>(pointer) }
    pub fn is_string(&self, pointer: &str) -> bool { self.is_as::<String>(pointer) }

    pub fn is_array(&self, pointer: &str) -> bool {
        self.find_node(pointer)
            .map(|n| n.read().is_array())
            .unwrap_or(false)
    }

    pub fn is_dict(&self, pointer: &str) -> bool {
        self.find_node(pointer)
            .map(|n| n.read().is_object())
            .unwrap_or(false)
    }

    pub fn get_bool(&self, pointer: &str) -> Option<bool> { self.get_as::<bool>(pointer) }
    pub fn get_tinyint(&self, pointer: &str) -> Option<i8> { self.get_as::<i8>(pointer) }
    pub fn get_smallint(&self, pointer: &str) -> Option<i16> { self.get_as::<i16>(pointer) }
    pub fn get_int(&self, pointer: &str) -> Option<i32> { self.get_as::<i32>(pointer) }
    pub fn get_long(&self, pointer: &str) -> Option<i64> { self.get_as::<i64>(pointer) }
    pub fn get_hugeint(&self, pointer: &str) -> Option<i128> { self.get_as::<i128>(pointer) }
    pub fn get_utinyint(&self, pointer: &str) -> Option<u8> { self.get_as::<u8>(pointer) }
    pub fn get_usmallint(&self, pointer: &str) -> Option<u16> { self.get_as::<u16>(pointer) }
    pub fn get_uint(&self, pointer: &str) -> Option<u32> { self.get_as::<u32>(pointer) }
    pub fn get_ulong(&self, pointer: &str) -> Option<u64> { self.get_as::<u64>(pointer) }
    pub fn get_float(&self, pointer: &str) -> Option<f32> { self.get_as::<f32>(pointer) }
    pub fn get_double(&self, pointer: &str) -> Option<f64> { self.get_as::<f64>(pointer) }
    pub fn get_string(&self, pointer: &str) -> Option<String> { self.get_as::<String>(pointer) }

    /// Sub-document view of an array node; shares tapes and trie.
    pub fn get_array(&self, pointer: &str) -> Option<DocumentPtr> {
        let node = self.find_node(pointer).ok()?;
        if !node.read().is_array() {
            return None;
        }
        Some(self.sub_document(node))
    }

    /// Sub-document view of an object node; shares tapes and trie.
    pub fn get_dict(&self, pointer: &str) -> Option<DocumentPtr> {
        let node = self.find_node(pointer).ok()?;
        if !node.read().is_object() {
            return None;
        }
        Some(self.sub_document(node))
    }

    fn sub_document(&self, node: TrieNodeRef) -> DocumentPtr {
        Arc::new(Document {
            immutable: self.immutable.clone(),
            mutable: self.mutable.clone(),
            builder: TapeBuilder::new(MutableWriter(self.mutable.clone())),
            root: node,
            is_root: false,
        })
    }

    /// Detached scalar at the pointer, if it resolves to a leaf.
    pub fn get_value(&self, pointer: &str) -> Option<ScalarValue> {
        let node = self.find_node(pointer).ok()?;
        let guard = node.read();
        guard.as_leaf().map(|e| e.as_scalar())
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    fn set_node(&self, pointer: &str, node: TrieNodeRef) -> ErrorCode {
        match self.find_container_slot(pointer) {
            Ok(ContainerSlot::Object { container, key }) => {
                let mut guard = container.write();
                if let TrieNode::Object(object) = &mut *guard {
                    if !object.replace(&key, node.clone()) {
                        let key_node = TrieNode::new_leaf(self.builder.build_string(&key));
                        object.insert(key, key_node, node);
                    }
                }
                ErrorCode::Success
            }
            Ok(ContainerSlot::Array { container, index }) => {
                let mut guard = container.write();
                if let TrieNode::Array(array) = &mut *guard {
                    array.set(index, node);
                }
                ErrorCode::Success
            }
            Err(code) => code,
        }
    }

    /// Write a scalar. The container at the pointer prefix must already
    /// exist; intermediate objects are not auto-created.
    pub fn set<T: Into<ScalarValue>>(&self, pointer: &str, value: T) -> ErrorCode {
        let element = self.builder.build_scalar(&value.into());
        self.set_node(pointer, TrieNode::new_leaf(element))
    }

    pub fn set_null(&self, pointer: &str) -> ErrorCode {
        self.set_node(pointer, TrieNode::new_leaf(self.builder.build_null()))
    }

    pub fn set_array(&self, pointer: &str) -> ErrorCode {
        self.set_node(pointer, TrieNode::new_array())
    }

    pub fn set_dict(&self, pointer: &str) -> ErrorCode {
        self.set_node(pointer, TrieNode::new_object())
    }

    /// Plant a deletion marker; `merge` turns it into a removed key.
    pub fn set_deleter(&self, pointer: &str) -> ErrorCode {
        self.set_node(pointer, TrieNode::new_deleted())
    }

    /// Copy the scalar at `other_pointer` in `other` to `pointer` here.
    pub fn set_from(&self, pointer: &str, other: &Document, other_pointer: &str) -> ErrorCode {
        match other.get_value(other_pointer) {
            Some(value) => self.set(pointer, value),
            None => ErrorCode::InvalidType,
        }
    }

    /// Deep-copy another document's tree under `pointer`.
    pub fn set_document(&self, pointer: &str, other: &DocumentPtr) -> ErrorCode {
        self.set_node(pointer, deep_copy(&other.root))
    }

    fn remove_node(&self, pointer: &str) -> std::result::Result<TrieNodeRef, ErrorCode> {
        match self.find_container_slot(pointer)? {
            ContainerSlot::Object { container, key } => {
                let mut guard = container.write();
                match &mut *guard {
                    TrieNode::Object(object) => object.remove(&key).ok_or(ErrorCode::NoSuchElement),
                    _ => Err(ErrorCode::NoSuchContainer),
                }
            }
            ContainerSlot::Array { container, index } => {
                let mut guard = container.write();
                match &mut *guard {
                    TrieNode::Array(array) => array.remove(index).ok_or(ErrorCode::NoSuchElement),
                    _ => Err(ErrorCode::NoSuchContainer),
                }
            }
        }
    }

    /// Delete the key/index. Array removal compacts; subsequent elements
    /// shift left.
    pub fn remove(&self, pointer: &str) -> ErrorCode {
        match self.remove_node(pointer) {
            Ok(_) => ErrorCode::Success,
            Err(code) => code,
        }
    }

    /// Remove-then-set within one document. If either side fails, the
    /// document is left as it was.
    pub fn move_to(&self, from: &str, to: &str) -> ErrorCode {
        let node = match self.remove_node(from) {
            Ok(node) => node,
            Err(code) => return code,
        };
        let code = self.set_node(to, node.clone());
        if !code.is_success() {
            // the source container still exists; put the node back
            self.set_node(from, node);
        }
        code
    }

    /// Deep-copy the sub-tree at `from` and set it at `to`.
    pub fn copy_to(&self, from: &str, to: &str) -> ErrorCode {
        let node = match self.find_node(from) {
            Ok(node) => node,
            Err(ErrorCode::NoSuchElement) => return ErrorCode::NoSuchElement,
            Err(code) => return code,
        };
        self.set_node(to, deep_copy(&node))
    }

    // ========================================================================
    // COMPARISON
    // ========================================================================

    /// Total order across documents: missing sorts after present, containers
    /// compare equal, scalars by value (mixed numerics numerically).
    pub fn compare(&self, pointer: &str, other: &Document, other_pointer: &str) -> Ordering {
        let mine = self.find_node(pointer).ok();
        let theirs = other.find_node(other_pointer).ok();
        match (mine, theirs) {
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
            (Some(a), Some(b)) => {
                let a_guard = a.read();
                let b_guard = b.read();
                match (a_guard.as_leaf(), b_guard.as_leaf()) {
                    (Some(x), Some(y)) => x.as_scalar().cmp(&y.as_scalar()),
                    _ => Ordering::Equal,
                }
            }
        }
    }

    /// Compare a stored scalar against a detached value. `None` when the
    /// pointer misses or resolves to a container.
    pub fn compare_value(&self, pointer: &str, value: &ScalarValue) -> Option<Ordering> {
        self.get_value(pointer).map(|stored| stored.cmp(value))
    }

    pub fn is_equals(&self, pointer: &str, value: &ScalarValue) -> bool {
        self.compare_value(pointer, value) == Some(Ordering::Equal)
    }

    /// Structural equality, independent of tape placement.
    pub fn is_equals_documents(a: &DocumentPtr, b: &DocumentPtr) -> bool {
        nodes_equal(&a.root, &b.root)
    }

    /// New document whose trie is the union of the two; `b` wins conflicts
    /// and shared sub-trees stay shared.
    pub fn merge(a: &DocumentPtr, b: &DocumentPtr) -> DocumentPtr {
        let mutable = new_tape_handle();
        Arc::new(Document {
            immutable: new_tape_handle(),
            mutable: mutable.clone(),
            builder: TapeBuilder::new(MutableWriter(mutable)),
            root: trie::merge(&a.root, &b.root),
            is_root: true,
        })
    }

    // ========================================================================
    // UPDATE OPERATORS
    // ========================================================================

    /// Apply a `{"$set": {...}, "$inc": {...}}` update document. Field keys
    /// are JSON pointers; a bare key is treated as a top-level field.
    /// Returns true if any stored value changed.
    pub fn update(&self, update: &DocumentPtr) -> bool {
        let mut changed = false;
        let root = update.root.read();
        let ops = match &*root {
            TrieNode::Object(object) => object,
            _ => return false,
        };
        for op in ops.iter() {
            let fields_guard = op.value.read();
            let fields = match &*fields_guard {
                TrieNode::Object(object) => object,
                _ => continue,
            };
            match op.key.as_str() {
                "$set" => {
                    for field in fields.iter() {
                        if self.apply_set(&field_pointer(&field.key), &field.value) {
                            changed = true;
                        }
                    }
                }
                "$inc" => {
                    for field in fields.iter() {
                        self.apply_inc(&field_pointer(&field.key), &field.value);
                        changed = true;
                    }
                }
                _ => {}
            }
        }
        changed
    }

    /// `$set`: write only when the new value differs from the stored one at
    /// the physical level. Non-scalar payloads are ignored.
    fn apply_set(&self, pointer: &str, value: &TrieNodeRef) -> bool {
        let new_value = {
            let guard = value.read();
            match guard.as_leaf() {
                Some(element) => element.as_scalar(),
                None => return false,
            }
        };
        if let Some(stored) = self.get_value(pointer) {
            if stored == new_value {
                return false;
            }
        }
        self.set(pointer, new_value).is_success()
    }

    /// `$inc`: numeric addition, string concatenation, boolean toggle
    /// (XOR). A missing stored field counts as zero / empty / false.
    fn apply_inc(&self, pointer: &str, value: &TrieNodeRef) {
        let increment = {
            let guard = value.read();
            match guard.as_leaf() {
                Some(element) => element.as_scalar(),
                None => return,
            }
        };
        let stored = self.get_value(pointer);
        let next = match increment {
            ScalarValue::Bool(b) => {
                let current = stored.and_then(|s| s.as_bool()).unwrap_or(false);
                ScalarValue::Bool(current ^ b)
            }
            ScalarValue::Int(v) => {
                let current = stored.and_then(|s| s.as_i64()).unwrap_or(0);
                ScalarValue::Int(current.wrapping_add(v))
            }
            ScalarValue::UInt(v) => {
                let current = stored.and_then(|s| s.as_u64()).unwrap_or(0);
                ScalarValue::UInt(current.wrapping_add(v))
            }
            ScalarValue::Int128(v) => {
                let current = stored
                    .and_then(|s| match s {
                        ScalarValue::Int128(x) => Some(x),
                        other => other.as_i64().map(i128::from),
                    })
                    .unwrap_or(0);
                ScalarValue::Int128(current.wrapping_add(v))
            }
            ScalarValue::Float(v) => {
                let current = stored.and_then(|s| s.as_f64()).unwrap_or(0.0);
                ScalarValue::Float(current + v)
            }
            ScalarValue::String(suffix) => {
                let mut current = stored
                    .and_then(|s| s.as_str().map(str::to_string))
                    .unwrap_or_default();
                current.push_str(&suffix);
                ScalarValue::String(current)
            }
            ScalarValue::Null => return,
        };
        self.set(pointer, next);
    }
}

impl Default for Document {
    fn default() -> Self {
        let immutable = new_tape_handle();
        let mutable = new_tape_handle();
        Document {
            immutable,
            mutable: mutable.clone(),
            builder: TapeBuilder::new(MutableWriter(mutable)),
            root: TrieNode::new_object(),
            is_root: true,
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_json())
    }
}

/// `/_id` of a document, if present.
pub fn document_id(doc: &DocumentPtr) -> Option<DocumentId> {
    doc.get_string("/_id").map(DocumentId::new)
}

/// Build the fresh document an upsert inserts: the `$set`/`$inc` targets of
/// the update, with `/_id` generated when absent.
pub fn make_upsert_document(update: &DocumentPtr) -> DocumentPtr {
    let doc = Document::new();
    {
        let root = update.root.read();
        if let TrieNode::Object(ops) = &*root {
            for op in ops.iter() {
                if op.key != "$set" && op.key != "$inc" {
                    continue;
                }
                let fields_guard = op.value.read();
                if let TrieNode::Object(fields) = &*fields_guard {
                    for field in fields.iter() {
                        doc.set_node(&field_pointer(&field.key), deep_copy(&field.value));
                    }
                }
            }
        }
    }
    if !doc.is_exists("/_id") {
        doc.set("/_id", DocumentId::generate().as_str());
    }
    doc
}

fn build_from_json(
    value: &serde_json::Value,
    builder: &TapeBuilder<ImmutableWriter>,
) -> TrieNodeRef {
    match value {
        serde_json::Value::Object(map) => {
            let mut object = ObjectNode::new();
            for (key, val) in map {
                object.insert(
                    key.clone(),
                    TrieNode::new_leaf(builder.build_string(key)),
                    build_from_json(val, builder),
                );
            }
            Arc::new(parking_lot::RwLock::new(TrieNode::Object(object)))
        }
        serde_json::Value::Array(items) => {
            let mut array = ArrayNode::new();
            for (i, item) in items.iter().enumerate() {
                array.set(i, build_from_json(item, builder));
            }
            Arc::new(parking_lot::RwLock::new(TrieNode::Array(array)))
        }
        serde_json::Value::Null => TrieNode::new_leaf(builder.build_null()),
        serde_json::Value::Bool(b) => TrieNode::new_leaf(builder.build_bool(*b)),
        serde_json::Value::Number(n) => {
            let element = if let Some(i) = n.as_i64() {
                builder.build_int(i)
            } else if let Some(u) = n.as_u64() {
                builder.build_uint(u)
            } else {
                builder.build_double(n.as_f64().unwrap_or(0.0))
            };
            TrieNode::new_leaf(element)
        }
        serde_json::Value::String(s) => TrieNode::new_leaf(builder.build_string(s)),
    }
}

/// `~0` -> `~`, `~1` -> `/`; any other escape is ill-formed.
fn unescape_segment(segment: &str) -> std::result::Result<Cow<'_, str>, ErrorCode> {
    if !segment.contains('~') {
        return Ok(Cow::Borrowed(segment));
    }
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return Err(ErrorCode::InvalidJsonPointer),
        }
    }
    Ok(Cow::Owned(out))
}

/// Update-document field keys may be bare names; address them at top level.
fn field_pointer(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> DocumentPtr {
        Document::from_json(text).unwrap()
    }

    #[test]
    fn test_pointer_root_and_missing() {
        let d = doc(r#"{"a": 1}"#);
        assert_eq!(d.type_by_key(""), LogicalType::Map);
        assert_eq!(d.type_by_key("/a"), LogicalType::TinyInt);
        assert_eq!(d.type_by_key("/missing"), LogicalType::Invalid);
        assert_eq!(d.type_by_key("no_slash"), LogicalType::Invalid);
    }

    #[test]
    fn test_pointer_unescaping() {
        let d = doc(r#"{"a~b": 1, "a/b": 2}"#);
        assert_eq!(d.get_long("/a~0b"), Some(1));
        assert_eq!(d.get_long("/a~1b"), Some(2));
        assert!(!d.is_exists("/a~2b"));
        assert_eq!(d.type_by_key("/a~2b"), LogicalType::Invalid);
    }

    #[test]
    fn test_nested_access() {
        let d = doc(r#"{"a": {"b": [10, 20, {"c": true}]}}"#);
        assert_eq!(d.get_long("/a/b/0"), Some(10));
        assert_eq!(d.get_bool("/a/b/2/c"), Some(true));
        assert!(!d.is_exists("/a/b/3"));
        assert!(!d.is_exists("/a/b/0/c"));
        assert_eq!(d.count("/a/b"), 3);
        assert_eq!(d.count("/a/b/0"), 0);
    }

    #[test]
    fn test_set_and_get_roundtrip() {
        let d = Document::new();
        assert_eq!(d.set("/x", 5i64), ErrorCode::Success);
        assert_eq!(d.get_long("/x"), Some(5));
        assert_eq!(d.set("/s", "hi"), ErrorCode::Success);
        assert_eq!(d.get_string("/s").as_deref(), Some("hi"));
        assert_eq!(d.set("/b", true), ErrorCode::Success);
        assert_eq!(d.get_bool("/b"), Some(true));
        assert_eq!(d.set("/f", 2.5f64), ErrorCode::Success);
        assert_eq!(d.get_double("/f"), Some(2.5));
    }

    #[test]
    fn test_set_requires_container() {
        let d = Document::new();
        assert_eq!(d.set("/a/b", 1i64), ErrorCode::NoSuchContainer);
        assert_eq!(d.set_dict("/a"), ErrorCode::Success);
        assert_eq!(d.set("/a/b", 1i64), ErrorCode::Success);
        assert_eq!(d.get_long("/a/b"), Some(1));
    }

    #[test]
    fn test_set_array_index_clamps() {
        let d = Document::new();
        d.set_array("/arr");
        assert_eq!(d.set("/arr/0", 1i64), ErrorCode::Success);
        // index == len appends
        assert_eq!(d.set("/arr/1", 2i64), ErrorCode::Success);
        // past-end clamps to the length, i.e. appends too
        assert_eq!(d.set("/arr/9", 3i64), ErrorCode::Success);
        assert_eq!(d.count("/arr"), 3);
        assert_eq!(d.get_long("/arr/2"), Some(3));
        assert_eq!(d.set("/arr/-1", 4i64), ErrorCode::InvalidIndex);
    }

    #[test]
    fn test_negative_array_index_is_invalid() {
        let d = doc(r#"{"arr": [1, 2], "nested": [[1]]}"#);
        assert_eq!(d.copy_to("/arr/-1", "/x"), ErrorCode::InvalidIndex);
        assert!(!d.is_exists("/arr/-1"));
        assert_eq!(d.type_by_key("/arr/-1"), LogicalType::Invalid);
        // a negative index in the middle of a pointer fails the same way
        assert_eq!(d.copy_to("/nested/-1/0", "/x"), ErrorCode::InvalidIndex);
        // non-numeric segments stay a plain miss
        assert_eq!(d.copy_to("/arr/one", "/x"), ErrorCode::NoSuchElement);
    }

    #[test]
    fn test_remove_and_missing() {
        let d = doc(r#"{"a": 1, "b": [1, 2]}"#);
        assert_eq!(d.remove("/a"), ErrorCode::Success);
        assert!(!d.is_exists("/a"));
        assert_eq!(d.remove("/a"), ErrorCode::NoSuchElement);
        // array removal compacts
        assert_eq!(d.remove("/b/0"), ErrorCode::Success);
        assert_eq!(d.get_long("/b/0"), Some(2));
        assert_eq!(d.count("/b"), 1);
    }

    #[test]
    fn test_move_postconditions() {
        let d = doc(r#"{"a": {"b": 1}}"#);
        assert_eq!(d.move_to("/a/b", "/a/c"), ErrorCode::Success);
        assert!(!d.is_exists("/a/b"));
        assert_eq!(d.get_long("/a/c"), Some(1));
    }

    #[test]
    fn test_move_failure_leaves_unchanged() {
        let d = doc(r#"{"a": 1}"#);
        assert_eq!(d.move_to("/missing", "/b"), ErrorCode::NoSuchElement);
        assert!(!d.is_exists("/b"));
        // destination container missing: source must be restored
        assert_eq!(d.move_to("/a", "/no/container"), ErrorCode::NoSuchContainer);
        assert_eq!(d.get_long("/a"), Some(1));
    }

    #[test]
    fn test_copy_compares_equal() {
        let d = doc(r#"{"a": {"x": [1, 2]}}"#);
        assert_eq!(d.copy_to("/a", "/b"), ErrorCode::Success);
        let a = d.get_dict("/a").unwrap();
        let b = d.get_dict("/b").unwrap();
        assert!(Document::is_equals_documents(&a, &b));
        // deep copy: mutating the copy leaves the source alone
        b.set("/x/0", 9i64);
        assert_eq!(d.get_long("/a/x/0"), Some(1));
    }

    #[test]
    fn test_subdocument_mutation_visible_in_parent() {
        let d = doc(r#"{"inner": {"v": 1}}"#);
        let inner = d.get_dict("/inner").unwrap();
        inner.set("/v", 7i64);
        assert_eq!(d.get_long("/inner/v"), Some(7));
        inner.set("/w", 8i64);
        assert_eq!(d.get_long("/inner/w"), Some(8));
    }

    #[test]
    fn test_json_roundtrip() {
        let text = r#"{"a":1,"b":"two","c":[true,null,2.5],"d":{"e":-7}}"#;
        let d = doc(text);
        let again = doc(&d.to_json());
        assert!(Document::is_equals_documents(&d, &again));
    }

    #[test]
    fn test_hugeint_serializes_as_placeholder() {
        let d = Document::new();
        d.set("/h", ScalarValue::Int128(i128::from(u64::MAX) + 10));
        assert_eq!(d.to_json(), r#"{"h":"hugeint"}"#);
    }

    #[test]
    fn test_compare_orders() {
        let a = doc(r#"{"x": 1, "s": "abc"}"#);
        let b = doc(r#"{"x": 2, "s": "abd"}"#);
        assert_eq!(a.compare("/x", &b, "/x"), Ordering::Less);
        assert_eq!(b.compare("/x", &a, "/x"), Ordering::Greater);
        assert_eq!(a.compare("/x", &a, "/x"), Ordering::Equal);
        assert_eq!(a.compare("/s", &b, "/s"), Ordering::Less);
        // present sorts before missing
        assert_eq!(a.compare("/x", &b, "/missing"), Ordering::Less);
        assert_eq!(a.compare("/missing", &b, "/x"), Ordering::Greater);
        assert_eq!(a.compare("/missing", &b, "/missing"), Ordering::Equal);
    }

    #[test]
    fn test_update_set_suppresses_equal_writes() {
        let d = doc(r#"{"_id": "a", "x": 1}"#);
        let same = doc(r#"{"$set": {"x": 1}}"#);
        assert!(!d.update(&same));
        let changed = doc(r#"{"$set": {"x": 2}}"#);
        assert!(d.update(&changed));
        assert_eq!(d.get_int("/x"), Some(2));
    }

    #[test]
    fn test_update_inc_numeric_and_string() {
        let d = doc(r#"{"x": 5, "s": "ab"}"#);
        let update = doc(r#"{"$inc": {"x": 3, "s": "cd"}}"#);
        assert!(d.update(&update));
        assert_eq!(d.get_long("/x"), Some(8));
        assert_eq!(d.get_string("/s").as_deref(), Some("abcd"));
    }

    #[test]
    fn test_update_inc_bool_toggles() {
        let d = doc(r#"{"flag": true}"#);
        let update = doc(r#"{"$inc": {"flag": true}}"#);
        d.update(&update);
        assert_eq!(d.get_bool("/flag"), Some(false));
        d.update(&update);
        assert_eq!(d.get_bool("/flag"), Some(true));
    }

    #[test]
    fn test_update_set_creates_missing_field() {
        let d = doc(r#"{"x": 1}"#);
        let update = doc(r#"{"$set": {"y": 9}}"#);
        assert!(d.update(&update));
        assert_eq!(d.get_long("/y"), Some(9));
    }

    #[test]
    fn test_merge_b_wins() {
        let a = doc(r#"{"x": 1, "y": 2}"#);
        let b = doc(r#"{"y": 20, "z": 30}"#);
        let merged = Document::merge(&a, &b);
        assert_eq!(merged.get_long("/x"), Some(1));
        assert_eq!(merged.get_long("/y"), Some(20));
        assert_eq!(merged.get_long("/z"), Some(30));
        // idempotent on overlap
        let again = Document::merge(&merged, &b);
        assert!(Document::is_equals_documents(&merged, &again));
    }

    #[test]
    fn test_make_upsert_document() {
        let update = doc(r#"{"$set": {"name": "x"}, "$inc": {"n": 2}}"#);
        let fresh = make_upsert_document(&update);
        assert_eq!(fresh.get_string("/name").as_deref(), Some("x"));
        assert_eq!(fresh.get_long("/n"), Some(2));
        assert!(fresh.is_exists("/_id"));
    }

    #[test]
    fn test_document_id_helper() {
        let d = doc(r#"{"_id": "000000000000000000000007", "count": 7}"#);
        assert_eq!(
            document_id(&d),
            Some(DocumentId::new("000000000000000000000007"))
        );
        assert_eq!(document_id(&Document::new()), None);
    }

    #[test]
    fn test_set_from_other_document() {
        let src = doc(r#"{"v": 42}"#);
        let dst = Document::new();
        assert_eq!(dst.set_from("/copy", &src, "/v"), ErrorCode::Success);
        assert_eq!(dst.get_long("/copy"), Some(42));
        assert_eq!(dst.set_from("/bad", &src, "/missing"), ErrorCode::InvalidType);
    }
}
