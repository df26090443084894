//! Record image encoding.
//!
//! Documents are persisted as a compact tagged image: every value carries a
//! tag byte followed by big-endian scalars and length-prefixed variable
//! parts. The encoding is canonical - encoding the same content always
//! produces the same bytes. Wire formats for remote clients are a
//! collaborator's concern; this image only crosses the storage boundary.

use crate::config::Config;
use crate::document::value::{FieldType, Value};
use crate::document::{Document, TrackedList, TrackedMap, TrackedSet};
use crate::error::{CoreError, CoreResult};
use crate::ridbag::{BagRepr, RidBag};
use crate::types::Version;
use linkdb_storage::{RecordStorage, Rid, TreeHandle};
use uuid::Uuid;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INTEGER: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_BYTES: u8 = 4;
const TAG_LINK: u8 = 5;
const TAG_EMBEDDED: u8 = 6;
const TAG_LIST: u8 = 7;
const TAG_SET: u8 = 8;
const TAG_MAP: u8 = 9;
const TAG_LINKBAG: u8 = 10;

const NO_DECLARED_TYPE: u8 = 0xff;
const BAG_FLAG_EMBEDDED: u8 = 0x01;

/// Encodes a document's content into its record image.
pub(crate) fn encode_document(doc: &Document) -> Vec<u8> {
    let mut out = Vec::new();
    encode_content(doc, &mut out);
    out
}

fn encode_content(doc: &Document, out: &mut Vec<u8>) {
    match doc.class_name() {
        Some(class) => {
            out.push(1);
            encode_str(&class, out);
        }
        None => out.push(0),
    }
    let fields = doc.fields_for_encode();
    out.extend_from_slice(&(fields.len() as u32).to_be_bytes());
    for (name, declared, value) in fields {
        encode_str(&name, out);
        out.push(declared.map_or(NO_DECLARED_TYPE, field_type_to_byte));
        encode_value(&value, out);
    }
}

fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Integer(n) => {
            out.push(TAG_INTEGER);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Text(s) => {
            out.push(TAG_TEXT);
            encode_str(s, out);
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            out.extend_from_slice(&(b.len() as u32).to_be_bytes());
            out.extend_from_slice(b);
        }
        Value::Link(rid) => {
            out.push(TAG_LINK);
            encode_rid(*rid, out);
        }
        Value::Embedded(doc) => {
            out.push(TAG_EMBEDDED);
            encode_content(doc, out);
        }
        Value::List(list) => {
            out.push(TAG_LIST);
            encode_values(&list.values(), out);
        }
        Value::Set(set) => {
            out.push(TAG_SET);
            encode_values(&set.values(), out);
        }
        Value::Map(map) => {
            out.push(TAG_MAP);
            let entries = map.entries();
            out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
            for (key, item) in entries {
                encode_str(&key, out);
                encode_value(&item, out);
            }
        }
        Value::LinkBag(bag) => {
            out.push(TAG_LINKBAG);
            encode_bag(bag, out);
        }
    }
}

fn encode_values(values: &[Value], out: &mut Vec<u8>) {
    out.extend_from_slice(&(values.len() as u32).to_be_bytes());
    for value in values {
        encode_value(value, out);
    }
}

fn encode_bag(bag: &RidBag, out: &mut Vec<u8>) {
    let (uuid, repr) = bag.encoding_parts();
    match repr {
        BagRepr::Embedded(rids) => {
            out.push(BAG_FLAG_EMBEDDED);
            out.extend_from_slice(uuid.as_bytes());
            out.extend_from_slice(&(rids.len() as u32).to_be_bytes());
            for rid in rids {
                encode_rid(rid, out);
            }
        }
        BagRepr::Tree { handle, size } => {
            out.push(0);
            out.extend_from_slice(uuid.as_bytes());
            out.extend_from_slice(&handle.as_u64().to_be_bytes());
            out.extend_from_slice(&size.to_be_bytes());
        }
    }
}

fn encode_rid(rid: Rid, out: &mut Vec<u8>) {
    out.extend_from_slice(&rid.cluster().to_be_bytes());
    out.extend_from_slice(&rid.position().to_be_bytes());
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Decodes a record image into a clean document bound to `rid`.
pub(crate) fn decode_document(
    bytes: &[u8],
    rid: Rid,
    version: Version,
    storage: &dyn RecordStorage,
    config: &Config,
) -> CoreResult<Document> {
    let mut reader = Reader::new(bytes);
    let doc = decode_content(&mut reader, rid, version, storage, config)?;
    if !reader.is_at_end() {
        return Err(corrupt("trailing bytes after record image"));
    }
    Ok(doc)
}

fn decode_content(
    reader: &mut Reader<'_>,
    rid: Rid,
    version: Version,
    storage: &dyn RecordStorage,
    config: &Config,
) -> CoreResult<Document> {
    let class_name = if reader.read_u8()? == 1 {
        Some(reader.read_str()?)
    } else {
        None
    };
    let count = reader.read_u32()? as usize;
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let name = reader.read_str()?;
        let declared = match reader.read_u8()? {
            NO_DECLARED_TYPE => None,
            byte => Some(field_type_from_byte(byte)?),
        };
        let value = decode_value(reader, storage, config)?;
        fields.push((name, declared, value));
    }
    Ok(Document::from_parts(rid, version, class_name, fields))
}

fn decode_value(
    reader: &mut Reader<'_>,
    storage: &dyn RecordStorage,
    config: &Config,
) -> CoreResult<Value> {
    let tag = reader.read_u8()?;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_BOOL => Ok(Value::Bool(reader.read_u8()? != 0)),
        TAG_INTEGER => Ok(Value::Integer(reader.read_i64()?)),
        TAG_TEXT => Ok(Value::Text(reader.read_str()?)),
        TAG_BYTES => {
            let len = reader.read_u32()? as usize;
            Ok(Value::Bytes(reader.take(len)?.to_vec()))
        }
        TAG_LINK => Ok(Value::Link(decode_rid(reader)?)),
        TAG_EMBEDDED => {
            let doc = decode_content(
                reader,
                Rid::tentative(),
                Version::default(),
                storage,
                config,
            )?;
            Ok(Value::Embedded(doc))
        }
        TAG_LIST => Ok(Value::List(TrackedList::from_values(decode_values(
            reader, storage, config,
        )?))),
        TAG_SET => Ok(Value::Set(TrackedSet::from_values(decode_values(
            reader, storage, config,
        )?))),
        TAG_MAP => {
            let count = reader.read_u32()? as usize;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let key = reader.read_str()?;
                let value = decode_value(reader, storage, config)?;
                entries.push((key, value));
            }
            Ok(Value::Map(TrackedMap::from_entries(entries)))
        }
        TAG_LINKBAG => decode_bag(reader, storage, config),
        other => Err(corrupt(format!("unknown value tag {other}"))),
    }
}

fn decode_values(
    reader: &mut Reader<'_>,
    storage: &dyn RecordStorage,
    config: &Config,
) -> CoreResult<Vec<Value>> {
    let count = reader.read_u32()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(decode_value(reader, storage, config)?);
    }
    Ok(values)
}

fn decode_bag(
    reader: &mut Reader<'_>,
    storage: &dyn RecordStorage,
    config: &Config,
) -> CoreResult<Value> {
    let flags = reader.read_u8()?;
    let uuid = Uuid::from_bytes(
        reader
            .take(16)?
            .try_into()
            .map_err(|_| corrupt("truncated bag identity"))?,
    );
    if flags & BAG_FLAG_EMBEDDED != 0 {
        let count = reader.read_u32()? as usize;
        let mut rids = Vec::with_capacity(count);
        for _ in 0..count {
            rids.push(decode_rid(reader)?);
        }
        Ok(Value::LinkBag(RidBag::decoded_embedded(rids, uuid, config)))
    } else {
        let handle = TreeHandle::new(reader.read_u64()?);
        let _size = reader.read_u64()?;
        let counted = storage.tree_entries(handle)?;
        Ok(Value::LinkBag(RidBag::decoded_tree(
            handle, counted, uuid, config,
        )))
    }
}

fn decode_rid(reader: &mut Reader<'_>) -> CoreResult<Rid> {
    let cluster = reader.read_i32()?;
    let position = reader.read_i64()?;
    Ok(Rid::new(cluster, position))
}

fn field_type_to_byte(field_type: FieldType) -> u8 {
    match field_type {
        FieldType::Boolean => 0,
        FieldType::Integer => 1,
        FieldType::String => 2,
        FieldType::Binary => 3,
        FieldType::Link => 4,
        FieldType::Embedded => 5,
        FieldType::EmbeddedList => 6,
        FieldType::EmbeddedSet => 7,
        FieldType::EmbeddedMap => 8,
        FieldType::LinkList => 9,
        FieldType::LinkSet => 10,
        FieldType::LinkMap => 11,
        FieldType::LinkBag => 12,
    }
}

fn field_type_from_byte(byte: u8) -> CoreResult<FieldType> {
    Ok(match byte {
        0 => FieldType::Boolean,
        1 => FieldType::Integer,
        2 => FieldType::String,
        3 => FieldType::Binary,
        4 => FieldType::Link,
        5 => FieldType::Embedded,
        6 => FieldType::EmbeddedList,
        7 => FieldType::EmbeddedSet,
        8 => FieldType::EmbeddedMap,
        9 => FieldType::LinkList,
        10 => FieldType::LinkSet,
        11 => FieldType::LinkMap,
        12 => FieldType::LinkBag,
        other => return Err(corrupt(format!("unknown field type byte {other}"))),
    })
}

fn corrupt(message: impl Into<String>) -> CoreError {
    CoreError::validation(message.into())
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.position == self.bytes.len()
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| corrupt("truncated record image"))?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> CoreResult<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> CoreResult<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> CoreResult<i32> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> CoreResult<i64> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_str(&mut self) -> CoreResult<String> {
        let len = self.read_u32()? as usize;
        String::from_utf8(self.take(len)?.to_vec())
            .map_err(|_| corrupt("invalid UTF-8 in record image"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkdb_storage::MemoryStorage;

    fn roundtrip(doc: &Document) -> Document {
        let storage = MemoryStorage::new();
        let bytes = encode_document(doc);
        decode_document(
            &bytes,
            Rid::new(3, 1),
            Version::new(2),
            &storage,
            &Config::default(),
        )
        .unwrap()
    }

    #[test]
    fn scalar_fields_roundtrip() {
        let doc = Document::with_class("person");
        doc.set_field("name", "Alice").unwrap();
        doc.set_field("age", 30i64).unwrap();
        doc.set_field("active", true).unwrap();
        doc.set_field("blob", vec![1u8, 2, 3]).unwrap();
        doc.set_field("friend", Rid::new(2, 9)).unwrap();
        doc.set_field("nothing", Value::Null).unwrap();

        let decoded = roundtrip(&doc);
        assert!(decoded.has_same_content_of(&doc));
        assert_eq!(decoded.class_name(), Some("person".to_string()));
        assert_eq!(decoded.rid(), Rid::new(3, 1));
        assert_eq!(decoded.version(), Version::new(2));
        assert!(!decoded.is_dirty());
    }

    #[test]
    fn collections_roundtrip() {
        let doc = Document::new();
        doc.set_field(
            "list",
            TrackedList::from_values(vec![Value::Integer(1), Value::Text("x".to_string())]),
        )
        .unwrap();
        doc.set_field(
            "set",
            TrackedSet::from_values(vec![Value::Integer(1), Value::Integer(2)]),
        )
        .unwrap();
        doc.set_field(
            "map",
            TrackedMap::from_entries(vec![("k".to_string(), Value::Integer(7))]),
        )
        .unwrap();

        let decoded = roundtrip(&doc);
        assert!(decoded.has_same_content_of(&doc));
    }

    #[test]
    fn embedded_documents_roundtrip() {
        let child = Document::new();
        child.set_field("x", 1i64).unwrap();
        let doc = Document::new();
        doc.set_field("child", child).unwrap();

        let decoded = roundtrip(&doc);
        assert!(decoded.has_same_content_of(&doc));
        // decoded wrappers are attached: mutating the child dirties the root
        let embedded = decoded.field("child").unwrap();
        embedded.as_embedded().unwrap().set_field("y", 2i64).unwrap();
        assert!(decoded.is_dirty());
    }

    #[test]
    fn embedded_bag_roundtrips() {
        let doc = Document::new();
        let bag = RidBag::new();
        bag.add_all([Rid::new(5, 1), Rid::new(5, 1), Rid::new(5, 2)])
            .unwrap();
        doc.set_field("links", bag).unwrap();

        let decoded = roundtrip(&doc);
        assert!(decoded.has_same_content_of(&doc));
        let decoded_bag = decoded.field("links").unwrap();
        assert_eq!(decoded_bag.as_link_bag().unwrap().size(), 3);
        assert!(decoded_bag.as_link_bag().unwrap().is_embedded());
    }

    #[test]
    fn tree_bag_hydrates_from_storage() {
        let storage = MemoryStorage::new();
        let handle = storage.create_tree().unwrap();
        storage
            .tree_apply(handle, &[(Rid::new(5, 1), 2), (Rid::new(5, 2), 1)])
            .unwrap();

        let config = Config::default().ridbag_embedded_to_tree_threshold(2);
        let bag = RidBag::decoded_tree(
            handle,
            storage.tree_entries(handle).unwrap(),
            Uuid::new_v4(),
            &config,
        );
        let doc = Document::new();
        doc.set_field("links", bag).unwrap();

        let bytes = encode_document(&doc);
        let decoded =
            decode_document(&bytes, Rid::new(0, 0), Version::new(1), &storage, &config).unwrap();
        let decoded_bag = decoded.field("links").unwrap();
        let hydrated = decoded_bag.as_link_bag().unwrap();
        assert!(!hydrated.is_embedded());
        assert_eq!(hydrated.size(), 3);
    }

    #[test]
    fn corrupt_images_are_rejected() {
        let storage = MemoryStorage::new();
        let doc = Document::new();
        doc.set_field("a", 1i64).unwrap();
        let mut bytes = encode_document(&doc);

        bytes.truncate(bytes.len() - 1);
        assert!(decode_document(
            &bytes,
            Rid::new(0, 0),
            Version::new(1),
            &storage,
            &Config::default()
        )
        .is_err());
    }
}
