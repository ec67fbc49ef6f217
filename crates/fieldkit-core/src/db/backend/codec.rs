use crate::{
    db::{AutoIncrementDictionary, OpaqueRow, RowId, RowTable, StoreError},
    model::{SchemaId, SchemaRegistry},
    record::Record,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_cbor::{from_slice, to_vec};
use std::{
    collections::BTreeMap,
    panic::{AssertUnwindSafe, catch_unwind},
};

/// Snapshot layout version written to every file.
const SNAPSHOT_VERSION: u8 = 1;

///
/// Snapshot
///
/// On-disk image of a [`RowTable`]. Records travel as their lossless bit
/// encoding, tagged with the schema needed to decode them.
///

#[derive(Debug, Deserialize, Serialize)]
struct Snapshot {
    version: u8,
    next_row: RowId,
    counters: AutoIncrementDictionary,
    rows: Vec<StoredRow>,
}

#[derive(Debug, Deserialize, Serialize)]
struct StoredRow {
    row: RowId,
    schema: SchemaId,
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
}

pub(crate) fn encode(table: &RowTable) -> Result<Vec<u8>, StoreError> {
    let mut rows = table
        .rows()
        .map(|(row, record)| {
            let schema = record.schema().id().ok_or_else(|| StoreError::UnregisteredSchema {
                schema: record.schema().name().to_string(),
            })?;
            let bytes = record.to_bytes(true).map_err(|err| StoreError::Codec {
                operation: "encode",
                message: format!("row {row}: {err}"),
            })?;

            Ok(StoredRow { row, schema, bytes })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    rows.extend(table.opaque_rows().map(|(row, opaque)| StoredRow {
        row,
        schema: opaque.schema,
        bytes: opaque.bytes.clone(),
    }));
    rows.sort_by_key(|stored| stored.row);

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        next_row: table.next_row(),
        counters: table.counters().clone(),
        rows,
    };

    to_vec(&snapshot).map_err(|err| StoreError::Codec {
        operation: "encode",
        message: err.to_string(),
    })
}

/// Decode a snapshot. Rows of schemas the registry does not know are kept
/// as [`OpaqueRow`]s and are written back by the next [`encode`].
pub(super) fn decode(bytes: &[u8], registry: &SchemaRegistry) -> Result<RowTable, StoreError> {
    let snapshot: Snapshot = deserialize(bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StoreError::Codec {
            operation: "decode",
            message: format!("unsupported snapshot version {}", snapshot.version),
        });
    }

    let mut rows = BTreeMap::new();
    let mut opaque = BTreeMap::new();
    for stored in snapshot.rows {
        let Ok(schema) = registry.schema(stored.schema) else {
            tracing::warn!(row = stored.row, schema = %stored.schema, "keeping row of unknown schema unread");
            opaque.insert(
                stored.row,
                OpaqueRow {
                    schema: stored.schema,
                    bytes: stored.bytes,
                },
            );
            continue;
        };
        let record = Record::from_bytes(schema.clone(), &stored.bytes, true).map_err(|err| {
            StoreError::Codec {
                operation: "decode",
                message: format!("row {}: {err}", stored.row),
            }
        })?;
        rows.insert(stored.row, record);
    }

    Ok(RowTable::from_parts(rows, opaque, snapshot.next_row, snapshot.counters))
}

/// Any panic inside the CBOR decoder is reported as a decode error.
fn deserialize<T>(bytes: &[u8]) -> Result<T, StoreError>
where
    T: DeserializeOwned,
{
    let result = catch_unwind(AssertUnwindSafe(|| from_slice(bytes)));

    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(StoreError::Codec {
            operation: "decode",
            message: err.to_string(),
        }),
        Err(_) => Err(StoreError::Codec {
            operation: "decode",
            message: "panic during CBOR deserialization".into(),
        }),
    }
}
