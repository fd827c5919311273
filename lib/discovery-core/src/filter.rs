//! Record lookup filters

use discovery_api::{Document, Record};

/// Filter key compared against `Record::name` instead of metadata
pub const NAME_KEY: &str = "name";

/// Check whether a record satisfies every entry of a filter.
///
/// An empty filter matches every record. The `name` key compares against the
/// record name; any other key must be present in the record metadata with an
/// equal value. Metadata keys the filter does not mention are ignored.
pub fn matches(filter: &Document, record: &Record) -> bool {
    filter.iter().all(|(key, expected)| {
        if key == NAME_KEY {
            expected.as_str() == Some(record.name.as_str())
        } else {
            record.metadata.get(key) == Some(expected)
        }
    })
}
