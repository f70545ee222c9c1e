//! Nested access into JSON objects by `/`-separated keys.

use serde_json::{Map, Value};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reads the value at `path`.
pub(crate) fn get<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let mut current = map.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects. Returns the previous value.
pub(crate) fn set(map: &mut Map<String, Value>, path: &str, value: Value) -> Option<Value> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let (last, parents) = segments.split_last()?;

    let mut current = map;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry.as_object_mut()?;
    }

    current.insert(last.to_string(), value)
}

/// Removes the value at `path`. Returns the removed value.
pub(crate) fn remove(map: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let (last, parents) = segments.split_last()?;

    let mut current = map;
    for segment in parents {
        current = current.get_mut(*segment)?.as_object_mut()?;
    }

    current.remove(*last)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
