//! Permissive decoding of concatenated/chunked JSON payloads.
//!
//! Several upstream services stream JSON without framing: a single
//! `message` buffer may contain more than one top-level JSON value
//! concatenated back-to-back (`{...}{...}` or `[...][...]`). The normal
//! `serde_json::from_slice` call fails outright on such input, so callers
//! fall back to a streaming deserializer that reads one value at a time.

use serde::de::DeserializeOwned;
use serde_json::Deserializer;

/// Try a single decode first; on failure, stream-decode successive
/// top-level JSON values and return all of them in order.
///
/// Returns an empty vector only if no value could be decoded at all.
pub fn decode_concatenated<T: DeserializeOwned>(bytes: &[u8]) -> Vec<T> {
    if let Ok(single) = serde_json::from_slice::<T>(bytes) {
        return vec![single];
    }

    let mut values = Vec::new();
    let mut stream = Deserializer::from_slice(bytes).into_iter::<T>();
    for item in &mut stream {
        match item {
            Ok(value) => values.push(value),
            Err(_) => break,
        }
    }
    values
}

/// Merge a sequence of objects that each carry a `hosts`-like list field,
/// keeping the *last* summary-level fields but the union of all per-host
/// entries across chunks.
///
/// `extract_hosts` pulls the list out of one decoded chunk; `merge_hosts`
/// appends it onto the accumulator.
pub fn merge_object_chunks<T, H>(
    chunks: Vec<T>,
    mut extract_hosts: impl FnMut(&mut T) -> Vec<H>,
) -> Option<(T, Vec<H>)> {
    let mut iter = chunks.into_iter();
    let mut last = iter.next()?;
    let mut hosts = extract_hosts(&mut last);

    for mut chunk in iter {
        hosts.append(&mut extract_hosts(&mut chunk));
        last = chunk;
    }

    Some((last, hosts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Envelope {
        network: String,
        hosts: Vec<String>,
    }

    #[test]
    fn decodes_single_object() {
        let bytes = br#"{"network":"a","hosts":["1"]}"#;
        let decoded: Vec<Envelope> = decode_concatenated(bytes);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn decodes_concatenated_objects() {
        let bytes =
            br#"{"network":"a","hosts":["1"]}{"network":"b","hosts":["2","3"]}"#;
        let decoded: Vec<Envelope> = decode_concatenated(bytes);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].network, "b");
    }

    #[test]
    fn merges_hosts_keeping_last_summary() {
        let bytes =
            br#"{"network":"a","hosts":[]}{"network":"b","hosts":["1"]}"#;
        let decoded: Vec<Envelope> = decode_concatenated(bytes);
        let (summary, hosts) =
            merge_object_chunks(decoded, |e| std::mem::take(&mut e.hosts)).unwrap();
        assert_eq!(summary.network, "b");
        assert_eq!(hosts, vec!["1".to_string()]);
    }

    #[test]
    fn decodes_concatenated_arrays() {
        let bytes = br#"[1,2,3][4,5]"#;
        let decoded: Vec<Vec<i32>> = decode_concatenated(bytes);
        assert_eq!(decoded, vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn returns_empty_on_garbage() {
        let decoded: Vec<Envelope> = decode_concatenated(b"not json at all");
        assert!(decoded.is_empty());
    }
}
