//! Multi-Shard Response Composition
//!
//! The mirror of decomposition: once every piece of a scattered command has
//! answered, the worker folds the pieces back into the single reply the
//! client expects. Responses arrive in whatever order the shards finished,
//! so order-sensitive commands sort by sequence number first.
//!
//! An error from any piece wins over the successful pieces; partial results
//! are never surfaced.

use bytes::Bytes;

use crate::ops::{CommandError, StoreResponse, Value};

/// Folds the gathered responses for `name` into one client reply.
pub(crate) fn compose(
    name: &str,
    responses: Vec<StoreResponse>,
) -> Result<Value, CommandError> {
    match name {
        "MSET" | "RENAME" | "FLUSHDB" => {
            for response in &responses {
                if let Err(err) = &response.result {
                    return Err(err.clone());
                }
            }
            Ok(Value::Ok)
        }

        // COPY decomposes to exactly one piece; its verdict (1 copied,
        // 0 destination already present) passes straight through.
        "COPY" => match responses.into_iter().next() {
            Some(response) => response.result,
            None => Err(CommandError::ShardFailure(
                "no response for copy".to_string(),
            )),
        },

        "MGET" => {
            let mut responses = responses;
            responses.sort_by_key(|r| r.seq_id);

            let mut values = Vec::with_capacity(responses.len());
            for response in responses {
                values.push(response.result?);
            }
            Ok(Value::Array(values))
        }

        "KEYS" => {
            let mut keys: Vec<String> = Vec::new();
            for response in responses {
                if let Value::Array(items) = response.result? {
                    for item in items {
                        if let Value::Str(bytes) = item {
                            keys.push(String::from_utf8_lossy(&bytes).into_owned());
                        }
                    }
                }
            }
            keys.sort();
            Ok(Value::Array(
                keys.into_iter()
                    .map(|key| Value::Str(Bytes::from(key)))
                    .collect(),
            ))
        }

        "DBSIZE" => {
            let mut total: i64 = 0;
            for response in responses {
                if let Value::Int(count) = response.result? {
                    total += count;
                }
            }
            Ok(Value::Int(total))
        }

        other => Err(CommandError::UnknownCommand(other.to_lowercase())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(seq_id: usize, value: Value) -> StoreResponse {
        StoreResponse {
            seq_id,
            request_id: 1,
            result: Ok(value),
        }
    }

    fn fail(seq_id: usize, err: CommandError) -> StoreResponse {
        StoreResponse {
            seq_id,
            request_id: 1,
            result: Err(err),
        }
    }

    #[test]
    fn test_mget_reorders_by_sequence() {
        // Shards answered out of order; the reply must follow the request.
        let responses = vec![
            ok(2, Value::from_str_bytes("c")),
            ok(0, Value::from_str_bytes("a")),
            ok(1, Value::Nil),
        ];
        assert_eq!(
            compose("MGET", responses),
            Ok(Value::Array(vec![
                Value::from_str_bytes("a"),
                Value::Nil,
                Value::from_str_bytes("c"),
            ]))
        );
    }

    #[test]
    fn test_mget_error_beats_partial_results() {
        let responses = vec![
            ok(0, Value::from_str_bytes("a")),
            fail(1, CommandError::ShardFailure("boom".to_string())),
            ok(2, Value::from_str_bytes("c")),
        ];
        assert_eq!(
            compose("MGET", responses),
            Err(CommandError::ShardFailure("boom".to_string()))
        );
    }

    #[test]
    fn test_write_fanouts_collapse_to_ok() {
        for name in ["MSET", "RENAME", "FLUSHDB"] {
            let responses = vec![ok(0, Value::Ok), ok(1, Value::Ok)];
            assert_eq!(compose(name, responses), Ok(Value::Ok));

            let with_error = vec![
                ok(0, Value::Ok),
                fail(1, CommandError::NoSuchKey),
            ];
            assert_eq!(compose(name, with_error), Err(CommandError::NoSuchKey));
        }
    }

    #[test]
    fn test_copy_propagates_shard_verdict() {
        assert_eq!(compose("COPY", vec![ok(0, Value::Int(1))]), Ok(Value::Int(1)));
        // Destination existed and REPLACE was absent: the zero must reach
        // the client, not be rewritten into a success.
        assert_eq!(compose("COPY", vec![ok(0, Value::Int(0))]), Ok(Value::Int(0)));
        assert_eq!(
            compose("COPY", vec![fail(0, CommandError::NoSuchKey)]),
            Err(CommandError::NoSuchKey)
        );
    }

    #[test]
    fn test_keys_merges_and_sorts() {
        let responses = vec![
            ok(1, Value::Array(vec![
                Value::from_str_bytes("zebra"),
                Value::from_str_bytes("apple"),
            ])),
            ok(0, Value::Array(vec![Value::from_str_bytes("mango")])),
            ok(2, Value::Array(vec![])),
        ];
        assert_eq!(
            compose("KEYS", responses),
            Ok(Value::Array(vec![
                Value::from_str_bytes("apple"),
                Value::from_str_bytes("mango"),
                Value::from_str_bytes("zebra"),
            ]))
        );
    }

    #[test]
    fn test_dbsize_sums_shard_counts() {
        let responses = vec![ok(0, Value::Int(3)), ok(1, Value::Int(0)), ok(2, Value::Int(9))];
        assert_eq!(compose("DBSIZE", responses), Ok(Value::Int(12)));
    }
}
