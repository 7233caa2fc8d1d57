//! # Reply Conversion
//!
//! Purpose: Turn raw `RespValue` replies into the byte-level results of the
//! command contract.
//!
//! Every converter is a plain `fn(RespValue) -> Option<T>`: `None` means the
//! reply had the wrong shape. `convert` handles the two cases all commands
//! share: error replies become `ClientError::Server`, shape mismatches become
//! `ClientError::UnexpectedResponse` naming the command.

use crate::error::{ClientError, ClientResult};
use crate::resp::RespValue;

/// Converter applied to one reply.
pub(crate) type Converter<T> = fn(RespValue) -> Option<T>;

pub(crate) fn convert<T>(
    command: &[u8],
    reply: RespValue,
    converter: Converter<T>,
) -> ClientResult<T> {
    match reply {
        RespValue::Error(message) => Err(ClientError::Server { message }),
        other => converter(other).ok_or_else(|| ClientError::unexpected(command)),
    }
}

/// `+OK` (or any status).
pub(crate) fn ok(reply: RespValue) -> Option<()> {
    match reply {
        RespValue::Simple(_) => Some(()),
        _ => None,
    }
}

pub(crate) fn status(reply: RespValue) -> Option<String> {
    match reply {
        RespValue::Simple(text) | RespValue::Bulk(Some(text)) => {
            Some(String::from_utf8_lossy(&text).into_owned())
        }
        _ => None,
    }
}

pub(crate) fn integer(reply: RespValue) -> Option<i64> {
    match reply {
        RespValue::Integer(value) => Some(value),
        _ => None,
    }
}

/// Non-negative integer reply (cardinalities, removed counts).
pub(crate) fn count(reply: RespValue) -> Option<u64> {
    match reply {
        RespValue::Integer(value) => u64::try_from(value).ok(),
        _ => None,
    }
}

/// Integer reply read as "had an effect".
pub(crate) fn boolean(reply: RespValue) -> Option<bool> {
    match reply {
        RespValue::Integer(value) => Some(value != 0),
        _ => None,
    }
}

/// Conditional SET: `+OK` when written, nil when the condition failed.
pub(crate) fn set_flag(reply: RespValue) -> Option<bool> {
    match reply {
        RespValue::Simple(_) => Some(true),
        RespValue::Bulk(None) => Some(false),
        _ => None,
    }
}

pub(crate) fn bulk(reply: RespValue) -> Option<Option<Vec<u8>>> {
    match reply {
        RespValue::Bulk(data) => Some(data),
        _ => None,
    }
}

/// Array of non-nil bulks, in server order.
pub(crate) fn bulks(reply: RespValue) -> Option<Vec<Vec<u8>>> {
    match reply {
        RespValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                RespValue::Bulk(Some(data)) => Some(data),
                _ => None,
            })
            .collect(),
        // SPOP/SRANDMEMBER on a missing key in some server versions.
        RespValue::Bulk(None) => Some(Vec::new()),
        _ => None,
    }
}

/// Array of bulks where nil marks a missing key or field.
pub(crate) fn optional_bulks(reply: RespValue) -> Option<Vec<Option<Vec<u8>>>> {
    match reply {
        RespValue::Array(items) => items.into_iter().map(bulk).collect(),
        _ => None,
    }
}

pub(crate) fn float(reply: RespValue) -> Option<f64> {
    match reply {
        RespValue::Bulk(Some(text)) | RespValue::Simple(text) => parse_float(&text),
        RespValue::Integer(value) => Some(value as f64),
        _ => None,
    }
}

pub(crate) fn optional_float(reply: RespValue) -> Option<Option<f64>> {
    match reply {
        RespValue::Bulk(None) => Some(None),
        other => float(other).map(Some),
    }
}

/// `ZRANGE ... WITHSCORES`: flat member/score array.
pub(crate) fn scored(reply: RespValue) -> Option<Vec<(Vec<u8>, f64)>> {
    let items = match reply {
        RespValue::Array(items) => items,
        _ => return None,
    };
    if items.len() % 2 != 0 {
        return None;
    }
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
        let member = match member {
            RespValue::Bulk(Some(data)) => data,
            _ => return None,
        };
        pairs.push((member, float(score)?));
    }
    Some(pairs)
}

/// `BLPOP`/`BRPOP`: `[key, value]`, or nil on timeout.
pub(crate) fn blocking_pop(reply: RespValue) -> Option<Option<Vec<u8>>> {
    match reply {
        RespValue::Bulk(None) => Some(None),
        RespValue::Array(mut items) if items.len() == 2 => match items.pop() {
            Some(RespValue::Bulk(Some(value))) => Some(Some(value)),
            _ => None,
        },
        _ => None,
    }
}

fn parse_float(text: &[u8]) -> Option<f64> {
    std::str::from_utf8(text).ok()?.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk_of(data: &str) -> RespValue {
        RespValue::Bulk(Some(data.as_bytes().to_vec()))
    }

    #[test]
    fn error_reply_wins_over_shape() {
        let err = convert(b"GET", RespValue::Error(b"WRONGTYPE".to_vec()), bulk)
            .unwrap_err();
        assert!(matches!(err, ClientError::Server { .. }));
    }

    #[test]
    fn shape_mismatch_names_command() {
        let err = convert(b"SCARD", bulk_of("x"), count).unwrap_err();
        assert_eq!(err.to_string(), "unexpected response to SCARD");
    }

    #[test]
    fn conditional_set_reads_nil_as_false() {
        assert_eq!(set_flag(RespValue::Simple(b"OK".to_vec())), Some(true));
        assert_eq!(set_flag(RespValue::Bulk(None)), Some(false));
    }

    #[test]
    fn scores_parse_infinities() {
        let reply = RespValue::Array(vec![bulk_of("x"), bulk_of("1"), bulk_of("y"), bulk_of("inf")]);
        let pairs = scored(reply).unwrap();
        assert_eq!(pairs[0], (b"x".to_vec(), 1.0));
        assert_eq!(pairs[1].1, f64::INFINITY);
    }

    #[test]
    fn odd_scored_array_is_rejected() {
        assert!(scored(RespValue::Array(vec![bulk_of("x")])).is_none());
    }

    #[test]
    fn blocking_pop_takes_value_half() {
        let reply = RespValue::Array(vec![bulk_of("queue"), bulk_of("job")]);
        assert_eq!(blocking_pop(reply), Some(Some(b"job".to_vec())));
        assert_eq!(blocking_pop(RespValue::Bulk(None)), Some(None));
    }

    #[test]
    fn optional_bulks_keep_holes() {
        let reply = RespValue::Array(vec![bulk_of("a"), RespValue::Bulk(None)]);
        assert_eq!(optional_bulks(reply), Some(vec![Some(b"a".to_vec()), None]));
    }

    #[test]
    fn negative_count_is_a_mismatch() {
        assert_eq!(count(RespValue::Integer(-1)), None);
        assert_eq!(count(RespValue::Integer(3)), Some(3));
    }
}
